//! services/api/src/lib.rs
//!
//! The installer service: session storage, the wizard, the install
//! orchestrator and the HTTP API around them.

pub mod adapters;
pub mod auth;
pub mod config;
pub mod error;
pub mod install;
pub mod web;
pub mod wizard;
