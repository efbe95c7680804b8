//! crates/kuberstack_core/src/ports.rs
//!
//! Defines the service contracts (traits) for the installer's core logic.
//! These traits form the boundary of the hexagonal architecture: the session
//! store engine and the reference data providers are pluggable adapters.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::domain::{
    ClusterSpec, ClusterType, Credentials, NodeType, Product, ProductId, Region, Session,
    WizardState,
};

//=========================================================================================
// Generic Port Error and Result Types
//=========================================================================================

/// The error taxonomy shared by every port and by the services built on them.
#[derive(Debug, thiserror::Error)]
pub enum PortError {
    #[error("Item not found: {0}")]
    NotFound(String),
    /// The bearer token is absent, unknown or expired.
    #[error("Invalid or expired session token")]
    InvalidToken,
    #[error("Invalid input: {0}")]
    Validation(String),
    /// A wizard step was attempted before the one it depends on.
    #[error("Precondition failed: {0}")]
    PreconditionFailed(String),
    #[error("Conflict: {0}")]
    Conflict(String),
    #[error("Not ready: {0}")]
    NotReady(String),
    /// The provisioning tool failed; the message is the caller-safe summary.
    #[error("Provisioning tool failure: {0}")]
    ExternalTool(String),
    #[error("Storage failure: {0}")]
    Storage(String),
    #[error("An unexpected error occurred: {0}")]
    Unexpected(String),
}

/// A convenience type alias for `Result<T, PortError>`.
pub type PortResult<T> = Result<T, PortError>;

/// A state transition handed to [`SessionStore::update`]. It may be invoked
/// more than once if the store has to retry a lost write race.
pub type StateMutator<'a> = &'a (dyn Fn(&mut WizardState) -> PortResult<()> + Send + Sync);

//=========================================================================================
// Service Ports (Traits)
//=========================================================================================

#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Stores a fresh session with an empty wizard state under a new,
    /// unguessable token.
    async fn create(&self) -> PortResult<Session>;

    /// Returns the session if it exists and has not expired. Expired rows are
    /// `NotFound` even before the sweep removes them.
    async fn get(&self, token: &str) -> PortResult<Session>;

    /// Applies `mutator` to the session's wizard state atomically and renews
    /// the session's expiry. A mutator error aborts the update unchanged.
    async fn update(&self, token: &str, mutator: StateMutator<'_>) -> PortResult<Session>;

    async fn delete(&self, token: &str) -> PortResult<()>;

    /// Removes every session whose expiry is at or before `now`.
    async fn sweep_expired(&self, now: DateTime<Utc>) -> PortResult<u64>;

    /// Every session that has not expired yet.
    async fn list_live(&self) -> PortResult<Vec<Session>>;

    async fn close(&self);
}

/// Static reference data the wizard validates against.
pub trait CatalogService: Send + Sync {
    fn regions(&self) -> Vec<Region>;

    fn zones(&self, region: &str) -> PortResult<Vec<String>>;

    fn cluster_types(&self) -> Vec<ClusterType>;

    fn node_types(&self) -> Vec<NodeType>;

    fn storage_types(&self) -> Vec<NodeType>;

    /// Products whose name or description contains `search` and that carry
    /// every tag in `tags`.
    fn products(&self, search: &str, tags: &[String]) -> Vec<Product>;

    fn tags(&self) -> Vec<String>;

    fn product_name(&self, id: ProductId) -> Option<String>;
}

#[async_trait]
pub trait DomainService: Send + Sync {
    /// Domains the given account can host clusters under.
    async fn list_domains(&self, credentials: &Credentials) -> PortResult<Vec<String>>;

    /// Fails with `Validation` if the domain/name pair cannot be used.
    async fn check_domain(&self, domain: &str, name: &str) -> PortResult<()>;

    /// Whether the cluster's public DNS records have propagated.
    async fn is_dns_in_sync(&self, cluster: &ClusterSpec) -> PortResult<bool>;
}
