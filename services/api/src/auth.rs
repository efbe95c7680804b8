//! services/api/src/auth.rs
//!
//! The Auth Manager: issues session tokens, resolves them to a typed
//! `Principal`, and owns the background sweep of expired sessions.

use chrono::Utc;
use kuberstack_core::domain::{short_token, Session, WizardState};
use kuberstack_core::ports::{PortError, PortResult, SessionStore};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

/// The authenticated identity behind a request: proof that the token
/// resolved to a live session, carrying that session.
#[derive(Debug, Clone)]
pub struct Principal {
    session: Session,
}

impl Principal {
    pub fn new(session: Session) -> Self {
        Self { session }
    }

    pub fn token(&self) -> &str {
        &self.session.token
    }

    pub fn state(&self) -> &WizardState {
        &self.session.state
    }
}

/// Outcome of resolving a presented token.
#[derive(Debug)]
pub enum Authentication {
    Principal(Principal),
    /// No token was presented.
    Anonymous,
    /// A token was presented but does not resolve to a live session.
    Invalid,
}

pub struct AuthManager {
    store: Arc<dyn SessionStore>,
}

impl AuthManager {
    pub fn new(store: Arc<dyn SessionStore>) -> Self {
        Self { store }
    }

    pub async fn issue_token(&self) -> PortResult<String> {
        let session = self.store.create().await?;
        info!(token = short_token(&session.token), expires_at = %session.expires_at, "Issued session token");
        Ok(session.token)
    }

    /// Storage failures propagate as errors; they are not mistaken for an
    /// invalid token.
    pub async fn authenticate(&self, token: &str) -> PortResult<Authentication> {
        let token = token.trim();
        if token.is_empty() {
            return Ok(Authentication::Anonymous);
        }
        match self.store.get(token).await {
            Ok(session) => Ok(Authentication::Principal(Principal::new(session))),
            Err(PortError::NotFound(_)) => {
                debug!(token = short_token(token), "Rejected unknown or expired token");
                Ok(Authentication::Invalid)
            }
            Err(e) => Err(e),
        }
    }

    pub async fn sweep_expired(&self) -> PortResult<u64> {
        self.store.sweep_expired(Utc::now()).await
    }

    /// Sweeps expired sessions every `interval` until `cancel` fires. A failed
    /// sweep is logged and retried on the next tick.
    pub async fn run_cleanup_loop(&self, interval: Duration, cancel: CancellationToken) {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        info!(interval_secs = interval.as_secs_f64(), "Session cleanup loop started");

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => match self.sweep_expired().await {
                    Ok(0) => debug!("No expired sessions to remove"),
                    Ok(removed) => info!(removed, "Removed expired sessions"),
                    Err(e) => error!(error = %e, "Expired session sweep failed"),
                },
            }
        }

        info!("Session cleanup loop stopped");
    }

    /// Runs the cleanup loop on its own task. The caller owns the handle and
    /// must cancel and await it before closing the store.
    pub fn spawn_cleanup_loop(
        self: &Arc<Self>,
        interval: Duration,
        cancel: CancellationToken,
    ) -> JoinHandle<()> {
        let manager = Arc::clone(self);
        tokio::spawn(async move { manager.run_cleanup_loop(interval, cancel).await })
    }
}
