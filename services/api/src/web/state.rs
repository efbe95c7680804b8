//! services/api/src/web/state.rs
//!
//! Defines the application's shared state.

use crate::adapters::provisioner::Provisioner;
use crate::auth::AuthManager;
use crate::config::Config;
use crate::install::InstallOrchestrator;
use crate::wizard::WizardService;
use kuberstack_core::ports::{CatalogService, DomainService, SessionStore};
use std::sync::Arc;

/// The shared application state, created once at startup and passed to all handlers.
pub struct AppState {
    pub catalog: Arc<dyn CatalogService>,
    pub auth: Arc<AuthManager>,
    pub wizard: WizardService,
    pub installer: InstallOrchestrator,
}

impl AppState {
    pub fn new(
        config: Arc<Config>,
        store: Arc<dyn SessionStore>,
        catalog: Arc<dyn CatalogService>,
        domains: Arc<dyn DomainService>,
    ) -> Self {
        let provisioner = Arc::new(Provisioner::new(config.kops.clone(), Arc::clone(&catalog)));
        Self {
            auth: Arc::new(AuthManager::new(Arc::clone(&store))),
            wizard: WizardService::new(Arc::clone(&store), Arc::clone(&catalog), domains),
            installer: InstallOrchestrator::new(store, provisioner),
            catalog,
        }
    }
}
