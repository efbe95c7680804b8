//! services/api/src/wizard.rs
//!
//! Validates wizard input against the reference data and records it through
//! the session store's atomic update.

use kuberstack_core::domain::{
    ClusterSpec, Credentials, NodeGroup, NodesSpec, ProductId, Session, WizardState,
};
use kuberstack_core::ports::{CatalogService, DomainService, PortError, PortResult, SessionStore};
use kuberstack_core::WizardStep;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{info, instrument};

use crate::auth::Principal;

/// A summary of the recorded cluster, as it will be handed to the
/// provisioning tool.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClusterConf {
    pub domain: String,
    pub name: String,
    pub fqdn: String,
    pub bucket: String,
    pub cluster_type: i64,
    pub region: String,
    pub master: NodeGroup,
    pub workers: NodeGroup,
    pub products: Vec<(ProductId, String)>,
}

pub struct WizardService {
    store: Arc<dyn SessionStore>,
    catalog: Arc<dyn CatalogService>,
    domains: Arc<dyn DomainService>,
}

fn required(field: &str, value: &str) -> PortResult<()> {
    if value.trim().is_empty() {
        return Err(PortError::Validation(format!("{} must not be empty", field)));
    }
    Ok(())
}

fn normalize_domain(domain: &str) -> String {
    domain.trim().trim_end_matches('.').to_ascii_lowercase()
}

impl WizardService {
    pub fn new(
        store: Arc<dyn SessionStore>,
        catalog: Arc<dyn CatalogService>,
        domains: Arc<dyn DomainService>,
    ) -> Self {
        Self {
            store,
            catalog,
            domains,
        }
    }

    #[instrument(skip_all, fields(region = %credentials.region))]
    pub async fn save_credentials(
        &self,
        principal: &Principal,
        credentials: Credentials,
    ) -> PortResult<Session> {
        required("access key", &credentials.access_key)?;
        required("secret key", &credentials.secret_key)?;
        required("region", &credentials.region)?;
        required("ssh public key", &credentials.ssh_public_key)?;
        if !self
            .catalog
            .regions()
            .iter()
            .any(|region| region.id == credentials.region)
        {
            return Err(PortError::Validation(format!(
                "unknown region '{}'",
                credentials.region
            )));
        }

        let session = self
            .store
            .update(principal.token(), &|state: &mut WizardState| {
                state.record_credentials(credentials.clone())
            })
            .await?;
        info!("Credentials recorded");
        Ok(session)
    }

    /// Validates a prospective cluster identity without recording it.
    pub async fn check_cluster(&self, principal: &Principal, domain: &str, name: &str) -> PortResult<()> {
        principal.state().require_before(WizardStep::Cluster)?;
        self.domains.check_domain(domain, name).await
    }

    #[instrument(skip_all, fields(domain = %domain, name = %name))]
    pub async fn save_cluster(
        &self,
        principal: &Principal,
        domain: &str,
        name: &str,
        cluster_type: i64,
    ) -> PortResult<Session> {
        self.check_cluster(principal, domain, name).await?;
        if !self
            .catalog
            .cluster_types()
            .iter()
            .any(|t| t.id == cluster_type)
        {
            return Err(PortError::Validation(format!(
                "unknown cluster type {}",
                cluster_type
            )));
        }

        let cluster = ClusterSpec::new(&normalize_domain(domain), name, cluster_type);
        let session = self
            .store
            .update(principal.token(), &|state: &mut WizardState| {
                state.record_cluster(cluster.clone())
            })
            .await?;
        info!(bucket = %cluster.bucket, "Cluster recorded");
        Ok(session)
    }

    fn validate_group(&self, label: &str, group: &NodeGroup, zones: &[String]) -> PortResult<()> {
        if group.instances == 0 {
            return Err(PortError::Validation(format!(
                "{} needs at least one instance",
                label
            )));
        }
        if group.zones.is_empty() {
            return Err(PortError::Validation(format!(
                "{} needs at least one zone",
                label
            )));
        }
        let mut seen = HashSet::new();
        for zone in &group.zones {
            if !seen.insert(zone.as_str()) {
                return Err(PortError::Validation(format!(
                    "{} lists zone '{}' twice",
                    label, zone
                )));
            }
            if !zones.contains(zone) {
                return Err(PortError::Validation(format!(
                    "zone '{}' is not in the selected region",
                    zone
                )));
            }
        }
        if let Some(instance_type) = &group.instance_type {
            let known = self
                .catalog
                .node_types()
                .into_iter()
                .chain(self.catalog.storage_types())
                .any(|t| &t.id == instance_type);
            if !known {
                return Err(PortError::Validation(format!(
                    "unknown instance type '{}'",
                    instance_type
                )));
            }
        }
        Ok(())
    }

    #[instrument(skip_all)]
    pub async fn save_nodes(&self, principal: &Principal, nodes: NodesSpec) -> PortResult<Session> {
        let state = principal.state();
        state.require_before(WizardStep::Nodes)?;
        let region = state
            .credentials
            .as_ref()
            .map(|c| c.region.clone())
            .unwrap_or_default();
        let zones = self.catalog.zones(&region)?;
        self.validate_group("master", &nodes.master, &zones)?;
        self.validate_group("workers", &nodes.workers, &zones)?;

        let session = self
            .store
            .update(principal.token(), &|state: &mut WizardState| {
                state.record_nodes(nodes.clone())
            })
            .await?;
        info!(
            masters = nodes.master.instances,
            workers = nodes.workers.instances,
            "Node groups recorded"
        );
        Ok(session)
    }

    /// Duplicates collapse to their first occurrence.
    #[instrument(skip_all)]
    pub async fn save_software(
        &self,
        principal: &Principal,
        products: Vec<ProductId>,
    ) -> PortResult<Session> {
        let mut seen = HashSet::new();
        let mut selected = Vec::with_capacity(products.len());
        for id in products {
            if self.catalog.product_name(id).is_none() {
                return Err(PortError::Validation(format!("unknown product {}", id)));
            }
            if seen.insert(id) {
                selected.push(id);
            }
        }

        let session = self
            .store
            .update(principal.token(), &|state: &mut WizardState| {
                state.record_software(selected.clone())
            })
            .await?;
        info!(products = ?selected, "Software selection recorded");
        Ok(session)
    }

    pub async fn domains(&self, principal: &Principal) -> PortResult<Vec<String>> {
        let state = principal.state();
        state.require_before(WizardStep::Cluster)?;
        match &state.credentials {
            Some(credentials) => self.domains.list_domains(credentials).await,
            None => Ok(Vec::new()),
        }
    }

    pub async fn dns_in_sync(&self, principal: &Principal) -> PortResult<bool> {
        let state = principal.state();
        state.require_before(WizardStep::Nodes)?;
        match &state.cluster {
            Some(cluster) => self.domains.is_dns_in_sync(cluster).await,
            None => Ok(false),
        }
    }

    pub fn cluster_conf(&self, principal: &Principal) -> PortResult<ClusterConf> {
        let state = principal.state();
        state.ensure_installable()?;
        let (Some(credentials), Some(cluster), Some(nodes), Some(software)) = (
            &state.credentials,
            &state.cluster,
            &state.nodes,
            &state.software,
        ) else {
            return Err(PortError::PreconditionFailed(
                "wizard state is incomplete".to_string(),
            ));
        };

        Ok(ClusterConf {
            domain: cluster.domain.clone(),
            name: cluster.name.clone(),
            fqdn: cluster.fqdn(),
            bucket: cluster.bucket.clone(),
            cluster_type: cluster.cluster_type,
            region: credentials.region.clone(),
            master: nodes.master.clone(),
            workers: nodes.workers.clone(),
            products: software
                .iter()
                .map(|id| (*id, self.catalog.product_name(*id).unwrap_or_default()))
                .collect(),
        })
    }
}
