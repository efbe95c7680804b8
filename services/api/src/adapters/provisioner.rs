//! services/api/src/adapters/provisioner.rs
//!
//! Builds invocations of the external provisioning tool. Each session gets its
//! own working directory holding the cluster description the tool reads and
//! the kubeconfig it produces.

use kuberstack_core::domain::{NodeGroup, ProductId, WizardState};
use kuberstack_core::ports::{CatalogService, PortError, PortResult};
use serde::Serialize;
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;
use tokio::process::Command;
use tracing::{debug, warn};

use crate::config::KopsConfig;

pub const SPEC_FILE: &str = "cluster.json";
pub const KUBECONFIG_FILE: &str = "kube.config";

/// What the tool is asked to do with the described cluster.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToolMode {
    Create,
    Delete,
}

impl ToolMode {
    fn as_arg(self) -> &'static str {
        match self {
            ToolMode::Create => "create",
            ToolMode::Delete => "delete",
        }
    }
}

//=========================================================================================
// Input document handed to the tool
//=========================================================================================

#[derive(Serialize)]
struct ToolProduct {
    id: ProductId,
    name: String,
}

/// The cluster description written to `cluster.json`. Provider secrets are
/// passed through the environment, never through this file.
#[derive(Serialize)]
struct ToolSpec<'a> {
    cluster: String,
    name: &'a str,
    domain: &'a str,
    cluster_type: i64,
    state_store: String,
    region: &'a str,
    ssh_public_key: &'a str,
    master: &'a NodeGroup,
    workers: &'a NodeGroup,
    software: Vec<ToolProduct>,
}

//=========================================================================================
// The Provisioner
//=========================================================================================

pub struct Provisioner {
    config: KopsConfig,
    catalog: Arc<dyn CatalogService>,
}

impl Provisioner {
    pub fn new(config: KopsConfig, catalog: Arc<dyn CatalogService>) -> Self {
        Self { config, catalog }
    }

    pub fn timeout(&self) -> Duration {
        self.config.timeout
    }

    pub fn work_dir(&self, token: &str) -> PathBuf {
        self.config.work_dir.join(token)
    }

    pub fn kubeconfig_path(&self, token: &str) -> PathBuf {
        self.work_dir(token).join(KUBECONFIG_FILE)
    }

    /// Writes the cluster description for `state` and returns the command that
    /// runs the tool in `mode` against it. Nothing is spawned here.
    pub async fn command(
        &self,
        token: &str,
        state: &WizardState,
        mode: ToolMode,
    ) -> PortResult<Command> {
        state.ensure_installable()?;
        let (Some(credentials), Some(cluster), Some(nodes), Some(software)) = (
            state.credentials.as_ref(),
            state.cluster.as_ref(),
            state.nodes.as_ref(),
            state.software.as_ref(),
        ) else {
            return Err(PortError::PreconditionFailed(
                "wizard state is incomplete".to_string(),
            ));
        };

        let state_store = format!("s3://{}", cluster.bucket);
        let spec = ToolSpec {
            cluster: cluster.fqdn(),
            name: &cluster.name,
            domain: &cluster.domain,
            cluster_type: cluster.cluster_type,
            state_store: state_store.clone(),
            region: &credentials.region,
            ssh_public_key: &credentials.ssh_public_key,
            master: &nodes.master,
            workers: &nodes.workers,
            software: software
                .iter()
                .map(|id| ToolProduct {
                    id: *id,
                    name: self.catalog.product_name(*id).unwrap_or_default(),
                })
                .collect(),
        };

        let dir = self.work_dir(token);
        tokio::fs::create_dir_all(&dir).await.map_err(|e| {
            PortError::Unexpected(format!("cannot create {}: {}", dir.display(), e))
        })?;
        let spec_path = dir.join(SPEC_FILE);
        let spec_json =
            serde_json::to_vec_pretty(&spec).map_err(|e| PortError::Unexpected(e.to_string()))?;
        tokio::fs::write(&spec_path, spec_json).await.map_err(|e| {
            PortError::Unexpected(format!("cannot write {}: {}", spec_path.display(), e))
        })?;

        let mut command = Command::new(&self.config.program);
        command
            .args(&self.config.extra_args)
            .arg(mode.as_arg())
            .arg("--spec")
            .arg(&spec_path)
            .arg("--kubeconfig")
            .arg(dir.join(KUBECONFIG_FILE))
            .arg("--state")
            .arg(&state_store)
            .arg("--timeout")
            .arg(format!("{}s", self.config.timeout.as_secs()))
            .current_dir(&dir)
            .env("AWS_ACCESS_KEY_ID", &credentials.access_key)
            .env("AWS_SECRET_ACCESS_KEY", &credentials.secret_key)
            .env("AWS_REGION", &credentials.region)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        debug!(program = %self.config.program.display(), mode = mode.as_arg(), "Prepared provisioning command");
        Ok(command)
    }

    /// Best effort; a leftover directory only costs disk space.
    pub async fn remove_work_dir(&self, token: &str) {
        let dir = self.work_dir(token);
        match tokio::fs::remove_dir_all(&dir).await {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!(dir = %dir.display(), error = %e, "Failed to remove working directory"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::catalog::StaticCatalog;
    use kuberstack_core::domain::{ClusterSpec, Credentials, NodesSpec};

    fn provisioner(work_dir: PathBuf) -> Provisioner {
        Provisioner::new(
            KopsConfig {
                program: PathBuf::from("/opt/kops"),
                extra_args: vec!["--embedded".to_string()],
                work_dir,
                timeout: Duration::from_secs(90),
            },
            Arc::new(StaticCatalog::new()),
        )
    }

    fn complete_state() -> WizardState {
        let group = |instances| NodeGroup {
            instances,
            zones: vec!["us-east-1a".into()],
            instance_type: Some("t2.medium".into()),
        };
        WizardState {
            credentials: Some(Credentials {
                access_key: "AKIA".into(),
                secret_key: "top-secret".into(),
                region: "us-east-1".into(),
                ssh_public_key: "ssh-rsa AAAA".into(),
            }),
            cluster: Some(ClusterSpec::new("example.com", "demo", 1)),
            nodes: Some(NodesSpec {
                master: group(1),
                workers: group(2),
            }),
            software: Some(vec![5]),
            install: None,
        }
    }

    #[tokio::test]
    async fn command_writes_spec_without_secrets() {
        let dir = tempfile::tempdir().unwrap();
        let provisioner = provisioner(dir.path().to_path_buf());

        let command = provisioner
            .command("tok", &complete_state(), ToolMode::Create)
            .await
            .unwrap();

        let spec = std::fs::read_to_string(dir.path().join("tok").join(SPEC_FILE)).unwrap();
        assert!(spec.contains("\"cluster\": \"demo.example.com\""));
        assert!(spec.contains("Jenkins"));
        assert!(!spec.contains("top-secret"));

        let std_command = command.as_std();
        let args: Vec<String> = std_command
            .get_args()
            .map(|a| a.to_string_lossy().into_owned())
            .collect();
        assert_eq!(args[0], "--embedded");
        assert_eq!(args[1], "create");
        assert!(args.contains(&"s3://demo-example-com-state".to_string()));
        assert_eq!(args.last().map(String::as_str), Some("90s"));

        let secret = std_command
            .get_envs()
            .find(|(k, _)| *k == "AWS_SECRET_ACCESS_KEY")
            .and_then(|(_, v)| v)
            .map(|v| v.to_string_lossy().into_owned());
        assert_eq!(secret.as_deref(), Some("top-secret"));
    }

    #[tokio::test]
    async fn incomplete_state_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let provisioner = provisioner(dir.path().to_path_buf());
        let mut state = complete_state();
        state.software = None;

        let err = provisioner
            .command("tok", &state, ToolMode::Delete)
            .await
            .unwrap_err();
        assert!(matches!(err, PortError::PreconditionFailed(_)));
        assert!(!dir.path().join("tok").exists());
    }

    #[tokio::test]
    async fn remove_work_dir_tolerates_missing_dir() {
        let dir = tempfile::tempdir().unwrap();
        let provisioner = provisioner(dir.path().to_path_buf());
        provisioner.remove_work_dir("never-created").await;

        std::fs::create_dir_all(dir.path().join("tok")).unwrap();
        provisioner.remove_work_dir("tok").await;
        assert!(!dir.path().join("tok").exists());
    }
}
