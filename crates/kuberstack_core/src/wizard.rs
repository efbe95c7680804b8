//! crates/kuberstack_core/src/wizard.rs
//!
//! The prerequisite chain of the wizard. Every transition here is pure; the
//! session store runs them inside its atomic `update`.

use std::fmt;

use crate::domain::{
    ClusterSpec, Credentials, InstallPhase, InstallTarget, NodesSpec, ProductId, WizardState,
};
use crate::ports::{PortError, PortResult};

/// The ordered steps of the wizard.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum WizardStep {
    Credentials,
    Cluster,
    Nodes,
    Software,
    Install,
}

impl WizardStep {
    const CHAIN: [WizardStep; 5] = [
        WizardStep::Credentials,
        WizardStep::Cluster,
        WizardStep::Nodes,
        WizardStep::Software,
        WizardStep::Install,
    ];
}

impl fmt::Display for WizardStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            WizardStep::Credentials => "credentials",
            WizardStep::Cluster => "cluster",
            WizardStep::Nodes => "nodes",
            WizardStep::Software => "software",
            WizardStep::Install => "install",
        };
        f.write_str(name)
    }
}

impl WizardState {
    fn is_recorded(&self, step: WizardStep) -> bool {
        match step {
            WizardStep::Credentials => self.credentials.is_some(),
            WizardStep::Cluster => self.cluster.is_some(),
            WizardStep::Nodes => self.nodes.is_some(),
            WizardStep::Software => self.software.is_some(),
            WizardStep::Install => self.install.is_some(),
        }
    }

    /// Ensures every step before `next` has been recorded. The error names the
    /// first missing one.
    pub fn require_before(&self, next: WizardStep) -> PortResult<()> {
        match WizardStep::CHAIN
            .iter()
            .take_while(|step| **step < next)
            .find(|step| !self.is_recorded(**step))
        {
            Some(missing) => Err(PortError::PreconditionFailed(format!(
                "the {} step must be completed before {}",
                missing, next
            ))),
            None => Ok(()),
        }
    }

    pub fn install_phase(&self) -> InstallPhase {
        self.install
            .as_ref()
            .map(|run| run.phase)
            .unwrap_or(InstallPhase::Idle)
    }

    /// Recorded steps are frozen while the cluster they describe is being
    /// provisioned or exists.
    fn ensure_editable(&self) -> PortResult<()> {
        match self.install_phase() {
            InstallPhase::Running => Err(PortError::Conflict(
                "installation is running; wizard steps cannot change".to_string(),
            )),
            InstallPhase::Succeeded => Err(PortError::Conflict(
                "cluster is installed; vanish it before changing wizard steps".to_string(),
            )),
            _ => Ok(()),
        }
    }

    pub fn record_credentials(&mut self, credentials: Credentials) -> PortResult<()> {
        self.ensure_editable()?;
        self.credentials = Some(credentials);
        Ok(())
    }

    pub fn record_cluster(&mut self, cluster: ClusterSpec) -> PortResult<()> {
        self.ensure_editable()?;
        self.require_before(WizardStep::Cluster)?;
        self.cluster = Some(cluster);
        Ok(())
    }

    pub fn record_nodes(&mut self, nodes: NodesSpec) -> PortResult<()> {
        self.ensure_editable()?;
        self.require_before(WizardStep::Nodes)?;
        self.nodes = Some(nodes);
        Ok(())
    }

    pub fn record_software(&mut self, products: Vec<ProductId>) -> PortResult<()> {
        self.ensure_editable()?;
        self.require_before(WizardStep::Software)?;
        self.software = Some(products);
        Ok(())
    }

    pub fn ensure_installable(&self) -> PortResult<()> {
        self.require_before(WizardStep::Install)
    }

    /// The cluster identity an install started now would create.
    pub fn install_target(&self) -> PortResult<InstallTarget> {
        self.ensure_installable()?;
        match (&self.credentials, &self.cluster) {
            (Some(credentials), Some(cluster)) => Ok(InstallTarget {
                cluster: cluster.clone(),
                region: credentials.region.clone(),
            }),
            _ => Err(PortError::PreconditionFailed(
                "wizard state is incomplete".to_string(),
            )),
        }
    }

    /// A copy of this state pinned to `target`'s cluster and region. Everything
    /// else, including rotated keys, is taken as currently recorded.
    pub fn aimed_at(&self, target: &InstallTarget) -> WizardState {
        let mut state = self.clone();
        state.cluster = Some(target.cluster.clone());
        if let Some(credentials) = state.credentials.as_mut() {
            credentials.region = target.region.clone();
        }
        state
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{InstallRun, NodeGroup};
    use chrono::Utc;

    fn credentials() -> Credentials {
        Credentials {
            access_key: "AKIA".into(),
            secret_key: "secret".into(),
            region: "us-east-1".into(),
            ssh_public_key: "ssh-rsa AAAA".into(),
        }
    }

    fn nodes() -> NodesSpec {
        NodesSpec {
            master: NodeGroup {
                instances: 1,
                zones: vec!["us-east-1a".into()],
                instance_type: None,
            },
            workers: NodeGroup {
                instances: 2,
                zones: vec!["us-east-1a".into(), "us-east-1b".into()],
                instance_type: None,
            },
        }
    }

    fn complete_state() -> WizardState {
        let mut state = WizardState::default();
        state.record_credentials(credentials()).unwrap();
        state
            .record_cluster(ClusterSpec::new("example.com", "demo", 1))
            .unwrap();
        state.record_nodes(nodes()).unwrap();
        state.record_software(vec![5]).unwrap();
        state
    }

    #[test]
    fn cluster_requires_credentials() {
        let mut state = WizardState::default();
        let err = state
            .record_cluster(ClusterSpec::new("example.com", "demo", 1))
            .unwrap_err();
        match err {
            PortError::PreconditionFailed(msg) => assert!(msg.contains("credentials")),
            other => panic!("unexpected error: {other:?}"),
        }
        assert!(state.cluster.is_none());
    }

    #[test]
    fn software_names_first_missing_step() {
        let mut state = WizardState::default();
        state.record_credentials(credentials()).unwrap();
        let err = state.record_software(vec![5]).unwrap_err();
        match err {
            PortError::PreconditionFailed(msg) => {
                assert!(msg.contains("cluster"), "message was {msg}");
                assert!(msg.ends_with("software"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn install_requires_software() {
        let mut state = complete_state();
        assert!(state.ensure_installable().is_ok());

        state.software = None;
        assert!(matches!(
            state.ensure_installable(),
            Err(PortError::PreconditionFailed(_))
        ));
    }

    #[test]
    fn credentials_are_overwritable() {
        let mut state = complete_state();
        let mut other = credentials();
        other.region = "eu-west-1".into();
        state.record_credentials(other.clone()).unwrap();
        assert_eq!(state.credentials, Some(other));
    }

    #[test]
    fn steps_are_frozen_while_running_or_installed() {
        let mut state = complete_state();
        let target = state.install_target().unwrap();
        state.install = Some(InstallRun::started("token", target, Utc::now()));
        assert!(matches!(
            state.record_nodes(nodes()),
            Err(PortError::Conflict(_))
        ));

        state.install.as_mut().unwrap().phase = InstallPhase::Succeeded;
        assert!(matches!(
            state.record_credentials(credentials()),
            Err(PortError::Conflict(_))
        ));

        state.install.as_mut().unwrap().phase = InstallPhase::Failed;
        assert!(state.record_software(vec![1, 2]).is_ok());
    }

    #[test]
    fn failed_run_keeps_its_target_after_edits() {
        let mut state = complete_state();
        let target = state.install_target().unwrap();
        let mut run = InstallRun::started("token", target.clone(), Utc::now());
        run.phase = InstallPhase::Failed;
        state.install = Some(run);

        let mut moved = credentials();
        moved.region = "eu-west-1".into();
        moved.access_key = "AKIA-ROTATED".into();
        state.record_credentials(moved).unwrap();
        state
            .record_cluster(ClusterSpec::new("example.org", "other", 2))
            .unwrap();

        let aimed = state.aimed_at(&target);
        assert_eq!(aimed.cluster.as_ref(), Some(&target.cluster));
        let creds = aimed.credentials.unwrap();
        assert_eq!(creds.region, "us-east-1");
        assert_eq!(creds.access_key, "AKIA-ROTATED");
        assert_eq!(state.install_target().unwrap().cluster.name, "other");
    }

    #[test]
    fn install_target_requires_complete_wizard() {
        let mut state = complete_state();
        assert_eq!(state.install_target().unwrap().region, "us-east-1");
        state.nodes = None;
        assert!(matches!(
            state.install_target(),
            Err(PortError::PreconditionFailed(_))
        ));
    }

    #[test]
    fn install_phase_defaults_to_idle() {
        assert_eq!(WizardState::default().install_phase(), InstallPhase::Idle);
    }
}
