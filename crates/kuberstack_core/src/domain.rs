//! crates/kuberstack_core/src/domain.rs
//!
//! Defines the pure, core data structures of the installer wizard.
//! The wizard records derive serde so the session store can persist them
//! as a single document; nothing here knows about a concrete store.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifier of a software product in the static catalog.
pub type ProductId = i64;

//=========================================================================================
// Session
//=========================================================================================

/// One user's in-progress wizard, keyed by its bearer token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub token: String,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub state: WizardState,
}

/// Shortened form of a token, safe to put in log lines.
pub fn short_token(token: &str) -> &str {
    token.get(..8).unwrap_or(token)
}

//=========================================================================================
// Wizard State
//=========================================================================================

/// Everything a session has recorded so far. The fields form a strict
/// prerequisite chain: credentials -> cluster -> nodes -> software -> install.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WizardState {
    #[serde(default)]
    pub credentials: Option<Credentials>,
    #[serde(default)]
    pub cluster: Option<ClusterSpec>,
    #[serde(default)]
    pub nodes: Option<NodesSpec>,
    #[serde(default)]
    pub software: Option<Vec<ProductId>>,
    #[serde(default)]
    pub install: Option<InstallRun>,
}

/// Cloud provider access for the provisioning tool.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credentials {
    pub access_key: String,
    pub secret_key: String,
    pub region: String,
    pub ssh_public_key: String,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("access_key", &self.access_key)
            .field("secret_key", &"<redacted>")
            .field("region", &self.region)
            .field("ssh_public_key", &self.ssh_public_key)
            .finish()
    }
}

/// The cluster identity. `bucket` names the provisioning tool's state store
/// and is derived from the domain and name when the cluster is recorded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClusterSpec {
    pub domain: String,
    pub name: String,
    pub cluster_type: i64,
    pub bucket: String,
}

impl ClusterSpec {
    pub fn new(domain: &str, name: &str, cluster_type: i64) -> Self {
        let bucket = format!("{}-{}-state", name, domain)
            .to_lowercase()
            .replace('.', "-");
        Self {
            domain: domain.to_string(),
            name: name.to_string(),
            cluster_type,
            bucket,
        }
    }

    /// Fully qualified cluster name as the provisioning tool sees it.
    pub fn fqdn(&self) -> String {
        format!("{}.{}", self.name, self.domain)
    }
}

/// Sizing of one group of nodes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeGroup {
    pub instances: u32,
    pub zones: Vec<String>,
    #[serde(default)]
    pub instance_type: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodesSpec {
    pub master: NodeGroup,
    pub workers: NodeGroup,
}

//=========================================================================================
// Install Run
//=========================================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InstallPhase {
    Idle,
    Running,
    Succeeded,
    Failed,
    TornDown,
}

impl InstallPhase {
    pub fn is_terminal(self) -> bool {
        matches!(self, InstallPhase::Succeeded | InstallPhase::Failed)
    }
}

impl fmt::Display for InstallPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            InstallPhase::Idle => "idle",
            InstallPhase::Running => "running",
            InstallPhase::Succeeded => "succeeded",
            InstallPhase::Failed => "failed",
            InstallPhase::TornDown => "torn_down",
        };
        f.write_str(name)
    }
}

/// `(total, completed)` steps reported by the provisioning tool.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstallProgress {
    pub total: u32,
    pub completed: u32,
}

impl InstallProgress {
    /// Folds a newly observed report in. Neither counter ever goes backwards.
    pub fn observe(&mut self, completed: u32, total: u32) {
        self.total = self.total.max(total);
        self.completed = self.completed.max(completed);
        if self.completed > self.total {
            self.total = self.completed;
        }
    }

    pub fn finish(&mut self) {
        self.completed = self.total;
    }
}

/// The cluster a run provisions. Teardown always aims at this identity, even
/// when the wizard steps were edited after the run failed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstallTarget {
    pub cluster: ClusterSpec,
    pub region: String,
}

/// The persisted record of one provisioning subprocess invocation.
/// The live process handle never lands here; only what an operator needs
/// to reason about the run after a restart.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstallRun {
    pub owner_token: String,
    pub target: InstallTarget,
    pub phase: InstallPhase,
    pub progress: InstallProgress,
    pub started_at: DateTime<Utc>,
    #[serde(default)]
    pub finished_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub diagnostics: Option<String>,
}

impl InstallRun {
    pub fn started(owner_token: &str, target: InstallTarget, now: DateTime<Utc>) -> Self {
        Self {
            owner_token: owner_token.to_string(),
            target,
            phase: InstallPhase::Running,
            progress: InstallProgress::default(),
            started_at: now,
            finished_at: None,
            diagnostics: None,
        }
    }

    pub fn status(&self) -> InstallStatus {
        InstallStatus {
            total: self.progress.total,
            completed: self.progress.completed,
            phase: self.phase,
        }
    }
}

/// What a status poll returns.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InstallStatus {
    pub total: u32,
    pub completed: u32,
    pub phase: InstallPhase,
}

impl InstallStatus {
    pub fn idle() -> Self {
        Self {
            total: 0,
            completed: 0,
            phase: InstallPhase::Idle,
        }
    }
}

//=========================================================================================
// Reference Data
//=========================================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Region {
    pub id: String,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClusterType {
    pub id: i64,
    pub name: String,
    pub description: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeType {
    pub id: String,
    pub name: String,
    pub cpus: u32,
    pub memory_gib: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Product {
    pub id: ProductId,
    pub name: String,
    pub description: String,
    pub tags: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bucket_is_derived_from_identity() {
        let cluster = ClusterSpec::new("Example.com", "demo", 1);
        assert_eq!(cluster.bucket, "demo-example-com-state");
        assert_eq!(cluster.fqdn(), "demo.Example.com");
    }

    #[test]
    fn progress_never_goes_backwards() {
        let mut progress = InstallProgress::default();
        progress.observe(3, 10);
        progress.observe(2, 8);
        assert_eq!(progress, InstallProgress { total: 10, completed: 3 });

        progress.observe(12, 10);
        assert_eq!(progress, InstallProgress { total: 12, completed: 12 });
    }

    #[test]
    fn credentials_debug_hides_secret() {
        let creds = Credentials {
            access_key: "AKIA".into(),
            secret_key: "very-secret".into(),
            region: "us-east-1".into(),
            ssh_public_key: "ssh-rsa AAAA".into(),
        };
        let printed = format!("{:?}", creds);
        assert!(!printed.contains("very-secret"));
        assert!(printed.contains("<redacted>"));
    }

    #[test]
    fn wizard_state_round_trips_through_json() {
        let mut state = WizardState::default();
        let cluster = ClusterSpec::new("example.com", "demo", 1);
        state.cluster = Some(cluster.clone());
        let target = InstallTarget {
            cluster,
            region: "us-east-1".into(),
        };
        state.install = Some(InstallRun::started("abc", target, Utc::now()));

        let json = serde_json::to_string(&state).unwrap();
        let back: WizardState = serde_json::from_str(&json).unwrap();
        assert_eq!(back, state);
    }

    #[test]
    fn short_token_truncates() {
        assert_eq!(short_token("0123456789abcdef"), "01234567");
        assert_eq!(short_token("abc"), "abc");
    }
}
