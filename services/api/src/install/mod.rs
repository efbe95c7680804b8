//! services/api/src/install/mod.rs
//!
//! The Install Orchestrator: at most one provisioning run per session token,
//! observable through cheap snapshot reads, and a synchronous teardown.
//!
//! Launch and teardown run on their own tasks. A request that goes away while
//! either is in flight leaves it running to completion, so the registry and
//! the teardown flag are always settled by their owner.

pub mod monitor;
pub mod progress;

use bytes::Bytes;
use chrono::Utc;
use kuberstack_core::domain::{short_token, InstallPhase, InstallRun, InstallStatus, WizardState};
use kuberstack_core::ports::{PortError, PortResult, SessionStore};
use std::sync::Arc;
use tracing::{error, info, instrument, warn, Instrument};

use crate::adapters::provisioner::{Provisioner, ToolMode};
use crate::auth::Principal;
use monitor::{persist_run, supervise, tail_lines, Monitor, RunRegistry, RunSlot, ToolFailure};

const INTERRUPTED: &str = "interrupted by service restart";

#[derive(Clone)]
pub struct InstallOrchestrator {
    store: Arc<dyn SessionStore>,
    provisioner: Arc<Provisioner>,
    runs: Arc<RunRegistry>,
}

impl InstallOrchestrator {
    pub fn new(store: Arc<dyn SessionStore>, provisioner: Arc<Provisioner>) -> Self {
        Self {
            store,
            provisioner,
            runs: Arc::new(RunRegistry::default()),
        }
    }

    /// The latest run for the principal: live if a task still owns it,
    /// persisted otherwise.
    fn current_run(&self, principal: &Principal) -> PortResult<Option<InstallRun>> {
        Ok(match self.runs.get(principal.token())? {
            Some(slot) => Some(slot.run()),
            None => principal.state().install.clone(),
        })
    }

    /// Launches the provisioning tool for the principal's session and returns
    /// as soon as it is running.
    #[instrument(skip_all, fields(token = short_token(principal.token())))]
    pub async fn start(&self, principal: &Principal) -> PortResult<InstallStatus> {
        let token = principal.token().to_string();
        let target = principal.state().install_target()?;

        let run = InstallRun::started(&token, target, Utc::now());
        let slot = {
            let mut runs = self.runs.lock()?;
            if let Some(existing) = runs.get(&token) {
                if existing.is_tearing_down() {
                    return Err(PortError::Conflict(
                        "the cluster is being torn down".to_string(),
                    ));
                }
                reject_active(existing.phase())?;
            }
            let slot = Arc::new(RunSlot::new(run.clone()));
            runs.insert(token.clone(), Arc::clone(&slot));
            slot
        };

        let this = self.clone();
        let launch = async move { this.launch(token, run, slot).await };
        tokio::spawn(launch.in_current_span())
            .await
            .map_err(|e| PortError::Unexpected(format!("install launch task failed: {}", e)))?
    }

    async fn launch(
        &self,
        token: String,
        run: InstallRun,
        slot: Arc<RunSlot>,
    ) -> PortResult<InstallStatus> {
        // The persisted state is the authority across restarts and replicas of
        // this handler; re-check it inside the atomic update.
        let persisted = self
            .store
            .update(&token, &|state: &mut WizardState| {
                state.ensure_installable()?;
                reject_active(state.install_phase())?;
                state.install = Some(run.clone());
                Ok(())
            })
            .await;
        let session = match persisted {
            Ok(session) => session,
            Err(e) => {
                self.runs.release(&token, &slot)?;
                return Err(e);
            }
        };

        let spawned = match self
            .provisioner
            .command(&token, &session.state, ToolMode::Create)
            .await
        {
            Ok(mut command) => command.spawn().map_err(|e| {
                ToolFailure::new("provisioning tool could not be started", &e.to_string())
            }),
            Err(e) => Err(ToolFailure::new(
                "provisioning tool could not be prepared",
                &e.to_string(),
            )),
        };

        let child = match spawned {
            Ok(child) => child,
            Err(failure) => {
                error!(reason = %failure.diagnostics, "Failed to launch provisioning tool");
                slot.modify(|run| {
                    run.phase = InstallPhase::Failed;
                    run.finished_at = Some(Utc::now());
                    run.diagnostics = Some(failure.diagnostics.clone());
                });
                if persist_run(self.store.as_ref(), &token, &slot.run()).await {
                    self.runs.release(&token, &slot)?;
                }
                return Err(PortError::ExternalTool(failure.summary));
            }
        };

        info!(pid = child.id(), "Provisioning tool started");
        let status = slot.status();
        let monitor = Monitor {
            token,
            store: Arc::clone(&self.store),
            slot,
            runs: Arc::clone(&self.runs),
            timeout: self.provisioner.timeout(),
        };
        tokio::spawn(supervise(monitor, child));

        Ok(status)
    }

    /// Never waits on the subprocess.
    pub fn status(&self, principal: &Principal) -> PortResult<InstallStatus> {
        Ok(self
            .current_run(principal)?
            .map(|run| run.status())
            .unwrap_or_else(InstallStatus::idle))
    }

    /// Tears down the cluster the latest run created, whether it succeeded or
    /// failed. On success the session is gone and its token no longer resolves.
    #[instrument(skip_all, fields(token = short_token(principal.token())))]
    pub async fn vanish(&self, principal: &Principal) -> PortResult<()> {
        let token = principal.token().to_string();
        let slot = {
            let mut runs = self.runs.lock()?;
            let slot = match runs.get(&token) {
                Some(slot) => Arc::clone(slot),
                None => {
                    let run = principal.state().install.clone().ok_or_else(|| {
                        PortError::Conflict("nothing has been installed yet".to_string())
                    })?;
                    Arc::new(RunSlot::new(run))
                }
            };
            if !slot.phase().is_terminal() {
                return Err(PortError::Conflict(format!(
                    "cannot vanish while the installation is {}",
                    slot.phase()
                )));
            }
            if !slot.try_begin_teardown() {
                return Err(PortError::Conflict(
                    "a teardown is already in progress".to_string(),
                ));
            }
            runs.entry(token.clone())
                .or_insert_with(|| Arc::clone(&slot));
            slot
        };

        let this = self.clone();
        let state = principal.state().clone();
        let teardown = async move { this.finish_vanish(token, state, slot).await };
        tokio::spawn(teardown.in_current_span())
            .await
            .map_err(|e| PortError::Unexpected(format!("teardown task failed: {}", e)))?
    }

    async fn finish_vanish(
        &self,
        token: String,
        state: WizardState,
        slot: Arc<RunSlot>,
    ) -> PortResult<()> {
        let target = slot.run().target;
        match self.teardown(&token, &state.aimed_at(&target)).await {
            Ok(()) => {
                slot.modify(|run| {
                    run.phase = InstallPhase::TornDown;
                    run.finished_at = Some(Utc::now());
                });
                slot.end_teardown();
                self.runs.release(&token, &slot)?;
                self.store.delete(&token).await?;
                self.provisioner.remove_work_dir(&token).await;
                info!(cluster = %target.cluster.fqdn(), "Cluster torn down and session closed");
                Ok(())
            }
            Err(failure) => {
                error!(reason = %failure.diagnostics, "Teardown failed");
                slot.modify(|run| {
                    run.phase = InstallPhase::Failed;
                    run.finished_at = Some(Utc::now());
                    run.diagnostics = Some(failure.diagnostics.clone());
                });
                let persisted = persist_run(self.store.as_ref(), &token, &slot.run()).await;
                slot.end_teardown();
                if persisted {
                    self.runs.release(&token, &slot)?;
                }
                Err(PortError::ExternalTool(failure.summary))
            }
        }
    }

    async fn teardown(&self, token: &str, state: &WizardState) -> Result<(), ToolFailure> {
        let mut command = self
            .provisioner
            .command(token, state, ToolMode::Delete)
            .await
            .map_err(|e| ToolFailure::new("teardown could not be prepared", &e.to_string()))?;
        let child = command
            .spawn()
            .map_err(|e| ToolFailure::new("teardown could not be started", &e.to_string()))?;

        let timeout = self.provisioner.timeout();
        // Dropping the output future on timeout drops the child, which kills it.
        match tokio::time::timeout(timeout, child.wait_with_output()).await {
            Err(_) => Err(ToolFailure::timed_out(timeout, "")),
            Ok(Err(e)) => Err(ToolFailure::new(
                "lost track of teardown process",
                &e.to_string(),
            )),
            Ok(Ok(output)) if output.status.success() => Ok(()),
            Ok(Ok(output)) => Err(ToolFailure::exited(
                output.status,
                &tail_lines(&output.stderr),
            )),
        }
    }

    /// The kubeconfig produced by a successful install.
    pub async fn kubeconfig(&self, principal: &Principal) -> PortResult<Bytes> {
        let phase = self
            .current_run(principal)?
            .map(|run| run.phase)
            .unwrap_or(InstallPhase::Idle);
        if phase != InstallPhase::Succeeded {
            return Err(PortError::NotReady(format!(
                "kubeconfig is available once the installation succeeds (currently {})",
                phase
            )));
        }

        let path = self.provisioner.kubeconfig_path(principal.token());
        match tokio::fs::read(&path).await {
            Ok(contents) => Ok(Bytes::from(contents)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                warn!(path = %path.display(), "Installed cluster has no kubeconfig");
                Err(PortError::NotReady(
                    "the provisioning tool did not produce a kubeconfig".to_string(),
                ))
            }
            Err(e) => Err(PortError::Unexpected(format!(
                "cannot read {}: {}",
                path.display(),
                e
            ))),
        }
    }

    /// Marks runs left `Running` by a previous process as failed. Their
    /// process handles died with that process.
    pub async fn reconcile_interrupted(&self) -> PortResult<usize> {
        let mut reconciled = 0;
        for session in self.store.list_live().await? {
            if session.state.install_phase() != InstallPhase::Running
                || self.runs.get(&session.token)?.is_some()
            {
                continue;
            }
            let now = Utc::now();
            let result = self
                .store
                .update(&session.token, &|state: &mut WizardState| {
                    if let Some(run) = state.install.as_mut() {
                        if run.phase == InstallPhase::Running {
                            run.phase = InstallPhase::Failed;
                            run.finished_at = Some(now);
                            run.diagnostics = Some(INTERRUPTED.to_string());
                        }
                    }
                    Ok(())
                })
                .await;
            match result {
                Ok(_) => {
                    warn!(token = short_token(&session.token), "Marked interrupted installation as failed");
                    reconciled += 1;
                }
                Err(PortError::NotFound(_)) => {}
                Err(e) => return Err(e),
            }
        }
        Ok(reconciled)
    }
}

fn reject_active(phase: InstallPhase) -> PortResult<()> {
    match phase {
        InstallPhase::Running => Err(PortError::Conflict(
            "an installation is already running".to_string(),
        )),
        InstallPhase::Succeeded => Err(PortError::Conflict(
            "the cluster is already installed; vanish it first".to_string(),
        )),
        _ => Ok(()),
    }
}
