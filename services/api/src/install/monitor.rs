//! Supervision of one running provisioning subprocess.
//!
//! The monitor task owns the child. It folds progress reports into the run's
//! snapshot, enforces the deadline and records the terminal phase both in the
//! snapshot and in the session store.

use chrono::Utc;
use kuberstack_core::domain::{short_token, InstallPhase, InstallRun, InstallStatus};
use kuberstack_core::ports::{PortError, PortResult, SessionStore};
use std::collections::{HashMap, VecDeque};
use std::process::ExitStatus;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::{Child, ChildStdout};
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use super::progress::parse_progress;

/// Lines of stderr kept for diagnostics.
const STDERR_TAIL_LINES: usize = 20;
/// How long to wait for stderr to drain once the child is gone.
const STDERR_DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

//=========================================================================================
// Live Run Registry Entry
//=========================================================================================

/// The in-memory view of a session's latest run. Readers copy the snapshot;
/// only the monitor (or a teardown) replaces it.
pub struct RunSlot {
    snapshot: watch::Sender<InstallRun>,
    tearing_down: AtomicBool,
}

impl RunSlot {
    pub fn new(run: InstallRun) -> Self {
        let (snapshot, _) = watch::channel(run);
        Self {
            snapshot,
            tearing_down: AtomicBool::new(false),
        }
    }

    pub fn run(&self) -> InstallRun {
        self.snapshot.borrow().clone()
    }

    pub fn status(&self) -> InstallStatus {
        self.snapshot.borrow().status()
    }

    pub fn phase(&self) -> InstallPhase {
        self.snapshot.borrow().phase
    }

    pub fn modify(&self, f: impl FnOnce(&mut InstallRun)) {
        self.snapshot.send_modify(f);
    }

    /// Returns false if a teardown is already in progress.
    pub fn try_begin_teardown(&self) -> bool {
        self.tearing_down
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    pub fn end_teardown(&self) {
        self.tearing_down.store(false, Ordering::Release);
    }

    pub fn is_tearing_down(&self) -> bool {
        self.tearing_down.load(Ordering::Acquire)
    }
}

/// Slots of runs that still have a task attached, keyed by session token.
/// A slot leaves once its terminal state is in the session store.
#[derive(Default)]
pub struct RunRegistry {
    slots: Mutex<HashMap<String, Arc<RunSlot>>>,
}

impl RunRegistry {
    pub fn lock(&self) -> PortResult<MutexGuard<'_, HashMap<String, Arc<RunSlot>>>> {
        self.slots
            .lock()
            .map_err(|_| PortError::Unexpected("install registry lock poisoned".to_string()))
    }

    pub fn get(&self, token: &str) -> PortResult<Option<Arc<RunSlot>>> {
        Ok(self.lock()?.get(token).cloned())
    }

    /// Drops `slot` if it is still the registered one and no teardown holds it.
    pub fn release(&self, token: &str, slot: &Arc<RunSlot>) -> PortResult<()> {
        let mut slots = self.lock()?;
        if slots
            .get(token)
            .is_some_and(|current| Arc::ptr_eq(current, slot) && !current.is_tearing_down())
        {
            slots.remove(token);
        }
        Ok(())
    }
}

//=========================================================================================
// Failure Reporting
//=========================================================================================

/// A failed tool run. `summary` is safe to return to the caller; `diagnostics`
/// is kept on the run for operators.
#[derive(Debug, Clone)]
pub struct ToolFailure {
    pub summary: String,
    pub diagnostics: String,
}

impl ToolFailure {
    pub fn new(summary: impl Into<String>, stderr_tail: &str) -> Self {
        let summary = summary.into();
        let diagnostics = if stderr_tail.trim().is_empty() {
            summary.clone()
        } else {
            format!("{}\n{}", summary, stderr_tail.trim_end())
        };
        Self {
            summary,
            diagnostics,
        }
    }

    pub fn exited(status: ExitStatus, stderr_tail: &str) -> Self {
        let summary = match status.code() {
            Some(code) => format!("provisioning tool exited with code {}", code),
            None => "provisioning tool was terminated by a signal".to_string(),
        };
        Self::new(summary, stderr_tail)
    }

    pub fn timed_out(after: Duration, stderr_tail: &str) -> Self {
        Self::new(
            format!("provisioning tool timed out after {}s", after.as_secs()),
            stderr_tail,
        )
    }
}

/// Keeps the last `STDERR_TAIL_LINES` lines of `bytes`.
pub fn tail_lines(bytes: &[u8]) -> String {
    let text = String::from_utf8_lossy(bytes);
    let lines: Vec<&str> = text.lines().collect();
    let start = lines.len().saturating_sub(STDERR_TAIL_LINES);
    lines[start..].join("\n")
}

async fn collect_tail<R: AsyncRead + Unpin>(reader: R) -> String {
    let mut reader = BufReader::new(reader);
    let mut tail = VecDeque::with_capacity(STDERR_TAIL_LINES);
    let mut buf = Vec::new();
    loop {
        buf.clear();
        match reader.read_until(b'\n', &mut buf).await {
            Ok(0) => break,
            Ok(_) => {
                if tail.len() == STDERR_TAIL_LINES {
                    tail.pop_front();
                }
                tail.push_back(String::from_utf8_lossy(&buf).trim_end().to_string());
            }
            Err(e) => {
                debug!(error = %e, "Stopped reading tool stderr");
                break;
            }
        }
    }
    Vec::from(tail).join("\n")
}

/// Writes `run` into the session's wizard state. Returns false when the store
/// still holds an older run; a session that no longer exists counts as written.
pub async fn persist_run(store: &dyn SessionStore, token: &str, run: &InstallRun) -> bool {
    let result = store
        .update(token, &|state| {
            state.install = Some(run.clone());
            Ok(())
        })
        .await;
    match result {
        Ok(_) => true,
        Err(PortError::NotFound(_)) => {
            debug!(token = short_token(token), "Session gone before its run was persisted");
            true
        }
        Err(e) => {
            warn!(token = short_token(token), phase = %run.phase, error = %e, "Failed to persist install run");
            false
        }
    }
}

//=========================================================================================
// The Monitor
//=========================================================================================

pub struct Monitor {
    pub token: String,
    pub store: Arc<dyn SessionStore>,
    pub slot: Arc<RunSlot>,
    pub runs: Arc<RunRegistry>,
    pub timeout: Duration,
}

impl Monitor {
    /// Reads progress reports until stdout closes, then reaps the child.
    async fn follow(
        &self,
        stdout: Option<ChildStdout>,
        child: &mut Child,
    ) -> std::io::Result<ExitStatus> {
        if let Some(stdout) = stdout {
            let mut reader = BufReader::new(stdout);
            let mut buf = Vec::new();
            loop {
                buf.clear();
                if reader.read_until(b'\n', &mut buf).await? == 0 {
                    break;
                }
                let line = String::from_utf8_lossy(&buf);
                match parse_progress(&line) {
                    Some((completed, total)) => self.observe(completed, total).await,
                    None => debug!(line = %line.trim_end(), "Tool output"),
                }
            }
        }
        child.wait().await
    }

    async fn observe(&self, completed: u32, total: u32) {
        let changed = self.slot.snapshot.send_if_modified(|run| {
            let before = run.progress;
            run.progress.observe(completed, total);
            run.progress != before
        });
        if changed {
            let run = self.slot.run();
            debug!(token = short_token(&self.token), completed = run.progress.completed, total = run.progress.total, "Install progress");
            persist_run(self.store.as_ref(), &self.token, &run).await;
        }
    }

    async fn finish(&self, outcome: Result<(), ToolFailure>) {
        self.slot.modify(|run| {
            run.finished_at = Some(Utc::now());
            match &outcome {
                Ok(()) => {
                    run.phase = InstallPhase::Succeeded;
                    run.progress.finish();
                }
                Err(failure) => {
                    run.phase = InstallPhase::Failed;
                    run.diagnostics = Some(failure.diagnostics.clone());
                }
            }
        });
        let run = self.slot.run();
        match &outcome {
            Ok(()) => info!(token = short_token(&self.token), "Installation succeeded"),
            Err(failure) => error!(token = short_token(&self.token), reason = %failure.summary, "Installation failed"),
        }
        if persist_run(self.store.as_ref(), &self.token, &run).await {
            if let Err(e) = self.runs.release(&self.token, &self.slot) {
                error!(token = short_token(&self.token), error = %e, "Failed to release finished run");
            }
        }
    }
}

/// Drives `child` to completion or to the monitor's deadline. Runs on its own
/// task; the child is killed if this future is dropped.
pub async fn supervise(monitor: Monitor, mut child: Child) {
    let stdout = child.stdout.take();
    let stderr_task = child.stderr.take().map(|stderr| tokio::spawn(collect_tail(stderr)));

    let waited = tokio::time::timeout(monitor.timeout, monitor.follow(stdout, &mut child)).await;
    let timed_out = waited.is_err();
    if timed_out {
        if let Err(e) = child.kill().await {
            error!(token = short_token(&monitor.token), error = %e, "Failed to kill timed out provisioning tool");
        }
    }

    let stderr_tail = match stderr_task {
        Some(task) => match tokio::time::timeout(STDERR_DRAIN_TIMEOUT, task).await {
            Ok(Ok(tail)) => tail,
            Ok(Err(e)) => {
                warn!(error = %e, "Stderr reader task failed");
                String::new()
            }
            Err(_) => String::new(),
        },
        None => String::new(),
    };

    let outcome = match waited {
        Err(_) => Err(ToolFailure::timed_out(monitor.timeout, &stderr_tail)),
        Ok(Ok(status)) if status.success() => Ok(()),
        Ok(Ok(status)) => Err(ToolFailure::exited(status, &stderr_tail)),
        Ok(Err(e)) => Err(ToolFailure::new(
            format!("lost track of provisioning tool: {}", e),
            &stderr_tail,
        )),
    };
    monitor.finish(outcome).await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use kuberstack_core::domain::{ClusterSpec, InstallTarget};

    #[test]
    fn tail_keeps_last_lines() {
        let text: String = (1..=30).map(|i| format!("line {}\n", i)).collect();
        let tail = tail_lines(text.as_bytes());
        assert!(tail.starts_with("line 11"));
        assert!(tail.ends_with("line 30"));
    }

    #[test]
    fn failure_diagnostics_include_stderr() {
        let failure = ToolFailure::timed_out(Duration::from_secs(5), "waiting for dns\n");
        assert_eq!(failure.summary, "provisioning tool timed out after 5s");
        assert_eq!(
            failure.diagnostics,
            "provisioning tool timed out after 5s\nwaiting for dns"
        );

        let quiet = ToolFailure::new("nothing to say", "  ");
        assert_eq!(quiet.diagnostics, "nothing to say");
    }

    fn started() -> InstallRun {
        InstallRun::started(
            "tok",
            InstallTarget {
                cluster: ClusterSpec::new("example.com", "demo", 1),
                region: "us-east-1".into(),
            },
            Utc::now(),
        )
    }

    #[test]
    fn teardown_flag_is_exclusive() {
        let slot = RunSlot::new(started());
        assert!(slot.try_begin_teardown());
        assert!(!slot.try_begin_teardown());
        assert!(slot.is_tearing_down());
        slot.end_teardown();
        assert!(slot.try_begin_teardown());
    }

    #[test]
    fn readers_see_replaced_snapshots() {
        let slot = RunSlot::new(started());
        let before = slot.run();
        slot.modify(|run| run.progress.observe(2, 4));
        assert_eq!(before.progress.completed, 0);
        assert_eq!(slot.run().progress.completed, 2);
        assert_eq!(slot.status().total, 4);
    }

    #[test]
    fn release_keeps_newer_and_tearing_down_slots() {
        let runs = RunRegistry::default();
        let old = Arc::new(RunSlot::new(started()));
        let current = Arc::new(RunSlot::new(started()));
        runs.lock().unwrap().insert("tok".into(), Arc::clone(&current));

        runs.release("tok", &old).unwrap();
        assert!(runs.get("tok").unwrap().is_some());

        assert!(current.try_begin_teardown());
        runs.release("tok", &current).unwrap();
        assert!(runs.get("tok").unwrap().is_some());

        current.end_teardown();
        runs.release("tok", &current).unwrap();
        assert!(runs.get("tok").unwrap().is_none());
    }
}
