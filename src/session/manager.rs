use std::sync::Arc;
use std::time::{Duration, SystemTime};

use tokio::sync::{Mutex, oneshot};

use crate::buffer::SessionBuffer;
use crate::config::Config;
use crate::session::store::{SessionStore, Snapshot};
use crate::session::{ActiveSession, ExecRequest, NO_NEW_OUTPUT, Session, completed_summary, runner};

/// Active sessions older than this are force-terminated by the sweep,
/// whatever their state.
pub const HARD_ACTIVE_AGE: Duration = Duration::from_secs(24 * 60 * 60);

/// What `execute` hands back: either a live (or already finished) session, or
/// the synthetic `pid = -1` failure when no process ever existed.
#[derive(Debug)]
pub struct ExecOutcome {
    pub pid: i32,
    /// Output drained so far (everything, when the child already exited).
    pub output: String,
    /// True when the initial wait elapsed first and the child is still going.
    pub is_blocked: bool,
    /// Set only alongside `pid = -1`.
    pub failure: Option<SpawnFailure>,
}

#[derive(Debug, Clone)]
pub struct SpawnFailure {
    pub program: String,
    pub message: String,
    pub os_code: Option<i32>,
}

/// Facade over the store and the runner: spawn-and-wait, incremental reads,
/// termination, listing, and the periodic sweep. One instance per server,
/// shared by every tool handler.
pub struct SessionManager {
    store: Arc<SessionStore>,
    max_buf: usize,
    grace: Duration,
    max_age: Duration,
}

impl SessionManager {
    pub fn new(config: &Config) -> Self {
        Self {
            store: Arc::new(SessionStore::new(config.max_completed)),
            max_buf: config.max_buf,
            grace: config.sigterm_grace,
            max_age: config.max_age,
        }
    }

    /// Spawn a child and wait up to `initial_wait` for it to finish. Three
    /// first events are possible: the child exits (outcome carries all of its
    /// output), the spawn fails (synthetic `pid = -1`, nothing stored), or
    /// the timer fires first (`is_blocked = true`, the session keeps running
    /// and is observable through `read_new`). Failure is never an `Err`; it
    /// is encoded in the outcome so callers decide how to surface it.
    pub async fn execute(&self, req: ExecRequest) -> ExecOutcome {
        let mut cmd = runner::build_command(&req);
        let mut child = match cmd.spawn() {
            Ok(child) => child,
            Err(e) => {
                let program = req.command.program_name().to_string();
                tracing::warn!(program = %program, error = %e, "spawn failed");
                return ExecOutcome {
                    pid: -1,
                    output: format!("Failed to spawn {program}: {e}"),
                    is_blocked: false,
                    failure: Some(SpawnFailure {
                        program,
                        message: e.to_string(),
                        os_code: e.raw_os_error(),
                    }),
                };
            }
        };

        let Some(os_pid) = child.id() else {
            // The child reaped before we could observe a pid; nothing to
            // track, nothing stored.
            let _ = child.start_kill();
            let program = req.command.program_name().to_string();
            return ExecOutcome {
                pid: -1,
                output: format!("Failed to spawn {program}: no pid assigned"),
                is_blocked: false,
                failure: Some(SpawnFailure {
                    program,
                    message: "no pid assigned".to_string(),
                    os_code: None,
                }),
            };
        };
        let pid = os_pid as i32;

        let buffer = Arc::new(Mutex::new(SessionBuffer::new(self.max_buf)));
        // Insert before the pump starts so a child that exits instantly still
        // finds its session to finalize, and the pid is reachable the moment
        // execute returns.
        self.store
            .insert_active(Session::new(pid, buffer.clone()))
            .await;

        let (done_tx, done_rx) = oneshot::channel();
        runner::pump(self.store.clone(), pid, child, buffer.clone(), done_tx);

        let is_blocked = tokio::time::timeout(req.initial_wait, done_rx)
            .await
            .is_err();
        if is_blocked {
            self.store.mark_blocked(pid).await;
        }
        let output = buffer.lock().await.drain_new();
        ExecOutcome {
            pid,
            output,
            is_blocked,
            failure: None,
        }
    }

    /// Drain output that arrived since the last read. Active sessions yield
    /// their new bytes (or the no-new-output literal); completed sessions
    /// yield the formatted completion block; unknown pids yield `None`.
    pub async fn read_new(&self, pid: i32) -> Option<String> {
        match self.store.snapshot(pid).await? {
            Snapshot::Active { buffer } => {
                let drained = buffer.lock().await.drain_new();
                Some(if drained.is_empty() {
                    NO_NEW_OUTPUT.to_string()
                } else {
                    drained
                })
            }
            Snapshot::Completed {
                exit_code,
                runtime,
                output,
            } => Some(completed_summary(exit_code, runtime, &output)),
        }
    }

    /// Cooperative-then-forceful termination. Sends SIGTERM to the process
    /// group immediately and returns; a detached timer escalates to SIGKILL
    /// if the session is still active after the grace period. False when the
    /// pid names no active session.
    pub async fn terminate(&self, pid: i32) -> bool {
        if !self.store.is_active(pid).await {
            return false;
        }
        tracing::debug!(pid, "sending SIGTERM");
        runner::kill_group(pid, libc::SIGTERM);

        let store = self.store.clone();
        let grace = self.grace;
        tokio::spawn(async move {
            tokio::time::sleep(grace).await;
            if store.is_active(pid).await {
                tracing::debug!(pid, "still active after grace; sending SIGKILL");
                runner::kill_group(pid, libc::SIGKILL);
            }
        });
        true
    }

    pub async fn list_active(&self) -> Vec<ActiveSession> {
        self.store.list_active(SystemTime::now()).await
    }

    pub async fn find_active(&self, pid: i32) -> Option<ActiveSession> {
        self.store.active_info(pid, SystemTime::now()).await
    }

    pub async fn sweep(&self) {
        self.sweep_at(SystemTime::now()).await;
    }

    /// Sweep with an explicit clock: evict completed sessions past their TTL
    /// and terminate active ones past the hard age cap.
    pub async fn sweep_at(&self, now: SystemTime) {
        if let Some(cutoff) = now.checked_sub(self.max_age) {
            let evicted = self.store.evict_completed_before(cutoff).await;
            if evicted > 0 {
                tracing::debug!(evicted, "swept expired completed sessions");
            }
        }
        if let Some(cutoff) = now.checked_sub(HARD_ACTIVE_AGE) {
            for pid in self.store.active_started_before(cutoff).await {
                tracing::warn!(pid, "session exceeded the hard active age; terminating");
                self.terminate(pid).await;
            }
        }
    }

    /// (active, completed) counts.
    pub async fn session_counts(&self) -> (usize, usize) {
        self.store.counts().await
    }
}
