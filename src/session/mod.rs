pub mod manager;
pub mod runner;
pub mod store;

use std::sync::Arc;
use std::time::{Duration, SystemTime};

use tokio::sync::Mutex;

use crate::buffer::SessionBuffer;

pub use manager::{ExecOutcome, SessionManager, SpawnFailure};
pub use runner::{CommandSpec, ExecRequest};
pub use store::{ActiveSession, SessionStore};

/// Literal returned by a read on an active session whose buffer is empty.
pub const NO_NEW_OUTPUT: &str = "No new output available";

/// Leading text of the block a read returns once a session has completed.
/// The assistant tool's poll loop keys on this to detect completion.
pub const COMPLETED_PREFIX: &str = "Process completed with exit code";

/// Lifecycle of a tracked child process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionState {
    Running,
    /// The initial-wait timer elapsed before the child exited; the process
    /// keeps running and output keeps accumulating.
    Blocked,
    Completed {
        exit_code: i32,
    },
    Failed {
        reason: String,
    },
}

impl SessionState {
    /// Apply a transition if it follows an allowed edge, returning whether it
    /// was applied. Allowed edges: Running → Blocked, and Running or Blocked
    /// into either terminal state. Terminal states never mutate again.
    pub fn advance(&mut self, next: SessionState) -> bool {
        let ok = matches!(
            (&*self, &next),
            (SessionState::Running, SessionState::Blocked)
                | (
                    SessionState::Running | SessionState::Blocked,
                    SessionState::Completed { .. } | SessionState::Failed { .. },
                )
        );
        if ok {
            *self = next;
        }
        ok
    }

    pub fn is_blocked(&self) -> bool {
        matches!(self, SessionState::Blocked)
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            SessionState::Completed { .. } | SessionState::Failed { .. }
        )
    }

    /// Exit code a terminal state reports: `-1` stands in for children that
    /// died without one (killed by signal, or the wait itself failed).
    pub fn exit_code(&self) -> Option<i32> {
        match self {
            SessionState::Completed { exit_code } => Some(*exit_code),
            SessionState::Failed { .. } => Some(-1),
            _ => None,
        }
    }
}

/// One tracked child process, keyed by its OS pid. The process handle itself
/// is owned by the runner's pump task, not the session; signalling goes
/// through the pid, which avoids a session↔task reference cycle.
#[derive(Debug)]
pub struct Session {
    pub pid: i32,
    pub buffer: Arc<Mutex<SessionBuffer>>,
    pub start_time: SystemTime,
    pub end_time: Option<SystemTime>,
    pub state: SessionState,
    /// Bounded full output, copied out of the buffer at finalization so
    /// completed reads never touch the buffer lock again.
    pub final_output: Option<String>,
}

impl Session {
    pub fn new(pid: i32, buffer: Arc<Mutex<SessionBuffer>>) -> Self {
        Self {
            pid,
            buffer,
            start_time: SystemTime::now(),
            end_time: None,
            state: SessionState::Running,
            final_output: None,
        }
    }

    pub fn runtime(&self, now: SystemTime) -> Duration {
        let end = self.end_time.unwrap_or(now);
        end.duration_since(self.start_time).unwrap_or_default()
    }
}

/// The block a read returns for a completed session.
pub fn completed_summary(exit_code: i32, runtime: Duration, full_output: &str) -> String {
    format!(
        "{COMPLETED_PREFIX} {exit_code}\nRuntime: {:.1}s\nFinal output:\n{full_output}",
        runtime.as_secs_f64()
    )
}
