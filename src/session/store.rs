use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use tokio::sync::Mutex;

use crate::buffer::SessionBuffer;
use crate::session::{Session, SessionState};

/// Row returned by the active-session listing.
#[derive(Debug, Clone)]
pub struct ActiveSession {
    pub pid: i32,
    pub is_blocked: bool,
    pub runtime: Duration,
}

/// What a reader finds under a pid: an active session's shared buffer, or a
/// completed session's recorded outcome.
pub enum Snapshot {
    Active {
        buffer: Arc<Mutex<SessionBuffer>>,
    },
    Completed {
        exit_code: i32,
        runtime: Duration,
        output: String,
    },
}

/// In-memory registry of sessions, partitioned into `active` and `completed`.
/// A session lives in exactly one partition at a time; every mutation and
/// state transition happens under the single inner lock.
pub struct SessionStore {
    inner: Mutex<Partitions>,
    max_completed: usize,
}

#[derive(Default)]
struct Partitions {
    active: HashMap<i32, Session>,
    completed: HashMap<i32, Session>,
}

impl SessionStore {
    pub fn new(max_completed: usize) -> Self {
        Self {
            inner: Mutex::new(Partitions::default()),
            max_completed,
        }
    }

    /// Register a freshly spawned session. The OS may hand out a pid that an
    /// evicted-but-retained completed session still holds; the stale entry is
    /// dropped so pids stay unique across both partitions.
    pub async fn insert_active(&self, session: Session) {
        let mut inner = self.inner.lock().await;
        if inner.completed.remove(&session.pid).is_some() {
            tracing::debug!(pid = session.pid, "pid reused; dropped stale completed session");
        }
        inner.active.insert(session.pid, session);
    }

    /// Mark an active session as blocked (initial wait elapsed, child still
    /// running). No-op when the session already finished or is unknown.
    pub async fn mark_blocked(&self, pid: i32) -> bool {
        let mut inner = self.inner.lock().await;
        match inner.active.get_mut(&pid) {
            Some(session) => session.state.advance(SessionState::Blocked),
            None => false,
        }
    }

    /// Record a child's terminal state and move the session from `active` to
    /// `completed`, then enforce the completed-count cap FIFO by completion
    /// time. A pid already absent from `active` (terminated and swept while
    /// the child was going down) is simply dropped.
    ///
    /// The bounded full output is copied into the session here, still under
    /// the store lock, so the active→completed transition and the output a
    /// completed read reports are a single atomic step. The buffer lock is
    /// awaited (a concurrent read_new drain may hold it briefly); the only
    /// store→buffer lock nesting in the crate, so the order cannot invert.
    pub async fn finalize(&self, pid: i32, state: SessionState, end: SystemTime) {
        debug_assert!(state.is_terminal());
        let mut inner = self.inner.lock().await;
        let Some(mut session) = inner.active.remove(&pid) else {
            tracing::debug!(pid, "finalize for a session no longer tracked; dropping");
            return;
        };
        if !session.state.advance(state) {
            return;
        }
        session.end_time = Some(end);
        session.final_output = Some(session.buffer.lock().await.full_text().to_string());
        inner.completed.insert(pid, session);

        while inner.completed.len() > self.max_completed {
            let oldest = inner
                .completed
                .values()
                .min_by_key(|s| s.end_time)
                .map(|s| s.pid);
            match oldest {
                Some(victim) => {
                    inner.completed.remove(&victim);
                }
                None => break,
            }
        }
    }

    pub async fn is_active(&self, pid: i32) -> bool {
        self.inner.lock().await.active.contains_key(&pid)
    }

    /// Look up what `read_new` should operate on. Completed sessions report
    /// the output recorded at finalization.
    pub async fn snapshot(&self, pid: i32) -> Option<Snapshot> {
        let inner = self.inner.lock().await;
        if let Some(session) = inner.active.get(&pid) {
            return Some(Snapshot::Active {
                buffer: session.buffer.clone(),
            });
        }
        let session = inner.completed.get(&pid)?;
        Some(Snapshot::Completed {
            exit_code: session.state.exit_code().unwrap_or(-1),
            runtime: session.runtime(SystemTime::now()),
            output: session.final_output.clone().unwrap_or_default(),
        })
    }

    pub async fn active_info(&self, pid: i32, now: SystemTime) -> Option<ActiveSession> {
        let inner = self.inner.lock().await;
        inner.active.get(&pid).map(|s| ActiveSession {
            pid: s.pid,
            is_blocked: s.state.is_blocked(),
            runtime: s.runtime(now),
        })
    }

    /// All active sessions, oldest first.
    pub async fn list_active(&self, now: SystemTime) -> Vec<ActiveSession> {
        let inner = self.inner.lock().await;
        let mut rows: Vec<ActiveSession> = inner
            .active
            .values()
            .map(|s| ActiveSession {
                pid: s.pid,
                is_blocked: s.state.is_blocked(),
                runtime: s.runtime(now),
            })
            .collect();
        rows.sort_by(|a, b| b.runtime.cmp(&a.runtime));
        rows
    }

    /// Drop completed sessions whose `end_time` is before `cutoff`. Returns
    /// how many were evicted.
    pub async fn evict_completed_before(&self, cutoff: SystemTime) -> usize {
        let mut inner = self.inner.lock().await;
        let before = inner.completed.len();
        inner
            .completed
            .retain(|_, s| s.end_time.is_none_or(|end| end >= cutoff));
        before - inner.completed.len()
    }

    /// Pids of active sessions started before `cutoff`.
    pub async fn active_started_before(&self, cutoff: SystemTime) -> Vec<i32> {
        let inner = self.inner.lock().await;
        inner
            .active
            .values()
            .filter(|s| s.start_time < cutoff)
            .map(|s| s.pid)
            .collect()
    }

    /// (active, completed) sizes.
    pub async fn counts(&self) -> (usize, usize) {
        let inner = self.inner.lock().await;
        (inner.active.len(), inner.completed.len())
    }
}
