use std::path::PathBuf;
use std::process::Stdio;
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use tokio::io::AsyncReadExt;
use tokio::process::{Child, Command};
use tokio::sync::{Mutex, oneshot};

use crate::buffer::SessionBuffer;
use crate::session::SessionState;
use crate::session::store::SessionStore;

/// How a command line reaches the OS: through a shell, or as an exact
/// argument vector (the assistant CLI path — no shell interpolation).
#[derive(Debug, Clone)]
pub enum CommandSpec {
    Shell {
        command: String,
        shell: Option<String>,
    },
    Argv {
        program: String,
        args: Vec<String>,
    },
}

impl CommandSpec {
    pub fn program_name(&self) -> &str {
        match self {
            CommandSpec::Shell { shell, .. } => shell.as_deref().unwrap_or("/bin/sh"),
            CommandSpec::Argv { program, .. } => program,
        }
    }
}

#[derive(Debug)]
pub struct ExecRequest {
    pub command: CommandSpec,
    pub cwd: Option<PathBuf>,
    /// Environment keys removed from the child (orchestrator-mode scrub).
    pub scrub_env: Vec<String>,
    /// How long `execute` waits for the child before returning a handle.
    pub initial_wait: Duration,
}

/// Build the tokio command for a request: stdin closed, stdout/stderr piped,
/// child in its own process group so termination signals reach grandchildren.
pub(crate) fn build_command(req: &ExecRequest) -> Command {
    let mut cmd = match &req.command {
        CommandSpec::Shell { command, shell } => {
            let mut cmd = Command::new(shell.as_deref().unwrap_or("/bin/sh"));
            cmd.arg("-c").arg(command);
            cmd
        }
        CommandSpec::Argv { program, args } => {
            let mut cmd = Command::new(program);
            cmd.args(args);
            cmd
        }
    };
    cmd.stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .process_group(0);
    if let Some(dir) = &req.cwd {
        cmd.current_dir(dir);
    }
    for key in &req.scrub_env {
        cmd.env_remove(key);
    }
    cmd
}

/// Spawn the long-lived tasks for one child: two readers pumping stdout and
/// stderr into the shared buffer (merged, arrival order), and a pump that
/// joins them, waits for exit, finalizes the session through the store, and
/// fires the completion signal that `execute`'s initial-wait timer races.
pub(crate) fn pump(
    store: Arc<SessionStore>,
    pid: i32,
    mut child: Child,
    buffer: Arc<Mutex<SessionBuffer>>,
    done_tx: oneshot::Sender<()>,
) {
    let stdout = child.stdout.take();
    let stderr = child.stderr.take();

    tokio::spawn(async move {
        let mut readers = Vec::new();
        if let Some(out) = stdout {
            readers.push(read_stream(out, buffer.clone()));
        }
        if let Some(err) = stderr {
            readers.push(read_stream(err, buffer.clone()));
        }
        // Readers drain to EOF before wait(), so finalization never races a
        // late append: a completed session's output is immutable.
        for reader in readers {
            let _ = reader.await;
        }
        let state = match child.wait().await {
            Ok(status) => {
                let exit_code = status.code().unwrap_or(-1);
                tracing::debug!(pid, exit_code, "child exited");
                SessionState::Completed { exit_code }
            }
            Err(e) => {
                tracing::warn!(pid, error = %e, "failed waiting on child");
                SessionState::Failed {
                    reason: e.to_string(),
                }
            }
        };
        store.finalize(pid, state, SystemTime::now()).await;
        let _ = done_tx.send(());
    });
}

fn read_stream<R>(
    mut stream: R,
    buffer: Arc<Mutex<SessionBuffer>>,
) -> tokio::task::JoinHandle<()>
where
    R: AsyncReadExt + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut chunk = [0u8; 8192];
        // A multi-byte char can straddle a chunk boundary; its trailing bytes
        // carry over to the next read so decoding never splits a char.
        let mut carry: Vec<u8> = Vec::new();
        loop {
            match stream.read(&mut chunk).await {
                Ok(0) => break,
                Ok(n) => {
                    carry.extend_from_slice(&chunk[..n]);
                    let ready = carry.len() - incomplete_suffix_len(&carry);
                    if ready > 0 {
                        let text = String::from_utf8_lossy(&carry[..ready]).into_owned();
                        buffer.lock().await.append(&text);
                        carry.drain(..ready);
                    }
                }
                Err(e) => {
                    tracing::warn!(error = %e, "pipe read error");
                    break;
                }
            }
        }
        if !carry.is_empty() {
            // EOF mid-sequence: whatever is held back is genuinely malformed.
            let text = String::from_utf8_lossy(&carry).into_owned();
            buffer.lock().await.append(&text);
        }
    })
}

/// Length of a trailing incomplete UTF-8 sequence, 0 when the slice ends on a
/// char boundary. Only a sequence whose leader promises more bytes than are
/// present is held back; invalid bytes pass through to the lossy decoder.
fn incomplete_suffix_len(bytes: &[u8]) -> usize {
    let len = bytes.len();
    for back in 1..=3.min(len) {
        let byte = bytes[len - back];
        if byte & 0b1100_0000 == 0b1000_0000 {
            continue; // continuation byte; keep scanning for the leader
        }
        let width = match byte {
            0x00..=0x7F => 1,
            0xC0..=0xDF => 2,
            0xE0..=0xEF => 3,
            0xF0..=0xF7 => 4,
            _ => return 0,
        };
        return if width > back { back } else { 0 };
    }
    0
}

/// Signal the child's whole process group. `process_group(0)` made the child
/// its own group leader, so the negative pid addresses it and any
/// grandchildren it spawned.
pub(crate) fn kill_group(pid: i32, signal: i32) {
    unsafe {
        libc::kill(-pid, signal);
    }
}
