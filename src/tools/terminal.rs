use std::path::PathBuf;
use std::time::Duration;

use chrono::Utc;
use schemars::JsonSchema;
use serde::Deserialize;

use crate::config::Config;
use crate::response::{SessionMetadata, ToolReply};
use crate::session::{CommandSpec, ExecRequest, SessionManager};

#[derive(Debug, Deserialize, JsonSchema)]
pub struct ExecuteCommandRequest {
    /// Shell command line to run. Checked against the allowlist first.
    pub command: String,
    /// Milliseconds to wait for completion before returning a detached
    /// handle. Defaults to the configured command timeout (30s).
    pub timeout_ms: Option<u64>,
    /// Shell that interprets the command (default /bin/sh).
    pub shell: Option<String>,
    /// Working directory for the command. Defaults to the server's.
    pub cwd: Option<String>,
    /// When false, return a handle immediately instead of waiting.
    #[serde(default = "default_wait")]
    pub wait: bool,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct ReadOutputRequest {
    /// Process ID returned by execute_command or the assistant tool.
    pub pid: i32,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct ForceTerminateRequest {
    /// Process ID of the session to terminate.
    pub pid: i32,
}

fn default_wait() -> bool {
    true
}

/// Allowlist gate, then spawn-and-wait. Rejections and spawn failures are
/// error replies; a command that outlives its wait comes back as a pid
/// handle for `read_output`.
pub async fn run_execute_command(
    manager: &SessionManager,
    config: &Config,
    req: ExecuteCommandRequest,
) -> ToolReply {
    if !config.policy.is_allowed(&req.command) {
        tracing::debug!(command = %req.command, "command rejected by allowlist");
        return ToolReply::error(format!(
            "Command not allowed: {}. Allowed prefixes can be extended via ALLOWED_COMMANDS.",
            req.command
        ));
    }

    let initial_wait = if req.wait {
        Duration::from_millis(req.timeout_ms.unwrap_or(config.cmd_timeout.as_millis() as u64))
    } else {
        Duration::ZERO
    };
    let started_at = Utc::now();
    let outcome = manager
        .execute(ExecRequest {
            command: CommandSpec::Shell {
                command: req.command,
                shell: req.shell,
            },
            cwd: req.cwd.map(PathBuf::from),
            scrub_env: Vec::new(),
            initial_wait,
        })
        .await;

    if outcome.pid == -1 {
        return ToolReply::error(outcome.output);
    }
    if outcome.is_blocked {
        let text = format!(
            "Command started with PID {pid}\nInitial output:\n{output}\n\n\
             Use read_output with PID {pid} to retrieve new output.",
            pid = outcome.pid,
            output = outcome.output,
        );
        return ToolReply::success(text).with_metadata(
            SessionMetadata::for_pid(outcome.pid)
                .running(true)
                .started_at(started_at),
        );
    }
    ToolReply::success(outcome.output)
}

/// Drain new output for a session, or report it finished / unknown.
pub async fn run_read_output(manager: &SessionManager, req: ReadOutputRequest) -> ToolReply {
    match manager.read_new(req.pid).await {
        None => ToolReply::error(format!("No session found for PID {}", req.pid)),
        Some(text) => {
            let metadata = match manager.find_active(req.pid).await {
                Some(info) => SessionMetadata::for_pid(req.pid)
                    .running(true)
                    .runtime_secs(info.runtime.as_secs()),
                None => SessionMetadata::for_pid(req.pid).running(false),
            };
            ToolReply::success(text).with_metadata(metadata)
        }
    }
}

pub async fn run_force_terminate(manager: &SessionManager, req: ForceTerminateRequest) -> ToolReply {
    let metadata = SessionMetadata::for_pid(req.pid).running(false);
    if manager.terminate(req.pid).await {
        ToolReply::success(format!(
            "Successfully initiated termination of session {}",
            req.pid
        ))
        .with_metadata(metadata)
    } else {
        ToolReply::error(format!("No active session found for PID {}", req.pid))
            .with_metadata(metadata)
    }
}

pub async fn run_list_sessions(manager: &SessionManager) -> ToolReply {
    let rows = manager.list_active().await;
    if rows.is_empty() {
        return ToolReply::success("No active sessions");
    }
    let mut text = format!("Active sessions ({}):\n", rows.len());
    for row in rows {
        text.push_str(&format!(
            "PID: {} | Runtime: {}s | State: {}\n",
            row.pid,
            row.runtime.as_secs(),
            if row.is_blocked { "blocked" } else { "running" },
        ));
    }
    ToolReply::success(text)
}
