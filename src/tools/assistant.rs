use std::path::PathBuf;
use std::time::Duration;

use chrono::Utc;
use schemars::JsonSchema;
use serde::Deserialize;

use crate::config::Config;
use crate::error::GaleError;
use crate::response::{SessionMetadata, ToolReply};
use crate::session::{COMPLETED_PREFIX, CommandSpec, ExecRequest, NO_NEW_OUTPUT, SessionManager};

/// Opts the CLI out of interactive permission prompts.
pub const PERMISSION_FLAG: &str = "--dangerously-skip-permissions";
/// Tells the CLI a one-shot prompt follows as the next argument.
pub const PROMPT_FLAG: &str = "-p";

/// Prepended to every prompt in orchestrator mode.
pub const ORCHESTRATOR_PREAMBLE: &str = "You are running as a sub-agent inside an \
orchestrated session. Work autonomously: do not ask for confirmation, and finish \
with a concise summary of what you did.\n\n";

/// Environment keys removed from the child in orchestrator mode: the mode
/// flag itself (nested invocations must not recurse into orchestrators) and
/// the debug toggle (child debug output would pollute the merged stream).
pub const SCRUBBED_ENV_KEYS: [&str; 2] = ["ORCHESTRATOR_MODE", "DEBUG"];

/// Initial wait for a detached (`wait = false`) run: long enough to catch
/// instant startup failures, short enough to feel immediate.
const DETACHED_INITIAL_WAIT: Duration = Duration::from_secs(5);

const POLL_INTERVAL: Duration = Duration::from_secs(1);

#[derive(Debug, Deserialize, JsonSchema)]
pub struct AssistantRequest {
    /// The task for the Claude Code CLI, in natural language.
    pub prompt: String,
    /// Absolute path the CLI runs in. Falls back to the home directory when
    /// absent or not an existing directory.
    #[serde(rename = "workFolder")]
    pub work_folder: Option<String>,
    /// When true (default), block until the CLI finishes and return its
    /// output. When false, return a pid handle for read_output polling.
    #[serde(default = "default_wait")]
    pub wait: bool,
}

fn default_wait() -> bool {
    true
}

/// Pick the child's working directory: the requested folder if it exists,
/// otherwise the home directory. Both departures from "inherit the server's
/// cwd" are worth a line on the error stream.
pub fn resolve_work_folder(requested: Option<&str>) -> PathBuf {
    if let Some(dir) = requested {
        let path = PathBuf::from(dir);
        if path.is_dir() {
            tracing::warn!(dir, "running assistant in requested work folder");
            return path;
        }
        tracing::warn!(dir, "requested work folder does not exist; falling back to home");
    }
    home_dir()
}

fn home_dir() -> PathBuf {
    std::env::var("HOME").map_or_else(|_| PathBuf::from("/"), PathBuf::from)
}

/// Prepend the orchestrator preamble when the mode is on; otherwise the
/// prompt passes through untouched.
pub fn shape_prompt(orchestrator_mode: bool, prompt: &str) -> String {
    if orchestrator_mode {
        format!("{ORCHESTRATOR_PREAMBLE}{prompt}")
    } else {
        prompt.to_string()
    }
}

/// The CLI is invoked with exactly three positional arguments.
pub fn build_cli_args(prompt: String) -> Vec<String> {
    vec![PERMISSION_FLAG.to_string(), PROMPT_FLAG.to_string(), prompt]
}

pub fn scrub_keys(orchestrator_mode: bool) -> Vec<String> {
    if orchestrator_mode {
        SCRUBBED_ENV_KEYS.iter().map(|k| k.to_string()).collect()
    } else {
        Vec::new()
    }
}

/// One invocation of the external CLI, blocking or detached.
pub async fn run(
    manager: &SessionManager,
    config: &Config,
    req: AssistantRequest,
) -> Result<ToolReply, GaleError> {
    let cwd = resolve_work_folder(req.work_folder.as_deref());
    let prompt = shape_prompt(config.orchestrator_mode, &req.prompt);
    let started_at = Utc::now();

    let outcome = manager
        .execute(ExecRequest {
            command: CommandSpec::Argv {
                program: config.assistant_binary.clone(),
                args: build_cli_args(prompt),
            },
            cwd: Some(cwd),
            scrub_env: scrub_keys(config.orchestrator_mode),
            initial_wait: if req.wait {
                config.assistant_timeout
            } else {
                DETACHED_INITIAL_WAIT
            },
        })
        .await;

    if let Some(failure) = outcome.failure {
        return Err(GaleError::Spawn {
            program: failure.program,
            message: failure.message,
            stderr: outcome.output,
        });
    }

    if !req.wait {
        let text = format!(
            "Claude Code task started with PID {pid}\nInitial output:\n{output}\n\n\
             Use read_output with PID {pid} to poll for new output.",
            pid = outcome.pid,
            output = outcome.output,
        );
        return Ok(ToolReply::success(text).with_metadata(
            SessionMetadata::for_pid(outcome.pid)
                .running(outcome.is_blocked)
                .started_at(started_at),
        ));
    }

    if !outcome.is_blocked {
        return Ok(ToolReply::success(outcome.output));
    }
    poll_to_completion(manager, config, outcome.pid, outcome.output).await
}

/// Blocking branch after the initial wait elapsed: observe completion purely
/// through read_new — the drained completion block, or the session leaving
/// the store. The loop is bounded by one more assistant-timeout span; past
/// that the run is reported as timed out with whatever output accumulated.
async fn poll_to_completion(
    manager: &SessionManager,
    config: &Config,
    pid: i32,
    mut fragments: String,
) -> Result<ToolReply, GaleError> {
    let deadline = tokio::time::Instant::now() + config.assistant_timeout;
    loop {
        tokio::time::sleep(POLL_INTERVAL).await;
        match manager.read_new(pid).await {
            // Evicted while we were polling; the fragments are all we have.
            None => return Ok(ToolReply::success(fragments)),
            Some(text) => {
                if text.starts_with(COMPLETED_PREFIX) {
                    return Ok(ToolReply::success(text));
                }
                if text != NO_NEW_OUTPUT {
                    fragments.push_str(&text);
                }
            }
        }
        if tokio::time::Instant::now() >= deadline {
            return Err(GaleError::Timeout {
                secs: config.assistant_timeout.as_secs(),
                partial: fragments,
            });
        }
    }
}
