use std::env;
use std::time::Duration;

use anyhow::{Context, bail};
use chrono::{DateTime, Utc};

use crate::policy::CommandPolicy;

/// Floor for `MAX_BUF`: the truncation notice must always fit with room for
/// a tail of real output.
const MIN_BUF: usize = 4096;

/// Process-wide settings, assembled once at startup and passed by reference.
/// No hot-reload.
#[derive(Debug, Clone)]
pub struct Config {
    /// Name (resolved via PATH) or absolute path of the Claude Code CLI.
    pub assistant_binary: String,
    pub orchestrator_mode: bool,
    pub debug: bool,
    /// Default initial wait for the raw-command tool.
    pub cmd_timeout: Duration,
    /// Default initial wait for the assistant tool when `wait = true`.
    pub assistant_timeout: Duration,
    /// Cap on retained completed sessions.
    pub max_completed: usize,
    /// Completed-session TTL.
    pub max_age: Duration,
    /// Grace between cooperative SIGTERM and forceful SIGKILL.
    pub sigterm_grace: Duration,
    pub sweep_interval: Duration,
    /// Per-session output byte cap.
    pub max_buf: usize,
    pub policy: CommandPolicy,
    pub started_at: DateTime<Utc>,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        let assistant_binary = match env::var("ASSISTANT_BINARY_NAME") {
            Ok(name) => validate_binary_name(&name).context("ASSISTANT_BINARY_NAME")?,
            Err(_) => "claude".to_string(),
        };
        if !which_exists(&assistant_binary) {
            tracing::warn!(
                binary = %assistant_binary,
                "assistant CLI not found in PATH; the assistant tool will fail until it is installed"
            );
        }

        let allow_any = env_bool("ALLOW_ALL_COMMANDS", false);
        let prefixes = match env::var("ALLOWED_COMMANDS") {
            Ok(raw) => {
                let list: Vec<String> = raw
                    .split(',')
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(str::to_string)
                    .collect();
                if list.is_empty() {
                    tracing::warn!("ALLOWED_COMMANDS set but empty; falling back to built-in list");
                    CommandPolicy::default_prefixes()
                } else {
                    list
                }
            }
            Err(_) => CommandPolicy::default_prefixes(),
        };
        if allow_any {
            tracing::warn!("ALLOW_ALL_COMMANDS is set; the command allowlist is disabled");
        }

        Ok(Config {
            assistant_binary,
            orchestrator_mode: env_bool("ORCHESTRATOR_MODE", false),
            debug: env_bool("DEBUG", false),
            cmd_timeout: env_ms("DEFAULT_CMD_TIMEOUT_MS", 30_000),
            assistant_timeout: env_ms("DEFAULT_ASSISTANT_TIMEOUT_MS", 1_800_000),
            max_completed: env_usize("MAX_COMPLETED", 100),
            max_age: env_ms("MAX_AGE_MS", 3_600_000),
            sigterm_grace: env_ms("SIGTERM_GRACE_MS", 1_000),
            sweep_interval: env_ms("SWEEP_INTERVAL_MS", 600_000),
            max_buf: env_usize("MAX_BUF", 1_048_576).max(MIN_BUF),
            policy: CommandPolicy::new(allow_any, prefixes),
            started_at: Utc::now(),
        })
    }
}

/// The CLI binary must be a bare name (resolved via PATH) or an absolute
/// path. Relative paths depend on the server's working directory, which is
/// whatever the MCP client happened to inherit, so they are rejected.
pub fn validate_binary_name(name: &str) -> anyhow::Result<String> {
    if name.is_empty() {
        bail!("binary name must not be empty");
    }
    if std::path::Path::new(name).is_absolute() {
        return Ok(name.to_string());
    }
    if name.contains('/') || name == "." || name == ".." {
        bail!("binary must be a simple name or an absolute path, got relative path: {name}");
    }
    Ok(name.to_string())
}

pub fn env_bool(key: &str, default: bool) -> bool {
    match env::var(key) {
        Ok(v) => matches!(v.trim(), "1" | "true" | "TRUE" | "True" | "yes" | "on"),
        Err(_) => default,
    }
}

pub fn env_ms(key: &str, default_ms: u64) -> Duration {
    let ms = match env::var(key) {
        Ok(v) => v.trim().parse().unwrap_or_else(|_| {
            tracing::warn!(key, value = %v, "not a valid millisecond count; using default");
            default_ms
        }),
        Err(_) => default_ms,
    };
    Duration::from_millis(ms)
}

pub fn env_usize(key: &str, default: usize) -> usize {
    match env::var(key) {
        Ok(v) => v.trim().parse().unwrap_or_else(|_| {
            tracing::warn!(key, value = %v, "not a valid count; using default");
            default
        }),
        Err(_) => default,
    }
}

/// Check if an executable exists in PATH.
fn which_exists(name: &str) -> bool {
    if std::path::Path::new(name).is_absolute() {
        return std::path::Path::new(name).exists();
    }
    std::process::Command::new("which")
        .arg(name)
        .stdout(std::process::Stdio::null())
        .stderr(std::process::Stdio::null())
        .status()
        .is_ok_and(|s| s.success())
}
