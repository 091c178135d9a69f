use thiserror::Error;

#[derive(Debug, Error)]
pub enum GaleError {
    #[error("failed to spawn {program}: {message}")]
    Spawn {
        program: String,
        message: String,
        /// Output accumulated before the failure surfaced (empty when the
        /// spawn itself failed, populated when the CLI died at startup).
        stderr: String,
    },

    #[error("Claude Code run timed out after {secs}s")]
    Timeout {
        secs: u64,
        /// stdout+stderr fragments drained before the deadline.
        partial: String,
    },
}

impl GaleError {
    /// Full message for MCP clients, including any accumulated child output.
    /// Display alone stays terse for logs.
    pub fn client_message(&self) -> String {
        match self {
            Self::Spawn { stderr, .. } if !stderr.is_empty() => {
                format!("{self}\n{stderr}")
            }
            Self::Timeout { partial, .. } if !partial.is_empty() => {
                format!("{self}\nPartial output:\n{partial}")
            }
            _ => self.to_string(),
        }
    }
}
