use chrono::{DateTime, Utc};
use rmcp::model::{CallToolResult, Content};
use serde::Serialize;

/// Per-session facts attached to tool replies. Serialized in camelCase to
/// match the wire vocabulary clients already parse (`pid`, `isRunning`,
/// `runtime`, `startTime`, `exitCode`).
#[derive(Debug, Default, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionMetadata {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pid: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_running: Option<bool>,
    /// Whole seconds since the session started.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub runtime: Option<u64>,
    /// ISO-8601.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start_time: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exit_code: Option<i32>,
}

impl SessionMetadata {
    pub fn for_pid(pid: i32) -> Self {
        Self {
            pid: Some(pid),
            ..Self::default()
        }
    }

    pub fn running(mut self, is_running: bool) -> Self {
        self.is_running = Some(is_running);
        self
    }

    pub fn runtime_secs(mut self, secs: u64) -> Self {
        self.runtime = Some(secs);
        self
    }

    pub fn started_at(mut self, when: DateTime<Utc>) -> Self {
        self.start_time = Some(when.to_rfc3339());
        self
    }
}

/// Uniform tool reply: a text body, an error flag, and optional session
/// metadata. Policy denials and unknown-pid lookups are error *replies*, not
/// protocol errors, so the RPC loop never sees them as failures.
#[derive(Debug)]
pub struct ToolReply {
    pub text: String,
    pub is_error: bool,
    pub metadata: Option<SessionMetadata>,
}

impl ToolReply {
    pub fn success(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            is_error: false,
            metadata: None,
        }
    }

    pub fn error(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            is_error: true,
            metadata: None,
        }
    }

    pub fn with_metadata(mut self, metadata: SessionMetadata) -> Self {
        self.metadata = Some(metadata);
        self
    }

    /// Convert to the transport result. The result object carries no open
    /// metadata slot, so populated metadata rides as a trailing JSON content
    /// item after the text body.
    pub fn into_call_tool_result(self) -> CallToolResult {
        let mut content = vec![Content::text(self.text)];
        if let Some(metadata) = &self.metadata
            && let Ok(json) = serde_json::to_string(metadata)
        {
            content.push(Content::text(json));
        }
        if self.is_error {
            CallToolResult::error(content)
        } else {
            CallToolResult::success(content)
        }
    }
}
