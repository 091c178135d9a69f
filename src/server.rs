use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use rmcp::handler::server::router::tool::ToolRouter;
use rmcp::handler::server::wrapper::Parameters;
use rmcp::model::{CallToolResult, Implementation, ServerCapabilities, ServerInfo};
use rmcp::{ErrorData as McpError, ServerHandler, tool, tool_handler, tool_router};

use crate::config::Config;
use crate::session::SessionManager;
use crate::tools;
use crate::tools::assistant::{self, AssistantRequest};
use crate::tools::terminal::{
    self, ExecuteCommandRequest, ForceTerminateRequest, ReadOutputRequest,
};

#[derive(Clone)]
pub struct GaleServer {
    manager: Arc<SessionManager>,
    config: Arc<Config>,
    assistant_served: Arc<AtomicBool>,
    tool_router: ToolRouter<Self>,
}

#[tool_router]
impl GaleServer {
    pub fn new(config: Config) -> Self {
        let manager = Arc::new(SessionManager::new(&config));
        Self {
            manager,
            config: Arc::new(config),
            assistant_served: Arc::new(AtomicBool::new(false)),
            tool_router: Self::tool_router(),
        }
    }

    /// Shared with the sweep timer and the shutdown path in main.
    pub fn manager(&self) -> Arc<SessionManager> {
        self.manager.clone()
    }

    #[tool(
        name = "assistant",
        description = "Run the Claude Code CLI with a prompt. Blocks until the run finishes and returns its output; set wait=false to get a PID handle immediately and poll with read_output. workFolder sets the CLI's working directory (falls back to home)."
    )]
    async fn assistant(
        &self,
        Parameters(req): Parameters<AssistantRequest>,
    ) -> Result<CallToolResult, McpError> {
        tools::validate_prompt(&req.prompt).map_err(|msg| McpError::invalid_params(msg, None))?;

        match assistant::run(&self.manager, &self.config, req).await {
            Ok(reply) => {
                if !self.assistant_served.swap(true, Ordering::Relaxed) {
                    tracing::info!(
                        server = "gale",
                        version = env!("CARGO_PKG_VERSION"),
                        started_at = %self.config.started_at.to_rfc3339(),
                        "assistant tool serving"
                    );
                }
                Ok(reply.into_call_tool_result())
            }
            Err(e) => {
                tracing::warn!("assistant run failed: {e}");
                Err(McpError::internal_error(e.client_message(), None))
            }
        }
    }

    #[tool(
        name = "execute_command",
        description = "Run a shell command, subject to the command allowlist. Waits up to timeout_ms (default 30s); a command still running after that comes back as a PID handle for read_output. Set wait=false to detach immediately."
    )]
    async fn execute_command(
        &self,
        Parameters(req): Parameters<ExecuteCommandRequest>,
    ) -> Result<CallToolResult, McpError> {
        tools::validate_command(&req.command)
            .map_err(|msg| McpError::invalid_params(msg, None))?;

        let reply = terminal::run_execute_command(&self.manager, &self.config, req).await;
        Ok(reply.into_call_tool_result())
    }

    #[tool(
        name = "read_output",
        description = "Read output that arrived since the last read for a session started by execute_command or assistant. Completed sessions return their exit code, runtime, and full output."
    )]
    async fn read_output(
        &self,
        Parameters(req): Parameters<ReadOutputRequest>,
    ) -> Result<CallToolResult, McpError> {
        let reply = terminal::run_read_output(&self.manager, req).await;
        Ok(reply.into_call_tool_result())
    }

    #[tool(
        name = "force_terminate",
        description = "Terminate a running session: SIGTERM to its process group, escalating to SIGKILL after a grace period. The session's final output stays readable via read_output."
    )]
    async fn force_terminate(
        &self,
        Parameters(req): Parameters<ForceTerminateRequest>,
    ) -> Result<CallToolResult, McpError> {
        let reply = terminal::run_force_terminate(&self.manager, req).await;
        Ok(reply.into_call_tool_result())
    }

    #[tool(
        name = "list_sessions",
        description = "List active sessions with their PID, runtime, and state."
    )]
    async fn list_sessions(&self) -> Result<CallToolResult, McpError> {
        let reply = terminal::run_list_sessions(&self.manager).await;
        Ok(reply.into_call_tool_result())
    }
}

#[tool_handler]
impl ServerHandler for GaleServer {
    fn get_info(&self) -> ServerInfo {
        let mut instructions = "Gale: the Claude Code CLI as an MCP tool, on top of a \
            subprocess session manager.\n\n\
            Tools:\n\
            - `assistant`: Run the Claude Code CLI with a prompt. Blocking by default; \
            wait=false returns a PID handle.\n\
            - `execute_command`: Run an allowlisted shell command; long runs come back \
            as PID handles.\n\
            - `read_output`: Drain new output for a PID; completed sessions report exit \
            code, runtime, and full output.\n\
            - `force_terminate`: Stop a running session (SIGTERM, then SIGKILL).\n\
            - `list_sessions`: Show active sessions.\n\n\
            Long-running work: start with wait=false, then poll `read_output` until it \
            returns a block starting with \"Process completed with exit code\". \
            Completed sessions are retained for an hour."
            .to_string();
        if self.config.orchestrator_mode {
            instructions.push_str(
                "\n\nOrchestrator mode is active: prompts receive an orchestration \
                 preamble and child environments are scrubbed of the mode flag.",
            );
        }

        ServerInfo {
            server_info: Implementation {
                name: "gale".to_string(),
                version: env!("CARGO_PKG_VERSION").to_string(),
                ..Default::default()
            },
            instructions: Some(instructions),
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            ..Default::default()
        }
    }
}
