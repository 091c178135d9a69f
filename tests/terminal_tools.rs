//! Terminal tool handlers: allowlist gating, the detach-on-timeout path,
//! lifecycle replies for unknown pids, and session listing.

use std::time::Duration;

use chrono::Utc;
use gale::config::Config;
use gale::policy::CommandPolicy;
use gale::session::{COMPLETED_PREFIX, SessionManager};
use gale::tools::terminal::{
    ExecuteCommandRequest, ForceTerminateRequest, ReadOutputRequest, run_execute_command,
    run_force_terminate, run_list_sessions, run_read_output,
};

fn config_with_policy(policy: CommandPolicy) -> Config {
    Config {
        assistant_binary: "claude".to_string(),
        orchestrator_mode: false,
        debug: false,
        cmd_timeout: Duration::from_secs(30),
        assistant_timeout: Duration::from_secs(30),
        max_completed: 100,
        max_age: Duration::from_secs(3600),
        sigterm_grace: Duration::from_millis(500),
        sweep_interval: Duration::from_secs(600),
        max_buf: 1 << 20,
        policy,
        started_at: Utc::now(),
    }
}

fn open_config() -> Config {
    config_with_policy(CommandPolicy::new(true, Vec::new()))
}

fn exec_request(command: &str, timeout_ms: Option<u64>) -> ExecuteCommandRequest {
    ExecuteCommandRequest {
        command: command.to_string(),
        timeout_ms,
        shell: None,
        cwd: None,
        wait: true,
    }
}

// ---------------------------------------------------------------------------
// Allowlist gating
// ---------------------------------------------------------------------------

#[tokio::test]
async fn denied_command_is_an_error_reply_without_a_session() {
    let config = config_with_policy(CommandPolicy::new(false, CommandPolicy::default_prefixes()));
    let manager = SessionManager::new(&config);

    let reply = run_execute_command(&manager, &config, exec_request("rm -rf /", None)).await;

    assert!(reply.is_error);
    assert!(reply.text.contains("Command not allowed"));
    assert_eq!(manager.session_counts().await, (0, 0));
}

#[tokio::test]
async fn allowed_command_runs_to_completion() {
    let config = config_with_policy(CommandPolicy::new(false, CommandPolicy::default_prefixes()));
    let manager = SessionManager::new(&config);

    let reply = run_execute_command(&manager, &config, exec_request("echo hi", None)).await;

    assert!(!reply.is_error);
    assert_eq!(reply.text, "hi\n");
    assert!(reply.metadata.is_none());
}

// ---------------------------------------------------------------------------
// Timeout path: blocked handle, terminate, read the final block
// ---------------------------------------------------------------------------

#[tokio::test]
async fn command_outliving_its_timeout_returns_a_handle() {
    let config = open_config();
    let manager = SessionManager::new(&config);

    let reply =
        run_execute_command(&manager, &config, exec_request("sleep 5", Some(100))).await;

    assert!(!reply.is_error);
    assert!(reply.text.starts_with("Command started with PID "));
    let metadata = reply.metadata.expect("blocked replies carry metadata");
    assert_eq!(metadata.is_running, Some(true));
    assert!(metadata.start_time.is_some());
    let pid = metadata.pid.expect("pid in metadata");

    // Terminate, then the final block becomes readable.
    let reply = run_force_terminate(&manager, ForceTerminateRequest { pid }).await;
    assert!(!reply.is_error);
    assert!(reply.text.contains("termination"));
    assert_eq!(reply.metadata.unwrap().is_running, Some(false));

    let block = loop {
        tokio::time::sleep(Duration::from_millis(100)).await;
        let reply = run_read_output(&manager, ReadOutputRequest { pid }).await;
        assert!(!reply.is_error);
        if reply.text.starts_with(COMPLETED_PREFIX) {
            break reply;
        }
    };
    assert!(block.text.starts_with("Process completed with exit code "));
    assert_eq!(block.metadata.unwrap().is_running, Some(false));
}

#[tokio::test]
async fn detached_command_returns_immediately() {
    let config = open_config();
    let manager = SessionManager::new(&config);

    let reply = run_execute_command(
        &manager,
        &config,
        ExecuteCommandRequest {
            command: "sleep 2".to_string(),
            timeout_ms: None,
            shell: None,
            cwd: None,
            wait: false,
        },
    )
    .await;

    assert!(reply.text.starts_with("Command started with PID "));
    let pid = reply.metadata.unwrap().pid.unwrap();
    manager.terminate(pid).await;
}

// ---------------------------------------------------------------------------
// Lifecycle replies for unknown pids
// ---------------------------------------------------------------------------

#[tokio::test]
async fn read_output_for_an_unknown_pid_is_a_benign_error() {
    let config = open_config();
    let manager = SessionManager::new(&config);

    let reply = run_read_output(&manager, ReadOutputRequest { pid: 999_999 }).await;
    assert!(reply.is_error);
    assert!(reply.text.contains("No session found for PID 999999"));
}

#[tokio::test]
async fn force_terminate_for_an_unknown_pid_is_a_benign_error() {
    let config = open_config();
    let manager = SessionManager::new(&config);

    let reply = run_force_terminate(&manager, ForceTerminateRequest { pid: 999_999 }).await;
    assert!(reply.is_error);
    assert!(reply.text.contains("No active session found"));
    assert_eq!(reply.metadata.unwrap().is_running, Some(false));
}

// ---------------------------------------------------------------------------
// Listing
// ---------------------------------------------------------------------------

#[tokio::test]
async fn list_sessions_reports_idle_and_active() {
    let config = open_config();
    let manager = SessionManager::new(&config);

    let reply = run_list_sessions(&manager).await;
    assert_eq!(reply.text, "No active sessions");

    let handle =
        run_execute_command(&manager, &config, exec_request("sleep 5", Some(100))).await;
    let pid = handle.metadata.unwrap().pid.unwrap();

    let reply = run_list_sessions(&manager).await;
    assert!(reply.text.contains("Active sessions (1):"));
    assert!(reply.text.contains(&format!("PID: {pid}")));
    assert!(reply.text.contains("State: blocked"));

    manager.terminate(pid).await;
}
