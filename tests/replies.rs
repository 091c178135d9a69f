//! Reply shaping: metadata serialization and the fixed session text blocks.

use std::time::Duration;

use gale::response::{SessionMetadata, ToolReply};
use gale::session::{COMPLETED_PREFIX, NO_NEW_OUTPUT, completed_summary};

// ---------------------------------------------------------------------------
// SessionMetadata wire shape
// ---------------------------------------------------------------------------

#[test]
fn metadata_serializes_camel_case() {
    let meta = SessionMetadata::for_pid(4242)
        .running(true)
        .runtime_secs(7)
        .started_at(chrono::Utc::now());
    let json = serde_json::to_value(&meta).unwrap();

    assert_eq!(json["pid"], 4242);
    assert_eq!(json["isRunning"], true);
    assert_eq!(json["runtime"], 7);
    assert!(json["startTime"].is_string());
}

#[test]
fn metadata_skips_unset_fields() {
    let meta = SessionMetadata::for_pid(1);
    let json = serde_json::to_value(&meta).unwrap();

    assert_eq!(json["pid"], 1);
    assert!(json.get("isRunning").is_none());
    assert!(json.get("runtime").is_none());
    assert!(json.get("startTime").is_none());
    assert!(json.get("exitCode").is_none());
}

#[test]
fn start_time_is_iso8601() {
    let meta = SessionMetadata::for_pid(1).started_at(chrono::Utc::now());
    let raw = meta.start_time.unwrap();
    assert!(chrono::DateTime::parse_from_rfc3339(&raw).is_ok());
}

// ---------------------------------------------------------------------------
// ToolReply construction
// ---------------------------------------------------------------------------

#[test]
fn success_and_error_replies_carry_the_flag() {
    let ok = ToolReply::success("done");
    assert!(!ok.is_error);
    assert_eq!(ok.text, "done");
    assert!(ok.metadata.is_none());

    let err = ToolReply::error("nope");
    assert!(err.is_error);
    assert_eq!(err.text, "nope");
}

#[test]
fn with_metadata_attaches_session_facts() {
    let reply = ToolReply::success("started").with_metadata(SessionMetadata::for_pid(99));
    assert_eq!(reply.metadata.unwrap().pid, Some(99));
}

// ---------------------------------------------------------------------------
// Fixed text blocks
// ---------------------------------------------------------------------------

#[test]
fn completed_summary_has_the_documented_shape() {
    let block = completed_summary(0, Duration::from_millis(1234), "hi\n");
    assert_eq!(
        block,
        "Process completed with exit code 0\nRuntime: 1.2s\nFinal output:\nhi\n"
    );
    assert!(block.starts_with(COMPLETED_PREFIX));
}

#[test]
fn completed_summary_reports_nonzero_and_signal_exits() {
    let block = completed_summary(3, Duration::from_secs(2), "");
    assert!(block.starts_with("Process completed with exit code 3\n"));

    // Signal-killed children have no exit code; -1 stands in.
    let killed = completed_summary(-1, Duration::from_secs(1), "");
    assert!(killed.starts_with("Process completed with exit code -1\n"));
}

#[test]
fn no_new_output_literal_is_stable() {
    // Pollers and humans both match on this exact string.
    assert_eq!(NO_NEW_OUTPUT, "No new output available");
}
