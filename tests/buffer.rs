//! Properties of the bounded output buffer: cap preservation, truncation
//! notice placement, and drain semantics.

use gale::buffer::{OutputBuffer, SessionBuffer, TRUNCATION_NOTICE};

// ---------------------------------------------------------------------------
// Under the cap: plain accumulation
// ---------------------------------------------------------------------------

#[test]
fn append_below_cap_keeps_everything() {
    let mut buf = OutputBuffer::new(1024);
    buf.append("hello ");
    buf.append("world");
    assert_eq!(buf.as_str(), "hello world");
    assert!(!buf.as_str().contains(TRUNCATION_NOTICE));
}

#[test]
fn drain_returns_contents_and_resets() {
    let mut buf = OutputBuffer::new(1024);
    buf.append("first");
    assert_eq!(buf.drain(), "first");
    assert!(buf.is_empty());

    buf.append("second");
    assert_eq!(buf.drain(), "second");
}

#[test]
fn drain_on_empty_is_empty() {
    let mut buf = OutputBuffer::new(1024);
    assert_eq!(buf.drain(), "");
}

// ---------------------------------------------------------------------------
// Overflow: oldest bytes discarded, notice spliced in at the head
// ---------------------------------------------------------------------------

#[test]
fn overflow_bounds_size_and_prepends_notice() {
    let max = 200;
    let mut buf = OutputBuffer::new(max);
    let payload = "x".repeat(500);
    buf.append(&payload);

    assert!(buf.len() <= max);
    assert!(buf.as_str().starts_with(TRUNCATION_NOTICE));
    // The retained tail is the most recent bytes.
    assert!(buf.as_str().ends_with("xxx"));
    assert_eq!(buf.len(), max);
}

#[test]
fn overflow_keeps_most_recent_output() {
    let max = 200;
    let mut buf = OutputBuffer::new(max);
    buf.append(&"a".repeat(300));
    buf.append("MARKER");

    assert!(buf.as_str().ends_with("MARKER"));
    assert!(buf.len() <= max);
}

#[test]
fn notice_appears_at_most_once_across_repeated_overflows() {
    let max = 200;
    let mut buf = OutputBuffer::new(max);
    for _ in 0..50 {
        buf.append(&"y".repeat(37));
    }
    assert!(buf.len() <= max);
    assert_eq!(buf.as_str().matches(TRUNCATION_NOTICE).count(), 1);
    assert!(buf.as_str().starts_with(TRUNCATION_NOTICE));
}

#[test]
fn notice_is_reemitted_after_drain_and_new_overflow() {
    let max = 200;
    let mut buf = OutputBuffer::new(max);
    buf.append(&"z".repeat(300));
    assert!(buf.as_str().starts_with(TRUNCATION_NOTICE));

    buf.drain();
    buf.append("small");
    assert!(!buf.as_str().contains(TRUNCATION_NOTICE));

    buf.append(&"w".repeat(300));
    assert_eq!(buf.as_str().matches(TRUNCATION_NOTICE).count(), 1);
}

#[test]
fn overflow_cut_lands_on_char_boundary() {
    let max = 200;
    let mut buf = OutputBuffer::new(max);
    // Multi-byte chars force the cut point to round up to a boundary.
    buf.append(&"é".repeat(400));
    assert!(buf.len() <= max);
    assert!(buf.as_str().starts_with(TRUNCATION_NOTICE));
    // Still valid UTF-8 by construction; the tail is intact chars.
    assert!(buf.as_str().ends_with('é'));
}

#[test]
fn exact_cap_does_not_truncate() {
    let max = 200;
    let mut buf = OutputBuffer::new(max);
    buf.append(&"k".repeat(max));
    assert_eq!(buf.len(), max);
    assert!(!buf.as_str().contains(TRUNCATION_NOTICE));
}

// ---------------------------------------------------------------------------
// SessionBuffer: pending drains independently of the full record
// ---------------------------------------------------------------------------

#[test]
fn session_buffer_pending_and_full_diverge_after_drain() {
    let mut buf = SessionBuffer::new(1024);
    buf.append("first ");
    assert_eq!(buf.drain_new(), "first ");

    buf.append("second");
    assert_eq!(buf.drain_new(), "second");
    assert_eq!(buf.drain_new(), "");

    // The full record still holds the whole stream.
    assert_eq!(buf.full_text(), "first second");
}

#[test]
fn session_buffer_full_record_is_bounded_while_running() {
    let max = 200;
    let mut buf = SessionBuffer::new(max);
    for _ in 0..20 {
        buf.append(&"q".repeat(100));
        buf.drain_new();
    }
    assert!(buf.full_text().len() <= max);
    assert!(buf.full_text().contains(TRUNCATION_NOTICE));
}
