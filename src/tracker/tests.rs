use super::*;
use crate::config::MeterConfig;
use crate::usage::{TokenCounts, TokenSource, UsageRecord};
use std::sync::Arc;

fn record(session_id: &str, context: &str, prompt: u64, completion: u64) -> UsageRecord {
    UsageRecord::new(
        session_id,
        context,
        "gpt-4o",
        TokenCounts::new(prompt, completion),
        TokenSource::Measured,
    )
}

#[test]
fn test_record_and_history() {
    let tracker = UsageTracker::new();

    tracker.record(record("s1", "agent_main", 100, 50));
    tracker.record(record("s1", "tool_query", 200, 0));

    let history = tracker.history("s1");
    assert_eq!(history.len(), 2);
    assert_eq!(history[0].context, "agent_main");
    assert_eq!(history[1].context, "tool_query");
}

#[test]
fn test_history_unknown_session_is_empty() {
    let tracker = UsageTracker::new();
    assert!(tracker.history("missing").is_empty());
    assert!(tracker.is_empty("missing"));
}

#[test]
fn test_history_is_a_snapshot() {
    let tracker = UsageTracker::new();
    tracker.record(record("s1", "agent_main", 1, 1));

    let snapshot = tracker.history("s1");
    tracker.record(record("s1", "agent_main", 2, 2));

    assert_eq!(snapshot.len(), 1);
    assert_eq!(tracker.history("s1").len(), 2);
}

#[test]
fn test_sessions_are_isolated() {
    let tracker = UsageTracker::new();
    tracker.record(record("s1", "agent_main", 1, 1));
    tracker.record(record("s2", "agent_main", 2, 2));

    assert_eq!(tracker.len("s1"), 1);
    assert_eq!(tracker.len("s2"), 1);
    assert_eq!(tracker.session_ids(), vec!["s1", "s2"]);
}

#[test]
fn test_reset_clears_history() {
    let tracker = UsageTracker::new();
    tracker.record(record("s1", "agent_main", 1, 1));

    tracker.reset("s1");
    assert!(tracker.is_empty("s1"));
    // Session still exists after reset
    assert_eq!(tracker.session_ids(), vec!["s1"]);
}

#[test]
fn test_discard_removes_session() {
    let tracker = UsageTracker::new();
    tracker.record(record("s1", "agent_main", 1, 1));

    tracker.discard("s1");
    assert!(tracker.session_ids().is_empty());
}

#[test]
fn test_start_session_creates_empty_history() {
    let tracker = UsageTracker::new();
    tracker.start_session("s1");

    assert_eq!(tracker.session_ids(), vec!["s1"]);
    assert!(tracker.is_empty("s1"));
}

#[test]
fn test_record_cap_drops_and_counts() {
    let tracker = UsageTracker::new().with_max_session_records(Some(2));

    assert!(tracker.record(record("s1", "agent_main", 1, 1)));
    assert!(tracker.record(record("s1", "agent_main", 2, 2)));
    assert!(!tracker.record(record("s1", "agent_main", 3, 3)));

    assert_eq!(tracker.len("s1"), 2);
    assert_eq!(tracker.dropped_records("s1"), 1);
}

#[test]
fn test_from_config_applies_cap() {
    let config = MeterConfig {
        max_session_records: Some(1),
        ..MeterConfig::enabled()
    };
    let tracker = UsageTracker::from_config(&config);

    assert!(tracker.record(record("s1", "agent_main", 1, 1)));
    assert!(!tracker.record(record("s1", "agent_main", 2, 2)));
    assert_eq!(tracker.dropped_records("s1"), 1);
}

#[test]
fn test_generate_session_id_unique() {
    let a = UsageTracker::generate_session_id();
    let b = UsageTracker::generate_session_id();
    assert!(a.starts_with("session_"));
    assert_ne!(a, b);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_appends_lose_nothing() {
    let tracker = Arc::new(UsageTracker::new());
    let mut handles = Vec::new();

    for i in 0..8 {
        let tracker = Arc::clone(&tracker);
        handles.push(tokio::spawn(async move {
            for j in 0..50 {
                let context = format!("branch_{}", i);
                tracker.record(record("s1", &context, j, j));
            }
        }));
    }

    for handle in handles {
        handle.await.unwrap();
    }

    let history = tracker.history("s1");
    assert_eq!(history.len(), 400);

    // No duplicates: every record id is unique
    let mut ids: Vec<&str> = history.iter().map(|r| r.id.as_str()).collect();
    ids.sort();
    ids.dedup();
    assert_eq!(ids.len(), 400);
}
