//! Session-scoped usage tracking
//!
//! The tracker owns the per-session history of usage records. It is the only
//! mutable shared state in the crate: appends from concurrent calls are
//! linearizable, and `history` returns a snapshot that never observes a
//! record mid-append.

use crate::config::MeterConfig;
use crate::usage::UsageRecord;
use chrono::Utc;
use parking_lot::RwLock;
use std::collections::HashMap;
use tracing::{debug, warn};

#[cfg(test)]
mod tests;

/// Default cap on records kept per session.
///
/// History is in-memory and unbounded growth would eventually exhaust the
/// process; past the cap appends are dropped and counted so the loss is
/// visible in reports.
pub const DEFAULT_MAX_SESSION_RECORDS: usize = 100_000;

#[derive(Debug, Default)]
struct SessionHistory {
    records: Vec<UsageRecord>,
    dropped: u64,
}

/// Append-only, concurrency-safe store of usage records keyed by session id
#[derive(Debug)]
pub struct UsageTracker {
    sessions: RwLock<HashMap<String, SessionHistory>>,
    max_session_records: Option<usize>,
}

impl UsageTracker {
    /// Create a tracker with the default per-session record cap
    pub fn new() -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            max_session_records: Some(DEFAULT_MAX_SESSION_RECORDS),
        }
    }

    /// Set the per-session record cap (`None` removes the bound)
    pub fn with_max_session_records(mut self, max: Option<usize>) -> Self {
        self.max_session_records = max;
        self
    }

    /// Create a tracker with the cap the config asks for
    pub fn from_config(config: &MeterConfig) -> Self {
        Self::new().with_max_session_records(config.max_session_records)
    }

    /// Generate a unique session id
    pub fn generate_session_id() -> String {
        let timestamp = Utc::now().format("%Y%m%d_%H%M%S");
        let unique = uuid::Uuid::new_v4().to_string();
        format!("session_{}_{}", timestamp, &unique[..8])
    }

    /// Explicitly create an empty session
    pub fn start_session(&self, session_id: impl Into<String>) {
        let mut sessions = self.sessions.write();
        sessions.entry(session_id.into()).or_default();
    }

    /// Append a record to its session's history.
    ///
    /// The session is created on first record. Returns `false` when the
    /// record was dropped because the session hit its cap; the drop is
    /// counted and surfaced through [`dropped_records`](Self::dropped_records).
    pub fn record(&self, record: UsageRecord) -> bool {
        let mut sessions = self.sessions.write();
        let history = sessions.entry(record.session_id.clone()).or_default();

        if let Some(max) = self.max_session_records {
            if history.records.len() >= max {
                history.dropped += 1;
                warn!(
                    session_id = %record.session_id,
                    dropped = history.dropped,
                    "session history cap reached, usage record dropped"
                );
                return false;
            }
        }

        debug!(
            session_id = %record.session_id,
            model_id = %record.model_id,
            context = %record.context,
            total_tokens = record.total_tokens(),
            "usage record appended"
        );
        history.records.push(record);
        true
    }

    /// Snapshot of the ordered records for a session.
    ///
    /// Returns an owned copy; the caller never aliases the live history.
    pub fn history(&self, session_id: &str) -> Vec<UsageRecord> {
        self.sessions
            .read()
            .get(session_id)
            .map(|h| h.records.clone())
            .unwrap_or_default()
    }

    /// Number of records dropped for a session due to the cap
    pub fn dropped_records(&self, session_id: &str) -> u64 {
        self.sessions
            .read()
            .get(session_id)
            .map(|h| h.dropped)
            .unwrap_or(0)
    }

    /// Clear a session's history atomically, keeping the session alive
    pub fn reset(&self, session_id: &str) {
        let mut sessions = self.sessions.write();
        if let Some(history) = sessions.get_mut(session_id) {
            history.records.clear();
            history.dropped = 0;
        }
    }

    /// Discard a session entirely
    pub fn discard(&self, session_id: &str) {
        self.sessions.write().remove(session_id);
    }

    /// Ids of all known sessions
    pub fn session_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.sessions.read().keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Number of records currently held for a session
    pub fn len(&self, session_id: &str) -> usize {
        self.sessions
            .read()
            .get(session_id)
            .map(|h| h.records.len())
            .unwrap_or(0)
    }

    /// Whether a session has no records
    pub fn is_empty(&self, session_id: &str) -> bool {
        self.len(session_id) == 0
    }
}

impl Default for UsageTracker {
    fn default() -> Self {
        Self::new()
    }
}
