//! Usage record types
//!
//! Immutable value types describing the token consumption of one completed
//! LLM call. Records are append-only: corrections are expressed by appending
//! a new record, never by editing history.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Token counters for a single LLM call.
///
/// Counters a provider does not report default to zero rather than being
/// absent, so downstream arithmetic never has to branch on missing fields.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenCounts {
    /// Tokens in the prompt (input)
    pub prompt: u64,
    /// Tokens in the completion (output)
    pub completion: u64,
    /// Tokens read from a provider-side prompt cache
    pub cache_read: u64,
    /// Tokens written to a provider-side prompt cache
    pub cache_write: u64,
}

impl TokenCounts {
    /// Create counts with only prompt/completion tokens
    pub fn new(prompt: u64, completion: u64) -> Self {
        Self {
            prompt,
            completion,
            ..Default::default()
        }
    }

    /// Total tokens across all counters
    pub fn total(&self) -> u64 {
        self.prompt + self.completion + self.cache_read + self.cache_write
    }
}

/// Where the token counts of a record came from.
///
/// Reports carry this through so that measured data can be distinguished
/// from degraded data (missing or heuristically estimated counts).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenSource {
    /// Counts were supplied by the provider
    Measured,
    /// Counts were estimated from text length
    Estimated,
    /// No usage signal was available; all counters are zero
    Absent,
}

/// Usage record for a single completed LLM call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UsageRecord {
    /// Unique identifier
    pub id: String,
    /// Owning session
    pub session_id: String,
    /// Logical call site tag (e.g. "agent_main", "workflow_generation")
    pub context: String,
    /// Model ID as requested/returned
    pub model_id: String,
    /// Prompt tokens
    pub prompt_tokens: u64,
    /// Completion tokens
    pub completion_tokens: u64,
    /// Cache read tokens
    pub cache_read_tokens: u64,
    /// Cache write tokens
    pub cache_write_tokens: u64,
    /// Call completion time
    pub timestamp: DateTime<Utc>,
    /// Wall-clock duration of the call, if measured
    pub latency_ms: Option<u64>,
    /// Provenance of the token counts
    pub source: TokenSource,
}

impl UsageRecord {
    /// Create a new usage record from extracted token counts
    pub fn new(
        session_id: impl Into<String>,
        context: impl Into<String>,
        model_id: impl Into<String>,
        counts: TokenCounts,
        source: TokenSource,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            session_id: session_id.into(),
            context: context.into(),
            model_id: model_id.into(),
            prompt_tokens: counts.prompt,
            completion_tokens: counts.completion,
            cache_read_tokens: counts.cache_read,
            cache_write_tokens: counts.cache_write,
            timestamp: Utc::now(),
            latency_ms: None,
            source,
        }
    }

    /// Set call latency
    pub fn with_latency_ms(mut self, latency_ms: u64) -> Self {
        self.latency_ms = Some(latency_ms);
        self
    }

    /// Token counts of this record
    pub fn counts(&self) -> TokenCounts {
        TokenCounts {
            prompt: self.prompt_tokens,
            completion: self.completion_tokens,
            cache_read: self.cache_read_tokens,
            cache_write: self.cache_write_tokens,
        }
    }

    /// Total tokens across all counters
    pub fn total_tokens(&self) -> u64 {
        self.counts().total()
    }
}
