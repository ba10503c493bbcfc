//! Interception wrapper over an LLM client
//!
//! [`MeteredChat`] is a drop-in stand-in for anything implementing
//! [`ChatModel`]: it times each call, runs usage extraction on the raw
//! response, and appends a record to the bound tracker, while returning the
//! underlying result unchanged. Tracking failures never surface to the
//! caller; they only degrade the accuracy of the recorded usage.

use crate::config::MeterConfig;
use crate::error::MeterResult;
use crate::extract::{self, UsageExtractor};
use crate::tracker::UsageTracker;
use crate::usage::{TokenCounts, TokenSource, UsageRecord};
use async_trait::async_trait;
use futures::Stream;
use serde::{Deserialize, Serialize};
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Instant;
use tracing::warn;


/// Role of a chat message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageRole {
    System,
    User,
    Assistant,
}

/// A single chat message
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: MessageRole,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::Assistant,
            content: content.into(),
        }
    }
}

/// A chat request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatRequest {
    /// Model to call
    pub model: String,
    /// Conversation so far
    pub messages: Vec<ChatMessage>,
}

impl ChatRequest {
    pub fn new(model: impl Into<String>, messages: Vec<ChatMessage>) -> Self {
        Self {
            model: model.into(),
            messages,
        }
    }

    fn prompt_chars(&self) -> usize {
        // Characters, not bytes: the token estimate must not inflate on
        // multi-byte content
        self.messages.iter().map(|m| m.content.chars().count()).sum()
    }
}

/// A complete (non-streaming) chat response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatResponse {
    /// Assistant content
    pub content: String,
    /// Model that produced the response, if reported
    pub model: Option<String>,
    /// Raw provider payload; usage extraction reads this
    pub raw: serde_json::Value,
}

/// One chunk of a streaming chat response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatChunk {
    /// Incremental content
    pub content: Option<String>,
    /// Raw provider payload for this chunk, if any.
    /// Usage metadata usually arrives only in the final chunk.
    pub raw: Option<serde_json::Value>,
}

impl ChatChunk {
    /// Create a content-only chunk
    pub fn content(content: impl Into<String>) -> Self {
        Self {
            content: Some(content.into()),
            raw: None,
        }
    }
}

/// Stream of chat response chunks
pub type ChatStream = Pin<Box<dyn Stream<Item = MeterResult<ChatChunk>> + Send>>;

/// The call surface shared by real LLM clients and the metering wrapper.
///
/// Call sites are agnostic to wrapping: constructing a [`MeteredChat`]
/// around a client is the only change the host application makes.
#[async_trait]
pub trait ChatModel: Send + Sync {
    /// Model identifier this client targets
    fn model_id(&self) -> &str;

    /// Single-shot chat completion
    async fn invoke(&self, request: &ChatRequest) -> MeterResult<ChatResponse>;

    /// Streaming chat completion
    async fn stream(&self, request: &ChatRequest) -> MeterResult<ChatStream>;
}

/// Metering wrapper around a [`ChatModel`].
///
/// One wrapper is constructed per logical context; several wrappers may
/// share one tracker for a session. With tracking disabled the wrapper is a
/// pure passthrough and creates no session state.
pub struct MeteredChat<C> {
    inner: C,
    tracker: Arc<UsageTracker>,
    session_id: String,
    context: String,
    extractor: Arc<dyn UsageExtractor>,
    enabled: bool,
    estimate_missing: bool,
}

impl<C: ChatModel> MeteredChat<C> {
    /// Wrap a client for one session and logical context
    pub fn new(
        inner: C,
        tracker: Arc<UsageTracker>,
        session_id: impl Into<String>,
        context: impl Into<String>,
        config: &MeterConfig,
    ) -> Self {
        Self {
            inner,
            tracker,
            session_id: session_id.into(),
            context: context.into(),
            extractor: Arc::from(extract::for_provider("generic")),
            enabled: config.enabled,
            estimate_missing: config.estimate_missing_usage,
        }
    }

    /// Use a provider-specific extraction strategy
    pub fn with_provider(mut self, provider: &str) -> Self {
        self.extractor = Arc::from(extract::for_provider(provider));
        self
    }

    /// Access the wrapped client
    pub fn inner(&self) -> &C {
        &self.inner
    }

    fn accumulator(&self, request: &ChatRequest) -> UsageAccumulator {
        UsageAccumulator::new(
            self.session_id.clone(),
            self.context.clone(),
            self.inner.model_id().to_string(),
            request.prompt_chars(),
            self.estimate_missing,
        )
    }
}

#[async_trait]
impl<C: ChatModel> ChatModel for MeteredChat<C> {
    fn model_id(&self) -> &str {
        self.inner.model_id()
    }

    async fn invoke(&self, request: &ChatRequest) -> MeterResult<ChatResponse> {
        if !self.enabled {
            return self.inner.invoke(request).await;
        }

        let mut acc = self.accumulator(request);
        let response = self.inner.invoke(request).await?;

        acc.observe_completion_chars(response.content.chars().count());
        acc.observe_payload(&response.raw);
        let record = acc.finalize(self.extractor.as_ref());
        self.tracker.record(record);

        Ok(response)
    }

    async fn stream(&self, request: &ChatRequest) -> MeterResult<ChatStream> {
        if !self.enabled {
            return self.inner.stream(request).await;
        }

        let acc = self.accumulator(request);
        let inner = self.inner.stream(request).await?;

        Ok(Box::pin(MeteredStream {
            inner,
            guard: Some(StreamGuard {
                acc,
                tracker: Arc::clone(&self.tracker),
                extractor: Arc::clone(&self.extractor),
            }),
        }))
    }
}

/// Per-call mutable accumulator for usage signals.
///
/// Finalized into exactly one immutable [`UsageRecord`] and discarded; no
/// mutable state outlives the call.
struct UsageAccumulator {
    session_id: String,
    context: String,
    model_id: String,
    started: Instant,
    prompt_chars: usize,
    completion_chars: usize,
    usage_payload: Option<serde_json::Value>,
    estimate_missing: bool,
}

impl UsageAccumulator {
    fn new(
        session_id: String,
        context: String,
        model_id: String,
        prompt_chars: usize,
        estimate_missing: bool,
    ) -> Self {
        Self {
            session_id,
            context,
            model_id,
            started: Instant::now(),
            prompt_chars,
            completion_chars: 0,
            usage_payload: None,
            estimate_missing,
        }
    }

    fn observe_completion_chars(&mut self, chars: usize) {
        self.completion_chars += chars;
    }

    /// Keep a payload only when it plausibly carries usage metadata.
    /// The key probe is O(1), so the streaming data path is never blocked.
    fn observe_payload(&mut self, raw: &serde_json::Value) {
        if extract::has_usage_signal(raw) {
            self.usage_payload = Some(raw.clone());
        }
    }

    fn observe_chunk(&mut self, chunk: &ChatChunk) {
        if let Some(ref content) = chunk.content {
            self.observe_completion_chars(content.chars().count());
        }
        if let Some(ref raw) = chunk.raw {
            self.observe_payload(raw);
        }
    }

    /// Build the one usage record for this call.
    ///
    /// Provider-supplied counts win. Without them the call is recorded with
    /// zero usage (and therefore zero cost) unless the config opted into
    /// text-length estimation.
    fn finalize(self, extractor: &dyn UsageExtractor) -> UsageRecord {
        let latency_ms = self.started.elapsed().as_millis() as u64;

        let (counts, source) = match self
            .usage_payload
            .as_ref()
            .and_then(|payload| extractor.extract(payload))
        {
            Some(counts) => (counts, TokenSource::Measured),
            None if self.estimate_missing
                && (self.prompt_chars > 0 || self.completion_chars > 0) =>
            {
                warn!(
                    model_id = %self.model_id,
                    context = %self.context,
                    "no usage metadata in response, estimating token counts from text length"
                );
                (
                    TokenCounts::new(
                        extract::estimate_tokens(self.prompt_chars),
                        extract::estimate_tokens(self.completion_chars),
                    ),
                    TokenSource::Estimated,
                )
            }
            None => {
                warn!(
                    model_id = %self.model_id,
                    context = %self.context,
                    "no usage metadata in response, recording zero usage"
                );
                (TokenCounts::default(), TokenSource::Absent)
            }
        };

        UsageRecord::new(self.session_id, self.context, self.model_id, counts, source)
            .with_latency_ms(latency_ms)
    }
}

struct StreamGuard {
    acc: UsageAccumulator,
    tracker: Arc<UsageTracker>,
    extractor: Arc<dyn UsageExtractor>,
}

impl StreamGuard {
    fn finalize(self) {
        let record = self.acc.finalize(self.extractor.as_ref());
        self.tracker.record(record);
    }
}

/// Stream wrapper that forwards chunks untouched while accumulating usage.
///
/// Exactly one record is finalized: on exhaustion, or from `Drop` when the
/// caller cancels mid-stream (best-effort partial usage beats none).
struct MeteredStream {
    inner: ChatStream,
    guard: Option<StreamGuard>,
}

impl MeteredStream {
    fn finalize(&mut self) {
        if let Some(guard) = self.guard.take() {
            guard.finalize();
        }
    }
}

impl Stream for MeteredStream {
    type Item = MeterResult<ChatChunk>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        match self.inner.as_mut().poll_next(cx) {
            Poll::Ready(Some(Ok(chunk))) => {
                if let Some(ref mut guard) = self.guard {
                    guard.acc.observe_chunk(&chunk);
                }
                Poll::Ready(Some(Ok(chunk)))
            }
            Poll::Ready(Some(Err(err))) => Poll::Ready(Some(Err(err))),
            Poll::Ready(None) => {
                self.finalize();
                Poll::Ready(None)
            }
            Poll::Pending => Poll::Pending,
        }
    }
}

impl Drop for MeteredStream {
    fn drop(&mut self) {
        // Cancellation path: record whatever partial usage was accumulated
        self.finalize();
    }
}
