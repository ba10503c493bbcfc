//! Token usage extraction from provider responses
//!
//! Providers disagree on where token counts live and what they are called:
//! OpenAI reports `usage.prompt_tokens`, Anthropic `usage.input_tokens`,
//! Gemini `usageMetadata.promptTokenCount`, Bedrock `inputTokens` or
//! `input_token_count`. Each shape is handled by one extraction strategy;
//! new providers add a strategy, not a branch in a monolithic parser.

use crate::usage::TokenCounts;
use serde_json::Value;


/// Extraction strategy for one provider response shape.
///
/// `extract` returns `None` when the payload does not carry this provider's
/// usage shape; it never fails. Callers fall back to estimation or a
/// zero-usage record.
pub trait UsageExtractor: Send + Sync {
    /// Provider this strategy understands
    fn provider(&self) -> &'static str;

    /// Extract token counts from a raw response payload
    fn extract(&self, raw: &Value) -> Option<TokenCounts>;
}

/// Select the extraction strategy for a provider identifier.
///
/// Unknown providers get the generic strategy, which probes every known
/// shape in turn.
pub fn for_provider(provider: &str) -> Box<dyn UsageExtractor> {
    match provider.to_ascii_lowercase().as_str() {
        "openai" => Box::new(OpenAiUsage),
        "anthropic" => Box::new(AnthropicUsage),
        "google" | "gemini" => Box::new(GeminiUsage),
        "bedrock" | "aws" => Box::new(BedrockUsage),
        _ => Box::new(GenericUsage),
    }
}

/// Cheap probe: does this payload plausibly carry usage metadata?
///
/// Used on the streaming path to decide whether a chunk is worth keeping
/// for finalization, so it only inspects top-level keys.
pub fn has_usage_signal(raw: &Value) -> bool {
    let Some(obj) = raw.as_object() else {
        return false;
    };
    const USAGE_KEYS: [&str; 7] = [
        "usage",
        "token_usage",
        "usageMetadata",
        "usage_metadata",
        "inputTokens",
        "input_token_count",
        "amazon-bedrock-invocationMetrics",
    ];
    USAGE_KEYS.iter().any(|key| obj.contains_key(*key))
}

/// Character-length token estimator (~4 characters per token).
///
/// Opt-in fallback for when no provider-supplied count exists; callers pass
/// character counts, not byte lengths, and records built from it are flagged
/// [`TokenSource::Estimated`](crate::usage::TokenSource).
pub fn estimate_tokens(chars: usize) -> u64 {
    (chars / 4) as u64
}

fn get_u64(value: &Value, key: &str) -> Option<u64> {
    value.get(key).and_then(Value::as_u64)
}

fn first_u64(value: &Value, keys: &[&str]) -> u64 {
    keys.iter()
        .find_map(|key| get_u64(value, key))
        .unwrap_or(0)
}

/// OpenAI chat-completions shape: `usage.prompt_tokens` /
/// `usage.completion_tokens`, cached prompt tokens under
/// `usage.prompt_tokens_details.cached_tokens`.
pub struct OpenAiUsage;

impl UsageExtractor for OpenAiUsage {
    fn provider(&self) -> &'static str {
        "openai"
    }

    fn extract(&self, raw: &Value) -> Option<TokenCounts> {
        let usage = raw.get("usage").or_else(|| raw.get("token_usage"))?;
        // Require the OpenAI field names; "usage" alone is ambiguous with
        // the Anthropic shape
        if usage.get("prompt_tokens").is_none() && usage.get("completion_tokens").is_none() {
            return None;
        }

        let cache_read = usage
            .get("prompt_tokens_details")
            .map(|details| first_u64(details, &["cached_tokens"]))
            .unwrap_or(0);

        Some(TokenCounts {
            prompt: first_u64(usage, &["prompt_tokens"]),
            completion: first_u64(usage, &["completion_tokens"]),
            cache_read,
            cache_write: 0,
        })
    }
}

/// Anthropic messages shape: `usage.input_tokens` / `usage.output_tokens`
/// with `cache_read_input_tokens` and `cache_creation_input_tokens`.
pub struct AnthropicUsage;

impl UsageExtractor for AnthropicUsage {
    fn provider(&self) -> &'static str {
        "anthropic"
    }

    fn extract(&self, raw: &Value) -> Option<TokenCounts> {
        let usage = raw.get("usage")?;
        if usage.get("input_tokens").is_none() && usage.get("output_tokens").is_none() {
            return None;
        }

        Some(TokenCounts {
            prompt: first_u64(usage, &["input_tokens"]),
            completion: first_u64(usage, &["output_tokens"]),
            cache_read: first_u64(usage, &["cache_read_input_tokens"]),
            cache_write: first_u64(usage, &["cache_creation_input_tokens"]),
        })
    }
}

/// Gemini shape: `usageMetadata.promptTokenCount` /
/// `candidatesTokenCount`, cached content under `cachedContentTokenCount`.
/// Streaming puts the same block in the last chunk.
pub struct GeminiUsage;

impl UsageExtractor for GeminiUsage {
    fn provider(&self) -> &'static str {
        "google"
    }

    fn extract(&self, raw: &Value) -> Option<TokenCounts> {
        let usage = raw
            .get("usageMetadata")
            .or_else(|| raw.get("usage_metadata"))?;

        Some(TokenCounts {
            prompt: first_u64(usage, &["promptTokenCount", "prompt_token_count"]),
            completion: first_u64(usage, &["candidatesTokenCount", "candidates_token_count"]),
            cache_read: first_u64(usage, &["cachedContentTokenCount", "cached_content_token_count"]),
            cache_write: 0,
        })
    }
}

/// Bedrock shapes: `inputTokens`/`outputTokens` (converse API),
/// `input_token_count`/`output_token_count` (invocation metrics), either at
/// the top level or nested under `usage` /
/// `amazon-bedrock-invocationMetrics`.
pub struct BedrockUsage;

impl UsageExtractor for BedrockUsage {
    fn provider(&self) -> &'static str {
        "bedrock"
    }

    fn extract(&self, raw: &Value) -> Option<TokenCounts> {
        let candidates = [
            Some(raw),
            raw.get("usage"),
            raw.get("amazon-bedrock-invocationMetrics"),
        ];

        for container in candidates.into_iter().flatten() {
            let input_keys = ["inputTokens", "input_token_count", "inputTokenCount"];
            let output_keys = ["outputTokens", "output_token_count", "outputTokenCount"];
            if input_keys.iter().any(|key| get_u64(container, key).is_some())
                || output_keys.iter().any(|key| get_u64(container, key).is_some())
            {
                return Some(TokenCounts {
                    prompt: first_u64(container, &input_keys),
                    completion: first_u64(container, &output_keys),
                    cache_read: first_u64(container, &["cacheReadInputTokens"]),
                    cache_write: first_u64(container, &["cacheWriteInputTokens"]),
                });
            }
        }
        None
    }
}

/// Generic strategy: probes every known shape in order.
///
/// The default when the provider is unknown or the host does not care to
/// name one.
pub struct GenericUsage;

impl UsageExtractor for GenericUsage {
    fn provider(&self) -> &'static str {
        "generic"
    }

    fn extract(&self, raw: &Value) -> Option<TokenCounts> {
        AnthropicUsage
            .extract(raw)
            .or_else(|| OpenAiUsage.extract(raw))
            .or_else(|| GeminiUsage.extract(raw))
            .or_else(|| BedrockUsage.extract(raw))
    }
}
