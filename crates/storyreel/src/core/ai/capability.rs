//! LLM Capability
//!
//! Resolves once per segmentation call whether an LLM can be used, and wraps
//! calls with a timeout, bounded retries and JSON response extraction.

use std::sync::Arc;
use std::time::Duration;

use serde::de::DeserializeOwned;
use tracing::{debug, warn};

use super::provider::{AIProvider, CompletionRequest, CompletionResponse};
use crate::core::{CoreError, CoreResult};

// =============================================================================
// Capability
// =============================================================================

/// Whether an LLM is usable for this call
#[derive(Clone)]
pub enum LlmCapability {
    Available(Arc<dyn AIProvider>),
    Unavailable { reason: String },
}

impl LlmCapability {
    /// Resolves a capability from an optional provider
    pub fn resolve(provider: Option<Arc<dyn AIProvider>>) -> Self {
        match provider {
            Some(p) if p.is_available() => LlmCapability::Available(p),
            Some(p) => LlmCapability::Unavailable {
                reason: format!("provider '{}' is not configured", p.name()),
            },
            None => LlmCapability::Unavailable {
                reason: "no LLM provider configured".to_string(),
            },
        }
    }

    pub fn unavailable(reason: &str) -> Self {
        LlmCapability::Unavailable {
            reason: reason.to_string(),
        }
    }

    pub fn is_available(&self) -> bool {
        matches!(self, LlmCapability::Available(_))
    }

    /// Provider handle when available
    pub fn provider(&self) -> Option<&Arc<dyn AIProvider>> {
        match self {
            LlmCapability::Available(p) => Some(p),
            LlmCapability::Unavailable { .. } => None,
        }
    }
}

impl std::fmt::Debug for LlmCapability {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LlmCapability::Available(p) => write!(f, "Available({})", p.name()),
            LlmCapability::Unavailable { reason } => write!(f, "Unavailable({reason})"),
        }
    }
}

// =============================================================================
// Call Options
// =============================================================================

/// Bounds applied to every LLM call
#[derive(Clone, Debug, PartialEq)]
pub struct LlmCallOptions {
    /// Per-attempt timeout
    pub timeout: Duration,
    /// Additional attempts after the first
    pub max_retries: u32,
    pub temperature: f32,
    pub max_tokens: u32,
}

impl Default for LlmCallOptions {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            max_retries: 2,
            temperature: 0.4,
            max_tokens: 2048,
        }
    }
}

/// Completes a request with a per-attempt timeout and exponential backoff
pub async fn complete_with_retry(
    provider: &dyn AIProvider,
    request: CompletionRequest,
    options: &LlmCallOptions,
) -> CoreResult<CompletionResponse> {
    let attempts = options.max_retries.saturating_add(1);
    let mut last_error = None;

    for attempt in 0..attempts {
        let call = provider.complete(request.clone());
        let result = match tokio::time::timeout(options.timeout, call).await {
            Ok(result) => result,
            Err(_) => Err(CoreError::Timeout(format!(
                "LLM call exceeded {}ms",
                options.timeout.as_millis()
            ))),
        };

        match result {
            Ok(response) => {
                debug!("LLM call on '{}' answered by {}", provider.name(), response.model);
                return Ok(response);
            }
            Err(e) => {
                debug!(
                    "LLM attempt {}/{} on '{}' failed: {}",
                    attempt + 1,
                    attempts,
                    provider.name(),
                    e
                );
                last_error = Some(e);
                if attempt + 1 < attempts {
                    tokio::time::sleep(Duration::from_millis(100 * 2_u64.pow(attempt))).await;
                }
            }
        }
    }

    let err = last_error.unwrap_or_else(|| CoreError::Internal("Unknown error".to_string()));
    warn!("LLM call on '{}' gave up: {}", provider.name(), err);
    Err(err)
}

// =============================================================================
// JSON Extraction
// =============================================================================

/// Strips a surrounding markdown code fence, if any
pub fn extract_json_payload(text: &str) -> &str {
    let trimmed = text.trim();
    let inner = if trimmed.contains("```json") {
        trimmed
            .split("```json")
            .nth(1)
            .and_then(|s| s.split("```").next())
    } else if trimmed.contains("```") {
        trimmed.split("```").nth(1).and_then(|s| s.split("```").next())
    } else {
        None
    };
    inner.map(str::trim).unwrap_or(trimmed)
}

/// Parses a JSON payload from an LLM response, tolerating code fences
pub fn parse_json_response<T: DeserializeOwned>(text: &str) -> CoreResult<T> {
    if let Ok(value) = serde_json::from_str::<T>(text.trim()) {
        return Ok(value);
    }
    serde_json::from_str::<T>(extract_json_payload(text))
        .map_err(|e| CoreError::AIResponseInvalid(e.to_string()))
}
