//! AI Provider Module
//!
//! Defines the trait and types for LLM providers used by segmentation,
//! semantic expansion and dialogue implantation.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::core::{CoreError, CoreResult};

// =============================================================================
// AI Provider Trait
// =============================================================================

/// Trait for LLM providers (hosted APIs, local models, etc.)
#[async_trait]
pub trait AIProvider: Send + Sync {
    /// Returns the provider name
    fn name(&self) -> &str;

    /// Generates a completion from a prompt
    async fn complete(&self, request: CompletionRequest) -> CoreResult<CompletionResponse>;

    /// Checks if the provider is configured and usable
    fn is_available(&self) -> bool;
}

// =============================================================================
// Completion Request
// =============================================================================

/// Request for text completion
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompletionRequest {
    /// System prompt/instructions
    pub system: Option<String>,
    /// User prompt
    pub prompt: String,
    /// Maximum tokens to generate
    pub max_tokens: Option<u32>,
    /// Temperature (0.0 - 2.0)
    pub temperature: Option<f32>,
    /// Whether to return JSON
    pub json_mode: bool,
}

impl CompletionRequest {
    /// Creates a new completion request
    pub fn new(prompt: &str) -> Self {
        Self {
            system: None,
            prompt: prompt.to_string(),
            max_tokens: None,
            temperature: None,
            json_mode: false,
        }
    }

    /// Sets the system prompt
    pub fn with_system(mut self, system: &str) -> Self {
        self.system = Some(system.to_string());
        self
    }

    /// Sets the maximum tokens
    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    /// Sets the temperature
    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    /// Enables JSON mode
    pub fn with_json_mode(mut self) -> Self {
        self.json_mode = true;
        self
    }
}

// =============================================================================
// Completion Response
// =============================================================================

/// Response from text completion
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompletionResponse {
    /// Generated text
    pub text: String,
    /// Model that answered
    pub model: String,
}

// =============================================================================
// Mock Providers
// =============================================================================

/// Scriptable provider for tests and offline runs.
///
/// Queued responses are consumed first, one per call; afterwards every call
/// returns the default response. Every request is recorded.
pub struct MockAIProvider {
    name: String,
    default_response: String,
    queued: Mutex<VecDeque<CoreResult<String>>>,
    requests: Mutex<Vec<CompletionRequest>>,
    available: bool,
}

impl MockAIProvider {
    /// Creates a new mock provider
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            default_response: "Mock response".to_string(),
            queued: Mutex::new(VecDeque::new()),
            requests: Mutex::new(Vec::new()),
            available: true,
        }
    }

    /// Sets the response returned once the queue is drained
    pub fn with_response(mut self, response: &str) -> Self {
        self.default_response = response.to_string();
        self
    }

    /// Queues a one-shot response
    pub fn with_queued_response(self, response: &str) -> Self {
        self.push(Ok(response.to_string()));
        self
    }

    /// Queues a one-shot failure
    pub fn with_queued_error(self, message: &str) -> Self {
        self.push(Err(CoreError::AIRequestFailed(message.to_string())));
        self
    }

    /// Sets availability
    pub fn with_available(mut self, available: bool) -> Self {
        self.available = available;
        self
    }

    /// Requests received so far
    pub fn requests(&self) -> Vec<CompletionRequest> {
        match self.requests.lock() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    fn push(&self, item: CoreResult<String>) {
        if let Ok(mut queue) = self.queued.lock() {
            queue.push_back(item);
        }
    }
}

#[async_trait]
impl AIProvider for MockAIProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn complete(&self, request: CompletionRequest) -> CoreResult<CompletionResponse> {
        if let Ok(mut requests) = self.requests.lock() {
            requests.push(request);
        }

        if !self.available {
            return Err(CoreError::AIRequestFailed("Provider not available".to_string()));
        }

        let next = self
            .queued
            .lock()
            .ok()
            .and_then(|mut queue| queue.pop_front());

        let text = match next {
            Some(result) => result?,
            None => self.default_response.clone(),
        };

        Ok(CompletionResponse {
            text,
            model: "mock-model".to_string(),
        })
    }

    fn is_available(&self) -> bool {
        self.available
    }
}

/// Provider whose every completion fails. Counts attempts.
pub struct FailingAIProvider {
    message: String,
    calls: AtomicUsize,
}

impl FailingAIProvider {
    pub fn new(message: &str) -> Self {
        Self {
            message: message.to_string(),
            calls: AtomicUsize::new(0),
        }
    }

    /// Number of `complete` calls received
    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl AIProvider for FailingAIProvider {
    fn name(&self) -> &str {
        "failing"
    }

    async fn complete(&self, _request: CompletionRequest) -> CoreResult<CompletionResponse> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err(CoreError::AIRequestFailed(self.message.clone()))
    }

    fn is_available(&self) -> bool {
        true
    }
}

// =============================================================================
// Tests
// =============================================================================
