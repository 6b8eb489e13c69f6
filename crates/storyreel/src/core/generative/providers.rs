//! Video Generation Providers
//!
//! Abstract interface to the external text-to-video backend and a scriptable
//! mock for tests.

use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use super::video::{ClipHandle, VideoGenerationRequest};
use crate::core::{CoreError, CoreResult};

/// External video generation capability.
///
/// One call produces one clip. Implementations never retry internally; the
/// orchestrator decides when a request is re-issued.
#[async_trait]
pub trait VideoGenerationProvider: Send + Sync {
    /// Returns the provider name
    fn name(&self) -> &str;

    /// Checks if the provider is configured and reachable
    fn is_available(&self) -> bool {
        true
    }

    /// Generates one clip
    async fn generate(&self, request: &VideoGenerationRequest) -> CoreResult<ClipHandle>;
}

// ============================================================================
// Mock Provider for Testing
// ============================================================================

/// Mock provider with a per-call outcome queue
#[derive(Debug)]
pub struct MockVideoProvider {
    name: String,
    outcomes: Mutex<VecDeque<Option<CoreError>>>,
    requests: Mutex<Vec<VideoGenerationRequest>>,
    clip_bytes: Vec<u8>,
    delay: Option<Duration>,
}

impl MockVideoProvider {
    /// Creates a mock that succeeds on every call
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            outcomes: Mutex::new(VecDeque::new()),
            requests: Mutex::new(Vec::new()),
            clip_bytes: vec![0u8; 64],
            delay: None,
        }
    }

    /// Queues a successful call
    pub fn with_queued_success(self) -> Self {
        self.push(None);
        self
    }

    /// Queues a failing call
    pub fn with_queued_failure(self, error: CoreError) -> Self {
        self.push(Some(error));
        self
    }

    /// Delays every call, for timeout and abort tests
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Bytes returned as clip content
    pub fn with_clip_bytes(mut self, bytes: Vec<u8>) -> Self {
        self.clip_bytes = bytes;
        self
    }

    /// Requests received so far, in call order
    pub fn requests(&self) -> Vec<VideoGenerationRequest> {
        match self.requests.lock() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    pub fn call_count(&self) -> usize {
        self.requests().len()
    }

    fn push(&self, outcome: Option<CoreError>) {
        if let Ok(mut queue) = self.outcomes.lock() {
            queue.push_back(outcome);
        }
    }
}

#[async_trait]
impl VideoGenerationProvider for MockVideoProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn generate(&self, request: &VideoGenerationRequest) -> CoreResult<ClipHandle> {
        if let Ok(mut requests) = self.requests.lock() {
            requests.push(request.clone());
        }

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        let outcome = self
            .outcomes
            .lock()
            .ok()
            .and_then(|mut queue| queue.pop_front())
            .flatten();
        if let Some(error) = outcome {
            return Err(error);
        }

        request.validate()?;
        Ok(ClipHandle::from_bytes(
            self.clip_bytes.clone(),
            request.duration_sec,
        ))
    }
}
