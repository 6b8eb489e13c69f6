//! Sequential Run Loop
//!
//! Owns one run over a shared segment collection. Each public entry point
//! (`start`, `retry`, `skip`) drives the loop until the run completes, is
//! aborted, or halts on a failed segment.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use super::{AbortHandle, OrchestratorConfig, RunEvent, RunState, RunSummary};
use crate::core::{
    continuity::ContinuityExtractor,
    cost::{credits_for_segment, CostBreakdown, CreditGate, FeatureSet},
    generative::{ClipHandle, ClipStorage, VideoGenerationProvider, VideoGenerationRequest},
    new_id, now_rfc3339,
    segments::{GenerationState, Segment, SharedSegments},
    CoreError, CoreResult, SegmentId,
};

/// Bookkeeping for the active run
#[derive(Debug, Default)]
struct RunBook {
    summary: RunSummary,
    /// Segments the cursor has passed (completed or skipped)
    processed: HashSet<SegmentId>,
    /// Last request issued per segment, re-sent verbatim on retry
    requests: HashMap<SegmentId, VideoGenerationRequest>,
    /// Operator retries used per segment
    retries: HashMap<SegmentId, u32>,
}

/// Drives sequential clip generation over a segment collection
pub struct GenerationOrchestrator {
    segments: SharedSegments,
    provider: Arc<dyn VideoGenerationProvider>,
    storage: Arc<dyn ClipStorage>,
    extractor: ContinuityExtractor,
    config: OrchestratorConfig,
    features: FeatureSet,
    state: RunState,
    book: Option<RunBook>,
    abort: AbortHandle,
    /// Event sender
    event_tx: mpsc::UnboundedSender<RunEvent>,
    /// Event receiver
    event_rx: Option<mpsc::UnboundedReceiver<RunEvent>>,
}

impl GenerationOrchestrator {
    pub fn new(
        segments: SharedSegments,
        provider: Arc<dyn VideoGenerationProvider>,
        storage: Arc<dyn ClipStorage>,
        extractor: ContinuityExtractor,
        config: OrchestratorConfig,
    ) -> Self {
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let features = FeatureSet {
            continuity: config.continuity_enabled,
            ..FeatureSet::none()
        };
        Self {
            segments,
            provider,
            storage,
            extractor,
            config,
            features,
            state: RunState::Idle,
            book: None,
            abort: AbortHandle::new(),
            event_tx,
            event_rx: Some(event_rx),
        }
    }

    /// Sets the billed feature set. Continuity follows the config.
    pub fn with_features(mut self, features: FeatureSet) -> Self {
        self.features = FeatureSet {
            continuity: self.config.continuity_enabled,
            ..features
        };
        self
    }

    /// Takes the event receiver (only once)
    pub fn take_event_receiver(&mut self) -> Option<mpsc::UnboundedReceiver<RunEvent>> {
        self.event_rx.take()
    }

    /// Handle that can request an abort from another task
    pub fn abort_handle(&self) -> AbortHandle {
        self.abort.clone()
    }

    pub fn state(&self) -> &RunState {
        &self.state
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    /// Summary of the current or last run
    pub fn summary(&self) -> Option<&RunSummary> {
        self.book.as_ref().map(|b| &b.summary)
    }

    // =========================================================================
    // Preflight
    // =========================================================================

    /// Validates the collection and the cost gate without side effects
    pub async fn preflight(&self, gate: &CreditGate) -> CoreResult<CostBreakdown> {
        let features = self.features;
        let (enabled, non_positive, breakdown) = self
            .segments
            .read(|c| {
                let enabled = c.summary().enabled_count;
                let non_positive = c
                    .enabled_segments()
                    .any(|s| !s.duration.is_finite() || s.duration <= 0.0);
                (enabled, non_positive, CostBreakdown::for_collection(c, features))
            })
            .await;

        if enabled == 0 {
            return Err(CoreError::NothingToGenerate);
        }
        if non_positive || breakdown.total_duration_sec <= 0.0 {
            return Err(CoreError::ZeroDuration);
        }
        gate.check(&breakdown)?;
        Ok(breakdown)
    }

    // =========================================================================
    // Operator Actions
    // =========================================================================

    /// Starts a run and drives it until it completes, halts or is aborted
    pub async fn start(&mut self, gate: &CreditGate) -> CoreResult<RunState> {
        if matches!(self.state, RunState::Running | RunState::HaltedOnError { .. }) {
            return Err(CoreError::RunAlreadyActive);
        }

        let breakdown = self.preflight(gate).await?;
        self.segments.write(|c| c.begin_run()).await?;

        let run_id = new_id();
        info!(
            "Starting run {}: {} segments, {:.1}s, {} credits",
            run_id, breakdown.segment_count, breakdown.total_duration_sec, breakdown.total_tokens
        );

        self.abort.reset();
        self.book = Some(RunBook {
            summary: RunSummary {
                run_id,
                started_at: now_rfc3339(),
                ..RunSummary::default()
            },
            ..RunBook::default()
        });
        self.state = RunState::Running;
        self.drive_guarded().await
    }

    /// Re-issues the identical request for the halted segment
    pub async fn retry(&mut self) -> CoreResult<RunState> {
        let segment_id = self.halted_segment()?;
        let max_retries = self.config.max_retries_per_segment;
        let book = self.book_mut()?;

        let used = book.retries.get(&segment_id).copied().unwrap_or(0);
        if used >= max_retries {
            return Err(CoreError::RetryLimitExceeded {
                segment_id,
                attempts: used + 1,
            });
        }
        let recorded = book.requests.get(&segment_id).cloned();
        book.retries.insert(segment_id.clone(), used + 1);

        info!("Retrying segment {} (retry {}/{})", segment_id, used + 1, max_retries);
        let request = match recorded {
            Some(request) => request,
            None => {
                // Rejected before any call: rebuild from the segment as edited since
                let segment = self
                    .segments
                    .segment(&segment_id)
                    .await
                    .ok_or_else(|| CoreError::SegmentNotFound(segment_id.clone()))?;
                match self.prepare_request(&segment).await {
                    Ok(request) => request,
                    Err(state) => return Ok(state),
                }
            }
        };
        self.set_segment_state(&segment_id, GenerationState::Queued)
            .await?;
        self.state = RunState::Running;

        match self.generate_segment(&segment_id, request, used + 2).await {
            Ok(()) => self.drive_guarded().await,
            Err(state) => Ok(state),
        }
    }

    /// Leaves the halted segment failed and continues with the next one
    pub async fn skip(&mut self) -> CoreResult<RunState> {
        let segment_id = self.halted_segment()?;
        {
            let book = self.book_mut()?;
            book.processed.insert(segment_id.clone());
            book.summary.skipped += 1;
        }

        info!("Skipping failed segment {}", segment_id);
        self.emit(RunEvent::SegmentSkipped {
            segment_id: segment_id.clone(),
        });
        self.emit_progress().await;
        self.state = RunState::Running;
        self.drive_guarded().await
    }

    /// Ends a halted run. A running run is stopped through [`AbortHandle`].
    pub async fn abort(&mut self) -> RunState {
        self.abort.abort();
        if self.state.is_halted() {
            self.finish(RunState::Aborted).await;
        }
        self.state.clone()
    }

    // =========================================================================
    // Loop
    // =========================================================================

    async fn drive_guarded(&mut self) -> CoreResult<RunState> {
        match self.drive().await {
            Ok(state) => Ok(state),
            Err(e) => {
                warn!("Run stopped on internal error: {}", e);
                self.finish(RunState::Aborted).await;
                Err(e)
            }
        }
    }

    async fn drive(&mut self) -> CoreResult<RunState> {
        loop {
            if self.abort.is_aborted() {
                info!("Run aborted");
                self.finish(RunState::Aborted).await;
                return Ok(self.state.clone());
            }

            let Some(segment) = self.next_segment().await? else {
                self.finish(RunState::Completed).await;
                return Ok(self.state.clone());
            };

            if segment.generation_state.is_completed() {
                // Finished by an earlier run
                let book = self.book_mut()?;
                book.processed.insert(segment.id.clone());
                book.summary.completed += 1;
                continue;
            }

            self.segments.write(|c| c.hold_segment(&segment.id)).await;
            let request = match self.prepare_request(&segment).await {
                Ok(request) => request,
                Err(state) => return Ok(state),
            };
            self.set_segment_state(&segment.id, GenerationState::Queued)
                .await?;

            if let Err(state) = self.generate_segment(&segment.id, request, 1).await {
                return Ok(state);
            }
        }
    }

    /// First enabled segment, in order, the cursor has not passed
    async fn next_segment(&self) -> CoreResult<Option<Segment>> {
        let book = self
            .book
            .as_ref()
            .ok_or_else(|| CoreError::Internal("No active run".to_string()))?;
        let processed = &book.processed;
        Ok(self
            .segments
            .read(|c| {
                c.enabled_segments()
                    .find(|s| !processed.contains(&s.id))
                    .cloned()
            })
            .await)
    }

    async fn build_request(&self, segment: &Segment) -> VideoGenerationRequest {
        let mut request =
            VideoGenerationRequest::new(&segment.text, segment.duration, segment.generation_name());
        if !self.config.continuity_enabled {
            return request;
        }

        let frame = self
            .segments
            .read(|c| {
                c.nearest_completed_predecessor(&segment.id)
                    .and_then(|prev| prev.last_frame.clone())
            })
            .await;

        if let Some(frame) = frame {
            debug!("Segment {} anchored on previous frame", segment.id);
            request.prompt = format!("{}\n\n{}", segment.text, self.config.continuity_instruction);
            request = request.with_reference_image(frame.data);
        }
        request
    }

    /// Builds and records the request for a segment. A request the backend
    /// would reject halts the run without a generation attempt.
    async fn prepare_request(
        &mut self,
        segment: &Segment,
    ) -> Result<VideoGenerationRequest, RunState> {
        let request = self.build_request(segment).await;
        if let Err(e) = request.validate() {
            warn!("Segment {} rejected before generation: {}", segment.id, e);
            let reason = e.failure_reason();
            self.emit(RunEvent::SegmentFailed {
                segment_id: segment.id.clone(),
                reason: reason.clone(),
            });
            return Err(self.halt(&segment.id, reason));
        }
        if let Ok(book) = self.book_mut() {
            book.requests.insert(segment.id.clone(), request.clone());
        }
        Ok(request)
    }

    /// Runs one generation attempt. On failure the run is halted and the
    /// halted state returned as `Err`.
    async fn generate_segment(
        &mut self,
        segment_id: &str,
        request: VideoGenerationRequest,
        attempt: u32,
    ) -> Result<(), RunState> {
        if let Err(e) = self
            .set_segment_state(segment_id, GenerationState::Generating)
            .await
        {
            return Err(self.halt(segment_id, e.failure_reason()));
        }
        self.emit(RunEvent::SegmentStarted {
            segment_id: segment_id.to_string(),
            attempt,
            has_reference: request.has_reference(),
        });

        let clip = match self.call_provider(segment_id, &request).await {
            Ok(clip) => clip,
            Err(e) => {
                warn!("Segment {} failed: {}", segment_id, e);
                return Err(self.fail_segment(segment_id, e.failure_reason()).await);
            }
        };

        let (is_first, is_last) = self
            .segments
            .read(|c| {
                let is_first = c
                    .get(segment_id)
                    .map(|s| s.previous_segment_id.is_none())
                    .unwrap_or(false);
                (is_first, c.is_last_enabled(segment_id))
            })
            .await;

        let credits = credits_for_segment(request.duration_sec, self.features, is_first);
        if let Ok(book) = self.book_mut() {
            book.summary.credits_spent += credits;
        }

        if self.config.continuity_enabled && !is_last {
            if let Err(e) = self
                .set_segment_state(segment_id, GenerationState::ExtractingFrame)
                .await
            {
                return Err(self.halt(segment_id, e.failure_reason()));
            }
            self.capture_frame(segment_id, &clip).await;
        }

        if let Err(e) = self
            .set_segment_state(segment_id, GenerationState::Completed)
            .await
        {
            return Err(self.halt(segment_id, e.failure_reason()));
        }

        if let Ok(book) = self.book_mut() {
            book.processed.insert(segment_id.to_string());
            book.summary.completed += 1;
        }
        info!("Segment {} completed", segment_id);
        self.emit(RunEvent::SegmentCompleted {
            segment_id: segment_id.to_string(),
            clip_id: clip.id.clone(),
        });
        self.emit_progress().await;
        Ok(())
    }

    /// Generation call under the timeout, then storage
    async fn call_provider(
        &self,
        segment_id: &str,
        request: &VideoGenerationRequest,
    ) -> CoreResult<ClipHandle> {
        let clip = tokio::time::timeout(self.config.call_timeout, self.provider.generate(request))
            .await
            .map_err(|_| {
                CoreError::Timeout(format!(
                    "generation exceeded {}s",
                    self.config.call_timeout.as_secs()
                ))
            })??;

        self.storage.remove_if_exists(segment_id).await?;
        self.storage.save(segment_id, &clip).await?;
        Ok(clip)
    }

    async fn capture_frame(&self, segment_id: &str, clip: &ClipHandle) {
        let frame = self
            .extractor
            .extract_frame(clip, self.config.frame_sample_fraction)
            .await;

        match frame {
            Some(frame) => {
                let bytes = frame.data.len();
                let stored = self
                    .segments
                    .write(|c| c.update_segment_last_frame(segment_id, frame))
                    .await;
                match stored {
                    Ok(()) => self.emit(RunEvent::FrameCaptured {
                        segment_id: segment_id.to_string(),
                        bytes,
                    }),
                    Err(e) => {
                        warn!("Could not store frame for segment {}: {}", segment_id, e);
                        self.emit(RunEvent::FrameMissing {
                            segment_id: segment_id.to_string(),
                        });
                    }
                }
            }
            None => self.emit(RunEvent::FrameMissing {
                segment_id: segment_id.to_string(),
            }),
        }
    }

    // =========================================================================
    // Transitions
    // =========================================================================

    async fn fail_segment(&mut self, segment_id: &str, reason: String) -> RunState {
        if let Err(e) = self
            .set_segment_state(segment_id, GenerationState::failed(reason.clone()))
            .await
        {
            warn!("Could not mark segment {} failed: {}", segment_id, e);
        }
        if let Ok(book) = self.book_mut() {
            book.summary.failed += 1;
        }
        self.emit(RunEvent::SegmentFailed {
            segment_id: segment_id.to_string(),
            reason: reason.clone(),
        });
        self.halt(segment_id, reason)
    }

    fn halt(&mut self, segment_id: &str, reason: String) -> RunState {
        info!("Run halted on segment {}: {}", segment_id, reason);
        self.state = RunState::HaltedOnError {
            segment_id: segment_id.to_string(),
            reason,
        };
        self.state.clone()
    }

    async fn finish(&mut self, state: RunState) {
        self.segments.write(|c| c.end_run()).await;
        let summary = match self.book.as_mut() {
            Some(book) => {
                book.summary.finished_at = Some(now_rfc3339());
                book.summary.clone()
            }
            None => RunSummary::default(),
        };
        info!(
            "Run {} finished ({:?}): {} completed, {} skipped, {} credits",
            summary.run_id, state, summary.completed, summary.skipped, summary.credits_spent
        );
        self.state = state.clone();
        self.emit(RunEvent::RunFinished { state, summary });
    }

    async fn set_segment_state(&self, segment_id: &str, state: GenerationState) -> CoreResult<()> {
        self.segments
            .write(|c| c.update_segment_state(segment_id, state))
            .await
    }

    // =========================================================================
    // Helpers
    // =========================================================================

    fn halted_segment(&self) -> CoreResult<SegmentId> {
        match &self.state {
            RunState::HaltedOnError { segment_id, .. } => Ok(segment_id.clone()),
            RunState::Completed | RunState::Aborted => Err(CoreError::RunFinished),
            _ => Err(CoreError::RunNotHalted),
        }
    }

    fn book_mut(&mut self) -> CoreResult<&mut RunBook> {
        self.book
            .as_mut()
            .ok_or_else(|| CoreError::Internal("No active run".to_string()))
    }

    async fn emit_progress(&self) {
        let total = self.segments.summary().await.enabled_count;
        if let Some(book) = &self.book {
            let summary = &book.summary;
            self.emit(RunEvent::Progress {
                completed: summary.completed,
                skipped: summary.skipped,
                total,
                fraction: summary.progress(total),
            });
        }
    }

    fn emit(&self, event: RunEvent) {
        // Receiver may have been dropped
        let _ = self.event_tx.send(event);
    }
}

impl std::fmt::Debug for GenerationOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GenerationOrchestrator")
            .field("provider", &self.provider.name())
            .field("config", &self.config)
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::continuity::StaticFrameSampler;
    use crate::core::generative::{MemoryClipStorage, MockVideoProvider};
    use crate::core::segments::{SegmentCollection, SegmentCommand};
    use std::time::Duration;

    struct Harness {
        orchestrator: GenerationOrchestrator,
        provider: Arc<MockVideoProvider>,
        storage: Arc<MemoryClipStorage>,
        segments: SharedSegments,
    }

    fn harness(durations: &[f64], provider: MockVideoProvider, config: OrchestratorConfig) -> Harness {
        let segments: Vec<Segment> = durations
            .iter()
            .enumerate()
            .map(|(i, d)| Segment::new(&format!("scene {}", i + 1), *d).with_id(&format!("s{}", i + 1)))
            .collect();
        let shared = SharedSegments::new(SegmentCollection::from_segments(segments).unwrap());
        let provider = Arc::new(provider);
        let storage = Arc::new(MemoryClipStorage::new());
        let extractor = ContinuityExtractor::new(Arc::new(StaticFrameSampler::with_frame(vec![0xAB])));
        let orchestrator = GenerationOrchestrator::new(
            shared.clone(),
            provider.clone(),
            storage.clone(),
            extractor,
            config,
        );
        Harness {
            orchestrator,
            provider,
            storage,
            segments: shared,
        }
    }

    fn drain(rx: &mut mpsc::UnboundedReceiver<RunEvent>) -> Vec<RunEvent> {
        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }
        events
    }

    #[tokio::test]
    async fn test_run_completes_all_segments() {
        let mut h = harness(&[5.0, 5.0, 5.0], MockVideoProvider::new("mock"), OrchestratorConfig::default());
        let mut rx = h.orchestrator.take_event_receiver().unwrap();

        let state = h.orchestrator.start(&CreditGate::unlimited()).await.unwrap();
        assert_eq!(state, RunState::Completed);
        assert_eq!(h.storage.len(), 3);

        let snapshot = h.segments.snapshot().await;
        assert!(snapshot.iter().all(|s| s.generation_state.is_completed()));
        // The last enabled segment never samples a frame
        assert!(snapshot[0].last_frame.is_some());
        assert!(snapshot[2].last_frame.is_none());

        let requests = h.provider.requests();
        assert!(!requests[0].has_reference());
        assert_eq!(requests[1].reference_image, Some(vec![0xAB]));
        assert!(requests[1].prompt.ends_with(&h.orchestrator.config().continuity_instruction));
        assert_eq!(requests[2].name, "segment_003");

        let summary = h.orchestrator.summary().unwrap();
        assert_eq!(summary.completed, 3);
        assert_eq!(summary.credits_spent, 150 + 2 * crate::core::cost::CONTINUITY_SURCHARGE);
        assert!(summary.finished_at.is_some());

        let events = drain(&mut rx);
        assert!(matches!(
            events.last(),
            Some(RunEvent::RunFinished { state: RunState::Completed, .. })
        ));
        assert!(!h.segments.read(|c| c.is_run_active()).await);
    }

    #[tokio::test]
    async fn test_preflight_errors() {
        let h = harness(&[], MockVideoProvider::new("mock"), OrchestratorConfig::default());
        assert!(matches!(
            h.orchestrator.preflight(&CreditGate::unlimited()).await,
            Err(CoreError::NothingToGenerate)
        ));

        let h = harness(&[5.0, 0.0], MockVideoProvider::new("mock"), OrchestratorConfig::default());
        assert!(matches!(
            h.orchestrator.preflight(&CreditGate::unlimited()).await,
            Err(CoreError::ZeroDuration)
        ));

        let mut h = harness(&[5.0], MockVideoProvider::new("mock"), OrchestratorConfig::default());
        let result = h.orchestrator.start(&CreditGate::new(10)).await;
        assert!(matches!(result, Err(CoreError::InsufficientCredits { .. })));
        assert_eq!(h.provider.call_count(), 0);
        assert_eq!(h.orchestrator.state(), &RunState::Idle);
    }

    #[tokio::test]
    async fn test_failure_halts_and_locks_nothing_after() {
        let provider = MockVideoProvider::new("mock")
            .with_queued_success()
            .with_queued_failure(CoreError::ContentRejected("policy".to_string()));
        let mut h = harness(&[5.0, 5.0, 5.0], provider, OrchestratorConfig::default());

        let state = h.orchestrator.start(&CreditGate::unlimited()).await.unwrap();
        match &state {
            RunState::HaltedOnError { segment_id, reason } => {
                assert_eq!(segment_id, "s2");
                assert!(reason.contains("policy"));
            }
            other => panic!("unexpected {:?}", other),
        }
        assert_eq!(h.provider.call_count(), 2);

        let s3 = h.segments.segment("s3").await.unwrap();
        assert_eq!(s3.generation_state, GenerationState::Idle);
        assert!(h.segments.segment("s2").await.unwrap().generation_state.is_failed());

        // Halted run still holds the collection
        assert!(h.segments.read(|c| c.is_run_active()).await);
        assert!(matches!(
            h.orchestrator.start(&CreditGate::unlimited()).await,
            Err(CoreError::RunAlreadyActive)
        ));
    }

    #[tokio::test]
    async fn test_retry_reissues_identical_request() {
        let provider = MockVideoProvider::new("mock")
            .with_queued_success()
            .with_queued_failure(CoreError::Network("reset".to_string()));
        let mut h = harness(&[5.0, 5.0, 5.0], provider, OrchestratorConfig::default());

        h.orchestrator.start(&CreditGate::unlimited()).await.unwrap();
        let state = h.orchestrator.retry().await.unwrap();
        assert_eq!(state, RunState::Completed);

        let requests = h.provider.requests();
        assert_eq!(requests.len(), 4);
        assert_eq!(requests[1], requests[2]);
        // Retried segment now anchors the next one
        assert_eq!(requests[3].reference_image, Some(vec![0xAB]));

        let summary = h.orchestrator.summary().unwrap();
        assert_eq!(summary.completed, 3);
        assert_eq!(summary.failed, 1);
    }

    #[tokio::test]
    async fn test_retry_limit() {
        let provider = MockVideoProvider::new("mock")
            .with_queued_failure(CoreError::GenerationFailed("a".to_string()))
            .with_queued_failure(CoreError::GenerationFailed("b".to_string()));
        let config = OrchestratorConfig {
            max_retries_per_segment: 1,
            ..OrchestratorConfig::default()
        };
        let mut h = harness(&[5.0], provider, config);

        h.orchestrator.start(&CreditGate::unlimited()).await.unwrap();
        assert!(h.orchestrator.retry().await.unwrap().is_halted());
        assert!(matches!(
            h.orchestrator.retry().await,
            Err(CoreError::RetryLimitExceeded { attempts: 2, .. })
        ));

        let state = h.orchestrator.skip().await.unwrap();
        assert_eq!(state, RunState::Completed);
        assert!(matches!(h.orchestrator.retry().await, Err(CoreError::RunFinished)));
    }

    #[tokio::test]
    async fn test_timeout_fails_segment() {
        let provider = MockVideoProvider::new("mock").with_delay(Duration::from_millis(200));
        let config = OrchestratorConfig {
            call_timeout: Duration::from_millis(20),
            ..OrchestratorConfig::default()
        };
        let mut h = harness(&[5.0], provider, config);

        let state = h.orchestrator.start(&CreditGate::unlimited()).await.unwrap();
        assert_eq!(
            state,
            RunState::HaltedOnError {
                segment_id: "s1".to_string(),
                reason: "timeout".to_string(),
            }
        );
        assert_eq!(
            h.segments.segment("s1").await.unwrap().generation_state,
            GenerationState::failed("timeout")
        );
    }

    #[tokio::test]
    async fn test_storage_failure_fails_segment() {
        let segments = vec![Segment::new("scene", 5.0).with_id("s1")];
        let shared = SharedSegments::new(SegmentCollection::from_segments(segments).unwrap());
        let mut orchestrator = GenerationOrchestrator::new(
            shared.clone(),
            Arc::new(MockVideoProvider::new("mock")),
            Arc::new(MemoryClipStorage::failing()),
            ContinuityExtractor::new(Arc::new(StaticFrameSampler::empty())),
            OrchestratorConfig::default(),
        );

        let state = orchestrator.start(&CreditGate::unlimited()).await.unwrap();
        assert!(state.is_halted());
        assert!(shared.segment("s1").await.unwrap().generation_state.is_failed());
    }

    #[tokio::test]
    async fn test_abort_stops_after_in_flight_call() {
        let provider = MockVideoProvider::new("mock").with_delay(Duration::from_millis(100));
        let h = harness(&[5.0, 5.0, 5.0], provider, OrchestratorConfig::default());
        let mut orchestrator = h.orchestrator;
        let abort = orchestrator.abort_handle();

        let task = tokio::spawn(async move {
            let state = orchestrator.start(&CreditGate::unlimited()).await;
            (orchestrator, state)
        });
        tokio::time::sleep(Duration::from_millis(30)).await;
        abort.abort();

        let (orchestrator, state) = task.await.unwrap();
        assert_eq!(state.unwrap(), RunState::Aborted);
        assert_eq!(orchestrator.summary().unwrap().completed, 1);

        let snapshot = h.segments.snapshot().await;
        assert!(snapshot[0].generation_state.is_completed());
        assert_eq!(snapshot[1].generation_state, GenerationState::Idle);
        assert!(!h.segments.read(|c| c.is_run_active()).await);
    }

    #[tokio::test]
    async fn test_abort_while_halted() {
        let provider =
            MockVideoProvider::new("mock").with_queued_failure(CoreError::QuotaExceeded("x".to_string()));
        let mut h = harness(&[5.0, 5.0], provider, OrchestratorConfig::default());

        h.orchestrator.start(&CreditGate::unlimited()).await.unwrap();
        assert_eq!(h.orchestrator.abort().await, RunState::Aborted);
        assert!(matches!(h.orchestrator.skip().await, Err(CoreError::RunFinished)));
    }

    #[tokio::test]
    async fn test_continuity_disabled_sends_no_reference() {
        let config = OrchestratorConfig {
            continuity_enabled: false,
            ..OrchestratorConfig::default()
        };
        let mut h = harness(&[5.0, 5.0], MockVideoProvider::new("mock"), config);

        h.orchestrator.start(&CreditGate::unlimited()).await.unwrap();
        assert!(h.provider.requests().iter().all(|r| !r.has_reference()));
        assert!(h.segments.snapshot().await.iter().all(|s| s.last_frame.is_none()));
    }

    #[tokio::test]
    async fn test_not_reached_segment_can_be_disabled_mid_run() {
        let provider = MockVideoProvider::new("mock")
            .with_queued_failure(CoreError::Network("down".to_string()));
        let mut h = harness(&[5.0, 5.0, 5.0], provider, OrchestratorConfig::default());

        h.orchestrator.start(&CreditGate::unlimited()).await.unwrap();
        h.segments
            .apply(SegmentCommand::SetEnabled {
                segment_id: "s3".to_string(),
                enabled: false,
            })
            .await
            .unwrap();

        let state = h.orchestrator.retry().await.unwrap();
        assert_eq!(state, RunState::Completed);
        assert_eq!(h.provider.call_count(), 3);
        assert_eq!(h.segments.segment("s3").await.unwrap().generation_state, GenerationState::Idle);
    }

    #[tokio::test]
    async fn test_spend_never_exceeds_estimate() {
        let config = OrchestratorConfig {
            continuity_enabled: false,
            ..OrchestratorConfig::default()
        };
        let mut h = harness(&[0.15, 0.15, 0.15], MockVideoProvider::new("mock"), config);

        let estimate = h
            .orchestrator
            .preflight(&CreditGate::unlimited())
            .await
            .unwrap()
            .total_tokens;
        let state = h.orchestrator.start(&CreditGate::new(estimate)).await.unwrap();
        assert_eq!(state, RunState::Completed);
        assert_eq!(h.orchestrator.summary().unwrap().credits_spent, estimate);
    }

    #[tokio::test]
    async fn test_zero_duration_added_mid_run_never_reaches_provider() {
        let provider = MockVideoProvider::new("mock")
            .with_queued_failure(CoreError::Network("reset".to_string()));
        let mut h = harness(&[5.0], provider, OrchestratorConfig::default());

        assert!(h.orchestrator.start(&CreditGate::unlimited()).await.unwrap().is_halted());
        let added = h
            .segments
            .apply(SegmentCommand::Add {
                text: "late scene".to_string(),
                duration: 0.0,
            })
            .await
            .unwrap();
        let late_id = added.created_ids[0].clone();

        let state = h.orchestrator.skip().await.unwrap();
        match &state {
            RunState::HaltedOnError { segment_id, reason } => {
                assert_eq!(segment_id, &late_id);
                assert!(reason.contains("Duration must be positive"));
            }
            other => panic!("unexpected {:?}", other),
        }
        assert_eq!(h.provider.call_count(), 1);
        assert_eq!(h.orchestrator.summary().unwrap().failed, 1);
        assert_eq!(
            h.segments.segment(&late_id).await.unwrap().generation_state,
            GenerationState::Idle
        );

        h.segments
            .apply(SegmentCommand::SetDuration {
                segment_id: late_id.clone(),
                duration: 4.0,
            })
            .await
            .unwrap();
        let state = h.orchestrator.retry().await.unwrap();
        assert_eq!(state, RunState::Completed);

        let requests = h.provider.requests();
        assert_eq!(requests.len(), 2);
        assert!((requests[1].duration_sec - 4.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_halted_segment_cannot_be_removed_or_moved() {
        let provider = MockVideoProvider::new("mock")
            .with_queued_success()
            .with_queued_failure(CoreError::Network("reset".to_string()));
        let mut h = harness(&[5.0, 5.0, 5.0], provider, OrchestratorConfig::default());

        assert!(h.orchestrator.start(&CreditGate::unlimited()).await.unwrap().is_halted());

        let removed = h
            .segments
            .apply(SegmentCommand::Remove {
                segment_id: "s2".to_string(),
            })
            .await;
        assert!(matches!(removed, Err(CoreError::SegmentLocked(..))));
        let moved = h
            .segments
            .apply(SegmentCommand::Move {
                segment_id: "s2".to_string(),
                to_position: 2,
            })
            .await;
        assert!(matches!(moved, Err(CoreError::SegmentLocked(..))));
        let disabled = h
            .segments
            .apply(SegmentCommand::SetEnabled {
                segment_id: "s2".to_string(),
                enabled: false,
            })
            .await;
        assert!(matches!(disabled, Err(CoreError::SegmentLocked(..))));

        // Segments the run has not reached are still free to remove
        h.segments
            .apply(SegmentCommand::Remove {
                segment_id: "s3".to_string(),
            })
            .await
            .unwrap();

        let state = h.orchestrator.retry().await.unwrap();
        assert_eq!(state, RunState::Completed);
        assert_eq!(h.orchestrator.summary().unwrap().completed, 2);
        assert_eq!(h.provider.call_count(), 3);
    }

    #[tokio::test]
    async fn test_frame_extraction_failure_does_not_stop_run() {
        let segments: Vec<Segment> = (1..=3)
            .map(|i| Segment::new(&format!("scene {i}"), 5.0).with_id(&format!("s{i}")))
            .collect();
        let shared = SharedSegments::new(SegmentCollection::from_segments(segments).unwrap());
        let provider = Arc::new(MockVideoProvider::new("mock"));
        let mut orchestrator = GenerationOrchestrator::new(
            shared.clone(),
            provider.clone(),
            Arc::new(MemoryClipStorage::new()),
            ContinuityExtractor::new(Arc::new(StaticFrameSampler::failing("decoder"))),
            OrchestratorConfig::default(),
        );
        let mut rx = orchestrator.take_event_receiver().unwrap();

        let state = orchestrator.start(&CreditGate::unlimited()).await.unwrap();
        assert_eq!(state, RunState::Completed);
        assert!(shared
            .snapshot()
            .await
            .iter()
            .all(|s| s.generation_state.is_completed() && s.last_frame.is_none()));

        let requests = provider.requests();
        assert_eq!(requests.len(), 3);
        assert!(!requests[1].has_reference());
        assert!(!requests[2].has_reference());

        let missing: Vec<SegmentId> = drain(&mut rx)
            .into_iter()
            .filter_map(|e| match e {
                RunEvent::FrameMissing { segment_id } => Some(segment_id),
                _ => None,
            })
            .collect();
        assert_eq!(missing, vec!["s1".to_string(), "s2".to_string()]);
    }
}
