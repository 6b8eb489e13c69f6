//! End-to-end scenarios across segmentation, cost and generation.

use std::sync::Arc;

use crate::core::{
    ai::{LlmCallOptions, LlmCapability},
    continuity::{ContinuityExtractor, StaticFrameSampler},
    cost::{CostBreakdown, CreditGate, FeatureSet},
    generative::{MemoryClipStorage, MockVideoProvider},
    orchestrator::{GenerationOrchestrator, OrchestratorConfig, RunEvent, RunState},
    segmentation::{SegmentationConstraints, SegmentationEngine, SegmentationMode, SegmentationOptions},
    segments::{CapturedFrame, GenerationState, Segment, SegmentCollection, SharedSegments},
    CoreError,
};

fn script_of_words(sentences: usize) -> String {
    (0..sentences)
        .map(|i| format!("The harbor lights flicker {}.", i))
        .collect::<Vec<_>>()
        .join(" ")
}

fn orchestrator(
    segments: SharedSegments,
    provider: Arc<MockVideoProvider>,
) -> GenerationOrchestrator {
    GenerationOrchestrator::new(
        segments,
        provider,
        Arc::new(MemoryClipStorage::new()),
        ContinuityExtractor::new(Arc::new(StaticFrameSampler::with_frame(vec![0xFF, 0xD8, 0x01]))),
        OrchestratorConfig::default(),
    )
}

fn complete(collection: &mut SegmentCollection, id: &str) {
    for state in [
        GenerationState::Queued,
        GenerationState::Generating,
        GenerationState::Completed,
    ] {
        collection.update_segment_state(id, state).unwrap();
    }
}

fn fail(collection: &mut SegmentCollection, id: &str) {
    for state in [
        GenerationState::Queued,
        GenerationState::Generating,
        GenerationState::failed("network"),
    ] {
        collection.update_segment_state(id, state).unwrap();
    }
}

#[tokio::test]
async fn test_650_words_duration_mode_then_halve_cost() {
    // 130 sentences of 5 words
    let script = script_of_words(130);
    let options = SegmentationOptions::new(
        SegmentationMode::Duration,
        SegmentationConstraints {
            max_segments: 100,
            target_duration: 5.0,
            ..SegmentationConstraints::default()
        },
    );

    let result = SegmentationEngine::new(LlmCallOptions::default())
        .segment(&script, &options, &LlmCapability::unavailable("offline"))
        .await;

    // ceil(650 / (5 * 2.5))
    assert_eq!(result.segments.len(), 52);
    for segment in &result.segments {
        assert!((segment.duration - 5.0).abs() <= 1.0);
    }

    let mut collection = SegmentCollection::from_segments(result.segments).unwrap();
    let before = CostBreakdown::for_collection(&collection, FeatureSet::none());

    let ids: Vec<String> = collection.segments().iter().map(|s| s.id.clone()).collect();
    for id in ids.iter().skip(1).step_by(2) {
        collection.set_enabled(id, false).unwrap();
    }
    let after = CostBreakdown::for_collection(&collection, FeatureSet::none());

    let ratio = after.total_tokens as f64 / before.total_tokens as f64;
    assert!(ratio > 0.35 && ratio < 0.65, "ratio {}", ratio);
    assert_eq!(after.segment_count, 26);
}

#[tokio::test]
async fn test_failed_middle_segment_skipped_uses_first_frame() {
    let segments = vec![
        Segment::new("A ship leaves the harbor.", 5.0).with_id("s1"),
        Segment::new("A storm gathers.", 5.0).with_id("s2"),
        Segment::new("The ship returns at dawn.", 5.0).with_id("s3"),
    ];
    let shared = SharedSegments::new(SegmentCollection::from_segments(segments).unwrap());
    let provider = Arc::new(
        MockVideoProvider::new("mock")
            .with_queued_success()
            .with_queued_failure(CoreError::GenerationFailed("backend 500".to_string())),
    );
    let mut orchestrator = orchestrator(shared.clone(), provider.clone());
    let mut events = orchestrator.take_event_receiver().unwrap();

    let state = orchestrator.start(&CreditGate::unlimited()).await.unwrap();
    assert!(matches!(
        &state,
        RunState::HaltedOnError { segment_id, .. } if segment_id == "s2"
    ));
    assert!(shared.segment("s2").await.unwrap().generation_state.is_failed());

    let state = orchestrator.skip().await.unwrap();
    assert_eq!(state, RunState::Completed);

    let s1 = shared.segment("s1").await.unwrap();
    let s2 = shared.segment("s2").await.unwrap();
    let s3 = shared.segment("s3").await.unwrap();
    assert!(s2.generation_state.is_failed());
    assert!(s2.last_frame.is_none());
    assert!(s3.generation_state.is_completed());

    let requests = provider.requests();
    assert_eq!(requests.len(), 3);
    assert_eq!(
        requests[2].reference_image.as_deref(),
        s1.last_frame.as_ref().map(|f| f.data.as_slice())
    );

    let summary = orchestrator.summary().unwrap();
    assert_eq!(summary.completed, 2);
    assert_eq!(summary.skipped, 1);

    let mut last_progress = None;
    while let Ok(event) = events.try_recv() {
        if let RunEvent::Progress { fraction, .. } = event {
            last_progress = Some(fraction);
        }
    }
    assert_eq!(last_progress, Some(1.0));
}

#[test]
fn test_continuity_lookup_skips_failed_segment() {
    let segments = vec![
        Segment::new("A", 5.0).with_id("a"),
        Segment::new("B", 5.0).with_id("b"),
        Segment::new("C", 5.0).with_id("c"),
    ];
    let mut collection = SegmentCollection::from_segments(segments).unwrap();
    complete(&mut collection, "a");
    collection
        .update_segment_last_frame("a", CapturedFrame::jpeg(vec![7, 7, 7], 4.5))
        .unwrap();
    fail(&mut collection, "b");

    let anchor = collection.nearest_completed_predecessor("c").unwrap();
    assert_eq!(anchor.id, "a");
    assert_eq!(anchor.last_frame.as_ref().unwrap().data, vec![7, 7, 7]);
}

#[tokio::test]
async fn test_continuity_lookup_skips_disabled_segment() {
    let segments = vec![
        Segment::new("A", 5.0).with_id("a"),
        Segment::new("B", 5.0).with_id("b").with_enabled(false),
        Segment::new("C", 5.0).with_id("c"),
    ];
    let shared = SharedSegments::new(SegmentCollection::from_segments(segments).unwrap());
    let provider = Arc::new(MockVideoProvider::new("mock"));
    let mut orchestrator = orchestrator(shared.clone(), provider.clone());

    let state = orchestrator.start(&CreditGate::unlimited()).await.unwrap();
    assert_eq!(state, RunState::Completed);

    let requests = provider.requests();
    assert_eq!(requests.len(), 2);
    assert_eq!(requests[1].reference_image, Some(vec![0xFF, 0xD8, 0x01]));
    assert_eq!(
        shared.segment("b").await.unwrap().generation_state,
        GenerationState::Idle
    );
}

#[tokio::test]
async fn test_retry_unblocks_next_continuity_lookup() {
    let segments = vec![
        Segment::new("First", 4.0).with_id("s1"),
        Segment::new("Second", 4.0).with_id("s2"),
    ];
    let shared = SharedSegments::new(SegmentCollection::from_segments(segments).unwrap());
    let provider = Arc::new(
        MockVideoProvider::new("mock")
            .with_queued_failure(CoreError::Network("connection reset".to_string())),
    );
    let mut orchestrator = orchestrator(shared.clone(), provider.clone());

    let state = orchestrator.start(&CreditGate::unlimited()).await.unwrap();
    assert!(state.is_halted());

    let state = orchestrator.retry().await.unwrap();
    assert_eq!(state, RunState::Completed);

    let requests = provider.requests();
    assert_eq!(requests[0], requests[1]);
    assert!(!requests[0].has_reference());
    assert!(requests[2].has_reference());
    assert!(shared
        .snapshot()
        .await
        .iter()
        .all(|s| s.generation_state.is_completed()));
}

#[tokio::test]
async fn test_insufficient_credits_blocks_before_any_call() {
    let segments = vec![Segment::new("Only", 10.0).with_id("s1")];
    let shared = SharedSegments::new(SegmentCollection::from_segments(segments).unwrap());
    let provider = Arc::new(MockVideoProvider::new("mock"));
    let mut orchestrator = orchestrator(shared.clone(), provider.clone());

    let err = orchestrator.start(&CreditGate::new(5)).await.unwrap_err();
    assert!(err.is_preflight());
    assert_eq!(provider.call_count(), 0);
    assert!(!shared.read(|c| c.is_run_active()).await);
    assert_eq!(
        shared.segment("s1").await.unwrap().generation_state,
        GenerationState::Idle
    );
}
