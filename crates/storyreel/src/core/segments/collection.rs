//! Segment Collection
//!
//! Ordered aggregate of segments. Every structural mutation re-derives the
//! contiguous `order` values, the id index, the nearest-enabled continuity
//! links and the cached summary, so reads during a run are O(1).

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{CapturedFrame, GenerationState, Segment};
use crate::core::{CoreError, CoreResult, SegmentId, TimeSec};

/// Totals derived from the collection
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CollectionSummary {
    /// Sum of enabled segment durations
    pub total_duration: TimeSec,
    pub segment_count: usize,
    pub enabled_count: usize,
}

/// Ordered, linked set of segments
#[derive(Clone, Debug, Default)]
pub struct SegmentCollection {
    segments: Vec<Segment>,
    index: HashMap<SegmentId, usize>,
    summary: CollectionSummary,
    run_active: bool,
    /// Segments the active run has reached; pinned in place until it ends
    held: HashSet<SegmentId>,
}

impl SegmentCollection {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a collection from segments in their given order
    pub fn from_segments(segments: Vec<Segment>) -> CoreResult<Self> {
        let mut collection = Self::new();
        collection.replace_all(segments)?;
        Ok(collection)
    }

    // =========================================================================
    // Queries
    // =========================================================================

    pub fn len(&self) -> usize {
        self.segments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    /// Segments in order
    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    pub fn get(&self, id: &str) -> Option<&Segment> {
        self.index.get(id).map(|&i| &self.segments[i])
    }

    pub fn get_at(&self, order: usize) -> Option<&Segment> {
        self.segments.get(order)
    }

    /// Enabled segments in order
    pub fn enabled_segments(&self) -> impl Iterator<Item = &Segment> {
        self.segments.iter().filter(|s| s.is_enabled)
    }

    pub fn summary(&self) -> &CollectionSummary {
        &self.summary
    }

    pub fn total_duration(&self) -> TimeSec {
        self.summary.total_duration
    }

    /// Whether a run currently holds the collection
    pub fn is_run_active(&self) -> bool {
        self.run_active
    }

    /// First enabled segment in order
    pub fn first_enabled(&self) -> Option<&Segment> {
        self.enabled_segments().next()
    }

    /// Whether `id` is the last enabled segment
    pub fn is_last_enabled(&self, id: &str) -> bool {
        self.get(id)
            .map(|s| s.is_enabled && s.next_segment_id.is_none())
            .unwrap_or(false)
    }

    /// Walks continuity links backwards to the most recent completed segment.
    ///
    /// Disabled segments are never linked and failed ones are passed over, so
    /// the result is the last segment that actually produced a clip.
    pub fn nearest_completed_predecessor(&self, id: &str) -> Option<&Segment> {
        let mut cursor = self.get(id)?.previous_segment_id.as_deref();
        while let Some(prev_id) = cursor {
            let prev = self.get(prev_id)?;
            if prev.generation_state.is_completed() {
                return Some(prev);
            }
            cursor = prev.previous_segment_id.as_deref();
        }
        None
    }

    // =========================================================================
    // Structural Mutations
    // =========================================================================

    /// Appends a segment
    pub fn add_segment(&mut self, segment: Segment) -> CoreResult<SegmentId> {
        let position = self.segments.len();
        self.insert_segment(position, segment)
    }

    /// Inserts a segment at `position` (0..=len)
    pub fn insert_segment(&mut self, position: usize, segment: Segment) -> CoreResult<SegmentId> {
        if position > self.segments.len() {
            return Err(CoreError::InvalidPosition(position));
        }
        if self.index.contains_key(&segment.id) {
            return Err(CoreError::ValidationError(format!(
                "Duplicate segment id: {}",
                segment.id
            )));
        }
        validate_duration(segment.duration, true)?;

        let id = segment.id.clone();
        self.segments.insert(position, segment);
        self.relink();
        debug!("Inserted segment {} at {}", id, position);
        Ok(id)
    }

    /// Removes a segment; its former neighbours are re-linked to each other
    pub fn remove_segment(&mut self, id: &str) -> CoreResult<Segment> {
        let idx = self.structural_index(id)?;
        let removed = self.segments.remove(idx);
        self.relink();
        debug!("Removed segment {}", id);
        Ok(removed)
    }

    /// Flips `isEnabled`, returning the new value
    pub fn toggle_segment(&mut self, id: &str) -> CoreResult<bool> {
        let idx = self.structural_index(id)?;
        let enabled = !self.segments[idx].is_enabled;
        self.segments[idx].is_enabled = enabled;
        self.relink();
        debug!("Segment {} enabled={}", id, enabled);
        Ok(enabled)
    }

    pub fn set_enabled(&mut self, id: &str, enabled: bool) -> CoreResult<()> {
        let idx = self.structural_index(id)?;
        if self.segments[idx].is_enabled != enabled {
            self.segments[idx].is_enabled = enabled;
            self.relink();
        }
        Ok(())
    }

    /// Moves a segment to `to_position` (0..len)
    pub fn move_segment(&mut self, id: &str, to_position: usize) -> CoreResult<()> {
        let idx = self.structural_index(id)?;
        if to_position >= self.segments.len() {
            return Err(CoreError::InvalidPosition(to_position));
        }
        let segment = self.segments.remove(idx);
        self.segments.insert(to_position, segment);
        self.relink();
        Ok(())
    }

    /// Replaces every segment (re-segmentation)
    pub fn replace_all(&mut self, segments: Vec<Segment>) -> CoreResult<()> {
        if self.run_active {
            return Err(CoreError::CollectionLocked);
        }
        let mut seen = std::collections::HashSet::new();
        for segment in &segments {
            if !seen.insert(segment.id.as_str()) {
                return Err(CoreError::ValidationError(format!(
                    "Duplicate segment id: {}",
                    segment.id
                )));
            }
            validate_duration(segment.duration, true)?;
        }

        self.segments = segments;
        self.relink();
        debug!("Replaced collection with {} segments", self.segments.len());
        Ok(())
    }

    // =========================================================================
    // Field Edits
    // =========================================================================

    pub fn edit_text(&mut self, id: &str, text: &str) -> CoreResult<()> {
        let idx = self.editable_index(id)?;
        self.segments[idx].text = text.to_string();
        Ok(())
    }

    pub fn set_duration(&mut self, id: &str, duration: TimeSec) -> CoreResult<()> {
        validate_duration(duration, false)?;
        let idx = self.editable_index(id)?;
        self.segments[idx].duration = duration;
        self.refresh_summary();
        Ok(())
    }

    // =========================================================================
    // Run-side Updates
    // =========================================================================

    /// Applies a generation state transition
    pub fn update_segment_state(&mut self, id: &str, state: GenerationState) -> CoreResult<()> {
        let idx = self.index_of(id)?;
        let current = &self.segments[idx].generation_state;
        if !current.can_transition_to(&state) {
            return Err(CoreError::InvalidStateTransition {
                segment_id: id.to_string(),
                from: current.to_string(),
                to: state.to_string(),
            });
        }
        debug!("Segment {}: {} -> {}", id, current, state);
        self.segments[idx].generation_state = state;
        Ok(())
    }

    /// Stores the continuity frame captured from the segment's clip
    pub fn update_segment_last_frame(&mut self, id: &str, frame: CapturedFrame) -> CoreResult<()> {
        let idx = self.index_of(id)?;
        self.segments[idx].last_frame = Some(frame);
        Ok(())
    }

    /// Marks the collection as held by a run
    pub fn begin_run(&mut self) -> CoreResult<()> {
        if self.run_active {
            return Err(CoreError::RunAlreadyActive);
        }
        self.run_active = true;
        Ok(())
    }

    /// Releases the run hold
    pub fn end_run(&mut self) {
        self.run_active = false;
        self.held.clear();
    }

    /// Pins a segment the run has reached. Until the run ends it cannot be
    /// removed, moved or toggled, though its text and duration stay editable
    /// while it is failed.
    pub(crate) fn hold_segment(&mut self, id: &str) {
        if self.run_active && self.index.contains_key(id) {
            self.held.insert(id.to_string());
        }
    }

    pub fn is_held(&self, id: &str) -> bool {
        self.held.contains(id)
    }

    // =========================================================================
    // Internals
    // =========================================================================

    fn index_of(&self, id: &str) -> CoreResult<usize> {
        self.index
            .get(id)
            .copied()
            .ok_or_else(|| CoreError::SegmentNotFound(id.to_string()))
    }

    fn editable_index(&self, id: &str) -> CoreResult<usize> {
        let idx = self.index_of(id)?;
        let state = &self.segments[idx].generation_state;
        if state.is_locked() {
            return Err(CoreError::SegmentLocked(
                id.to_string(),
                state.label().to_string(),
            ));
        }
        Ok(idx)
    }

    fn structural_index(&self, id: &str) -> CoreResult<usize> {
        let idx = self.editable_index(id)?;
        if self.held.contains(id) {
            return Err(CoreError::SegmentLocked(
                id.to_string(),
                "held by the active run".to_string(),
            ));
        }
        Ok(idx)
    }

    fn relink(&mut self) {
        self.index.clear();

        let mut prev_enabled: Option<SegmentId> = None;
        for (i, segment) in self.segments.iter_mut().enumerate() {
            segment.order = i;
            self.index.insert(segment.id.clone(), i);
            segment.previous_segment_id = prev_enabled.clone();
            if segment.is_enabled {
                prev_enabled = Some(segment.id.clone());
            }
        }

        let mut next_enabled: Option<SegmentId> = None;
        for segment in self.segments.iter_mut().rev() {
            segment.next_segment_id = next_enabled.clone();
            if segment.is_enabled {
                next_enabled = Some(segment.id.clone());
            }
        }

        self.refresh_summary();
    }

    fn refresh_summary(&mut self) {
        let mut summary = CollectionSummary {
            segment_count: self.segments.len(),
            ..CollectionSummary::default()
        };
        for segment in self.enabled_segments() {
            summary.total_duration += segment.duration;
            summary.enabled_count += 1;
        }
        self.summary = summary;
    }
}

fn validate_duration(duration: TimeSec, allow_zero: bool) -> CoreResult<()> {
    let valid = duration.is_finite() && (duration > 0.0 || (allow_zero && duration == 0.0));
    if valid {
        Ok(())
    } else {
        Err(CoreError::ValidationError(format!(
            "Invalid segment duration: {duration}"
        )))
    }
}
