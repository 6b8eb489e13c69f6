//! StoryReel Core Type Definitions
//!
//! Defines fundamental types used throughout the project.

// =============================================================================
// ID Types
// =============================================================================

/// Segment unique identifier (ULID)
pub type SegmentId = String;

/// Clip unique identifier (ULID or provider-assigned)
pub type ClipId = String;

/// Run unique identifier (ULID)
pub type RunId = String;

// =============================================================================
// Time Types
// =============================================================================

/// Time in seconds (floating point)
pub type TimeSec = f64;

/// Abstract billable unit
pub type Credits = u64;

/// Generates a new sortable unique identifier
pub fn new_id() -> String {
    ulid::Ulid::new().to_string()
}

/// Current time as an RFC 3339 string
pub fn now_rfc3339() -> String {
    chrono::Utc::now().to_rfc3339()
}
