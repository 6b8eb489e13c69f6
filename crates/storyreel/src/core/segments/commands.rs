//! Segment Commands
//!
//! User edits are serializable commands applied through
//! [`SegmentCollection::apply`], the only mutation entry point exposed to
//! callers outside the orchestrator.

use serde::{Deserialize, Serialize};

use super::{Segment, SegmentCollection};
use crate::core::{CoreResult, SegmentId, TimeSec};

/// Command execution result
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CommandResult {
    /// List of state changes
    pub changes: Vec<StateChange>,
    /// Newly created segment IDs
    pub created_ids: Vec<SegmentId>,
    /// Deleted segment IDs
    pub deleted_ids: Vec<SegmentId>,
}

impl CommandResult {
    pub fn with_change(mut self, change: StateChange) -> Self {
        self.changes.push(change);
        self
    }

    pub fn with_created_id(mut self, id: &str) -> Self {
        self.created_ids.push(id.to_string());
        self
    }

    pub fn with_deleted_id(mut self, id: &str) -> Self {
        self.deleted_ids.push(id.to_string());
        self
    }
}

/// State change types
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum StateChange {
    #[serde(rename_all = "camelCase")]
    SegmentCreated { segment_id: SegmentId },
    #[serde(rename_all = "camelCase")]
    SegmentModified { segment_id: SegmentId },
    #[serde(rename_all = "camelCase")]
    SegmentDeleted { segment_id: SegmentId },
    #[serde(rename_all = "camelCase")]
    CollectionReplaced { segment_count: usize },
}

/// Edit applied to a segment collection
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum SegmentCommand {
    Add {
        text: String,
        duration: TimeSec,
    },
    Insert {
        position: usize,
        text: String,
        duration: TimeSec,
    },
    #[serde(rename_all = "camelCase")]
    Remove { segment_id: SegmentId },
    #[serde(rename_all = "camelCase")]
    Toggle { segment_id: SegmentId },
    #[serde(rename_all = "camelCase")]
    SetEnabled { segment_id: SegmentId, enabled: bool },
    #[serde(rename_all = "camelCase")]
    EditText { segment_id: SegmentId, text: String },
    #[serde(rename_all = "camelCase")]
    SetDuration {
        segment_id: SegmentId,
        duration: TimeSec,
    },
    #[serde(rename_all = "camelCase")]
    Move {
        segment_id: SegmentId,
        to_position: usize,
    },
    ReplaceAll { segments: Vec<Segment> },
}

impl SegmentCommand {
    /// Command type name, for logs
    pub fn type_name(&self) -> &'static str {
        match self {
            SegmentCommand::Add { .. } => "Add",
            SegmentCommand::Insert { .. } => "Insert",
            SegmentCommand::Remove { .. } => "Remove",
            SegmentCommand::Toggle { .. } => "Toggle",
            SegmentCommand::SetEnabled { .. } => "SetEnabled",
            SegmentCommand::EditText { .. } => "EditText",
            SegmentCommand::SetDuration { .. } => "SetDuration",
            SegmentCommand::Move { .. } => "Move",
            SegmentCommand::ReplaceAll { .. } => "ReplaceAll",
        }
    }
}

impl SegmentCollection {
    /// Applies a command. On failure the collection is unchanged.
    pub fn apply(&mut self, command: SegmentCommand) -> CoreResult<CommandResult> {
        let result = CommandResult::default();
        match command {
            SegmentCommand::Add { text, duration } => {
                let id = self.add_segment(Segment::new(&text, duration))?;
                Ok(result
                    .with_change(StateChange::SegmentCreated {
                        segment_id: id.clone(),
                    })
                    .with_created_id(&id))
            }
            SegmentCommand::Insert {
                position,
                text,
                duration,
            } => {
                let id = self.insert_segment(position, Segment::new(&text, duration))?;
                Ok(result
                    .with_change(StateChange::SegmentCreated {
                        segment_id: id.clone(),
                    })
                    .with_created_id(&id))
            }
            SegmentCommand::Remove { segment_id } => {
                self.remove_segment(&segment_id)?;
                Ok(result
                    .with_change(StateChange::SegmentDeleted {
                        segment_id: segment_id.clone(),
                    })
                    .with_deleted_id(&segment_id))
            }
            SegmentCommand::Toggle { segment_id } => {
                self.toggle_segment(&segment_id)?;
                Ok(result.with_change(StateChange::SegmentModified { segment_id }))
            }
            SegmentCommand::SetEnabled {
                segment_id,
                enabled,
            } => {
                self.set_enabled(&segment_id, enabled)?;
                Ok(result.with_change(StateChange::SegmentModified { segment_id }))
            }
            SegmentCommand::EditText { segment_id, text } => {
                self.edit_text(&segment_id, &text)?;
                Ok(result.with_change(StateChange::SegmentModified { segment_id }))
            }
            SegmentCommand::SetDuration {
                segment_id,
                duration,
            } => {
                self.set_duration(&segment_id, duration)?;
                Ok(result.with_change(StateChange::SegmentModified { segment_id }))
            }
            SegmentCommand::Move {
                segment_id,
                to_position,
            } => {
                self.move_segment(&segment_id, to_position)?;
                Ok(result.with_change(StateChange::SegmentModified { segment_id }))
            }
            SegmentCommand::ReplaceAll { segments } => {
                let deleted: Vec<SegmentId> =
                    self.segments().iter().map(|s| s.id.clone()).collect();
                let created: Vec<SegmentId> = segments.iter().map(|s| s.id.clone()).collect();
                self.replace_all(segments)?;
                Ok(CommandResult {
                    changes: vec![StateChange::CollectionReplaced {
                        segment_count: created.len(),
                    }],
                    created_ids: created,
                    deleted_ids: deleted,
                })
            }
        }
    }
}
