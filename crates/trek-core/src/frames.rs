//! Wire frames for the client event stream.
//!
//! Frames are newline-delimited JSON. Every stream opens with a `meta`
//! frame carrying the thread id and closes with either a single `error`
//! frame or the `done` sentinel. In between, each committed state snapshot
//! yields at most one frame per category, in the fixed order `message`,
//! `ledger_update`, `map_update`, `research_update`, `workflow_stage`.

use serde::{Deserialize, Serialize};

use crate::state::{ChatMessage, ItineraryItem, Place, ResearchedPlace, WorkflowStage};

/// Ledger portion of a snapshot: balance plus the full itinerary.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LedgerSnapshot {
    /// Remaining budget.
    pub remaining: f64,
    /// Total budget.
    pub total: f64,
    /// The full itinerary so far.
    pub itinerary: Vec<ItineraryItem>,
}

/// Status discriminator for `status` frames.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StatusKind {
    /// Execution halted at a pause point, awaiting external input.
    Paused,
}

/// One event frame on the client stream.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Frame {
    /// First frame of every stream: the thread this stream belongs to.
    Meta {
        /// Thread identifier.
        thread_id: String,
    },
    /// A new conversational turn.
    Message {
        /// The turn.
        data: ChatMessage,
    },
    /// Budget and itinerary snapshot.
    LedgerUpdate {
        /// Current ledger view.
        data: LedgerSnapshot,
    },
    /// Current set of found places (emitted when non-empty and changed).
    MapUpdate {
        /// Places in first-seen order.
        data: Vec<Place>,
    },
    /// Current set of researched places (same emission condition).
    ResearchUpdate {
        /// Researched places in first-seen order.
        data: Vec<ResearchedPlace>,
    },
    /// The workflow stage after this snapshot.
    WorkflowStage {
        /// Stage name.
        data: WorkflowStage,
    },
    /// Execution halted without finishing.
    Status {
        /// Status discriminator (always `paused` today).
        data: StatusKind,
        /// Pause-point stage, when the halt happened at one.
        #[serde(skip_serializing_if = "Option::is_none")]
        stage: Option<WorkflowStage>,
        /// Pending node name, when the router chose a node that did not run.
        #[serde(skip_serializing_if = "Option::is_none")]
        next: Option<String>,
    },
    /// Uncaught failure; the stream closes after this frame.
    Error {
        /// Error description.
        data: String,
    },
    /// Terminal sentinel.
    Done,
}

impl Frame {
    /// Paused at a pause-point stage.
    pub fn paused_at(stage: WorkflowStage) -> Self {
        Self::Status {
            data: StatusKind::Paused,
            stage: Some(stage),
            next: None,
        }
    }

    /// Paused before running a decided node.
    pub fn paused_before(next: impl Into<String>) -> Self {
        Self::Status {
            data: StatusKind::Paused,
            stage: None,
            next: Some(next.into()),
        }
    }
}
