//! Routing: the pure decision function at the top of every driver step.
//!
//! `decide` looks only at the committed state snapshot. It never performs
//! I/O and never mutates anything, so replaying the same snapshot always
//! yields the same route.

use tracing::warn;

use trek_core::{TripState, WorkflowStage};

/// A node the router can dispatch to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum NodeKind {
    /// Place search.
    Search,
    /// Per-place research.
    Research,
    /// Itinerary construction and booking.
    Itinerary,
}

impl NodeKind {
    /// Stable node name for logs and status frames.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Search => "search",
            Self::Research => "research",
            Self::Itinerary => "itinerary",
        }
    }
}

impl std::fmt::Display for NodeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of one routing decision.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Route {
    /// Run this node next.
    Node(NodeKind),
    /// Cannot advance without more input from the user.
    NeedsInput {
        /// What to ask for.
        prompt: String,
    },
    /// Terminate the run.
    Finish,
}

/// Coarse intent parsed from the latest user turn.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum UserIntent {
    /// Discard progress and search again.
    StartOver,
    /// Accept the current itinerary.
    Confirm,
    /// Rework the current itinerary.
    Adjust,
    /// Anything else.
    #[default]
    Other,
}

impl UserIntent {
    /// Parse intent from a user message. Deterministic keyword match,
    /// case-insensitive; the first matching category wins.
    pub fn parse(message: &str) -> Self {
        let text = message.to_ascii_lowercase();
        if text.contains("start over") || text.contains("start again") || text.contains("restart") {
            Self::StartOver
        } else if text.contains("confirm")
            || text.contains("looks good")
            || text.contains("book it")
            || text.contains("approve")
        {
            Self::Confirm
        } else if text.contains("adjust")
            || text.contains("change")
            || text.contains("cheaper")
            || text.contains("instead")
            || text.contains("rework")
        {
            Self::Adjust
        } else {
            Self::Other
        }
    }

    /// Intent of the latest user turn in `state`, or `Other` when the
    /// transcript has no user turn.
    pub fn of(state: &TripState) -> Self {
        state.latest_user_message().map_or(Self::Other, Self::parse)
    }
}

const SELECT_PROMPT: &str =
    "No places are selected yet. Please pick at least one place to research.";
const CHOOSE_PROMPT: &str =
    "Please choose exactly one place to build the itinerary around.";

/// Decide the next step from a committed snapshot.
///
/// Total over every `(stage, selection, intent)` combination; unhandled
/// combinations terminate rather than loop.
pub fn decide(state: &TripState) -> Route {
    let intent = UserIntent::of(state);
    if intent == UserIntent::StartOver {
        return Route::Node(NodeKind::Search);
    }

    match state.workflow_stage {
        WorkflowStage::Init | WorkflowStage::Search => Route::Node(NodeKind::Search),
        WorkflowStage::SelectLocations => {
            if state.selected_places.is_empty() {
                Route::NeedsInput {
                    prompt: SELECT_PROMPT.to_owned(),
                }
            } else {
                Route::Node(NodeKind::Research)
            }
        }
        WorkflowStage::ChooseLocations => {
            if state.selected_places.len() == 1 {
                Route::Node(NodeKind::Itinerary)
            } else {
                Route::NeedsInput {
                    prompt: CHOOSE_PROMPT.to_owned(),
                }
            }
        }
        WorkflowStage::ReviewItinerary => match intent {
            UserIntent::Adjust => Route::Node(NodeKind::Itinerary),
            UserIntent::Confirm => Route::Finish,
            UserIntent::StartOver | UserIntent::Other => {
                warn!(
                    thread_id = %state.thread_id,
                    stage = %state.workflow_stage,
                    "no route for stage/intent, finishing"
                );
                Route::Finish
            }
        },
        WorkflowStage::Complete => Route::Finish,
        WorkflowStage::Research | WorkflowStage::Itinerary => {
            // In-flight stages are never the committed stage between steps;
            // seeing one here means a crash mid-node. Terminate.
            warn!(
                thread_id = %state.thread_id,
                stage = %state.workflow_stage,
                "no route for stage/intent, finishing"
            );
            Route::Finish
        }
    }
}
