//! Search node: find candidate places for the destination.

use async_trait::async_trait;
use tracing::{info, instrument, warn};

use trek_core::{ChatMessage, Place, StateUpdate, TripState, WorkflowStage};
use trek_llm::PlannerError;
use trek_tools::{PlaceDirectory, PlaceholderDirectory};

use crate::context::NodeContext;
use crate::errors::Result;
use crate::nodes::{WorkerNode, record_run, with_deadline};
use crate::router::NodeKind;

/// Finds places and leaves the thread awaiting a selection.
pub struct SearchNode;

impl SearchNode {
    /// Live search with degradation: any provider failure (including the
    /// deadline) falls back to the deterministic placeholder directory so
    /// the session keeps moving.
    async fn find_places(&self, ctx: &NodeContext, state: &TripState) -> Result<Vec<Place>> {
        let query = if state.user_description.is_empty() {
            state.latest_user_message().unwrap_or_default().to_owned()
        } else {
            state.user_description.clone()
        };
        let live = with_deadline(
            ctx,
            "search",
            ctx.places.search(&state.current_location, &query),
        )
        .await;
        match live {
            Ok(places) if !places.is_empty() => Ok(places),
            Ok(_) => {
                warn!(location = %state.current_location, "search returned nothing, using placeholders");
                Ok(PlaceholderDirectory::new()
                    .search(&state.current_location, &query)
                    .await?)
            }
            Err(err) => {
                warn!(%err, "place search failed, using placeholders");
                Ok(PlaceholderDirectory::new()
                    .search(&state.current_location, &query)
                    .await?)
            }
        }
    }

    fn selection_prompt(places: &[Place]) -> String {
        let names: Vec<&str> = places.iter().map(|p| p.name.as_str()).collect();
        format!(
            "I found {} places in the area: {}. Which would you like me to \
             research further?",
            places.len(),
            names.join(", ")
        )
    }
}

#[async_trait]
impl WorkerNode for SearchNode {
    fn kind(&self) -> NodeKind {
        NodeKind::Search
    }

    #[instrument(skip_all, fields(thread_id = %state.thread_id))]
    async fn run(&self, ctx: &NodeContext, state: &TripState) -> Result<StateUpdate> {
        record_run(self.kind());
        let places = self.find_places(ctx, state).await?;
        info!(count = places.len(), "search complete");

        let fallback = Self::selection_prompt(&places);
        let instruction = format!(
            "Present these places found in {} to the traveler and ask which \
             ones to research: {}",
            state.current_location,
            places
                .iter()
                .map(|p| p.name.as_str())
                .collect::<Vec<_>>()
                .join(", ")
        );
        let message = match ctx.planner.reply(&instruction, &state.messages).await {
            Ok(text) if !text.trim().is_empty() => text,
            Ok(_) | Err(PlannerError::EmptyResponse) => fallback,
            Err(err) => {
                warn!(%err, "planner unavailable, using templated prompt");
                fallback
            }
        };

        Ok(StateUpdate {
            messages: vec![ChatMessage::assistant(message)],
            found_places: places,
            // A (re-)search invalidates any earlier selection.
            selected_places: Some(Vec::new()),
            workflow_stage: Some(WorkflowStage::SelectLocations),
            ..StateUpdate::default()
        })
    }
}
