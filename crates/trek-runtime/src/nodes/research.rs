//! Research node: gather a narrative report for each selected place.

use async_trait::async_trait;
use tracing::{info, instrument, warn};

use trek_core::{ChatMessage, ResearchedPlace, StateUpdate, TripState, WorkflowStage};
use trek_tools::{PlaceDirectory, PlaceholderDirectory};

use crate::context::NodeContext;
use crate::errors::Result;
use crate::nodes::{WorkerNode, record_run, with_deadline};
use crate::router::NodeKind;

/// Researches the user's selected places and leaves the thread awaiting a
/// final choice.
pub struct ResearchNode;

impl ResearchNode {
    fn unknown_ids_message(unknown: &[&str], state: &TripState) -> String {
        let valid: Vec<&str> = state.found_places.keys().map(String::as_str).collect();
        format!(
            "I couldn't match these selections to anything I found: {}. \
             The places I know about are: {}.",
            unknown.join(", "),
            valid.join(", ")
        )
    }
}

#[async_trait]
impl WorkerNode for ResearchNode {
    fn kind(&self) -> NodeKind {
        NodeKind::Research
    }

    #[instrument(skip_all, fields(thread_id = %state.thread_id))]
    async fn run(&self, ctx: &NodeContext, state: &TripState) -> Result<StateUpdate> {
        record_run(self.kind());
        let (known, unknown) = state.partition_selected();

        let mut messages = Vec::new();
        if !unknown.is_empty() {
            warn!(?unknown, "selection contains unknown place ids");
            messages.push(ChatMessage::assistant(Self::unknown_ids_message(
                &unknown, state,
            )));
        }

        // The instruction names exactly the ids under research; the
        // decision function never picks the set itself.
        let names: Vec<&str> = known
            .iter()
            .filter_map(|id| state.found_places.get(*id).map(|p| p.name.as_str()))
            .collect();
        let instruction = format!(
            "Research exactly these places and report findings: {} (ids: {}).",
            names.join(", "),
            known.join(", ")
        );

        let mut researched = Vec::with_capacity(known.len());
        let mut notes = Vec::with_capacity(known.len());
        let offline = PlaceholderDirectory::new();
        for id in &known {
            let Some(place) = state.found_places.get(*id) else {
                continue;
            };
            let report = match with_deadline(ctx, "research", ctx.places.detail(place)).await {
                Ok(report) => report,
                Err(err) => {
                    warn!(place_id = %place.id, %err, "detail lookup failed, using placeholder report");
                    offline.detail(place).await?
                }
            };
            notes.push(format!("{}: {report}", place.name));
            researched.push(ResearchedPlace {
                place: place.clone(),
                report,
            });
        }
        info!(count = researched.len(), "research complete");

        let summary = match ctx.planner.reply(&instruction, &state.messages).await {
            Ok(text) if !text.trim().is_empty() => text,
            _ => format!(
                "I researched {} places. Pick the one to build your itinerary \
                 around.",
                researched.len()
            ),
        };
        messages.push(ChatMessage::assistant(summary));

        Ok(StateUpdate {
            messages,
            researched_places: researched,
            research_notes: notes,
            workflow_stage: Some(WorkflowStage::ChooseLocations),
            ..StateUpdate::default()
        })
    }
}
