//! Itinerary node: book flight, lodging, and visits through the ledger.

use async_trait::async_trait;
use metrics::counter;
use tracing::{info, instrument, warn};

use trek_core::{
    BookingDecision, ChatMessage, ItineraryItem, ItineraryKind, Place, StateUpdate, TripState,
    WorkflowStage, attempt_booking,
};
use trek_tools::{FlightOption, FlightSearch, PlaceholderFlights};

use crate::context::NodeContext;
use crate::errors::Result;
use crate::nodes::{WorkerNode, record_run, with_deadline};
use crate::router::NodeKind;

/// Assumed trip length when booking lodging.
const TRIP_NIGHTS: u32 = 3;

/// Departure city for flight search. No origin is collected at thread
/// creation; the flight provider prices relative to the destination.
const FLIGHT_ORIGIN: &str = "home";

/// Builds the itinerary around the chosen place, booking strictly through
/// the ledger.
pub struct ItineraryNode;

/// Working tally for one itinerary build. Tracks the running balance so
/// successive bookings see each other's spend before anything is
/// committed; the committed balance is still recomputed from the
/// itinerary on apply.
struct BookingRun {
    remaining: f64,
    entries: Vec<ItineraryItem>,
    messages: Vec<ChatMessage>,
}

impl BookingRun {
    fn new(remaining: f64) -> Self {
        Self {
            remaining,
            entries: Vec::new(),
            messages: Vec::new(),
        }
    }

    /// Apply one ledger decision. Returns whether it was approved.
    fn record(&mut self, decision: BookingDecision) -> bool {
        match decision {
            BookingDecision::Approved {
                entry,
                new_remaining,
                message,
            } => {
                self.remaining = new_remaining;
                self.entries.push(entry);
                self.messages.push(ChatMessage::assistant(message));
                true
            }
            BookingDecision::Declined { message } => {
                counter!("bookings_declined_total").increment(1);
                self.messages.push(ChatMessage::assistant(message));
                false
            }
            BookingDecision::Invalid { message } => {
                warn!(%message, "invalid booking input");
                self.messages.push(ChatMessage::assistant(message));
                false
            }
        }
    }
}

impl ItineraryNode {
    /// Resolve the target place. Selected ids missing from research (or
    /// even from search) are used by raw reference, never failed on; a
    /// raw reference also yields a corrective message so the stream shows
    /// the id was not one this thread found.
    fn target_place(state: &TripState, id: &str) -> (Place, Option<ChatMessage>) {
        if let Some(researched) = state.researched_places.get(id) {
            return (researched.place.clone(), None);
        }
        if let Some(found) = state.found_places.get(id) {
            warn!(place_id = id, "target was never researched, using search entry");
            return (found.clone(), None);
        }
        warn!(place_id = id, "target unknown to this thread, using raw reference");
        let notice = ChatMessage::assistant(format!(
            "Heads up: {id} isn't a place I found for this trip, so I'm \
             booking it by reference without any details on record."
        ));
        let place = Place {
            id: id.to_owned(),
            name: id.to_owned(),
            address: String::new(),
            lat: 0.0,
            lng: 0.0,
            rating: None,
            category: String::new(),
            price_tier: trek_core::PriceTier::Unspecified,
            raw_types: Vec::new(),
        };
        (place, Some(notice))
    }

    /// Book the cheapest affordable flight. Options arrive cheapest first;
    /// each decline leaves a corrective message and the next option is
    /// tried.
    fn book_flight(run: &mut BookingRun, options: &[FlightOption]) {
        for option in options {
            let name = format!("Flight {} ({})", option.flight_number, option.airline);
            if run.record(attempt_booking(
                &name,
                ItineraryKind::Flight,
                option.price,
                1,
                run.remaining,
            )) {
                return;
            }
        }
        warn!("no flight option fits the remaining budget");
    }

    /// Book lodging near the target: the target itself when it is lodging,
    /// otherwise the cheapest lodging place this thread knows about.
    fn book_lodging(run: &mut BookingRun, state: &TripState, target: &Place) {
        let mut candidates: Vec<&Place> = Vec::new();
        if target.is_lodging() {
            candidates.push(target);
        } else {
            candidates.extend(
                state
                    .researched_places
                    .values()
                    .map(|r| &r.place)
                    .chain(state.found_places.values())
                    .filter(|p| p.is_lodging()),
            );
            candidates.sort_by(|a, b| {
                a.price_tier
                    .nightly_rate()
                    .total_cmp(&b.price_tier.nightly_rate())
            });
        }
        for place in candidates {
            let name = format!("Hotel: {} ({TRIP_NIGHTS} nights)", place.name);
            if run.record(attempt_booking(
                &name,
                ItineraryKind::Hotel,
                place.price_tier.nightly_rate(),
                TRIP_NIGHTS,
                run.remaining,
            )) {
                return;
            }
        }
        warn!("no lodging booked");
    }

    /// Book a visit to the target and each other researched, non-lodging
    /// place. Declines skip the place, never abort the build.
    fn book_visits(run: &mut BookingRun, state: &TripState, target: &Place) {
        let mut seen = vec![];
        let visits = std::iter::once(target).chain(
            state
                .researched_places
                .values()
                .map(|r| &r.place)
                .filter(|p| p.id != target.id),
        );
        for place in visits {
            if place.is_lodging() || seen.contains(&place.id.as_str()) {
                continue;
            }
            seen.push(place.id.as_str());
            let name = format!("Visit: {}", place.name);
            let _ = run.record(attempt_booking(
                &name,
                ItineraryKind::Visit,
                place.price_tier.visit_cost(),
                1,
                run.remaining,
            ));
        }
    }
}

#[async_trait]
impl WorkerNode for ItineraryNode {
    fn kind(&self) -> NodeKind {
        NodeKind::Itinerary
    }

    #[instrument(skip_all, fields(thread_id = %state.thread_id))]
    async fn run(&self, ctx: &NodeContext, state: &TripState) -> Result<StateUpdate> {
        record_run(self.kind());
        let target_id = state.selected_places.first().cloned().unwrap_or_default();
        let (target, raw_reference_notice) = Self::target_place(state, &target_id);
        info!(place_id = %target.id, "building itinerary");

        let flight_options =
            match with_deadline(ctx, "itinerary", ctx.flights.search(FLIGHT_ORIGIN, &state.current_location))
                .await
            {
                Ok(options) => options,
                Err(err) => {
                    warn!(%err, "flight search failed, using placeholder options");
                    PlaceholderFlights::new()
                        .search(FLIGHT_ORIGIN, &state.current_location)
                        .await?
                }
            };

        let mut run = BookingRun::new(state.remaining_budget);
        if let Some(notice) = raw_reference_notice {
            run.messages.push(notice);
        }
        Self::book_flight(&mut run, &flight_options);
        Self::book_lodging(&mut run, state, &target);
        Self::book_visits(&mut run, state, &target);

        // The instruction names the target id so the narrative stays
        // anchored to the user's choice.
        let instruction = format!(
            "Summarize the itinerary built around {} (id: {}) for review: \
             {} bookings, ${:.2} of budget left.",
            target.name,
            target.id,
            run.entries.len(),
            run.remaining
        );
        let summary = match ctx.planner.reply(&instruction, &state.messages).await {
            Ok(text) if !text.trim().is_empty() => text,
            _ => format!(
                "Your itinerary around {} has {} bookings with ${:.2} remaining. \
                 Confirm it, or tell me what to adjust.",
                target.name,
                run.entries.len(),
                run.remaining
            ),
        };
        run.messages.push(ChatMessage::assistant(summary));

        Ok(StateUpdate {
            messages: run.messages,
            itinerary: run.entries,
            workflow_stage: Some(WorkflowStage::ReviewItinerary),
            ..StateUpdate::default()
        })
    }
}
