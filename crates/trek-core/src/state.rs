//! Session state for one planning thread.
//!
//! `TripState` is the single source of truth for a thread. It is only ever
//! mutated by [`TripState::apply`], which folds a committed [`StateUpdate`]
//! through the reducers and recomputes the budget — nothing writes
//! `remaining_budget` directly.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::ledger;
use crate::reducers::{self, Keyed};

/// Current state schema version, stored alongside every persisted state.
///
/// Older payloads deserialize with typed defaults for missing fields;
/// payloads newer than this are rejected at the store boundary.
pub const SCHEMA_VERSION: u32 = 1;

fn schema_version_default() -> u32 {
    SCHEMA_VERSION
}

/// Conversational role. Tool-invocation turns are internal and never
/// appear in the persisted transcript.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// End-user turn.
    User,
    /// Planner (assistant) turn.
    Assistant,
}

/// One conversational turn.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    /// Who spoke.
    pub role: Role,
    /// What was said.
    pub content: String,
}

impl ChatMessage {
    /// Build a user turn.
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    /// Build an assistant turn.
    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// Category of a booked itinerary item.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItineraryKind {
    /// Air travel.
    Flight,
    /// Lodging.
    Hotel,
    /// Paid activity.
    Activity,
    /// Ground transport.
    Transport,
    /// Sight visit.
    Visit,
}

/// Booking status of an itinerary item.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BookingStatus {
    /// Funds reserved, booking final.
    Confirmed,
    /// Awaiting confirmation.
    Pending,
}

/// A single booked item. Append-only once in the itinerary.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ItineraryItem {
    /// Display name ("Flight DL123", "Hotel Okura").
    pub name: String,
    /// Total cost in budget currency units. Never negative.
    pub cost: f64,
    /// Item category.
    #[serde(rename = "type")]
    pub kind: ItineraryKind,
    /// Booking status.
    pub status: BookingStatus,
}

/// Price tier reported by the place provider, mirroring the Google Places
/// price-level vocabulary. Unknown values collapse to [`PriceTier::Unspecified`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String")]
pub enum PriceTier {
    /// No charge.
    #[serde(rename = "PRICE_LEVEL_FREE")]
    Free,
    /// Budget tier.
    #[serde(rename = "PRICE_LEVEL_INEXPENSIVE")]
    Inexpensive,
    /// Mid-range tier.
    #[serde(rename = "PRICE_LEVEL_MODERATE")]
    Moderate,
    /// Upscale tier.
    #[serde(rename = "PRICE_LEVEL_EXPENSIVE")]
    Expensive,
    /// Luxury tier.
    #[serde(rename = "PRICE_LEVEL_VERY_EXPENSIVE")]
    VeryExpensive,
    /// Provider did not report a tier.
    #[default]
    #[serde(rename = "PRICE_LEVEL_UNSPECIFIED")]
    Unspecified,
}

impl From<String> for PriceTier {
    fn from(value: String) -> Self {
        Self::from_provider(&value)
    }
}

impl PriceTier {
    /// Parse a provider price-level string; anything unrecognized maps to
    /// [`PriceTier::Unspecified`].
    pub fn from_provider(value: &str) -> Self {
        match value {
            "PRICE_LEVEL_FREE" => Self::Free,
            "PRICE_LEVEL_INEXPENSIVE" => Self::Inexpensive,
            "PRICE_LEVEL_MODERATE" => Self::Moderate,
            "PRICE_LEVEL_EXPENSIVE" => Self::Expensive,
            "PRICE_LEVEL_VERY_EXPENSIVE" => Self::VeryExpensive,
            _ => Self::Unspecified,
        }
    }
    /// Estimated nightly lodging rate for this tier, in budget units.
    pub fn nightly_rate(self) -> f64 {
        match self {
            Self::Free => 0.0,
            Self::Inexpensive => 100.0,
            Self::Moderate => 200.0,
            Self::Expensive => 450.0,
            Self::VeryExpensive => 800.0,
            Self::Unspecified => 150.0,
        }
    }

    /// Estimated cost of a single visit/activity at a place of this tier.
    pub fn visit_cost(self) -> f64 {
        match self {
            Self::Free => 0.0,
            Self::Inexpensive => 25.0,
            Self::Moderate => 50.0,
            Self::Expensive => 110.0,
            Self::VeryExpensive => 200.0,
            Self::Unspecified => 40.0,
        }
    }
}

/// A place returned by the search provider.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Place {
    /// Provider-stable place id.
    pub id: String,
    /// Display name.
    pub name: String,
    /// Formatted address.
    #[serde(default)]
    pub address: String,
    /// Latitude.
    pub lat: f64,
    /// Longitude.
    pub lng: f64,
    /// Average rating, when the provider reports one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rating: Option<f64>,
    /// Primary category ("lodging", "museum", ...).
    #[serde(default)]
    pub category: String,
    /// Reported price tier.
    #[serde(default)]
    pub price_tier: PriceTier,
    /// Raw provider type strings, kept verbatim.
    #[serde(default)]
    pub raw_types: Vec<String>,
}

impl Place {
    /// Whether this place can serve as lodging.
    pub fn is_lodging(&self) -> bool {
        self.category == "lodging" || self.raw_types.iter().any(|t| t == "lodging" || t == "hotel")
    }
}

/// A place that has been researched: the original entry plus a narrative
/// report produced by the decision function.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ResearchedPlace {
    /// The place as found by search.
    #[serde(flatten)]
    pub place: Place,
    /// Narrative research report.
    pub report: String,
}

impl Keyed for Place {
    fn key(&self) -> &str {
        &self.id
    }
}

impl Keyed for ResearchedPlace {
    fn key(&self) -> &str {
        &self.place.id
    }
}

/// Workflow stage of a planning thread.
///
/// Stages advance `Init → Search → SelectLocations → Research →
/// ChooseLocations → Itinerary → ReviewItinerary → Complete`; `Complete`
/// is terminal. A worker node sets the stage to the value appropriate to
/// the stage it completed (e.g. the search node leaves the thread at
/// `SelectLocations`, awaiting a human selection).
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowStage {
    /// Freshly created, nothing ran yet.
    #[default]
    Init,
    /// Ready for (or re-running) place search.
    Search,
    /// Paused: waiting for the user to select places to research.
    SelectLocations,
    /// Research in progress.
    Research,
    /// Paused: waiting for the user to choose the itinerary location.
    ChooseLocations,
    /// Itinerary construction in progress.
    Itinerary,
    /// Waiting for the user to confirm or adjust the itinerary.
    ReviewItinerary,
    /// Terminal.
    Complete,
}

impl WorkflowStage {
    /// Whether this stage is a durable pause point (the driver halted here
    /// awaiting external input).
    pub fn is_pause_stage(self) -> bool {
        matches!(
            self,
            Self::SelectLocations | Self::ChooseLocations | Self::ReviewItinerary
        )
    }

    /// Stable snake_case name, identical to the wire encoding.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Init => "init",
            Self::Search => "search",
            Self::SelectLocations => "select_locations",
            Self::Research => "research",
            Self::ChooseLocations => "choose_locations",
            Self::Itinerary => "itinerary",
            Self::ReviewItinerary => "review_itinerary",
            Self::Complete => "complete",
        }
    }
}

impl std::fmt::Display for WorkflowStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Full session state for one thread.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TripState {
    /// Schema version this payload was written with.
    #[serde(default = "schema_version_default")]
    pub schema_version: u32,
    /// Stable thread identifier, assigned at creation and never reused.
    pub thread_id: String,
    /// Conversational transcript, append-only.
    #[serde(default)]
    pub messages: Vec<ChatMessage>,
    /// The user's initial budget limit.
    #[serde(default)]
    pub total_budget: f64,
    /// Derived balance: always `total_budget − Σ itinerary.cost`.
    #[serde(default)]
    pub remaining_budget: f64,
    /// Booked items, append-only.
    #[serde(default)]
    pub itinerary: Vec<ItineraryItem>,
    /// Destination location.
    #[serde(default)]
    pub current_location: String,
    /// The user's free-text description of what they're looking for.
    #[serde(default)]
    pub user_description: String,
    /// Places found by search, keyed by id, first-seen order.
    #[serde(default)]
    pub found_places: IndexMap<String, Place>,
    /// Place ids the user selected for research.
    #[serde(default)]
    pub selected_places: Vec<String>,
    /// Researched places, keyed by id, first-seen order.
    #[serde(default)]
    pub researched_places: IndexMap<String, ResearchedPlace>,
    /// Narrative research findings, append-only.
    #[serde(default)]
    pub research_notes: Vec<String>,
    /// Current workflow stage.
    #[serde(default)]
    pub workflow_stage: WorkflowStage,
}

impl TripState {
    /// Seed a fresh thread: stage `Search`, budgets equal, empty
    /// collections, the opening query as the first user message.
    pub fn new(
        thread_id: impl Into<String>,
        query: &str,
        budget: f64,
        location: &str,
        description: &str,
    ) -> Self {
        Self {
            schema_version: SCHEMA_VERSION,
            thread_id: thread_id.into(),
            messages: vec![ChatMessage::user(query)],
            total_budget: budget,
            remaining_budget: budget,
            itinerary: Vec::new(),
            current_location: location.to_owned(),
            user_description: description.to_owned(),
            found_places: IndexMap::new(),
            selected_places: Vec::new(),
            researched_places: IndexMap::new(),
            research_notes: Vec::new(),
            workflow_stage: WorkflowStage::Search,
        }
    }

    /// Fold a committed partial update into this state.
    ///
    /// Every collection goes through its reducer; `remaining_budget` is
    /// recomputed from the itinerary afterwards, never trusted from the
    /// update.
    pub fn apply(&mut self, update: StateUpdate) {
        reducers::append(&mut self.messages, update.messages);
        reducers::append(&mut self.itinerary, update.itinerary);
        reducers::merge_by_id(&mut self.found_places, update.found_places);
        reducers::merge_by_id(&mut self.researched_places, update.researched_places);
        reducers::append(&mut self.research_notes, update.research_notes);
        if let Some(selected) = update.selected_places {
            self.selected_places = selected;
        }
        if let Some(stage) = update.workflow_stage {
            self.workflow_stage = stage;
        }
        self.recompute_budget();
    }

    /// Recompute `remaining_budget` from the itinerary.
    pub fn recompute_budget(&mut self) {
        self.remaining_budget = ledger::recompute_remaining(self.total_budget, &self.itinerary);
    }

    /// Content of the most recent user turn, if any.
    pub fn latest_user_message(&self) -> Option<&str> {
        self.messages
            .iter()
            .rev()
            .find(|m| m.role == Role::User)
            .map(|m| m.content.as_str())
    }

    /// Selected ids that are present in `found_places`, in selection order,
    /// and the ids that are not.
    pub fn partition_selected(&self) -> (Vec<&str>, Vec<&str>) {
        self.selected_places
            .iter()
            .map(String::as_str)
            .partition(|id| self.found_places.contains_key(*id))
    }
}

/// Partial state update produced by one worker node (or a resume payload).
///
/// Applied in full or not at all; see [`TripState::apply`].
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct StateUpdate {
    /// Messages to append.
    #[serde(default)]
    pub messages: Vec<ChatMessage>,
    /// Itinerary entries to append (ledger-approved only).
    #[serde(default)]
    pub itinerary: Vec<ItineraryItem>,
    /// Places to merge into `found_places`.
    #[serde(default)]
    pub found_places: Vec<Place>,
    /// Places to merge into `researched_places`.
    #[serde(default)]
    pub researched_places: Vec<ResearchedPlace>,
    /// Research notes to append.
    #[serde(default)]
    pub research_notes: Vec<String>,
    /// Replacement selection, when present.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub selected_places: Option<Vec<String>>,
    /// New workflow stage, when present.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub workflow_stage: Option<WorkflowStage>,
}

impl StateUpdate {
    /// An update that only appends one message.
    pub fn message(msg: ChatMessage) -> Self {
        Self {
            messages: vec![msg],
            ..Self::default()
        }
    }

    /// True when applying this update would change nothing.
    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
            && self.itinerary.is_empty()
            && self.found_places.is_empty()
            && self.researched_places.is_empty()
            && self.research_notes.is_empty()
            && self.selected_places.is_none()
            && self.workflow_stage.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn place(id: &str) -> Place {
        Place {
            id: id.to_owned(),
            name: format!("Place {id}"),
            address: "1 Test St".to_owned(),
            lat: 35.6,
            lng: 139.7,
            rating: Some(4.2),
            category: "museum".to_owned(),
            price_tier: PriceTier::Moderate,
            raw_types: vec!["museum".to_owned()],
        }
    }

    #[test]
    fn new_state_seeds_budget_and_stage() {
        let s = TripState::new("thr_1", "Plan a trip", 1000.0, "Tokyo", "art museums");
        assert_eq!(s.workflow_stage, WorkflowStage::Search);
        assert_eq!(s.total_budget, 1000.0);
        assert_eq!(s.remaining_budget, 1000.0);
        assert_eq!(s.messages.len(), 1);
        assert_eq!(s.messages[0].role, Role::User);
        assert!(s.itinerary.is_empty());
        assert!(s.found_places.is_empty());
    }

    #[test]
    fn apply_recomputes_remaining_from_itinerary() {
        let mut s = TripState::new("thr_1", "q", 1000.0, "Tokyo", "");
        s.apply(StateUpdate {
            itinerary: vec![ItineraryItem {
                name: "Hotel".to_owned(),
                cost: 600.0,
                kind: ItineraryKind::Hotel,
                status: BookingStatus::Confirmed,
            }],
            ..StateUpdate::default()
        });
        assert_eq!(s.remaining_budget, 400.0);

        // remaining_budget is derived, never incremental: re-applying an
        // empty update leaves it untouched.
        s.apply(StateUpdate::default());
        assert_eq!(s.remaining_budget, 400.0);
    }

    #[test]
    fn apply_merges_places_and_replaces_selection() {
        let mut s = TripState::new("thr_1", "q", 500.0, "Tokyo", "");
        s.apply(StateUpdate {
            found_places: vec![place("a"), place("b")],
            selected_places: Some(vec!["a".to_owned()]),
            workflow_stage: Some(WorkflowStage::SelectLocations),
            ..StateUpdate::default()
        });
        assert_eq!(s.found_places.len(), 2);
        assert_eq!(s.selected_places, vec!["a"]);
        assert_eq!(s.workflow_stage, WorkflowStage::SelectLocations);
    }

    #[test]
    fn partition_selected_flags_unknown_ids() {
        let mut s = TripState::new("thr_1", "q", 500.0, "Tokyo", "");
        s.apply(StateUpdate {
            found_places: vec![place("a")],
            selected_places: Some(vec!["a".to_owned(), "ghost".to_owned()]),
            ..StateUpdate::default()
        });
        let (known, unknown) = s.partition_selected();
        assert_eq!(known, vec!["a"]);
        assert_eq!(unknown, vec!["ghost"]);
    }

    #[test]
    fn legacy_payload_fills_typed_defaults() {
        // A minimal v1 payload missing most optional fields.
        let json = r#"{"thread_id":"thr_x","total_budget":250.0}"#;
        let s: TripState = serde_json::from_str(json).unwrap();
        assert_eq!(s.schema_version, SCHEMA_VERSION);
        assert_eq!(s.thread_id, "thr_x");
        assert_eq!(s.workflow_stage, WorkflowStage::Init);
        assert!(s.messages.is_empty());
        assert!(s.found_places.is_empty());
        assert!(s.research_notes.is_empty());
    }

    #[test]
    fn state_roundtrips_through_json() {
        let mut s = TripState::new("thr_1", "q", 900.0, "Kyoto", "temples");
        s.apply(StateUpdate {
            found_places: vec![place("a")],
            researched_places: vec![ResearchedPlace {
                place: place("a"),
                report: "Quiet in the mornings.".to_owned(),
            }],
            research_notes: vec!["note".to_owned()],
            ..StateUpdate::default()
        });
        let json = serde_json::to_string(&s).unwrap();
        let back: TripState = serde_json::from_str(&json).unwrap();
        assert_eq!(back, s);
    }

    #[test]
    fn price_tier_parses_provider_strings() {
        let t: PriceTier = serde_json::from_str("\"PRICE_LEVEL_EXPENSIVE\"").unwrap();
        assert_eq!(t, PriceTier::Expensive);
        // Unknown values collapse to Unspecified rather than failing.
        let t: PriceTier = serde_json::from_str("\"PRICE_LEVEL_FUTURE\"").unwrap();
        assert_eq!(t, PriceTier::Unspecified);
        assert_eq!(t.nightly_rate(), 150.0);
    }

    #[test]
    fn workflow_stage_wire_names_are_snake_case() {
        assert_eq!(
            serde_json::to_string(&WorkflowStage::SelectLocations).unwrap(),
            "\"select_locations\""
        );
        assert_eq!(WorkflowStage::ReviewItinerary.as_str(), "review_itinerary");
    }

    #[test]
    fn itinerary_item_uses_type_on_the_wire() {
        let item = ItineraryItem {
            name: "Flight DL123".to_owned(),
            cost: 500.0,
            kind: ItineraryKind::Flight,
            status: BookingStatus::Confirmed,
        };
        let v = serde_json::to_value(&item).unwrap();
        assert_eq!(v["type"], "flight");
        assert_eq!(v["status"], "confirmed");
    }
}
