//! # trek-core
//!
//! Foundation types for the Trek trip-planning orchestrator.
//!
//! This crate provides the shared vocabulary that all other Trek crates
//! depend on:
//!
//! - **State**: [`state::TripState`] — the per-thread session state — and
//!   [`state::StateUpdate`], the partial update a worker node commits
//! - **Ledger**: [`ledger::attempt_booking`], pure budget enforcement
//! - **Reducers**: [`reducers::append`] and [`reducers::merge_by_id`],
//!   the only functions allowed to fold updates into state collections
//! - **Frames**: [`frames::Frame`], the newline-delimited JSON wire events
//!   streamed to clients
//!
//! ## Crate Position
//!
//! Foundation crate. Depended on by all other trek crates.

#![deny(unsafe_code)]

pub mod frames;
pub mod ledger;
pub mod reducers;
pub mod state;

pub use frames::{Frame, LedgerSnapshot, StatusKind};
pub use ledger::{BookingDecision, attempt_booking, recompute_remaining};
pub use state::{
    BookingStatus, ChatMessage, ItineraryItem, ItineraryKind, Place, PriceTier, ResearchedPlace,
    Role, StateUpdate, TripState, WorkflowStage,
};
