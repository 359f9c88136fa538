//! # trek-tools
//!
//! External lookup providers consumed by the worker nodes. The
//! orchestration core only sees the traits:
//!
//! - [`PlaceDirectory`]: text search for places plus per-place detail
//! - [`FlightSearch`]: flight options between two cities
//!
//! Live implementations call the Google Places API; when credentials are
//! missing (or a live call fails mid-session) the nodes degrade to the
//! deterministic placeholder providers in [`placeholder`], so a session
//! never aborts for lack of an API key.
//!
//! ## Crate Position
//!
//! Depends on trek-core. Depended on by trek-runtime and the binary.

#![deny(unsafe_code)]

pub mod errors;
pub mod google;
pub mod placeholder;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use trek_core::Place;

pub use errors::ToolError;
pub use google::GooglePlacesDirectory;
pub use placeholder::{PlaceholderDirectory, PlaceholderFlights};

/// One flight option from a search.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FlightOption {
    /// Flight number ("DL123").
    pub flight_number: String,
    /// Operating airline.
    pub airline: String,
    /// Ticket price in budget units.
    pub price: f64,
    /// Departure time, local, "HH:00".
    pub time: String,
}

/// Place search and detail lookups.
#[async_trait]
pub trait PlaceDirectory: Send + Sync {
    /// Search for places near `location` matching a free-text `query`
    /// (category or description).
    async fn search(&self, location: &str, query: &str) -> Result<Vec<Place>, ToolError>;

    /// Fetch a narrative detail report for one place.
    async fn detail(&self, place: &Place) -> Result<String, ToolError>;
}

/// Flight option search.
#[async_trait]
pub trait FlightSearch: Send + Sync {
    /// Search flights from `origin` to `destination`, cheapest first.
    async fn search(&self, origin: &str, destination: &str)
    -> Result<Vec<FlightOption>, ToolError>;
}

/// Build a place directory from the environment: Google Places when
/// `GOOGLE_MAPS_API_KEY` is set, deterministic placeholders otherwise.
pub fn place_directory_from_env() -> std::sync::Arc<dyn PlaceDirectory> {
    match std::env::var("GOOGLE_MAPS_API_KEY") {
        Ok(key) if !key.is_empty() => {
            tracing::info!("using Google Places directory");
            std::sync::Arc::new(GooglePlacesDirectory::new(key))
        }
        _ => {
            tracing::warn!("GOOGLE_MAPS_API_KEY not set, using placeholder place directory");
            std::sync::Arc::new(PlaceholderDirectory::new())
        }
    }
}
