//! Deterministic offline providers.
//!
//! Used whenever no API key is configured and as the degraded path when
//! a live provider fails mid-session. Output is a pure function of the
//! inputs, so sessions replay identically and tests need no network.

use std::hash::{DefaultHasher, Hash, Hasher};

use async_trait::async_trait;

use trek_core::{Place, PriceTier};

use crate::errors::ToolError;
use crate::{FlightOption, FlightSearch, PlaceDirectory};

fn slug(text: &str) -> String {
    text.to_ascii_lowercase()
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect()
}

fn seed(text: &str) -> u64 {
    let mut hasher = DefaultHasher::new();
    text.hash(&mut hasher);
    hasher.finish()
}

struct Template {
    kind: &'static str,
    category: &'static str,
    price_tier: PriceTier,
    raw_types: &'static [&'static str],
}

const TEMPLATES: [Template; 5] = [
    Template {
        kind: "Grand Hotel",
        category: "lodging",
        price_tier: PriceTier::Moderate,
        raw_types: &["lodging", "hotel"],
    },
    Template {
        kind: "City Museum",
        category: "museum",
        price_tier: PriceTier::Inexpensive,
        raw_types: &["museum", "tourist_attraction"],
    },
    Template {
        kind: "Old Town Bistro",
        category: "restaurant",
        price_tier: PriceTier::Moderate,
        raw_types: &["restaurant", "food"],
    },
    Template {
        kind: "Riverside Park",
        category: "park",
        price_tier: PriceTier::Free,
        raw_types: &["park", "tourist_attraction"],
    },
    Template {
        kind: "Historic Landmark",
        category: "tourist_attraction",
        price_tier: PriceTier::Inexpensive,
        raw_types: &["tourist_attraction", "point_of_interest"],
    },
];

/// Canned place directory. Every location yields five places spanning
/// lodging, food, and sightseeing so the downstream nodes always have
/// something to select, research, and book.
#[derive(Default)]
pub struct PlaceholderDirectory;

impl PlaceholderDirectory {
    /// Create the directory.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl PlaceDirectory for PlaceholderDirectory {
    async fn search(&self, location: &str, _query: &str) -> Result<Vec<Place>, ToolError> {
        let base = seed(location);
        let location_slug = slug(location);
        let places = TEMPLATES
            .iter()
            .enumerate()
            .map(|(n, template)| {
                // Jitter the coordinates and rating off the location hash so
                // different cities don't all plot at the same point.
                let jitter = ((base.rotate_left(n as u32 * 7) % 1000) as f64) / 1000.0;
                Place {
                    id: format!("plc_{location_slug}_{n}"),
                    name: format!("{location} {}", template.kind),
                    address: format!("{} Main Street, {location}", n + 1),
                    lat: 35.0 + jitter,
                    lng: 139.0 + jitter,
                    rating: Some(3.5 + (jitter * 1.5 * 10.0).round() / 10.0),
                    category: template.category.to_owned(),
                    price_tier: template.price_tier,
                    raw_types: template.raw_types.iter().map(|&t| t.to_owned()).collect(),
                }
            })
            .collect();
        Ok(places)
    }

    async fn detail(&self, place: &Place) -> Result<String, ToolError> {
        let rating = place
            .rating
            .map_or_else(|| "unrated".to_owned(), |r| format!("rated {r:.1}"));
        Ok(format!(
            "{} is a well-known {} in the area ({rating}). Visitors praise its \
             atmosphere and convenient location at {}. Typical visits run one to \
             two hours, and weekday mornings are quietest.",
            place.name,
            if place.category.is_empty() {
                "spot"
            } else {
                &place.category
            },
            place.address,
        ))
    }
}

const AIRLINES: [&str; 3] = ["Delta", "United", "ANA"];

/// Canned flight search. Prices derive from the route hash, results come
/// back cheapest first, and the same route always yields the same options.
#[derive(Default)]
pub struct PlaceholderFlights;

impl PlaceholderFlights {
    /// Create the provider.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl FlightSearch for PlaceholderFlights {
    async fn search(
        &self,
        origin: &str,
        destination: &str,
    ) -> Result<Vec<FlightOption>, ToolError> {
        let base_price = if origin.eq_ignore_ascii_case(destination) {
            0.0
        } else {
            400.0
        };
        let route = seed(&format!(
            "{}->{}",
            origin.to_ascii_lowercase(),
            destination.to_ascii_lowercase()
        ));
        let mut options: Vec<FlightOption> = AIRLINES
            .iter()
            .enumerate()
            .map(|(n, airline)| {
                let spread = (route.rotate_left(n as u32 * 11) % 200) as f64;
                FlightOption {
                    flight_number: format!("{}{}", &airline[..1], 100 + (route % 800) + n as u64),
                    airline: (*airline).to_owned(),
                    price: base_price + spread,
                    time: format!("{:02}:00", 6 + (n * 5)),
                }
            })
            .collect();
        options.sort_by(|a, b| a.price.total_cmp(&b.price));
        Ok(options)
    }
}
