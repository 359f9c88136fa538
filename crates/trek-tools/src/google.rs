//! Google Places (new) API provider.
//!
//! `searchText` for discovery and the place-details endpoint for research
//! narratives. Field masks keep responses small; price levels map onto
//! [`PriceTier`] via its provider-string parser.

use async_trait::async_trait;
use serde_json::{Value, json};
use tracing::{debug, instrument, warn};

use trek_core::{Place, PriceTier};

use crate::PlaceDirectory;
use crate::errors::ToolError;

const BASE_URL: &str = "https://places.googleapis.com/v1";
const MAX_RESULTS: u32 = 5;
const ERROR_BODY_LIMIT: usize = 512;

const SEARCH_FIELD_MASK: &str = "places.id,places.displayName,places.formattedAddress,\
     places.location,places.rating,places.priceLevel,places.primaryType,places.types";
const DETAIL_FIELD_MASK: &str = "displayName,editorialSummary,rating,formattedAddress";

/// Place directory backed by the Google Places API.
pub struct GooglePlacesDirectory {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
}

impl GooglePlacesDirectory {
    /// Create a directory with the given API key.
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key: api_key.into(),
            base_url: BASE_URL.to_owned(),
        }
    }

    /// Override the API base URL (tests).
    #[must_use]
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    async fn check(response: reqwest::Response) -> Result<Value, ToolError> {
        let status = response.status();
        if !status.is_success() {
            let mut body = response.text().await.unwrap_or_default();
            body.truncate(ERROR_BODY_LIMIT);
            warn!(status = status.as_u16(), "places request failed");
            return Err(ToolError::Status {
                status: status.as_u16(),
                body,
            });
        }
        Ok(response.json().await?)
    }

    fn parse_place(value: &Value) -> Option<Place> {
        let id = value.get("id")?.as_str()?.to_owned();
        let name = value
            .pointer("/displayName/text")
            .and_then(Value::as_str)
            .unwrap_or("Unknown place")
            .to_owned();
        let raw_types: Vec<String> = value
            .get("types")
            .and_then(Value::as_array)
            .map(|arr| {
                arr.iter()
                    .filter_map(Value::as_str)
                    .map(str::to_owned)
                    .collect()
            })
            .unwrap_or_default();
        Some(Place {
            id,
            name,
            address: value
                .get("formattedAddress")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_owned(),
            lat: value
                .pointer("/location/latitude")
                .and_then(Value::as_f64)
                .unwrap_or_default(),
            lng: value
                .pointer("/location/longitude")
                .and_then(Value::as_f64)
                .unwrap_or_default(),
            rating: value.get("rating").and_then(Value::as_f64),
            category: value
                .get("primaryType")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_owned(),
            price_tier: value
                .get("priceLevel")
                .and_then(Value::as_str)
                .map(PriceTier::from_provider)
                .unwrap_or_default(),
            raw_types,
        })
    }
}

#[async_trait]
impl PlaceDirectory for GooglePlacesDirectory {
    #[instrument(skip(self))]
    async fn search(&self, location: &str, query: &str) -> Result<Vec<Place>, ToolError> {
        let text_query = if query.is_empty() {
            format!("things to do in {location}")
        } else {
            format!("{query} in {location}")
        };
        let response = self
            .client
            .post(format!("{}/places:searchText", self.base_url))
            .header("X-Goog-Api-Key", &self.api_key)
            .header("X-Goog-FieldMask", SEARCH_FIELD_MASK)
            .json(&json!({
                "textQuery": text_query,
                "maxResultCount": MAX_RESULTS,
            }))
            .send()
            .await?;

        let body = Self::check(response).await?;
        let places: Vec<Place> = body
            .get("places")
            .and_then(Value::as_array)
            .map(|arr| arr.iter().filter_map(Self::parse_place).collect())
            .unwrap_or_default();
        debug!(count = places.len(), "places found");
        Ok(places)
    }

    #[instrument(skip(self, place), fields(place_id = %place.id))]
    async fn detail(&self, place: &Place) -> Result<String, ToolError> {
        let response = self
            .client
            .get(format!("{}/places/{}", self.base_url, place.id))
            .header("X-Goog-Api-Key", &self.api_key)
            .header("X-Goog-FieldMask", DETAIL_FIELD_MASK)
            .send()
            .await?;

        let body = Self::check(response).await?;
        let summary = body
            .pointer("/editorialSummary/text")
            .and_then(Value::as_str)
            .map(str::to_owned);
        summary.ok_or_else(|| ToolError::Malformed("no editorial summary".to_owned()))
    }
}
