//! HTTP endpoints.

use std::sync::Arc;

use axum::extract::State;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use metrics::counter;
use serde::Deserialize;
use serde_json::json;
use tokio::sync::mpsc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{info, instrument};

use trek_core::{ChatMessage, StateUpdate, WorkflowStage};
use trek_store::ThreadSeed;

use crate::error::ApiError;
use crate::metrics::API_REQUESTS_TOTAL;
use crate::state::AppState;
use crate::stream::ndjson_response;

/// Frames buffered per stream before the driver awaits the client.
const STREAM_BUFFER: usize = 64;

/// Build the application router.
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/api/plan", post(plan))
        .route("/api/resume", post(resume))
        .route("/health", get(health))
        .route("/metrics", get(render_metrics))
        // The browser client is served from another origin; the original
        // deployment allowed all.
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[derive(Debug, Deserialize)]
struct PlanRequest {
    query: String,
    budget: f64,
    location: String,
    #[serde(default)]
    description: String,
}

/// What the user wants done with the thread on resume.
#[derive(Clone, Copy, Debug, Deserialize)]
#[serde(rename_all = "snake_case")]
enum ResumeAction {
    /// Research the selected places.
    Research,
    /// Build the itinerary around the selected place.
    PlanItinerary,
    /// Just merge the payload and let the router decide.
    Other,
}

#[derive(Debug, Deserialize)]
struct ResumeRequest {
    thread_id: String,
    #[serde(default)]
    selected_places: Option<Vec<String>>,
    #[serde(default)]
    message: Option<String>,
    action: ResumeAction,
}

#[instrument(skip_all, fields(location = %request.location))]
async fn plan(
    State(state): State<Arc<AppState>>,
    Json(request): Json<PlanRequest>,
) -> Result<Response, ApiError> {
    counter!(API_REQUESTS_TOTAL, "endpoint" => "plan").increment(1);
    if !request.budget.is_finite() || request.budget < 0.0 {
        return Err(ApiError::BadRequest("budget must be non-negative".to_owned()));
    }
    if request.location.trim().is_empty() {
        return Err(ApiError::BadRequest("location is required".to_owned()));
    }

    let seeded = state.store.create_thread(&ThreadSeed {
        query: &request.query,
        budget: request.budget,
        location: &request.location,
        description: &request.description,
    })?;
    let guard = state.registry.begin(&seeded.thread_id)?;
    info!(thread_id = %seeded.thread_id, "thread created");

    Ok(spawn_stream(&state, guard))
}

#[instrument(skip_all, fields(thread_id = %request.thread_id))]
async fn resume(
    State(state): State<Arc<AppState>>,
    Json(request): Json<ResumeRequest>,
) -> Result<Response, ApiError> {
    counter!(API_REQUESTS_TOTAL, "endpoint" => "resume").increment(1);
    if !state.store.exists(&request.thread_id)? {
        return Err(ApiError::NotFound(request.thread_id));
    }
    let guard = state.registry.begin(&request.thread_id)?;

    // Merge the resume payload as a committed update before the driver
    // restarts; the router then decides purely from state.
    let update = StateUpdate {
        messages: request
            .message
            .into_iter()
            .map(ChatMessage::user)
            .collect(),
        selected_places: request.selected_places,
        workflow_stage: match request.action {
            ResumeAction::Research => Some(WorkflowStage::SelectLocations),
            ResumeAction::PlanItinerary => Some(WorkflowStage::ChooseLocations),
            ResumeAction::Other => None,
        },
        ..StateUpdate::default()
    };
    if !update.is_empty() {
        let _ = state.store.apply(&request.thread_id, &update)?;
    }

    Ok(spawn_stream(&state, guard))
}

fn spawn_stream(state: &Arc<AppState>, guard: trek_runtime::RunGuard) -> Response {
    let (tx, rx) = mpsc::channel(STREAM_BUFFER);
    let driver = Arc::clone(&state.driver);
    let _join = tokio::spawn(async move { driver.run(guard, tx).await });
    ndjson_response(rx)
}

async fn health() -> impl IntoResponse {
    Json(json!({ "status": "ok" }))
}

async fn render_metrics(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    state.metrics.render()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resume_action_wire_names() {
        let action: ResumeAction = serde_json::from_str("\"plan_itinerary\"").unwrap();
        assert!(matches!(action, ResumeAction::PlanItinerary));
        let action: ResumeAction = serde_json::from_str("\"research\"").unwrap();
        assert!(matches!(action, ResumeAction::Research));
        assert!(serde_json::from_str::<ResumeAction>("\"explode\"").is_err());
    }

    #[test]
    fn plan_request_defaults_description() {
        let request: PlanRequest = serde_json::from_str(
            r#"{"query": "plan a trip", "budget": 1200.0, "location": "Tokyo"}"#,
        )
        .unwrap();
        assert_eq!(request.description, "");
        assert!((request.budget - 1200.0).abs() < f64::EPSILON);
    }
}
