//! # trek-llm
//!
//! The decision-function seam: worker nodes hand a synthesized instruction
//! (plus the transcript) to a [`Planner`] and get back either narrative
//! text or a single choice from a fixed option set. The orchestration core
//! never depends on *which* planner is wired in:
//!
//! - [`gemini::GeminiPlanner`] — Google Generative Language HTTP provider
//! - [`heuristic::HeuristicPlanner`] — deterministic templates, used when
//!   no credentials are configured and as the degradation path
//!
//! ## Crate Position
//!
//! Depends on trek-core. Depended on by trek-runtime and the binary.

#![deny(unsafe_code)]

pub mod gemini;
pub mod heuristic;

use async_trait::async_trait;
use thiserror::Error;

use trek_core::ChatMessage;

/// Errors from a planner provider.
#[derive(Debug, Error)]
pub enum PlannerError {
    /// Transport-level failure.
    #[error("planner request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// Provider returned a non-success status.
    #[error("planner returned HTTP {status}: {body}")]
    Status {
        /// HTTP status code.
        status: u16,
        /// Response body (possibly truncated).
        body: String,
    },

    /// Provider response had no usable content.
    #[error("planner response was empty or malformed")]
    EmptyResponse,
}

/// The narrative language model.
///
/// Replies are opaque to the orchestration core: routing is decided from
/// committed state alone, so a planner can only shape the text shown to
/// the user, never which node runs next.
#[async_trait]
pub trait Planner: Send + Sync {
    /// Produce a natural-language reply for an instruction, given the
    /// conversation so far.
    async fn reply(
        &self,
        instruction: &str,
        transcript: &[ChatMessage],
    ) -> Result<String, PlannerError>;
}

pub use heuristic::HeuristicPlanner;

/// Build a planner from the environment: Gemini when `GEMINI_API_KEY` is
/// set, deterministic heuristics otherwise.
pub fn planner_from_env() -> std::sync::Arc<dyn Planner> {
    match std::env::var("GEMINI_API_KEY") {
        Ok(key) if !key.is_empty() => {
            tracing::info!("using Gemini planner");
            std::sync::Arc::new(gemini::GeminiPlanner::new(key))
        }
        _ => {
            tracing::warn!("GEMINI_API_KEY not set, using deterministic heuristic planner");
            std::sync::Arc::new(HeuristicPlanner::new())
        }
    }
}
