//! Gemini provider over the Generative Language REST API.
//!
//! Plain `generateContent` calls with API-key auth — no streaming, no
//! tool-calling; the orchestration core only needs short narrative replies
//! and single-choice routing answers.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::{debug, instrument, warn};

use trek_core::{ChatMessage, Role};

use crate::{Planner, PlannerError};

const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";
const DEFAULT_MODEL: &str = "gemini-2.0-flash";
/// Cap on echoed error bodies.
const ERROR_BODY_LIMIT: usize = 512;

/// Gemini decision-function provider.
pub struct GeminiPlanner {
    client: reqwest::Client,
    api_key: String,
    model: String,
    base_url: String,
}

#[derive(Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
}

#[derive(Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Deserialize)]
struct Part {
    #[serde(default)]
    text: String,
}

impl GeminiPlanner {
    /// Create a provider with the default model and endpoint.
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key: api_key.into(),
            model: DEFAULT_MODEL.to_owned(),
            base_url: DEFAULT_BASE_URL.to_owned(),
        }
    }

    /// Override the model name.
    #[must_use]
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    /// Override the API base URL (tests).
    #[must_use]
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    fn contents(instruction: &str, transcript: &[ChatMessage]) -> Vec<Value> {
        let mut contents: Vec<Value> = transcript
            .iter()
            .map(|msg| {
                let role = match msg.role {
                    Role::User => "user",
                    Role::Assistant => "model",
                };
                json!({"role": role, "parts": [{"text": msg.content}]})
            })
            .collect();
        contents.push(json!({"role": "user", "parts": [{"text": instruction}]}));
        contents
    }

    #[instrument(skip_all, fields(model = %self.model))]
    async fn generate(&self, contents: Vec<Value>) -> Result<String, PlannerError> {
        let url = format!(
            "{}/models/{}:generateContent?key={}",
            self.base_url, self.model, self.api_key
        );
        let body = json!({
            "contents": contents,
            "generationConfig": {"temperature": 0.0},
        });

        let response = self.client.post(&url).json(&body).send().await?;
        let status = response.status();
        if !status.is_success() {
            let mut body = response.text().await.unwrap_or_default();
            body.truncate(ERROR_BODY_LIMIT);
            warn!(status = status.as_u16(), "gemini request failed");
            return Err(PlannerError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let parsed: GenerateResponse = response.json().await?;
        let text: String = parsed
            .candidates
            .first()
            .and_then(|c| c.content.as_ref())
            .map(|c| {
                c.parts
                    .iter()
                    .map(|p| p.text.as_str())
                    .collect::<Vec<_>>()
                    .join("")
            })
            .unwrap_or_default();

        if text.trim().is_empty() {
            return Err(PlannerError::EmptyResponse);
        }
        debug!(chars = text.len(), "gemini reply received");
        Ok(text)
    }
}

#[async_trait]
impl Planner for GeminiPlanner {
    async fn reply(
        &self,
        instruction: &str,
        transcript: &[ChatMessage],
    ) -> Result<String, PlannerError> {
        self.generate(Self::contents(instruction, transcript)).await
    }
}
