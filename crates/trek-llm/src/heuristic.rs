//! Deterministic fallback planner.
//!
//! Used when no provider credentials are configured, and by nodes as the
//! degradation path when a live provider fails mid-session. Replies are
//! templated from the instruction so the workflow stays fully functional
//! (and testable) offline.

use async_trait::async_trait;

use trek_core::ChatMessage;

use crate::{Planner, PlannerError};

/// Planner that answers from fixed templates. Never fails.
#[derive(Clone, Copy, Debug, Default)]
pub struct HeuristicPlanner;

impl HeuristicPlanner {
    /// Create a heuristic planner.
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Planner for HeuristicPlanner {
    async fn reply(
        &self,
        instruction: &str,
        _transcript: &[ChatMessage],
    ) -> Result<String, PlannerError> {
        // The instruction already carries the substance (place lists,
        // booking summaries); echoing it keeps replies deterministic.
        Ok(instruction.to_owned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn reply_echoes_instruction() {
        let planner = HeuristicPlanner::new();
        let out = planner.reply("Found 5 places in Tokyo.", &[]).await.unwrap();
        assert_eq!(out, "Found 5 places in Tokyo.");
    }
}
