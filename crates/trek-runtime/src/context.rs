//! Shared dependencies handed to worker nodes.

use std::sync::Arc;
use std::time::Duration;

use trek_llm::Planner;
use trek_tools::{FlightSearch, PlaceDirectory};

/// Everything a worker node needs to run: the decision function, the
/// lookup providers, and the per-call deadline. Constructed once per
/// process and shared across sessions; nodes receive it by reference and
/// never reach for globals.
#[derive(Clone)]
pub struct NodeContext {
    /// Decision function.
    pub planner: Arc<dyn Planner>,
    /// Place search/detail provider.
    pub places: Arc<dyn PlaceDirectory>,
    /// Flight search provider.
    pub flights: Arc<dyn FlightSearch>,
    /// Deadline for a single external lookup.
    pub tool_timeout: Duration,
}

impl NodeContext {
    /// Default single-lookup deadline.
    pub const DEFAULT_TOOL_TIMEOUT: Duration = Duration::from_secs(20);

    /// Build a context from its parts.
    pub fn new(
        planner: Arc<dyn Planner>,
        places: Arc<dyn PlaceDirectory>,
        flights: Arc<dyn FlightSearch>,
    ) -> Self {
        Self {
            planner,
            places,
            flights,
            tool_timeout: Self::DEFAULT_TOOL_TIMEOUT,
        }
    }

    /// Override the lookup deadline.
    #[must_use]
    pub fn with_tool_timeout(mut self, timeout: Duration) -> Self {
        self.tool_timeout = timeout;
        self
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use trek_llm::HeuristicPlanner;
    use trek_tools::{PlaceholderDirectory, PlaceholderFlights};

    /// Fully deterministic context for node and driver tests.
    pub fn deterministic_context() -> NodeContext {
        NodeContext::new(
            Arc::new(HeuristicPlanner::new()),
            Arc::new(PlaceholderDirectory::new()),
            Arc::new(PlaceholderFlights::new()),
        )
    }
}
