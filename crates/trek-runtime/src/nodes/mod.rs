//! Worker nodes.
//!
//! A node reads a committed snapshot, performs its lookups and decision
//! calls, and returns one `StateUpdate`. It never writes to the store and
//! never touches `remaining_budget`; the driver commits the update as a
//! single transaction.

use async_trait::async_trait;
use metrics::counter;
use tracing::warn;

use trek_core::{StateUpdate, TripState};

use crate::context::NodeContext;
use crate::errors::{Result, RuntimeError};
use crate::router::NodeKind;

mod itinerary;
mod research;
mod search;

pub use itinerary::ItineraryNode;
pub use research::ResearchNode;
pub use search::SearchNode;

/// One stage worker.
#[async_trait]
pub trait WorkerNode: Send + Sync {
    /// Which node this is.
    fn kind(&self) -> NodeKind;

    /// Execute against a committed snapshot, producing the update to
    /// commit.
    async fn run(&self, ctx: &NodeContext, state: &TripState) -> Result<StateUpdate>;
}

/// Static dispatch table from router decision to worker.
pub fn node_for(kind: NodeKind) -> &'static dyn WorkerNode {
    static SEARCH: SearchNode = SearchNode;
    static RESEARCH: ResearchNode = ResearchNode;
    static ITINERARY: ItineraryNode = ItineraryNode;
    match kind {
        NodeKind::Search => &SEARCH,
        NodeKind::Research => &RESEARCH,
        NodeKind::Itinerary => &ITINERARY,
    }
}

/// Run a lookup future under the context deadline.
async fn with_deadline<T, E>(
    ctx: &NodeContext,
    node: &'static str,
    fut: impl std::future::Future<Output = std::result::Result<T, E>> + Send,
) -> Result<T>
where
    RuntimeError: From<E>,
{
    match tokio::time::timeout(ctx.tool_timeout, fut).await {
        Ok(result) => result.map_err(RuntimeError::from),
        Err(_) => {
            counter!("node_timeouts_total", "node" => node).increment(1);
            warn!(node, "lookup deadline exceeded");
            Err(RuntimeError::NodeTimeout {
                node,
                seconds: ctx.tool_timeout.as_secs(),
            })
        }
    }
}

fn record_run(kind: NodeKind) {
    counter!("node_runs_total", "node" => kind.as_str()).increment(1);
}
