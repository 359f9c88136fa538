//! Runtime error types.

use thiserror::Error;

/// Errors from the orchestration runtime.
#[derive(Debug, Error)]
pub enum RuntimeError {
    /// Thread does not exist.
    #[error("thread not found: {0}")]
    ThreadNotFound(String),

    /// Thread already has an active run.
    #[error("thread is busy: {0}")]
    ThreadBusy(String),

    /// Server is at max concurrent runs.
    #[error("server at capacity ({current}/{max} runs)")]
    ServerBusy {
        /// Current active run count.
        current: usize,
        /// Configured maximum.
        max: usize,
    },

    /// Store failure.
    #[error("store error: {0}")]
    Store(#[from] trek_store::StoreError),

    /// Lookup provider failure that could not be degraded.
    #[error("tool error: {0}")]
    Tool(#[from] trek_tools::ToolError),

    /// Decision function failure.
    #[error("planner error: {0}")]
    Planner(#[from] trek_llm::PlannerError),

    /// A node exceeded its execution deadline.
    #[error("node {node} timed out after {seconds}s")]
    NodeTimeout {
        /// Node name.
        node: &'static str,
        /// Configured deadline.
        seconds: u64,
    },
}

/// Runtime result alias.
pub type Result<T, E = RuntimeError> = std::result::Result<T, E>;
