//! Provider error types.

use thiserror::Error;

/// Errors from an external lookup provider.
#[derive(Debug, Error)]
pub enum ToolError {
    /// Transport-level failure.
    #[error("provider request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// Provider returned a non-success status.
    #[error("provider returned HTTP {status}: {body}")]
    Status {
        /// HTTP status code.
        status: u16,
        /// Response body (possibly truncated).
        body: String,
    },

    /// Provider response could not be interpreted.
    #[error("malformed provider response: {0}")]
    Malformed(String),
}
