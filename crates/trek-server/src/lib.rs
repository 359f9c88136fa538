//! # trek-server
//!
//! HTTP surface over the orchestration runtime:
//!
//! - `POST /api/plan` — create a thread and stream its first run
//! - `POST /api/resume` — merge a resume payload and stream the next run
//! - `GET /health`, `GET /metrics`
//!
//! Run streams are newline-delimited JSON ([`trek_core::Frame`] per
//! line), flushed as the driver produces them.
//!
//! ## Crate Position
//!
//! Depends on trek-core, trek-store, trek-runtime. Depended on by the
//! binary.

#![deny(unsafe_code)]

pub mod error;
pub mod metrics;
pub mod routes;
pub mod state;
pub mod stream;

pub use error::ApiError;
pub use routes::router;
pub use state::AppState;
