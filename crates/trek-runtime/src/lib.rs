//! # trek-runtime
//!
//! The orchestration core: everything between a committed state snapshot
//! and the next one.
//!
//! - [`router::decide`] — pure routing over the snapshot
//! - [`nodes`] — the search, research, and itinerary workers
//! - [`driver::SessionDriver`] — route → run → commit → emit loop with
//!   durable pause points
//! - [`registry::ThreadRegistry`] — one live run per thread, bounded
//!   runs per process
//! - [`emitter::StreamEmitter`] — ordered, de-duplicated wire frames
//!
//! ## Crate Position
//!
//! Depends on trek-core, trek-store, trek-llm, trek-tools. Depended on by
//! trek-server.

#![deny(unsafe_code)]

pub mod context;
pub mod driver;
pub mod emitter;
pub mod errors;
pub mod nodes;
pub mod registry;
pub mod router;

pub use context::NodeContext;
pub use driver::{MAX_STEPS, SessionDriver};
pub use emitter::StreamEmitter;
pub use errors::RuntimeError;
pub use registry::{RunGuard, ThreadRegistry};
pub use router::{NodeKind, Route, UserIntent, decide};
