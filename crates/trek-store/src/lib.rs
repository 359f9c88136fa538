//! # trek-store
//!
//! Durable, versioned session state keyed by thread id.
//!
//! One SQLite row per thread holds the serialized [`trek_core::TripState`]
//! snapshot plus its schema version. All writes go through
//! [`StateStore::apply`], which holds a per-thread write lock across
//! read → reduce → commit so concurrent commits can never lose updates,
//! and runs inside a single transaction so callers never observe partial
//! state.
//!
//! ## Crate Position
//!
//! Depends on trek-core. Depended on by trek-runtime and trek-server.

#![deny(unsafe_code)]

pub mod connection;
pub mod errors;
pub mod store;

pub use connection::{ConnectionConfig, ConnectionPool, new_file, new_in_memory, run_migrations};
pub use errors::{Result, StoreError};
pub use store::{StateStore, ThreadSeed};
