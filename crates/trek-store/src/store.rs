//! The `StateStore`: versioned snapshots with per-thread mutual exclusion.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use std::time::Duration;

use rusqlite::OptionalExtension;
use tracing::{debug, instrument, warn};
use uuid::Uuid;

use trek_core::state::{SCHEMA_VERSION, StateUpdate, TripState};

use crate::connection::{ConnectionPool, PooledConnection};
use crate::errors::{Result, StoreError};

/// Inputs for seeding a fresh thread.
#[derive(Clone, Debug)]
pub struct ThreadSeed<'a> {
    /// Opening user query.
    pub query: &'a str,
    /// Total (and initial remaining) budget.
    pub budget: f64,
    /// Destination location.
    pub location: &'a str,
    /// Free-text description of what the user wants.
    pub description: &'a str,
}

/// Durable state store over a pooled SQLite database.
///
/// INVARIANT: writes to one thread are serialized by an in-process
/// per-thread mutex held across read → reduce → commit. The lock is held
/// only around the commit, never around external tool calls — nodes run
/// against a snapshot and hand their partial update to [`StateStore::apply`].
pub struct StateStore {
    pool: ConnectionPool,
    thread_locks: Mutex<HashMap<String, Weak<Mutex<()>>>>,
}

impl StateStore {
    const BUSY_MAX_RETRIES: u32 = 32;

    /// Wrap a connection pool. Migrations must already have run.
    pub fn new(pool: ConnectionPool) -> Self {
        Self {
            pool,
            thread_locks: Mutex::new(HashMap::new()),
        }
    }

    fn conn(&self) -> Result<PooledConnection> {
        Ok(self.pool.get()?)
    }

    fn acquire_thread_lock(&self, thread_id: &str) -> Result<Arc<Mutex<()>>> {
        let mut locks = self
            .thread_locks
            .lock()
            .map_err(|_| StoreError::Internal("thread lock map poisoned".into()))?;

        // Opportunistically prune dead weak refs when the map grows.
        if locks.len() > 128 {
            locks.retain(|_, weak| weak.strong_count() > 0);
        }

        if let Some(existing) = locks.get(thread_id).and_then(Weak::upgrade) {
            return Ok(existing);
        }
        let lock = Arc::new(Mutex::new(()));
        let _ = locks.insert(thread_id.to_owned(), Arc::downgrade(&lock));
        Ok(lock)
    }

    fn with_thread_write_lock<T>(
        &self,
        thread_id: &str,
        mut f: impl FnMut() -> Result<T>,
    ) -> Result<T> {
        let lock = self.acquire_thread_lock(thread_id)?;
        let _guard: MutexGuard<'_, ()> = lock
            .lock()
            .map_err(|_| StoreError::Internal("thread write lock poisoned".into()))?;
        Self::retry_on_busy(&mut f)
    }

    /// Retry on `SQLite` BUSY/LOCKED with linear backoff + jitter.
    fn retry_on_busy<T>(f: &mut impl FnMut() -> Result<T>) -> Result<T> {
        let mut attempts = 0;
        loop {
            match f() {
                Ok(value) => return Ok(value),
                Err(err) if Self::is_busy(&err) && attempts < Self::BUSY_MAX_RETRIES => {
                    attempts += 1;
                    let base_ms = u64::from(attempts).saturating_mul(10).min(500);
                    let jitter_range = base_ms / 4;
                    let jitter = if jitter_range > 0 {
                        rand::random::<u64>() % (jitter_range * 2 + 1)
                    } else {
                        0
                    };
                    let backoff = base_ms.saturating_sub(jitter_range) + jitter;
                    std::thread::sleep(Duration::from_millis(backoff));
                }
                Err(err) => return Err(err),
            }
        }
    }

    fn is_busy(err: &StoreError) -> bool {
        match err {
            StoreError::Sqlite(rusqlite::Error::SqliteFailure(code, _)) => matches!(
                code.code,
                rusqlite::ErrorCode::DatabaseBusy | rusqlite::ErrorCode::DatabaseLocked
            ),
            _ => false,
        }
    }

    fn decode(thread_id: &str, schema_version: u32, payload: &str) -> Result<TripState> {
        if schema_version > SCHEMA_VERSION {
            return Err(StoreError::UnsupportedSchema {
                found: schema_version,
                supported: SCHEMA_VERSION,
            });
        }
        let mut state: TripState = serde_json::from_str(payload)?;
        // Heal any drift on the way out: the balance is always derived.
        state.recompute_budget();
        debug_assert_eq!(state.thread_id, thread_id);
        Ok(state)
    }

    // ─────────────────────────────────────────────────────────────────────
    // Thread lifecycle
    // ─────────────────────────────────────────────────────────────────────

    /// Create a new thread and seed its state.
    #[instrument(skip(self, seed), fields(location = seed.location))]
    pub fn create_thread(&self, seed: &ThreadSeed<'_>) -> Result<TripState> {
        let thread_id = format!("thr_{}", Uuid::now_v7());
        let state = TripState::new(
            &thread_id,
            seed.query,
            seed.budget,
            seed.location,
            seed.description,
        );
        let payload = serde_json::to_string(&state)?;
        let now = chrono::Utc::now().to_rfc3339();

        let conn = self.conn()?;
        let _ = conn.execute(
            "INSERT INTO threads (thread_id, schema_version, state, created, updated)
             VALUES (?1, ?2, ?3, ?4, ?4)",
            rusqlite::params![thread_id, SCHEMA_VERSION, payload, now],
        )?;
        metrics::counter!("threads_created_total").increment(1);
        debug!(thread_id, "thread created");
        Ok(state)
    }

    /// Load the current snapshot for a thread.
    pub fn load(&self, thread_id: &str) -> Result<Option<TripState>> {
        let conn = self.conn()?;
        let row: Option<(u32, String)> = conn
            .query_row(
                "SELECT schema_version, state FROM threads WHERE thread_id = ?1",
                [thread_id],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;
        match row {
            Some((version, payload)) => Ok(Some(Self::decode(thread_id, version, &payload)?)),
            None => Ok(None),
        }
    }

    /// Whether a thread exists.
    pub fn exists(&self, thread_id: &str) -> Result<bool> {
        let conn = self.conn()?;
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM threads WHERE thread_id = ?1",
            [thread_id],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }

    /// Apply a partial update to a thread and return the committed snapshot.
    ///
    /// Atomic and serialized: the per-thread write lock spans the read of
    /// current state through the commit, and the row update is a single
    /// statement — a node's output is applied in full or not at all.
    #[instrument(skip(self, update), fields(thread_id))]
    pub fn apply(&self, thread_id: &str, update: &StateUpdate) -> Result<TripState> {
        self.with_thread_write_lock(thread_id, || {
            let conn = self.conn()?;
            let tx = conn.unchecked_transaction()?;

            let (version, payload): (u32, String) = tx
                .query_row(
                    "SELECT schema_version, state FROM threads WHERE thread_id = ?1",
                    [thread_id],
                    |row| Ok((row.get(0)?, row.get(1)?)),
                )
                .optional()?
                .ok_or_else(|| StoreError::ThreadNotFound(thread_id.to_owned()))?;

            let mut state = Self::decode(thread_id, version, &payload)?;
            state.apply(update.clone());

            let serialized = serde_json::to_string(&state)?;
            let now = chrono::Utc::now().to_rfc3339();
            let _ = tx.execute(
                "UPDATE threads SET schema_version = ?2, state = ?3, updated = ?4
                 WHERE thread_id = ?1",
                rusqlite::params![thread_id, SCHEMA_VERSION, serialized, now],
            )?;
            tx.commit()?;
            Ok(state)
        })
    }

    /// Delete a thread (session abandonment). Returns true if it existed.
    pub fn delete(&self, thread_id: &str) -> Result<bool> {
        let deleted = self.with_thread_write_lock(thread_id, || {
            let conn = self.conn()?;
            Ok(conn.execute("DELETE FROM threads WHERE thread_id = ?1", [thread_id])?)
        })?;
        if deleted > 0 {
            warn!(thread_id, "thread deleted");
        }
        Ok(deleted > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use trek_core::state::{ChatMessage, WorkflowStage};
    use trek_core::{BookingStatus, ItineraryItem, ItineraryKind};

    fn make_store() -> StateStore {
        let pool = crate::connection::new_in_memory(&crate::ConnectionConfig::default()).unwrap();
        {
            let conn = pool.get().unwrap();
            let _ = crate::connection::run_migrations(&conn).unwrap();
        }
        StateStore::new(pool)
    }

    fn seed<'a>() -> ThreadSeed<'a> {
        ThreadSeed {
            query: "Plan a trip to Tokyo",
            budget: 2500.0,
            location: "Tokyo",
            description: "art and food",
        }
    }

    #[test]
    fn create_then_load_roundtrip() {
        let store = make_store();
        let state = store.create_thread(&seed()).unwrap();
        assert!(state.thread_id.starts_with("thr_"));
        assert_eq!(state.workflow_stage, WorkflowStage::Search);

        let loaded = store.load(&state.thread_id).unwrap().unwrap();
        assert_eq!(loaded, state);
    }

    #[test]
    fn load_unknown_thread_returns_none() {
        let store = make_store();
        assert!(store.load("thr_missing").unwrap().is_none());
        assert!(!store.exists("thr_missing").unwrap());
    }

    #[test]
    fn apply_unknown_thread_is_not_found() {
        let store = make_store();
        let err = store.apply("thr_missing", &StateUpdate::default()).unwrap_err();
        assert!(matches!(err, StoreError::ThreadNotFound(_)));
    }

    #[test]
    fn apply_commits_and_recomputes_budget() {
        let store = make_store();
        let state = store.create_thread(&seed()).unwrap();

        let update = StateUpdate {
            itinerary: vec![ItineraryItem {
                name: "Hotel".into(),
                cost: 600.0,
                kind: ItineraryKind::Hotel,
                status: BookingStatus::Confirmed,
            }],
            messages: vec![ChatMessage::assistant("Booked the hotel.")],
            ..StateUpdate::default()
        };
        let committed = store.apply(&state.thread_id, &update).unwrap();
        assert_eq!(committed.remaining_budget, 1900.0);
        assert_eq!(committed.itinerary.len(), 1);

        // Durable: a fresh load sees the same snapshot.
        let loaded = store.load(&state.thread_id).unwrap().unwrap();
        assert_eq!(loaded, committed);
    }

    #[test]
    fn unsupported_schema_is_rejected() {
        let store = make_store();
        let state = store.create_thread(&seed()).unwrap();
        {
            let conn = store.pool.get().unwrap();
            let _ = conn
                .execute(
                    "UPDATE threads SET schema_version = 99 WHERE thread_id = ?1",
                    [&state.thread_id],
                )
                .unwrap();
        }
        let err = store.load(&state.thread_id).unwrap_err();
        assert!(matches!(err, StoreError::UnsupportedSchema { found: 99, .. }));
    }

    #[test]
    fn delete_removes_thread() {
        let store = make_store();
        let state = store.create_thread(&seed()).unwrap();
        assert!(store.delete(&state.thread_id).unwrap());
        assert!(!store.delete(&state.thread_id).unwrap());
        assert!(store.load(&state.thread_id).unwrap().is_none());
    }

    #[test]
    fn concurrent_appends_lose_nothing() {
        let store = Arc::new(make_store());
        let state = store.create_thread(&seed()).unwrap();
        let thread_id = state.thread_id.clone();

        let handles: Vec<_> = (0..8)
            .map(|i| {
                let store = Arc::clone(&store);
                let thread_id = thread_id.clone();
                std::thread::spawn(move || {
                    let update = StateUpdate {
                        research_notes: vec![format!("note-{i}")],
                        ..StateUpdate::default()
                    };
                    store.apply(&thread_id, &update).unwrap();
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let final_state = store.load(&thread_id).unwrap().unwrap();
        assert_eq!(final_state.research_notes.len(), 8);
        for i in 0..8 {
            assert!(final_state.research_notes.contains(&format!("note-{i}")));
        }
    }

    #[test]
    fn paused_state_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("trek.db");
        let thread_id;
        {
            let pool =
                crate::connection::new_file(&path, &crate::ConnectionConfig::default()).unwrap();
            {
                let conn = pool.get().unwrap();
                let _ = crate::connection::run_migrations(&conn).unwrap();
            }
            let store = StateStore::new(pool);
            let state = store.create_thread(&seed()).unwrap();
            thread_id = state.thread_id.clone();
            let _ = store
                .apply(
                    &thread_id,
                    &StateUpdate {
                        workflow_stage: Some(WorkflowStage::SelectLocations),
                        ..StateUpdate::default()
                    },
                )
                .unwrap();
        }

        // Simulated process restart.
        let pool = crate::connection::new_file(&path, &crate::ConnectionConfig::default()).unwrap();
        {
            let conn = pool.get().unwrap();
            let _ = crate::connection::run_migrations(&conn).unwrap();
        }
        let store = StateStore::new(pool);
        let state = store.load(&thread_id).unwrap().unwrap();
        assert_eq!(state.workflow_stage, WorkflowStage::SelectLocations);
    }
}
