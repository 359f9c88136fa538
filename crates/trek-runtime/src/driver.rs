//! Session driver: the loop that advances one thread until it finishes
//! or pauses.
//!
//! Each step is route → run node → commit → emit. State only changes via
//! committed updates; a failure mid-node commits nothing. The loop halts
//! whenever a commit lands on a pause stage: that committed snapshot is
//! the durable paused state, and resuming later picks up from it exactly.

use std::sync::Arc;

use metrics::counter;
use tokio::sync::mpsc;
use tracing::{error, info, instrument, warn};

use trek_core::{Frame, StateUpdate, TripState, WorkflowStage};
use trek_store::StateStore;

use crate::context::NodeContext;
use crate::emitter::StreamEmitter;
use crate::errors::{Result, RuntimeError};
use crate::nodes::node_for;
use crate::registry::RunGuard;
use crate::router::{Route, decide};

/// Cap on router decisions per run. Every route either dispatches a node
/// that moves the stage forward or terminates, so a healthy run needs far
/// fewer; hitting the cap pauses with the pending node named.
pub const MAX_STEPS: usize = 8;

/// Drives threads to completion.
pub struct SessionDriver {
    store: Arc<StateStore>,
    ctx: NodeContext,
    max_steps: usize,
}

impl SessionDriver {
    /// Build a driver over a store and node context.
    pub fn new(store: Arc<StateStore>, ctx: NodeContext) -> Self {
        Self {
            store,
            ctx,
            max_steps: MAX_STEPS,
        }
    }

    /// Override the step cap (tests).
    #[must_use]
    pub fn with_max_steps(mut self, max_steps: usize) -> Self {
        self.max_steps = max_steps;
        self
    }

    /// Run one thread until it finishes or pauses, streaming frames into
    /// `tx`. The guard is held for the whole run and released on return.
    ///
    /// The stream always opens with `meta` and closes with exactly one of
    /// `status`, `error`, or `done` — unless the run is cancelled, which
    /// stops emission without a terminal frame.
    #[instrument(skip_all, fields(thread_id = %guard.thread_id()))]
    pub async fn run(&self, guard: RunGuard, tx: mpsc::Sender<Frame>) {
        let thread_id = guard.thread_id().to_owned();
        let cancel = guard.cancel_token();

        let state = match self.load(&thread_id) {
            Ok(state) => state,
            Err(err) => {
                error!(%err, "could not load thread");
                let mut emitter = StreamEmitter::new(tx, 0);
                let _ = emitter.send(Frame::Error { data: err.to_string() }).await;
                return;
            }
        };

        let mut emitter = StreamEmitter::new(tx, state.messages.len());
        let _ = emitter
            .send(Frame::Meta {
                thread_id: thread_id.clone(),
            })
            .await;

        match self.step_loop(&thread_id, state, &mut emitter, &cancel).await {
            Ok(()) => {}
            Err(err) => {
                error!(%err, "run failed");
                counter!("runs_failed_total").increment(1);
                if !cancel.is_cancelled() {
                    let _ = emitter.send(Frame::Error { data: err.to_string() }).await;
                }
            }
        }
    }

    fn load(&self, thread_id: &str) -> Result<TripState> {
        self.store
            .load(thread_id)?
            .ok_or_else(|| RuntimeError::ThreadNotFound(thread_id.to_owned()))
    }

    async fn step_loop(
        &self,
        thread_id: &str,
        mut state: TripState,
        emitter: &mut StreamEmitter,
        cancel: &tokio_util::sync::CancellationToken,
    ) -> Result<()> {
        for _step in 0..self.max_steps {
            if cancel.is_cancelled() {
                info!("run cancelled");
                return Ok(());
            }
            match decide(&state) {
                Route::Finish => {
                    if state.workflow_stage != WorkflowStage::Complete {
                        state = self.store.apply(
                            thread_id,
                            &StateUpdate {
                                workflow_stage: Some(WorkflowStage::Complete),
                                ..StateUpdate::default()
                            },
                        )?;
                        emitter.snapshot(&state).await;
                    }
                    info!("run complete");
                    let _ = emitter.send(Frame::Done).await;
                    return Ok(());
                }
                Route::NeedsInput { prompt } => {
                    // Durable re-prompt, no forward transition.
                    state = self.store.apply(
                        thread_id,
                        &StateUpdate::message(trek_core::ChatMessage::assistant(prompt)),
                    )?;
                    emitter.snapshot(&state).await;
                    let _ = emitter.send(Frame::paused_at(state.workflow_stage)).await;
                    return Ok(());
                }
                Route::Node(kind) => {
                    info!(node = %kind, "dispatching");
                    let update = node_for(kind).run(&self.ctx, &state).await?;
                    state = self.store.apply(thread_id, &update)?;
                    emitter.snapshot(&state).await;
                    if state.workflow_stage.is_pause_stage() {
                        info!(stage = %state.workflow_stage, "paused, awaiting input");
                        let _ = emitter.send(Frame::paused_at(state.workflow_stage)).await;
                        return Ok(());
                    }
                }
            }
        }

        // Step cap hit with a node still pending.
        if let Route::Node(kind) = decide(&state) {
            warn!(next = %kind, "step cap reached with work pending");
            let _ = emitter.send(Frame::paused_before(kind.as_str())).await;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::testing::deterministic_context;
    use crate::registry::ThreadRegistry;
    use trek_store::{ConnectionConfig, StateStore, ThreadSeed, new_in_memory, run_migrations};

    fn store() -> Arc<StateStore> {
        let pool = new_in_memory(&ConnectionConfig::default()).unwrap();
        let _ = run_migrations(&pool.get().unwrap()).unwrap();
        Arc::new(StateStore::new(pool))
    }

    fn seed<'a>() -> ThreadSeed<'a> {
        ThreadSeed {
            query: "plan me a trip to Tokyo",
            budget: 5000.0,
            location: "Tokyo",
            description: "art and food",
        }
    }

    async fn run_to_frames(
        driver: &SessionDriver,
        registry: &ThreadRegistry,
        thread_id: &str,
    ) -> Vec<Frame> {
        let (tx, mut rx) = mpsc::channel(256);
        let guard = registry.begin(thread_id).unwrap();
        driver.run(guard, tx).await;
        let mut frames = Vec::new();
        while let Ok(frame) = rx.try_recv() {
            frames.push(frame);
        }
        frames
    }

    #[tokio::test]
    async fn fresh_thread_runs_search_then_pauses() {
        let store = store();
        let driver = SessionDriver::new(Arc::clone(&store), deterministic_context());
        let registry = ThreadRegistry::new(4);
        let state = store.create_thread(&seed()).unwrap();

        let frames = run_to_frames(&driver, &registry, &state.thread_id).await;
        assert!(matches!(frames.first(), Some(Frame::Meta { thread_id }) if *thread_id == state.thread_id));
        assert!(matches!(
            frames.last(),
            Some(Frame::Status {
                stage: Some(WorkflowStage::SelectLocations),
                ..
            })
        ));

        let paused = store.load(&state.thread_id).unwrap().unwrap();
        assert_eq!(paused.workflow_stage, WorkflowStage::SelectLocations);
        assert_eq!(paused.found_places.len(), 5);
    }

    #[tokio::test]
    async fn full_session_reaches_complete() {
        let store = store();
        let driver = SessionDriver::new(Arc::clone(&store), deterministic_context());
        let registry = ThreadRegistry::new(4);
        let state = store.create_thread(&seed()).unwrap();
        let id = state.thread_id.clone();

        // Search pause.
        let _ = run_to_frames(&driver, &registry, &id).await;
        // Select two places, resume: research pause.
        let paused = store.load(&id).unwrap().unwrap();
        let picks: Vec<String> = paused.found_places.keys().take(2).cloned().collect();
        let _ = store
            .apply(
                &id,
                &StateUpdate {
                    selected_places: Some(picks.clone()),
                    ..StateUpdate::default()
                },
            )
            .unwrap();
        let _ = run_to_frames(&driver, &registry, &id).await;
        let paused = store.load(&id).unwrap().unwrap();
        assert_eq!(paused.workflow_stage, WorkflowStage::ChooseLocations);
        assert!(!paused.researched_places.is_empty());

        // Choose one place, resume: itinerary + review pause.
        let _ = store
            .apply(
                &id,
                &StateUpdate {
                    selected_places: Some(vec![picks[0].clone()]),
                    ..StateUpdate::default()
                },
            )
            .unwrap();
        let _ = run_to_frames(&driver, &registry, &id).await;
        let paused = store.load(&id).unwrap().unwrap();
        assert_eq!(paused.workflow_stage, WorkflowStage::ReviewItinerary);
        assert!(!paused.itinerary.is_empty());

        // Confirm: done.
        let _ = store
            .apply(
                &id,
                &StateUpdate::message(trek_core::ChatMessage::user("looks good, confirm it")),
            )
            .unwrap();
        let frames = run_to_frames(&driver, &registry, &id).await;
        assert!(matches!(frames.last(), Some(Frame::Done)));
        let done = store.load(&id).unwrap().unwrap();
        assert_eq!(done.workflow_stage, WorkflowStage::Complete);
        assert!(done.remaining_budget >= 0.0);
    }

    #[tokio::test]
    async fn empty_selection_reprompts_durably() {
        let store = store();
        let driver = SessionDriver::new(Arc::clone(&store), deterministic_context());
        let registry = ThreadRegistry::new(4);
        let state = store.create_thread(&seed()).unwrap();
        let id = state.thread_id.clone();

        let _ = run_to_frames(&driver, &registry, &id).await;
        // Resume without selecting anything.
        let frames = run_to_frames(&driver, &registry, &id).await;
        assert!(matches!(
            frames.last(),
            Some(Frame::Status {
                stage: Some(WorkflowStage::SelectLocations),
                ..
            })
        ));
        let paused = store.load(&id).unwrap().unwrap();
        assert_eq!(paused.workflow_stage, WorkflowStage::SelectLocations);
        assert!(
            paused
                .messages
                .last()
                .is_some_and(|m| m.content.contains("select") || m.content.contains("pick")),
            "re-prompt is committed"
        );
    }

    #[tokio::test]
    async fn unknown_thread_streams_one_error() {
        let store = store();
        let driver = SessionDriver::new(store, deterministic_context());
        let registry = ThreadRegistry::new(4);
        let frames = run_to_frames(&driver, &registry, "thr_missing").await;
        assert_eq!(frames.len(), 1);
        assert!(matches!(frames.first(), Some(Frame::Error { .. })));
    }

    #[tokio::test]
    async fn step_cap_pauses_with_pending_node() {
        let store = store();
        let driver =
            SessionDriver::new(Arc::clone(&store), deterministic_context()).with_max_steps(0);
        let registry = ThreadRegistry::new(4);
        let state = store.create_thread(&seed()).unwrap();

        let frames = run_to_frames(&driver, &registry, &state.thread_id).await;
        assert!(matches!(
            frames.last(),
            Some(Frame::Status { next: Some(next), .. }) if next == "search"
        ));
    }

    #[tokio::test]
    async fn cancelled_run_emits_no_terminal_frame() {
        let store = store();
        let driver = SessionDriver::new(Arc::clone(&store), deterministic_context());
        let registry = ThreadRegistry::new(4);
        let state = store.create_thread(&seed()).unwrap();

        let (tx, mut rx) = mpsc::channel(256);
        let guard = registry.begin(&state.thread_id).unwrap();
        guard.cancel_token().cancel();
        driver.run(guard, tx).await;

        let mut frames = Vec::new();
        while let Ok(frame) = rx.try_recv() {
            frames.push(frame);
        }
        // Meta only: cancellation stopped the loop before any node ran.
        assert_eq!(frames.len(), 1);
        assert!(matches!(frames.first(), Some(Frame::Meta { .. })));
    }
}
