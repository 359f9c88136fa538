//! Stream emitter: turns committed snapshots into ordered, de-duplicated
//! wire frames.
//!
//! One emitter lives for one run. Per snapshot it produces at most one
//! frame per category, in the fixed order `message`, `ledger_update`,
//! `map_update`, `research_update`, `workflow_stage`. A disconnected
//! receiver latches the emitter shut; the run keeps committing, nothing
//! more is sent.

use std::hash::{DefaultHasher, Hash, Hasher};

use metrics::counter;
use tokio::sync::mpsc;
use tracing::debug;

use trek_core::{Frame, LedgerSnapshot, TripState};

/// Minimum message length worth streaming. Anything shorter is a
/// fragment ("Ok.", tool chatter) the client has no use for.
const MIN_MESSAGE_LEN: usize = 10;

/// Per-run frame emitter.
pub struct StreamEmitter {
    tx: mpsc::Sender<Frame>,
    /// Messages up to this index were present before the run started or
    /// have already been streamed.
    watermark: usize,
    last_map: Option<u64>,
    last_research: Option<u64>,
    closed: bool,
}

impl StreamEmitter {
    /// Create an emitter whose message watermark starts at
    /// `seen_messages`, so turns that predate the run are not re-streamed.
    pub fn new(tx: mpsc::Sender<Frame>, seen_messages: usize) -> Self {
        Self {
            tx,
            watermark: seen_messages,
            last_map: None,
            last_research: None,
            closed: false,
        }
    }

    /// Send one frame. Returns false once the receiver is gone.
    pub async fn send(&mut self, frame: Frame) -> bool {
        if self.closed {
            return false;
        }
        if self.tx.send(frame).await.is_err() {
            debug!("stream receiver gone, closing emitter");
            self.closed = true;
            return false;
        }
        counter!("frames_emitted_total").increment(1);
        true
    }

    /// Emit the frames for one committed snapshot, in category order.
    pub async fn snapshot(&mut self, state: &TripState) {
        for index in self.watermark..state.messages.len() {
            let message = &state.messages[index];
            if message.content.trim().len() < MIN_MESSAGE_LEN {
                continue;
            }
            let _ = self
                .send(Frame::Message {
                    data: message.clone(),
                })
                .await;
        }
        self.watermark = state.messages.len();

        let _ = self
            .send(Frame::LedgerUpdate {
                data: LedgerSnapshot {
                    remaining: state.remaining_budget,
                    total: state.total_budget,
                    itinerary: state.itinerary.clone(),
                },
            })
            .await;

        if !state.found_places.is_empty() {
            let places: Vec<_> = state.found_places.values().cloned().collect();
            let digest = digest_of(&places);
            if self.last_map != Some(digest) {
                self.last_map = Some(digest);
                let _ = self.send(Frame::MapUpdate { data: places }).await;
            }
        }

        if !state.researched_places.is_empty() {
            let researched: Vec<_> = state.researched_places.values().cloned().collect();
            let digest = digest_of(&researched);
            if self.last_research != Some(digest) {
                self.last_research = Some(digest);
                let _ = self
                    .send(Frame::ResearchUpdate { data: researched })
                    .await;
            }
        }

        let _ = self
            .send(Frame::WorkflowStage {
                data: state.workflow_stage,
            })
            .await;
    }
}

/// Content digest for change detection. Serialization is deterministic
/// (struct field order, first-seen map order), so equal content always
/// digests equal.
fn digest_of<T: serde::Serialize>(value: &T) -> u64 {
    let bytes = serde_json::to_vec(value).unwrap_or_default();
    let mut hasher = DefaultHasher::new();
    bytes.hash(&mut hasher);
    hasher.finish()
}
