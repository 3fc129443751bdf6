//! Per-trip message sequencer
//!
//! The only ordering guarantee in the system: messages for one trip are
//! processed strictly FIFO by at most one worker, while different trips
//! proceed in parallel. The queue map and the active-worker set live under
//! a single mutex so the "start a worker iff none is draining this trip"
//! check is atomic.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::{debug, error};

use crate::domain::InboundMessage;

/// Processes one dequeued message for one trip.
///
/// Failures are terminal for that message: the sequencer logs and moves on,
/// never retries, never blocks the queue.
#[async_trait]
pub trait MessageProcessor: Send + Sync + 'static {
    async fn process(&self, trip_id: &str, message: InboundMessage) -> eyre::Result<()>;
}

struct SequencerState {
    queues: HashMap<String, VecDeque<InboundMessage>>,
    active: HashSet<String>,
}

/// FIFO fan-out of inbound messages, keyed by trip
pub struct PerTripSequencer<P: MessageProcessor> {
    processor: Arc<P>,
    state: Arc<Mutex<SequencerState>>,
}

impl<P: MessageProcessor> PerTripSequencer<P> {
    pub fn new(processor: Arc<P>) -> Self {
        Self {
            processor,
            state: Arc::new(Mutex::new(SequencerState {
                queues: HashMap::new(),
                active: HashSet::new(),
            })),
        }
    }

    /// Append a message to the trip's queue, spawning a worker if the trip
    /// has none draining it.
    pub async fn enqueue(&self, trip_id: &str, message: InboundMessage) {
        let spawn_worker = {
            let mut state = self.state.lock().await;
            state.queues.entry(trip_id.to_string()).or_default().push_back(message);
            // insert returns false if a worker already owns this trip
            state.active.insert(trip_id.to_string())
        };
        debug!(trip_id, spawn_worker, "enqueue: message queued");

        if spawn_worker {
            let trip_id = trip_id.to_string();
            let processor = Arc::clone(&self.processor);
            let state = Arc::clone(&self.state);
            tokio::spawn(async move {
                Self::drain(trip_id, processor, state).await;
            });
        }
    }

    /// Worker loop: pop and process until the trip's queue is empty, then
    /// deregister. Deregistration and the empty check happen under the same
    /// lock acquisition so no message can slip in unobserved.
    async fn drain(trip_id: String, processor: Arc<P>, state: Arc<Mutex<SequencerState>>) {
        debug!(%trip_id, "drain: worker started");
        loop {
            let message = {
                let mut state = state.lock().await;
                match state.queues.get_mut(&trip_id).and_then(|q| q.pop_front()) {
                    Some(message) => message,
                    None => {
                        state.queues.remove(&trip_id);
                        state.active.remove(&trip_id);
                        debug!(%trip_id, "drain: queue empty, worker exiting");
                        return;
                    }
                }
            };

            if let Err(e) = processor.process(&trip_id, message).await {
                // Dropped, not retried: the sender gets no reply but the
                // next message is not held hostage.
                error!(%trip_id, error = %e, "drain: message processing failed");
            }
        }
    }

    /// Number of trips with queued or in-flight messages (for tests and
    /// shutdown checks)
    pub async fn active_trips(&self) -> usize {
        self.state.lock().await.active.len()
    }
}
