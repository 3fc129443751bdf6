//! Transition dedup cache
//!
//! Entry actions for a stage change can fire from two call paths: the
//! synchronous return path inside message processing and the async EventBus
//! subscriber. This cache remembers recent (trip, from, to) transitions for
//! a short TTL so the second path becomes a no-op.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use tracing::debug;

use crate::domain::Stage;

/// Entries kept beyond this count trigger an eager purge on insert
const PURGE_THRESHOLD: usize = 1024;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct TransitionKey {
    trip_id: String,
    from: Stage,
    to: Stage,
}

/// Bounded TTL cache of recently seen stage transitions
pub struct TransitionDedup {
    ttl: Duration,
    seen: Mutex<HashMap<TransitionKey, Instant>>,
}

impl TransitionDedup {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            seen: Mutex::new(HashMap::new()),
        }
    }

    /// Record a transition. Returns true if this is the first sighting
    /// within the TTL window, false if it is a duplicate.
    pub fn first_sighting(&self, trip_id: &str, from: Stage, to: Stage) -> bool {
        let key = TransitionKey {
            trip_id: trip_id.to_string(),
            from,
            to,
        };
        let now = Instant::now();

        let mut seen = match self.seen.lock() {
            Ok(guard) => guard,
            // A poisoned lock means a panic elsewhere; treat as first
            // sighting so entry actions are not silently dropped.
            Err(poisoned) => poisoned.into_inner(),
        };

        if seen.len() > PURGE_THRESHOLD {
            let ttl = self.ttl;
            seen.retain(|_, inserted| now.duration_since(*inserted) < ttl);
        }

        match seen.get(&key) {
            Some(inserted) if now.duration_since(*inserted) < self.ttl => {
                debug!(%key.trip_id, from = %key.from, to = %key.to, "first_sighting: duplicate suppressed");
                false
            }
            _ => {
                seen.insert(key, now);
                true
            }
        }
    }
}
