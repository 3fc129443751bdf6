//! Ephemeral poll context
//!
//! PollContext is never persisted. It is recomputed on demand from the
//! current members/suggestions/availabilities so the options and the
//! majority threshold can never go stale against membership changes.

use serde::Serialize;

use crate::consensus::tally::majority_threshold;

use super::trip::PollType;

/// One selectable option in an open poll
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PollOption {
    /// Canonical choice key stored on votes (destination name or
    /// date-window key). Stable across re-computation.
    pub key: String,
    /// Human-facing text, produced for the Responder. Never parsed back.
    pub display: String,
}

/// Snapshot of an open poll, rebuilt per message
#[derive(Debug, Clone, Serialize)]
pub struct PollContext {
    pub poll_type: PollType,
    pub options: Vec<PollOption>,
    pub member_count: usize,
    pub majority_threshold: usize,
}

impl PollContext {
    pub fn new(poll_type: PollType, options: Vec<PollOption>, member_count: usize) -> Self {
        Self {
            poll_type,
            options,
            member_count,
            majority_threshold: majority_threshold(member_count),
        }
    }

    /// Resolve a 1-indexed ballot digit to an option key
    pub fn option_by_index(&self, index: usize) -> Option<&PollOption> {
        if index == 0 {
            return None;
        }
        self.options.get(index - 1)
    }

    /// Resolve a free-text choice against option keys (case-insensitive)
    pub fn option_by_key(&self, text: &str) -> Option<&PollOption> {
        let needle = text.trim().to_lowercase();
        self.options.iter().find(|o| o.key.to_lowercase() == needle)
    }
}
