//! Stage state machine
//!
//! Split in two: [`StageTable`] makes pure transition decisions from a trip
//! and fresh counts; [`TransitionEngine`] owns store access, applies
//! decisions, and emits stage-changed events. Handlers reach the engine only
//! through [`TransitionRequester`], and the engine reaches announcement code
//! only through [`ActionExecutor`], so both directions of the handler/engine
//! dependency are trait seams wired at startup.

use async_trait::async_trait;

use crate::domain::{Stage, Trip};

mod engine;
mod table;

pub use engine::TransitionEngine;
pub use table::{StageCounts, StageTable, TransitionDecision, TransitionEffect};

/// Capability to re-evaluate a trip's stage after new input
#[async_trait]
pub trait TransitionRequester: Send + Sync {
    /// Apply transitions until the trip settles, returning its final state
    async fn advance(&self, trip_id: &str) -> eyre::Result<Trip>;
}

/// Capability to run the announcement side of a stage entry.
///
/// Implementations must be idempotent per stage entry (both the synchronous
/// transition path and the event subscriber call this) and must swallow
/// their own failures; a dead notifier never blocks a transition.
#[async_trait]
pub trait ActionExecutor: Send + Sync {
    async fn on_stage_entered(&self, trip: &Trip, from: Stage, reason: &str);
}
