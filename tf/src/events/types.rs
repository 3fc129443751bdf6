//! Event types published on the trip event bus

use serde::{Deserialize, Serialize};

use crate::domain::Stage;

/// Events emitted as trips move through their lifecycle
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TripEvent {
    /// A trip moved to a new stage
    StageChanged {
        trip_id: String,
        from: Stage,
        to: Stage,
        reason: String,
    },

    /// A reminder went out to members who still owe input
    NudgeSent {
        trip_id: String,
        stage: Stage,
        nudge_count: u32,
        pending: Vec<String>,
    },
}

impl TripEvent {
    /// Get the trip ID this event belongs to
    pub fn trip_id(&self) -> &str {
        match self {
            TripEvent::StageChanged { trip_id, .. } => trip_id,
            TripEvent::NudgeSent { trip_id, .. } => trip_id,
        }
    }

    /// Get the event type as a string (for logging and filtering)
    pub fn event_type(&self) -> &'static str {
        match self {
            TripEvent::StageChanged { .. } => "StageChanged",
            TripEvent::NudgeSent { .. } => "NudgeSent",
        }
    }
}
