//! Member domain type

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::id::generate_id;

/// One participant in a trip, identified by phone number.
///
/// Unique per (trip, phone); the store boundary also enforces that a phone
/// belongs to at most one trip at a time. Re-inserting the same phone into
/// the same trip is an idempotent update, not an error.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Member {
    /// Unique identifier
    pub id: String,

    /// Owning trip
    pub trip_id: String,

    /// Phone identity on the message channel
    pub phone: String,

    /// Display name, if the member has provided one
    #[serde(default)]
    pub display_name: Option<String>,

    /// When the member joined the trip
    pub joined_at: DateTime<Utc>,
}

impl Member {
    pub fn new(trip_id: impl Into<String>, phone: impl Into<String>) -> Self {
        Self {
            id: generate_id("member"),
            trip_id: trip_id.into(),
            phone: phone.into(),
            display_name: None,
            joined_at: Utc::now(),
        }
    }

    /// Builder method to set the display name
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.display_name = Some(name.into());
        self
    }

    /// Name to address this member by in outbound text
    pub fn label(&self) -> &str {
        self.display_name.as_deref().unwrap_or(&self.phone)
    }
}
