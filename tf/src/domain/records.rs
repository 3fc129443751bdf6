//! Per-member submission records: suggestions, availabilities, votes,
//! flights, and stored inbound messages.
//!
//! Suggestions and availabilities are one row per (trip, member) with
//! latest-wins upsert semantics. Votes are one row per (trip, poll, member);
//! re-voting overwrites the prior choice: a mutable ballot, not an
//! append-only log.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use super::id::generate_id;
use super::trip::PollType;

/// A member's destination preference
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DestinationSuggestion {
    pub id: String,
    pub trip_id: String,
    pub member_id: String,
    /// Suggested destinations, most preferred first
    pub destinations: Vec<String>,
    pub submitted_at: DateTime<Utc>,
}

impl DestinationSuggestion {
    pub fn new(trip_id: impl Into<String>, member_id: impl Into<String>, destinations: Vec<String>) -> Self {
        Self {
            id: generate_id("sugg"),
            trip_id: trip_id.into(),
            member_id: member_id.into(),
            destinations,
            submitted_at: Utc::now(),
        }
    }
}

/// A member's date availability
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DateAvailability {
    pub id: String,
    pub trip_id: String,
    pub member_id: String,
    pub start: NaiveDate,
    pub end: NaiveDate,
    /// Flexible entries are excluded from the intersection calculation
    #[serde(default)]
    pub flexible: bool,
    pub submitted_at: DateTime<Utc>,
}

impl DateAvailability {
    pub fn new(trip_id: impl Into<String>, member_id: impl Into<String>, start: NaiveDate, end: NaiveDate) -> Self {
        Self {
            id: generate_id("avail"),
            trip_id: trip_id.into(),
            member_id: member_id.into(),
            start,
            end,
            flexible: false,
            submitted_at: Utc::now(),
        }
    }

    /// Builder method marking this entry as "works whenever"
    pub fn flexible(mut self) -> Self {
        self.flexible = true;
        self
    }
}

/// A member's ballot in an open poll
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Vote {
    pub id: String,
    pub trip_id: String,
    pub member_id: String,
    pub poll_type: PollType,
    /// Canonical choice key: a destination name, or a date-window key
    /// (`start/end` ISO form) for date polls. Never display text.
    pub choice: String,
    pub cast_at: DateTime<Utc>,
}

impl Vote {
    pub fn new(
        trip_id: impl Into<String>,
        member_id: impl Into<String>,
        poll_type: PollType,
        choice: impl Into<String>,
    ) -> Self {
        Self {
            id: generate_id("vote"),
            trip_id: trip_id.into(),
            member_id: member_id.into(),
            poll_type,
            choice: choice.into(),
            cast_at: Utc::now(),
        }
    }
}

/// A member's flight details, collected during tracking_flights
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Flight {
    pub id: String,
    pub trip_id: String,
    pub member_id: String,
    /// Free-form flight designator, e.g. `UA 123`
    pub flight_number: String,
    pub recorded_at: DateTime<Utc>,
}

impl Flight {
    pub fn new(trip_id: impl Into<String>, member_id: impl Into<String>, flight_number: impl Into<String>) -> Self {
        Self {
            id: generate_id("flight"),
            trip_id: trip_id.into(),
            member_id: member_id.into(),
            flight_number: flight_number.into(),
            recorded_at: Utc::now(),
        }
    }
}

/// An inbound message as received from the channel boundary
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InboundMessage {
    /// Sender's phone identity
    pub from: String,
    /// Raw message text
    pub body: String,
    /// Channel the message arrived on (group chat id)
    pub channel: String,
    /// When the boundary received it
    pub received_at: DateTime<Utc>,
}

impl InboundMessage {
    pub fn new(from: impl Into<String>, body: impl Into<String>, channel: impl Into<String>) -> Self {
        Self {
            from: from.into(),
            body: body.into(),
            channel: channel.into(),
            received_at: Utc::now(),
        }
    }
}

/// A persisted copy of an inbound message
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredMessage {
    pub id: String,
    pub trip_id: String,
    pub from: String,
    pub body: String,
    pub channel: String,
    pub received_at: DateTime<Utc>,
}

impl StoredMessage {
    pub fn from_inbound(trip_id: impl Into<String>, msg: &InboundMessage) -> Self {
        Self {
            id: generate_id("msg"),
            trip_id: trip_id.into(),
            from: msg.from.clone(),
            body: msg.body.clone(),
            channel: msg.channel.clone(),
            received_at: msg.received_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vote_serde_round_trip() {
        let vote = Vote::new("trip-1", "member-1", PollType::Destination, "Tokyo");
        let json = serde_json::to_string(&vote).unwrap();
        assert!(json.contains("\"destination\""));

        let back: Vote = serde_json::from_str(&json).unwrap();
        assert_eq!(back.choice, "Tokyo");
        assert_eq!(back.poll_type, PollType::Destination);
    }

    #[test]
    fn test_availability_flexible_builder() {
        let start = NaiveDate::from_ymd_opt(2025, 6, 1).unwrap();
        let end = NaiveDate::from_ymd_opt(2025, 6, 10).unwrap();
        let avail = DateAvailability::new("trip-1", "member-1", start, end).flexible();
        assert!(avail.flexible);
    }

    #[test]
    fn test_stored_message_copies_inbound_fields() {
        let inbound = InboundMessage::new("+15550001", "hello", "chat-9");
        let stored = StoredMessage::from_inbound("trip-1", &inbound);
        assert_eq!(stored.trip_id, "trip-1");
        assert_eq!(stored.from, "+15550001");
        assert_eq!(stored.body, "hello");
        assert_eq!(stored.received_at, inbound.received_at);
    }
}
