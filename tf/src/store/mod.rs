//! Persistence boundary
//!
//! The core talks to storage through the [`Store`] trait: plain records, no
//! multi-statement transactions. Consistency comes from the per-trip
//! sequencer serializing writes and from the state machine re-reading fresh
//! counts before every decision, not from the store.

use async_trait::async_trait;
use thiserror::Error;

use crate::domain::{
    DateAvailability, DestinationSuggestion, Flight, Member, PollType, StoredMessage, Trip, Vote,
};

mod memory;

pub use memory::MemoryStore;

/// Errors from the persistence boundary
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("{kind} not found: {id}")]
    NotFound { kind: &'static str, id: String },

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("storage backend error: {0}")]
    Backend(String),
}

impl StoreError {
    pub fn not_found(kind: &'static str, id: impl Into<String>) -> Self {
        Self::NotFound { kind, id: id.into() }
    }
}

/// Record store for trips and their owned rows.
///
/// Upsert semantics are part of the contract: members are unique per
/// (trip, phone) with a phone belonging to at most one trip; suggestions
/// and availabilities are one row per (trip, member), latest wins; votes
/// are one row per (trip, poll, member), re-voting overwrites.
#[async_trait]
pub trait Store: Send + Sync {
    async fn create_trip(&self, trip: Trip) -> Result<Trip, StoreError>;
    async fn get_trip(&self, trip_id: &str) -> Result<Trip, StoreError>;
    async fn update_trip(&self, trip: &Trip) -> Result<(), StoreError>;
    /// Find the trip owning a channel, if any
    async fn get_trip_by_channel(&self, channel: &str) -> Result<Option<Trip>, StoreError>;
    /// All trips not in a terminal stage
    async fn get_active_trips(&self) -> Result<Vec<Trip>, StoreError>;

    async fn get_members(&self, trip_id: &str) -> Result<Vec<Member>, StoreError>;
    async fn upsert_member(&self, member: Member) -> Result<Member, StoreError>;
    async fn update_member(&self, member: &Member) -> Result<(), StoreError>;

    async fn get_votes(&self, trip_id: &str, poll_type: PollType) -> Result<Vec<Vote>, StoreError>;
    /// Insert or overwrite this member's ballot for the poll
    async fn create_vote(&self, vote: Vote) -> Result<(), StoreError>;
    /// Per-choice counts, descending (store-side convenience over get_votes)
    async fn get_vote_results(&self, trip_id: &str, poll_type: PollType)
    -> Result<Vec<crate::consensus::VoteCount>, StoreError>;

    async fn get_destination_suggestions(&self, trip_id: &str) -> Result<Vec<DestinationSuggestion>, StoreError>;
    async fn upsert_suggestion(&self, suggestion: DestinationSuggestion) -> Result<(), StoreError>;

    async fn get_date_availability(&self, trip_id: &str) -> Result<Vec<DateAvailability>, StoreError>;
    async fn upsert_availability(&self, availability: DateAvailability) -> Result<(), StoreError>;

    async fn get_flights(&self, trip_id: &str) -> Result<Vec<Flight>, StoreError>;
    async fn create_flight(&self, flight: Flight) -> Result<(), StoreError>;

    async fn create_message(&self, message: StoredMessage) -> Result<(), StoreError>;
}
