//! In-memory reference store
//!
//! Backs the daemon and the test suite. Everything lives under one RwLock;
//! callers are short-lived and the per-trip sequencer keeps write patterns
//! serialized, so contention is not a concern here.

use std::collections::HashMap;

use tokio::sync::RwLock;
use tracing::debug;

use crate::consensus;
use crate::domain::{
    DateAvailability, DestinationSuggestion, Flight, Member, PollType, StoredMessage, Trip, Vote,
};

use super::{Store, StoreError};
use async_trait::async_trait;

#[derive(Default)]
struct Tables {
    trips: HashMap<String, Trip>,
    members: Vec<Member>,
    votes: Vec<Vote>,
    suggestions: Vec<DestinationSuggestion>,
    availabilities: Vec<DateAvailability>,
    flights: Vec<Flight>,
    messages: Vec<StoredMessage>,
}

/// In-memory [`Store`] implementation
#[derive(Default)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn create_trip(&self, trip: Trip) -> Result<Trip, StoreError> {
        debug!(trip_id = %trip.id, channel = %trip.channel, "MemoryStore::create_trip");
        let mut tables = self.tables.write().await;
        if tables.trips.values().any(|t| t.channel == trip.channel && !t.stage.is_terminal()) {
            return Err(StoreError::Conflict(format!("channel {} already has an active trip", trip.channel)));
        }
        tables.trips.insert(trip.id.clone(), trip.clone());
        Ok(trip)
    }

    async fn get_trip(&self, trip_id: &str) -> Result<Trip, StoreError> {
        let tables = self.tables.read().await;
        tables.trips.get(trip_id).cloned().ok_or_else(|| StoreError::not_found("trip", trip_id))
    }

    async fn update_trip(&self, trip: &Trip) -> Result<(), StoreError> {
        let mut tables = self.tables.write().await;
        if !tables.trips.contains_key(&trip.id) {
            return Err(StoreError::not_found("trip", &trip.id));
        }
        tables.trips.insert(trip.id.clone(), trip.clone());
        Ok(())
    }

    async fn get_trip_by_channel(&self, channel: &str) -> Result<Option<Trip>, StoreError> {
        let tables = self.tables.read().await;
        Ok(tables.trips.values().find(|t| t.channel == channel && !t.stage.is_terminal()).cloned())
    }

    async fn get_active_trips(&self) -> Result<Vec<Trip>, StoreError> {
        let tables = self.tables.read().await;
        let mut trips: Vec<Trip> = tables.trips.values().filter(|t| !t.stage.is_terminal()).cloned().collect();
        trips.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(trips)
    }

    async fn get_members(&self, trip_id: &str) -> Result<Vec<Member>, StoreError> {
        let tables = self.tables.read().await;
        let mut members: Vec<Member> = tables.members.iter().filter(|m| m.trip_id == trip_id).cloned().collect();
        members.sort_by(|a, b| a.joined_at.cmp(&b.joined_at));
        Ok(members)
    }

    async fn upsert_member(&self, member: Member) -> Result<Member, StoreError> {
        debug!(trip_id = %member.trip_id, phone = %member.phone, "MemoryStore::upsert_member");
        let mut tables = self.tables.write().await;

        // A phone belongs to at most one trip at a time.
        if tables.members.iter().any(|m| m.phone == member.phone && m.trip_id != member.trip_id) {
            return Err(StoreError::Conflict(format!("phone {} already belongs to another trip", member.phone)));
        }

        // Re-insertion into the same trip is an idempotent update.
        if let Some(existing) = tables
            .members
            .iter_mut()
            .find(|m| m.trip_id == member.trip_id && m.phone == member.phone)
        {
            if member.display_name.is_some() {
                existing.display_name = member.display_name.clone();
            }
            return Ok(existing.clone());
        }

        tables.members.push(member.clone());
        Ok(member)
    }

    async fn update_member(&self, member: &Member) -> Result<(), StoreError> {
        let mut tables = self.tables.write().await;
        match tables.members.iter_mut().find(|m| m.id == member.id) {
            Some(existing) => {
                *existing = member.clone();
                Ok(())
            }
            None => Err(StoreError::not_found("member", &member.id)),
        }
    }

    async fn get_votes(&self, trip_id: &str, poll_type: PollType) -> Result<Vec<Vote>, StoreError> {
        let tables = self.tables.read().await;
        Ok(tables
            .votes
            .iter()
            .filter(|v| v.trip_id == trip_id && v.poll_type == poll_type)
            .cloned()
            .collect())
    }

    async fn create_vote(&self, vote: Vote) -> Result<(), StoreError> {
        debug!(trip_id = %vote.trip_id, member_id = %vote.member_id, choice = %vote.choice, "MemoryStore::create_vote");
        let mut tables = self.tables.write().await;
        // Mutable ballot: one row per (trip, poll, member).
        tables
            .votes
            .retain(|v| !(v.trip_id == vote.trip_id && v.poll_type == vote.poll_type && v.member_id == vote.member_id));
        tables.votes.push(vote);
        Ok(())
    }

    async fn get_vote_results(
        &self,
        trip_id: &str,
        poll_type: PollType,
    ) -> Result<Vec<consensus::VoteCount>, StoreError> {
        let votes = self.get_votes(trip_id, poll_type).await?;
        Ok(consensus::tally_results(&votes))
    }

    async fn get_destination_suggestions(&self, trip_id: &str) -> Result<Vec<DestinationSuggestion>, StoreError> {
        let tables = self.tables.read().await;
        let mut rows: Vec<DestinationSuggestion> =
            tables.suggestions.iter().filter(|s| s.trip_id == trip_id).cloned().collect();
        rows.sort_by(|a, b| a.submitted_at.cmp(&b.submitted_at));
        Ok(rows)
    }

    async fn upsert_suggestion(&self, suggestion: DestinationSuggestion) -> Result<(), StoreError> {
        let mut tables = self.tables.write().await;
        // One row per (trip, member), latest wins.
        tables
            .suggestions
            .retain(|s| !(s.trip_id == suggestion.trip_id && s.member_id == suggestion.member_id));
        tables.suggestions.push(suggestion);
        Ok(())
    }

    async fn get_date_availability(&self, trip_id: &str) -> Result<Vec<DateAvailability>, StoreError> {
        let tables = self.tables.read().await;
        let mut rows: Vec<DateAvailability> =
            tables.availabilities.iter().filter(|a| a.trip_id == trip_id).cloned().collect();
        rows.sort_by(|a, b| a.submitted_at.cmp(&b.submitted_at));
        Ok(rows)
    }

    async fn upsert_availability(&self, availability: DateAvailability) -> Result<(), StoreError> {
        let mut tables = self.tables.write().await;
        tables
            .availabilities
            .retain(|a| !(a.trip_id == availability.trip_id && a.member_id == availability.member_id));
        tables.availabilities.push(availability);
        Ok(())
    }

    async fn get_flights(&self, trip_id: &str) -> Result<Vec<Flight>, StoreError> {
        let tables = self.tables.read().await;
        Ok(tables.flights.iter().filter(|f| f.trip_id == trip_id).cloned().collect())
    }

    async fn create_flight(&self, flight: Flight) -> Result<(), StoreError> {
        let mut tables = self.tables.write().await;
        // One flight row per member; a resend updates the details.
        tables.flights.retain(|f| !(f.trip_id == flight.trip_id && f.member_id == flight.member_id));
        tables.flights.push(flight);
        Ok(())
    }

    async fn create_message(&self, message: StoredMessage) -> Result<(), StoreError> {
        let mut tables = self.tables.write().await;
        tables.messages.push(message);
        Ok(())
    }
}
