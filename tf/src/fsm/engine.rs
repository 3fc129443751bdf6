//! Transition engine - applies stage decisions against the store
//!
//! One `advance` call re-evaluates the trip until it settles: fresh counts
//! are loaded before every decision, the stage write and any effect land
//! together, and a stage-changed event plus the entry action fire once per
//! transition. Cascades are capped; hitting the cap is an error, not a
//! stack overflow.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use eyre::{Result, eyre};
use tracing::{debug, info, warn};

use super::table::{StageCounts, StageTable, TransitionEffect};
use super::{ActionExecutor, TransitionRequester};
use crate::consensus::{resolve_date_overlap, tally_results};
use crate::domain::{Stage, Trip};
use crate::events::{EventBus, TripEvent};
use crate::store::Store;

pub struct TransitionEngine {
    store: Arc<dyn Store>,
    table: StageTable,
    bus: Arc<EventBus>,
    executor: Arc<dyn ActionExecutor>,
    max_cascade: u32,
}

impl TransitionEngine {
    pub fn new(
        store: Arc<dyn Store>,
        table: StageTable,
        bus: Arc<EventBus>,
        executor: Arc<dyn ActionExecutor>,
        max_cascade: u32,
    ) -> Self {
        Self {
            store,
            table,
            bus,
            executor,
            max_cascade,
        }
    }

    /// Gather the aggregate counts the table decides on.
    ///
    /// Always read fresh: values computed earlier in the same message's
    /// handling may already be stale.
    async fn load_counts(&self, trip: &Trip) -> Result<StageCounts> {
        let members = self.store.get_members(&trip.id).await?;
        let suggestions = self.store.get_destination_suggestions(&trip.id).await?;
        let availabilities = self.store.get_date_availability(&trip.id).await?;
        let flights = self.store.get_flights(&trip.id).await?;

        let (vote_count, vote_results) = match trip.stage.open_poll() {
            Some(poll_type) => {
                let votes = self.store.get_votes(&trip.id, poll_type).await?;
                let results = tally_results(&votes);
                (votes.len(), results)
            }
            None => (0, Vec::new()),
        };

        Ok(StageCounts {
            member_count: members.len(),
            suggestion_count: suggestions.len(),
            availability_count: availabilities.len(),
            vote_count,
            flight_count: flights.len(),
            vote_results,
            date_options: resolve_date_overlap(&availabilities),
        })
    }
}

#[async_trait]
impl TransitionRequester for TransitionEngine {
    async fn advance(&self, trip_id: &str) -> Result<Trip> {
        debug!(trip_id, "advance: called");
        let mut trip = self.store.get_trip(trip_id).await?;

        for _ in 0..self.max_cascade {
            if trip.stage == Stage::Unknown {
                warn!(trip_id = %trip.id, "advance: trip in unrecognized stage, treating as terminal");
                return Ok(trip);
            }
            if trip.stage.is_terminal() {
                return Ok(trip);
            }

            let counts = self.load_counts(&trip).await?;
            let now = Utc::now();
            let Some(decision) = self.table.evaluate(&trip, &counts, now) else {
                return Ok(trip);
            };

            match &decision.effect {
                Some(TransitionEffect::SetDestination(destination)) => {
                    trip.destination = Some(destination.clone());
                }
                Some(TransitionEffect::LockDates(window)) => {
                    trip.date_window = Some(*window);
                }
                None => {}
            }
            trip.enter_stage(decision.to, now);
            self.store.update_trip(&trip).await?;

            info!(
                trip_id = %trip.id,
                from = %decision.from,
                to = %decision.to,
                reason = %decision.reason,
                "advance: stage transition"
            );

            self.bus.emit(TripEvent::StageChanged {
                trip_id: trip.id.clone(),
                from: decision.from,
                to: decision.to,
                reason: decision.reason.clone(),
            });

            // Synchronous entry-action path; the executor dedups against
            // the event subscriber's async path.
            self.executor.on_stage_entered(&trip, decision.from, &decision.reason).await;
        }

        // Still transitioning after max_cascade steps: the table is cycling.
        let counts = self.load_counts(&trip).await?;
        if self.table.evaluate(&trip, &counts, Utc::now()).is_some() {
            return Err(eyre!(
                "trip {} exceeded {} chained transitions (stuck at {})",
                trip.id,
                self.max_cascade,
                trip.stage
            ));
        }
        Ok(trip)
    }
}
