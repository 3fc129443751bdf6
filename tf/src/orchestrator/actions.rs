//! Stage entry actions
//!
//! Announcements that fire when a trip enters a stage: poll openings, the
//! locked date window, the final confirmation. Entry actions are reached
//! from two call paths (the engine's synchronous transition path and the
//! event-bus subscriber); the dedup cache makes the second arrival a no-op.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tracing::{debug, error, warn};

use super::context::build_poll_context;
use super::outbound::Notifier;
use crate::domain::{PollType, Stage, Trip};
use crate::events::{EventBus, TransitionDedup, TripEvent};
use crate::fsm::ActionExecutor;
use crate::store::Store;

pub struct EntryActions {
    store: Arc<dyn Store>,
    notifier: Arc<dyn Notifier>,
    dedup: TransitionDedup,
    subscribed: AtomicBool,
}

impl EntryActions {
    pub fn new(store: Arc<dyn Store>, notifier: Arc<dyn Notifier>, dedup: TransitionDedup) -> Self {
        Self {
            store,
            notifier,
            dedup,
            subscribed: AtomicBool::new(false),
        }
    }

    /// Register the event-bus path. Guarded: a second registration would
    /// double every announcement, so it is refused.
    pub fn spawn_subscriber(self: &Arc<Self>, bus: &EventBus) -> Option<JoinHandle<()>> {
        if self.subscribed.swap(true, Ordering::SeqCst) {
            warn!("spawn_subscriber: already subscribed, refusing second registration");
            return None;
        }

        let mut rx = bus.subscribe();
        let actions = Arc::clone(self);
        Some(tokio::spawn(async move {
            loop {
                match rx.recv().await {
                    Ok(TripEvent::StageChanged { trip_id, from, .. }) => {
                        let trip = match actions.store.get_trip(&trip_id).await {
                            Ok(trip) => trip,
                            Err(e) => {
                                error!(%trip_id, error = %e, "subscriber: trip load failed");
                                continue;
                            }
                        };
                        actions.on_stage_entered(&trip, from, "event subscriber").await;
                    }
                    Ok(_) => {}
                    Err(RecvError::Lagged(skipped)) => {
                        warn!(skipped, "subscriber: lagged behind event bus");
                    }
                    Err(RecvError::Closed) => break,
                }
            }
        }))
    }

    /// Compose the announcement for a stage entry, if the stage has one
    async fn announcement(&self, trip: &Trip, from: Stage) -> Option<String> {
        match trip.stage {
            Stage::Planning => match from {
                Stage::Gathering => Some(
                    "Planning is open! Send destination ideas and the dates you're free (e.g. 2025-03-15 to 2025-03-22)."
                        .to_string(),
                ),
                Stage::VotingDestination => trip
                    .destination
                    .as_ref()
                    .map(|d| format!("The votes are in: you're going to {}! Now for dates.", d)),
                Stage::VotingDates => trip
                    .date_window
                    .map(|w| format!("The votes are in: {} it is!", w)),
                // Auto-lock already announced the window at dates_set.
                Stage::DatesSet => None,
                _ => None,
            },
            Stage::VotingDestination => self.poll_announcement(trip, PollType::Destination).await,
            Stage::VotingDates => self.poll_announcement(trip, PollType::Dates).await,
            Stage::DatesSet => trip
                .date_window
                .map(|w| format!("Everyone's free {} — locking those dates in!", w)),
            Stage::TrackingFlights => Some(
                "Destination and dates are set. Send your flight number once you've booked!".to_string(),
            ),
            Stage::Confirmed => {
                let destination = trip.destination.as_deref().unwrap_or("your destination");
                let window = trip
                    .date_window
                    .map(|w| w.to_string())
                    .unwrap_or_else(|| "the chosen dates".to_string());
                Some(format!(
                    "Everyone's booked! {} over {}. See you there!",
                    destination, window
                ))
            }
            Stage::Abandoned => Some(
                "Seems like plans stalled out, so I'll stop nudging. Message me anytime to start a new trip."
                    .to_string(),
            ),
            _ => None,
        }
    }

    async fn poll_announcement(&self, trip: &Trip, poll_type: PollType) -> Option<String> {
        let members = match self.store.get_members(&trip.id).await {
            Ok(members) => members,
            Err(e) => {
                error!(trip_id = %trip.id, error = %e, "poll_announcement: member load failed");
                return None;
            }
        };
        let poll = match build_poll_context(self.store.as_ref(), trip, poll_type, members.len()).await {
            Ok(poll) => poll,
            Err(e) => {
                error!(trip_id = %trip.id, error = %e, "poll_announcement: context build failed");
                return None;
            }
        };

        let what = match poll_type {
            PollType::Destination => "Where to?",
            PollType::Dates => "Which dates?",
        };
        let listing = poll
            .options
            .iter()
            .enumerate()
            .map(|(i, o)| format!("{}. {}", i + 1, o.display))
            .collect::<Vec<_>>()
            .join("\n");
        Some(format!(
            "Time to vote! {}\n{}\nReply with the number of your pick ({} votes to win).",
            what, listing, poll.majority_threshold
        ))
    }
}

#[async_trait]
impl ActionExecutor for EntryActions {
    async fn on_stage_entered(&self, trip: &Trip, from: Stage, reason: &str) {
        if !self.dedup.first_sighting(&trip.id, from, trip.stage) {
            debug!(trip_id = %trip.id, to = %trip.stage, "on_stage_entered: duplicate entry suppressed");
            return;
        }
        debug!(trip_id = %trip.id, from = %from, to = %trip.stage, reason, "on_stage_entered: called");

        let Some(text) = self.announcement(trip, from).await else {
            return;
        };
        // A dead notifier never blocks or re-triggers a transition.
        if let Err(e) = self.notifier.notify(&trip.channel, &text).await {
            error!(trip_id = %trip.id, error = %e, "on_stage_entered: notify failed");
        }
    }
}
