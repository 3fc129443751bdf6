//! Nudge scheduler
//!
//! The time-based half of the system: a fixed-interval sweep over active
//! trips that finishes elapsed trips, abandons stalled ones, triggers
//! time-based stage transitions, and reminds members who still owe input.
//! Counts are best-effort snapshots; a failing trip is logged and the
//! sweep moves on.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use eyre::Result;
use tracing::{debug, error, info};

use crate::config::NudgeConfig;
use crate::consensus::pending_voters;
use crate::domain::{Member, Stage, Trip};
use crate::events::{EventBus, TripEvent};
use crate::fsm::{ActionExecutor, TransitionRequester};
use crate::orchestrator::Notifier;
use crate::store::Store;

pub struct NudgeScheduler {
    store: Arc<dyn Store>,
    engine: Arc<dyn TransitionRequester>,
    notifier: Arc<dyn Notifier>,
    actions: Arc<dyn ActionExecutor>,
    bus: Arc<EventBus>,
    config: NudgeConfig,
}

impl NudgeScheduler {
    pub fn new(
        store: Arc<dyn Store>,
        engine: Arc<dyn TransitionRequester>,
        notifier: Arc<dyn Notifier>,
        actions: Arc<dyn ActionExecutor>,
        bus: Arc<EventBus>,
        config: NudgeConfig,
    ) -> Self {
        Self {
            store,
            engine,
            notifier,
            actions,
            bus,
            config,
        }
    }

    /// Sweep forever at the configured interval
    pub async fn run(self) {
        info!(interval_secs = self.config.sweep_interval_secs, "run: scheduler started");
        let mut interval = tokio::time::interval(Duration::from_secs(self.config.sweep_interval_secs));
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        loop {
            interval.tick().await;
            if let Err(e) = self.sweep().await {
                error!(error = %e, "run: sweep failed");
            }
        }
    }

    /// One pass over all active trips
    pub async fn sweep(&self) -> Result<()> {
        let trips = self.store.get_active_trips().await?;
        debug!(trip_count = trips.len(), "sweep: called");
        for trip in trips {
            if let Err(e) = self.sweep_trip(trip).await {
                error!(error = %e, "sweep: trip failed, continuing");
            }
        }
        Ok(())
    }

    async fn sweep_trip(&self, trip: Trip) -> Result<()> {
        // Terminal checks first: a finished or dead trip gets no nudges
        // and no further evaluation.
        if self.finish_if_elapsed(&trip).await? || self.abandon_if_stalled(&trip).await? {
            return Ok(());
        }

        // Time-based transitions (planning timeout, 48h poll close).
        let trip = match self.engine.advance(&trip.id).await {
            Ok(trip) => trip,
            Err(e) => {
                error!(trip_id = %trip.id, error = %e, "sweep_trip: advance failed");
                self.store.get_trip(&trip.id).await?
            }
        };
        if trip.stage.is_terminal() {
            return Ok(());
        }

        self.nudge_if_stale(trip).await
    }

    /// Travel dates behind us: the trip is over, whatever stage it sat in
    async fn finish_if_elapsed(&self, trip: &Trip) -> Result<bool> {
        let Some(window) = trip.date_window else {
            return Ok(false);
        };
        if window.end >= Utc::now().date_naive() {
            return Ok(false);
        }

        let mut finished = trip.clone();
        let from = finished.stage;
        finished.enter_stage(Stage::Completed, Utc::now());
        self.store.update_trip(&finished).await?;
        info!(trip_id = %trip.id, "finish_if_elapsed: travel dates elapsed, trip completed");
        self.bus.emit(TripEvent::StageChanged {
            trip_id: finished.id,
            from,
            to: Stage::Completed,
            reason: "travel dates elapsed".to_string(),
        });
        Ok(true)
    }

    /// Out of nudges and still stale: give up
    async fn abandon_if_stalled(&self, trip: &Trip) -> Result<bool> {
        if trip.nudge_count < self.config.give_up_after || !self.is_stale(trip) {
            return Ok(false);
        }

        let mut abandoned = trip.clone();
        let from = abandoned.stage;
        abandoned.enter_stage(Stage::Abandoned, Utc::now());
        self.store.update_trip(&abandoned).await?;
        info!(trip_id = %trip.id, stage = %from, "abandon_if_stalled: giving up on stalled trip");

        // The farewell is an entry action like any other announcement; the
        // dedup cache keeps the event subscriber from repeating it.
        self.actions.on_stage_entered(&abandoned, from, "nudges exhausted").await;
        self.bus.emit(TripEvent::StageChanged {
            trip_id: abandoned.id,
            from,
            to: Stage::Abandoned,
            reason: "nudges exhausted".to_string(),
        });
        Ok(true)
    }

    /// Stale means nothing has happened since the last nudge (or since
    /// stage entry, before the first one) for the configured window.
    fn is_stale(&self, trip: &Trip) -> bool {
        let now = Utc::now();
        match trip.last_nudge_at {
            Some(last) => (now - last) >= chrono::Duration::hours(self.config.repeat_after_hours),
            None => trip.stage_elapsed(now) >= chrono::Duration::hours(self.config.stale_after_hours),
        }
    }

    async fn nudge_if_stale(&self, trip: Trip) -> Result<()> {
        if !self.is_stale(&trip) {
            return Ok(());
        }

        let members = self.store.get_members(&trip.id).await?;
        let Some((pending, ask)) = self.pending_input(&trip, &members).await? else {
            return Ok(());
        };
        if pending.is_empty() {
            return Ok(());
        }

        let names: Vec<String> = pending.iter().map(|m| m.label().to_string()).collect();
        let text = nudge_text(trip.nudge_count, &names, ask);
        self.notifier.notify(&trip.channel, &text).await?;

        let mut nudged = trip.clone();
        nudged.nudge_count += 1;
        nudged.last_nudge_at = Some(Utc::now());
        self.store.update_trip(&nudged).await?;

        info!(trip_id = %trip.id, nudge_count = nudged.nudge_count, pending = pending.len(), "nudge_if_stale: reminder sent");
        self.bus.emit(TripEvent::NudgeSent {
            trip_id: trip.id.clone(),
            stage: trip.stage,
            nudge_count: nudged.nudge_count,
            pending: pending.iter().map(|m| m.id.clone()).collect(),
        });
        Ok(())
    }

    /// Who still owes input in this stage, and what to ask them for
    async fn pending_input(&self, trip: &Trip, members: &[Member]) -> Result<Option<(Vec<Member>, &'static str)>> {
        let pending = match trip.stage {
            Stage::Planning => {
                let suggestions = self.store.get_destination_suggestions(&trip.id).await?;
                let availabilities = self.store.get_date_availability(&trip.id).await?;
                let missing: Vec<Member> = members
                    .iter()
                    .filter(|m| {
                        let owes_suggestion =
                            trip.destination.is_none() && !suggestions.iter().any(|s| s.member_id == m.id);
                        let owes_availability =
                            trip.date_window.is_none() && !availabilities.iter().any(|a| a.member_id == m.id);
                        owes_suggestion || owes_availability
                    })
                    .cloned()
                    .collect();
                (missing, "destination ideas or the dates you're free")
            }
            Stage::VotingDestination | Stage::VotingDates => {
                let Some(poll_type) = trip.stage.open_poll() else {
                    return Ok(None);
                };
                let votes = self.store.get_votes(&trip.id, poll_type).await?;
                let missing = pending_voters(members, &votes).into_iter().cloned().collect();
                (missing, "your vote")
            }
            Stage::TrackingFlights => {
                let flights = self.store.get_flights(&trip.id).await?;
                let missing: Vec<Member> = members
                    .iter()
                    .filter(|m| !flights.iter().any(|f| f.member_id == m.id))
                    .cloned()
                    .collect();
                (missing, "your flight number")
            }
            // Gathering has no one to nudge yet; terminal stages never nudge.
            _ => return Ok(None),
        };
        Ok(Some(pending))
    }
}

/// Escalating reminder text; the tone index is how many nudges this stage
/// has already seen.
fn nudge_text(nudge_count: u32, names: &[String], ask: &str) -> String {
    let who = names.join(", ");
    match nudge_count {
        0 => format!("Friendly nudge: still waiting on {} from {}.", ask, who),
        1 => format!(
            "Second reminder — {}: the group needs {} to keep this trip moving.",
            who, ask
        ),
        _ => format!(
            "Last call, {}! Without {} soon I'll assume this trip isn't happening.",
            who, ask
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{DateWindow, Flight, Vote};
    use crate::events::TransitionDedup;
    use crate::orchestrator::EntryActions;
    use crate::store::MemoryStore;
    use async_trait::async_trait;
    use chrono::NaiveDate;
    use std::sync::Mutex;

    struct NoopEngine;

    #[async_trait]
    impl TransitionRequester for NoopEngine {
        async fn advance(&self, trip_id: &str) -> Result<Trip> {
            // Tests drive stage placement directly; no table here.
            Err(eyre::eyre!("noop engine has no store for {}", trip_id))
        }
    }

    struct PassthroughEngine {
        store: Arc<MemoryStore>,
    }

    #[async_trait]
    impl TransitionRequester for PassthroughEngine {
        async fn advance(&self, trip_id: &str) -> Result<Trip> {
            Ok(self.store.get_trip(trip_id).await?)
        }
    }

    #[derive(Default)]
    struct RecordingNotifier {
        sent: Mutex<Vec<String>>,
    }

    impl RecordingNotifier {
        fn sent(&self) -> Vec<String> {
            self.sent.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl Notifier for RecordingNotifier {
        async fn notify(&self, _channel: &str, text: &str) -> Result<()> {
            self.sent.lock().unwrap().push(text.to_string());
            Ok(())
        }
    }

    struct Fixture {
        store: Arc<MemoryStore>,
        notifier: Arc<RecordingNotifier>,
        actions: Arc<EntryActions>,
        bus: Arc<EventBus>,
        scheduler: NudgeScheduler,
    }

    fn fixture() -> Fixture {
        let store = Arc::new(MemoryStore::new());
        let notifier = Arc::new(RecordingNotifier::default());
        let actions = Arc::new(EntryActions::new(
            store.clone(),
            notifier.clone(),
            TransitionDedup::new(Duration::from_secs(10)),
        ));
        let bus = Arc::new(EventBus::new(16));
        let engine = Arc::new(PassthroughEngine { store: store.clone() });
        let scheduler = NudgeScheduler::new(
            store.clone(),
            engine,
            notifier.clone(),
            actions.clone(),
            bus.clone(),
            NudgeConfig::default(),
        );
        Fixture {
            store,
            notifier,
            actions,
            bus,
            scheduler,
        }
    }

    async fn seed_stale_planning(f: &Fixture, hours_ago: i64) -> Trip {
        let mut trip = f.store.create_trip(Trip::new("chat-1")).await.unwrap();
        for i in 0..2 {
            f.store
                .upsert_member(Member::new(&trip.id, format!("+1555000{}", i)))
                .await
                .unwrap();
        }
        trip.enter_stage(Stage::Planning, Utc::now());
        trip.stage_entered_at = Some(Utc::now() - chrono::Duration::hours(hours_ago));
        f.store.update_trip(&trip).await.unwrap();
        trip
    }

    #[tokio::test]
    async fn test_fresh_trip_not_nudged() {
        let f = fixture();
        seed_stale_planning(&f, 1).await;

        f.scheduler.sweep().await.unwrap();
        assert!(f.notifier.sent().is_empty());
    }

    #[tokio::test]
    async fn test_stale_planning_trip_nudged() {
        let f = fixture();
        let trip = seed_stale_planning(&f, 25).await;

        f.scheduler.sweep().await.unwrap();

        let sent = f.notifier.sent();
        assert_eq!(sent.len(), 1);
        assert!(sent[0].contains("Friendly nudge"));
        assert!(sent[0].contains("destination ideas"));

        let nudged = f.store.get_trip(&trip.id).await.unwrap();
        assert_eq!(nudged.nudge_count, 1);
        assert!(nudged.last_nudge_at.is_some());
    }

    #[tokio::test]
    async fn test_recent_nudge_not_repeated() {
        let f = fixture();
        let mut trip = seed_stale_planning(&f, 30).await;
        trip.nudge_count = 1;
        trip.last_nudge_at = Some(Utc::now() - chrono::Duration::hours(2));
        f.store.update_trip(&trip).await.unwrap();

        f.scheduler.sweep().await.unwrap();
        assert!(f.notifier.sent().is_empty());
    }

    #[tokio::test]
    async fn test_nudge_tone_escalates() {
        let f = fixture();
        let mut trip = seed_stale_planning(&f, 30).await;
        trip.nudge_count = 1;
        trip.last_nudge_at = Some(Utc::now() - chrono::Duration::hours(25));
        f.store.update_trip(&trip).await.unwrap();

        f.scheduler.sweep().await.unwrap();

        let sent = f.notifier.sent();
        assert_eq!(sent.len(), 1);
        assert!(sent[0].contains("Second reminder"));
    }

    #[tokio::test]
    async fn test_exhausted_nudges_abandon_trip() {
        let f = fixture();
        let mut trip = seed_stale_planning(&f, 30).await;
        trip.nudge_count = 3;
        trip.last_nudge_at = Some(Utc::now() - chrono::Duration::hours(25));
        f.store.update_trip(&trip).await.unwrap();

        f.scheduler.sweep().await.unwrap();

        let abandoned = f.store.get_trip(&trip.id).await.unwrap();
        assert_eq!(abandoned.stage, Stage::Abandoned);
        assert!(f.notifier.sent()[0].contains("stop nudging"));
    }

    #[tokio::test]
    async fn test_abandon_announced_once_with_subscriber_live() {
        let f = fixture();
        f.actions.spawn_subscriber(&f.bus);

        let mut trip = seed_stale_planning(&f, 30).await;
        trip.nudge_count = 3;
        trip.last_nudge_at = Some(Utc::now() - chrono::Duration::hours(25));
        f.store.update_trip(&trip).await.unwrap();

        f.scheduler.sweep().await.unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;

        let sent = f.notifier.sent();
        let farewells = sent.iter().filter(|t| t.contains("stalled out")).count();
        assert_eq!(farewells, 1, "abandon message sent {} times: {:?}", farewells, sent);
    }

    #[tokio::test]
    async fn test_elapsed_window_completes_trip() {
        let f = fixture();
        let mut trip = seed_stale_planning(&f, 1).await;
        trip.enter_stage(Stage::TrackingFlights, Utc::now());
        trip.date_window = Some(DateWindow::new(
            NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
            NaiveDate::from_ymd_opt(2024, 1, 8).unwrap(),
        ));
        f.store.update_trip(&trip).await.unwrap();

        f.scheduler.sweep().await.unwrap();

        let completed = f.store.get_trip(&trip.id).await.unwrap();
        assert_eq!(completed.stage, Stage::Completed);
    }

    #[tokio::test]
    async fn test_voting_nudge_targets_pending_voters_only() {
        let f = fixture();
        let mut trip = f.store.create_trip(Trip::new("chat-1")).await.unwrap();
        let m1 = f
            .store
            .upsert_member(Member::new(&trip.id, "+15550001").with_name("Ana"))
            .await
            .unwrap();
        f.store
            .upsert_member(Member::new(&trip.id, "+15550002").with_name("Ben"))
            .await
            .unwrap();
        trip.enter_stage(Stage::VotingDestination, Utc::now());
        trip.stage_entered_at = Some(Utc::now() - chrono::Duration::hours(25));
        f.store.update_trip(&trip).await.unwrap();
        f.store
            .create_vote(Vote::new(&trip.id, &m1.id, crate::domain::PollType::Destination, "Tokyo"))
            .await
            .unwrap();

        f.scheduler.sweep().await.unwrap();

        let sent = f.notifier.sent();
        assert_eq!(sent.len(), 1);
        assert!(sent[0].contains("Ben"));
        assert!(!sent[0].contains("Ana"));
    }

    #[tokio::test]
    async fn test_no_nudge_when_everyone_submitted() {
        let f = fixture();
        let mut trip = f.store.create_trip(Trip::new("chat-1")).await.unwrap();
        let m1 = f.store.upsert_member(Member::new(&trip.id, "+15550001")).await.unwrap();
        trip.enter_stage(Stage::TrackingFlights, Utc::now());
        trip.stage_entered_at = Some(Utc::now() - chrono::Duration::hours(25));
        trip.destination = Some("Tokyo".to_string());
        f.store.update_trip(&trip).await.unwrap();
        f.store
            .create_flight(Flight::new(&trip.id, &m1.id, "UA123"))
            .await
            .unwrap();

        f.scheduler.sweep().await.unwrap();
        assert!(f.notifier.sent().is_empty());
    }

    #[tokio::test]
    async fn test_sweep_continues_past_failing_trip() {
        // Engine that always errors; the sweep must still finish.
        let store = Arc::new(MemoryStore::new());
        let notifier = Arc::new(RecordingNotifier::default());
        let actions = Arc::new(EntryActions::new(
            store.clone(),
            notifier.clone(),
            TransitionDedup::new(Duration::from_secs(10)),
        ));
        let scheduler = NudgeScheduler::new(
            store.clone(),
            Arc::new(NoopEngine),
            notifier.clone(),
            actions,
            Arc::new(EventBus::new(16)),
            NudgeConfig::default(),
        );
        let t1 = store.create_trip(Trip::new("chat-1")).await.unwrap();
        let t2 = store.create_trip(Trip::new("chat-2")).await.unwrap();

        scheduler.sweep().await.unwrap();
        // Both trips still present and untouched.
        assert_eq!(store.get_trip(&t1.id).await.unwrap().stage, Stage::Gathering);
        assert_eq!(store.get_trip(&t2.id).await.unwrap().stage, Stage::Gathering);
    }

    #[test]
    fn test_nudge_text_escalation_levels() {
        let names = vec!["Ana".to_string()];
        assert!(nudge_text(0, &names, "your vote").contains("Friendly"));
        assert!(nudge_text(1, &names, "your vote").contains("Second"));
        assert!(nudge_text(2, &names, "your vote").contains("Last call"));
        assert!(nudge_text(7, &names, "your vote").contains("Last call"));
    }
}
