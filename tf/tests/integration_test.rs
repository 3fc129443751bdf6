//! Integration tests for TripFlow
//!
//! These tests drive full trips through the public API: orchestrator,
//! transition engine, entry actions, and sequencer wired together over the
//! in-memory store, with a scripted classifier standing in for the LLM.

use std::io::Write;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use eyre::Result;

use tripflow::classifier::{Classification, Classifier, ClassifierError, DateRange, StageContext};
use tripflow::config::{Config, StageConfig};
use tripflow::domain::{DateWindow, InboundMessage, Member, Stage, Trip};
use tripflow::events::{TransitionDedup, create_event_bus};
use tripflow::fsm::{StageTable, TransitionEngine};
use tripflow::orchestrator::{EntryActions, Notifier, Orchestrator, Responder, resolve_trip};
use tripflow::sequencer::{MessageProcessor, PerTripSequencer};
use tripflow::store::{MemoryStore, Store};

// =============================================================================
// Test doubles
// =============================================================================

/// Classifier with a scripted intent queue; extraction methods use the same
/// cheap heuristics a well-behaved model would land on.
struct ScriptedClassifier {
    intents: Mutex<Vec<Classification>>,
}

impl ScriptedClassifier {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            intents: Mutex::new(Vec::new()),
        })
    }

    fn queue_intent(&self, label: &str, confidence: f64) {
        self.intents.lock().unwrap().push(Classification {
            label: label.to_string(),
            confidence,
        });
    }
}

#[async_trait]
impl Classifier for ScriptedClassifier {
    async fn classify_intent(&self, _ctx: &StageContext, _text: &str) -> Result<Classification, ClassifierError> {
        let mut intents = self.intents.lock().unwrap();
        if intents.is_empty() {
            return Err(ClassifierError::InvalidResponse("no scripted intent".to_string()));
        }
        Ok(intents.remove(0))
    }

    async fn extract_vote_choice(&self, options: &[String], text: &str) -> Result<String, ClassifierError> {
        options
            .iter()
            .find(|o| o.eq_ignore_ascii_case(text.trim()))
            .cloned()
            .ok_or(ClassifierError::NoExtraction("vote choice"))
    }

    async fn extract_destinations(&self, text: &str) -> Result<Vec<String>, ClassifierError> {
        Ok(text
            .split(',')
            .map(|s| s.trim().trim_end_matches(['.', '!']).to_string())
            .filter(|s| !s.is_empty())
            .collect())
    }

    async fn parse_date_range(&self, _text: &str) -> Result<DateRange, ClassifierError> {
        Err(ClassifierError::NoExtraction("date range"))
    }

    async fn is_name(&self, text: &str) -> Result<bool, ClassifierError> {
        Ok(text.split_whitespace().count() <= 2)
    }
}

/// Captures every reply and announcement, keyed by channel
struct CapturingOutbound {
    sent: Mutex<Vec<(String, String)>>,
}

impl CapturingOutbound {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            sent: Mutex::new(Vec::new()),
        })
    }

    fn texts_for(&self, channel: &str) -> Vec<String> {
        self.sent
            .lock()
            .unwrap()
            .iter()
            .filter(|(c, _)| c == channel)
            .map(|(_, t)| t.clone())
            .collect()
    }
}

#[async_trait]
impl Responder for CapturingOutbound {
    async fn reply(&self, channel: &str, text: &str) -> Result<()> {
        self.sent.lock().unwrap().push((channel.to_string(), text.to_string()));
        Ok(())
    }
}

#[async_trait]
impl Notifier for CapturingOutbound {
    async fn notify(&self, channel: &str, text: &str) -> Result<()> {
        self.sent.lock().unwrap().push((channel.to_string(), text.to_string()));
        Ok(())
    }
}

// =============================================================================
// Harness
// =============================================================================

struct Harness {
    store: Arc<MemoryStore>,
    classifier: Arc<ScriptedClassifier>,
    outbound: Arc<CapturingOutbound>,
    orchestrator: Arc<Orchestrator>,
}

fn harness(with_subscriber: bool) -> Harness {
    let store = Arc::new(MemoryStore::new());
    let classifier = ScriptedClassifier::new();
    let outbound = CapturingOutbound::new();
    let bus = create_event_bus(16);

    let actions = Arc::new(EntryActions::new(
        store.clone(),
        outbound.clone(),
        TransitionDedup::new(Duration::from_secs(10)),
    ));
    if with_subscriber {
        actions.spawn_subscriber(&bus);
    }

    let engine = Arc::new(TransitionEngine::new(
        store.clone(),
        StageTable::new(StageConfig::default()),
        bus,
        actions,
        8,
    ));

    let orchestrator = Arc::new(Orchestrator::new(
        store.clone(),
        classifier.clone(),
        outbound.clone(),
        engine,
        0.5,
    ));

    Harness {
        store,
        classifier,
        outbound,
        orchestrator,
    }
}

async fn send(h: &Harness, from: &str, channel: &str, body: &str) -> Trip {
    let message = InboundMessage::new(from, body, channel);
    let trip = resolve_trip(h.store.as_ref(), &message)
        .await
        .expect("trip resolution failed");
    h.orchestrator.process(&trip.id, message).await.expect("process failed");
    h.store.get_trip(&trip.id).await.expect("trip reload failed")
}

fn day(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).expect("valid date")
}

// =============================================================================
// Stage flow
// =============================================================================

#[tokio::test]
async fn test_overlapping_availability_auto_locks_dates() {
    let h = harness(false);
    h.classifier.queue_intent("join", 0.95);
    h.classifier.queue_intent("join", 0.95);

    send(&h, "+15550001", "chat-1", "count me in!").await;
    let trip = send(&h, "+15550002", "chat-1", "me too").await;
    assert_eq!(trip.stage, Stage::Planning);

    // Date ranges are claimed by the rules, no classifier involved.
    send(&h, "+15550001", "chat-1", "2025-03-15 to 2025-03-20").await;
    let trip = send(&h, "+15550002", "chat-1", "2025-03-16 to 2025-03-21").await;

    // Intersection fits one window: locked and cascaded back to planning.
    assert_eq!(trip.stage, Stage::Planning);
    assert_eq!(trip.date_window, Some(DateWindow::new(day(2025, 3, 16), day(2025, 3, 20))));

    let sent = h.outbound.texts_for("chat-1");
    assert!(sent.iter().any(|t| t.contains("locking those dates in")));
}

#[tokio::test]
async fn test_destination_poll_tie_then_majority() {
    let h = harness(false);
    for _ in 0..3 {
        h.classifier.queue_intent("join", 0.95);
    }
    send(&h, "+15550001", "chat-1", "count me in").await;
    send(&h, "+15550002", "chat-1", "in!").await;
    send(&h, "+15550003", "chat-1", "same here").await;

    for _ in 0..3 {
        h.classifier.queue_intent("destination", 0.9);
    }
    send(&h, "+15550001", "chat-1", "Tokyo").await;
    send(&h, "+15550002", "chat-1", "Bali").await;
    let trip = send(&h, "+15550003", "chat-1", "Tokyo").await;

    // Full coverage opens the poll with distinct options in mention order.
    assert_eq!(trip.stage, Stage::VotingDestination);
    let sent = h.outbound.texts_for("chat-1");
    let opening = sent.iter().find(|t| t.contains("Time to vote")).expect("poll opening");
    assert!(opening.contains("1. Tokyo"));
    assert!(opening.contains("2. Bali"));

    // Digit ballots hit the rules fast path. Two votes reach the threshold
    // but tie, so the poll stays open until the third breaks it.
    send(&h, "+15550001", "chat-1", "1").await;
    let trip = send(&h, "+15550002", "chat-1", "2").await;
    assert_eq!(trip.stage, Stage::VotingDestination);

    let trip = send(&h, "+15550003", "chat-1", "1").await;
    assert_eq!(trip.stage, Stage::Planning);
    assert_eq!(trip.destination.as_deref(), Some("Tokyo"));

    let sent = h.outbound.texts_for("chat-1");
    assert!(sent.iter().any(|t| t.contains("going to Tokyo")));
}

#[tokio::test]
async fn test_wide_overlap_opens_date_poll() {
    let h = harness(false);
    h.classifier.queue_intent("join", 0.95);
    h.classifier.queue_intent("join", 0.95);
    send(&h, "+15550001", "chat-1", "count me in").await;
    send(&h, "+15550002", "chat-1", "me too").await;

    send(&h, "+15550001", "chat-1", "2025-03-01 to 2025-03-28").await;
    let trip = send(&h, "+15550002", "chat-1", "2025-03-01 to 2025-03-28").await;

    // Four weeks of overlap is too wide to lock outright.
    assert_eq!(trip.stage, Stage::VotingDates);

    send(&h, "+15550001", "chat-1", "1").await;
    let trip = send(&h, "+15550002", "chat-1", "1").await;

    assert_eq!(trip.stage, Stage::Planning);
    let window = trip.date_window.expect("window locked");
    assert!(window.start >= day(2025, 3, 1));
    assert!(window.end <= day(2025, 3, 28));

    let sent = h.outbound.texts_for("chat-1");
    assert!(sent.iter().any(|t| t.contains("The votes are in")));
}

#[tokio::test]
async fn test_flights_confirm_the_trip() {
    let h = harness(false);

    let mut trip = h.store.create_trip(Trip::new("chat-f")).await.expect("create trip");
    h.store
        .upsert_member(Member::new(&trip.id, "+15550001"))
        .await
        .expect("member 1");
    h.store
        .upsert_member(Member::new(&trip.id, "+15550002"))
        .await
        .expect("member 2");
    trip.destination = Some("Tokyo".to_string());
    trip.date_window = Some(DateWindow::new(day(2025, 3, 15), day(2025, 3, 22)));
    trip.enter_stage(Stage::TrackingFlights, Utc::now());
    h.store.update_trip(&trip).await.expect("update trip");

    h.classifier.queue_intent("flight", 0.9);
    h.classifier.queue_intent("flight", 0.9);

    let trip = send(&h, "+15550001", "chat-f", "booked! UA 1123").await;
    assert_eq!(trip.stage, Stage::TrackingFlights);

    let trip = send(&h, "+15550002", "chat-f", "on DL 456").await;
    assert_eq!(trip.stage, Stage::Confirmed);

    let sent = h.outbound.texts_for("chat-f");
    assert!(sent.iter().any(|t| t.contains("UA1123")));
    assert!(sent.iter().any(|t| t.contains("Everyone's booked")));
}

// =============================================================================
// Announcement dedup
// =============================================================================

#[tokio::test]
async fn test_stage_announcement_fires_once_with_subscriber() {
    let h = harness(true);
    h.classifier.queue_intent("join", 0.95);
    h.classifier.queue_intent("join", 0.95);

    send(&h, "+15550001", "chat-1", "count me in").await;
    let trip = send(&h, "+15550002", "chat-1", "me too").await;
    assert_eq!(trip.stage, Stage::Planning);

    // Let the event-bus subscriber observe the same transition.
    tokio::time::sleep(Duration::from_millis(50)).await;

    let openings = h
        .outbound
        .texts_for("chat-1")
        .iter()
        .filter(|t| t.contains("Planning is open"))
        .count();
    assert_eq!(openings, 1);
}

// =============================================================================
// Sequencer wiring
// =============================================================================

#[tokio::test]
async fn test_sequencer_keeps_trips_independent() {
    let h = harness(false);
    let sequencer = PerTripSequencer::new(h.orchestrator.clone());
    for _ in 0..4 {
        h.classifier.queue_intent("join", 0.95);
    }

    for (from, channel) in [
        ("+15550001", "chat-a"),
        ("+15550003", "chat-b"),
        ("+15550002", "chat-a"),
        ("+15550004", "chat-b"),
    ] {
        let message = InboundMessage::new(from, "count me in", channel);
        let trip = resolve_trip(h.store.as_ref(), &message).await.expect("resolve trip");
        sequencer.enqueue(&trip.id, message).await;
    }

    for _ in 0..200 {
        if sequencer.active_trips().await == 0 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    assert_eq!(sequencer.active_trips().await, 0, "sequencer did not drain");

    for channel in ["chat-a", "chat-b"] {
        let trip = h
            .store
            .get_trip_by_channel(channel)
            .await
            .expect("lookup")
            .expect("trip exists");
        assert_eq!(trip.stage, Stage::Planning, "{} should reach planning", channel);
        let members = h.store.get_members(&trip.id).await.expect("members");
        assert_eq!(members.len(), 2, "{} should have two members", channel);
    }
}

// =============================================================================
// Configuration
// =============================================================================

#[test]
fn test_config_loads_explicit_file_over_defaults() {
    let mut file = tempfile::NamedTempFile::new().expect("temp file");
    writeln!(
        file,
        "stages:\n  min-members: 3\nnudges:\n  give-up-after: 5\n"
    )
    .expect("write config");

    let path = file.path().to_path_buf();
    let config = Config::load(Some(&path)).expect("load config");

    assert_eq!(config.stages.min_members, 3);
    assert_eq!(config.nudges.give_up_after, 5);
    // Untouched sections keep their defaults.
    assert_eq!(config.classifier.provider, "http");
    assert_eq!(config.events.capacity, 256);
}
