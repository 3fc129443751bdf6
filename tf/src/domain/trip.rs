//! Trip domain type and the stage vocabulary
//!
//! A Trip is one group conversation working its way through the planning
//! workflow. The `stage` field drives the state machine; `destination` and
//! `date_window` are only ever written by consensus resolution.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use super::id::generate_id;

/// Phase of the group-decision workflow a trip is currently in.
///
/// Stages advance monotonically except `planning`, which is re-entrant:
/// the destination and date sub-negotiations each cycle through a voting
/// stage and return. `dates_set` is an immediate pass-through stage that
/// exists so the locked window gets announced exactly once.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    /// Collecting members before planning opens
    #[default]
    Gathering,
    /// Collecting destination suggestions and date availabilities
    Planning,
    /// Open destination poll
    VotingDestination,
    /// Open date-window poll
    VotingDates,
    /// Date window just locked by consensus (pass-through)
    DatesSet,
    /// Dates and destination resolved, collecting flight info
    TrackingFlights,
    /// Logistics confirmed, nothing left to decide
    Confirmed,
    /// Travel dates have elapsed
    Completed,
    /// Given up after prolonged inactivity
    Abandoned,
    /// Unrecognized stored value; treated as terminal, never advanced
    #[serde(other)]
    Unknown,
}

impl Stage {
    /// Terminal stages are never evaluated or nudged again.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Stage::Confirmed | Stage::Completed | Stage::Abandoned | Stage::Unknown)
    }

    /// Whether a poll is open in this stage, and which one.
    pub fn open_poll(&self) -> Option<PollType> {
        match self {
            Stage::VotingDestination => Some(PollType::Destination),
            Stage::VotingDates => Some(PollType::Dates),
            _ => None,
        }
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Gathering => write!(f, "gathering"),
            Self::Planning => write!(f, "planning"),
            Self::VotingDestination => write!(f, "voting_destination"),
            Self::VotingDates => write!(f, "voting_dates"),
            Self::DatesSet => write!(f, "dates_set"),
            Self::TrackingFlights => write!(f, "tracking_flights"),
            Self::Confirmed => write!(f, "confirmed"),
            Self::Completed => write!(f, "completed"),
            Self::Abandoned => write!(f, "abandoned"),
            Self::Unknown => write!(f, "unknown"),
        }
    }
}

/// Which poll a vote belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PollType {
    Destination,
    Dates,
}

impl std::fmt::Display for PollType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Destination => write!(f, "destination"),
            Self::Dates => write!(f, "dates"),
        }
    }
}

/// Inclusive date range the group will travel in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateWindow {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl DateWindow {
    pub fn new(start: NaiveDate, end: NaiveDate) -> Self {
        Self { start, end }
    }

    /// Stable machine key, e.g. `2025-03-15/2025-03-22`. This is what vote
    /// choices reference; it round-trips without touching display text.
    pub fn key(&self) -> String {
        format!("{}/{}", self.start, self.end)
    }

    /// Parse a key produced by [`DateWindow::key`].
    pub fn from_key(key: &str) -> Option<Self> {
        let (start, end) = key.split_once('/')?;
        let start = start.parse().ok()?;
        let end = end.parse().ok()?;
        Some(Self { start, end })
    }
}

impl std::fmt::Display for DateWindow {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} to {}", self.start.format("%b %d %Y"), self.end.format("%b %d %Y"))
    }
}

/// One group conversation planning one trip
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Trip {
    /// Unique identifier
    pub id: String,

    /// Channel identity the conversation lives on (group chat id)
    pub channel: String,

    /// Current workflow stage
    pub stage: Stage,

    /// When the current stage was entered. Missing means "just entered".
    #[serde(default)]
    pub stage_entered_at: Option<DateTime<Utc>>,

    /// Chosen destination, set only by consensus resolution
    #[serde(default)]
    pub destination: Option<String>,

    /// Locked travel window, set only by consensus resolution
    #[serde(default)]
    pub date_window: Option<DateWindow>,

    /// Reminders already sent in the current stage
    #[serde(default)]
    pub nudge_count: u32,

    /// When the last reminder went out
    #[serde(default)]
    pub last_nudge_at: Option<DateTime<Utc>>,

    /// Creation timestamp
    pub created_at: DateTime<Utc>,
}

impl Trip {
    /// Create a new trip on first contact from an unseen channel
    pub fn new(channel: impl Into<String>) -> Self {
        let channel = channel.into();
        let now = Utc::now();
        Self {
            id: generate_id("trip"),
            channel,
            stage: Stage::Gathering,
            stage_entered_at: Some(now),
            destination: None,
            date_window: None,
            nudge_count: 0,
            last_nudge_at: None,
            created_at: now,
        }
    }

    /// Time spent in the current stage. A missing timestamp is treated
    /// as "just entered" rather than an error.
    pub fn stage_elapsed(&self, now: DateTime<Utc>) -> chrono::Duration {
        match self.stage_entered_at {
            Some(entered) => (now - entered).max(chrono::Duration::zero()),
            None => chrono::Duration::zero(),
        }
    }

    /// Move to a new stage, resetting the entry timestamp and nudge state.
    pub fn enter_stage(&mut self, stage: Stage, now: DateTime<Utc>) {
        self.stage = stage;
        self.stage_entered_at = Some(now);
        self.nudge_count = 0;
        self.last_nudge_at = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_stage_serde_round_trip() {
        let json = serde_json::to_string(&Stage::VotingDestination).unwrap();
        assert_eq!(json, "\"voting_destination\"");
        let back: Stage = serde_json::from_str(&json).unwrap();
        assert_eq!(back, Stage::VotingDestination);
    }

    #[test]
    fn test_unrecognized_stage_degrades_to_unknown() {
        let stage: Stage = serde_json::from_str("\"negotiating_hotels\"").unwrap();
        assert_eq!(stage, Stage::Unknown);
        assert!(stage.is_terminal());
    }

    #[test]
    fn test_terminal_stages() {
        assert!(Stage::Completed.is_terminal());
        assert!(Stage::Abandoned.is_terminal());
        assert!(Stage::Confirmed.is_terminal());
        assert!(!Stage::Planning.is_terminal());
        assert!(!Stage::VotingDates.is_terminal());
    }

    #[test]
    fn test_open_poll() {
        assert_eq!(Stage::VotingDestination.open_poll(), Some(PollType::Destination));
        assert_eq!(Stage::VotingDates.open_poll(), Some(PollType::Dates));
        assert_eq!(Stage::Planning.open_poll(), None);
    }

    #[test]
    fn test_date_window_key_round_trip() {
        let window = DateWindow::new(
            NaiveDate::from_ymd_opt(2025, 3, 15).unwrap(),
            NaiveDate::from_ymd_opt(2025, 3, 22).unwrap(),
        );
        assert_eq!(window.key(), "2025-03-15/2025-03-22");
        assert_eq!(DateWindow::from_key(&window.key()), Some(window));
        assert_eq!(DateWindow::from_key("garbage"), None);
    }

    #[test]
    fn test_stage_elapsed_missing_timestamp_is_zero() {
        let mut trip = Trip::new("chat-1");
        trip.stage_entered_at = None;
        assert_eq!(trip.stage_elapsed(Utc::now()), Duration::zero());
    }

    #[test]
    fn test_enter_stage_resets_nudges() {
        let mut trip = Trip::new("chat-1");
        trip.nudge_count = 3;
        trip.last_nudge_at = Some(Utc::now());

        let now = Utc::now();
        trip.enter_stage(Stage::Planning, now);

        assert_eq!(trip.stage, Stage::Planning);
        assert_eq!(trip.stage_entered_at, Some(now));
        assert_eq!(trip.nudge_count, 0);
        assert!(trip.last_nudge_at.is_none());
    }
}
