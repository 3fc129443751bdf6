//! Intent classification boundary
//!
//! The core never interprets free text itself. Classification goes through
//! the [`Classifier`] trait; every call site also has a deterministic
//! fallback in [`rules`] so a dead classifier degrades the experience, not
//! the availability.

use async_trait::async_trait;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

mod error;
mod http;
pub mod rules;

pub use error::ClassifierError;
pub use http::HttpClassifier;

use crate::config::ClassifierConfig;
use crate::domain::Stage;
use std::sync::Arc;

/// What the sender is trying to do with a message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Intent {
    Join,
    ProvideName,
    SuggestDestination,
    ProvideAvailability,
    CastVote,
    FlightInfo,
    Conversational,
}

impl Intent {
    /// Map a classifier label to an intent. Unknown labels fall back to
    /// conversational, so a message is never left unhandled.
    pub fn from_label(label: &str) -> Self {
        match label {
            "join" => Intent::Join,
            "name" => Intent::ProvideName,
            "destination" => Intent::SuggestDestination,
            "availability" => Intent::ProvideAvailability,
            "vote" => Intent::CastVote,
            "flight" => Intent::FlightInfo,
            _ => Intent::Conversational,
        }
    }
}

impl std::fmt::Display for Intent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Intent::Join => "join",
            Intent::ProvideName => "name",
            Intent::SuggestDestination => "destination",
            Intent::ProvideAvailability => "availability",
            Intent::CastVote => "vote",
            Intent::FlightInfo => "flight",
            Intent::Conversational => "conversational",
        };
        write!(f, "{}", s)
    }
}

/// Light aggregate state handed to the classifier alongside the text
#[derive(Debug, Clone, Serialize)]
pub struct StageContext {
    pub stage: Stage,
    pub member_count: usize,
    pub suggestion_count: usize,
    pub availability_count: usize,
    pub vote_count: usize,
    /// Option keys of the open poll, if any
    pub poll_options: Vec<String>,
}

/// A classified intent with the service's confidence
#[derive(Debug, Clone, Deserialize)]
pub struct Classification {
    pub label: String,
    pub confidence: f64,
}

/// A parsed date range
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateRange {
    pub start: NaiveDate,
    pub end: NaiveDate,
    pub flexible: bool,
}

/// External natural-language classification service.
///
/// May fail or time out; callers fall back to [`rules`] rather than block.
#[async_trait]
pub trait Classifier: Send + Sync {
    /// Classify the overall intent of a message
    async fn classify_intent(&self, ctx: &StageContext, text: &str) -> Result<Classification, ClassifierError>;

    /// Pull a vote choice out of free text, given the open options
    async fn extract_vote_choice(&self, options: &[String], text: &str) -> Result<String, ClassifierError>;

    /// Pull destination names out of free text, most preferred first
    async fn extract_destinations(&self, text: &str) -> Result<Vec<String>, ClassifierError>;

    /// Parse a date range ("mid March", "3/15-3/22", "whenever works")
    async fn parse_date_range(&self, text: &str) -> Result<DateRange, ClassifierError>;

    /// Whether the text looks like a person introducing themselves by name
    async fn is_name(&self, text: &str) -> Result<bool, ClassifierError>;
}

/// Create a classifier from configuration
pub fn create_classifier(config: &ClassifierConfig) -> Result<Arc<dyn Classifier>, ClassifierError> {
    match config.provider.as_str() {
        "http" => Ok(Arc::new(HttpClassifier::from_config(config)?)),
        other => Err(ClassifierError::InvalidResponse(format!(
            "Unknown classifier provider: '{}'. Supported: http",
            other
        ))),
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_intent_from_label() {
        assert_eq!(Intent::from_label("vote"), Intent::CastVote);
        assert_eq!(Intent::from_label("destination"), Intent::SuggestDestination);
        assert_eq!(Intent::from_label("definitely-not-a-label"), Intent::Conversational);
    }

    #[test]
    fn test_intent_display_round_trips() {
        for intent in [
            Intent::Join,
            Intent::ProvideName,
            Intent::SuggestDestination,
            Intent::ProvideAvailability,
            Intent::CastVote,
            Intent::FlightInfo,
            Intent::Conversational,
        ] {
            assert_eq!(Intent::from_label(&intent.to_string()), intent);
        }
    }
}
