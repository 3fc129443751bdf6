//! HTTP classifier backed by an LLM messages API
//!
//! Every extraction is a single small completion: a task-specific system
//! prompt, the message text, and a JSON-only response contract.

use async_trait::async_trait;
use chrono::NaiveDate;
use rand::Rng;
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, warn};

use super::{Classification, Classifier, ClassifierError, DateRange, StageContext};
use crate::config::ClassifierConfig;

/// Maximum number of retries for transient errors
const MAX_RETRIES: u32 = 3;

/// Initial backoff delay for retries
const INITIAL_BACKOFF_MS: u64 = 1000;

const INTENT_PROMPT: &str = "You classify a message sent to a group trip-planning chat. \
Respond with JSON only: {\"label\": <one of \"join\", \"name\", \"destination\", \
\"availability\", \"vote\", \"flight\", \"conversational\">, \"confidence\": <0..1>}. \
The trip context is provided as JSON before the message.";

const VOTE_PROMPT: &str = "A poll is open. Given the option keys and a message, respond with \
JSON only: {\"choice\": <the option key the sender is voting for, or null>}.";

const DESTINATION_PROMPT: &str = "Extract travel destination names from the message, most \
preferred first. Respond with JSON only: {\"destinations\": [<strings>]}.";

const DATE_RANGE_PROMPT: &str = "Extract the date range the sender is available to travel. \
Today's date is given first. Respond with JSON only: {\"start\": \"YYYY-MM-DD\", \
\"end\": \"YYYY-MM-DD\", \"flexible\": <bool>} or {\"flexible\": true} if they are \
open to any dates, or null if no availability is expressed.";

const NAME_PROMPT: &str = "Is this message just a person stating their own name? \
Respond with JSON only: {\"is_name\": <bool>}.";

/// LLM-backed classifier speaking the Anthropic Messages API
pub struct HttpClassifier {
    model: String,
    api_key: String,
    base_url: String,
    http: Client,
    timeout: Duration,
}

impl HttpClassifier {
    /// Create a new classifier from configuration
    ///
    /// Reads the API key from the environment variable named in config.
    pub fn from_config(config: &ClassifierConfig) -> Result<Self, ClassifierError> {
        debug!(?config.model, "from_config: called");
        let api_key = config
            .get_api_key()
            .map_err(|e| ClassifierError::InvalidResponse(e.to_string()))?;

        let timeout = Duration::from_millis(config.timeout_ms);

        let http = Client::builder().timeout(timeout).build().map_err(ClassifierError::Network)?;

        Ok(Self {
            model: config.model.clone(),
            api_key,
            base_url: config.base_url.clone(),
            http,
            timeout,
        })
    }

    /// One completion call with retry, returning the parsed JSON payload
    async fn complete_json(&self, system: &str, user: &str) -> Result<serde_json::Value, ClassifierError> {
        debug!(%self.model, "complete_json: called");
        let url = format!("{}/v1/messages", self.base_url);
        let body = serde_json::json!({
            "model": self.model,
            "max_tokens": 256,
            "system": system,
            "messages": [{ "role": "user", "content": user }],
        });

        let mut last_error = None;
        for attempt in 0..=MAX_RETRIES {
            if attempt > 0 {
                // Exponential backoff with jitter so concurrent trips don't
                // retry in lockstep.
                let jitter = rand::rng().random_range(0..INITIAL_BACKOFF_MS / 4);
                let backoff = INITIAL_BACKOFF_MS * 2u64.pow(attempt - 1) + jitter;
                warn!(
                    attempt,
                    backoff_ms = backoff,
                    "complete_json: retrying after transient error"
                );
                tokio::time::sleep(Duration::from_millis(backoff)).await;
            }

            let response = match self
                .http
                .post(url.clone())
                .header("x-api-key", self.api_key.clone())
                .header("anthropic-version", "2023-06-01")
                .header("content-type", "application/json")
                .json(&body)
                .send()
                .await
            {
                Ok(r) => r,
                Err(e) => {
                    debug!(attempt, error = %e, "complete_json: network error");
                    let err = if e.is_timeout() {
                        ClassifierError::Timeout(self.timeout)
                    } else {
                        ClassifierError::Network(e)
                    };
                    if err.is_retryable() && attempt < MAX_RETRIES {
                        last_error = Some(err);
                        continue;
                    }
                    return Err(err);
                }
            };

            let status = response.status().as_u16();

            if status == 429 {
                debug!("complete_json: rate limited (429)");
                let retry_after = response
                    .headers()
                    .get("retry-after")
                    .and_then(|v| v.to_str().ok())
                    .and_then(|s| s.parse::<u64>().ok())
                    .unwrap_or(60);

                return Err(ClassifierError::RateLimited {
                    retry_after: Duration::from_secs(retry_after),
                });
            }

            if !response.status().is_success() {
                let text = response.text().await.unwrap_or_default();
                let err = ClassifierError::ApiError { status, message: text };
                if err.is_retryable() && attempt < MAX_RETRIES {
                    debug!(attempt, status, "complete_json: retryable error");
                    last_error = Some(err);
                    continue;
                }
                debug!(%status, "complete_json: API error");
                return Err(err);
            }

            debug!("complete_json: success");
            let api_response: MessagesResponse = response.json().await?;
            return parse_json_payload(&api_response.text());
        }

        Err(last_error.unwrap_or_else(|| ClassifierError::InvalidResponse("Max retries exceeded".to_string())))
    }
}

/// Parse the JSON object out of a model reply, tolerating code fences
fn parse_json_payload(text: &str) -> Result<serde_json::Value, ClassifierError> {
    let trimmed = text.trim();
    let inner = trimmed
        .strip_prefix("```json")
        .or_else(|| trimmed.strip_prefix("```"))
        .and_then(|s| s.strip_suffix("```"))
        .unwrap_or(trimmed)
        .trim();

    serde_json::from_str(inner).map_err(|e| ClassifierError::InvalidResponse(format!("bad JSON payload: {}", e)))
}

fn parse_date_field(value: &serde_json::Value, field: &'static str) -> Result<NaiveDate, ClassifierError> {
    let raw = value[field]
        .as_str()
        .ok_or(ClassifierError::NoExtraction("date range"))?;
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .map_err(|e| ClassifierError::InvalidResponse(format!("bad {} date '{}': {}", field, raw, e)))
}

#[async_trait]
impl Classifier for HttpClassifier {
    async fn classify_intent(&self, ctx: &StageContext, text: &str) -> Result<Classification, ClassifierError> {
        debug!(stage = %ctx.stage, "classify_intent: called");
        let ctx_json = serde_json::to_string(ctx)
            .map_err(|e| ClassifierError::InvalidResponse(format!("context serialization: {}", e)))?;
        let user = format!("Context: {}\n\nMessage: {}", ctx_json, text);

        let payload = self.complete_json(INTENT_PROMPT, &user).await?;
        serde_json::from_value(payload)
            .map_err(|e| ClassifierError::InvalidResponse(format!("bad classification: {}", e)))
    }

    async fn extract_vote_choice(&self, options: &[String], text: &str) -> Result<String, ClassifierError> {
        debug!(option_count = options.len(), "extract_vote_choice: called");
        let user = format!("Options: {}\n\nMessage: {}", options.join(", "), text);

        let payload = self.complete_json(VOTE_PROMPT, &user).await?;
        let choice = payload["choice"]
            .as_str()
            .ok_or(ClassifierError::NoExtraction("vote choice"))?;

        // The model must pick from the offered keys, not invent one.
        options
            .iter()
            .find(|o| o.eq_ignore_ascii_case(choice))
            .cloned()
            .ok_or(ClassifierError::NoExtraction("vote choice"))
    }

    async fn extract_destinations(&self, text: &str) -> Result<Vec<String>, ClassifierError> {
        debug!("extract_destinations: called");
        let payload = self.complete_json(DESTINATION_PROMPT, text).await?;
        let destinations: Vec<String> = serde_json::from_value(payload["destinations"].clone())
            .map_err(|_| ClassifierError::NoExtraction("destination"))?;

        if destinations.is_empty() {
            return Err(ClassifierError::NoExtraction("destination"));
        }
        Ok(destinations)
    }

    async fn parse_date_range(&self, text: &str) -> Result<DateRange, ClassifierError> {
        debug!("parse_date_range: called");
        let today = chrono::Utc::now().date_naive();
        let user = format!("Today: {}\n\nMessage: {}", today, text);

        let payload = self.complete_json(DATE_RANGE_PROMPT, &user).await?;
        if payload.is_null() {
            return Err(ClassifierError::NoExtraction("date range"));
        }
        if payload["flexible"].as_bool() == Some(true) && payload.get("start").is_none_or(|v| v.is_null()) {
            return Ok(DateRange {
                start: today,
                end: today,
                flexible: true,
            });
        }

        let start = parse_date_field(&payload, "start")?;
        let end = parse_date_field(&payload, "end")?;
        if end < start {
            return Err(ClassifierError::InvalidResponse(format!(
                "date range ends before it starts: {} > {}",
                start, end
            )));
        }

        Ok(DateRange {
            start,
            end,
            flexible: payload["flexible"].as_bool().unwrap_or(false),
        })
    }

    async fn is_name(&self, text: &str) -> Result<bool, ClassifierError> {
        debug!("is_name: called");
        let payload = self.complete_json(NAME_PROMPT, text).await?;
        payload["is_name"]
            .as_bool()
            .ok_or(ClassifierError::NoExtraction("name"))
    }
}

// Messages API response types

#[derive(Debug, Deserialize)]
struct MessagesResponse {
    content: Vec<MessagesContentBlock>,
}

impl MessagesResponse {
    /// Concatenated text of all text blocks
    fn text(&self) -> String {
        self.content
            .iter()
            .map(|b| match b {
                MessagesContentBlock::Text { text } => text.as_str(),
            })
            .collect()
    }
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type")]
enum MessagesContentBlock {
    #[serde(rename = "text")]
    Text { text: String },
}
