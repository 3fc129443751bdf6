//! Intent handlers
//!
//! One handler per intent, dispatched by fixed lookup. A handler either
//! succeeds with a structured [`Output`], skips (routing the message to the
//! conversational fallback), or hands off to exactly one other handler when
//! the classifier's label turns out to be half right.

use std::sync::Arc;
use std::sync::LazyLock;

use eyre::Result;
use regex::Regex;
use tracing::debug;

use super::context::HandlerContext;
use super::output::Output;
use crate::classifier::{Classifier, Intent, rules};
use crate::consensus::{majority_threshold, resolve_date_overlap, tally_results};
use crate::domain::{DateAvailability, DateWindow, DestinationSuggestion, Flight, Member, Vote};
use crate::store::{Store, StoreError};

static FLIGHT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b([A-Za-z]{2})\s*-?\s*(\d{2,4})\b").unwrap_or_else(|e| panic!("invalid flight regex: {}", e))
});

const NAME_PREFIXES: &[&str] = &["i'm ", "im ", "i am ", "this is ", "it's ", "call me ", "my name is "];

/// Outcome of one handler invocation
#[derive(Debug, Clone, PartialEq)]
pub enum HandlerResult {
    Success(Output),
    /// Not mine after all; fall through to the conversational handler
    Skip,
    /// Re-dispatch the same message to another handler (single hop)
    Handoff(Intent),
}

pub struct Handlers {
    store: Arc<dyn Store>,
    classifier: Arc<dyn Classifier>,
}

impl Handlers {
    pub fn new(store: Arc<dyn Store>, classifier: Arc<dyn Classifier>) -> Self {
        Self { store, classifier }
    }

    /// Fixed intent -> handler lookup
    pub async fn dispatch(&self, intent: Intent, ctx: &HandlerContext) -> Result<HandlerResult> {
        debug!(intent = %intent, trip_id = %ctx.trip.id, "dispatch: called");
        match intent {
            Intent::Join => self.handle_join(ctx).await,
            Intent::ProvideName => self.handle_name(ctx).await,
            Intent::SuggestDestination => self.handle_suggestion(ctx).await,
            Intent::ProvideAvailability => self.handle_availability(ctx).await,
            Intent::CastVote => self.handle_vote(ctx).await,
            Intent::FlightInfo => self.handle_flight(ctx).await,
            Intent::Conversational => Ok(HandlerResult::Success(Output::Conversational { stage: ctx.trip.stage })),
        }
    }

    /// Resolve the sender to a member row, creating one on first contact.
    /// Submitting input is an implicit join.
    async fn ensure_sender(&self, ctx: &HandlerContext) -> Result<Member, StoreError> {
        match &ctx.sender {
            Some(member) => Ok(member.clone()),
            None => self.store.upsert_member(Member::new(&ctx.trip.id, &ctx.message.from)).await,
        }
    }

    async fn handle_join(&self, ctx: &HandlerContext) -> Result<HandlerResult> {
        if ctx.sender.is_some() {
            // Already in; the message probably carries their name.
            return Ok(HandlerResult::Handoff(Intent::ProvideName));
        }

        match self.store.upsert_member(Member::new(&ctx.trip.id, &ctx.message.from)).await {
            Ok(member) => Ok(HandlerResult::Success(Output::Welcome {
                label: member.label().to_string(),
                member_count: ctx.members.len() + 1,
            })),
            Err(StoreError::Conflict(_)) => Ok(HandlerResult::Success(Output::OtherTripConflict)),
            Err(e) => Err(e.into()),
        }
    }

    async fn handle_name(&self, ctx: &HandlerContext) -> Result<HandlerResult> {
        let Some(name) = self.extract_name(&ctx.message.body).await else {
            return Ok(HandlerResult::Skip);
        };

        let mut member = self.ensure_sender(ctx).await?;
        member.display_name = Some(name.clone());
        self.store.update_member(&member).await?;

        Ok(HandlerResult::Success(Output::NameRecorded { name }))
    }

    /// Pull a display name out of the message: a bare name token, a
    /// prefixed introduction, or the classifier's judgement as last resort.
    async fn extract_name(&self, body: &str) -> Option<String> {
        let trimmed = body.trim().trim_end_matches(['.', '!']);
        if rules::looks_like_name(trimmed) {
            return Some(trimmed.to_string());
        }

        let lower = trimmed.to_lowercase();
        for prefix in NAME_PREFIXES {
            if lower.starts_with(prefix) {
                let rest = trimmed[prefix.len()..].trim();
                if !rest.is_empty() && rest.split_whitespace().count() <= 3 {
                    return Some(rest.to_string());
                }
            }
        }

        match self.classifier.is_name(trimmed).await {
            Ok(true) => Some(trimmed.to_string()),
            _ => None,
        }
    }

    async fn handle_suggestion(&self, ctx: &HandlerContext) -> Result<HandlerResult> {
        if ctx.trip.destination.is_some() {
            // Destination already locked; nothing to record.
            return Ok(HandlerResult::Skip);
        }

        let destinations = match self.classifier.extract_destinations(&ctx.message.body).await {
            Ok(destinations) => destinations,
            Err(e) => {
                debug!(error = %e, "handle_suggestion: classifier failed, trying literal text");
                let literal = ctx.message.body.trim().trim_end_matches(['.', '!', '?']);
                if literal.is_empty() || literal.split_whitespace().count() > 4 {
                    return Ok(HandlerResult::Skip);
                }
                vec![literal.to_string()]
            }
        };

        let member = self.ensure_sender(ctx).await?;
        self.store
            .upsert_suggestion(DestinationSuggestion::new(&ctx.trip.id, &member.id, destinations.clone()))
            .await?;

        Ok(HandlerResult::Success(Output::SuggestionRecorded {
            label: member.label().to_string(),
            destinations,
        }))
    }

    async fn handle_availability(&self, ctx: &HandlerContext) -> Result<HandlerResult> {
        let range = match rules::parse_range(&ctx.message.body) {
            Some(range) => range,
            None => match self.classifier.parse_date_range(&ctx.message.body).await {
                Ok(range) => range,
                Err(e) => {
                    debug!(error = %e, "handle_availability: no parseable range");
                    return Ok(HandlerResult::Skip);
                }
            },
        };

        let member = self.ensure_sender(ctx).await?;
        let mut availability = DateAvailability::new(&ctx.trip.id, &member.id, range.start, range.end);
        if range.flexible {
            availability = availability.flexible();
        }
        self.store.upsert_availability(availability).await?;

        // Re-resolve over fresh rows: if this submission killed the overlap,
        // say so now instead of leaving the trip silently stuck.
        let availabilities = self.store.get_date_availability(&ctx.trip.id).await?;
        let constrained = availabilities.iter().filter(|a| !a.flexible).count();
        if constrained >= 2 && resolve_date_overlap(&availabilities).is_empty() {
            let members = self.store.get_members(&ctx.trip.id).await?;
            let per_member = availabilities
                .iter()
                .map(|a| {
                    let label = members
                        .iter()
                        .find(|m| m.id == a.member_id)
                        .map(|m| m.label().to_string())
                        .unwrap_or_else(|| a.member_id.clone());
                    if a.flexible {
                        format!("- {}: flexible", label)
                    } else {
                        format!("- {}: {}", label, DateWindow::new(a.start, a.end))
                    }
                })
                .collect();
            return Ok(HandlerResult::Success(Output::AvailabilityConflict { per_member }));
        }

        let display = if range.flexible {
            "whenever works".to_string()
        } else {
            DateWindow::new(range.start, range.end).to_string()
        };
        Ok(HandlerResult::Success(Output::AvailabilityRecorded {
            label: member.label().to_string(),
            display,
        }))
    }

    async fn handle_vote(&self, ctx: &HandlerContext) -> Result<HandlerResult> {
        let Some(poll) = &ctx.poll else {
            debug!(trip_id = %ctx.trip.id, "handle_vote: no open poll");
            return Ok(HandlerResult::Skip);
        };

        // Digit ballot, exact key, then the classifier against the keys.
        let option = if let Some(index) = rules::vote_index(&ctx.message.body) {
            poll.option_by_index(index)
        } else if let Some(option) = poll.option_by_key(&ctx.message.body) {
            Some(option)
        } else {
            let keys: Vec<String> = poll.options.iter().map(|o| o.key.clone()).collect();
            match self.classifier.extract_vote_choice(&keys, &ctx.message.body).await {
                Ok(choice) => poll.option_by_key(&choice),
                Err(e) => {
                    debug!(error = %e, "handle_vote: no extractable choice");
                    None
                }
            }
        };
        let Some(option) = option.cloned() else {
            return Ok(HandlerResult::Skip);
        };

        let member = self.ensure_sender(ctx).await?;
        self.store
            .create_vote(Vote::new(&ctx.trip.id, &member.id, poll.poll_type, &option.key))
            .await?;

        // Fresh tally for the announcement; the stage table will read its
        // own fresh copy when deciding closure.
        let votes = self.store.get_votes(&ctx.trip.id, poll.poll_type).await?;
        let members = self.store.get_members(&ctx.trip.id).await?;
        let tally = tally_results(&votes);
        let tie = crate::consensus::is_tie(&tally);

        Ok(HandlerResult::Success(Output::VoteRecorded {
            label: member.label().to_string(),
            choice: option.display.clone(),
            tally,
            votes_cast: votes.len(),
            threshold: majority_threshold(members.len()),
            tie,
        }))
    }

    async fn handle_flight(&self, ctx: &HandlerContext) -> Result<HandlerResult> {
        let Some(caps) = FLIGHT_RE.captures(&ctx.message.body) else {
            return Ok(HandlerResult::Skip);
        };
        let flight_number = format!("{}{}", caps[1].to_uppercase(), &caps[2]);

        let member = self.ensure_sender(ctx).await?;
        self.store
            .create_flight(Flight::new(&ctx.trip.id, &member.id, &flight_number))
            .await?;

        Ok(HandlerResult::Success(Output::FlightRecorded {
            label: member.label().to_string(),
            flight_number,
        }))
    }
}
