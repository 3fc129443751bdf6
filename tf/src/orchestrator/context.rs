//! Per-message handler context
//!
//! Rebuilt from the store for every dequeued message (and again after a
//! handoff) so handlers always see current membership and poll state. The
//! transition engine re-reads its own counts; nothing here is trusted
//! across an await that writes.

use tracing::debug;

use crate::classifier::StageContext;
use crate::consensus::resolve_date_overlap;
use crate::domain::{InboundMessage, Member, PollContext, PollOption, PollType, Trip};
use crate::store::{Store, StoreError};

pub struct HandlerContext {
    pub trip: Trip,
    pub members: Vec<Member>,
    /// The member matching the sender's phone, if they have joined
    pub sender: Option<Member>,
    pub message: InboundMessage,
    /// Open poll snapshot, present only in voting stages
    pub poll: Option<PollContext>,
    pub suggestion_count: usize,
    pub availability_count: usize,
    pub vote_count: usize,
}

impl HandlerContext {
    pub async fn build(store: &dyn Store, trip: Trip, message: InboundMessage) -> Result<Self, StoreError> {
        debug!(trip_id = %trip.id, stage = %trip.stage, "build: called");
        let members = store.get_members(&trip.id).await?;
        let sender = members.iter().find(|m| m.phone == message.from).cloned();

        let suggestion_count = store.get_destination_suggestions(&trip.id).await?.len();
        let availability_count = store.get_date_availability(&trip.id).await?.len();

        let (poll, vote_count) = match trip.stage.open_poll() {
            Some(poll_type) => {
                let poll = build_poll_context(store, &trip, poll_type, members.len()).await?;
                let vote_count = store.get_votes(&trip.id, poll_type).await?.len();
                (Some(poll), vote_count)
            }
            None => (None, 0),
        };

        Ok(Self {
            trip,
            members,
            sender,
            message,
            poll,
            suggestion_count,
            availability_count,
            vote_count,
        })
    }

    /// Aggregate view handed to the classifier
    pub fn stage_context(&self) -> StageContext {
        StageContext {
            stage: self.trip.stage,
            member_count: self.members.len(),
            suggestion_count: self.suggestion_count,
            availability_count: self.availability_count,
            vote_count: self.vote_count,
            poll_options: self
                .poll
                .as_ref()
                .map(|p| p.options.iter().map(|o| o.key.clone()).collect())
                .unwrap_or_default(),
        }
    }
}

/// Rebuild the open poll's options from current records.
///
/// Destination options are the distinct suggested names in first-mention
/// order; date options come straight from the overlap resolver. Both carry
/// stable keys that ballots reference.
pub async fn build_poll_context(
    store: &dyn Store,
    trip: &Trip,
    poll_type: PollType,
    member_count: usize,
) -> Result<PollContext, StoreError> {
    let options = match poll_type {
        PollType::Destination => {
            let suggestions = store.get_destination_suggestions(&trip.id).await?;
            let mut seen = Vec::new();
            for suggestion in &suggestions {
                for destination in &suggestion.destinations {
                    if !seen.iter().any(|s: &String| s.eq_ignore_ascii_case(destination)) {
                        seen.push(destination.clone());
                    }
                }
            }
            seen.into_iter()
                .map(|name| PollOption {
                    key: name.clone(),
                    display: name,
                })
                .collect()
        }
        PollType::Dates => {
            let availabilities = store.get_date_availability(&trip.id).await?;
            resolve_date_overlap(&availabilities)
                .into_iter()
                .map(|option| PollOption {
                    key: option.key(),
                    display: option.display,
                })
                .collect()
        }
    };

    Ok(PollContext::new(poll_type, options, member_count))
}
