//! Pure stage-transition decisions
//!
//! `StageTable::evaluate` sees a trip plus externally gathered counts and
//! returns at most one transition. No I/O here: the engine supplies fresh
//! counts and applies the decision atomically with any effect.

use chrono::{DateTime, Duration, Utc};
use tracing::debug;

use crate::config::StageConfig;
use crate::consensus::{DateOption, VoteCount, is_tie, majority_threshold};
use crate::domain::{DateWindow, Stage, Trip};

/// Fresh aggregate counts for one trip, gathered just before evaluation
#[derive(Debug, Clone, Default)]
pub struct StageCounts {
    pub member_count: usize,
    pub suggestion_count: usize,
    pub availability_count: usize,
    /// Ballots in the currently open poll, if any
    pub vote_count: usize,
    pub flight_count: usize,
    /// Tally of the currently open poll, sorted descending
    pub vote_results: Vec<VoteCount>,
    /// Resolver output over current availabilities
    pub date_options: Vec<DateOption>,
}

/// A write applied atomically with the stage change
#[derive(Debug, Clone, PartialEq)]
pub enum TransitionEffect {
    SetDestination(String),
    LockDates(DateWindow),
}

/// One decided transition
#[derive(Debug, Clone, PartialEq)]
pub struct TransitionDecision {
    pub from: Stage,
    pub to: Stage,
    pub reason: String,
    pub effect: Option<TransitionEffect>,
}

impl TransitionDecision {
    fn new(from: Stage, to: Stage, reason: impl Into<String>) -> Self {
        Self {
            from,
            to,
            reason: reason.into(),
            effect: None,
        }
    }

    fn with_effect(mut self, effect: TransitionEffect) -> Self {
        self.effect = Some(effect);
        self
    }
}

/// Which planning topic a branch decision advances
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Topic {
    Destination,
    Dates,
}

/// The transition rules, parameterized by configured thresholds
pub struct StageTable {
    config: StageConfig,
}

impl StageTable {
    pub fn new(config: StageConfig) -> Self {
        Self { config }
    }

    /// Decide the next transition for a trip, if any.
    ///
    /// Terminal stages (including unrecognized ones) never transition.
    pub fn evaluate(&self, trip: &Trip, counts: &StageCounts, now: DateTime<Utc>) -> Option<TransitionDecision> {
        debug!(trip_id = %trip.id, stage = %trip.stage, "evaluate: called");
        match trip.stage {
            Stage::Gathering => self.evaluate_gathering(trip, counts),
            Stage::Planning => self.evaluate_planning(trip, counts, now),
            Stage::VotingDestination | Stage::VotingDates => self.evaluate_voting(trip, counts, now),
            Stage::DatesSet => {
                // Pass-through stage: the locked window has been announced,
                // planning resumes for whatever is still unresolved.
                Some(TransitionDecision::new(
                    Stage::DatesSet,
                    Stage::Planning,
                    "dates locked, planning resumes",
                ))
            }
            Stage::TrackingFlights => {
                if counts.member_count > 0 && counts.flight_count >= counts.member_count {
                    Some(TransitionDecision::new(
                        Stage::TrackingFlights,
                        Stage::Confirmed,
                        "all members have flights",
                    ))
                } else {
                    None
                }
            }
            Stage::Confirmed | Stage::Completed | Stage::Abandoned | Stage::Unknown => None,
        }
    }

    fn evaluate_gathering(&self, trip: &Trip, counts: &StageCounts) -> Option<TransitionDecision> {
        if counts.member_count >= self.config.min_members {
            Some(TransitionDecision::new(
                trip.stage,
                Stage::Planning,
                format!("member threshold reached ({})", counts.member_count),
            ))
        } else {
            None
        }
    }

    /// Planning branches on which topic (destination, dates) is ready to
    /// advance. A topic qualifies with full coverage (a submission from
    /// every member) or by timeout with at least one submission. When both
    /// qualify, dates go first unless only a double timeout applies, in
    /// which case the topic with more submissions wins (dates on equal).
    fn evaluate_planning(&self, trip: &Trip, counts: &StageCounts, now: DateTime<Utc>) -> Option<TransitionDecision> {
        let destination_resolved = trip.destination.is_some();
        let dates_resolved = trip.date_window.is_some();

        if destination_resolved && dates_resolved {
            return Some(TransitionDecision::new(
                trip.stage,
                Stage::TrackingFlights,
                "destination and dates both resolved",
            ));
        }

        let timed_out = trip.stage_elapsed(now) >= Duration::hours(self.config.planning_timeout_hours);
        let members = counts.member_count;

        let full_destination = !destination_resolved && members > 0 && counts.suggestion_count >= members;
        let full_dates = !dates_resolved && members > 0 && counts.availability_count >= members;
        let destination_qualifies =
            full_destination || (!destination_resolved && timed_out && counts.suggestion_count >= 1);
        let dates_qualifies = full_dates || (!dates_resolved && timed_out && counts.availability_count >= 1);

        let topic = match (destination_qualifies, dates_qualifies) {
            (false, false) => return None,
            (true, false) => Topic::Destination,
            (false, true) => Topic::Dates,
            (true, true) => {
                if !full_destination && !full_dates {
                    // Double timeout: advance whichever has more input.
                    if counts.suggestion_count > counts.availability_count {
                        Topic::Destination
                    } else {
                        Topic::Dates
                    }
                } else {
                    Topic::Dates
                }
            }
        };

        let destination_decision = || {
            TransitionDecision::new(
                trip.stage,
                Stage::VotingDestination,
                if full_destination {
                    "destination suggestions complete".to_string()
                } else {
                    "planning timeout, opening destination poll".to_string()
                },
            )
        };

        match topic {
            Topic::Destination => Some(destination_decision()),
            Topic::Dates => match self.advance_dates(trip, counts, full_dates) {
                Some(decision) => Some(decision),
                // Availability conflict: the dates branch cannot move, but
                // a qualified destination topic still can.
                None if destination_qualifies => Some(destination_decision()),
                None => None,
            },
        }
    }

    fn advance_dates(&self, trip: &Trip, counts: &StageCounts, full: bool) -> Option<TransitionDecision> {
        match counts.date_options.len() {
            0 => {
                // Availability conflict: the handler surfaces it; the trip
                // stays in planning until someone widens their dates.
                debug!(trip_id = %trip.id, "advance_dates: no overlap, staying in planning");
                None
            }
            1 => {
                let window = counts.date_options[0].window;
                Some(
                    TransitionDecision::new(trip.stage, Stage::DatesSet, "single overlap window, locking dates")
                        .with_effect(TransitionEffect::LockDates(window)),
                )
            }
            _ => Some(TransitionDecision::new(
                trip.stage,
                Stage::VotingDates,
                if full {
                    "availability complete, opening date poll".to_string()
                } else {
                    "planning timeout, opening date poll".to_string()
                },
            )),
        }
    }

    /// A poll closes at the majority threshold, or on timeout with at least
    /// one ballot. A tie for the lead suppresses closure either way.
    fn evaluate_voting(&self, trip: &Trip, counts: &StageCounts, now: DateTime<Utc>) -> Option<TransitionDecision> {
        let threshold = majority_threshold(counts.member_count);
        let timed_out = trip.stage_elapsed(now) >= Duration::hours(self.config.vote_timeout_hours);

        let threshold_met = threshold > 0 && counts.vote_count >= threshold;
        let timeout_close = timed_out && counts.vote_count >= 1;
        if !threshold_met && !timeout_close {
            return None;
        }

        if is_tie(&counts.vote_results) {
            debug!(trip_id = %trip.id, "evaluate_voting: tie at the top, poll stays open");
            return None;
        }

        let winner = counts.vote_results.first()?;
        let reason = if threshold_met {
            format!("poll closed at {}/{} votes", counts.vote_count, counts.member_count)
        } else {
            format!("poll timed out with {} votes", counts.vote_count)
        };

        match trip.stage {
            Stage::VotingDestination => Some(
                TransitionDecision::new(trip.stage, Stage::Planning, reason)
                    .with_effect(TransitionEffect::SetDestination(winner.choice.clone())),
            ),
            Stage::VotingDates => {
                // Ballots carry the window key; a choice that does not
                // parse is a stored-data defect, not a reason to panic.
                let Some(window) = DateWindow::from_key(&winner.choice) else {
                    debug!(trip_id = %trip.id, choice = %winner.choice, "evaluate_voting: unparseable date choice");
                    return None;
                };
                Some(
                    TransitionDecision::new(trip.stage, Stage::Planning, reason)
                        .with_effect(TransitionEffect::LockDates(window)),
                )
            }
            _ => None,
        }
    }
}
