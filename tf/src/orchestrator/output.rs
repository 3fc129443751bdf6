//! Handler outputs and their channel rendering
//!
//! Handlers return structured outputs; rendering to reply text happens in
//! one place so tests can assert on structure instead of prose.

use serde::Serialize;

use crate::consensus::VoteCount;
use crate::domain::Stage;

/// Structured result of a successfully handled message
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Output {
    /// A new member joined the trip
    Welcome { label: String, member_count: usize },

    /// A member's display name was recorded
    NameRecorded { name: String },

    /// Destination preferences were recorded
    SuggestionRecorded { label: String, destinations: Vec<String> },

    /// A date availability was recorded
    AvailabilityRecorded { label: String, display: String },

    /// Availabilities no longer overlap; list them for manual resolution
    AvailabilityConflict { per_member: Vec<String> },

    /// A ballot was recorded (or changed)
    VoteRecorded {
        label: String,
        choice: String,
        tally: Vec<VoteCount>,
        votes_cast: usize,
        threshold: usize,
        tie: bool,
    },

    /// Flight details were recorded
    FlightRecorded { label: String, flight_number: String },

    /// The sender's phone already belongs to another active trip
    OtherTripConflict,

    /// Small talk or anything no handler claimed
    Conversational { stage: Stage },

    /// Something went wrong; generic recovery reply
    Fallback,
}

impl Output {
    /// Render the reply text sent back to the channel
    pub fn render(&self) -> String {
        match self {
            Output::Welcome { label, member_count } => {
                format!("Welcome, {}! That makes {} of you planning this trip.", label, member_count)
            }
            Output::NameRecorded { name } => format!("Got it, {}!", name),
            Output::SuggestionRecorded { label, destinations } => {
                format!("Noted {}'s picks: {}.", label, destinations.join(", "))
            }
            Output::AvailabilityRecorded { label, display } => {
                format!("{} can travel {}.", label, display)
            }
            Output::AvailabilityConflict { per_member } => format!(
                "Those dates don't overlap with the group anymore. Current availability:\n{}\nCan anyone stretch theirs?",
                per_member.join("\n")
            ),
            Output::VoteRecorded {
                label,
                choice,
                tally,
                votes_cast,
                threshold,
                tie,
            } => {
                let standings = tally
                    .iter()
                    .map(|c| format!("{}: {}", c.choice, c.count))
                    .collect::<Vec<_>>()
                    .join(", ");
                let mut text = format!(
                    "{} voted for {}. Standings: {} ({}/{} needed).",
                    label, choice, standings, votes_cast, threshold
                );
                if *tie {
                    text.push_str(" It's currently tied, so the poll stays open.");
                }
                text
            }
            Output::FlightRecorded { label, flight_number } => {
                format!("Flight {} recorded for {}.", flight_number, label)
            }
            Output::OtherTripConflict => {
                "Looks like you're already planning another trip with me. One trip at a time for now!".to_string()
            }
            Output::Conversational { stage } => match stage {
                Stage::Gathering => {
                    "Hi! I'm coordinating this trip. Anyone who's in, just say \"join\".".to_string()
                }
                Stage::Planning => {
                    "Still planning! Send destination ideas or the dates you're free (e.g. 2025-03-15 to 2025-03-22)."
                        .to_string()
                }
                Stage::VotingDestination | Stage::VotingDates => {
                    "There's a poll open! Reply with the number of your pick.".to_string()
                }
                Stage::TrackingFlights => {
                    "Waiting on flight details. Send your flight number when you've booked.".to_string()
                }
                _ => "This trip is all set. Safe travels!".to_string(),
            },
            Output::Fallback => "Sorry, I couldn't process that one. Mind rephrasing?".to_string(),
        }
    }
}
