//! Domain types for Tripflow
//!
//! Core records: Trip, Member, and the per-member submission rows
//! (suggestions, availabilities, votes, flights). All serde-serializable
//! for the store boundary.

mod id;
mod member;
mod poll;
mod records;
mod trip;

pub use id::generate_id;
pub use member::Member;
pub use poll::{PollContext, PollOption};
pub use records::{DateAvailability, DestinationSuggestion, Flight, InboundMessage, StoredMessage, Vote};
pub use trip::{DateWindow, PollType, Stage, Trip};
