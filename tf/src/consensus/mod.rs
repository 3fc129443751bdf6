//! Consensus calculators
//!
//! Pure functions only, no I/O. The orchestrator and state machine feed
//! these fresh records and act on the results.

pub mod dates;
pub mod tally;

pub use dates::{DateOption, resolve as resolve_date_overlap};
pub use tally::{VoteCount, is_tie, majority_threshold, pending_voters, results as tally_results};
