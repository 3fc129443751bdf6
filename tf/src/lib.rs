//! TripFlow - Group Trip Planning Coordinator
//!
//! TripFlow turns a shared message channel into an asynchronous trip-planning
//! session. Members join, suggest destinations, share date availability, vote,
//! and confirm flights; a stage machine decides when the group has said enough
//! to move forward, and a scheduler nudges whoever is holding things up.
//!
//! # Core Concepts
//!
//! - **Per-Trip FIFO**: Messages for one trip are processed strictly in order
//!   by at most one worker; different trips proceed in parallel
//! - **Pure Transition Table**: Stage decisions are pure functions of the
//!   trip's stored records, so every rule is unit-testable
//! - **Rules Before Models**: Cheap pattern rules claim unambiguous messages;
//!   the LLM classifier only sees what the rules decline
//! - **Announce Once**: Stage entry announcements are deduplicated across the
//!   synchronous transition path and the event-bus subscriber
//!
//! # Modules
//!
//! - [`domain`] - Trips, members, stages, and stored records
//! - [`store`] - Persistence trait and in-memory backend
//! - [`classifier`] - Intent rules plus the LLM classifier client
//! - [`consensus`] - Vote tallies and date-overlap resolution
//! - [`fsm`] - Stage table and transition engine
//! - [`sequencer`] - Per-trip FIFO message dispatch
//! - [`orchestrator`] - Handlers, replies, and stage entry actions
//! - [`scheduler`] - Timeout sweeps and escalating nudges
//! - [`config`] - Configuration types and loading
//! - [`cli`] - Command-line interface

pub mod classifier;
pub mod cli;
pub mod config;
pub mod consensus;
pub mod domain;
pub mod events;
pub mod fsm;
pub mod orchestrator;
pub mod scheduler;
pub mod sequencer;
pub mod store;

// Re-export commonly used types
pub use classifier::{Classification, Classifier, ClassifierError, DateRange, Intent, StageContext, create_classifier};
pub use config::{ClassifierConfig, Config, EventsConfig, NudgeConfig, StageConfig};
pub use consensus::{DateOption, VoteCount, majority_threshold, resolve_date_overlap, tally_results};
pub use domain::{
    DateAvailability, DateWindow, DestinationSuggestion, Flight, InboundMessage, Member, PollContext, PollOption,
    PollType, Stage, StoredMessage, Trip, Vote,
};
pub use events::{EventBus, TransitionDedup, TripEvent, create_event_bus};
pub use fsm::{ActionExecutor, StageCounts, StageTable, TransitionDecision, TransitionEngine, TransitionRequester};
pub use orchestrator::{EntryActions, HandlerResult, LogOutbound, Notifier, Orchestrator, Output, Responder, resolve_trip};
pub use scheduler::NudgeScheduler;
pub use sequencer::{MessageProcessor, PerTripSequencer};
pub use store::{MemoryStore, Store, StoreError};
