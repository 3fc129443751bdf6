//! Trip event bus and transition dedup

mod bus;
mod dedup;
mod types;

pub use bus::{DEFAULT_CHANNEL_CAPACITY, EventBus, create_event_bus};
pub use dedup::TransitionDedup;
pub use types::TripEvent;
