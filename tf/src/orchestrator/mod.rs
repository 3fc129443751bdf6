//! Message orchestration
//!
//! Everything between a dequeued message and its reply: context building,
//! intent resolution, handlers, stage entry announcements, and the
//! outbound seams.

mod actions;
mod context;
mod core;
mod handlers;
mod outbound;
mod output;

pub use actions::EntryActions;
pub use context::{HandlerContext, build_poll_context};
pub use core::{Orchestrator, resolve_trip};
pub use handlers::{HandlerResult, Handlers};
pub use outbound::{LogOutbound, Notifier, Responder};
pub use output::Output;
