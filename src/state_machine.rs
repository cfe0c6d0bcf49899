//! Turn orchestrator state machine
//!
//! Implements the Elm Architecture pattern with pure state transitions.

pub mod effect;
pub mod event;
pub mod state;
pub(crate) mod transition;

#[cfg(test)]
mod proptests;

pub use effect::{Effect, Notice};
pub use event::Event;
pub use state::{SessionContext, SessionState, SessionStatus, Topic};
pub use transition::transition;
