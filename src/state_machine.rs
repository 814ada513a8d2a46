//! Stream interpreter state machine
//!
//! Implements the Elm Architecture pattern with pure state transitions: the
//! runtime feeds events in, and executes the effects that come back out.

mod effect;
pub mod event;
pub mod state;
pub(crate) mod transition;


pub use effect::{Effect, TurnOutcome};
pub use event::Event;
pub use state::TurnState;
pub use transition::{transition, TransitionError, TransitionResult};
