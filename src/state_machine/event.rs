//! Events that drive turn state transitions

use crate::agent::{AgentError, AgentEvent};

#[derive(Debug, Clone)]
pub enum Event {
    // User events
    UserTurn {
        text: String,
        user_message_id: String,
        assistant_message_id: String,
    },
    UserCancel,

    // Stream events
    /// A decoded record from the response body
    Agent(AgentEvent),
    /// The response body ended cleanly
    StreamClosed,
    /// The request failed or the connection broke
    TransportFailed { error: AgentError },

    // Runtime events
    /// Everything received so far is on screen
    RevealDrained,
}
