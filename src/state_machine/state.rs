//! Turn state types

use serde::{Deserialize, Serialize};

/// Progress of the assistant message currently being streamed
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TurnState {
    /// No turn in flight
    #[default]
    Idle,

    /// Request accepted, response still being produced
    Accumulating {
        message_id: String,
        /// Tool calls announced but not yet answered
        pending_tools: usize,
    },

    /// Response reported complete, but tool calls are still outstanding
    AwaitingTools {
        message_id: String,
        pending_tools: usize,
    },

    /// Response complete with nothing outstanding; only the reveal remains
    Completed { message_id: String },
}

impl TurnState {
    pub fn is_active(&self) -> bool {
        !matches!(self, TurnState::Idle)
    }

    pub fn message_id(&self) -> Option<&str> {
        match self {
            TurnState::Idle => None,
            TurnState::Accumulating { message_id, .. }
            | TurnState::AwaitingTools { message_id, .. }
            | TurnState::Completed { message_id } => Some(message_id),
        }
    }

    pub fn pending_tools(&self) -> usize {
        match self {
            TurnState::Accumulating { pending_tools, .. }
            | TurnState::AwaitingTools { pending_tools, .. } => *pending_tools,
            TurnState::Idle | TurnState::Completed { .. } => 0,
        }
    }

    /// The backend has sent its terminal `response` event
    pub fn response_completed(&self) -> bool {
        matches!(
            self,
            TurnState::AwaitingTools { .. } | TurnState::Completed { .. }
        )
    }

    /// Short name for logs
    pub fn name(&self) -> &'static str {
        match self {
            TurnState::Idle => "idle",
            TurnState::Accumulating { .. } => "accumulating",
            TurnState::AwaitingTools { .. } => "awaiting_tools",
            TurnState::Completed { .. } => "completed",
        }
    }

    /// Build the post-event state from the completion flag and pending count
    pub(crate) fn active(message_id: &str, response_completed: bool, pending_tools: usize) -> Self {
        let message_id = message_id.to_string();
        match (response_completed, pending_tools) {
            (false, pending_tools) => TurnState::Accumulating {
                message_id,
                pending_tools,
            },
            (true, 0) => TurnState::Completed { message_id },
            (true, pending_tools) => TurnState::AwaitingTools {
                message_id,
                pending_tools,
            },
        }
    }
}
