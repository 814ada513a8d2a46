//! Effects produced by state transitions

use crate::conversation::ToolCall;

/// How a turn ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TurnOutcome {
    Completed,
    /// Fatal for the turn; the message is shown to the user
    Failed { message: String },
    /// User abort, never reported as an error
    Cancelled,
}

impl TurnOutcome {
    pub fn failed(message: impl Into<String>) -> Self {
        TurnOutcome::Failed {
            message: message.into(),
        }
    }
}

/// Effects to be executed after a state transition
#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    /// Append the user's message to the conversation
    AddUserMessage { id: String, text: String },

    /// Append an empty streaming assistant message and reset its buffers
    AddAssistantMessage { id: String },

    /// Issue the request and start reading its stream (background task)
    OpenStream { text: String },

    /// Abort the in-flight request
    AbortStream,

    /// Add a pending tool call to the active message's ledger
    RecordToolCall { call: ToolCall },

    /// Attach an output to a tool call, matched by id
    CompleteToolCall { call_id: String, output: String },

    /// Append to the active message's text buffer
    AppendText { text: String },

    /// Start the reveal timer unless one is already running
    EnsureReveal,

    /// Reveal everything buffered immediately
    FlushReveal,

    /// Recoverable in-stream error
    StreamWarning { message: String },

    /// Tear the turn down: stop the reveal, freeze the message, release the request
    FinishTurn { outcome: TurnOutcome },
}

impl Effect {
    pub fn finish(outcome: TurnOutcome) -> Self {
        Effect::FinishTurn { outcome }
    }
}
