//! Pure state transition function
//!
//! Given the same state and event this always yields the same result; all
//! I/O, timers and conversation mutation happen when the runtime executes
//! the returned effects.

use super::{Effect, Event, TurnOutcome, TurnState};
use crate::agent::{AgentEvent, EventKind, EventObject};
use crate::conversation::ToolCall;
use thiserror::Error;

/// Result of a state transition
#[derive(Debug)]
pub struct TransitionResult {
    pub new_state: TurnState,
    pub effects: Vec<Effect>,
}

impl TransitionResult {
    pub fn new(state: TurnState) -> Self {
        Self {
            new_state: state,
            effects: vec![],
        }
    }

    pub fn with_effect(mut self, effect: Effect) -> Self {
        self.effects.push(effect);
        self
    }

    pub fn with_effects(mut self, effects: impl IntoIterator<Item = Effect>) -> Self {
        self.effects.extend(effects);
        self
    }
}

/// Errors that can occur during transition
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TransitionError {
    #[error("A turn is already in flight")]
    TurnInFlight,
    #[error("Message is empty")]
    EmptyMessage,
}

pub fn transition(state: &TurnState, event: Event) -> Result<TransitionResult, TransitionError> {
    match (state, event) {
        // ============================================================
        // User input
        // ============================================================
        (
            TurnState::Idle,
            Event::UserTurn {
                text,
                user_message_id,
                assistant_message_id,
            },
        ) => {
            let text = text.trim().to_string();
            if text.is_empty() {
                return Err(TransitionError::EmptyMessage);
            }
            Ok(TransitionResult::new(TurnState::Accumulating {
                message_id: assistant_message_id.clone(),
                pending_tools: 0,
            })
            .with_effect(Effect::AddUserMessage {
                id: user_message_id,
                text: text.clone(),
            })
            .with_effect(Effect::AddAssistantMessage {
                id: assistant_message_id,
            })
            .with_effect(Effect::OpenStream { text }))
        }

        (_, Event::UserTurn { .. }) => Err(TransitionError::TurnInFlight),

        // Cancel with nothing in flight is a no-op
        (TurnState::Idle, Event::UserCancel) => Ok(TransitionResult::new(TurnState::Idle)),

        (_, Event::UserCancel) => Ok(TransitionResult::new(TurnState::Idle)
            .with_effect(Effect::AbortStream)
            .with_effect(Effect::finish(TurnOutcome::Cancelled))),

        // ============================================================
        // Stream events
        // ============================================================

        // Leftovers from a turn that already ended
        (
            TurnState::Idle,
            Event::Agent(_)
            | Event::StreamClosed
            | Event::TransportFailed { .. }
            | Event::RevealDrained,
        ) => Ok(TransitionResult::new(TurnState::Idle)),

        // The answer is complete and fully shown; stop listening
        (TurnState::Completed { .. }, Event::RevealDrained) => {
            Ok(TransitionResult::new(TurnState::Idle)
                .with_effect(Effect::AbortStream)
                .with_effect(Effect::finish(TurnOutcome::Completed)))
        }

        (state, Event::RevealDrained) => Ok(TransitionResult::new(state.clone())),

        // A connection lost after the terminal event costs nothing
        (state, Event::TransportFailed { .. }) if state.response_completed() => Ok(
            TransitionResult::new(TurnState::Idle).with_effect(Effect::finish(TurnOutcome::Completed)),
        ),

        (_, Event::TransportFailed { error }) => Ok(TransitionResult::new(TurnState::Idle)
            .with_effect(Effect::finish(TurnOutcome::failed(error.message)))),

        (state, Event::StreamClosed) => {
            let outcome = if state.response_completed() {
                TurnOutcome::Completed
            } else {
                TurnOutcome::failed("Connection closed before the response completed")
            };
            Ok(TransitionResult::new(TurnState::Idle).with_effect(Effect::finish(outcome)))
        }

        (state, Event::Agent(event)) => Ok(apply_agent_event(state, &event)),
    }
}

/// Apply one decoded record to an active turn
fn apply_agent_event(state: &TurnState, event: &AgentEvent) -> TransitionResult {
    let Some(message_id) = state.message_id() else {
        return TransitionResult::new(state.clone());
    };
    let mut effects = Vec::new();

    if let Some(message) = event.has_error().then(|| event.error_message()).flatten() {
        if event.object == EventObject::Response && event.is_completed() {
            return TransitionResult::new(TurnState::Idle)
                .with_effect(Effect::AbortStream)
                .with_effect(Effect::finish(TurnOutcome::failed(message)));
        }
        effects.push(Effect::StreamWarning { message });
    }

    let completed = state.response_completed();
    let pending = state.pending_tools();

    let new_state = match (event.object, event.kind) {
        (EventObject::Message, Some(EventKind::PluginCall)) => match event.tool_invocation() {
            Some(invocation) => {
                effects.push(Effect::RecordToolCall {
                    call: ToolCall::pending(
                        invocation.call_id,
                        invocation.name,
                        invocation.arguments,
                    ),
                });
                // A call after completion reopens the wait
                TurnState::active(message_id, completed, pending + 1)
            }
            None => state.clone(),
        },

        (EventObject::Message, Some(EventKind::PluginCallOutput)) => match event.tool_output() {
            Some(output) => {
                effects.push(Effect::CompleteToolCall {
                    call_id: output.call_id,
                    output: output.output,
                });
                let remaining = pending.saturating_sub(1);
                if completed && remaining == 0 {
                    // The last outstanding tool released the gate
                    effects.push(if pending > 0 {
                        Effect::FlushReveal
                    } else {
                        Effect::EnsureReveal
                    });
                }
                TurnState::active(message_id, completed, remaining)
            }
            None => state.clone(),
        },

        (EventObject::Content, _) => {
            if let Some(text) = event.text_delta() {
                effects.push(Effect::AppendText {
                    text: text.to_string(),
                });
                effects.push(Effect::EnsureReveal);
            }
            state.clone()
        }

        (EventObject::Response, _) if event.is_completed() => {
            if pending == 0 {
                effects.push(Effect::EnsureReveal);
            }
            TurnState::active(message_id, true, pending)
        }

        _ => state.clone(),
    };

    TransitionResult::new(new_state).with_effects(effects)
}
