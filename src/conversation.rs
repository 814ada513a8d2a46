//! Conversation state store
//!
//! Holds the ordered messages of one conversation and, per assistant message,
//! the tool calls made while producing it. The runtime is the only writer;
//! the UI sees immutable [`Transcript`] snapshots.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    User,
    Assistant,
}

/// A chat message as displayed
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub id: String,
    pub role: Role,
    /// Display text; for assistant messages this lags the received text
    pub content: String,
    pub created_at: DateTime<Utc>,
    pub streaming: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolStatus {
    Pending,
    Completed,
    Error,
}

/// A tool invocation made by the agent
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolCall {
    pub id: String,
    pub name: String,
    /// JSON-encoded, passed through untouched
    pub arguments: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output: Option<String>,
    pub status: ToolStatus,
}

impl ToolCall {
    pub fn pending(id: impl Into<String>, name: impl Into<String>, arguments: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            arguments: arguments.into(),
            output: None,
            status: ToolStatus::Pending,
        }
    }
}

/// Per-message view handed to the rendering layer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageView {
    #[serde(flatten)]
    pub message: Message,
    pub tool_calls: Vec<ToolCall>,
    pub pending_tools: usize,
}

/// Snapshot of the whole conversation
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Transcript {
    pub messages: Vec<MessageView>,
    /// A turn is in flight
    pub streaming: bool,
    /// User-visible error from the last turn
    pub error: Option<String>,
}

impl Transcript {
    pub fn last_assistant(&self) -> Option<&MessageView> {
        self.messages
            .iter()
            .rev()
            .find(|m| m.message.role == Role::Assistant)
    }
}

#[derive(Debug, Default)]
pub struct Conversation {
    messages: Vec<Message>,
    tool_calls: HashMap<String, Vec<ToolCall>>,
    pending_tools: HashMap<String, usize>,
    error: Option<String>,
}

impl Conversation {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn message(&self, id: &str) -> Option<&Message> {
        self.messages.iter().find(|m| m.id == id)
    }

    fn message_mut(&mut self, id: &str) -> Option<&mut Message> {
        self.messages.iter_mut().find(|m| m.id == id)
    }

    pub fn push_user(&mut self, id: impl Into<String>, text: impl Into<String>) {
        self.messages.push(Message {
            id: id.into(),
            role: Role::User,
            content: text.into(),
            created_at: Utc::now(),
            streaming: false,
        });
    }

    /// Add an empty streaming assistant message with a fresh tool ledger
    pub fn push_assistant(&mut self, id: impl Into<String>) {
        let id = id.into();
        self.tool_calls.insert(id.clone(), Vec::new());
        self.pending_tools.insert(id.clone(), 0);
        self.messages.push(Message {
            id,
            role: Role::Assistant,
            content: String::new(),
            created_at: Utc::now(),
            streaming: true,
        });
    }

    /// Replace the displayed content of an assistant message.
    ///
    /// The reveal only ever grows: a shorter value is ignored.
    pub fn set_displayed(&mut self, id: &str, content: &str) {
        let Some(message) = self.message_mut(id) else {
            tracing::debug!(message_id = %id, "Display update for unknown message");
            return;
        };
        if message.role != Role::Assistant {
            tracing::warn!(message_id = %id, "Refusing to rewrite a user message");
            return;
        }
        if content.len() < message.content.len() {
            tracing::warn!(
                message_id = %id,
                shown = message.content.len(),
                requested = content.len(),
                "Ignoring display regression"
            );
            return;
        }
        debug_assert!(content.starts_with(message.content.as_str()));
        message.content.clear();
        message.content.push_str(content);
    }

    pub fn finish_message(&mut self, id: &str) {
        if let Some(message) = self.message_mut(id) {
            message.streaming = false;
        }
    }

    pub fn tool_calls(&self, message_id: &str) -> &[ToolCall] {
        self.tool_calls.get(message_id).map_or(&[], Vec::as_slice)
    }

    pub fn record_tool_call(&mut self, message_id: &str, call: ToolCall) {
        self.tool_calls
            .entry(message_id.to_string())
            .or_default()
            .push(call);
    }

    /// Attach an output to the matching pending call.
    ///
    /// Returns false when no call with that id exists; a call that already
    /// completed is left untouched.
    pub fn complete_tool_call(&mut self, message_id: &str, call_id: &str, output: String) -> bool {
        let Some(call) = self
            .tool_calls
            .get_mut(message_id)
            .and_then(|calls| calls.iter_mut().find(|c| c.id == call_id))
        else {
            return false;
        };
        if call.status == ToolStatus::Pending {
            call.output = Some(output);
            call.status = ToolStatus::Completed;
        }
        true
    }

    pub fn pending_tools(&self, message_id: &str) -> usize {
        self.pending_tools.get(message_id).copied().unwrap_or(0)
    }

    pub fn set_pending_tools(&mut self, message_id: &str, count: usize) {
        self.pending_tools.insert(message_id.to_string(), count);
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn set_error(&mut self, message: impl Into<String>) {
        self.error = Some(message.into());
    }

    pub fn clear_error(&mut self) {
        self.error = None;
    }

    pub fn transcript(&self, streaming: bool) -> Transcript {
        Transcript {
            messages: self
                .messages
                .iter()
                .map(|m| MessageView {
                    message: m.clone(),
                    tool_calls: self.tool_calls(&m.id).to_vec(),
                    pending_tools: self.pending_tools(&m.id),
                })
                .collect(),
            streaming,
            error: self.error.clone(),
        }
    }
}
