//! Wire types for the agent API

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

/// Treat an explicit `null` like a missing field
fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

// ============================================================================
// Outbound request
// ============================================================================

/// Body of one turn request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentRequest {
    pub input: Vec<InputMessage>,
}

impl AgentRequest {
    /// A request carrying a single user text turn
    pub fn user_text(text: impl Into<String>) -> Self {
        Self {
            input: vec![InputMessage {
                role: "user".to_string(),
                content: vec![InputContent::Text { text: text.into() }],
            }],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InputMessage {
    pub role: String,
    pub content: Vec<InputContent>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum InputContent {
    Text { text: String },
}

// ============================================================================
// Inbound event records
// ============================================================================

/// Which layer of the response an event describes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventObject {
    Response,
    Message,
    Content,
    #[default]
    #[serde(other)]
    Other,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventStatus {
    Created,
    InProgress,
    Completed,
    #[serde(other)]
    Other,
}

/// Discriminates message-level events
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    PluginCall,
    PluginCallOutput,
    Message,
    #[serde(other)]
    Other,
}

/// One decoded `data:` frame
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentEvent {
    #[serde(deserialize_with = "null_as_default")]
    pub sequence_number: i64,
    #[serde(deserialize_with = "null_as_default")]
    pub object: EventObject,
    pub status: Option<EventStatus>,
    pub error: Option<Value>,
    #[serde(deserialize_with = "null_as_default")]
    pub id: String,
    #[serde(rename = "type")]
    pub kind: Option<EventKind>,
    pub role: Option<String>,
    pub content: Option<Vec<ContentItem>>,
    pub text: Option<String>,
    pub delta: Option<bool>,
    pub msg_id: Option<String>,
}

/// Nested payload item of a message event
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ContentItem {
    #[serde(rename = "type")]
    pub kind: Option<String>,
    pub data: Option<Value>,
    pub text: Option<String>,
}

/// A tool invocation announced by a `plugin_call` event
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolInvocation {
    pub call_id: String,
    pub name: String,
    pub arguments: String,
}

/// The result carried by a `plugin_call_output` event
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolOutput {
    pub call_id: String,
    pub output: String,
}

impl AgentEvent {
    /// `data` of the first nested payload item, where tool descriptors live
    fn first_data(&self) -> Option<&Value> {
        self.content.as_ref()?.first()?.data.as_ref()
    }

    pub fn has_error(&self) -> bool {
        self.error.as_ref().is_some_and(|e| !e.is_null())
    }

    /// Human-readable rendering of the error field
    pub fn error_message(&self) -> Option<String> {
        match self.error.as_ref()? {
            Value::Null => None,
            Value::String(s) => Some(s.clone()),
            Value::Object(map) => Some(
                map.get("message")
                    .and_then(Value::as_str)
                    .map_or_else(|| Value::Object(map.clone()).to_string(), str::to_string),
            ),
            other => Some(other.to_string()),
        }
    }

    pub fn is_completed(&self) -> bool {
        self.status == Some(EventStatus::Completed)
    }

    /// Text of a content delta, if this event carries a non-empty one
    pub fn text_delta(&self) -> Option<&str> {
        if self.object != EventObject::Content || self.delta != Some(true) {
            return None;
        }
        self.text.as_deref().filter(|t| !t.is_empty())
    }

    pub fn tool_invocation(&self) -> Option<ToolInvocation> {
        let data = self.first_data()?;
        Some(ToolInvocation {
            call_id: string_field(data, "call_id")?,
            name: string_field(data, "name").unwrap_or_default(),
            arguments: raw_field(data, "arguments").unwrap_or_default(),
        })
    }

    pub fn tool_output(&self) -> Option<ToolOutput> {
        let data = self.first_data()?;
        Some(ToolOutput {
            call_id: string_field(data, "call_id")?,
            output: raw_field(data, "output").unwrap_or_default(),
        })
    }
}

fn string_field(data: &Value, key: &str) -> Option<String> {
    data.get(key)?.as_str().map(str::to_string)
}

/// Opaque field: strings pass through, anything else keeps its JSON text
fn raw_field(data: &Value, key: &str) -> Option<String> {
    match data.get(key)? {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}
