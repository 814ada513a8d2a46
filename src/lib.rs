//! Travel Chat - streaming client for a travel-planning agent
//!
//! Sends each user turn to an agent endpoint, interprets the streamed event
//! records and paces the assistant's answer onto the screen, tracking the
//! tool calls the agent makes along the way.

pub mod agent;
pub mod config;
pub mod conversation;
pub mod render;
pub mod runtime;
pub mod state_machine;
pub mod typewriter;

pub use agent::{AgentClient, AgentError, HttpAgentClient, LoggingClient};
pub use config::ChatConfig;
pub use conversation::{Message, MessageView, Role, ToolCall, ToolStatus, Transcript};
pub use runtime::{ChatSession, SessionError, SessionEvent};
pub use state_machine::TurnOutcome;
pub use typewriter::RevealConfig;
