//! Agent transport error types

use thiserror::Error;

/// Agent error with classification
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct AgentError {
    pub kind: AgentErrorKind,
    pub message: String,
}

impl AgentError {
    pub fn new(kind: AgentErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn network(message: impl Into<String>) -> Self {
        Self::new(AgentErrorKind::Network, message)
    }

    pub fn http_status(status: u16, body: &str) -> Self {
        let body = body.trim();
        let message = if body.is_empty() {
            format!("HTTP error! status: {status}")
        } else {
            format!("HTTP error! status: {status}: {}", truncate_chars(body, 200))
        };
        Self::new(AgentErrorKind::HttpStatus { status }, message)
    }

    pub fn decode(message: impl Into<String>) -> Self {
        Self::new(AgentErrorKind::Decode, message)
    }

    pub fn unknown(message: impl Into<String>) -> Self {
        Self::new(AgentErrorKind::Unknown, message)
    }

    /// Map a reqwest failure onto our classification
    pub fn from_reqwest(e: &reqwest::Error) -> Self {
        if e.is_timeout() {
            Self::network(format!("Request timeout: {e}"))
        } else if e.is_connect() {
            Self::network(format!("Connection failed: {e}"))
        } else if e.is_body() || e.is_decode() {
            Self::network(format!("Connection dropped: {e}"))
        } else {
            Self::unknown(format!("Request failed: {e}"))
        }
    }
}

/// Error classification
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AgentErrorKind {
    /// Connect failure, timeout, or the body stream broke mid-flight
    Network,
    /// Backend answered with a non-success status
    HttpStatus { status: u16 },
    /// Response could not be interpreted at all
    Decode,
    Unknown,
}

fn truncate_chars(s: &str, max: usize) -> String {
    match s.char_indices().nth(max) {
        Some((end, _)) => format!("{}...", s.get(..end).unwrap_or(s)),
        None => s.to_string(),
    }
}
