//! Agent backend abstraction
//!
//! The transport seam between the session runtime and the agent API: one
//! request per user turn, answered by an incrementally delivered byte stream.

mod decoder;
mod error;
mod http;
mod types;

pub use decoder::{EventDecoder, LineBuffer};
pub use error::{AgentError, AgentErrorKind};
pub use http::HttpAgentClient;
pub use types::*;

use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::Stream;
use std::pin::Pin;
use std::sync::Arc;

/// Raw response body, chunked however the transport delivers it
pub type ByteStream = Pin<Box<dyn Stream<Item = Result<Bytes, AgentError>> + Send>>;

/// Common interface for agent backends
#[async_trait]
pub trait AgentClient: Send + Sync {
    /// Submit one user turn and return the response body as a byte stream
    async fn open_stream(&self, request: &AgentRequest) -> Result<ByteStream, AgentError>;

    /// Where requests go, for logging
    fn endpoint(&self) -> &str;
}

#[async_trait]
impl<T: AgentClient + ?Sized> AgentClient for Arc<T> {
    async fn open_stream(&self, request: &AgentRequest) -> Result<ByteStream, AgentError> {
        (**self).open_stream(request).await
    }

    fn endpoint(&self) -> &str {
        (**self).endpoint()
    }
}

/// Logging wrapper for agent clients
pub struct LoggingClient<C> {
    inner: C,
}

impl<C: AgentClient> LoggingClient<C> {
    pub fn new(inner: C) -> Self {
        Self { inner }
    }
}

#[async_trait]
impl<C: AgentClient> AgentClient for LoggingClient<C> {
    async fn open_stream(&self, request: &AgentRequest) -> Result<ByteStream, AgentError> {
        let start = std::time::Instant::now();
        let result = self.inner.open_stream(request).await;
        let duration = start.elapsed();

        match &result {
            Ok(_) => {
                tracing::info!(
                    endpoint = %self.inner.endpoint(),
                    duration_ms = %duration.as_millis(),
                    "Agent stream opened"
                );
            }
            Err(e) => {
                tracing::error!(
                    endpoint = %self.inner.endpoint(),
                    duration_ms = %duration.as_millis(),
                    error = %e.message,
                    kind = ?e.kind,
                    "Agent request failed"
                );
            }
        }

        result
    }

    fn endpoint(&self) -> &str {
        self.inner.endpoint()
    }
}
