//! HTTP agent client

use super::{AgentClient, AgentError, AgentRequest, ByteStream};
use async_trait::async_trait;
use futures::StreamExt;
use reqwest::Client;
use std::time::Duration;

/// Agent client talking to the backend over HTTP
pub struct HttpAgentClient {
    client: Client,
    endpoint: String,
}

impl HttpAgentClient {
    pub fn new(endpoint: impl Into<String>, connect_timeout: Duration) -> Result<Self, AgentError> {
        // No overall timeout: a turn streams for as long as the agent keeps working
        let client = Client::builder()
            .connect_timeout(connect_timeout)
            .build()
            .map_err(|e| AgentError::unknown(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self {
            client,
            endpoint: endpoint.into(),
        })
    }
}

#[async_trait]
impl AgentClient for HttpAgentClient {
    async fn open_stream(&self, request: &AgentRequest) -> Result<ByteStream, AgentError> {
        let response = self
            .client
            .post(&self.endpoint)
            .header("Content-Type", "application/json")
            .json(request)
            .send()
            .await
            .map_err(|e| AgentError::from_reqwest(&e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AgentError::http_status(status.as_u16(), &body));
        }

        let stream = response
            .bytes_stream()
            .map(|chunk| chunk.map_err(|e| AgentError::from_reqwest(&e)));
        Ok(Box::pin(stream))
    }

    fn endpoint(&self) -> &str {
        &self.endpoint
    }
}
