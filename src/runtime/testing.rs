//! Mock implementations for testing
//!
//! These mocks enable session tests without real I/O. Streams are scripted
//! step by step so tests can interleave delays under paused time.

use crate::agent::{AgentClient, AgentError, AgentRequest, ByteStream};
use async_trait::async_trait;
use bytes::Bytes;
use serde_json::{json, Value};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

// ============================================================================
// Scripted streams
// ============================================================================

/// One step of a scripted response body
#[derive(Debug, Clone)]
pub enum Step {
    Chunk(Bytes),
    Delay(Duration),
    Fail(AgentError),
    /// Never yields again; only cancellation ends the stream
    Hang,
}

/// Builder for a response body
#[derive(Debug, Clone, Default)]
pub struct Script {
    steps: Vec<Step>,
}

impl Script {
    pub fn new() -> Self {
        Self::default()
    }

    /// Raw bytes, delivered as one chunk
    pub fn raw(mut self, chunk: impl Into<String>) -> Self {
        self.steps.push(Step::Chunk(Bytes::from(chunk.into())));
        self
    }

    /// One complete `data:` line
    pub fn event(self, event: Value) -> Self {
        self.raw(format!("data: {event}\n"))
    }

    pub fn delta(self, text: &str) -> Self {
        self.event(json!({"object": "content", "delta": true, "text": text}))
    }

    pub fn tool_call(self, call_id: &str, name: &str, arguments: &str) -> Self {
        self.event(json!({
            "object": "message",
            "type": "plugin_call",
            "content": [{"type": "data", "data": {
                "call_id": call_id, "name": name, "arguments": arguments
            }}]
        }))
    }

    pub fn tool_output(self, call_id: &str, output: &str) -> Self {
        self.event(json!({
            "object": "message",
            "type": "plugin_call_output",
            "content": [{"type": "data", "data": {"call_id": call_id, "output": output}}]
        }))
    }

    pub fn completed(self) -> Self {
        self.event(json!({"object": "response", "status": "completed"}))
    }

    pub fn delay(mut self, millis: u64) -> Self {
        self.steps.push(Step::Delay(Duration::from_millis(millis)));
        self
    }

    pub fn fail(mut self, error: AgentError) -> Self {
        self.steps.push(Step::Fail(error));
        self
    }

    pub fn hang(mut self) -> Self {
        self.steps.push(Step::Hang);
        self
    }
}

/// Counts bodies that have been handed out and not yet dropped
struct LiveGuard(Arc<AtomicUsize>);

impl LiveGuard {
    fn new(counter: &Arc<AtomicUsize>) -> Self {
        counter.fetch_add(1, Ordering::SeqCst);
        Self(counter.clone())
    }
}

impl Drop for LiveGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

fn script_stream(script: Script, guard: LiveGuard) -> ByteStream {
    let stream = futures::stream::unfold(
        (script.steps.into_iter(), guard),
        |(mut steps, guard)| async move {
            loop {
                let Some(step) = steps.next() else {
                    return None;
                };
                match step {
                    Step::Chunk(bytes) => return Some((Ok(bytes), (steps, guard))),
                    Step::Fail(error) => return Some((Err(error), (steps, guard))),
                    Step::Delay(duration) => tokio::time::sleep(duration).await,
                    Step::Hang => std::future::pending::<()>().await,
                }
            }
        },
    );
    Box::pin(stream)
}

// ============================================================================
// Mock Agent Client
// ============================================================================

/// Mock agent client that answers with queued scripts
#[derive(Default)]
pub struct MockAgentClient {
    responses: Mutex<VecDeque<Result<Script, AgentError>>>,
    /// Record of all requests made
    pub requests: Mutex<Vec<AgentRequest>>,
    live_streams: Arc<AtomicUsize>,
}

impl MockAgentClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn queue_script(&self, script: Script) {
        self.responses.lock().unwrap().push_back(Ok(script));
    }

    /// Queue a failure to open the stream
    pub fn queue_error(&self, error: AgentError) {
        self.responses.lock().unwrap().push_back(Err(error));
    }

    pub fn recorded_requests(&self) -> Vec<AgentRequest> {
        self.requests.lock().unwrap().clone()
    }

    /// Response bodies still held by a reader
    pub fn live_streams(&self) -> usize {
        self.live_streams.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl AgentClient for MockAgentClient {
    async fn open_stream(&self, request: &AgentRequest) -> Result<ByteStream, AgentError> {
        self.requests.lock().unwrap().push(request.clone());
        let script = self
            .responses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(AgentError::network("No mock response queued")))?;
        Ok(script_stream(script, LiveGuard::new(&self.live_streams)))
    }

    fn endpoint(&self) -> &str {
        "mock://agent"
    }
}

// ============================================================================
// Session tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conversation::{Role, ToolStatus, Transcript};
    use crate::runtime::{ChatSession, SessionEvent};
    use crate::state_machine::TurnOutcome;
    use crate::typewriter::RevealConfig;
    use tokio::sync::broadcast;

    fn session(client: &Arc<MockAgentClient>) -> ChatSession {
        ChatSession::spawn(client.clone(), RevealConfig::default())
    }

    async fn next_finish(events: &mut broadcast::Receiver<SessionEvent>) -> TurnOutcome {
        let wait = async {
            loop {
                match events.recv().await {
                    Ok(SessionEvent::TurnFinished { outcome, .. }) => return outcome,
                    Ok(_) => {}
                    Err(e) => panic!("event channel failed: {e}"),
                }
            }
        };
        tokio::time::timeout(Duration::from_secs(60), wait)
            .await
            .expect("turn did not finish")
    }

    /// Let the actor drain whatever is ready without advancing the clock much
    async fn settle() {
        tokio::time::sleep(Duration::from_millis(1)).await;
    }

    fn assistant(transcript: &Transcript) -> (String, bool) {
        let view = transcript.last_assistant().expect("assistant message");
        (view.message.content.clone(), view.message.streaming)
    }

    #[tokio::test(start_paused = true)]
    async fn streams_deltas_into_one_assistant_message() {
        let client = Arc::new(MockAgentClient::new());
        client.queue_script(Script::new().delta("Hi ").delta("there!").completed());
        let session = session(&client);
        let mut events = session.subscribe();

        session.send_turn("Hello").await.unwrap();
        assert_eq!(next_finish(&mut events).await, TurnOutcome::Completed);

        let transcript = session.snapshot();
        assert!(!transcript.streaming);
        assert!(transcript.error.is_none());
        assert_eq!(transcript.messages.len(), 2);
        assert_eq!(transcript.messages[0].message.role, Role::User);
        assert_eq!(transcript.messages[0].message.content, "Hello");
        assert_eq!(assistant(&transcript), ("Hi there!".to_string(), false));

        let requests = client.recorded_requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(
            serde_json::to_value(&requests[0]).unwrap(),
            json!({"input": [{"role": "user", "content": [{"type": "text", "text": "Hello"}]}]})
        );
        settle().await;
        assert_eq!(client.live_streams(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn tool_output_releases_the_completed_response() {
        let long_text = "The Grand Plaza has rooms available this weekend. ".repeat(4);
        let client = Arc::new(MockAgentClient::new());
        client.queue_script(
            Script::new()
                .tool_call("c1", "get_hotel_list", r#"{"city":"Paris"}"#)
                .delta(&long_text)
                .completed()
                .delay(1000)
                .tool_output("c1", r#"{"r":1}"#)
                .delay(1000),
        );
        let session = session(&client);
        let mut events = session.subscribe();
        session.send_turn("Hotels in Paris").await.unwrap();

        tokio::time::sleep(Duration::from_millis(500)).await;
        let transcript = session.snapshot();
        let view = transcript.last_assistant().unwrap();
        assert!(transcript.streaming);
        assert!(view.message.streaming);
        assert_eq!(view.pending_tools, 1);
        assert_eq!(view.tool_calls.len(), 1);
        assert_eq!(view.tool_calls[0].status, ToolStatus::Pending);
        assert_eq!(view.tool_calls[0].arguments, r#"{"city":"Paris"}"#);
        // Still pacing: the reveal is behind the buffer
        assert!(view.message.content.len() < long_text.len());
        assert!(long_text.starts_with(&view.message.content));

        tokio::time::sleep(Duration::from_millis(550)).await;
        let transcript = session.snapshot();
        let view = transcript.last_assistant().unwrap();
        assert_eq!(view.pending_tools, 0);
        assert_eq!(view.tool_calls[0].status, ToolStatus::Completed);
        assert_eq!(view.tool_calls[0].output.as_deref(), Some(r#"{"r":1}"#));
        assert_eq!(view.message.content, long_text);

        assert_eq!(next_finish(&mut events).await, TurnOutcome::Completed);
        assert_eq!(assistant(&session.snapshot()), (long_text, false));
    }

    #[tokio::test(start_paused = true)]
    async fn malformed_lines_are_skipped() {
        let client = Arc::new(MockAgentClient::new());
        client.queue_script(
            Script::new()
                .raw("data: not-json\n")
                .raw(": keepalive\n\n")
                .delta("Still ")
                .raw("data: {\"object\": \"content\", \"del")
                .raw("ta\": true, \"text\": \"here\"}\r\n")
                .completed(),
        );
        let session = session(&client);
        let mut events = session.subscribe();

        session.send_turn("Hello").await.unwrap();
        assert_eq!(next_finish(&mut events).await, TurnOutcome::Completed);

        let transcript = session.snapshot();
        assert!(transcript.error.is_none());
        assert_eq!(assistant(&transcript).0, "Still here");
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_freezes_the_message_without_error() {
        let client = Arc::new(MockAgentClient::new());
        client.queue_script(Script::new().delta("Partial answer").hang());
        let session = session(&client);
        let mut events = session.subscribe();

        session.send_turn("Hello").await.unwrap();
        tokio::time::sleep(Duration::from_millis(40)).await;
        assert_eq!(client.live_streams(), 1);

        session.cancel().await.unwrap();
        assert_eq!(next_finish(&mut events).await, TurnOutcome::Cancelled);
        settle().await;

        let transcript = session.snapshot();
        assert!(!transcript.streaming);
        assert!(transcript.error.is_none());
        assert_eq!(assistant(&transcript), ("Partial answer".to_string(), false));
        assert_eq!(client.live_streams(), 0);

        // The timer is gone too: nothing changes from here on
        tokio::time::sleep(Duration::from_millis(500)).await;
        assert_eq!(session.snapshot(), transcript);
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_when_idle_is_a_noop() {
        let client = Arc::new(MockAgentClient::new());
        client.queue_script(Script::new().delta("Done").completed());
        let session = session(&client);
        let mut events = session.subscribe();

        session.cancel().await.unwrap();
        session.send_turn("Hello").await.unwrap();
        assert_eq!(next_finish(&mut events).await, TurnOutcome::Completed);
        let before = session.snapshot();

        session.cancel().await.unwrap();
        session.cancel().await.unwrap();
        settle().await;

        assert_eq!(session.snapshot(), before);
        assert!(events.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn send_while_streaming_is_ignored() {
        let client = Arc::new(MockAgentClient::new());
        client.queue_script(Script::new().delta("Working").delay(200).completed());
        let session = session(&client);
        let mut events = session.subscribe();

        session.send_turn("First").await.unwrap();
        settle().await;
        session.send_turn("Second").await.unwrap();
        session.send_turn("   ").await.unwrap();
        assert_eq!(next_finish(&mut events).await, TurnOutcome::Completed);

        let transcript = session.snapshot();
        assert_eq!(transcript.messages.len(), 2);
        assert_eq!(client.recorded_requests().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn blank_input_starts_nothing() {
        let client = Arc::new(MockAgentClient::new());
        let session = session(&client);

        session.send_turn(" \n\t").await.unwrap();
        settle().await;

        assert!(session.snapshot().messages.is_empty());
        assert!(client.recorded_requests().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn http_error_becomes_the_error_banner() {
        let client = Arc::new(MockAgentClient::new());
        client.queue_error(AgentError::http_status(500, ""));
        let session = session(&client);
        let mut events = session.subscribe();

        session.send_turn("Hello").await.unwrap();
        let outcome = next_finish(&mut events).await;
        assert_eq!(outcome, TurnOutcome::failed("HTTP error! status: 500"));

        let transcript = session.snapshot();
        assert!(!transcript.streaming);
        assert_eq!(transcript.error.as_deref(), Some("HTTP error! status: 500"));
        assert_eq!(transcript.messages.len(), 2);
        assert_eq!(assistant(&transcript), (String::new(), false));
    }

    #[tokio::test(start_paused = true)]
    async fn dropped_connection_keeps_received_text() {
        let client = Arc::new(MockAgentClient::new());
        client.queue_script(
            Script::new()
                .delta("Half of the ")
                .delay(5)
                .fail(AgentError::network("connection reset")),
        );
        let session = session(&client);
        let mut events = session.subscribe();

        session.send_turn("Hello").await.unwrap();
        assert_eq!(
            next_finish(&mut events).await,
            TurnOutcome::failed("connection reset")
        );

        let transcript = session.snapshot();
        assert_eq!(transcript.error.as_deref(), Some("connection reset"));
        assert_eq!(assistant(&transcript), ("Half of the ".to_string(), false));
        settle().await;
        assert_eq!(client.live_streams(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn early_close_is_a_failure() {
        let client = Arc::new(MockAgentClient::new());
        client.queue_script(Script::new().delta("Cut"));
        let session = session(&client);
        let mut events = session.subscribe();

        session.send_turn("Hello").await.unwrap();
        let outcome = next_finish(&mut events).await;
        assert!(matches!(outcome, TurnOutcome::Failed { .. }));
        assert_eq!(assistant(&session.snapshot()), ("Cut".to_string(), false));
    }

    #[tokio::test(start_paused = true)]
    async fn completed_response_ends_the_turn_on_an_open_connection() {
        let client = Arc::new(MockAgentClient::new());
        client.queue_script(Script::new().delta("Hi ").delta("there!").completed().hang());
        client.queue_script(Script::new().delta("Sure.").completed());
        let session = session(&client);
        let mut events = session.subscribe();

        session.send_turn("Hello").await.unwrap();
        assert_eq!(next_finish(&mut events).await, TurnOutcome::Completed);
        settle().await;

        let transcript = session.snapshot();
        assert!(!transcript.streaming);
        assert!(transcript.error.is_none());
        assert_eq!(assistant(&transcript), ("Hi there!".to_string(), false));
        assert_eq!(client.live_streams(), 0);

        session.send_turn("Next question").await.unwrap();
        assert_eq!(next_finish(&mut events).await, TurnOutcome::Completed);

        let transcript = session.snapshot();
        assert_eq!(transcript.messages.len(), 4);
        assert_eq!(client.recorded_requests().len(), 2);
        assert_eq!(assistant(&transcript).0, "Sure.");
    }

    #[tokio::test(start_paused = true)]
    async fn completion_waits_for_the_reveal_to_catch_up() {
        let client = Arc::new(MockAgentClient::new());
        client.queue_script(Script::new().delta("abcdefghij").completed().hang());
        let session = session(&client);
        let mut events = session.subscribe();

        session.send_turn("Hello").await.unwrap();
        tokio::time::sleep(Duration::from_millis(40)).await;
        let transcript = session.snapshot();
        assert!(transcript.streaming);
        assert_eq!(assistant(&transcript), ("abcd".to_string(), true));

        assert_eq!(next_finish(&mut events).await, TurnOutcome::Completed);
        assert_eq!(assistant(&session.snapshot()), ("abcdefghij".to_string(), false));
    }

    #[tokio::test(start_paused = true)]
    async fn connection_reset_after_completion_is_not_an_error() {
        let client = Arc::new(MockAgentClient::new());
        client.queue_script(
            Script::new()
                .tool_call("c1", "get_hotel_list", "{}")
                .delta("Done.")
                .completed()
                .delay(5)
                .fail(AgentError::network("connection reset")),
        );
        let session = session(&client);
        let mut events = session.subscribe();

        session.send_turn("Hello").await.unwrap();
        assert_eq!(next_finish(&mut events).await, TurnOutcome::Completed);

        let transcript = session.snapshot();
        assert!(transcript.error.is_none());
        assert!(!transcript.streaming);
        assert_eq!(assistant(&transcript), ("Done.".to_string(), false));
    }

    #[tokio::test(start_paused = true)]
    async fn error_on_terminal_event_fails_the_turn() {
        let client = Arc::new(MockAgentClient::new());
        client.queue_script(
            Script::new()
                .delta("Looking")
                .event(json!({
                    "object": "response",
                    "status": "completed",
                    "error": {"message": "quota exceeded"}
                }))
                .hang(),
        );
        let session = session(&client);
        let mut events = session.subscribe();

        session.send_turn("Hello").await.unwrap();
        assert_eq!(
            next_finish(&mut events).await,
            TurnOutcome::failed("quota exceeded")
        );
        settle().await;

        let transcript = session.snapshot();
        assert_eq!(transcript.error.as_deref(), Some("quota exceeded"));
        assert_eq!(assistant(&transcript), ("Looking".to_string(), false));
        assert_eq!(client.live_streams(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn error_mid_stream_is_a_warning() {
        let client = Arc::new(MockAgentClient::new());
        client.queue_script(
            Script::new()
                .event(json!({"object": "message", "status": "in_progress", "error": "tool timed out"}))
                .delta("Recovered")
                .completed(),
        );
        let session = session(&client);
        let mut events = session.subscribe();

        session.send_turn("Hello").await.unwrap();

        let mut warnings = Vec::new();
        let outcome = loop {
            match events.recv().await.unwrap() {
                SessionEvent::StreamWarning { message } => warnings.push(message),
                SessionEvent::TurnFinished { outcome, .. } => break outcome,
                SessionEvent::TurnStarted { .. } => {}
            }
        };
        assert_eq!(outcome, TurnOutcome::Completed);
        assert_eq!(warnings, vec!["tool timed out".to_string()]);
        assert!(session.snapshot().error.is_none());
        assert_eq!(assistant(&session.snapshot()).0, "Recovered");
    }

    #[tokio::test(start_paused = true)]
    async fn next_turn_clears_the_error() {
        let client = Arc::new(MockAgentClient::new());
        client.queue_error(AgentError::network("offline"));
        client.queue_script(Script::new().delta("Back online").completed());
        let session = session(&client);
        let mut events = session.subscribe();

        session.send_turn("First").await.unwrap();
        next_finish(&mut events).await;
        assert_eq!(session.snapshot().error.as_deref(), Some("offline"));

        session.send_turn("Second").await.unwrap();
        settle().await;
        assert!(session.snapshot().error.is_none());
        assert_eq!(next_finish(&mut events).await, TurnOutcome::Completed);

        let transcript = session.snapshot();
        assert_eq!(transcript.messages.len(), 4);
        assert_eq!(assistant(&transcript).0, "Back online");
        // The failed turn's message is untouched
        assert_eq!(transcript.messages[1].message.content, "");
    }

    #[tokio::test(start_paused = true)]
    async fn bursts_do_not_speed_up_the_reveal() {
        let client = Arc::new(MockAgentClient::new());
        let mut script = Script::new();
        for _ in 0..20 {
            script = script.delta("abcde").delay(1);
        }
        client.queue_script(script.hang());
        let session = session(&client);
        let mut transcript_rx = session.transcript();

        session.send_turn("Hello").await.unwrap();

        let mut last = String::new();
        let sampler = async {
            while transcript_rx.changed().await.is_ok() {
                let content = transcript_rx
                    .borrow_and_update()
                    .last_assistant()
                    .map(|m| m.message.content.clone())
                    .unwrap_or_default();
                assert!(content.starts_with(&last));
                last = content;
            }
        };
        let _ = tokio::time::timeout(Duration::from_millis(190), sampler).await;

        // Ten ticks of two characters, however many deltas arrived meanwhile
        let shown = assistant(&session.snapshot()).0;
        assert!(shown.len() <= 20, "revealed {} chars", shown.len());
        assert!(shown.len() >= 18, "revealed {} chars", shown.len());
        assert!("abcde".repeat(20).starts_with(&shown));
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_cancels_the_active_turn() {
        let client = Arc::new(MockAgentClient::new());
        client.queue_script(Script::new().delta("Bye").hang());
        let session = session(&client);
        let mut events = session.subscribe();

        session.send_turn("Hello").await.unwrap();
        settle().await;
        session.shutdown().await.unwrap();

        assert_eq!(next_finish(&mut events).await, TurnOutcome::Cancelled);
        settle().await;
        assert_eq!(client.live_streams(), 0);
        assert!(session.send_turn("Again").await.is_err());
    }
}
