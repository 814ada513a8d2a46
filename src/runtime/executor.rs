//! Session runtime executor

use super::{Command, SessionEvent};

use crate::agent::{AgentClient, AgentRequest, EventDecoder};
use crate::conversation::{Conversation, Transcript};
use crate::state_machine::{transition, Effect, Event, TurnOutcome, TurnState};
use crate::typewriter::{RevealConfig, Typewriter};
use futures::StreamExt;
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc, watch};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

const STREAM_CHANNEL_SIZE: usize = 64;

/// An event from a stream reader, tagged with the turn that opened it
#[derive(Debug)]
struct StreamMessage {
    turn: u64,
    event: Event,
}

/// One unit of work for the actor loop
#[derive(Debug)]
enum Input {
    /// `None` once every handle is gone
    Command(Option<Command>),
    Tick(u64),
    Stream(StreamMessage),
}

/// Actor owning one conversation.
///
/// All conversation mutation happens on this task, so the displayed text of
/// the active message has exactly one writer.
pub struct SessionRuntime<C: AgentClient + 'static> {
    client: Arc<C>,
    state: TurnState,
    conversation: Conversation,
    typewriter: Typewriter,
    /// Incremented whenever a request is opened; older readers are stale
    turn: u64,
    /// Token to cancel the running stream reader
    stream_cancel: Option<CancellationToken>,
    command_rx: mpsc::Receiver<Command>,
    stream_tx: mpsc::Sender<StreamMessage>,
    stream_rx: mpsc::Receiver<StreamMessage>,
    tick_rx: mpsc::Receiver<u64>,
    transcript_tx: watch::Sender<Transcript>,
    event_tx: broadcast::Sender<SessionEvent>,
}

impl<C: AgentClient + 'static> SessionRuntime<C> {
    pub(crate) fn new(
        client: C,
        reveal: RevealConfig,
        command_rx: mpsc::Receiver<Command>,
        transcript_tx: watch::Sender<Transcript>,
        event_tx: broadcast::Sender<SessionEvent>,
    ) -> Self {
        let (stream_tx, stream_rx) = mpsc::channel(STREAM_CHANNEL_SIZE);
        // One slot: a slow reader coalesces ticks instead of queueing them
        let (tick_tx, tick_rx) = mpsc::channel(1);

        Self {
            client: Arc::new(client),
            state: TurnState::Idle,
            conversation: Conversation::new(),
            typewriter: Typewriter::new(reveal, tick_tx),
            turn: 0,
            stream_cancel: None,
            command_rx,
            stream_tx,
            stream_rx,
            tick_rx,
            transcript_tx,
            event_tx,
        }
    }

    pub async fn run(mut self) {
        tracing::info!(endpoint = %self.client.endpoint(), "Starting chat session");

        loop {
            match self.next_input().await {
                Input::Command(Some(Command::SendTurn { text })) => {
                    self.process_event(Event::UserTurn {
                        text,
                        user_message_id: Uuid::new_v4().to_string(),
                        assistant_message_id: Uuid::new_v4().to_string(),
                    });
                }
                Input::Command(Some(Command::Cancel)) => self.process_event(Event::UserCancel),
                Input::Command(Some(Command::Shutdown) | None) => {
                    self.process_event(Event::UserCancel);
                    break;
                }
                Input::Tick(generation) => self.process_tick(generation),
                Input::Stream(message) => {
                    if message.turn == self.turn {
                        self.process_event(message.event);
                    } else {
                        tracing::trace!(turn = message.turn, current = self.turn, "Dropping stale stream event");
                    }
                }
            }
        }

        tracing::info!("Chat session stopped");
    }

    /// Wait for the next input, by priority: commands, then reveal ticks,
    /// then stream data. A busy stream can delay neither a cancel nor the
    /// reveal.
    async fn next_input(&mut self) -> Input {
        tokio::select! {
            biased;

            command = self.command_rx.recv() => Input::Command(command),
            Some(generation) = self.tick_rx.recv() => Input::Tick(generation),
            Some(message) = self.stream_rx.recv() => Input::Stream(message),
        }
    }

    fn process_event(&mut self, event: Event) {
        let result = match transition(&self.state, event) {
            Ok(r) => r,
            Err(e) => {
                tracing::debug!(state = self.state.name(), reason = %e, "Ignoring input");
                return;
            }
        };

        let old_state = std::mem::replace(&mut self.state, result.new_state);
        if old_state.name() != self.state.name() {
            tracing::debug!(from = old_state.name(), to = self.state.name(), "Turn state changed");
        }

        // Teardown leaves the machine idle, so fall back to the old message
        let message_id = self
            .state
            .message_id()
            .or_else(|| old_state.message_id())
            .map(str::to_string);

        for effect in result.effects {
            self.execute_effect(effect, message_id.as_deref());
        }

        if let Some(id) = self.state.message_id() {
            self.conversation
                .set_pending_tools(id, self.state.pending_tools());
        }
        self.publish();
        self.finish_if_drained();
    }

    fn process_tick(&mut self, generation: u64) {
        let Some(message_id) = self.state.message_id().map(str::to_string) else {
            return;
        };
        if let Some(text) = self.typewriter.on_tick(generation) {
            self.conversation.set_displayed(&message_id, &text);
            self.publish();
        }
        self.finish_if_drained();
    }

    /// A completed response ends the turn once its text is fully revealed,
    /// whether or not the backend closes the connection
    fn finish_if_drained(&mut self) {
        if matches!(self.state, TurnState::Completed { .. })
            && self.typewriter.buffer().is_caught_up()
        {
            self.process_event(Event::RevealDrained);
        }
    }

    fn execute_effect(&mut self, effect: Effect, message_id: Option<&str>) {
        match effect {
            Effect::AddUserMessage { id, text } => {
                self.conversation.clear_error();
                self.conversation.push_user(id, text);
            }

            Effect::AddAssistantMessage { id } => {
                self.typewriter.reset();
                self.conversation.push_assistant(id);
            }

            Effect::OpenStream { text } => {
                self.turn += 1;
                let cancel = CancellationToken::new();
                if let Some(previous) = self.stream_cancel.replace(cancel.clone()) {
                    previous.cancel();
                }

                tokio::spawn(read_stream(
                    self.client.clone(),
                    AgentRequest::user_text(text),
                    self.turn,
                    self.stream_tx.clone(),
                    cancel,
                ));

                if let Some(id) = message_id {
                    tracing::info!(message_id = %id, turn = self.turn, "Turn started");
                    let _ = self.event_tx.send(SessionEvent::TurnStarted {
                        message_id: id.to_string(),
                    });
                }
            }

            Effect::AbortStream => {
                if let Some(token) = self.stream_cancel.take() {
                    token.cancel();
                }
            }

            Effect::RecordToolCall { call } => {
                let Some(id) = message_id else { return };
                tracing::info!(tool = %call.name, call_id = %call.id, "Tool call started");
                self.conversation.record_tool_call(id, call);
            }

            Effect::CompleteToolCall { call_id, output } => {
                let Some(id) = message_id else { return };
                if self.conversation.complete_tool_call(id, &call_id, output) {
                    tracing::info!(call_id = %call_id, "Tool call completed");
                } else {
                    tracing::debug!(call_id = %call_id, "Output for unknown tool call");
                }
            }

            Effect::AppendText { text } => self.typewriter.append(&text),

            Effect::EnsureReveal => self.typewriter.ensure_running(),

            Effect::FlushReveal => {
                let text = self.typewriter.flush();
                if let Some(id) = message_id {
                    self.conversation.set_displayed(id, &text);
                }
            }

            Effect::StreamWarning { message } => {
                tracing::warn!(error = %message, "Agent reported an error mid-stream");
                let _ = self.event_tx.send(SessionEvent::StreamWarning { message });
            }

            Effect::FinishTurn { outcome } => self.finish_turn(message_id, outcome),
        }
    }

    /// Stop the reveal, show everything received and release the request
    fn finish_turn(&mut self, message_id: Option<&str>, outcome: TurnOutcome) {
        if let Some(token) = self.stream_cancel.take() {
            token.cancel();
        }

        let text = self.typewriter.flush();
        let Some(id) = message_id else { return };
        self.conversation.set_displayed(id, &text);
        self.conversation.finish_message(id);

        match &outcome {
            TurnOutcome::Completed => tracing::info!(message_id = %id, "Turn completed"),
            TurnOutcome::Cancelled => tracing::info!(message_id = %id, "Turn cancelled"),
            TurnOutcome::Failed { message } => {
                tracing::error!(message_id = %id, error = %message, "Turn failed");
                self.conversation.set_error(message.clone());
            }
        }

        let _ = self.event_tx.send(SessionEvent::TurnFinished {
            message_id: id.to_string(),
            outcome,
        });
    }

    fn publish(&self) {
        let transcript = self.conversation.transcript(self.state.is_active());
        self.transcript_tx.send_replace(transcript);
    }
}

/// Open the request and forward decoded events until the body ends or the
/// token fires. Dropping the body on return closes the connection.
async fn read_stream<C: AgentClient + 'static>(
    client: Arc<C>,
    request: AgentRequest,
    turn: u64,
    tx: mpsc::Sender<StreamMessage>,
    cancel: CancellationToken,
) {
    let opened = tokio::select! {
        biased;
        () = cancel.cancelled() => {
            tracing::debug!(turn, "Request cancelled before the stream opened");
            return;
        }
        result = client.open_stream(&request) => result,
    };

    let body = match opened {
        Ok(body) => body,
        Err(error) => {
            let _ = tx
                .send(StreamMessage {
                    turn,
                    event: Event::TransportFailed { error },
                })
                .await;
            return;
        }
    };

    let mut events = EventDecoder::new(body);
    loop {
        let item = tokio::select! {
            biased;
            () = cancel.cancelled() => {
                tracing::debug!(turn, "Stream read cancelled");
                return;
            }
            item = events.next() => item,
        };

        let event = match item {
            Some(Ok(event)) => Event::Agent(event),
            Some(Err(error)) => Event::TransportFailed { error },
            None => {
                if events.skipped() > 0 {
                    tracing::warn!(turn, skipped = events.skipped(), "Stream ended with skipped lines");
                }
                Event::StreamClosed
            }
        };
        let last = !matches!(event, Event::Agent(_));

        if tx.send(StreamMessage { turn, event }).await.is_err() || last {
            return;
        }
    }
}
