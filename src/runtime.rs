//! Session runtime
//!
//! One actor task per conversation owns the turn state, the conversation
//! store and the typewriter. Callers talk to it through a [`ChatSession`]
//! handle: commands go in over an mpsc channel, transcript snapshots come
//! out over a `watch` channel and turn lifecycle events over `broadcast`.

mod executor;

#[cfg(test)]
pub mod testing;

pub use executor::SessionRuntime;

use crate::agent::AgentClient;
use crate::conversation::Transcript;
use crate::state_machine::TurnOutcome;
use crate::typewriter::RevealConfig;
use thiserror::Error;
use tokio::sync::{broadcast, mpsc, watch};

const COMMAND_CHANNEL_SIZE: usize = 32;
const EVENT_CHANNEL_SIZE: usize = 128;

/// Lifecycle notifications for observers of a session
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    TurnStarted { message_id: String },
    /// A recoverable error event arrived inside the stream
    StreamWarning { message: String },
    TurnFinished {
        message_id: String,
        outcome: TurnOutcome,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SessionError {
    #[error("Chat session has shut down")]
    Closed,
}

#[derive(Debug)]
pub(crate) enum Command {
    SendTurn { text: String },
    Cancel,
    Shutdown,
}

/// Handle to a running chat session
#[derive(Clone)]
pub struct ChatSession {
    command_tx: mpsc::Sender<Command>,
    transcript_rx: watch::Receiver<Transcript>,
    event_tx: broadcast::Sender<SessionEvent>,
}

impl ChatSession {
    /// Spawn the session actor on the current tokio runtime
    pub fn spawn<C: AgentClient + 'static>(client: C, reveal: RevealConfig) -> Self {
        let (command_tx, command_rx) = mpsc::channel(COMMAND_CHANNEL_SIZE);
        let (transcript_tx, transcript_rx) = watch::channel(Transcript::default());
        let (event_tx, _) = broadcast::channel(EVENT_CHANNEL_SIZE);

        let runtime = SessionRuntime::new(
            client,
            reveal,
            command_rx,
            transcript_tx,
            event_tx.clone(),
        );
        tokio::spawn(runtime.run());

        Self {
            command_tx,
            transcript_rx,
            event_tx,
        }
    }

    /// Submit a user turn. Blank input and input while a turn is in flight
    /// are ignored by the session.
    pub async fn send_turn(&self, text: impl Into<String>) -> Result<(), SessionError> {
        self.send(Command::SendTurn { text: text.into() }).await
    }

    /// Abort the in-flight turn, if any
    pub async fn cancel(&self) -> Result<(), SessionError> {
        self.send(Command::Cancel).await
    }

    /// Cancel any active turn and stop the actor
    pub async fn shutdown(&self) -> Result<(), SessionError> {
        self.send(Command::Shutdown).await
    }

    /// Subscribe to transcript snapshots
    pub fn transcript(&self) -> watch::Receiver<Transcript> {
        self.transcript_rx.clone()
    }

    /// The latest published transcript
    pub fn snapshot(&self) -> Transcript {
        self.transcript_rx.borrow().clone()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.event_tx.subscribe()
    }

    async fn send(&self, command: Command) -> Result<(), SessionError> {
        self.command_tx
            .send(command)
            .await
            .map_err(|_| SessionError::Closed)
    }
}
