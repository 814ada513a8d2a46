//! Paced reveal of streamed assistant text
//!
//! Text arrives in bursts; the typewriter republishes a growing prefix of it
//! at a fixed rate. The timer is a cancelable background task that only
//! emits tick notifications. The runtime owns the buffer and applies ticks,
//! so display content has a single writer.

use std::time::Duration;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

/// Reveal pacing parameters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RevealConfig {
    /// Characters revealed per tick
    pub step: usize,
    pub interval: Duration,
}

impl Default for RevealConfig {
    fn default() -> Self {
        Self {
            step: 2,
            interval: Duration::from_millis(18),
        }
    }
}

/// Received text plus how much of it is on screen
#[derive(Debug, Default, Clone)]
pub struct RevealBuffer {
    text: String,
    /// Byte offset of the revealed prefix, always on a char boundary
    shown: usize,
}

impl RevealBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append(&mut self, text: &str) {
        self.text.push_str(text);
    }

    pub fn buffered(&self) -> &str {
        &self.text
    }

    pub fn shown(&self) -> &str {
        self.text.get(..self.shown).unwrap_or_default()
    }

    pub fn is_caught_up(&self) -> bool {
        self.shown >= self.text.len()
    }

    /// Reveal up to `step` more characters; `None` once everything is shown
    pub fn advance(&mut self, step: usize) -> Option<&str> {
        let rest = self.text.get(self.shown..)?;
        if rest.is_empty() {
            return None;
        }
        let width = rest
            .char_indices()
            .nth(step.max(1))
            .map_or(rest.len(), |(offset, _)| offset);
        self.shown += width;
        Some(self.shown())
    }

    /// Reveal everything at once
    pub fn flush(&mut self) -> &str {
        self.shown = self.text.len();
        &self.text
    }
}

/// Handle to a running tick task; dropping it stops the task
#[derive(Debug)]
struct RevealTimer {
    generation: u64,
    cancel: CancellationToken,
}

impl RevealTimer {
    fn start(generation: u64, interval: Duration, tick_tx: mpsc::Sender<u64>) -> Self {
        let cancel = CancellationToken::new();
        let token = cancel.clone();

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // The first tick completes immediately; reveal starts one interval in
            ticker.tick().await;

            loop {
                tokio::select! {
                    biased;

                    () = token.cancelled() => break,

                    _ = ticker.tick() => match tick_tx.try_send(generation) {
                        // A tick is already queued; the reader is behind, not starved
                        Ok(()) | Err(TrySendError::Full(_)) => {}
                        Err(TrySendError::Closed(_)) => break,
                    },
                }
            }
            tracing::trace!(generation, "Reveal timer stopped");
        });

        Self { generation, cancel }
    }
}

impl Drop for RevealTimer {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

/// Typewriter for the active assistant message
#[derive(Debug)]
pub struct Typewriter {
    config: RevealConfig,
    buffer: RevealBuffer,
    timer: Option<RevealTimer>,
    next_generation: u64,
    tick_tx: mpsc::Sender<u64>,
}

impl Typewriter {
    /// Ticks are delivered on `tick_tx`, tagged with the timer generation
    pub fn new(config: RevealConfig, tick_tx: mpsc::Sender<u64>) -> Self {
        Self {
            config,
            buffer: RevealBuffer::new(),
            timer: None,
            next_generation: 0,
            tick_tx,
        }
    }

    /// Stop any timer and start over with an empty buffer
    pub fn reset(&mut self) {
        self.stop();
        self.buffer = RevealBuffer::new();
    }

    pub fn append(&mut self, text: &str) {
        self.buffer.append(text);
    }

    pub fn buffer(&self) -> &RevealBuffer {
        &self.buffer
    }

    pub fn is_running(&self) -> bool {
        self.timer.is_some()
    }

    /// Start a timer unless one is running or there is nothing left to show
    pub fn ensure_running(&mut self) {
        if self.timer.is_none() && !self.buffer.is_caught_up() {
            self.start();
        }
    }

    /// Start a fresh timer, replacing any running one
    pub fn start(&mut self) {
        self.next_generation += 1;
        // Assigning drops (and cancels) the previous timer
        self.timer = Some(RevealTimer::start(
            self.next_generation,
            self.config.interval,
            self.tick_tx.clone(),
        ));
    }

    pub fn stop(&mut self) {
        self.timer = None;
    }

    /// Apply one tick. Returns the new display text, or `None` when the tick
    /// is stale or there was nothing new to reveal.
    pub fn on_tick(&mut self, generation: u64) -> Option<String> {
        if self.timer.as_ref().map(|t| t.generation) != Some(generation) {
            return None;
        }
        let revealed = self.buffer.advance(self.config.step).map(str::to_string);
        if self.buffer.is_caught_up() {
            self.stop();
        }
        revealed
    }

    /// Stop pacing and reveal everything buffered
    pub fn flush(&mut self) -> String {
        self.stop();
        self.buffer.flush().to_string()
    }
}
