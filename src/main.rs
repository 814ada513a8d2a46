//! Travel Chat terminal client
//!
//! Reads user turns from stdin and streams the agent's answers to stdout.
//! Arguments, if any, are sent as the first turn. Ctrl-C cancels the turn in
//! flight; at the prompt it exits.

use std::io::Write;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio_stream::wrappers::{BroadcastStream, WatchStream};
use tokio_stream::StreamExt;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use travel_chat::render::TurnPrinter;
use travel_chat::{ChatConfig, ChatSession, HttpAgentClient, LoggingClient, SessionEvent};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Logs go to stderr so they never interleave with the answer on stdout
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "travel_chat=info".into()),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .json()
                .with_current_span(false)
                .with_span_list(false)
                .with_writer(std::io::stderr),
        )
        .init();

    let config = ChatConfig::from_env();
    tracing::info!(
        endpoint = %config.endpoint,
        reveal_step = config.reveal.step,
        reveal_interval_ms = %config.reveal.interval.as_millis(),
        "Starting travel chat"
    );

    let client = LoggingClient::new(HttpAgentClient::new(
        config.endpoint.clone(),
        config.connect_timeout,
    )?);
    let session = ChatSession::spawn(client, config.reveal);

    let initial = std::env::args().skip(1).collect::<Vec<_>>().join(" ");
    if !initial.trim().is_empty() {
        println!("> {initial}");
        run_turn(&session, initial).await?;
    }

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        print!("> ");
        std::io::stdout().flush()?;

        let line = tokio::select! {
            line = lines.next_line() => line?,
            _ = tokio::signal::ctrl_c() => {
                println!();
                break;
            }
        };

        match line {
            Some(text) if text.trim().is_empty() => {}
            Some(text) => run_turn(&session, text).await?,
            None => break,
        }
    }

    session.shutdown().await?;
    Ok(())
}

/// Send one turn and print it as it streams, until the session reports the
/// turn finished
async fn run_turn(session: &ChatSession, text: String) -> Result<(), Box<dyn std::error::Error>> {
    let mut events = BroadcastStream::new(session.subscribe());
    let mut snapshots = WatchStream::from_changes(session.transcript());
    let mut printer = TurnPrinter::new();
    let mut stdout = std::io::stdout();

    session.send_turn(text).await?;

    loop {
        tokio::select! {
            Some(transcript) = snapshots.next() => {
                stdout.write_all(printer.update(&transcript).as_bytes())?;
                stdout.flush()?;
            }

            event = events.next() => match event {
                Some(Ok(SessionEvent::TurnFinished { outcome, .. })) => {
                    let mut chunk = printer.update(&session.snapshot());
                    chunk.push_str(&printer.finish(&outcome));
                    stdout.write_all(chunk.as_bytes())?;
                    stdout.flush()?;
                    break;
                }
                Some(Ok(SessionEvent::StreamWarning { message })) => {
                    tracing::warn!(error = %message, "Agent warning");
                }
                // Missed notifications only delay output; the snapshot catches up
                Some(Ok(SessionEvent::TurnStarted { .. }) | Err(_)) => {}
                None => break,
            },

            _ = tokio::signal::ctrl_c() => session.cancel().await?,
        }
    }

    Ok(())
}
