//! Client configuration from the environment

use crate::typewriter::RevealConfig;
use std::time::Duration;

pub const DEFAULT_ENDPOINT: &str = "http://localhost:8090/process";
const DEFAULT_REVEAL_STEP: usize = 2;
const DEFAULT_REVEAL_INTERVAL_MS: u64 = 18;
const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 10;

/// Configuration for the chat client
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatConfig {
    /// Agent endpoint receiving one POST per turn
    pub endpoint: String,
    pub reveal: RevealConfig,
    pub connect_timeout: Duration,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_ENDPOINT.to_string(),
            reveal: RevealConfig {
                step: DEFAULT_REVEAL_STEP,
                interval: Duration::from_millis(DEFAULT_REVEAL_INTERVAL_MS),
            },
            connect_timeout: Duration::from_secs(DEFAULT_CONNECT_TIMEOUT_SECS),
        }
    }
}

impl ChatConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary variable source
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let endpoint = lookup("AGENTSCOPE_API_URL")
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
            .unwrap_or_else(|| DEFAULT_ENDPOINT.to_string());

        let step = parse_or(&lookup, "TRAVEL_CHAT_REVEAL_STEP", DEFAULT_REVEAL_STEP).max(1);
        let interval_ms = parse_or(
            &lookup,
            "TRAVEL_CHAT_REVEAL_INTERVAL_MS",
            DEFAULT_REVEAL_INTERVAL_MS,
        )
        .max(1);
        let connect_timeout_secs = parse_or(
            &lookup,
            "TRAVEL_CHAT_CONNECT_TIMEOUT_SECS",
            DEFAULT_CONNECT_TIMEOUT_SECS,
        );

        Self {
            endpoint,
            reveal: RevealConfig {
                step,
                interval: Duration::from_millis(interval_ms),
            },
            connect_timeout: Duration::from_secs(connect_timeout_secs),
        }
    }
}

fn parse_or<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> T
where
    T: std::str::FromStr + Copy + std::fmt::Display,
{
    match lookup(key) {
        None => default,
        Some(raw) => raw.trim().parse().unwrap_or_else(|_| {
            tracing::warn!(key, value = %raw, default = %default, "Ignoring unparseable setting");
            default
        }),
    }
}
