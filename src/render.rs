//! Plain-text presentation of the transcript for the terminal

use crate::conversation::{ToolCall, ToolStatus, Transcript};
use crate::state_machine::TurnOutcome;
use serde_json::Value;
use std::collections::HashMap;

const OUTPUT_PREVIEW_LINES: usize = 8;

/// Human-readable label for the travel agent's tools
pub fn tool_display_name(name: &str) -> &str {
    match name {
        "get_countries" => "Get country info",
        "search_qweather_city_code" => "Search city code",
        "get_destinations" => "Get destination info",
        "get_qweather_forecast" => "Get current weather",
        "get_qweather_daily_forecast" => "Get weather forecast",
        "get_qweather_indices" => "Get lifestyle indices",
        "get_hotel_list" => "Search hotel list",
        "get_hotel_details" => "Get hotel details",
        "get_lowest_price" => "Check lowest price",
        "get_environment" => "Get environment info",
        other => other,
    }
}

pub fn status_label(status: ToolStatus) -> &'static str {
    match status {
        ToolStatus::Pending => "running",
        ToolStatus::Completed => "done",
        ToolStatus::Error => "error",
    }
}

/// One `key: value` line per argument, values as JSON.
///
/// Arguments that are not a JSON object are shown verbatim.
pub fn format_arguments(arguments: &str) -> Vec<String> {
    match serde_json::from_str::<Value>(arguments) {
        Ok(Value::Object(map)) => map.iter().map(|(k, v)| format!("{k}: {v}")).collect(),
        _ if arguments.trim().is_empty() => Vec::new(),
        _ => vec![arguments.to_string()],
    }
}

/// Unwrap `[{"type": "text", "text": ...}]` outputs, pretty-print other JSON
pub fn format_output(output: &str) -> String {
    let Ok(parsed) = serde_json::from_str::<Value>(output) else {
        return output.to_string();
    };

    if let Some(items) = parsed.as_array() {
        let is_text = items
            .first()
            .and_then(|item| item.get("type"))
            .and_then(Value::as_str)
            == Some("text");
        if is_text {
            return items
                .iter()
                .filter_map(|item| item.get("text").and_then(Value::as_str))
                .collect::<Vec<_>>()
                .join("\n");
        }
    }

    serde_json::to_string_pretty(&parsed).unwrap_or_else(|_| output.to_string())
}

/// Tool call block: a status line, then arguments or a preview of the output
pub fn render_tool_call(call: &ToolCall) -> String {
    let mut out = format!(
        "[{}] {}",
        status_label(call.status),
        tool_display_name(&call.name)
    );

    let detail = match (&call.status, &call.output) {
        (ToolStatus::Pending, _) | (_, None) => format_arguments(&call.arguments),
        (_, Some(output)) => {
            let formatted = format_output(output);
            let mut lines: Vec<String> = formatted
                .lines()
                .take(OUTPUT_PREVIEW_LINES)
                .map(str::to_string)
                .collect();
            if formatted.lines().count() > OUTPUT_PREVIEW_LINES {
                lines.push("…".to_string());
            }
            lines
        }
    };
    for line in detail {
        out.push_str("\n    ");
        out.push_str(&line);
    }
    out
}

/// Incremental printer for the turn being streamed.
///
/// Each call to [`TurnPrinter::update`] returns only what changed since the
/// previous snapshot, so the terminal behaves like an append-only log.
#[derive(Debug, Default)]
pub struct TurnPrinter {
    message_id: Option<String>,
    /// Bytes of the assistant content already written
    printed: usize,
    tools: HashMap<String, ToolStatus>,
    pending: usize,
    mid_line: bool,
}

impl TurnPrinter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn update(&mut self, transcript: &Transcript) -> String {
        let mut out = String::new();
        let Some(view) = transcript.last_assistant() else {
            return out;
        };

        if self.message_id.as_deref() != Some(view.message.id.as_str()) {
            *self = Self {
                message_id: Some(view.message.id.clone()),
                ..Self::default()
            };
        }

        for call in &view.tool_calls {
            if self.tools.insert(call.id.clone(), call.status) != Some(call.status) {
                self.start_line(&mut out);
                out.push_str(&render_tool_call(call));
                out.push('\n');
            }
        }

        if view.message.streaming && view.pending_tools > 0 && view.pending_tools != self.pending {
            self.start_line(&mut out);
            out.push_str(&format!("tools running… ({})\n", view.pending_tools));
        }
        self.pending = view.pending_tools;

        let content = &view.message.content;
        if let Some(new) = content.get(self.printed..) {
            if !new.is_empty() {
                out.push_str(new);
                self.mid_line = !new.ends_with('\n');
            }
            self.printed = content.len();
        }
        out
    }

    /// Closing line for a finished turn
    pub fn finish(&mut self, outcome: &TurnOutcome) -> String {
        let mut out = String::new();
        self.start_line(&mut out);
        match outcome {
            TurnOutcome::Completed => {}
            TurnOutcome::Cancelled => out.push_str("[cancelled]\n"),
            TurnOutcome::Failed { message } => {
                out.push_str("error: ");
                out.push_str(message);
                out.push('\n');
            }
        }
        out
    }

    fn start_line(&mut self, out: &mut String) {
        if self.mid_line {
            out.push('\n');
            self.mid_line = false;
        }
    }
}
