//! Deterministic local strategies used when the primary capability is
//! unconfigured or fails. Every function here is infallible.

use serde_json::Value;

use crate::model::{TaskKind, TaskOutput};

/// Provider tag marking degraded output
pub const FALLBACK_PROVIDER: &str = "fallback";
/// Model tag for degraded output
pub const FALLBACK_MODEL: &str = "local";

const SUMMARY_WORDS: usize = 24;
const EMAIL_WORDS: usize = 40;

/// Input text for a payload: `text`, then `topic`, then the JSON itself.
pub fn source_text(payload: &Value) -> String {
    for field in ["text", "topic"] {
        if let Some(s) = payload.get(field).and_then(Value::as_str) {
            if !s.is_empty() {
                return s.to_string();
            }
        }
    }
    match payload {
        Value::Null => "{}".to_string(),
        other => other.to_string(),
    }
}

/// Produce the fallback output for a task.
///
/// `note` carries the primary failure, if the fallback follows one.
pub fn run(kind: TaskKind, payload: &Value, note: Option<String>) -> TaskOutput {
    let text = source_text(payload);
    let words: Vec<&str> = text.split_whitespace().collect();

    let output = match kind {
        TaskKind::Summarize => {
            let mut summary = words
                .iter()
                .take(SUMMARY_WORDS)
                .copied()
                .collect::<Vec<_>>()
                .join(" ");
            if words.len() > SUMMARY_WORDS {
                summary.push('…');
            }
            summary
        }
        TaskKind::DraftEmail => {
            let body = words
                .iter()
                .take(EMAIL_WORDS)
                .copied()
                .collect::<Vec<_>>()
                .join(" ");
            format!("Hi there,\n\n{}.\n\nBest regards,\nAgent", body)
        }
        TaskKind::Checklist => ["- Step 1", "- Step 2", "- Step 3"].join("\n"),
        TaskKind::ExtractContacts => "[]".to_string(),
    };

    TaskOutput {
        provider: FALLBACK_PROVIDER.to_string(),
        model: FALLBACK_MODEL.to_string(),
        output,
        note,
    }
}
