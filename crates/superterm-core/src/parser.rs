//! Recovers an explanation and an optional command from free-form model output.
//!
//! Models are asked for a JSON object but routinely answer with Markdown
//! fences, `Command:`/`Explanation:` pairs in either order, or plain prose.
//! Each shape is tried in turn and plain prose is the last resort.

use lazy_static::lazy_static;
use regex::Regex;
use serde_json::{Map, Value};
use tracing::debug;

lazy_static! {
    static ref LABEL_LINE: Regex = Regex::new(
        r"(?i)^\s*(?:[-*•]\s+)?\**\s*(command|cmd|explanation)\s*\**\s*:\s*\**\s*(.*?)\s*$"
    )
    .expect("label regex is valid");
}

const NO_COMMAND: &[&str] = &["none", "[none]", "(none)", "n/a", "null"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplyFormat {
    Json,
    Labelled,
    Plain,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelReply {
    pub explanation: String,
    pub command: Option<String>,
    pub format: ReplyFormat,
}

impl ModelReply {
    fn plain(text: &str) -> Self {
        Self {
            explanation: text.trim().to_string(),
            command: None,
            format: ReplyFormat::Plain,
        }
    }

    pub fn suggested_command(&self) -> Option<&str> {
        self.command.as_deref()
    }
}

pub fn parse_response(raw: &str) -> ModelReply {
    let reply = parse_json(raw)
        .or_else(|| parse_labelled(raw))
        .unwrap_or_else(|| ModelReply::plain(raw));
    debug!(format = ?reply.format, has_command = reply.command.is_some(), "parsed model reply");
    reply
}

fn parse_json(raw: &str) -> Option<ModelReply> {
    let text = strip_fence_lines(raw);
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    if end <= start {
        return None;
    }

    let value: Value = serde_json::from_str(&text[start..=end]).ok()?;
    let object = value.as_object()?;

    let explanation = field(object, &["explanation"]);
    let command = field(object, &["command", "cmd"]);
    if explanation.is_none() && command.is_none() {
        return None;
    }

    Some(ModelReply {
        explanation: explanation.unwrap_or_default().trim().to_string(),
        command: command.and_then(|c| normalize_command(&c)),
        format: ReplyFormat::Json,
    })
}

fn field(object: &Map<String, Value>, names: &[&str]) -> Option<String> {
    object
        .iter()
        .find(|(key, _)| names.iter().any(|name| key.eq_ignore_ascii_case(name)))
        .and_then(|(_, value)| match value {
            Value::String(s) => Some(s.clone()),
            Value::Null => None,
            other => Some(other.to_string()),
        })
}

fn strip_fence_lines(raw: &str) -> String {
    raw.lines()
        .filter(|line| !line.trim_start().starts_with("```"))
        .collect::<Vec<_>>()
        .join("\n")
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Label {
    Command,
    Explanation,
}

fn parse_labelled(raw: &str) -> Option<ModelReply> {
    let mut command: Option<String> = None;
    let mut explanation: Option<Vec<String>> = None;
    let mut preamble: Vec<String> = Vec::new();
    // Unlabelled prose after a label, used when no explanation label has text.
    let mut trailing: Vec<String> = Vec::new();
    let mut current: Option<Label> = None;
    let mut seen_label = false;

    for line in raw.lines() {
        if let Some(caps) = LABEL_LINE.captures(line) {
            seen_label = true;
            let value = caps.get(2).map(|m| m.as_str()).unwrap_or_default();
            let label = if caps[1].eq_ignore_ascii_case("explanation") {
                Label::Explanation
            } else {
                Label::Command
            };

            current = match label {
                Label::Command if command.is_none() => {
                    command = Some(value.to_string());
                    Some(Label::Command)
                }
                Label::Explanation if explanation.is_none() => {
                    explanation = Some(vec![value.to_string()]);
                    Some(Label::Explanation)
                }
                _ => None,
            };
            continue;
        }

        let line = line.trim();
        if line.is_empty() || line.starts_with("```") {
            continue;
        }
        match current {
            Some(Label::Explanation) => {
                if let Some(parts) = explanation.as_mut() {
                    parts.push(line.to_string());
                }
            }
            // A command that was left empty on its label line gets the next line.
            Some(Label::Command) if command.as_deref().is_some_and(str::is_empty) => {
                command = Some(line.to_string());
                current = None;
            }
            _ if !seen_label => preamble.push(line.to_string()),
            _ => {
                current = None;
                trailing.push(line.to_string());
            }
        }
    }

    if !seen_label {
        return None;
    }

    let explanation = explanation
        .map(|parts| join_words(&parts))
        .filter(|text| !text.is_empty())
        .unwrap_or_else(|| join_words(&[preamble, trailing].concat()));

    Some(ModelReply {
        explanation,
        command: command.and_then(|c| normalize_command(&c)),
        format: ReplyFormat::Labelled,
    })
}

fn join_words(parts: &[String]) -> String {
    parts
        .iter()
        .map(|part| part.trim())
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

/// Strips quoting the model wraps around a command and maps "no command" markers to `None`.
pub fn normalize_command(raw: &str) -> Option<String> {
    let mut command = raw.trim();

    if let Some(inner) = command
        .strip_prefix("```")
        .and_then(|rest| rest.strip_suffix("```"))
    {
        command = match inner.split_once('\n') {
            Some((tag, body)) if !tag.trim().contains(' ') => body,
            _ => inner,
        }
        .trim();
    }

    // Only a single quoted token is unwrapped; `'ls' | grep 'rs'` stays as is.
    for quote in ['`', '"', '\''] {
        if let Some(inner) = command
            .strip_prefix(quote)
            .and_then(|rest| rest.strip_suffix(quote))
        {
            if !inner.contains(quote) {
                command = inner.trim();
            }
            break;
        }
    }

    if command.is_empty()
        || NO_COMMAND
            .iter()
            .any(|marker| command.eq_ignore_ascii_case(marker))
    {
        None
    } else {
        Some(command.to_string())
    }
}
