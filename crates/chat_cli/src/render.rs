//! Incremental plain-text rendering of a transcript.

use std::collections::HashMap;
use std::io::{self, Write};

use chat_provider::{Message, Part, Role};
use session_store::{DurationKey, DurationMap};

/// Prints only what changed since the previous call.
#[derive(Debug, Default)]
pub struct TranscriptPrinter {
    // Printed byte length per message part; tool parts count as 1 once shown.
    printed: HashMap<String, Vec<usize>>,
}

impl TranscriptPrinter {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Forgets everything printed, e.g. after the transcript was cleared.
    pub fn reset(&mut self) {
        self.printed.clear();
    }

    pub fn print_updates(&mut self, transcript: &[Message], out: &mut impl Write) -> io::Result<()> {
        for message in transcript {
            let is_new = !self.printed.contains_key(&message.id);
            let printed = self.printed.entry(message.id.clone()).or_default();
            if is_new {
                write!(out, "\n{}> ", role_label(message.role))?;
            }

            for (index, part) in message.parts.iter().enumerate() {
                if printed.len() <= index {
                    printed.push(0);
                    write!(out, "{}", part_header(part, index))?;
                }

                match part {
                    Part::Text { text } | Part::Reasoning { text } => {
                        if let Some(suffix) = text.get(printed[index]..) {
                            out.write_all(suffix.as_bytes())?;
                            printed[index] = text.len();
                        }
                    }
                    Part::ToolCall { name, args } if printed[index] == 0 => {
                        write!(out, "{name}({args})")?;
                        printed[index] = 1;
                    }
                    Part::ToolResult { output } if printed[index] == 0 => {
                        write!(out, "{output}")?;
                        printed[index] = 1;
                    }
                    Part::ToolCall { .. } | Part::ToolResult { .. } => {}
                }
            }
        }

        out.flush()
    }
}

fn role_label(role: Role) -> &'static str {
    match role {
        Role::User => "you",
        Role::Assistant => "assistant",
    }
}

fn part_header(part: &Part, index: usize) -> String {
    let label = match part {
        Part::Text { .. } => return if index == 0 { String::new() } else { "\n".to_string() },
        Part::Reasoning { .. } => "reasoning",
        Part::ToolCall { .. } => "tool call",
        Part::ToolResult { .. } => "tool result",
    };
    let separator = if index == 0 { "" } else { "\n" };
    format!("{separator}[{label}] ")
}

/// One line per recorded segment duration of `message`.
#[must_use]
pub fn duration_summary(message: &Message, durations: &DurationMap) -> Vec<String> {
    message
        .parts
        .iter()
        .enumerate()
        .filter_map(|(index, part)| {
            let millis = durations.get(&DurationKey::new(message.id.clone(), index))?;
            let label = match part {
                Part::Reasoning { .. } => "reasoned",
                _ => "streamed",
            };
            Some(format!("{label} for {:.1}s", millis as f64 / 1000.0))
        })
        .collect()
}
