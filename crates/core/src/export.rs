//! Plain-text transcript export.
//!
//! Each message is written as its role label on one line, the message body as
//! plain text, and a blank separator line. [`parse_plain`] reads the same
//! layout back. A body line that would read as a label is written with one
//! extra leading space.

use crate::error::Result;
use crate::markup;
use crate::transcript::{Message, Role};

use chrono::{DateTime, Local};
use std::path::{Path, PathBuf};

/// strftime pattern for export file names
pub const EXPORT_FILE_PATTERN: &str = "%y_%m_%d_%H%M%S_Chatlog.txt";

/// One message recovered from an export file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportedMessage {
    pub role: Role,
    pub text: String,
}

/// File name for an export taken at `at`
pub fn export_file_name(at: DateTime<Local>) -> String {
    at.format(EXPORT_FILE_PATTERN).to_string()
}

/// Text of a message as it appears in an export
pub fn message_plain_text(message: &Message) -> String {
    match message.role {
        Role::User => message.content.trim().to_string(),
        Role::Assistant => markup::to_plain_text(&message.content),
    }
}

pub fn render_plain(messages: &[Message]) -> String {
    let mut out = String::new();
    for message in messages {
        out.push_str(message.role.label());
        out.push('\n');
        for line in message_plain_text(message).split('\n') {
            if is_label(line.trim_start()) {
                out.push(' ');
            }
            out.push_str(line);
            out.push('\n');
        }
        out.push('\n');
    }
    out
}

/// Write `messages` to a new timestamped file inside `dir`
pub fn write_export(dir: &Path, messages: &[Message]) -> Result<PathBuf> {
    write_export_at(dir, messages, Local::now())
}

pub fn write_export_at(dir: &Path, messages: &[Message], at: DateTime<Local>) -> Result<PathBuf> {
    std::fs::create_dir_all(dir)?;
    let path = dir.join(export_file_name(at));
    std::fs::write(&path, render_plain(messages))?;
    tracing::info!(path = %path.display(), messages = messages.len(), "transcript exported");
    Ok(path)
}

/// Parse an export produced by [`render_plain`]
pub fn parse_plain(text: &str) -> Vec<ExportedMessage> {
    let mut parsed = Vec::new();
    let mut current: Option<(Role, Vec<&str>)> = None;

    for line in text.lines() {
        let role = if line == Role::User.label() {
            Some(Role::User)
        } else if line == Role::Assistant.label() {
            Some(Role::Assistant)
        } else {
            None
        };

        if let Some(role) = role {
            if let Some(done) = current.take() {
                parsed.push(finish(done));
            }
            current = Some((role, Vec::new()));
        } else if let Some((_, body)) = current.as_mut() {
            let unescaped = match line.strip_prefix(' ') {
                Some(rest) if is_label(rest.trim_start()) => rest,
                _ => line,
            };
            body.push(unescaped);
        }
    }

    if let Some(done) = current {
        parsed.push(finish(done));
    }
    parsed
}

fn is_label(line: &str) -> bool {
    line == Role::User.label() || line == Role::Assistant.label()
}

fn finish((role, mut body): (Role, Vec<&str>)) -> ExportedMessage {
    while body.last().is_some_and(|line| line.is_empty()) {
        body.pop();
    }
    ExportedMessage { role, text: body.join("\n") }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transcript::Transcript;
    use chrono::TimeZone;

    fn sample() -> Transcript {
        let mut transcript = Transcript::new();
        transcript.append_user("What is Rust?");
        transcript.append_assistant(
            "Rust is a **systems** language.\n\n- fast\n- safe",
            markup::to_html("Rust is a **systems** language.\n\n- fast\n- safe"),
            Some(42),
        );
        transcript.append_user("Multi\n\nline\nprompt");
        transcript.append_assistant("Sure.", markup::to_html("Sure."), Some(7));
        transcript
    }

    #[test]
    fn test_file_name_pattern() {
        let at = Local.with_ymd_and_hms(2024, 3, 9, 7, 5, 1).unwrap();
        assert_eq!(export_file_name(at), "24_03_09_070501_Chatlog.txt");
    }

    #[test]
    fn test_render_layout() {
        let mut transcript = Transcript::new();
        transcript.append_user("Hello");
        transcript.append_assistant("Hi *there*", markup::to_html("Hi *there*"), Some(3));

        assert_eq!(render_plain(&transcript.all()), "[User]:\nHello\n\n[AI Assistant]:\nHi there\n\n");
    }

    #[test]
    fn test_export_round_trip() {
        let dir = tempfile::TempDir::new().unwrap();
        let messages = sample().all();

        let path = write_export(dir.path(), &messages).unwrap();
        assert!(path.file_name().unwrap().to_string_lossy().ends_with("_Chatlog.txt"));

        let text = std::fs::read_to_string(&path).unwrap();
        let parsed = parse_plain(&text);

        let expected: Vec<ExportedMessage> = messages
            .iter()
            .map(|m| ExportedMessage { role: m.role, text: message_plain_text(m) })
            .collect();
        assert_eq!(parsed, expected);
        assert_eq!(parsed[1].text, "Rust is a systems language.\n\n- fast\n- safe");
        assert_eq!(parsed[2].text, "Multi\n\nline\nprompt");
    }

    #[test]
    fn test_export_creates_missing_directory() {
        let dir = tempfile::TempDir::new().unwrap();
        let nested = dir.path().join("chat_log");
        let path = write_export(&nested, &sample().all()).unwrap();
        assert!(path.starts_with(&nested));
        assert!(path.exists());
    }

    #[test]
    fn test_label_lines_inside_a_message_survive() {
        let mut transcript = Transcript::new();
        transcript.append_user("Please format like this:\n[AI Assistant]:\n [User]:\nthanks");
        transcript.append_assistant("ok", markup::to_html("ok"), Some(1));

        let text = render_plain(&transcript.all());
        assert!(text.contains("\n [AI Assistant]:\n  [User]:\n"));

        let parsed = parse_plain(&text);
        assert_eq!(
            parsed,
            vec![
                ExportedMessage {
                    role: Role::User,
                    text: "Please format like this:\n[AI Assistant]:\n [User]:\nthanks".to_string()
                },
                ExportedMessage { role: Role::Assistant, text: "ok".to_string() },
            ]
        );
    }

    #[test]
    fn test_parse_empty() {
        assert!(parse_plain("").is_empty());
        assert!(parse_plain("stray text without labels\n").is_empty());
    }
}
