//! Conversation export to Markdown or JSON

use crate::errors::DuetError;
use crate::message::{ChatMessage, ChatRole};
use anyhow::{Context, Result};
use chrono::{DateTime, Local};
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Download format offered in the sidebar
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ExportFormat {
    #[default]
    Markdown,
    Json,
}

impl ExportFormat {
    pub const ALL: [ExportFormat; 2] = [ExportFormat::Markdown, ExportFormat::Json];

    pub fn display_name(&self) -> &'static str {
        match self {
            ExportFormat::Markdown => "Markdown",
            ExportFormat::Json => "JSON",
        }
    }

    pub fn extension(&self) -> &'static str {
        match self {
            ExportFormat::Markdown => "md",
            ExportFormat::Json => "json",
        }
    }

    pub fn mime_type(&self) -> &'static str {
        match self {
            ExportFormat::Markdown => "text/markdown",
            ExportFormat::Json => "application/json",
        }
    }
}

impl FromStr for ExportFormat {
    type Err = DuetError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "md" | "markdown" => Ok(ExportFormat::Markdown),
            "json" => Ok(ExportFormat::Json),
            other => Err(DuetError::UnknownFormat(other.to_string())),
        }
    }
}

/// Exported shape of a message: the HTML cache is dropped
#[derive(Serialize)]
struct ExportedMessage<'a> {
    role: ChatRole,
    content: &'a str,
}

/// Serialize a whole conversation in the requested format
pub fn export_conversation(messages: &[ChatMessage], format: ExportFormat) -> Result<String> {
    match format {
        ExportFormat::Json => {
            let exported: Vec<ExportedMessage> = messages
                .iter()
                .map(|message| ExportedMessage {
                    role: message.role,
                    content: &message.content,
                })
                .collect();
            serde_json::to_string_pretty(&exported).context("Failed to serialize conversation")
        }
        ExportFormat::Markdown => Ok(chat_messages_to_md(messages)),
    }
}

/// Render a conversation as Markdown, one `## Role` section per visible turn.
/// System messages are left out.
pub fn chat_messages_to_md(messages: &[ChatMessage]) -> String {
    let mut res = String::new();

    for message in messages {
        if message.role == ChatRole::System {
            continue;
        }

        res.push_str(&format!("## {}\n\n", message.role.display_name()));
        res.push_str(&message.content);
        res.push_str("\n\n");
    }

    res
}

/// `conversation-YYYY-MM-DD-HH-MM-SS.<ext>`, stamped with the request time
pub fn export_filename(format: ExportFormat, at: DateTime<Local>) -> String {
    format!(
        "conversation-{}.{}",
        at.format("%Y-%m-%d-%H-%M-%S"),
        format.extension()
    )
}

/// Write an export into `dir` and return the file path
pub fn write_export(
    dir: &Path,
    messages: &[ChatMessage],
    format: ExportFormat,
    at: DateTime<Local>,
) -> Result<PathBuf> {
    let body = export_conversation(messages, format)?;

    fs::create_dir_all(dir)
        .with_context(|| format!("Failed to create export directory {}", dir.display()))?;

    let path = dir.join(export_filename(format, at));
    fs::write(&path, body)
        .with_context(|| format!("Failed to write {}", path.display()))?;

    tracing::info!(
        path = %path.display(),
        mime = format.mime_type(),
        messages = messages.len(),
        "exported conversation"
    );

    Ok(path)
}
