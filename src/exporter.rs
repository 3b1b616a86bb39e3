use clap::ValueEnum;
use serde_json::{Map, Value};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use crate::catalog::DecodedRecord;
use crate::error::ExportError;
use crate::metadata::{TRANSCRIPT_TIME_FORMAT, coerce_timestamp, format_timestamp};

/// How a record is turned into text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum RenderMode {
    /// Decoded text exactly as stored.
    Raw,
    /// Indented JSON with sorted keys; non-JSON text is shown as is.
    #[default]
    Pretty,
    /// `[ROLE]` / content blocks for chat records.
    Transcript,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ExportFormat {
    Json,
    Text,
}

impl ExportFormat {
    pub fn extension(self) -> &'static str {
        match self {
            ExportFormat::Json => "json",
            ExportFormat::Text => "txt",
        }
    }
}

/// What ends up in an export file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExportPayload {
    Text(String),
    Bytes(Vec<u8>),
}

impl ExportPayload {
    pub fn as_bytes(&self) -> &[u8] {
        match self {
            ExportPayload::Text(text) => text.as_bytes(),
            ExportPayload::Bytes(bytes) => bytes,
        }
    }
}

pub fn render(record: &DecodedRecord, mode: RenderMode) -> String {
    match mode {
        RenderMode::Raw => record.decoded_text.clone(),
        RenderMode::Pretty => render_pretty(record),
        RenderMode::Transcript => record
            .structured
            .as_ref()
            .and_then(render_transcript)
            .unwrap_or_else(|| render_pretty(record)),
    }
}

fn render_pretty(record: &DecodedRecord) -> String {
    match &record.structured {
        Some(value) => {
            serde_json::to_string_pretty(value).unwrap_or_else(|_| record.decoded_text.clone())
        }
        None => record.decoded_text.clone(),
    }
}

/// `None` when the value has no `messages` array with at least one role/content message.
fn render_transcript(structured: &Value) -> Option<String> {
    let obj = structured.as_object()?;
    let blocks: Vec<String> = obj
        .get("messages")?
        .as_array()?
        .iter()
        .filter_map(Value::as_object)
        .filter(|msg| msg.contains_key("role") && msg.contains_key("content"))
        .map(message_block)
        .collect();
    if blocks.is_empty() {
        return None;
    }

    let mut parts = Vec::with_capacity(blocks.len() + 1);
    if let Some(Value::String(title)) = obj.get("title")
        && !title.is_empty()
    {
        parts.push(format!("Title: {title}\n"));
    }
    parts.extend(blocks);
    Some(parts.join("\n"))
}

fn message_block(msg: &Map<String, Value>) -> String {
    let role = msg.get("role").map(plain_text).unwrap_or_default().to_uppercase();
    let content = msg.get("content").map(plain_text).unwrap_or_default();
    let time = msg
        .get("timestamp")
        .and_then(coerce_timestamp)
        .and_then(|ts| format_timestamp(ts, TRANSCRIPT_TIME_FORMAT))
        .map(|t| format!(" ({t})"))
        .unwrap_or_default();
    format!("[{role}{time}]\n{content}\n\n")
}

/// Strings without their JSON quotes, anything else as compact JSON.
fn plain_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Produce the bytes for an export sink.
///
/// JSON exports need text. Text exports of a binary record carry its raw bytes.
pub fn export(record: &DecodedRecord, format: ExportFormat) -> Result<ExportPayload, ExportError> {
    match (format, &record.binary) {
        (ExportFormat::Json, Some(_)) => Err(ExportError::BinaryAsJson),
        (ExportFormat::Json, None) => Ok(ExportPayload::Text(render(record, RenderMode::Pretty))),
        (ExportFormat::Text, Some(bytes)) => Ok(ExportPayload::Bytes(bytes.clone())),
        (ExportFormat::Text, None) => Ok(ExportPayload::Text(render(
            record,
            RenderMode::Transcript,
        ))),
    }
}

/// `cursor_chat_<slug>.<ext>`, safe to use as a file name whatever the key contains.
pub fn default_file_name(id: &str, format: ExportFormat) -> String {
    let raw_slug = slug::slugify(id);
    // slug output is ASCII-only, so byte == char
    let slug = raw_slug[..raw_slug.len().min(60)].trim_end_matches('-');
    let stem = if slug.is_empty() { "record" } else { slug };
    format!("cursor_chat_{}.{}", stem, format.extension())
}

pub fn write_export(path: &Path, payload: &ExportPayload) -> Result<(), ExportError> {
    let to_error = |source: std::io::Error| ExportError::Write {
        path: path.to_path_buf(),
        source,
    };
    let file = File::create(path).map_err(to_error)?;
    let mut writer = BufWriter::new(file);
    writer.write_all(payload.as_bytes()).map_err(to_error)?;
    writer.flush().map_err(to_error)
}
