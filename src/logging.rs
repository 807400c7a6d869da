use owo_colors::OwoColorize;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use time::{format_description::FormatItem, macros::format_description, OffsetDateTime};
use tracing::{Level, Subscriber};
use tracing_subscriber::{
    fmt::{format::Writer, FmtContext, FormatEvent, FormatFields},
    registry::LookupSpan,
};

use crate::config::ProviderKind;
use crate::transcription::{TranscriptionOutcome, TranscriptionRequest};

const RECORD_TARGET: &str = "notescribe::transcription";
const PREVIEW_CHAR_LIMIT: usize = 160;
const TARGET_GUTTER_WIDTH: usize = 28;
const TIMESTAMP_FORMAT: &[FormatItem<'_>] =
    format_description!("[year]-[month]-[day] [hour]:[minute]:[second]");

/// Summary of one finished request, rendered as a box under the log line.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TranscriptionRecord {
    pub provider: String,
    pub file: String,
    pub mime_type: Option<String>,
    /// Size of the uploaded or decoded audio; absent when the file was never read.
    #[serde(default)]
    pub audio_bytes: Option<u64>,
    pub outcome: String,
    pub detail: Option<String>,
    pub elapsed_ms: u64,
}

impl TranscriptionRecord {
    pub fn new(
        provider: ProviderKind,
        request: &TranscriptionRequest,
        outcome: &TranscriptionOutcome,
        audio_bytes: Option<u64>,
        elapsed: Duration,
    ) -> Self {
        let detail = match outcome {
            TranscriptionOutcome::Success(text) => Some(text.clone()),
            TranscriptionOutcome::Failed(detail) => Some(detail.clone()),
            TranscriptionOutcome::Empty | TranscriptionOutcome::RateLimited => None,
        };

        Self {
            provider: provider.as_str().to_string(),
            file: request.file_path().display().to_string(),
            mime_type: request.mime_type().map(str::to_string),
            audio_bytes,
            outcome: outcome.kind().to_string(),
            detail,
            elapsed_ms: elapsed.as_millis() as u64,
        }
    }

    pub fn render_pretty(&self, use_color: bool) -> String {
        let mut lines = Vec::new();
        lines.push(format!(
            "┌─ Transcription ({}, {} ms)",
            self.provider, self.elapsed_ms
        ));
        push_body_line(&mut lines, format!("FILE: {}", self.file));
        if let Some(mime) = &self.mime_type {
            push_body_line(&mut lines, format!("MIME: {}", mime));
        }
        if let Some(bytes) = self.audio_bytes {
            push_body_line(&mut lines, format!("SIZE: {} bytes", bytes));
        }
        push_body_line(
            &mut lines,
            format!("RESULT: {}", stylize_outcome(&self.outcome, use_color)),
        );
        if let Some(detail) = &self.detail {
            push_body_line(
                &mut lines,
                format!("TEXT: {}", preview_value(detail, use_color)),
            );
        }
        lines.push("└─".to_string());

        lines.join("\n")
    }
}

fn stylize_outcome(outcome: &str, use_color: bool) -> String {
    if !use_color {
        return outcome.to_string();
    }

    match outcome {
        "success" => outcome.green().to_string(),
        "empty" => outcome.dimmed().to_string(),
        "rate_limited" => outcome.yellow().to_string(),
        _ => outcome.red().to_string(),
    }
}

fn escape_fragment(value: &str) -> String {
    let mut rendered = String::with_capacity(value.len());
    for ch in value.chars() {
        match ch {
            '\n' => rendered.push('⏎'),
            '\t' => rendered.push('⇥'),
            '\r' => rendered.push('␍'),
            c if c.is_control() => rendered.push_str(&format!("\\u{{{:04X}}}", c as u32)),
            c => rendered.push(c),
        }
    }
    rendered
}

fn push_body_line(lines: &mut Vec<String>, content: String) {
    lines.push(format!("│ {}", content));
}

fn preview_value(value: &str, use_color: bool) -> String {
    let mut preview: String = value.chars().take(PREVIEW_CHAR_LIMIT).collect();
    if value.chars().count() > PREVIEW_CHAR_LIMIT {
        preview.push_str("...");
    }
    let escaped = escape_fragment(&preview);
    if use_color {
        escaped.cyan().to_string()
    } else {
        escaped
    }
}

#[derive(Debug, Default)]
struct RecordVisitor {
    record_json: Option<String>,
}

impl tracing::field::Visit for RecordVisitor {
    fn record_str(&mut self, field: &tracing::field::Field, value: &str) {
        if field.name() == "record_json" {
            self.record_json = Some(value.to_string());
        }
    }

    fn record_debug(&mut self, field: &tracing::field::Field, value: &dyn fmt::Debug) {
        if field.name() == "record_json" && self.record_json.is_none() {
            self.record_json = Some(format!("{value:?}"));
        }
    }
}

/// `timestamp level target: message`, plus the boxed summary for
/// transcription records.
#[derive(Default)]
pub struct NotescribeFormatter;

impl NotescribeFormatter {
    pub fn new() -> Self {
        Self
    }
}

impl<S, N> FormatEvent<S, N> for NotescribeFormatter
where
    S: Subscriber + for<'lookup> LookupSpan<'lookup>,
    N: for<'writer> FormatFields<'writer> + 'static,
{
    fn format_event(
        &self,
        ctx: &FmtContext<'_, S, N>,
        mut writer: Writer<'_>,
        event: &tracing::Event<'_>,
    ) -> fmt::Result {
        let metadata = event.metadata();
        let use_color = writer.has_ansi_escapes();

        write_prefix(&mut writer, metadata, use_color)?;

        if metadata.target() == RECORD_TARGET {
            let mut visitor = RecordVisitor::default();
            event.record(&mut visitor);
            writer.write_str("transcription finished\n")?;
            if let Some(json) = visitor.record_json {
                match serde_json::from_str::<TranscriptionRecord>(&json) {
                    Ok(record) => {
                        writer.write_str(&record.render_pretty(use_color))?;
                        writer.write_char('\n')?;
                    }
                    Err(err) => {
                        writer.write_str("│ Failed to render transcription record: ")?;
                        writer.write_str(&err.to_string())?;
                        writer.write_char('\n')?;
                    }
                }
            }
            return Ok(());
        }

        ctx.format_fields(writer.by_ref(), event)?;
        writer.write_char('\n')
    }
}

pub fn record_transcription(record: TranscriptionRecord) {
    if !tracing::enabled!(target: RECORD_TARGET, Level::DEBUG) {
        return;
    }
    if let Ok(json) = serde_json::to_string(&record) {
        tracing::event!(
            target: RECORD_TARGET,
            Level::DEBUG,
            record_json = json.as_str(),
            outcome = record.outcome.as_str(),
            "transcription finished"
        );
    }
}

fn write_prefix(
    writer: &mut Writer<'_>,
    metadata: &tracing::Metadata<'_>,
    use_color: bool,
) -> fmt::Result {
    let timestamp_plain = format_timestamp();
    let timestamp_display = if use_color {
        timestamp_plain.as_str().dimmed().to_string()
    } else {
        timestamp_plain
    };
    writer.write_str(&timestamp_display)?;
    writer.write_char(' ')?;

    let level_plain = format!("{:>5}", metadata.level());
    let level_display = if use_color {
        color_level(&level_plain, *metadata.level())
    } else {
        level_plain
    };
    writer.write_str(&level_display)?;
    writer.write_char(' ')?;

    let target_text = format!("{:<width$}", metadata.target(), width = TARGET_GUTTER_WIDTH);
    let target_text = if use_color {
        target_text.blue().dimmed().to_string()
    } else {
        target_text
    };
    writer.write_str(&target_text)?;
    writer.write_str(": ")?;

    Ok(())
}

fn color_level(text: &str, level: Level) -> String {
    match level {
        Level::ERROR => text.red().bold().to_string(),
        Level::WARN => text.yellow().bold().to_string(),
        Level::INFO => text.green().to_string(),
        Level::DEBUG => text.cyan().to_string(),
        Level::TRACE => text.dimmed().to_string(),
    }
}

fn format_timestamp() -> String {
    let now = OffsetDateTime::now_local().unwrap_or_else(|_| OffsetDateTime::now_utc());
    now.format(&TIMESTAMP_FORMAT)
        .unwrap_or_else(|_| "0000-00-00 00:00:00".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_captures_outcome_and_text() {
        let request = TranscriptionRequest::new("/tmp/voice.ogg").with_mime_type("audio/ogg");
        let record = TranscriptionRecord::new(
            ProviderKind::Cloud,
            &request,
            &TranscriptionOutcome::Success("hello\nworld".into()),
            Some(48_000),
            Duration::from_millis(1234),
        );

        assert_eq!(record.outcome, "success");
        assert_eq!(record.elapsed_ms, 1234);

        let rendered = record.render_pretty(false);
        assert!(rendered.starts_with("┌─ Transcription (cloud, 1234 ms)"));
        assert!(rendered.contains("│ FILE: /tmp/voice.ogg"));
        assert!(rendered.contains("│ MIME: audio/ogg"));
        assert!(rendered.contains("│ SIZE: 48000 bytes"));
        assert!(rendered.contains("│ TEXT: hello⏎world"));
        assert!(rendered.ends_with("└─"));
    }

    #[test]
    fn long_detail_is_truncated() {
        let request = TranscriptionRequest::new("a.wav");
        let record = TranscriptionRecord::new(
            ProviderKind::Local,
            &request,
            &TranscriptionOutcome::Failed("x".repeat(500)),
            None,
            Duration::ZERO,
        );
        let rendered = record.render_pretty(false);
        assert!(rendered.contains(&format!("TEXT: {}...", "x".repeat(PREVIEW_CHAR_LIMIT))));
        assert!(!rendered.contains("MIME"));
        assert!(!rendered.contains("SIZE"));
    }

    #[test]
    fn record_survives_json_round_trip() {
        let request = TranscriptionRequest::new("a.wav");
        let record = TranscriptionRecord::new(
            ProviderKind::Local,
            &request,
            &TranscriptionOutcome::RateLimited,
            Some(3),
            Duration::from_millis(5),
        );
        let json = serde_json::to_string(&record).unwrap();
        let parsed: TranscriptionRecord = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, record);
    }
}
