//! Turns correlated attribution into per-line decorations.
//!
//! The engine owns the rendering-session state: compiled templates and the
//! revision color memo. Both are reset on configuration change; colors are
//! also reset on theme change.

use chrono::DateTime;
use parking_lot::Mutex;
use std::collections::HashMap;

use crate::annotate::color::{RevisionColorEncoder, RevisionRange, ThemeKind};
use crate::annotate::correlate::LineMapping;
use crate::annotate::template::{TemplateCompiler, TemplateFields};
use crate::config::{AnnotationConfig, DateFormat};
use crate::git::format_relative_time;
use crate::models::{Attribution, AttributionLine, DecorationSet, LineDecoration};

const UNCOMMITTED_LABEL: &str = "Uncommitted";
const ELLIPSIS: char = '…';

/// Everything one render pass needs.
pub struct RenderInput<'a> {
    pub document: &'a str,
    pub attribution: &'a Attribution,
    /// `None` when the working copy matches the base version
    pub mapping: Option<&'a LineMapping>,
    pub messages: &'a HashMap<String, String>,
    pub cursor_line: Option<usize>,
    pub with_messages: bool,
}

pub struct RenderingEngine {
    templates: TemplateCompiler,
    colors: Mutex<RevisionColorEncoder>,
}

impl RenderingEngine {
    pub fn new(theme: ThemeKind) -> Self {
        Self {
            templates: TemplateCompiler::new(),
            colors: Mutex::new(RevisionColorEncoder::new(theme)),
        }
    }

    pub fn templates(&self) -> &TemplateCompiler {
        &self.templates
    }

    pub fn theme(&self) -> ThemeKind {
        self.colors.lock().theme()
    }

    pub fn set_theme(&self, theme: ThemeKind) {
        self.colors.lock().set_theme(theme);
    }

    /// Drop templates and colors after a configuration change.
    pub fn reset(&self) {
        self.templates.clear();
        self.colors.lock().clear();
    }

    pub fn forget_document(&self, document: &str) {
        self.colors.lock().clear_document(document);
    }

    pub fn render(&self, config: &AnnotationConfig, input: &RenderInput<'_>) -> DecorationSet {
        let range = RevisionRange::from_lines(&input.attribution.lines);
        let gutter_template = self.templates.compile(&config.gutter.template);
        let inline_template = self.templates.compile(&config.inline.template);

        let mut lines = Vec::with_capacity(input.attribution.lines.len());
        let mut colors = self.colors.lock();

        for line in &input.attribution.lines {
            let working_line = match input.mapping {
                Some(mapping) => mapping.get(line.line_number),
                None => Some(line.line_number),
            };
            // Deleted in the working copy.
            let Some(working_line) = working_line else {
                continue;
            };

            let color = colors.color_for(input.document, line.revision.as_deref(), &range);
            let message = line
                .revision
                .as_deref()
                .and_then(|rev| input.messages.get(rev));

            let show_inline = config.inline.enabled
                && (!config.inline.current_line_only || input.cursor_line == Some(working_line));

            let (gutter_text, inline_text) = if line.is_uncommitted() {
                (
                    config.gutter.text.then(|| UNCOMMITTED_LABEL.to_string()),
                    show_inline.then(|| format!("{} changes", UNCOMMITTED_LABEL)),
                )
            } else {
                let mut fields = line_fields(line, config.date_format);
                fields.insert("message", message.cloned().unwrap_or_default());
                let gutter = config.gutter.text.then(|| gutter_template.interpolate(&fields));

                let inline = show_inline.then(|| {
                    let inline_message = if config.inline.show_message {
                        truncate(message.map(String::as_str).unwrap_or(""), config.inline.max_message_length)
                    } else {
                        String::new()
                    };
                    fields.insert("message", inline_message);
                    inline_template.interpolate(&fields)
                });
                (gutter, inline)
            };

            lines.push(LineDecoration {
                line: working_line,
                revision: line.revision.clone(),
                author: line.author.clone(),
                color,
                gutter_text,
                gutter_icon: config.gutter.icon,
                inline_text,
                hover: message.cloned(),
            });
        }

        lines.sort_by_key(|d| d.line);
        DecorationSet {
            document: input.document.to_string(),
            lines,
            with_messages: input.with_messages,
        }
    }
}

fn line_fields(line: &AttributionLine, date_format: DateFormat) -> TemplateFields<'static> {
    let mut fields = TemplateFields::new();
    if let Some(revision) = line.revision.as_deref() {
        fields.insert("revision", short_revision(revision).to_string());
    }
    if let Some(author) = line.author.as_deref() {
        fields.insert("author", author.to_string());
    }
    if let Some(date) = line.date.as_deref() {
        fields.insert("date", format_date(date, date_format));
    }
    fields
}

/// Abbreviate long hash-style revisions; numeric revisions pass through.
pub fn short_revision(revision: &str) -> &str {
    if revision.len() > 12 && revision.chars().all(|c| c.is_ascii_hexdigit()) {
        &revision[..8]
    } else {
        revision
    }
}

pub fn format_date(date: &str, format: DateFormat) -> String {
    match DateTime::parse_from_rfc3339(date) {
        Ok(parsed) => match format {
            DateFormat::Relative => format_relative_time(parsed.timestamp()),
            DateFormat::Absolute => parsed.format("%Y-%m-%d %H:%M").to_string(),
        },
        Err(_) => date.to_string(),
    }
}

/// Cut to `max` characters including a trailing ellipsis; `0` means no limit.
pub fn truncate(message: &str, max: usize) -> String {
    if max == 0 || message.chars().count() <= max {
        return message.to_string();
    }
    let mut out: String = message.chars().take(max.saturating_sub(1)).collect();
    out.push(ELLIPSIS);
    out
}
