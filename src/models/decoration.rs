//! Rendered decorations and the signals handed to the host UI.
//!
//! - `LineDecoration`: one annotated working-copy line
//! - `DecorationSet`: everything rendered for one document in one pass
//! - `RenderPhase`: per-document progress through the fetch pipeline
//! - `Notice`: one-shot user-facing notification

use serde::{Deserialize, Serialize};

use crate::error::ErrorKind;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineDecoration {
    /// Working-copy line number (1-indexed)
    pub line: usize,
    pub revision: Option<String>,
    pub author: Option<String>,
    /// Hex color, `#rrggbb`
    pub color: String,
    pub gutter_text: Option<String>,
    pub gutter_icon: bool,
    pub inline_text: Option<String>,
    /// Untruncated commit message, when known
    pub hover: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DecorationSet {
    pub document: String,
    pub lines: Vec<LineDecoration>,
    /// Whether commit messages were resolved for this pass
    pub with_messages: bool,
}

impl DecorationSet {
    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    pub fn line(&self, line: usize) -> Option<&LineDecoration> {
        self.lines.iter().find(|d| d.line == line)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RenderPhase {
    #[default]
    Idle,
    Fetching,
    RenderedWithoutMessages,
    FetchingMessages,
    RenderedWithMessages,
    Aborted,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Notice {
    /// A collaborator failure the user can act on
    FetchFailed {
        document: String,
        error: ErrorKind,
        message: String,
        hint: Option<String>,
    },
    /// The document exceeds the configured line threshold
    LargeFile {
        document: String,
        line_count: usize,
        threshold: usize,
    },
    /// The same document keeps failing internally
    RepeatedFailure { document: String, failures: u32 },
}

impl Notice {
    pub fn document(&self) -> &str {
        match self {
            Notice::FetchFailed { document, .. }
            | Notice::LargeFile { document, .. }
            | Notice::RepeatedFailure { document, .. } => document,
        }
    }
}
