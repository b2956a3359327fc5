//! Attribution data as delivered by the version-control collaborator.
//!
//! One `Attribution` is fetched per document version and is immutable once
//! cached. Line numbers are 1-indexed against the base version, not the
//! working copy.

use serde::{Deserialize, Serialize};

/// Authorship record for a single base-version line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttributionLine {
    /// Line number in the base version (1-indexed)
    pub line_number: usize,
    /// Revision that last touched the line; `None` means uncommitted
    pub revision: Option<String>,
    /// Author of that revision; `None` means uncommitted
    pub author: Option<String>,
    /// RFC 3339 timestamp of the revision
    pub date: Option<String>,
}

impl AttributionLine {
    pub fn committed(line_number: usize, revision: &str, author: &str, date: Option<&str>) -> Self {
        Self {
            line_number,
            revision: Some(revision.to_string()),
            author: Some(author.to_string()),
            date: date.map(str::to_string),
        }
    }

    pub fn uncommitted(line_number: usize) -> Self {
        Self {
            line_number,
            revision: None,
            author: None,
            date: None,
        }
    }

    pub fn is_uncommitted(&self) -> bool {
        self.revision.is_none() || self.author.is_none()
    }
}

/// Everything needed to annotate one document: per-line attribution plus the
/// base-version text it was computed against.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attribution {
    pub lines: Vec<AttributionLine>,
    pub base_lines: Vec<String>,
}

impl Attribution {
    pub fn new(lines: Vec<AttributionLine>, base_lines: Vec<String>) -> Self {
        Self { lines, base_lines }
    }

    /// Attribution for a 1-indexed base line, if the collaborator reported one.
    pub fn line(&self, line_number: usize) -> Option<&AttributionLine> {
        // Collaborators usually return lines densely in order; fall back to a scan.
        match self.lines.get(line_number.wrapping_sub(1)) {
            Some(line) if line.line_number == line_number => Some(line),
            _ => self.lines.iter().find(|l| l.line_number == line_number),
        }
    }

    /// Distinct committed revisions in first-seen order.
    pub fn distinct_revisions(&self) -> Vec<String> {
        let mut seen = std::collections::HashSet::new();
        self.lines
            .iter()
            .filter_map(|l| l.revision.as_deref())
            .filter(|rev| seen.insert(*rev))
            .map(str::to_string)
            .collect()
    }
}
