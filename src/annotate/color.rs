//! Deterministic revision → color assignment.
//!
//! The five most recent distinct revisions in a document get fixed,
//! clearly different hues. Older revisions share an 8-step blue→purple
//! gradient by age rank. Lightness follows the editor theme.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::models::AttributionLine;

const CATEGORICAL_HUES: [f64; 5] = [0.0, 30.0, 55.0, 120.0, 215.0];
const GRADIENT_START_HUE: f64 = 200.0;
const GRADIENT_END_HUE: f64 = 280.0;
const GRADIENT_BUCKETS: f64 = 8.0;
const FALLBACK_HUE: f64 = 180.0;
const SATURATION: f64 = 0.65;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ThemeKind {
    #[default]
    Dark,
    Light,
}

impl ThemeKind {
    /// Light themes get darker annotation colors and vice versa.
    fn lightness(self) -> f64 {
        match self {
            ThemeKind::Light => 0.40,
            ThemeKind::Dark => 0.65,
        }
    }
}

/// Distinct revisions of one document, newest first.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RevisionRange {
    pub newest: Option<String>,
    pub oldest: Option<String>,
    pub descending: Vec<String>,
}

impl RevisionRange {
    /// Rank revisions newest-first: numerically when every revision is a
    /// number, otherwise by the latest date seen for each revision.
    pub fn from_lines(lines: &[AttributionLine]) -> Self {
        let mut latest: HashMap<&str, Option<i64>> = HashMap::new();
        for line in lines {
            let Some(revision) = line.revision.as_deref() else {
                continue;
            };
            let stamp = line
                .date
                .as_deref()
                .and_then(|d| chrono::DateTime::parse_from_rfc3339(d).ok())
                .map(|d| d.timestamp());
            let slot = latest.entry(revision).or_insert(None);
            *slot = (*slot).max(stamp);
        }

        let mut descending: Vec<&str> = latest.keys().copied().collect();
        if descending.iter().all(|r| r.parse::<u64>().is_ok()) {
            descending.sort_by_key(|r| std::cmp::Reverse(r.parse::<u64>().unwrap_or(0)));
        } else {
            descending.sort_by(|a, b| latest[b].cmp(&latest[a]).then_with(|| b.cmp(a)));
        }

        let descending: Vec<String> = descending.into_iter().map(str::to_string).collect();
        Self {
            newest: descending.first().cloned(),
            oldest: descending.last().cloned(),
            descending,
        }
    }

    pub fn rank(&self, revision: &str) -> Option<usize> {
        self.descending.iter().position(|r| r == revision)
    }

    pub fn len(&self) -> usize {
        self.descending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.descending.is_empty()
    }
}

/// Hue for a revision, or `None` when it cannot be ranked.
fn hue_for(revision: Option<&str>, range: &RevisionRange) -> Option<f64> {
    let rank = range.rank(revision?)?;
    if let Some(hue) = CATEGORICAL_HUES.get(rank) {
        return Some(*hue);
    }

    let older_count = range.len() - CATEGORICAL_HUES.len();
    if older_count <= 1 {
        return Some(GRADIENT_START_HUE);
    }

    let normalized = (rank - CATEGORICAL_HUES.len()) as f64 / (older_count - 1) as f64;
    let bucket = (normalized * (GRADIENT_BUCKETS - 0.01)).floor() / (GRADIENT_BUCKETS - 1.0);
    Some(GRADIENT_START_HUE + bucket * (GRADIENT_END_HUE - GRADIENT_START_HUE))
}

/// Color for `revision` without memoization.
pub fn encode(revision: Option<&str>, range: &RevisionRange, theme: ThemeKind) -> String {
    let hue = hue_for(revision, range).unwrap_or(FALLBACK_HUE);
    hsl_to_hex(hue, SATURATION, theme.lightness())
}

/// Sector-based HSL → RGB, formatted as `#rrggbb`.
pub fn hsl_to_hex(hue: f64, saturation: f64, lightness: f64) -> String {
    let chroma = (1.0 - (2.0 * lightness - 1.0).abs()) * saturation;
    let sector = hue.rem_euclid(360.0) / 60.0;
    let x = chroma * (1.0 - (sector % 2.0 - 1.0).abs());

    let (r, g, b) = match sector as u32 {
        0 => (chroma, x, 0.0),
        1 => (x, chroma, 0.0),
        2 => (0.0, chroma, x),
        3 => (0.0, x, chroma),
        4 => (x, 0.0, chroma),
        _ => (chroma, 0.0, x),
    };

    let m = lightness - chroma / 2.0;
    let channel = |v: f64| ((v + m) * 255.0).round().clamp(0.0, 255.0) as u8;
    format!("#{:02x}{:02x}{:02x}", channel(r), channel(g), channel(b))
}

/// Per-session memo of revision colors, keyed by document and revision.
#[derive(Debug, Default)]
pub struct RevisionColorEncoder {
    theme: ThemeKind,
    memo: HashMap<(String, String), String>,
}

impl RevisionColorEncoder {
    pub fn new(theme: ThemeKind) -> Self {
        Self {
            theme,
            memo: HashMap::new(),
        }
    }

    pub fn theme(&self) -> ThemeKind {
        self.theme
    }

    pub fn color_for(&mut self, document: &str, revision: Option<&str>, range: &RevisionRange) -> String {
        let Some(rev) = revision else {
            return encode(None, range, self.theme);
        };

        let key = (document.to_string(), rev.to_string());
        if let Some(color) = self.memo.get(&key) {
            return color.clone();
        }

        let color = encode(revision, range, self.theme);
        self.memo.insert(key, color.clone());
        color
    }

    pub fn set_theme(&mut self, theme: ThemeKind) {
        if self.theme != theme {
            self.theme = theme;
            self.memo.clear();
        }
    }

    pub fn clear_document(&mut self, document: &str) {
        self.memo.retain(|(doc, _), _| doc != document);
    }

    pub fn clear(&mut self) {
        self.memo.clear();
    }

    pub fn len(&self) -> usize {
        self.memo.len()
    }

    pub fn is_empty(&self) -> bool {
        self.memo.is_empty()
    }
}
