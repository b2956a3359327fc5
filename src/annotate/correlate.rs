//! Mapping base-version line numbers onto the current working copy.
//!
//! Lines proven identical are anchored with a longest-common-subsequence
//! pass. Every remaining base line is then resolved against the unclaimed
//! working lines in the gap after the previous match, accepting the first
//! candidate that looks like the same line edited in place. Anything left
//! over was deleted.

use parking_lot::Mutex;
use std::collections::hash_map::DefaultHasher;
use std::collections::{HashMap, HashSet};
use std::hash::{Hash, Hasher};
use std::sync::Arc;

/// Minimum shared-token ratio for a modified line to count as the same line.
pub const WORD_OVERLAP_THRESHOLD: f64 = 0.4;
/// Minimum shared prefix+suffix ratio for a modified line to count as the same line.
pub const AFFIX_RATIO_THRESHOLD: f64 = 0.5;

/// Partial function from base line numbers to working line numbers, both
/// 1-indexed. `None` means the base line no longer exists.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LineMapping {
    targets: Vec<Option<usize>>,
}

impl LineMapping {
    pub fn identity(len: usize) -> Self {
        Self {
            targets: (1..=len).map(Some).collect(),
        }
    }

    pub fn get(&self, base_line: usize) -> Option<usize> {
        base_line
            .checked_sub(1)
            .and_then(|idx| self.targets.get(idx).copied().flatten())
    }

    pub fn len(&self) -> usize {
        self.targets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.targets.is_empty()
    }

    /// `(base_line, working_line)` pairs in base order.
    pub fn iter(&self) -> impl Iterator<Item = (usize, Option<usize>)> + '_ {
        self.targets.iter().enumerate().map(|(idx, target)| (idx + 1, *target))
    }

    /// Working line → base line, for the lines that survived.
    pub fn inverse(&self) -> HashMap<usize, usize> {
        self.iter()
            .filter_map(|(base, working)| working.map(|w| (w, base)))
            .collect()
    }

    pub fn deleted_count(&self) -> usize {
        self.targets.iter().filter(|t| t.is_none()).count()
    }
}

/// Correlate `base` (attributed) lines with `working` (current) lines.
pub fn correlate<B, W>(base: &[B], working: &[W]) -> LineMapping
where
    B: AsRef<str>,
    W: AsRef<str>,
{
    if base.is_empty() {
        return LineMapping::default();
    }

    let anchors = lcs_anchors(base, working);
    let mut targets: Vec<Option<usize>> = vec![None; base.len()];
    let mut claimed = vec![false; working.len()];
    for &(b, w) in &anchors {
        targets[b] = Some(w);
        claimed[w] = true;
    }

    let last_base = base.len() - 1;
    let mut next_anchor = 0;
    let mut last_assigned: Option<usize> = None;

    for i in 0..base.len() {
        while next_anchor < anchors.len() && anchors[next_anchor].0 < i {
            next_anchor += 1;
        }

        if let Some(w) = targets[i] {
            last_assigned = Some(w);
            continue;
        }

        let prev = next_anchor.checked_sub(1).map(|idx| anchors[idx]);
        let next = anchors.get(next_anchor).copied();
        let cursor = last_assigned.map_or(0, |w| w + 1);
        let upper = next.map_or(working.len(), |(_, w)| w);

        let found = (cursor..upper).filter(|&j| !claimed[j]).find(|&j| {
            let (b_line, w_line) = (base[i].as_ref(), working[j].as_ref());
            if word_overlap(b_line, w_line) > WORD_OVERLAP_THRESHOLD
                || affix_ratio(b_line, w_line) > AFFIX_RATIO_THRESHOLD
            {
                return true;
            }

            let aligned_after = |(ab, aw): (usize, usize)| i - ab == j.wrapping_sub(aw);
            let aligned_before = |(ab, aw): (usize, usize)| ab - i == aw.wrapping_sub(j);
            match (prev, next) {
                (Some(p), Some(_)) => aligned_after(p),
                (None, Some(n)) => i == 0 && aligned_before(n),
                (Some(p), None) => i == last_base && aligned_after(p),
                (None, None) => false,
            }
        });

        if let Some(j) = found {
            targets[i] = Some(j);
            last_assigned = Some(j);
        }
    }

    LineMapping {
        targets: targets.into_iter().map(|t| t.map(|w| w + 1)).collect(),
    }
}

/// Ordered `(base_idx, working_idx)` pairs of one longest common subsequence.
///
/// Shared prefix and suffix are peeled off first so the quadratic table only
/// covers the edited middle.
fn lcs_anchors<B, W>(base: &[B], working: &[W]) -> Vec<(usize, usize)>
where
    B: AsRef<str>,
    W: AsRef<str>,
{
    let (m, n) = (base.len(), working.len());
    let eq = |i: usize, j: usize| base[i].as_ref() == working[j].as_ref();

    let mut prefix = 0;
    while prefix < m && prefix < n && eq(prefix, prefix) {
        prefix += 1;
    }
    let mut suffix = 0;
    while suffix < m - prefix && suffix < n - prefix && eq(m - 1 - suffix, n - 1 - suffix) {
        suffix += 1;
    }

    let mut anchors: Vec<(usize, usize)> = (0..prefix).map(|k| (k, k)).collect();

    let (rows, cols) = (m - prefix - suffix, n - prefix - suffix);
    if rows > 0 && cols > 0 {
        // table[i][j] = LCS length of base[prefix+i..] and working[prefix+j..]
        let width = cols + 1;
        let mut table = vec![0u32; (rows + 1) * width];
        for i in (0..rows).rev() {
            for j in (0..cols).rev() {
                table[i * width + j] = if eq(prefix + i, prefix + j) {
                    table[(i + 1) * width + j + 1] + 1
                } else {
                    table[(i + 1) * width + j].max(table[i * width + j + 1])
                };
            }
        }

        let (mut i, mut j) = (0, 0);
        while i < rows && j < cols {
            if eq(prefix + i, prefix + j) {
                anchors.push((prefix + i, prefix + j));
                i += 1;
                j += 1;
            } else if table[(i + 1) * width + j] >= table[i * width + j + 1] {
                i += 1;
            } else {
                j += 1;
            }
        }
    }

    anchors.extend((0..suffix).map(|k| (m - suffix + k, n - suffix + k)));
    anchors
}

fn tokens(line: &str) -> HashSet<String> {
    line.split(|c: char| !(c.is_alphanumeric() || c == '_'))
        .filter(|t| !t.is_empty())
        .map(str::to_lowercase)
        .collect()
}

/// Shared tokens over the token count of the smaller line.
fn word_overlap(a: &str, b: &str) -> f64 {
    let (ta, tb) = (tokens(a), tokens(b));
    let smaller = ta.len().min(tb.len());
    if smaller == 0 {
        return 0.0;
    }
    ta.intersection(&tb).count() as f64 / smaller as f64
}

/// Common prefix plus common suffix length over the shorter line's length.
fn affix_ratio(a: &str, b: &str) -> f64 {
    let (ca, cb): (Vec<char>, Vec<char>) = (a.chars().collect(), b.chars().collect());
    let shorter = ca.len().min(cb.len());
    if shorter == 0 {
        return 0.0;
    }

    let prefix = ca.iter().zip(&cb).take_while(|(x, y)| x == y).count();
    let suffix = ca
        .iter()
        .rev()
        .zip(cb.iter().rev())
        .take(shorter - prefix)
        .take_while(|(x, y)| x == y)
        .count();

    (prefix + suffix) as f64 / shorter as f64
}

pub fn content_hash<S: AsRef<str>>(lines: &[S]) -> u64 {
    let mut hasher = DefaultHasher::new();
    lines.len().hash(&mut hasher);
    for line in lines {
        line.as_ref().hash(&mut hasher);
    }
    hasher.finish()
}

struct CachedMapping {
    base_hash: u64,
    working_hash: u64,
    mapping: Arc<LineMapping>,
}

/// Last computed mapping per document, reused while neither side changes.
#[derive(Default)]
pub struct MappingCache {
    entries: Mutex<HashMap<String, CachedMapping>>,
}

impl MappingCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get_or_compute<B, W>(&self, key: &str, base: &[B], working: &[W]) -> Arc<LineMapping>
    where
        B: AsRef<str>,
        W: AsRef<str>,
    {
        let (base_hash, working_hash) = (content_hash(base), content_hash(working));
        if let Some(entry) = self.entries.lock().get(key) {
            if entry.base_hash == base_hash && entry.working_hash == working_hash {
                return Arc::clone(&entry.mapping);
            }
        }

        let start = std::time::Instant::now();
        let mapping = Arc::new(correlate(base, working));
        tracing::debug!(
            "Correlated {} ({} base → {} working lines, {} deleted) in {:?}",
            key,
            base.len(),
            working.len(),
            mapping.deleted_count(),
            start.elapsed()
        );

        self.entries.lock().insert(
            key.to_string(),
            CachedMapping {
                base_hash,
                working_hash,
                mapping: Arc::clone(&mapping),
            },
        );
        mapping
    }

    pub fn invalidate(&self, key: &str) {
        self.entries.lock().remove(key);
    }

    pub fn clear(&self) {
        self.entries.lock().clear();
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
