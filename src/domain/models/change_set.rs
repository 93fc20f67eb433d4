//! Changed-line sets derived from a zero-context unified diff.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::OnceLock;

/// Repository-relative file path -> 1-based line numbers changed in the working revision.
///
/// Files without changed lines have no entry at all; an empty set is never stored.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChangeSet {
    files: BTreeMap<String, BTreeSet<u32>>,
}

fn hunk_header() -> &'static Regex {
    static HUNK: OnceLock<Regex> = OnceLock::new();
    HUNK.get_or_init(|| {
        Regex::new(r"^@@ -\d+(?:,(\d+))? \+(\d+)(?:,(\d+))? @@").expect("hunk header pattern is valid")
    })
}

impl ChangeSet {
    /// Create an empty change set
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse `git diff --unified=0` output.
    ///
    /// `+++` markers select the current file (`/dev/null` clears it), hunk headers
    /// add `[start, start + count)` with `count` defaulting to 1. The body lines a
    /// header announces are skipped, so an added line reading `++ x` is not taken
    /// for a marker. Lines that are neither are ignored, so unrelated diff noise
    /// never fails the parse.
    pub fn from_unified_diff(diff: &str) -> Self {
        let mut change_set = Self::new();
        let mut current_file: Option<String> = None;
        let mut body = HunkBody::default();

        for line in diff.lines() {
            if body.consume(line) {
                continue;
            }
            body = HunkBody::default();

            if let Some(target) = line.strip_prefix("+++ ") {
                current_file = parse_target_path(target);
                continue;
            }

            let Some(captures) = hunk_header().captures(line) else {
                continue;
            };
            let count_at = |group: usize| {
                captures
                    .get(group)
                    .map_or(Some(1), |m| m.as_str().parse::<u32>().ok())
            };
            let start = captures
                .get(2)
                .and_then(|m| m.as_str().parse::<u32>().ok());
            let (Some(old_count), Some(new_count)) = (count_at(1), count_at(3)) else {
                continue;
            };
            body = HunkBody {
                removed: old_count,
                added: new_count,
            };

            if let (Some(file), Some(start)) = (current_file.as_ref(), start) {
                change_set.add_range(file, start, new_count);
            }
        }

        change_set
    }

    /// Add `count` consecutive lines starting at `start`
    pub fn add_range(&mut self, file: &str, start: u32, count: u32) {
        if count == 0 {
            return;
        }
        let end = start.saturating_add(count);
        self.files
            .entry(file.to_string())
            .or_default()
            .extend(start..end);
    }

    /// Add a single changed line
    pub fn add_line(&mut self, file: &str, line: u32) {
        self.add_range(file, line, 1);
    }

    /// Changed lines for a repository-relative path
    pub fn lines(&self, file: &str) -> Option<&BTreeSet<u32>> {
        self.files.get(file)
    }

    /// Iterate over `(path, lines)` in path order
    pub fn iter(&self) -> impl Iterator<Item = (&String, &BTreeSet<u32>)> {
        self.files.iter()
    }

    /// Changed files
    pub fn files(&self) -> impl Iterator<Item = &String> {
        self.files.keys()
    }

    /// Changed files with the given extension (without the dot, case-insensitive)
    pub fn files_with_extension<'a>(&'a self, extension: &'a str) -> impl Iterator<Item = &'a String> {
        self.files.keys().filter(move |path| {
            std::path::Path::new(path.as_str())
                .extension()
                .and_then(|ext| ext.to_str())
                .is_some_and(|ext| ext.eq_ignore_ascii_case(extension))
        })
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    /// Number of files with changes
    pub fn file_count(&self) -> usize {
        self.files.len()
    }

    /// Total changed lines across all files
    pub fn total_lines(&self) -> usize {
        self.files.values().map(BTreeSet::len).sum()
    }

    /// Re-key by bare file name, as the coverage filter matches on names only.
    ///
    /// Two paths sharing a file name have their line sets unioned.
    pub fn by_file_name(&self) -> BTreeMap<String, BTreeSet<u32>> {
        let mut by_name: BTreeMap<String, BTreeSet<u32>> = BTreeMap::new();
        for (path, lines) in &self.files {
            by_name
                .entry(file_name_of(path).to_string())
                .or_default()
                .extend(lines.iter().copied());
        }
        by_name
    }
}

/// Last path component, splitting on both `/` and `\`.
pub fn file_name_of(path: &str) -> &str {
    path.rsplit(['/', '\\']).next().unwrap_or(path)
}

/// Body lines still expected after a hunk header
#[derive(Debug, Default)]
struct HunkBody {
    removed: u32,
    added: u32,
}

impl HunkBody {
    /// True when `line` belongs to the current hunk
    fn consume(&mut self, line: &str) -> bool {
        if self.removed == 0 && self.added == 0 {
            return false;
        }
        match line.as_bytes().first() {
            Some(b'+') if self.added > 0 => self.added -= 1,
            Some(b'-') if self.removed > 0 => self.removed -= 1,
            Some(b' ') if self.added > 0 && self.removed > 0 => {
                self.added -= 1;
                self.removed -= 1;
            }
            // "\ No newline at end of file"
            Some(b'\\') => {}
            _ => return false,
        }
        true
    }
}

fn parse_target_path(raw: &str) -> Option<String> {
    let without_suffix = raw.split('\t').next().unwrap_or(raw).trim_end();
    let unquoted = without_suffix
        .strip_prefix('"')
        .and_then(|s| s.strip_suffix('"'))
        .unwrap_or(without_suffix);

    if unquoted == "/dev/null" || unquoted.is_empty() {
        return None;
    }

    let path = unquoted.strip_prefix("b/").unwrap_or(unquoted);
    Some(path.to_string())
}
