//! Cobertura transforms
//!
//! Filtering a report down to the lines of a [`ChangeSet`] and reducing a
//! report to a [`CoverageSummary`]. The pure functions work on the
//! [`Element`] tree; the `*_file` wrappers add disk I/O and degrade to `None`
//! with a warning.
//!
//! Layout relied upon:
//!
//! ```text
//! coverage[line-rate, branch-rate, lines-covered, lines-valid, ...]
//!   packages/package[line-rate, branch-rate]
//!     classes/class[filename, line-rate, branch-rate]
//!       methods/method/lines/line[number, hits, branch, condition-coverage]
//!       lines/line[number, hits, branch, condition-coverage]
//! ```

use std::collections::{BTreeMap, BTreeSet};
use std::ops::AddAssign;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use crate::domain::models::{file_name_of, ChangeSet, CoverageSummary, FilterOutcome};
use crate::infrastructure::xml::{self, Element};

const ROOT: &str = "coverage";

/// Line and branch counts behind a set of `<line>` entries
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LineTally {
    pub lines_valid: u64,
    pub lines_covered: u64,
    pub branches_valid: u64,
    pub branches_covered: u64,
}

impl LineTally {
    /// Tally the `<line>` children of a `<lines>` element
    fn of_lines(lines: Option<&Element>) -> Self {
        let mut tally = Self::default();
        for line in lines.into_iter().flat_map(|l| l.children_named("line")) {
            tally.lines_valid += 1;
            if line.attr_parsed::<u64>("hits").unwrap_or(0) > 0 {
                tally.lines_covered += 1;
            }
            let is_branch = line
                .attr("branch")
                .is_some_and(|b| b.eq_ignore_ascii_case("true"));
            if is_branch {
                if let Some((covered, valid)) = line.attr("condition-coverage").and_then(parse_condition_coverage) {
                    tally.branches_covered += covered;
                    tally.branches_valid += valid;
                }
            }
        }
        tally
    }

    fn line_rate(&self) -> f64 {
        ratio(self.lines_covered, self.lines_valid)
    }

    fn branch_rate(&self) -> f64 {
        ratio(self.branches_covered, self.branches_valid)
    }

    fn write_rates(&self, element: &mut Element) {
        element.set_attr("line-rate", format_rate(self.line_rate()));
        element.set_attr("branch-rate", format_rate(self.branch_rate()));
    }

    fn write_totals(&self, element: &mut Element) {
        self.write_rates(element);
        element.set_attr("lines-covered", self.lines_covered.to_string());
        element.set_attr("lines-valid", self.lines_valid.to_string());
        element.set_attr("branches-covered", self.branches_covered.to_string());
        element.set_attr("branches-valid", self.branches_valid.to_string());
    }
}

impl AddAssign for LineTally {
    fn add_assign(&mut self, other: Self) {
        self.lines_valid += other.lines_valid;
        self.lines_covered += other.lines_covered;
        self.branches_valid += other.branches_valid;
        self.branches_covered += other.branches_covered;
    }
}

#[allow(clippy::cast_precision_loss)]
fn ratio(covered: u64, valid: u64) -> f64 {
    if valid == 0 {
        0.0
    } else {
        covered as f64 / valid as f64
    }
}

/// Four decimals, trailing zeros dropped
fn format_rate(rate: f64) -> String {
    let fixed = format!("{rate:.4}");
    let trimmed = fixed.trim_end_matches('0').trim_end_matches('.');
    if trimmed.is_empty() {
        "0".to_string()
    } else {
        trimmed.to_string()
    }
}

/// `"50% (1/2)"` → `(1, 2)`
fn parse_condition_coverage(value: &str) -> Option<(u64, u64)> {
    let inner = value.split_once('(')?.1.split_once(')')?.0;
    let (covered, valid) = inner.split_once('/')?;
    Some((covered.trim().parse().ok()?, valid.trim().parse().ok()?))
}

fn retain_lines(lines: Option<&mut Element>, keep: &BTreeSet<u32>) {
    if let Some(lines) = lines {
        lines.children.retain(|line| {
            line.name != "line"
                || line
                    .attr_parsed::<u32>("number")
                    .is_some_and(|number| keep.contains(&number))
        });
    }
}

/// Counts from one filter pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FilterStats {
    /// Line entries kept
    pub lines_retained: u64,
    /// Line entries in classes whose file matched
    pub lines_examined: u64,
}

/// Derive a report holding only the changed lines.
///
/// Classes are matched by file name, not path. Unmatched classes are dropped,
/// matched ones keep only changed lines (class and method line lists alike).
/// Class, package and root aggregates are recomputed from what remains.
pub fn filter_report(report: &Element, change_set: &ChangeSet) -> (Element, FilterStats) {
    let changed: BTreeMap<String, BTreeSet<u32>> = change_set.by_file_name();
    let mut filtered = report.clone();
    let mut stats = FilterStats::default();
    let mut total = LineTally::default();

    if let Some(packages) = filtered.child_mut("packages") {
        for package in packages.children_named_mut("package") {
            let mut package_tally = LineTally::default();

            if let Some(classes) = package.child_mut("classes") {
                classes.children.retain(|class| {
                    class.name != "class"
                        || changed.contains_key(file_name_of(class.attr("filename").unwrap_or_default()))
                });

                for class in classes.children_named_mut("class") {
                    let name = file_name_of(class.attr("filename").unwrap_or_default()).to_string();
                    let Some(keep) = changed.get(&name) else {
                        continue;
                    };

                    stats.lines_examined += LineTally::of_lines(class.child("lines")).lines_valid;
                    retain_lines(class.child_mut("lines"), keep);

                    if let Some(methods) = class.child_mut("methods") {
                        for method in methods.children_named_mut("method") {
                            retain_lines(method.child_mut("lines"), keep);
                            LineTally::of_lines(method.child("lines")).write_rates(method);
                        }
                    }

                    let class_tally = LineTally::of_lines(class.child("lines"));
                    class_tally.write_rates(class);
                    package_tally += class_tally;
                }
            }

            package_tally.write_rates(package);
            total += package_tally;
        }
    }

    total.write_totals(&mut filtered);
    stats.lines_retained = total.lines_valid;
    (filtered, stats)
}

/// Reduce a report to its summary; `None` when the root is not usable
pub fn summarize(report: &Element) -> Option<CoverageSummary> {
    if report.name != ROOT {
        warn!(root = %report.name, "not a cobertura report");
        return None;
    }
    let lines_covered = report.attr_parsed::<u64>("lines-covered").unwrap_or(0);
    let lines_valid = report.attr_parsed::<u64>("lines-valid").unwrap_or(0);
    let line_rate = report.attr_parsed::<f64>("line-rate").unwrap_or(0.0);
    let branch_rate = report.attr_parsed::<f64>("branch-rate").unwrap_or(0.0);

    let summary = CoverageSummary::from_counts(lines_covered, lines_valid, line_rate, branch_rate);
    if summary.is_none() {
        warn!(lines_covered, lines_valid, "report claims more covered lines than valid ones");
    }
    summary
}

/// Read and parse a report from disk
pub fn read_report(path: &Path) -> Option<Element> {
    let content = match std::fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) => {
            warn!(path = %path.display(), error = %e, "cannot read coverage report");
            return None;
        }
    };
    match xml::parse(&content) {
        Ok(root) => Some(root),
        Err(e) => {
            warn!(path = %path.display(), error = %e, "malformed coverage report");
            None
        }
    }
}

pub fn summarize_file(path: &Path) -> Option<CoverageSummary> {
    let summary = summarize(&read_report(path)?)?;
    debug!(
        path = %path.display(),
        line_coverage = summary.line_coverage,
        "summarized coverage report"
    );
    Some(summary)
}

/// Filter the report at `input` into a new report at `output`
pub fn filter_file(input: &Path, change_set: &ChangeSet, output: &Path) -> Option<FilterOutcome> {
    let report = read_report(input)?;
    if change_set.is_empty() {
        warn!("empty change set, no lines can be retained");
    }

    let (filtered, stats) = filter_report(&report, change_set);
    let serialized = match xml::to_string(&filtered) {
        Ok(text) => text,
        Err(e) => {
            warn!(error = %e, "cannot serialize filtered report");
            return None;
        }
    };
    if let Some(parent) = output.parent() {
        if let Err(e) = std::fs::create_dir_all(parent) {
            warn!(path = %parent.display(), error = %e, "cannot create report directory");
            return None;
        }
    }
    if let Err(e) = std::fs::write(output, serialized) {
        warn!(path = %output.display(), error = %e, "cannot write filtered report");
        return None;
    }

    info!(
        retained = stats.lines_retained,
        examined = stats.lines_examined,
        path = %output.display(),
        "filtered coverage by change set"
    );
    Some(FilterOutcome {
        path: PathBuf::from(output),
        lines_retained: stats.lines_retained,
        lines_examined: stats.lines_examined,
    })
}
