//! Property tests for change-set extraction from zero-context diffs.

use proptest::prelude::*;
use std::collections::{BTreeMap, BTreeSet};

use covergen::domain::models::ChangeSet;

/// Hunks as `(start, count)` for one file
fn hunks() -> impl Strategy<Value = Vec<(u32, u32)>> {
    prop::collection::vec((1u32..500, 0u32..12), 0..8)
}

fn files() -> impl Strategy<Value = BTreeMap<String, Vec<(u32, u32)>>> {
    prop::collection::btree_map("[A-Za-z]{1,8}/[A-Za-z]{1,8}\\.cs", hunks(), 0..5)
}

fn render_diff(files: &BTreeMap<String, Vec<(u32, u32)>>) -> String {
    let mut diff = String::new();
    for (file, hunks) in files {
        diff.push_str(&format!("diff --git a/{file} b/{file}\n--- a/{file}\n+++ b/{file}\n"));
        for (start, count) in hunks {
            diff.push_str(&format!("@@ -{start},0 +{start},{count} @@\n"));
            for index in 0..*count {
                // Added content that itself starts with "++ "
                if index % 2 == 1 {
                    diff.push_str("+++ b/Decoy.cs\n");
                } else {
                    diff.push_str("+    changed();\n");
                }
            }
        }
    }
    diff
}

fn expected_lines(hunks: &[(u32, u32)]) -> BTreeSet<u32> {
    hunks
        .iter()
        .flat_map(|(start, count)| *start..start + count)
        .collect()
}

proptest! {
    #[test]
    fn prop_change_set_matches_hunks(files in files()) {
        let change_set = ChangeSet::from_unified_diff(&render_diff(&files));

        for (file, hunks) in &files {
            let expected = expected_lines(hunks);
            if expected.is_empty() {
                prop_assert!(change_set.lines(file).is_none());
            } else {
                prop_assert_eq!(change_set.lines(file), Some(&expected));
            }
        }

        prop_assert!(change_set.lines("Decoy.cs").is_none());

        let total: usize = files.values().map(|h| expected_lines(h).len()).sum();
        prop_assert_eq!(change_set.total_lines(), total);
        prop_assert!(change_set.iter().all(|(_, lines)| !lines.is_empty()));
    }

    #[test]
    fn prop_parsing_never_panics(text in "(\\+\\+\\+ [ -~]{0,20}\n|@@ [ -~]{0,20}\n|[ -~]{0,20}\n){0,20}") {
        let change_set = ChangeSet::from_unified_diff(&text);
        prop_assert!(change_set.iter().all(|(_, lines)| !lines.is_empty()));
    }
}
