use std::collections::BTreeMap;

use crate::unified::unified_diff;

/// One file of a version endpoint, ready to diff.
#[derive(Debug, Clone)]
pub struct DiffSource {
    /// Fully-qualified class name (or inner path within a JAR).
    pub path: String,
    pub content: String,
    pub hash: String,
}

/// How one paired file changed between the endpoints.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeType {
    Added,
    Deleted,
    Modified,
    Unchanged,
}

impl ChangeType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChangeType::Added => "added",
            ChangeType::Deleted => "deleted",
            ChangeType::Modified => "modified",
            ChangeType::Unchanged => "unchanged",
        }
    }
}

/// One computed per-file diff.
#[derive(Debug, Clone)]
pub struct ComputedFileDiff {
    pub path: String,
    pub change_type: ChangeType,
    pub additions: u32,
    pub deletions: u32,
    pub change_percentage: u32,
    pub unified_text: String,
}

/// Aggregate over all changed files of a version pair.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DiffSummary {
    pub insertions: u32,
    pub deletions: u32,
    pub files_changed: u32,
}

/// The full result: changed files plus the names left untouched.
#[derive(Debug, Clone, Default)]
pub struct DiffReport {
    pub files: Vec<ComputedFileDiff>,
    pub unchanged: Vec<String>,
    pub summary: DiffSummary,
}

/// Pair two endpoint file sets by path and diff every changed pair.
///
/// A path present on one side only is a pure addition or deletion. Matching
/// hashes mean unchanged: the pair is listed in `unchanged` and omitted
/// from `files`, so the patch for identical endpoints is empty.
pub fn diff_file_sets(old: &[DiffSource], new: &[DiffSource]) -> DiffReport {
    let old_by_path: BTreeMap<&str, &DiffSource> =
        old.iter().map(|f| (f.path.as_str(), f)).collect();
    let new_by_path: BTreeMap<&str, &DiffSource> =
        new.iter().map(|f| (f.path.as_str(), f)).collect();

    let mut paths: Vec<&str> = old_by_path.keys().copied().collect();
    paths.extend(new_by_path.keys().copied());
    paths.sort();
    paths.dedup();

    let mut report = DiffReport::default();
    for path in paths {
        let before = old_by_path.get(path);
        let after = new_by_path.get(path);

        let (change_type, old_text, new_text) = match (before, after) {
            (Some(b), Some(a)) if b.hash == a.hash => {
                report.unchanged.push(path.to_string());
                continue;
            }
            (Some(b), Some(a)) => (ChangeType::Modified, b.content.as_str(), a.content.as_str()),
            (None, Some(a)) => (ChangeType::Added, "", a.content.as_str()),
            (Some(b), None) => (ChangeType::Deleted, b.content.as_str(), ""),
            (None, None) => continue,
        };

        let (unified_text, stats) = unified_diff(
            old_text,
            new_text,
            &format!("a/{path}"),
            &format!("b/{path}"),
        );
        report.summary.insertions += stats.additions;
        report.summary.deletions += stats.deletions;
        report.summary.files_changed += 1;
        report.files.push(ComputedFileDiff {
            path: path.to_string(),
            change_type,
            additions: stats.additions,
            deletions: stats.deletions,
            change_percentage: stats.change_percentage,
            unified_text,
        });
    }
    report
}

#[cfg(test)]
mod tests {
    use super::*;

    fn src(path: &str, content: &str) -> DiffSource {
        DiffSource {
            path: path.to_string(),
            content: content.to_string(),
            // Content stands in for a real hash; equality is all that matters.
            hash: content.to_string(),
        }
    }

    #[test]
    fn identical_sets_produce_empty_summary() {
        let files = vec![src("com.x.Y", "class Y {}\n")];
        let report = diff_file_sets(&files, &files);
        assert!(report.files.is_empty());
        assert_eq!(report.unchanged, vec!["com.x.Y"]);
        assert_eq!(report.summary, DiffSummary::default());
    }

    #[test]
    fn modified_file_is_counted_once() {
        let old = vec![src("com.x.Y", "package com.x; class Y {}\n")];
        let new = vec![src("com.x.Y", "class Y { int n; }\n")];
        let report = diff_file_sets(&old, &new);

        assert_eq!(report.summary.files_changed, 1);
        assert_eq!(report.summary.insertions, 1);
        assert_eq!(report.summary.deletions, 1);
        assert_eq!(report.files[0].change_type, ChangeType::Modified);
    }

    #[test]
    fn one_sided_files_are_additions_or_deletions() {
        let old = vec![src("com.x.Old", "class Old {}\n")];
        let new = vec![src("com.x.New", "class New {}\nclass Extra {}\n")];
        let report = diff_file_sets(&old, &new);

        assert_eq!(report.files.len(), 2);
        let added = report.files.iter().find(|f| f.path == "com.x.New").unwrap();
        assert_eq!(added.change_type, ChangeType::Added);
        assert_eq!(added.additions, 2);
        assert_eq!(added.change_percentage, 100);

        let deleted = report.files.iter().find(|f| f.path == "com.x.Old").unwrap();
        assert_eq!(deleted.change_type, ChangeType::Deleted);
        assert_eq!(deleted.deletions, 1);
    }

    #[test]
    fn unchanged_files_share_between_changed_neighbors() {
        let old = vec![
            src("com.x.Common", "class Common {}\n"),
            src("com.x.Y", "class Y {}\n"),
        ];
        let new = vec![
            src("com.x.Common", "class Common {}\n"),
            src("com.x.Y", "class Y { int n; }\n"),
        ];
        let report = diff_file_sets(&old, &new);
        assert_eq!(report.unchanged, vec!["com.x.Common"]);
        assert_eq!(report.summary.files_changed, 1);
    }
}
