use similar::{ChangeTag, TextDiff};

/// Line counts of one computed diff.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FileDiffStats {
    pub additions: u32,
    pub deletions: u32,
    /// `(additions + deletions) / max(lines_before, lines_after, 1) * 100`,
    /// rounded to the nearest integer.
    pub change_percentage: u32,
}

/// Compute a unified-format diff with 3 lines of context.
///
/// Returns the patch text (hunk headers `@@ -a,b +c,d @@`) and its stats.
/// Identical inputs yield an empty patch.
pub fn unified_diff(
    old: &str,
    new: &str,
    old_label: &str,
    new_label: &str,
) -> (String, FileDiffStats) {
    let diff = TextDiff::from_lines(old, new);

    let mut additions = 0u32;
    let mut deletions = 0u32;
    for change in diff.iter_all_changes() {
        match change.tag() {
            ChangeTag::Insert => additions += 1,
            ChangeTag::Delete => deletions += 1,
            ChangeTag::Equal => {}
        }
    }

    let text = if additions == 0 && deletions == 0 {
        String::new()
    } else {
        diff.unified_diff()
            .context_radius(3)
            .header(old_label, new_label)
            .to_string()
    };

    let lines_before = old.lines().count() as u32;
    let lines_after = new.lines().count() as u32;
    let base = lines_before.max(lines_after).max(1);
    let change_percentage =
        (f64::from(additions + deletions) / f64::from(base) * 100.0).round() as u32;

    (
        text,
        FileDiffStats {
            additions,
            deletions,
            change_percentage,
        },
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identical_inputs_yield_empty_patch() {
        let (text, stats) = unified_diff("class Y {}\n", "class Y {}\n", "a", "b");
        assert!(text.is_empty());
        assert_eq!(stats, FileDiffStats::default());
    }

    #[test]
    fn single_line_change_counts_one_each_way() {
        let (text, stats) = unified_diff(
            "package com.x; class Y {}\n",
            "class Y { int n; }\n",
            "com.x.Y@1",
            "com.x.Y@2",
        );
        assert_eq!(stats.additions, 1);
        assert_eq!(stats.deletions, 1);
        assert!(text.contains("@@"));
        assert!(text.contains("-package com.x; class Y {}"));
        assert!(text.contains("+class Y { int n; }"));
    }

    #[test]
    fn percentage_uses_larger_side_as_base() {
        let old = "a\nb\nc\nd\n";
        let new = "a\nb\n";
        let (_, stats) = unified_diff(old, new, "a", "b");
        assert_eq!(stats.deletions, 2);
        // 2 changed lines over max(4, 2) lines.
        assert_eq!(stats.change_percentage, 50);
    }

    #[test]
    fn empty_file_base_is_clamped_to_one() {
        let (_, stats) = unified_diff("", "", "a", "b");
        assert_eq!(stats.change_percentage, 0);

        let (_, stats) = unified_diff("", "one\n", "a", "b");
        assert_eq!(stats.additions, 1);
        assert_eq!(stats.change_percentage, 100);
    }

    #[test]
    fn context_is_three_lines() {
        let old = "1\n2\n3\n4\n5\n6\n7\n8\n9\n";
        let new = "1\n2\n3\n4\nX\n6\n7\n8\n9\n";
        let (text, _) = unified_diff(old, new, "a", "b");
        // Three context lines either side of the changed line.
        assert!(text.contains("@@ -2,7 +2,7 @@"), "got:\n{text}");
    }
}
