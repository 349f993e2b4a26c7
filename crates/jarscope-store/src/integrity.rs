//! Post-stage integrity checks.
//!
//! Version assignment and the orphan sweep finish by running these; a
//! failure is fatal to the command and means the store needs operator
//! attention, not a retry.

use std::collections::{BTreeSet, HashMap};

use jarscope_util::errors::JarscopeError;

use crate::Store;

/// After version assignment: for every JAR name, the distinct version
/// numbers must be exactly `1..=last_version_no`, versions and sizes must
/// pair bijectively, and every row must carry the shared maximum.
pub fn verify_jar_versions(store: &Store) -> miette::Result<()> {
    for name in store.distinct_jar_names()? {
        let rows = store.jars_named(&name)?;
        let observed: Vec<(Option<i64>, i64, Option<i64>)> = rows
            .iter()
            .map(|r| (r.version_no, r.file_size, r.last_version_no))
            .collect();
        verify_numbering(&name, &observed)?;
    }
    Ok(())
}

/// Class counterpart of [`verify_jar_versions`].
pub fn verify_class_versions(store: &Store) -> miette::Result<()> {
    for name in store.distinct_class_names()? {
        let rows = store.classes_named(&name)?;
        let observed: Vec<(Option<i64>, i64, Option<i64>)> = rows
            .iter()
            .map(|r| (r.version_no, r.file_size, r.last_version_no))
            .collect();
        verify_numbering(&name, &observed)?;
    }
    Ok(())
}

/// After `sweep-orphans --execute`: no source version may survive without a
/// reference from a class row or a JAR link.
pub fn verify_no_orphans(store: &Store) -> miette::Result<()> {
    let orphans = store.find_orphans()?;
    if orphans.is_empty() {
        return Ok(());
    }
    let total: usize = orphans.iter().map(|g| g.version_ids.len()).sum();
    Err(JarscopeError::Invariant {
        message: format!(
            "{total} orphaned source version(s) survived the sweep (first identity: {})",
            orphans[0].class_full_name
        ),
    }
    .into())
}

fn verify_numbering(name: &str, rows: &[(Option<i64>, i64, Option<i64>)]) -> miette::Result<()> {
    if rows.is_empty() {
        return Ok(());
    }
    let mut version_to_size: HashMap<i64, i64> = HashMap::new();
    let mut size_to_version: HashMap<i64, i64> = HashMap::new();
    let mut versions: BTreeSet<i64> = BTreeSet::new();
    let mut last_values: BTreeSet<Option<i64>> = BTreeSet::new();

    for (version_no, file_size, last_version_no) in rows {
        let v = version_no.ok_or_else(|| JarscopeError::Invariant {
            message: format!("{name}: row without version_no after assignment"),
        })?;
        versions.insert(v);
        last_values.insert(*last_version_no);

        if let Some(prev) = version_to_size.insert(v, *file_size) {
            if prev != *file_size {
                return Err(JarscopeError::Invariant {
                    message: format!("{name}: version {v} maps to sizes {prev} and {file_size}"),
                }
                .into());
            }
        }
        if let Some(prev) = size_to_version.insert(*file_size, v) {
            if prev != v {
                return Err(JarscopeError::Invariant {
                    message: format!("{name}: size {file_size} maps to versions {prev} and {v}"),
                }
                .into());
            }
        }
    }

    let max = *versions.iter().next_back().expect("at least one row");
    let expected: BTreeSet<i64> = (1..=max).collect();
    if versions != expected {
        return Err(JarscopeError::Invariant {
            message: format!("{name}: version numbering has gaps ({versions:?})"),
        }
        .into());
    }
    if last_values.len() != 1 || last_values.iter().next() != Some(&Some(max)) {
        return Err(JarscopeError::Invariant {
            message: format!("{name}: last_version_no disagrees with max version {max}"),
        }
        .into());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn consistent_numbering_passes() {
        let rows = vec![
            (Some(1), 1024, Some(2)),
            (Some(1), 1024, Some(2)),
            (Some(2), 2048, Some(2)),
        ];
        assert!(verify_numbering("foo.jar", &rows).is_ok());
    }

    #[test]
    fn gap_in_numbering_fails() {
        let rows = vec![(Some(1), 1024, Some(3)), (Some(3), 2048, Some(3))];
        assert!(verify_numbering("foo.jar", &rows).is_err());
    }

    #[test]
    fn size_version_bijection_enforced() {
        let rows = vec![(Some(1), 1024, Some(2)), (Some(2), 1024, Some(2))];
        assert!(verify_numbering("foo.jar", &rows).is_err());
    }

    #[test]
    fn stale_last_version_fails() {
        let rows = vec![(Some(1), 1024, Some(1)), (Some(2), 2048, Some(2))];
        assert!(verify_numbering("foo.jar", &rows).is_err());
    }

    #[test]
    fn unassigned_row_fails() {
        let rows = vec![(None, 1024, None)];
        assert!(verify_numbering("foo.jar", &rows).is_err());
    }
}
