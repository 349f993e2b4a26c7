//! Stage: assign fleet-wide version numbers per artifact name.
//!
//! A version is a distinct binary size of one name; ordering is by first
//! sighting. Numbering is append-only: a size that already carries a
//! number keeps it on every re-run, and a previously-unseen size gets the
//! next integer even when its mtime predates assigned ones.

use std::collections::BTreeMap;
use std::path::Path;

use jarscope_store::{integrity, SizeObservation, Store, VersionAssignment};
use jarscope_util::progress;

/// Outcome of one assignment pass.
#[derive(Debug, Default)]
pub struct VersionSummary {
    pub jar_names: u32,
    pub class_names: u32,
    pub versions_assigned: u32,
}

/// Runs over every name (or one, when narrowed), one serializable
/// transaction per name, then verifies the numbering invariants.
pub fn assign_versions(
    db_path: &Path,
    include_jars: bool,
    include_classes: bool,
    jar_name: Option<&str>,
    class_name: Option<&str>,
) -> miette::Result<VersionSummary> {
    let mut store = Store::open(db_path)?;
    let mut summary = VersionSummary::default();

    if include_jars {
        let names = match jar_name {
            Some(n) => vec![n.to_string()],
            None => store.distinct_jar_names()?,
        };
        for name in names {
            let observations = store.jar_size_observations(&name)?;
            if observations.is_empty() {
                continue;
            }
            let existing = existing_numbers(
                store.jars_named(&name)?.iter().map(|r| (r.file_size, r.version_no)),
            );
            let (assignments, last) = plan_assignments(&observations, &existing);
            summary.versions_assigned += assignments.len() as u32;
            store.apply_jar_versions(&name, &assignments, last)?;
            summary.jar_names += 1;
        }
        integrity::verify_jar_versions(&store)?;
    }

    if include_classes {
        let names = match class_name {
            Some(n) => vec![n.to_string()],
            None => store.distinct_class_names()?,
        };
        for name in names {
            let observations = store.class_size_observations(&name)?;
            if observations.is_empty() {
                continue;
            }
            let existing = existing_numbers(
                store
                    .classes_named(&name)?
                    .iter()
                    .map(|r| (r.file_size, r.version_no)),
            );
            let (assignments, last) = plan_assignments(&observations, &existing);
            summary.versions_assigned += assignments.len() as u32;
            store.apply_class_versions(&name, &assignments, last)?;
            summary.class_names += 1;
        }
        integrity::verify_class_versions(&store)?;
    }

    progress::status_info(
        "Versioned",
        &format!(
            "{} jar name(s), {} class name(s), {} version(s) total",
            summary.jar_names, summary.class_names, summary.versions_assigned
        ),
    );
    Ok(summary)
}

fn existing_numbers(
    rows: impl Iterator<Item = (i64, Option<i64>)>,
) -> BTreeMap<i64, i64> {
    let mut existing = BTreeMap::new();
    for (file_size, version_no) in rows {
        if let Some(v) = version_no {
            existing.entry(file_size).or_insert(v);
        }
    }
    existing
}

/// Order fresh sizes by `(earliest sighting, size, first service name)` and
/// number them after the already-assigned ones.
fn plan_assignments(
    observations: &[SizeObservation],
    existing: &BTreeMap<i64, i64>,
) -> (Vec<VersionAssignment>, i64) {
    let mut assignments: Vec<VersionAssignment> = existing
        .iter()
        .map(|(&file_size, &version_no)| VersionAssignment {
            file_size,
            version_no,
        })
        .collect();

    let mut fresh: Vec<&SizeObservation> = observations
        .iter()
        .filter(|o| !existing.contains_key(&o.file_size))
        .collect();
    fresh.sort_by(|a, b| {
        a.earliest_modified
            .cmp(&b.earliest_modified)
            .then_with(|| a.file_size.cmp(&b.file_size))
            .then_with(|| a.first_service.cmp(&b.first_service))
    });

    let mut next = existing.values().copied().max().unwrap_or(0) + 1;
    for obs in fresh {
        assignments.push(VersionAssignment {
            file_size: obs.file_size,
            version_no: next,
        });
        next += 1;
    }
    (assignments, next - 1)
}
