//! Stage: drop source versions nothing references any more.

use std::path::Path;

use jarscope_store::{integrity, Store};
use jarscope_util::progress;

/// Outcome of one sweep.
#[derive(Debug, Default)]
pub struct SweepSummary {
    pub identities: u32,
    pub versions: u32,
    pub executed: bool,
}

/// Dry run (the default) only reports; `execute` deletes, one
/// transaction per identity, then verifies nothing unreferenced survived.
pub fn sweep_orphans(db_path: &Path, execute: bool) -> miette::Result<SweepSummary> {
    let mut store = Store::open(db_path)?;
    let orphans = store.find_orphans()?;

    let mut summary = SweepSummary {
        executed: execute,
        ..Default::default()
    };

    for group in &orphans {
        summary.identities += 1;
        summary.versions += group.version_ids.len() as u32;
        if execute {
            store.sweep_identity(group)?;
            progress::status(
                "Swept",
                &format!("{} ({} version(s))", group.class_full_name, group.version_ids.len()),
            );
        } else {
            progress::status_info(
                "Orphaned",
                &format!("{} ({} version(s))", group.class_full_name, group.version_ids.len()),
            );
        }
    }

    if execute {
        integrity::verify_no_orphans(&store)?;
        progress::status_info(
            "Done",
            &format!("removed {} version(s) across {} identities", summary.versions, summary.identities),
        );
    } else {
        progress::status_info(
            "Done",
            &format!(
                "{} orphaned version(s) across {} identities (dry run, pass --execute to delete)",
                summary.versions, summary.identities
            ),
        );
    }
    Ok(summary)
}
