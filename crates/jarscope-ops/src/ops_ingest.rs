//! Stage: walk decompile output trees and materialize the source store.
//!
//! Every `.java` file is normalized, hashed, and deduplicated fleet-wide on
//! `(identity, hash)`. JAR trees produce links; class trees set the class
//! row's source pointer.

use std::path::{Path, PathBuf};

use tracing::warn;

use jarscope_core::artifact::class_name_from_java_path;
use jarscope_core::layout::DecompileLayout;
use jarscope_store::Store;
use jarscope_util::encoding::decode_text;
use jarscope_util::errors::JarscopeError;
use jarscope_util::hash::source_fingerprint;
use jarscope_util::progress;

use crate::ServiceSelector;

/// Composable selectors for one ingestion pass.
#[derive(Debug, Clone, Default)]
pub struct IngestFilter {
    pub selector: ServiceSelector,
    pub jar_name: Option<String>,
    pub class_name: Option<String>,
    /// Report planned writes without executing them.
    pub dry_run: bool,
}

impl IngestFilter {
    fn wants_jars(&self) -> bool {
        self.class_name.is_none() || self.jar_name.is_some()
    }

    fn wants_classes(&self) -> bool {
        self.jar_name.is_none() || self.class_name.is_some()
    }
}

/// Outcome of one ingestion pass.
#[derive(Debug, Default)]
pub struct IngestSummary {
    pub files_seen: u32,
    pub versions_created: u32,
    pub versions_reused: u32,
    pub links_created: u32,
    pub skipped_files: u32,
    /// Dry-run only: `(class_full_name, source file)` pairs that would be
    /// written.
    pub planned: Vec<(String, PathBuf)>,
}

/// Walk the selected decompile trees into the deduplicated source store.
pub fn ingest_sources(db_path: &Path, filter: &IngestFilter) -> miette::Result<IngestSummary> {
    let store = Store::open(db_path)?;
    let services = filter.selector.resolve(&store)?;
    let mut summary = IngestSummary::default();

    for service in &services {
        if filter.wants_jars() {
            for jar in store.jars_for_service(service.id)? {
                if filter.jar_name.as_deref().is_some_and(|n| n != jar.jar_name) {
                    continue;
                }
                let Some(root) = jar.decompile_path.as_deref() else {
                    continue;
                };
                ingest_tree(&store, filter, &mut summary, Path::new(root), |store, version_id| {
                    store.link_jar_source(jar.id, version_id)
                })?;
            }
        }

        if filter.wants_classes() {
            for class in store.classes_for_service(service.id)? {
                if filter
                    .class_name
                    .as_deref()
                    .is_some_and(|n| n != class.class_full_name)
                {
                    continue;
                }
                let Some(root) = class.decompile_path.as_deref() else {
                    continue;
                };
                let expected = class.class_full_name.clone();
                ingest_named_tree(
                    &store,
                    filter,
                    &mut summary,
                    Path::new(root),
                    &expected,
                    class.id,
                )?;
            }
        }
    }

    if filter.dry_run {
        progress::status_info(
            "Planned",
            &format!("{} source file(s), no writes (dry run)", summary.planned.len()),
        );
    } else {
        progress::status_info(
            "Ingested",
            &format!(
                "{} file(s): {} new version(s), {} reused, {} link(s), {} skipped",
                summary.files_seen,
                summary.versions_created,
                summary.versions_reused,
                summary.links_created,
                summary.skipped_files
            ),
        );
    }
    Ok(summary)
}

/// Ingest one JAR decompile tree; `on_version` links each version back to
/// the owning row.
fn ingest_tree(
    store: &Store,
    filter: &IngestFilter,
    summary: &mut IngestSummary,
    root: &Path,
    mut on_version: impl FnMut(&Store, i64) -> miette::Result<bool>,
) -> miette::Result<()> {
    for (abs, rel) in collect_java_files(root)? {
        let Some(class_full_name) = class_name_from_java_path(&rel) else {
            continue;
        };
        summary.files_seen += 1;

        if filter.dry_run {
            summary.planned.push((class_full_name, abs));
            continue;
        }

        let Some((content, hash, lines)) = read_source(&abs, summary) else {
            continue;
        };
        let identity = store.ensure_identity(&class_full_name)?;
        let (version, created) = store.upsert_source_version(identity, &content, &hash, lines)?;
        if created {
            summary.versions_created += 1;
        } else {
            summary.versions_reused += 1;
        }
        if on_version(store, version.id)? {
            summary.links_created += 1;
        }
    }
    Ok(())
}

/// Ingest one class decompile tree, pointing the class row at the version
/// whose derived name matches the row's identity.
fn ingest_named_tree(
    store: &Store,
    filter: &IngestFilter,
    summary: &mut IngestSummary,
    root: &Path,
    expected: &str,
    class_file_id: i64,
) -> miette::Result<()> {
    for (abs, rel) in collect_java_files(root)? {
        let Some(class_full_name) = class_name_from_java_path(&rel) else {
            continue;
        };
        summary.files_seen += 1;

        if filter.dry_run {
            summary.planned.push((class_full_name, abs));
            continue;
        }

        let Some((content, hash, lines)) = read_source(&abs, summary) else {
            continue;
        };
        let identity = store.ensure_identity(&class_full_name)?;
        let (version, created) = store.upsert_source_version(identity, &content, &hash, lines)?;
        if created {
            summary.versions_created += 1;
        } else {
            summary.versions_reused += 1;
        }
        if class_full_name == expected {
            store.set_class_source(class_file_id, version.id)?;
            summary.links_created += 1;
        }
    }
    Ok(())
}

fn read_source(path: &Path, summary: &mut IngestSummary) -> Option<(String, String, u32)> {
    let bytes = match std::fs::read(path) {
        Ok(b) => b,
        Err(e) => {
            warn!(path = %path.display(), error = %e, "unreadable source file skipped");
            summary.skipped_files += 1;
            return None;
        }
    };
    match decode_text(&bytes) {
        Ok(text) => {
            let normalized = jarscope_util::hash::normalize_source(&text);
            let (hash, lines) = source_fingerprint(&text);
            Some((normalized, hash, lines))
        }
        Err(e) => {
            warn!(path = %path.display(), error = %e, "undecodable source file skipped");
            summary.skipped_files += 1;
            None
        }
    }
}

/// All `.java` files under `root` with their relative paths, skipping
/// retained-originals buckets.
fn collect_java_files(root: &Path) -> miette::Result<Vec<(PathBuf, String)>> {
    let mut files = Vec::new();
    let mut pending = vec![root.to_path_buf()];
    while let Some(dir) = pending.pop() {
        let entries = std::fs::read_dir(&dir).map_err(JarscopeError::Io)?;
        for entry in entries.flatten() {
            let path = entry.path();
            let name = entry.file_name().to_string_lossy().into_owned();
            if path.is_dir() {
                if !DecompileLayout::is_retained_bucket(&name) {
                    pending.push(path);
                }
                continue;
            }
            if name.ends_with(".java") {
                if let Ok(rel) = path.strip_prefix(root) {
                    files.push((path.clone(), rel.to_string_lossy().replace('\\', "/")));
                }
            }
        }
    }
    files.sort();
    Ok(files)
}
