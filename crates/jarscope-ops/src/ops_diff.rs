//! Stage: compute, cache, and serve cross-version diffs.

use std::path::Path;

use chrono::Utc;

use jarscope_core::artifact::ArtifactKind;
use jarscope_diff::{diff_file_sets, DiffSource};
use jarscope_store::{query, CachedFileDiff, SourceFile, Store};
use jarscope_util::errors::JarscopeError;

/// One diff request between two versions of the same artifact.
#[derive(Debug, Clone)]
pub struct DiffRequest {
    pub kind: ArtifactKind,
    pub name: String,
    pub from_version: i64,
    pub to_version: i64,
    /// Narrow the result to a single file.
    pub file_path: Option<String>,
    /// Also report the files identical on both sides.
    pub include_unchanged: bool,
}

/// A served diff: aggregate, per-file patches, and provenance.
#[derive(Debug, Default)]
pub struct DiffResult {
    pub insertions: i64,
    pub deletions: i64,
    pub files_changed: i64,
    pub files: Vec<CachedFileDiff>,
    pub unchanged: Vec<String>,
    pub from_cache: bool,
}

/// Serves the memoized diff when both endpoints are unchanged
/// since it was cached; recomputes and re-caches otherwise.
pub fn diff(db_path: &Path, request: &DiffRequest) -> miette::Result<DiffResult> {
    let mut store = Store::open(db_path)?;

    ensure_endpoint(&store, request, request.from_version)?;
    ensure_endpoint(&store, request, request.to_version)?;

    let kind = request.kind.as_str();
    let from_sources = query::sources(&store, request.kind, &request.name, request.from_version)?;
    let to_sources = query::sources(&store, request.kind, &request.name, request.to_version)?;

    let cached = store.cached_diff_summary(kind, &request.name, request.from_version, request.to_version)?;
    let fresh = match &cached {
        Some(summary) => {
            let newest = [
                store.endpoint_latest_update(kind, &request.name, request.from_version)?,
                store.endpoint_latest_update(kind, &request.name, request.to_version)?,
            ];
            newest
                .iter()
                .flatten()
                .all(|updated| *updated <= summary.created_at)
        }
        None => false,
    };

    let mut result = if fresh {
        let summary = cached.expect("fresh implies cached");
        DiffResult {
            insertions: summary.insertions,
            deletions: summary.deletions,
            files_changed: summary.files_changed,
            files: store.cached_file_diffs(kind, &request.name, request.from_version, request.to_version)?,
            unchanged: Vec::new(),
            from_cache: true,
        }
    } else {
        compute_and_cache(&mut store, request, &from_sources, &to_sources)?
    };

    if request.include_unchanged {
        result.unchanged = unchanged_paths(&from_sources, &to_sources);
    }

    if let Some(file_path) = &request.file_path {
        result.files.retain(|f| &f.file_path == file_path);
        result.insertions = result.files.iter().map(|f| f.additions).sum();
        result.deletions = result.files.iter().map(|f| f.deletions).sum();
        result.files_changed = result.files.len() as i64;
        result.unchanged.retain(|p| p == file_path);
    }
    Ok(result)
}

fn ensure_endpoint(store: &Store, request: &DiffRequest, version_no: i64) -> miette::Result<()> {
    let known = match request.kind {
        ArtifactKind::Jar => store
            .jars_named(&request.name)?
            .iter()
            .any(|r| r.version_no == Some(version_no)),
        ArtifactKind::Class => store
            .classes_named(&request.name)?
            .iter()
            .any(|r| r.version_no == Some(version_no)),
    };
    if known {
        Ok(())
    } else {
        Err(JarscopeError::Config {
            message: format!(
                "no version {version_no} assigned for {} {:?}",
                request.kind.as_str(),
                request.name
            ),
        }
        .into())
    }
}

fn compute_and_cache(
    store: &mut Store,
    request: &DiffRequest,
    from_sources: &[SourceFile],
    to_sources: &[SourceFile],
) -> miette::Result<DiffResult> {
    let report = diff_file_sets(&to_diff_sources(from_sources), &to_diff_sources(to_sources));

    let now = Utc::now();
    let files: Vec<CachedFileDiff> = report
        .files
        .iter()
        .map(|f| CachedFileDiff {
            file_path: f.path.clone(),
            change_type: f.change_type.as_str().to_string(),
            additions: f.additions as i64,
            deletions: f.deletions as i64,
            change_percentage: f.change_percentage as i64,
            unified_text: f.unified_text.clone(),
            created_at: now,
        })
        .collect();

    store.store_diff(
        request.kind.as_str(),
        &request.name,
        request.from_version,
        request.to_version,
        &files,
        report.summary.insertions as i64,
        report.summary.deletions as i64,
        report.summary.files_changed as i64,
    )?;

    Ok(DiffResult {
        insertions: report.summary.insertions as i64,
        deletions: report.summary.deletions as i64,
        files_changed: report.summary.files_changed as i64,
        files,
        unchanged: report.unchanged,
        from_cache: false,
    })
}

fn to_diff_sources(sources: &[SourceFile]) -> Vec<DiffSource> {
    sources
        .iter()
        .map(|s| DiffSource {
            path: s.class_full_name.clone(),
            content: s.file_content.clone(),
            hash: s.file_hash.clone(),
        })
        .collect()
}

fn unchanged_paths(from: &[SourceFile], to: &[SourceFile]) -> Vec<String> {
    let mut unchanged: Vec<String> = from
        .iter()
        .filter(|f| to.iter().any(|t| t.class_full_name == f.class_full_name && t.file_hash == f.file_hash))
        .map(|f| f.class_full_name.clone())
        .collect();
    unchanged.sort();
    unchanged.dedup();
    unchanged
}
