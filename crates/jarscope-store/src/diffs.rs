use chrono::{DateTime, Utc};
use rusqlite::{params, OptionalExtension};

use crate::db::{now_sql, store_err, ts_from_sql, Store};

/// One memoized per-file diff between two versions of an artifact.
#[derive(Debug, Clone)]
pub struct CachedFileDiff {
    pub file_path: String,
    pub change_type: String,
    pub additions: i64,
    pub deletions: i64,
    pub change_percentage: i64,
    pub unified_text: String,
    pub created_at: DateTime<Utc>,
}

/// The memoized aggregate of one version pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiffSummaryRow {
    pub insertions: i64,
    pub deletions: i64,
    pub files_changed: i64,
    pub created_at: DateTime<Utc>,
}

impl Store {
    pub fn cached_diff_summary(
        &self,
        kind: &str,
        name: &str,
        from_version: i64,
        to_version: i64,
    ) -> miette::Result<Option<DiffSummaryRow>> {
        self.conn()
            .query_row(
                "SELECT insertions, deletions, files_changed, created_at
                 FROM diff_summaries
                 WHERE artifact_kind = ?1 AND artifact_name = ?2
                   AND from_version = ?3 AND to_version = ?4",
                params![kind, name, from_version, to_version],
                |r| {
                    Ok(DiffSummaryRow {
                        insertions: r.get(0)?,
                        deletions: r.get(1)?,
                        files_changed: r.get(2)?,
                        created_at: ts_from_sql(&r.get::<_, String>(3)?),
                    })
                },
            )
            .optional()
            .map_err(|e| store_err(e).into())
    }

    pub fn cached_file_diffs(
        &self,
        kind: &str,
        name: &str,
        from_version: i64,
        to_version: i64,
    ) -> miette::Result<Vec<CachedFileDiff>> {
        let mut stmt = self
            .conn()
            .prepare(
                "SELECT file_path, change_type, additions, deletions, change_percentage,
                        unified_text, created_at
                 FROM diff_cache
                 WHERE artifact_kind = ?1 AND artifact_name = ?2
                   AND from_version = ?3 AND to_version = ?4
                 ORDER BY file_path",
            )
            .map_err(store_err)?;
        let rows = stmt
            .query_map(params![kind, name, from_version, to_version], |r| {
                Ok(CachedFileDiff {
                    file_path: r.get(0)?,
                    change_type: r.get(1)?,
                    additions: r.get(2)?,
                    deletions: r.get(3)?,
                    change_percentage: r.get(4)?,
                    unified_text: r.get(5)?,
                    created_at: ts_from_sql(&r.get::<_, String>(6)?),
                })
            })
            .map_err(store_err)?
            .collect::<Result<Vec<_>, _>>()
            .map_err(store_err)?;
        Ok(rows)
    }

    /// Replace the memoized diff of one version pair: per-file rows plus the
    /// aggregate, in one transaction. Prior rows for the pair are dropped
    /// first, so a recompute after upstream changes fully supersedes them.
    pub fn store_diff(
        &mut self,
        kind: &str,
        name: &str,
        from_version: i64,
        to_version: i64,
        files: &[CachedFileDiff],
        insertions: i64,
        deletions: i64,
        files_changed: i64,
    ) -> miette::Result<()> {
        let kind = kind.to_string();
        let name = name.to_string();
        let files = files.to_vec();
        self.transaction(move |tx| {
            tx.execute(
                "DELETE FROM diff_cache
                 WHERE artifact_kind = ?1 AND artifact_name = ?2
                   AND from_version = ?3 AND to_version = ?4",
                params![kind, name, from_version, to_version],
            )?;
            tx.execute(
                "DELETE FROM diff_summaries
                 WHERE artifact_kind = ?1 AND artifact_name = ?2
                   AND from_version = ?3 AND to_version = ?4",
                params![kind, name, from_version, to_version],
            )?;
            let now = now_sql();
            for f in &files {
                tx.execute(
                    "INSERT INTO diff_cache
                         (artifact_kind, artifact_name, from_version, to_version, file_path,
                          change_type, additions, deletions, change_percentage, unified_text,
                          created_at)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
                    params![
                        kind,
                        name,
                        from_version,
                        to_version,
                        f.file_path,
                        f.change_type,
                        f.additions,
                        f.deletions,
                        f.change_percentage,
                        f.unified_text,
                        now,
                    ],
                )?;
            }
            tx.execute(
                "INSERT INTO diff_summaries
                     (artifact_kind, artifact_name, from_version, to_version,
                      insertions, deletions, files_changed, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                params![kind, name, from_version, to_version, insertions, deletions, files_changed, now],
            )?;
            Ok(())
        })
    }
}
