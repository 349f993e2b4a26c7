use chrono::{DateTime, Utc};
use rusqlite::{params, OptionalExtension};

use crate::db::{now_sql, store_err, ts_from_sql, Store};

/// One materialized source file of a version endpoint.
#[derive(Debug, Clone)]
pub struct SourceFile {
    pub class_full_name: String,
    pub file_content: String,
    pub file_hash: String,
    pub line_count: i64,
    pub updated_at: DateTime<Utc>,
}

/// A lightweight handle on a stored source version.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SourceVersionRef {
    pub id: i64,
    pub identity_id: i64,
}

/// Orphaned versions of one identity, as reported by the sweeper.
#[derive(Debug, Clone)]
pub struct OrphanGroup {
    pub identity_id: i64,
    pub class_full_name: String,
    pub version_ids: Vec<i64>,
}

impl Store {
    /// Get or create the identity row for a fully-qualified class name.
    pub fn ensure_identity(&self, class_full_name: &str) -> miette::Result<i64> {
        self.conn()
            .execute(
                "INSERT OR IGNORE INTO java_source_files (class_full_name) VALUES (?1)",
                params![class_full_name],
            )
            .map_err(store_err)?;
        self.conn()
            .query_row(
                "SELECT id FROM java_source_files WHERE class_full_name = ?1",
                params![class_full_name],
                |r| r.get(0),
            )
            .map_err(|e| store_err(e).into())
    }

    /// Insert a source version, or reuse the row already holding this
    /// content. Returns the version ref and whether a new row was created.
    ///
    /// The `(java_source_file_id, file_hash)` uniqueness is enforced by the
    /// store; a conflicting concurrent insert resolves to the surviving row
    /// on the follow-up select.
    pub fn upsert_source_version(
        &self,
        identity_id: i64,
        normalized_content: &str,
        file_hash: &str,
        line_count: u32,
    ) -> miette::Result<(SourceVersionRef, bool)> {
        let existing = self.find_source_version(identity_id, file_hash)?;
        if let Some(id) = existing {
            return Ok((SourceVersionRef { id, identity_id }, false));
        }

        let inserted = self
            .conn()
            .execute(
                "INSERT OR IGNORE INTO java_source_file_versions
                     (java_source_file_id, file_content, file_size, file_hash, line_count, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    identity_id,
                    normalized_content,
                    normalized_content.len() as i64,
                    file_hash,
                    line_count,
                    now_sql(),
                ],
            )
            .map_err(store_err)?;

        match self.find_source_version(identity_id, file_hash)? {
            Some(id) => Ok((SourceVersionRef { id, identity_id }, inserted > 0)),
            None => Err(jarscope_util::errors::JarscopeError::Store {
                message: format!("source version vanished for identity {identity_id}"),
            }
            .into()),
        }
    }

    fn find_source_version(&self, identity_id: i64, file_hash: &str) -> miette::Result<Option<i64>> {
        self.conn()
            .query_row(
                "SELECT id FROM java_source_file_versions
                 WHERE java_source_file_id = ?1 AND file_hash = ?2",
                params![identity_id, file_hash],
                |r| r.get(0),
            )
            .optional()
            .map_err(|e| store_err(e).into())
    }

    /// Link a concrete JAR row to a source version it contains. Re-linking
    /// is a no-op. Returns whether a new link was created.
    pub fn link_jar_source(&self, jar_file_id: i64, version_id: i64) -> miette::Result<bool> {
        let n = self
            .conn()
            .execute(
                "INSERT OR IGNORE INTO jar_source_links (jar_file_id, java_source_file_version_id)
                 VALUES (?1, ?2)",
                params![jar_file_id, version_id],
            )
            .map_err(store_err)?;
        Ok(n > 0)
    }

    /// Point a class row at its (single) source version.
    pub fn set_class_source(&self, class_file_id: i64, version_id: i64) -> miette::Result<()> {
        self.conn()
            .execute(
                "UPDATE class_files SET java_source_file_version_id = ?1, updated_at = ?2
                 WHERE id = ?3",
                params![version_id, now_sql(), class_file_id],
            )
            .map_err(store_err)?;
        Ok(())
    }

    /// Tags attached to one source version, sorted.
    pub fn tags_for_version(&self, version_id: i64) -> miette::Result<Vec<String>> {
        let mut stmt = self
            .conn()
            .prepare(
                "SELECT tag FROM source_version_tags
                 WHERE java_source_file_version_id = ?1 ORDER BY tag",
            )
            .map_err(store_err)?;
        let tags = stmt
            .query_map(params![version_id], |r| r.get(0))
            .map_err(store_err)?
            .collect::<Result<Vec<_>, _>>()
            .map_err(store_err)?;
        Ok(tags)
    }

    /// Number of stored versions for one identity name; zero when unknown.
    pub fn version_count(&self, class_full_name: &str) -> miette::Result<i64> {
        self.conn()
            .query_row(
                "SELECT COUNT(*) FROM java_source_file_versions v
                 JOIN java_source_files f ON f.id = v.java_source_file_id
                 WHERE f.class_full_name = ?1",
                params![class_full_name],
                |r| r.get(0),
            )
            .map_err(|e| store_err(e).into())
    }

    /// The source set of a JAR version endpoint: every distinct version
    /// linked from any row of that name carrying that version number.
    pub fn sources_for_jar_version(
        &self,
        jar_name: &str,
        version_no: i64,
    ) -> miette::Result<Vec<SourceFile>> {
        let mut stmt = self
            .conn()
            .prepare(
                "SELECT DISTINCT f.class_full_name, v.file_content, v.file_hash,
                        v.line_count, v.updated_at
                 FROM jar_files jf
                 JOIN jar_source_links l ON l.jar_file_id = jf.id
                 JOIN java_source_file_versions v ON v.id = l.java_source_file_version_id
                 JOIN java_source_files f ON f.id = v.java_source_file_id
                 WHERE jf.jar_name = ?1 AND jf.version_no = ?2
                 ORDER BY f.class_full_name",
            )
            .map_err(store_err)?;
        let rows = stmt
            .query_map(params![jar_name, version_no], source_file_from_row)
            .map_err(store_err)?
            .collect::<Result<Vec<_>, _>>()
            .map_err(store_err)?;
        Ok(rows)
    }

    /// The single source of a class version endpoint, if ingested.
    pub fn source_for_class_version(
        &self,
        class_full_name: &str,
        version_no: i64,
    ) -> miette::Result<Option<SourceFile>> {
        self.conn()
            .query_row(
                "SELECT f.class_full_name, v.file_content, v.file_hash,
                        v.line_count, v.updated_at
                 FROM class_files cf
                 JOIN java_source_file_versions v ON v.id = cf.java_source_file_version_id
                 JOIN java_source_files f ON f.id = v.java_source_file_id
                 WHERE cf.class_full_name = ?1 AND cf.version_no = ?2
                 LIMIT 1",
                params![class_full_name, version_no],
                source_file_from_row,
            )
            .optional()
            .map_err(|e| store_err(e).into())
    }

    /// Versions referenced by no class row and no JAR link, grouped by
    /// identity. Reference-driven: renaming a service creates no phantoms.
    pub fn find_orphans(&self) -> miette::Result<Vec<OrphanGroup>> {
        let mut stmt = self
            .conn()
            .prepare(
                "SELECT v.id, f.id, f.class_full_name
                 FROM java_source_file_versions v
                 JOIN java_source_files f ON f.id = v.java_source_file_id
                 WHERE NOT EXISTS (
                         SELECT 1 FROM jar_source_links l
                         WHERE l.java_source_file_version_id = v.id)
                   AND NOT EXISTS (
                         SELECT 1 FROM class_files cf
                         WHERE cf.java_source_file_version_id = v.id)
                 ORDER BY f.class_full_name, v.id",
            )
            .map_err(store_err)?;
        let rows = stmt
            .query_map([], |r| {
                Ok((r.get::<_, i64>(0)?, r.get::<_, i64>(1)?, r.get::<_, String>(2)?))
            })
            .map_err(store_err)?
            .collect::<Result<Vec<_>, _>>()
            .map_err(store_err)?;

        let mut groups: Vec<OrphanGroup> = Vec::new();
        for (version_id, identity_id, class_full_name) in rows {
            match groups.last_mut() {
                Some(g) if g.identity_id == identity_id => g.version_ids.push(version_id),
                _ => groups.push(OrphanGroup {
                    identity_id,
                    class_full_name,
                    version_ids: vec![version_id],
                }),
            }
        }
        Ok(groups)
    }

    /// Delete one identity's orphaned versions (tags cascade), and the
    /// identity itself if nothing remains. One transaction per identity so a
    /// failure never leaves a half-swept group.
    pub fn sweep_identity(&mut self, group: &OrphanGroup) -> miette::Result<usize> {
        let group = group.clone();
        self.transaction(move |tx| {
            let mut removed = 0usize;
            for version_id in &group.version_ids {
                tx.execute(
                    "DELETE FROM source_version_tags WHERE java_source_file_version_id = ?1",
                    params![version_id],
                )?;
                tx.execute(
                    "DELETE FROM jar_source_links WHERE java_source_file_version_id = ?1",
                    params![version_id],
                )?;
                removed += tx.execute(
                    "DELETE FROM java_source_file_versions WHERE id = ?1",
                    params![version_id],
                )?;
            }
            let remaining: i64 = tx.query_row(
                "SELECT COUNT(*) FROM java_source_file_versions WHERE java_source_file_id = ?1",
                params![group.identity_id],
                |r| r.get(0),
            )?;
            if remaining == 0 {
                tx.execute(
                    "DELETE FROM java_source_files WHERE id = ?1",
                    params![group.identity_id],
                )?;
            }
            Ok(removed)
        })
    }

    /// Latest `updated_at` across the source versions of a diff endpoint,
    /// used for cache freshness checks.
    pub fn endpoint_latest_update(
        &self,
        kind: &str,
        name: &str,
        version_no: i64,
    ) -> miette::Result<Option<DateTime<Utc>>> {
        let sql = match kind {
            "jar" => {
                "SELECT MAX(v.updated_at)
                 FROM jar_files jf
                 JOIN jar_source_links l ON l.jar_file_id = jf.id
                 JOIN java_source_file_versions v ON v.id = l.java_source_file_version_id
                 WHERE jf.jar_name = ?1 AND jf.version_no = ?2"
            }
            _ => {
                "SELECT MAX(v.updated_at)
                 FROM class_files cf
                 JOIN java_source_file_versions v ON v.id = cf.java_source_file_version_id
                 WHERE cf.class_full_name = ?1 AND cf.version_no = ?2"
            }
        };
        let latest: Option<String> = self
            .conn()
            .query_row(sql, params![name, version_no], |r| r.get(0))
            .optional()
            .map_err(store_err)?
            .flatten();
        Ok(latest.map(|s| ts_from_sql(&s)))
    }
}

fn source_file_from_row(row: &rusqlite::Row) -> rusqlite::Result<SourceFile> {
    Ok(SourceFile {
        class_full_name: row.get(0)?,
        file_content: row.get(1)?,
        file_hash: row.get(2)?,
        line_count: row.get(3)?,
        updated_at: ts_from_sql(&row.get::<_, String>(4)?),
    })
}
