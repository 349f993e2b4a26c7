use chrono::{DateTime, Utc};
use rusqlite::{params, Row};
use std::collections::BTreeMap;

use crate::db::{now_sql, store_err, ts_from_sql, ts_to_sql, Store};

/// One artifact sighting from a listing pass: name, size, mtime. Contents
/// are not fetched at this stage.
#[derive(Debug, Clone)]
pub struct ArtifactObservation {
    pub name: String,
    pub file_size: i64,
    pub last_modified: DateTime<Utc>,
    pub is_third_party: bool,
}

/// A `jar_files` row.
#[derive(Debug, Clone)]
pub struct JarFile {
    pub id: i64,
    pub service_id: i64,
    pub jar_name: String,
    pub file_size: i64,
    pub last_modified: DateTime<Utc>,
    pub is_third_party: bool,
    pub file_path: Option<String>,
    pub decompile_path: Option<String>,
    pub decompile_failed: bool,
    pub version_no: Option<i64>,
    pub last_version_no: Option<i64>,
}

impl JarFile {
    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        Ok(JarFile {
            id: row.get("id")?,
            service_id: row.get("service_id")?,
            jar_name: row.get("jar_name")?,
            file_size: row.get("file_size")?,
            last_modified: ts_from_sql(&row.get::<_, String>("last_modified")?),
            is_third_party: row.get("is_third_party")?,
            file_path: row.get("file_path")?,
            decompile_path: row.get("decompile_path")?,
            decompile_failed: row.get("decompile_failed")?,
            version_no: row.get("version_no")?,
            last_version_no: row.get("last_version_no")?,
        })
    }
}

/// A `class_files` row.
#[derive(Debug, Clone)]
pub struct ClassFile {
    pub id: i64,
    pub service_id: i64,
    pub class_full_name: String,
    pub file_size: i64,
    pub last_modified: DateTime<Utc>,
    pub file_path: Option<String>,
    pub decompile_path: Option<String>,
    pub decompile_failed: bool,
    pub version_no: Option<i64>,
    pub last_version_no: Option<i64>,
    pub java_source_file_version_id: Option<i64>,
}

impl ClassFile {
    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        Ok(ClassFile {
            id: row.get("id")?,
            service_id: row.get("service_id")?,
            class_full_name: row.get("class_full_name")?,
            file_size: row.get("file_size")?,
            last_modified: ts_from_sql(&row.get::<_, String>("last_modified")?),
            file_path: row.get("file_path")?,
            decompile_path: row.get("decompile_path")?,
            decompile_failed: row.get("decompile_failed")?,
            version_no: row.get("version_no")?,
            last_version_no: row.get("last_version_no")?,
            java_source_file_version_id: row.get("java_source_file_version_id")?,
        })
    }
}

/// One distinct `file_size` of an artifact name across the fleet, with the
/// data the version assigner orders by.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SizeObservation {
    pub file_size: i64,
    pub earliest_modified: DateTime<Utc>,
    /// Service name of the earliest observation; ties broken by name so the
    /// value is deterministic.
    pub first_service: String,
}

/// The version number assigned to one distinct size.
#[derive(Debug, Clone, Copy)]
pub struct VersionAssignment {
    pub file_size: i64,
    pub version_no: i64,
}

const JAR_COLUMNS: &str = "id, service_id, jar_name, file_size, last_modified, is_third_party, \
     file_path, decompile_path, decompile_failed, version_no, last_version_no";
const CLASS_COLUMNS: &str = "id, service_id, class_full_name, file_size, last_modified, \
     file_path, decompile_path, decompile_failed, version_no, last_version_no, \
     java_source_file_version_id";

impl Store {
    /// Apply one full JAR listing for a service in a single transaction.
    ///
    /// Existing rows keep their fetch/decompile/version columns; only the
    /// observed metadata is refreshed. Callers collect the complete listing
    /// before calling, so a transport failure never half-overwrites a pass.
    pub fn upsert_jar_listing(
        &mut self,
        service_id: i64,
        observations: &[ArtifactObservation],
    ) -> miette::Result<usize> {
        let observations = observations.to_vec();
        self.transaction(move |tx| {
            for obs in &observations {
                tx.execute(
                    "INSERT INTO jar_files
                         (service_id, jar_name, file_size, last_modified, is_third_party, updated_at)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                     ON CONFLICT (service_id, jar_name) DO UPDATE SET
                         file_size = excluded.file_size,
                         last_modified = excluded.last_modified,
                         is_third_party = excluded.is_third_party,
                         updated_at = excluded.updated_at",
                    params![
                        service_id,
                        obs.name,
                        obs.file_size,
                        ts_to_sql(&obs.last_modified),
                        obs.is_third_party,
                        now_sql(),
                    ],
                )?;
            }
            Ok(observations.len())
        })
    }

    /// Apply one full class listing for a service; same contract as
    /// [`Store::upsert_jar_listing`].
    pub fn upsert_class_listing(
        &mut self,
        service_id: i64,
        observations: &[ArtifactObservation],
    ) -> miette::Result<usize> {
        let observations = observations.to_vec();
        self.transaction(move |tx| {
            for obs in &observations {
                tx.execute(
                    "INSERT INTO class_files
                         (service_id, class_full_name, file_size, last_modified, updated_at)
                     VALUES (?1, ?2, ?3, ?4, ?5)
                     ON CONFLICT (service_id, class_full_name) DO UPDATE SET
                         file_size = excluded.file_size,
                         last_modified = excluded.last_modified,
                         updated_at = excluded.updated_at",
                    params![
                        service_id,
                        obs.name,
                        obs.file_size,
                        ts_to_sql(&obs.last_modified),
                        now_sql(),
                    ],
                )?;
            }
            Ok(observations.len())
        })
    }

    pub fn jars_for_service(&self, service_id: i64) -> miette::Result<Vec<JarFile>> {
        self.query_jars(
            &format!("SELECT {JAR_COLUMNS} FROM jar_files WHERE service_id = ?1 ORDER BY jar_name"),
            params![service_id],
        )
    }

    pub fn classes_for_service(&self, service_id: i64) -> miette::Result<Vec<ClassFile>> {
        self.query_classes(
            &format!(
                "SELECT {CLASS_COLUMNS} FROM class_files
                 WHERE service_id = ?1 ORDER BY class_full_name"
            ),
            params![service_id],
        )
    }

    /// All rows for one JAR name across the fleet.
    pub fn jars_named(&self, jar_name: &str) -> miette::Result<Vec<JarFile>> {
        self.query_jars(
            &format!("SELECT {JAR_COLUMNS} FROM jar_files WHERE jar_name = ?1 ORDER BY service_id"),
            params![jar_name],
        )
    }

    /// All rows for one class name across the fleet.
    pub fn classes_named(&self, class_full_name: &str) -> miette::Result<Vec<ClassFile>> {
        self.query_classes(
            &format!(
                "SELECT {CLASS_COLUMNS} FROM class_files
                 WHERE class_full_name = ?1 ORDER BY service_id"
            ),
            params![class_full_name],
        )
    }

    pub fn distinct_jar_names(&self) -> miette::Result<Vec<String>> {
        self.distinct_names("SELECT DISTINCT jar_name FROM jar_files ORDER BY jar_name")
    }

    pub fn distinct_class_names(&self) -> miette::Result<Vec<String>> {
        self.distinct_names("SELECT DISTINCT class_full_name FROM class_files ORDER BY class_full_name")
    }

    /// Record the local path of a fetched JAR binary.
    pub fn set_jar_fetched(&self, id: i64, file_path: &str) -> miette::Result<()> {
        self.touch_artifact("jar_files", "file_path", id, Some(file_path))
    }

    /// Record a successful decompile pass for a JAR row.
    pub fn set_jar_decompiled(&self, id: i64, decompile_path: &str) -> miette::Result<()> {
        self.conn()
            .execute(
                "UPDATE jar_files SET decompile_path = ?1, decompile_failed = 0, updated_at = ?2
                 WHERE id = ?3",
                params![decompile_path, now_sql(), id],
            )
            .map_err(store_err)?;
        Ok(())
    }

    /// Mark a JAR row failed for this pass; `decompile_path` stays NULL.
    pub fn set_jar_decompile_failed(&self, id: i64) -> miette::Result<()> {
        self.conn()
            .execute(
                "UPDATE jar_files SET decompile_failed = 1, updated_at = ?1 WHERE id = ?2",
                params![now_sql(), id],
            )
            .map_err(store_err)?;
        Ok(())
    }

    pub fn set_class_fetched(&self, id: i64, file_path: &str) -> miette::Result<()> {
        self.touch_artifact("class_files", "file_path", id, Some(file_path))
    }

    pub fn set_class_decompiled(&self, id: i64, decompile_path: &str) -> miette::Result<()> {
        self.conn()
            .execute(
                "UPDATE class_files SET decompile_path = ?1, decompile_failed = 0, updated_at = ?2
                 WHERE id = ?3",
                params![decompile_path, now_sql(), id],
            )
            .map_err(store_err)?;
        Ok(())
    }

    pub fn set_class_decompile_failed(&self, id: i64) -> miette::Result<()> {
        self.conn()
            .execute(
                "UPDATE class_files SET decompile_failed = 1, updated_at = ?1 WHERE id = ?2",
                params![now_sql(), id],
            )
            .map_err(store_err)?;
        Ok(())
    }

    /// Distinct sizes of one JAR name with earliest observation data, the
    /// version assigner's input.
    pub fn jar_size_observations(&self, jar_name: &str) -> miette::Result<Vec<SizeObservation>> {
        self.size_observations(
            "SELECT jf.file_size, jf.last_modified, s.service_name
             FROM jar_files jf JOIN services s ON s.id = jf.service_id
             WHERE jf.jar_name = ?1",
            jar_name,
        )
    }

    pub fn class_size_observations(
        &self,
        class_full_name: &str,
    ) -> miette::Result<Vec<SizeObservation>> {
        self.size_observations(
            "SELECT cf.file_size, cf.last_modified, s.service_name
             FROM class_files cf JOIN services s ON s.id = cf.service_id
             WHERE cf.class_full_name = ?1",
            class_full_name,
        )
    }

    /// Write a complete version numbering for one JAR name: per-size
    /// `version_no`, fleet-wide `last_version_no`, and `jar:{name}@{v}` tags
    /// on every source version reachable through the links. One transaction,
    /// so readers see the old numbering or the new one, never a mix.
    pub fn apply_jar_versions(
        &mut self,
        jar_name: &str,
        assignments: &[VersionAssignment],
        last_version_no: i64,
    ) -> miette::Result<()> {
        let jar_name = jar_name.to_string();
        let assignments = assignments.to_vec();
        self.transaction(move |tx| {
            for a in &assignments {
                tx.execute(
                    "UPDATE jar_files SET version_no = ?1, updated_at = ?2
                     WHERE jar_name = ?3 AND file_size = ?4",
                    params![a.version_no, now_sql(), jar_name, a.file_size],
                )?;
            }
            tx.execute(
                "UPDATE jar_files SET last_version_no = ?1, updated_at = ?2 WHERE jar_name = ?3",
                params![last_version_no, now_sql(), jar_name],
            )?;
            for a in &assignments {
                tx.execute(
                    "INSERT OR IGNORE INTO source_version_tags (java_source_file_version_id, tag)
                     SELECT l.java_source_file_version_id, ?1
                     FROM jar_source_links l
                     JOIN jar_files jf ON jf.id = l.jar_file_id
                     WHERE jf.jar_name = ?2 AND jf.version_no = ?3",
                    params![format!("jar:{jar_name}@{}", a.version_no), jar_name, a.version_no],
                )?;
            }
            Ok(())
        })
    }

    /// Class counterpart of [`Store::apply_jar_versions`], tagging the single
    /// source version each class row points at with `class:{name}@{v}`.
    pub fn apply_class_versions(
        &mut self,
        class_full_name: &str,
        assignments: &[VersionAssignment],
        last_version_no: i64,
    ) -> miette::Result<()> {
        let name = class_full_name.to_string();
        let assignments = assignments.to_vec();
        self.transaction(move |tx| {
            for a in &assignments {
                tx.execute(
                    "UPDATE class_files SET version_no = ?1, updated_at = ?2
                     WHERE class_full_name = ?3 AND file_size = ?4",
                    params![a.version_no, now_sql(), name, a.file_size],
                )?;
            }
            tx.execute(
                "UPDATE class_files SET last_version_no = ?1, updated_at = ?2
                 WHERE class_full_name = ?3",
                params![last_version_no, now_sql(), name],
            )?;
            for a in &assignments {
                tx.execute(
                    "INSERT OR IGNORE INTO source_version_tags (java_source_file_version_id, tag)
                     SELECT cf.java_source_file_version_id, ?1
                     FROM class_files cf
                     WHERE cf.class_full_name = ?2 AND cf.version_no = ?3
                       AND cf.java_source_file_version_id IS NOT NULL",
                    params![format!("class:{name}@{}", a.version_no), name, a.version_no],
                )?;
            }
            Ok(())
        })
    }

    fn query_jars(
        &self,
        sql: &str,
        params: impl rusqlite::Params,
    ) -> miette::Result<Vec<JarFile>> {
        let mut stmt = self.conn().prepare(sql).map_err(store_err)?;
        let rows = stmt
            .query_map(params, JarFile::from_row)
            .map_err(store_err)?
            .collect::<Result<Vec<_>, _>>()
            .map_err(store_err)?;
        Ok(rows)
    }

    fn query_classes(
        &self,
        sql: &str,
        params: impl rusqlite::Params,
    ) -> miette::Result<Vec<ClassFile>> {
        let mut stmt = self.conn().prepare(sql).map_err(store_err)?;
        let rows = stmt
            .query_map(params, ClassFile::from_row)
            .map_err(store_err)?
            .collect::<Result<Vec<_>, _>>()
            .map_err(store_err)?;
        Ok(rows)
    }

    fn distinct_names(&self, sql: &str) -> miette::Result<Vec<String>> {
        let mut stmt = self.conn().prepare(sql).map_err(store_err)?;
        let rows = stmt
            .query_map([], |r| r.get(0))
            .map_err(store_err)?
            .collect::<Result<Vec<_>, _>>()
            .map_err(store_err)?;
        Ok(rows)
    }

    fn size_observations(&self, sql: &str, name: &str) -> miette::Result<Vec<SizeObservation>> {
        let mut stmt = self.conn().prepare(sql).map_err(store_err)?;
        let rows = stmt
            .query_map(params![name], |r| {
                Ok((
                    r.get::<_, i64>(0)?,
                    ts_from_sql(&r.get::<_, String>(1)?),
                    r.get::<_, String>(2)?,
                ))
            })
            .map_err(store_err)?
            .collect::<Result<Vec<_>, _>>()
            .map_err(store_err)?;

        // Group by size, keeping the earliest sighting; among equal times the
        // lexicographically smallest service name wins so the result is stable.
        let mut by_size: BTreeMap<i64, (DateTime<Utc>, String)> = BTreeMap::new();
        for (size, mtime, service) in rows {
            match by_size.get_mut(&size) {
                None => {
                    by_size.insert(size, (mtime, service));
                }
                Some(entry) => {
                    if (mtime, &service) < (entry.0, &entry.1) {
                        *entry = (mtime, service);
                    }
                }
            }
        }
        Ok(by_size
            .into_iter()
            .map(|(file_size, (earliest_modified, first_service))| SizeObservation {
                file_size,
                earliest_modified,
                first_service,
            })
            .collect())
    }

    fn touch_artifact(
        &self,
        table: &str,
        column: &str,
        id: i64,
        value: Option<&str>,
    ) -> miette::Result<()> {
        self.conn()
            .execute(
                &format!("UPDATE {table} SET {column} = ?1, updated_at = ?2 WHERE id = ?3"),
                params![value, now_sql(), id],
            )
            .map_err(store_err)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use jarscope_core::config::ServicesDoc;

    fn seeded_store() -> (Store, i64, i64) {
        let mut store = Store::open_in_memory().unwrap();
        store
            .load_services(
                &ServicesDoc::parse(
                    r#"{"services": [
                        {"service_name": "svc-a", "environment": "prod", "host": "h1",
                         "jar_path": "/a", "classes_path": "/ac",
                         "jar_decompile_output_dir": "/oj", "class_decompile_output_dir": "/oc"},
                        {"service_name": "svc-b", "environment": "prod", "host": "h2",
                         "jar_path": "/b", "classes_path": "/bc",
                         "jar_decompile_output_dir": "/oj", "class_decompile_output_dir": "/oc"}
                    ]}"#,
                )
                .unwrap(),
            )
            .unwrap();
        let services = store.list_services().unwrap();
        let (a, b) = (services[0].id, services[1].id);
        (store, a, b)
    }

    fn obs(name: &str, size: i64, day: u32) -> ArtifactObservation {
        ArtifactObservation {
            name: name.to_string(),
            file_size: size,
            last_modified: Utc.with_ymd_and_hms(2024, 1, day, 10, 0, 0).unwrap(),
            is_third_party: false,
        }
    }

    #[test]
    fn listing_upsert_preserves_decompile_columns() {
        let (mut store, a, _) = seeded_store();
        store.upsert_jar_listing(a, &[obs("foo.jar", 1024, 1)]).unwrap();

        let jar = &store.jars_for_service(a).unwrap()[0];
        store.set_jar_decompiled(jar.id, "/out/foo/20240101-svc-a@h1").unwrap();

        // Second listing pass with a new size must not clear decompile_path.
        store.upsert_jar_listing(a, &[obs("foo.jar", 2048, 2)]).unwrap();
        let jar = &store.jars_for_service(a).unwrap()[0];
        assert_eq!(jar.file_size, 2048);
        assert_eq!(jar.decompile_path.as_deref(), Some("/out/foo/20240101-svc-a@h1"));
    }

    #[test]
    fn size_observations_group_across_services() {
        let (mut store, a, b) = seeded_store();
        store.upsert_jar_listing(a, &[obs("foo.jar", 1024, 1)]).unwrap();
        store.upsert_jar_listing(b, &[obs("foo.jar", 1024, 1), obs("bar.jar", 99, 3)]).unwrap();

        let sizes = store.jar_size_observations("foo.jar").unwrap();
        assert_eq!(sizes.len(), 1);
        assert_eq!(sizes[0].file_size, 1024);
        assert_eq!(sizes[0].first_service, "svc-a", "tie broken by service name");
    }

    #[test]
    fn apply_jar_versions_numbers_all_rows() {
        let (mut store, a, b) = seeded_store();
        store.upsert_jar_listing(a, &[obs("foo.jar", 1024, 1)]).unwrap();
        store.upsert_jar_listing(b, &[obs("foo.jar", 2048, 15)]).unwrap();

        store
            .apply_jar_versions(
                "foo.jar",
                &[
                    VersionAssignment { file_size: 1024, version_no: 1 },
                    VersionAssignment { file_size: 2048, version_no: 2 },
                ],
                2,
            )
            .unwrap();

        let rows = store.jars_named("foo.jar").unwrap();
        assert_eq!(rows.len(), 2);
        for row in &rows {
            assert_eq!(row.last_version_no, Some(2));
            let expected = if row.file_size == 1024 { 1 } else { 2 };
            assert_eq!(row.version_no, Some(expected));
        }
    }

    #[test]
    fn decompile_failure_leaves_path_null() {
        let (mut store, a, _) = seeded_store();
        store.upsert_jar_listing(a, &[obs("foo.jar", 1024, 1)]).unwrap();
        let jar = &store.jars_for_service(a).unwrap()[0];

        store.set_jar_decompile_failed(jar.id).unwrap();
        let jar = &store.jars_for_service(a).unwrap()[0];
        assert!(jar.decompile_failed);
        assert!(jar.decompile_path.is_none());
    }
}
