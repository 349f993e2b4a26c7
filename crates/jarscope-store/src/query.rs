//! Read-only query functions consumed by the HTTP layer and exporters.
//!
//! Nothing in this module mutates the store.

use chrono::{DateTime, Utc};
use serde::Serialize;

use jarscope_core::artifact::ArtifactKind;
use jarscope_util::hash::sha256_bytes;

use crate::db::store_err;
use crate::{SourceFile, Store};

/// Substring search hits over artifact names.
#[derive(Debug, Default, Serialize)]
pub struct SearchHits {
    pub jars: Vec<String>,
    pub classes: Vec<String>,
}

/// One assigned version of an artifact name, with its fleet footprint.
#[derive(Debug, Serialize)]
pub struct VersionInfo {
    pub version_no: i64,
    pub file_size: i64,
    pub earliest_observed: DateTime<Utc>,
    pub latest_observed: DateTime<Utc>,
    pub services: Vec<String>,
    /// sha-256 over the concatenation of the sorted per-file content hashes,
    /// a cheap fingerprint of the whole source set.
    pub source_hash: String,
}

/// Substring match over jar names and/or class names.
pub fn search(store: &Store, query: &str, kinds: &[ArtifactKind]) -> miette::Result<SearchHits> {
    let mut hits = SearchHits::default();
    let pattern = format!("%{}%", query.replace('%', "\\%").replace('_', "\\_"));

    if kinds.contains(&ArtifactKind::Jar) {
        let mut stmt = store
            .conn()
            .prepare(
                "SELECT DISTINCT jar_name FROM jar_files
                 WHERE jar_name LIKE ?1 ESCAPE '\\' ORDER BY jar_name",
            )
            .map_err(store_err)?;
        hits.jars = stmt
            .query_map([&pattern], |r| r.get(0))
            .map_err(store_err)?
            .collect::<Result<Vec<_>, _>>()
            .map_err(store_err)?;
    }
    if kinds.contains(&ArtifactKind::Class) {
        let mut stmt = store
            .conn()
            .prepare(
                "SELECT DISTINCT class_full_name FROM class_files
                 WHERE class_full_name LIKE ?1 ESCAPE '\\' ORDER BY class_full_name",
            )
            .map_err(store_err)?;
        hits.classes = stmt
            .query_map([&pattern], |r| r.get(0))
            .map_err(store_err)?
            .collect::<Result<Vec<_>, _>>()
            .map_err(store_err)?;
    }
    Ok(hits)
}

/// The assigned versions of one artifact name, ordered by version number.
pub fn versions(store: &Store, kind: ArtifactKind, name: &str) -> miette::Result<Vec<VersionInfo>> {
    let sql = match kind {
        ArtifactKind::Jar => {
            "SELECT jf.version_no, jf.file_size, MIN(jf.last_modified), MAX(jf.last_modified),
                    GROUP_CONCAT(s.service_name, '\u{1f}')
             FROM jar_files jf JOIN services s ON s.id = jf.service_id
             WHERE jf.jar_name = ?1 AND jf.version_no IS NOT NULL
             GROUP BY jf.version_no, jf.file_size
             ORDER BY jf.version_no"
        }
        ArtifactKind::Class => {
            "SELECT cf.version_no, cf.file_size, MIN(cf.last_modified), MAX(cf.last_modified),
                    GROUP_CONCAT(s.service_name, '\u{1f}')
             FROM class_files cf JOIN services s ON s.id = cf.service_id
             WHERE cf.class_full_name = ?1 AND cf.version_no IS NOT NULL
             GROUP BY cf.version_no, cf.file_size
             ORDER BY cf.version_no"
        }
    };

    let mut stmt = store.conn().prepare(sql).map_err(store_err)?;
    let rows = stmt
        .query_map([name], |r| {
            Ok((
                r.get::<_, i64>(0)?,
                r.get::<_, i64>(1)?,
                r.get::<_, String>(2)?,
                r.get::<_, String>(3)?,
                r.get::<_, String>(4)?,
            ))
        })
        .map_err(store_err)?
        .collect::<Result<Vec<_>, _>>()
        .map_err(store_err)?;

    let mut infos = Vec::with_capacity(rows.len());
    for (version_no, file_size, earliest, latest, services) in rows {
        let mut service_names: Vec<String> =
            services.split('\u{1f}').map(|s| s.to_string()).collect();
        service_names.sort();
        service_names.dedup();

        infos.push(VersionInfo {
            version_no,
            file_size,
            earliest_observed: crate::db::ts_from_sql(&earliest),
            latest_observed: crate::db::ts_from_sql(&latest),
            services: service_names,
            source_hash: aggregate_source_hash(&sources(store, kind, name, version_no)?),
        });
    }
    Ok(infos)
}

/// File paths and contents for one version endpoint.
pub fn sources(
    store: &Store,
    kind: ArtifactKind,
    name: &str,
    version_no: i64,
) -> miette::Result<Vec<SourceFile>> {
    match kind {
        ArtifactKind::Jar => store.sources_for_jar_version(name, version_no),
        ArtifactKind::Class => Ok(store
            .source_for_class_version(name, version_no)?
            .into_iter()
            .collect()),
    }
}

fn aggregate_source_hash(files: &[SourceFile]) -> String {
    let mut hashes: Vec<&str> = files.iter().map(|f| f.file_hash.as_str()).collect();
    hashes.sort();
    sha256_bytes(hashes.concat().as_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use jarscope_core::config::ServicesDoc;
    use jarscope_util::hash::source_fingerprint;

    use crate::{ArtifactObservation, VersionAssignment};

    fn seeded() -> Store {
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
        let mtime = Utc.with_ymd_and_hms(2024, 1, 1, 10, 0, 0).unwrap();
        for svc in &services {
            store
                .upsert_jar_listing(
                    svc.id,
                    &[ArtifactObservation {
                        name: "foo.jar".to_string(),
                        file_size: 1024,
                        last_modified: mtime,
                        is_third_party: false,
                    }],
                )
                .unwrap();
        }
        store
            .apply_jar_versions(
                "foo.jar",
                &[VersionAssignment { file_size: 1024, version_no: 1 }],
                1,
            )
            .unwrap();
        store
    }

    #[test]
    fn search_matches_substrings_per_kind() {
        let store = seeded();
        let hits = search(&store, "foo", &[ArtifactKind::Jar, ArtifactKind::Class]).unwrap();
        assert_eq!(hits.jars, vec!["foo.jar"]);
        assert!(hits.classes.is_empty());

        let none = search(&store, "zzz", &[ArtifactKind::Jar]).unwrap();
        assert!(none.jars.is_empty());
    }

    #[test]
    fn versions_report_fleet_footprint() {
        let store = seeded();
        let infos = versions(&store, ArtifactKind::Jar, "foo.jar").unwrap();
        assert_eq!(infos.len(), 1);
        assert_eq!(infos[0].version_no, 1);
        assert_eq!(infos[0].file_size, 1024);
        assert_eq!(infos[0].services, vec!["svc-a", "svc-b"]);
    }

    #[test]
    fn aggregate_hash_is_order_insensitive() {
        let mk = |class: &str, content: &str| {
            let (file_hash, line_count) = source_fingerprint(content);
            SourceFile {
                class_full_name: class.to_string(),
                file_content: content.to_string(),
                file_hash,
                line_count: line_count as i64,
                updated_at: Utc::now(),
            }
        };
        let a = mk("com.x.A", "class A {}");
        let b = mk("com.x.B", "class B {}");
        assert_eq!(
            aggregate_source_hash(&[a.clone(), b.clone()]),
            aggregate_source_hash(&[b, a])
        );
    }
}
