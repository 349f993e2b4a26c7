use std::path::Path;

use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{Connection, Transaction};

use jarscope_util::errors::JarscopeError;

/// Schema for a new database. Every table uses `IF NOT EXISTS` so opening an
/// existing store is a no-op. This is the split source model:
/// `java_source_files` is the identity, `java_source_file_versions` one row
/// per distinct content blob.
const TABLE_INITIALIZER: &str = "
CREATE TABLE IF NOT EXISTS settings (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL
);
CREATE TABLE IF NOT EXISTS services (
    id INTEGER PRIMARY KEY,
    service_name TEXT NOT NULL,
    environment TEXT NOT NULL,
    host TEXT NOT NULL,
    port INTEGER NOT NULL DEFAULT 22,
    username TEXT,
    password TEXT,
    server_base_path TEXT NOT NULL DEFAULT '',
    jar_path TEXT NOT NULL,
    classes_path TEXT NOT NULL,
    jar_decompile_output_dir TEXT NOT NULL,
    class_decompile_output_dir TEXT NOT NULL,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL,
    UNIQUE (service_name, environment)
);
CREATE TABLE IF NOT EXISTS jar_files (
    id INTEGER PRIMARY KEY,
    service_id INTEGER NOT NULL REFERENCES services(id),
    jar_name TEXT NOT NULL,
    file_size INTEGER NOT NULL,
    last_modified TEXT NOT NULL,
    is_third_party INTEGER NOT NULL DEFAULT 0,
    file_path TEXT,
    decompile_path TEXT,
    decompile_failed INTEGER NOT NULL DEFAULT 0,
    version_no INTEGER,
    last_version_no INTEGER,
    updated_at TEXT NOT NULL,
    UNIQUE (service_id, jar_name)
);
CREATE TABLE IF NOT EXISTS class_files (
    id INTEGER PRIMARY KEY,
    service_id INTEGER NOT NULL REFERENCES services(id),
    class_full_name TEXT NOT NULL,
    file_size INTEGER NOT NULL,
    last_modified TEXT NOT NULL,
    file_path TEXT,
    decompile_path TEXT,
    decompile_failed INTEGER NOT NULL DEFAULT 0,
    version_no INTEGER,
    last_version_no INTEGER,
    java_source_file_version_id INTEGER REFERENCES java_source_file_versions(id),
    updated_at TEXT NOT NULL,
    UNIQUE (service_id, class_full_name)
);
CREATE TABLE IF NOT EXISTS java_source_files (
    id INTEGER PRIMARY KEY,
    class_full_name TEXT NOT NULL UNIQUE
);
CREATE TABLE IF NOT EXISTS java_source_file_versions (
    id INTEGER PRIMARY KEY,
    java_source_file_id INTEGER NOT NULL REFERENCES java_source_files(id),
    file_content TEXT NOT NULL,
    file_size INTEGER NOT NULL,
    file_hash TEXT NOT NULL,
    line_count INTEGER NOT NULL,
    updated_at TEXT NOT NULL,
    UNIQUE (java_source_file_id, file_hash)
);
CREATE TABLE IF NOT EXISTS source_version_tags (
    java_source_file_version_id INTEGER NOT NULL REFERENCES java_source_file_versions(id),
    tag TEXT NOT NULL,
    UNIQUE (java_source_file_version_id, tag)
);
CREATE TABLE IF NOT EXISTS jar_source_links (
    jar_file_id INTEGER NOT NULL REFERENCES jar_files(id),
    java_source_file_version_id INTEGER NOT NULL REFERENCES java_source_file_versions(id),
    UNIQUE (jar_file_id, java_source_file_version_id)
);
CREATE TABLE IF NOT EXISTS diff_cache (
    id INTEGER PRIMARY KEY,
    artifact_kind TEXT NOT NULL,
    artifact_name TEXT NOT NULL,
    from_version INTEGER NOT NULL,
    to_version INTEGER NOT NULL,
    file_path TEXT NOT NULL,
    change_type TEXT NOT NULL,
    additions INTEGER NOT NULL,
    deletions INTEGER NOT NULL,
    change_percentage INTEGER NOT NULL,
    unified_text TEXT NOT NULL,
    created_at TEXT NOT NULL,
    UNIQUE (artifact_kind, artifact_name, from_version, to_version, file_path)
);
CREATE TABLE IF NOT EXISTS diff_summaries (
    artifact_kind TEXT NOT NULL,
    artifact_name TEXT NOT NULL,
    from_version INTEGER NOT NULL,
    to_version INTEGER NOT NULL,
    insertions INTEGER NOT NULL,
    deletions INTEGER NOT NULL,
    files_changed INTEGER NOT NULL,
    created_at TEXT NOT NULL,
    UNIQUE (artifact_kind, artifact_name, from_version, to_version)
);
CREATE INDEX IF NOT EXISTS idx_jar_files_name ON jar_files (jar_name);
CREATE INDEX IF NOT EXISTS idx_class_files_name ON class_files (class_full_name);
CREATE INDEX IF NOT EXISTS idx_source_versions_identity
    ON java_source_file_versions (java_source_file_id);
CREATE INDEX IF NOT EXISTS idx_jar_source_links_version
    ON jar_source_links (java_source_file_version_id);
";

/// Handle on the jarscope database.
///
/// One `Store` wraps one SQLite connection. Workers each open their own;
/// WAL mode plus a busy timeout lets them interleave short transactions.
pub struct Store {
    conn: Connection,
}

impl Store {
    /// Open (and if necessary create) the store at `path`.
    pub fn open(path: &Path) -> miette::Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                jarscope_util::fs::ensure_dir(parent).map_err(JarscopeError::Io)?;
            }
        }
        tracing::debug!("opening store at {}", path.display());
        let conn = Connection::open(path).map_err(store_err)?;
        Self::initialize(conn)
    }

    /// Open an in-memory store. Used by tests; never shared between workers.
    pub fn open_in_memory() -> miette::Result<Self> {
        let conn = Connection::open_in_memory().map_err(store_err)?;
        Self::initialize(conn)
    }

    fn initialize(conn: Connection) -> miette::Result<Self> {
        conn.execute_batch(
            "PRAGMA journal_mode=WAL;
             PRAGMA synchronous=NORMAL;
             PRAGMA foreign_keys=ON;
             PRAGMA busy_timeout=5000;",
        )
        .map_err(store_err)?;
        conn.execute_batch(TABLE_INITIALIZER).map_err(store_err)?;
        Ok(Store { conn })
    }

    pub(crate) fn conn(&self) -> &Connection {
        &self.conn
    }

    /// Persist a small key/value setting (e.g. the configured internal
    /// prefix list), so later stages see what registration saw.
    pub fn set_setting(&self, key: &str, value: &str) -> miette::Result<()> {
        self.conn
            .execute(
                "INSERT OR REPLACE INTO settings (key, value) VALUES (?1, ?2)",
                rusqlite::params![key, value],
            )
            .map_err(store_err)?;
        Ok(())
    }

    pub fn get_setting(&self, key: &str) -> miette::Result<Option<String>> {
        use rusqlite::OptionalExtension;
        self.conn
            .query_row(
                "SELECT value FROM settings WHERE key = ?1",
                rusqlite::params![key],
                |r| r.get(0),
            )
            .optional()
            .map_err(|e| store_err(e).into())
    }

    /// Run `f` inside a transaction, committing on `Ok`.
    ///
    /// A failed transaction is rolled back and retried once before the error
    /// surfaces; unique-constraint conflicts are the caller's to handle
    /// (they are recoverable "already present" signals, not failures).
    pub fn transaction<T>(
        &mut self,
        mut f: impl FnMut(&Transaction) -> Result<T, rusqlite::Error>,
    ) -> miette::Result<T> {
        let mut last_err = None;
        for _ in 0..2 {
            let tx = self.conn.transaction().map_err(store_err)?;
            match f(&tx) {
                Ok(value) => {
                    tx.commit().map_err(store_err)?;
                    return Ok(value);
                }
                Err(e) if is_constraint_violation(&e) => {
                    // Not transient; rolling back and retrying would conflict
                    // again. Surface immediately.
                    drop(tx);
                    return Err(store_err(e).into());
                }
                Err(e) => {
                    drop(tx);
                    last_err = Some(e);
                }
            }
        }
        Err(store_err(last_err.expect("retry loop ran")).into())
    }
}

pub(crate) fn store_err(e: rusqlite::Error) -> JarscopeError {
    JarscopeError::Store {
        message: e.to_string(),
    }
}

pub(crate) fn is_constraint_violation(e: &rusqlite::Error) -> bool {
    matches!(
        e,
        rusqlite::Error::SqliteFailure(err, _)
            if err.code == rusqlite::ErrorCode::ConstraintViolation
    )
}

/// Serialize a timestamp for storage. Fixed-width UTC so that string
/// comparison in SQL (`MIN`, `MAX`, `<=`) is chronological.
pub(crate) fn ts_to_sql(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub(crate) fn ts_from_sql(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_default()
}

pub(crate) fn now_sql() -> String {
    ts_to_sql(&Utc::now())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn open_creates_schema() {
        let tmp = tempfile::tempdir().unwrap();
        let store = Store::open(&tmp.path().join("jarscope.db")).unwrap();
        let count: i64 = store
            .conn()
            .query_row("SELECT COUNT(*) FROM services", [], |r| r.get(0))
            .unwrap();
        assert_eq!(count, 0);
    }

    #[test]
    fn open_is_idempotent() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("jarscope.db");
        drop(Store::open(&path).unwrap());
        assert!(Store::open(&path).is_ok());
    }

    #[test]
    fn timestamps_round_trip_and_sort_lexicographically() {
        let early = Utc.with_ymd_and_hms(2024, 1, 1, 10, 0, 0).unwrap();
        let late = Utc.with_ymd_and_hms(2024, 2, 1, 10, 0, 0).unwrap();
        assert!(ts_to_sql(&early) < ts_to_sql(&late));
        assert_eq!(ts_from_sql(&ts_to_sql(&early)), early);
    }
}
