use rusqlite::{params, OptionalExtension, Row};
use serde::Serialize;

use jarscope_core::config::{ServiceEntry, ServicesDoc};
use jarscope_core::template::render_path;

use crate::db::{now_sql, store_err, Store};

/// A registered service row.
#[derive(Debug, Clone, Serialize)]
pub struct Service {
    pub id: i64,
    pub service_name: String,
    pub environment: String,
    pub host: String,
    pub port: u16,
    pub username: Option<String>,
    pub password: Option<String>,
    pub server_base_path: String,
    pub jar_path: String,
    pub classes_path: String,
    pub jar_decompile_output_dir: String,
    pub class_decompile_output_dir: String,
}

impl Service {
    /// Whether artifact access goes over SSH (credentials present) or hits
    /// the local filesystem.
    pub fn is_remote(&self) -> bool {
        self.username.as_deref().is_some_and(|u| !u.is_empty())
            && self.password.as_deref().is_some_and(|p| !p.is_empty())
    }

    /// Concrete JAR directory for this service, placeholders substituted.
    pub fn rendered_jar_path(&self) -> miette::Result<String> {
        render_path(&self.jar_path, &self.service_name, &self.server_base_path)
    }

    /// Concrete classes directory for this service.
    pub fn rendered_classes_path(&self) -> miette::Result<String> {
        render_path(&self.classes_path, &self.service_name, &self.server_base_path)
    }

    /// Concrete local root for JAR decompile output.
    pub fn rendered_jar_output_dir(&self) -> miette::Result<String> {
        render_path(
            &self.jar_decompile_output_dir,
            &self.service_name,
            &self.server_base_path,
        )
    }

    /// Concrete local root for class decompile output.
    pub fn rendered_class_output_dir(&self) -> miette::Result<String> {
        render_path(
            &self.class_decompile_output_dir,
            &self.service_name,
            &self.server_base_path,
        )
    }

    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        Ok(Service {
            id: row.get("id")?,
            service_name: row.get("service_name")?,
            environment: row.get("environment")?,
            host: row.get("host")?,
            port: row.get::<_, i64>("port")? as u16,
            username: row.get("username")?,
            password: row.get("password")?,
            server_base_path: row.get("server_base_path")?,
            jar_path: row.get("jar_path")?,
            classes_path: row.get("classes_path")?,
            jar_decompile_output_dir: row.get("jar_decompile_output_dir")?,
            class_decompile_output_dir: row.get("class_decompile_output_dir")?,
        })
    }
}

/// Outcome of loading a services document.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct LoadOutcome {
    pub inserted: u32,
    pub updated: u32,
    pub skipped: u32,
}

const SERVICE_COLUMNS: &str = "id, service_name, environment, host, port, username, password, \
     server_base_path, jar_path, classes_path, jar_decompile_output_dir, \
     class_decompile_output_dir";

impl Store {
    /// Sync a validated services document into the store. Existing rows are
    /// updated in place, identical rows skipped; nothing is ever deleted.
    /// The whole load is one transaction, so a failure writes nothing.
    pub fn load_services(&mut self, doc: &ServicesDoc) -> miette::Result<LoadOutcome> {
        let entries = doc.services.clone();
        self.transaction(move |tx| {
            let mut outcome = LoadOutcome::default();
            for entry in &entries {
                let existing: Option<i64> = tx
                    .query_row(
                        "SELECT id FROM services WHERE service_name = ?1 AND environment = ?2",
                        params![entry.service_name, entry.environment],
                        |r| r.get(0),
                    )
                    .optional()?;

                match existing {
                    None => {
                        insert_service(tx, entry)?;
                        outcome.inserted += 1;
                    }
                    Some(id) if service_changed(tx, id, entry)? => {
                        update_service(tx, id, entry)?;
                        outcome.updated += 1;
                    }
                    Some(_) => outcome.skipped += 1,
                }
            }
            Ok(outcome)
        })
    }

    /// All registered services, ordered by name then environment.
    pub fn list_services(&self) -> miette::Result<Vec<Service>> {
        let mut stmt = self
            .conn()
            .prepare(&format!(
                "SELECT {SERVICE_COLUMNS} FROM services ORDER BY service_name, environment"
            ))
            .map_err(store_err)?;
        let rows = stmt
            .query_map([], Service::from_row)
            .map_err(store_err)?
            .collect::<Result<Vec<_>, _>>()
            .map_err(store_err)?;
        Ok(rows)
    }

    pub fn get_service(&self, id: i64) -> miette::Result<Option<Service>> {
        self.conn()
            .query_row(
                &format!("SELECT {SERVICE_COLUMNS} FROM services WHERE id = ?1"),
                params![id],
                Service::from_row,
            )
            .optional()
            .map_err(|e| store_err(e).into())
    }

    /// Services matching a `--service NAME` selector, optionally narrowed by
    /// environment.
    pub fn find_services(
        &self,
        name: Option<&str>,
        environment: Option<&str>,
    ) -> miette::Result<Vec<Service>> {
        let all = self.list_services()?;
        Ok(all
            .into_iter()
            .filter(|s| name.map_or(true, |n| s.service_name == n))
            .filter(|s| environment.map_or(true, |e| s.environment == e))
            .collect())
    }
}

fn insert_service(tx: &rusqlite::Transaction, entry: &ServiceEntry) -> rusqlite::Result<()> {
    let now = now_sql();
    tx.execute(
        "INSERT INTO services (service_name, environment, host, port, username, password,
             server_base_path, jar_path, classes_path, jar_decompile_output_dir,
             class_decompile_output_dir, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?12)",
        params![
            entry.service_name,
            entry.environment,
            entry.host,
            entry.port,
            entry.username,
            entry.password,
            entry.server_base_path,
            entry.jar_path,
            entry.classes_path,
            entry.jar_decompile_output_dir,
            entry.class_decompile_output_dir,
            now,
        ],
    )?;
    Ok(())
}

fn update_service(
    tx: &rusqlite::Transaction,
    id: i64,
    entry: &ServiceEntry,
) -> rusqlite::Result<()> {
    tx.execute(
        "UPDATE services SET host = ?1, port = ?2, username = ?3, password = ?4,
             server_base_path = ?5, jar_path = ?6, classes_path = ?7,
             jar_decompile_output_dir = ?8, class_decompile_output_dir = ?9,
             updated_at = ?10
         WHERE id = ?11",
        params![
            entry.host,
            entry.port,
            entry.username,
            entry.password,
            entry.server_base_path,
            entry.jar_path,
            entry.classes_path,
            entry.jar_decompile_output_dir,
            entry.class_decompile_output_dir,
            now_sql(),
            id,
        ],
    )?;
    Ok(())
}

fn service_changed(
    tx: &rusqlite::Transaction,
    id: i64,
    entry: &ServiceEntry,
) -> rusqlite::Result<bool> {
    tx.query_row(
        "SELECT NOT (host = ?1 AND port = ?2
             AND COALESCE(username, '') = COALESCE(?3, '')
             AND COALESCE(password, '') = COALESCE(?4, '')
             AND server_base_path = ?5 AND jar_path = ?6 AND classes_path = ?7
             AND jar_decompile_output_dir = ?8 AND class_decompile_output_dir = ?9)
         FROM services WHERE id = ?10",
        params![
            entry.host,
            entry.port,
            entry.username,
            entry.password,
            entry.server_base_path,
            entry.jar_path,
            entry.classes_path,
            entry.jar_decompile_output_dir,
            entry.class_decompile_output_dir,
            id,
        ],
        |r| r.get(0),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use jarscope_core::config::ServicesDoc;

    fn doc(json: &str) -> ServicesDoc {
        ServicesDoc::parse(json).unwrap()
    }

    fn two_services() -> ServicesDoc {
        doc(r#"{"services": [
            {"service_name": "svc-a", "environment": "prod", "host": "h1",
             "jar_path": "/a/lib", "classes_path": "/a/classes",
             "jar_decompile_output_dir": "/out/j", "class_decompile_output_dir": "/out/c"},
            {"service_name": "svc-b", "environment": "prod", "host": "h2",
             "jar_path": "/b/lib", "classes_path": "/b/classes",
             "jar_decompile_output_dir": "/out/j", "class_decompile_output_dir": "/out/c"}
        ]}"#)
    }

    #[test]
    fn load_inserts_then_skips() {
        let mut store = Store::open_in_memory().unwrap();
        let outcome = store.load_services(&two_services()).unwrap();
        assert_eq!(outcome, LoadOutcome { inserted: 2, updated: 0, skipped: 0 });

        let outcome = store.load_services(&two_services()).unwrap();
        assert_eq!(outcome, LoadOutcome { inserted: 0, updated: 0, skipped: 2 });
        assert_eq!(store.list_services().unwrap().len(), 2);
    }

    #[test]
    fn load_updates_changed_rows_without_deleting() {
        let mut store = Store::open_in_memory().unwrap();
        store.load_services(&two_services()).unwrap();

        let changed = doc(r#"{"services": [
            {"service_name": "svc-a", "environment": "prod", "host": "h1-new",
             "jar_path": "/a/lib", "classes_path": "/a/classes",
             "jar_decompile_output_dir": "/out/j", "class_decompile_output_dir": "/out/c"}
        ]}"#);
        let outcome = store.load_services(&changed).unwrap();
        assert_eq!(outcome, LoadOutcome { inserted: 0, updated: 1, skipped: 0 });

        let services = store.list_services().unwrap();
        assert_eq!(services.len(), 2, "re-sync must never delete");
        assert_eq!(services[0].host, "h1-new");
    }

    #[test]
    fn find_services_filters_by_name_and_environment() {
        let mut store = Store::open_in_memory().unwrap();
        store.load_services(&two_services()).unwrap();

        assert_eq!(store.find_services(Some("svc-a"), None).unwrap().len(), 1);
        assert_eq!(store.find_services(None, Some("prod")).unwrap().len(), 2);
        assert_eq!(store.find_services(Some("svc-a"), Some("staging")).unwrap().len(), 0);
    }

    #[test]
    fn rendered_paths_substitute_templates() {
        let mut store = Store::open_in_memory().unwrap();
        store.load_services(&doc(r#"{"services": [
            {"service_name": "svc-a", "environment": "prod", "host": "h1",
             "server_base_path": "/opt/apps",
             "jar_path": "{server_base_path}/{service_name}/lib",
             "classes_path": "{server_base_path}/{service_name}/classes",
             "jar_decompile_output_dir": "/out/j", "class_decompile_output_dir": "/out/c"}
        ]}"#)).unwrap();

        let svc = &store.list_services().unwrap()[0];
        assert_eq!(svc.rendered_jar_path().unwrap(), "/opt/apps/svc-a/lib");
        assert_eq!(svc.rendered_classes_path().unwrap(), "/opt/apps/svc-a/classes");
    }
}
