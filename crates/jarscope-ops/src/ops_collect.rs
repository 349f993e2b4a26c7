//! Stages: list JARs and loose class files across the fleet.
//!
//! Listings are collected in full per service before any write, so a
//! transport failure leaves that service's prior rows untouched. Services
//! are sharded across a bounded pool; the store write happens on the main
//! task in one transaction per service.

use std::path::Path;
use std::sync::Arc;

use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::warn;

use jarscope_core::artifact::{class_name_from_class_path, is_third_party};
use jarscope_store::{ArtifactObservation, Service, Store};
use jarscope_transport::Listing;
use jarscope_util::progress;

use crate::{transport_for, ServiceSelector};

const MAX_CONCURRENT_LISTINGS: usize = 8;

/// Outcome of one collection pass.
#[derive(Debug, Default)]
pub struct CollectSummary {
    pub services_ok: u32,
    pub services_failed: u32,
    pub artifacts: u32,
    pub skipped_lines: u32,
}

impl CollectSummary {
    /// Exit code mapping: clean pass 0, every service down 3, mixed 1.
    pub fn exit_code(&self) -> i32 {
        if self.services_failed == 0 {
            0
        } else if self.services_ok == 0 {
            3
        } else {
            1
        }
    }
}

/// List and upsert `(jar_name, size, mtime)` for the selected services.
pub async fn collect_jars(db_path: &Path, selector: &ServiceSelector) -> miette::Result<CollectSummary> {
    let mut store = Store::open(db_path)?;
    let services = selector.resolve(&store)?;
    let prefixes = crate::effective_prefixes(&store)?;

    let sp = progress::spinner(&format!("Listing {} jar director(ies)...", services.len()));
    let listings = gather_listings(&services, ListKind::Jars)?.await;
    sp.finish_and_clear();

    let mut summary = CollectSummary::default();
    for (service, result) in listings {
        match result {
            Ok(listing) => {
                let observations: Vec<ArtifactObservation> = listing
                    .entries
                    .iter()
                    .filter(|e| e.name.ends_with(".jar"))
                    .map(|e| ArtifactObservation {
                        name: e.name.clone(),
                        file_size: e.file_size,
                        last_modified: e.modified,
                        is_third_party: is_third_party(&e.name, &prefixes),
                    })
                    .collect();
                let count = store.upsert_jar_listing(service.id, &observations)?;
                record_pass(&mut summary, &service, count, &listing, "jar(s)");
            }
            Err(e) => record_failure(&mut summary, &service, &e),
        }
    }
    report(&summary, "jar");
    Ok(summary)
}

/// Same as [`collect_jars`] for loose `.class` files; the
/// fully-qualified class name comes from the path below `classes_path`.
pub async fn collect_classes(
    db_path: &Path,
    selector: &ServiceSelector,
) -> miette::Result<CollectSummary> {
    let mut store = Store::open(db_path)?;
    let services = selector.resolve(&store)?;

    let sp = progress::spinner(&format!("Listing {} class tree(s)...", services.len()));
    let listings = gather_listings(&services, ListKind::Classes)?.await;
    sp.finish_and_clear();

    let mut summary = CollectSummary::default();
    for (service, result) in listings {
        match result {
            Ok(listing) => {
                let observations: Vec<ArtifactObservation> = listing
                    .entries
                    .iter()
                    .filter_map(|e| {
                        class_name_from_class_path(&e.name).map(|name| ArtifactObservation {
                            name,
                            file_size: e.file_size,
                            last_modified: e.modified,
                            is_third_party: false,
                        })
                    })
                    .collect();
                let count = store.upsert_class_listing(service.id, &observations)?;
                record_pass(&mut summary, &service, count, &listing, "class(es)");
            }
            Err(e) => record_failure(&mut summary, &service, &e),
        }
    }
    report(&summary, "class");
    Ok(summary)
}

#[derive(Clone, Copy)]
enum ListKind {
    Jars,
    Classes,
}

type ServiceListing = (Service, miette::Result<Listing>);

/// Fan listings out over a bounded pool. Path templates render before any
/// task spawns, so a bad placeholder aborts the command with nothing
/// in flight.
fn gather_listings(
    services: &[Service],
    kind: ListKind,
) -> miette::Result<impl std::future::Future<Output = Vec<ServiceListing>>> {
    let mut work = Vec::with_capacity(services.len());
    for service in services {
        let dir = match kind {
            ListKind::Jars => service.rendered_jar_path()?,
            ListKind::Classes => service.rendered_classes_path()?,
        };
        work.push((service.clone(), dir));
    }

    Ok(async move {
        let semaphore = Arc::new(Semaphore::new(MAX_CONCURRENT_LISTINGS));
        let mut join_set = JoinSet::new();
        for (service, dir) in work {
            let sem = semaphore.clone();
            join_set.spawn(async move {
                let _permit = sem.acquire().await.expect("semaphore open");
                let transport = transport_for(&service);
                let result = match kind {
                    ListKind::Jars => transport.list(&dir).await,
                    ListKind::Classes => transport.list_recursive(&dir).await,
                };
                (service, result)
            });
        }

        let mut listings = Vec::new();
        while let Some(joined) = join_set.join_next().await {
            if let Ok(pair) = joined {
                listings.push(pair);
            }
        }
        listings.sort_by(|a, b| a.0.service_name.cmp(&b.0.service_name));
        listings
    })
}

fn record_pass(
    summary: &mut CollectSummary,
    service: &Service,
    count: usize,
    listing: &Listing,
    noun: &str,
) {
    summary.services_ok += 1;
    summary.artifacts += count as u32;
    summary.skipped_lines += listing.skipped_lines;
    if listing.skipped_lines > 0 {
        warn!(
            service = %service.service_name,
            skipped = listing.skipped_lines,
            "malformed listing lines skipped"
        );
    }
    progress::status("Collected", &format!("{count} {noun} from {}", service.service_name));
}

fn record_failure(summary: &mut CollectSummary, service: &Service, error: &miette::Report) {
    summary.services_failed += 1;
    progress::status_warn(
        "Failed",
        &format!("{}: {error}", service.service_name),
    );
}

fn report(summary: &CollectSummary, kind: &str) {
    progress::status_info(
        "Done",
        &format!(
            "{} {kind} artifact(s) across {} service(s), {} failed",
            summary.artifacts, summary.services_ok, summary.services_failed
        ),
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use jarscope_core::config::ServicesDoc;

    fn local_fleet(tmp: &Path, services: &[(&str, &str)]) -> std::path::PathBuf {
        let db = tmp.join("jarscope.db");
        let mut store = Store::open(&db).unwrap();
        let entries: Vec<String> = services
            .iter()
            .map(|(name, root)| {
                format!(
                    r#"{{"service_name": "{name}", "environment": "prod", "host": "localhost",
                        "jar_path": "{root}/lib", "classes_path": "{root}/classes",
                        "jar_decompile_output_dir": "{root}/out/jars",
                        "class_decompile_output_dir": "{root}/out/classes"}}"#
                )
            })
            .collect();
        let doc = format!(r#"{{"services": [{}]}}"#, entries.join(","));
        store.load_services(&ServicesDoc::parse(&doc).unwrap()).unwrap();
        db
    }

    #[tokio::test]
    async fn collect_jars_from_local_mirror() {
        let tmp = tempfile::tempdir().unwrap();
        let root = tmp.path().join("svc-a");
        std::fs::create_dir_all(root.join("lib")).unwrap();
        std::fs::write(root.join("lib/core-orders.jar"), vec![0u8; 1024]).unwrap();
        std::fs::write(root.join("lib/guava.jar"), vec![0u8; 64]).unwrap();
        std::fs::write(root.join("lib/readme.txt"), b"not a jar").unwrap();

        let db = local_fleet(tmp.path(), &[("svc-a", root.to_str().unwrap())]);
        let selector = ServiceSelector { all_services: true, ..Default::default() };
        let summary = collect_jars(&db, &selector).await.unwrap();

        assert_eq!(summary.services_ok, 1);
        assert_eq!(summary.artifacts, 2);
        assert_eq!(summary.exit_code(), 0);

        let store = Store::open(&db).unwrap();
        let service_id = store.list_services().unwrap()[0].id;
        let jars = store.jars_for_service(service_id).unwrap();
        assert_eq!(jars.len(), 2);
        let core = jars.iter().find(|j| j.jar_name == "core-orders.jar").unwrap();
        assert!(!core.is_third_party);
        assert_eq!(core.file_size, 1024);
        let guava = jars.iter().find(|j| j.jar_name == "guava.jar").unwrap();
        assert!(guava.is_third_party);
    }

    #[tokio::test]
    async fn collect_classes_derives_full_names() {
        let tmp = tempfile::tempdir().unwrap();
        let root = tmp.path().join("svc-a");
        std::fs::create_dir_all(root.join("classes/com/x")).unwrap();
        std::fs::write(root.join("classes/com/x/Z.class"), vec![0u8; 512]).unwrap();
        std::fs::write(root.join("classes/com/x/Outer$Inner.class"), vec![0u8; 64]).unwrap();

        let db = local_fleet(tmp.path(), &[("svc-a", root.to_str().unwrap())]);
        let selector = ServiceSelector { all_services: true, ..Default::default() };
        let summary = collect_classes(&db, &selector).await.unwrap();
        assert_eq!(summary.artifacts, 2);

        let store = Store::open(&db).unwrap();
        let service_id = store.list_services().unwrap()[0].id;
        let classes = store.classes_for_service(service_id).unwrap();
        let names: Vec<&str> = classes.iter().map(|c| c.class_full_name.as_str()).collect();
        assert_eq!(names, vec!["com.x.Outer$Inner", "com.x.Z"]);
    }

    #[tokio::test]
    async fn unreachable_service_fails_without_touching_others() {
        let tmp = tempfile::tempdir().unwrap();
        let root = tmp.path().join("svc-a");
        std::fs::create_dir_all(root.join("lib")).unwrap();
        std::fs::write(root.join("lib/app-x.jar"), vec![0u8; 10]).unwrap();

        let db = local_fleet(
            tmp.path(),
            &[("svc-a", root.to_str().unwrap()), ("svc-gone", "/nonexistent")],
        );
        let selector = ServiceSelector { all_services: true, ..Default::default() };
        let summary = collect_jars(&db, &selector).await.unwrap();

        assert_eq!(summary.services_ok, 1);
        assert_eq!(summary.services_failed, 1);
        assert_eq!(summary.exit_code(), 1);
    }

    #[tokio::test]
    async fn all_services_down_is_transport_exit() {
        let tmp = tempfile::tempdir().unwrap();
        let db = local_fleet(tmp.path(), &[("svc-gone", "/nonexistent")]);
        let selector = ServiceSelector { all_services: true, ..Default::default() };
        let summary = collect_jars(&db, &selector).await.unwrap();
        assert_eq!(summary.exit_code(), 3);
    }

    #[tokio::test]
    async fn empty_selector_is_config_error() {
        let tmp = tempfile::tempdir().unwrap();
        let db = local_fleet(tmp.path(), &[("svc-a", "/whatever")]);
        let selector = ServiceSelector::default();
        assert!(collect_jars(&db, &selector).await.is_err());
    }
}
