use std::path::Path;

use jarscope_core::artifact::ArtifactKind;
use jarscope_store::{query, Store};

use super::diff::parse_kind;

pub fn exec_versions(db: &Path, kind: &str, name: &str) -> miette::Result<i32> {
    let store = Store::open(db)?;
    let infos = query::versions(&store, parse_kind(kind)?, name)?;
    if infos.is_empty() {
        println!("no versions assigned for {kind} {name}");
        return Ok(0);
    }
    for info in infos {
        println!(
            "v{}  size {}  first {}  last {}  services {}  source {}",
            info.version_no,
            info.file_size,
            info.earliest_observed.format("%Y-%m-%d %H:%M:%S"),
            info.latest_observed.format("%Y-%m-%d %H:%M:%S"),
            info.services.join(","),
            &info.source_hash[..12.min(info.source_hash.len())],
        );
    }
    Ok(0)
}

pub fn exec_search(db: &Path, q: &str, kind: Option<&str>) -> miette::Result<i32> {
    let store = Store::open(db)?;
    let kinds = match kind {
        Some(k) => vec![parse_kind(k)?],
        None => vec![ArtifactKind::Jar, ArtifactKind::Class],
    };
    let hits = query::search(&store, q, &kinds)?;
    for jar in &hits.jars {
        println!("jar {jar}");
    }
    for class in &hits.classes {
        println!("class {class}");
    }
    Ok(0)
}

pub fn exec_services(db: &Path) -> miette::Result<i32> {
    let store = Store::open(db)?;
    for service in store.list_services()? {
        println!(
            "{}  [{}]  {}:{}  {}",
            service.service_name,
            service.environment,
            service.host,
            service.port,
            if service.is_remote() { "ssh" } else { "local" },
        );
    }
    Ok(0)
}
