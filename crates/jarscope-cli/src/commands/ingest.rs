use std::path::Path;

use jarscope_ops::ops_ingest::{self, IngestFilter};
use jarscope_ops::ServiceSelector;

pub fn exec(
    db: &Path,
    selector: ServiceSelector,
    jar_name: Option<String>,
    class_name: Option<String>,
    dry_run: bool,
) -> miette::Result<i32> {
    let filter = IngestFilter {
        selector,
        jar_name,
        class_name,
        dry_run,
    };
    let summary = ops_ingest::ingest_sources(db, &filter)?;

    if dry_run {
        for (class_full_name, path) in &summary.planned {
            println!("{class_full_name}  {}", path.display());
        }
    }
    Ok(0)
}
