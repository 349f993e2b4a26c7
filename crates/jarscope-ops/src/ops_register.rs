//! Stage: sync the services registry from a declarative document.

use std::path::Path;

use jarscope_core::config::ServicesDoc;
use jarscope_store::{LoadOutcome, Store};
use jarscope_util::progress;

/// Load a services document into the registry.
///
/// The document is validated in full before anything is written, so a
/// duplicate `(service_name, environment)` aborts the batch with no partial
/// writes. Re-sync never deletes.
pub fn register(db_path: &Path, config_path: &Path) -> miette::Result<LoadOutcome> {
    let doc = ServicesDoc::from_path(config_path)?;
    let mut store = Store::open(db_path)?;
    let outcome = store.load_services(&doc)?;
    if let Some(prefixes) = &doc.internal_prefixes {
        store.set_setting(crate::INTERNAL_PREFIXES_KEY, &prefixes.join("\u{1f}"))?;
    }
    progress::status(
        "Registered",
        &format!(
            "{} service(s): {} inserted, {} updated, {} unchanged",
            doc.services.len(),
            outcome.inserted,
            outcome.updated,
            outcome.skipped
        ),
    );
    Ok(outcome)
}

/// Write a sample services document for operators to start from.
pub fn create_sample(path: &Path) -> miette::Result<()> {
    ServicesDoc::write_sample(path)?;
    progress::status("Created", &format!("sample services document at {}", path.display()));
    Ok(())
}
