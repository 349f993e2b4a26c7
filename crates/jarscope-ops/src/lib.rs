//! Pipeline stages.
//!
//! Each op is one batch stage of the inventory pipeline, addressable by
//! service/artifact selectors so it can be re-run incrementally. Ops return
//! summaries; mapping summaries to process exit codes is the CLI's job.

pub mod ops_collect;
pub mod ops_decompile;
pub mod ops_diff;
pub mod ops_ingest;
pub mod ops_register;
pub mod ops_sweep;
pub mod ops_versions;

use jarscope_store::{Service, Store};
use jarscope_transport::Transport;
use jarscope_util::errors::JarscopeError;

/// Settings key holding the configured internal JAR prefix list.
pub(crate) const INTERNAL_PREFIXES_KEY: &str = "internal_prefixes";

/// The internal-prefix list the registry was loaded with, or the built-in
/// default when none was configured.
pub fn effective_prefixes(store: &Store) -> miette::Result<Vec<String>> {
    match store.get_setting(INTERNAL_PREFIXES_KEY)? {
        Some(joined) if !joined.is_empty() => {
            Ok(joined.split('\u{1f}').map(|s| s.to_string()).collect())
        }
        _ => Ok(jarscope_core::artifact::internal_prefixes(None)),
    }
}

/// The `--service NAME` / `--all-services` selector shared by every stage.
#[derive(Debug, Clone, Default)]
pub struct ServiceSelector {
    pub service: Option<String>,
    pub environment: Option<String>,
    pub all_services: bool,
}

impl ServiceSelector {
    /// Resolve the selector against the registry. Selecting nothing is a
    /// config error; selecting a name that matches nothing is too.
    pub fn resolve(&self, store: &Store) -> miette::Result<Vec<Service>> {
        if self.service.is_none() && !self.all_services {
            return Err(JarscopeError::Config {
                message: "pass --service NAME or --all-services".to_string(),
            }
            .into());
        }
        let services = store.find_services(self.service.as_deref(), self.environment.as_deref())?;
        if services.is_empty() {
            return Err(JarscopeError::Config {
                message: match &self.service {
                    Some(name) => format!("no registered service matches {name:?}"),
                    None => "no services registered".to_string(),
                },
            }
            .into());
        }
        Ok(services)
    }
}

/// Transport for one service: SSH when credentials are present, local
/// filesystem otherwise.
pub fn transport_for(service: &Service) -> Transport {
    if service.is_remote() {
        Transport::ssh(
            &service.host,
            service.port,
            service.username.as_deref().unwrap_or_default(),
            service.password.as_deref().unwrap_or_default(),
        )
    } else {
        Transport::local()
    }
}
