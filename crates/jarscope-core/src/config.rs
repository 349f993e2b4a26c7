use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};

use jarscope_util::errors::JarscopeError;

/// The declarative services document, loaded from a JSON file.
///
/// Unknown keys are ignored; missing required keys are a config error.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServicesDoc {
    pub services: Vec<ServiceEntry>,

    /// JAR name prefixes classified as internal (first-party). When absent,
    /// the built-in list from [`crate::artifact::DEFAULT_INTERNAL_PREFIXES`]
    /// applies.
    #[serde(default)]
    pub internal_prefixes: Option<Vec<String>>,
}

/// One service descriptor: where it runs and where its artifacts live.
///
/// Empty `username` and `password` mean the paths are local, not SSH.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceEntry {
    pub service_name: String,
    pub environment: String,
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    #[serde(default)]
    pub username: Option<String>,

    #[serde(default)]
    pub password: Option<String>,

    #[serde(default)]
    pub server_base_path: String,

    /// Remote directory holding the service's JARs. May reference
    /// `{service_name}` and `{server_base_path}`.
    pub jar_path: String,

    /// Remote directory holding the service's loose `.class` files.
    pub classes_path: String,

    /// Local root for JAR decompile output.
    pub jar_decompile_output_dir: String,

    /// Local root for class decompile output.
    pub class_decompile_output_dir: String,
}

fn default_port() -> u16 {
    22
}

impl ServiceEntry {
    /// Whether this service is reached over SSH or by statting local paths.
    pub fn is_remote(&self) -> bool {
        self.username.as_deref().is_some_and(|u| !u.is_empty())
            && self.password.as_deref().is_some_and(|p| !p.is_empty())
    }
}

impl ServicesDoc {
    /// Load and validate a services document from a JSON file.
    pub fn from_path(path: &Path) -> miette::Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| JarscopeError::Config {
            message: format!("Failed to read {}: {e}", path.display()),
        })?;
        Self::parse(&content)
    }

    /// Parse and validate a services document from JSON text.
    pub fn parse(content: &str) -> miette::Result<Self> {
        let doc: ServicesDoc =
            serde_json::from_str(content).map_err(|e| JarscopeError::Config {
                message: format!("Invalid services document: {e}"),
            })?;
        doc.validate()?;
        Ok(doc)
    }

    /// Reject documents that would violate store uniqueness before any write.
    fn validate(&self) -> miette::Result<()> {
        let mut seen: HashSet<(&str, &str)> = HashSet::new();
        for entry in &self.services {
            if entry.service_name.is_empty() {
                return Err(JarscopeError::Config {
                    message: "service_name must not be empty".to_string(),
                }
                .into());
            }
            let key = (entry.service_name.as_str(), entry.environment.as_str());
            if !seen.insert(key) {
                return Err(JarscopeError::Config {
                    message: format!(
                        "Duplicate service ({}, {}) in input document",
                        entry.service_name, entry.environment
                    ),
                }
                .into());
            }
        }
        Ok(())
    }

    /// Write a sample document operators can edit into a real fleet config.
    pub fn write_sample(path: &Path) -> miette::Result<()> {
        let sample = ServicesDoc {
            services: vec![
                ServiceEntry {
                    service_name: "order-service".to_string(),
                    environment: "prod".to_string(),
                    host: "10.0.1.17".to_string(),
                    port: 22,
                    username: Some("deploy".to_string()),
                    password: Some("secret".to_string()),
                    server_base_path: "/opt/apps".to_string(),
                    jar_path: "{server_base_path}/{service_name}/lib".to_string(),
                    classes_path: "{server_base_path}/{service_name}/classes".to_string(),
                    jar_decompile_output_dir: "./decompiled/jars".to_string(),
                    class_decompile_output_dir: "./decompiled/classes".to_string(),
                },
                ServiceEntry {
                    service_name: "billing-service".to_string(),
                    environment: "prod".to_string(),
                    host: "localhost".to_string(),
                    port: 22,
                    username: None,
                    password: None,
                    server_base_path: "/srv/mirror".to_string(),
                    jar_path: "{server_base_path}/{service_name}/lib".to_string(),
                    classes_path: "{server_base_path}/{service_name}/classes".to_string(),
                    jar_decompile_output_dir: "./decompiled/jars".to_string(),
                    class_decompile_output_dir: "./decompiled/classes".to_string(),
                },
            ],
            internal_prefixes: None,
        };
        let json =
            serde_json::to_string_pretty(&sample).map_err(|e| JarscopeError::Config {
                message: format!("Failed to serialize sample: {e}"),
            })?;
        std::fs::write(path, json).map_err(JarscopeError::Io)?;
        Ok(())
    }
}

/// Returns the path to the jarscope data directory (`~/.jarscope/`).
pub fn dirs_path() -> PathBuf {
    let home = std::env::var("HOME")
        .or_else(|_| std::env::var("USERPROFILE"))
        .unwrap_or_else(|_| ".".to_string());
    Path::new(&home).join(".jarscope")
}

/// Default database path, honoring the `JARSCOPE_DB` override.
pub fn default_db_path() -> PathBuf {
    match std::env::var("JARSCOPE_DB") {
        Ok(p) if !p.is_empty() => PathBuf::from(p),
        _ => dirs_path().join("jarscope.db"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn minimal_entry(name: &str, env: &str) -> String {
        format!(
            r#"{{
              "service_name": "{name}",
              "environment": "{env}",
              "host": "h1",
              "jar_path": "/opt/{name}/lib",
              "classes_path": "/opt/{name}/classes",
              "jar_decompile_output_dir": "/tmp/out/jars",
              "class_decompile_output_dir": "/tmp/out/classes"
            }}"#
        )
    }

    #[test]
    fn parses_minimal_document() {
        let json = format!(r#"{{"services": [{}]}}"#, minimal_entry("svc-a", "prod"));
        let doc = ServicesDoc::parse(&json).unwrap();
        assert_eq!(doc.services.len(), 1);
        assert_eq!(doc.services[0].port, 22);
        assert!(!doc.services[0].is_remote());
    }

    #[test]
    fn unknown_keys_are_ignored() {
        let json = format!(
            r#"{{"services": [{}], "some_future_field": 42}}"#,
            minimal_entry("svc-a", "prod")
        );
        assert!(ServicesDoc::parse(&json).is_ok());
    }

    #[test]
    fn missing_required_key_is_config_error() {
        let json = r#"{"services": [{"service_name": "a", "environment": "prod"}]}"#;
        let err = ServicesDoc::parse(json).unwrap_err();
        assert!(err.to_string().contains("Config error"), "got: {err}");
    }

    #[test]
    fn duplicate_service_and_environment_rejected() {
        let json = format!(
            r#"{{"services": [{}, {}]}}"#,
            minimal_entry("svc-a", "prod"),
            minimal_entry("svc-a", "prod")
        );
        let err = ServicesDoc::parse(&json).unwrap_err();
        assert!(err.to_string().contains("Duplicate service"), "got: {err}");
    }

    #[test]
    fn same_name_different_environment_allowed() {
        let json = format!(
            r#"{{"services": [{}, {}]}}"#,
            minimal_entry("svc-a", "prod"),
            minimal_entry("svc-a", "staging")
        );
        assert!(ServicesDoc::parse(&json).is_ok());
    }

    #[test]
    fn credentials_make_service_remote() {
        let json = r#"{"services": [{
            "service_name": "a", "environment": "prod", "host": "h",
            "username": "u", "password": "p",
            "jar_path": "/l", "classes_path": "/c",
            "jar_decompile_output_dir": "/o1", "class_decompile_output_dir": "/o2"
        }]}"#;
        let doc = ServicesDoc::parse(json).unwrap();
        assert!(doc.services[0].is_remote());
    }

    #[test]
    fn sample_round_trips() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("services.json");
        ServicesDoc::write_sample(&path).unwrap();
        let doc = ServicesDoc::from_path(&path).unwrap();
        assert_eq!(doc.services.len(), 2);
        assert!(doc.services[0].is_remote());
        assert!(!doc.services[1].is_remote());
    }
}
