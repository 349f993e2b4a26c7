use std::path::Path;

use chrono::{DateTime, Utc};

use jarscope_util::errors::JarscopeError;

use crate::{Listing, RemoteEntry};

/// Transport for services whose artifact directories are on this machine
/// (mirrors, or the collector running on the target host itself).
pub struct LocalTransport;

impl LocalTransport {
    pub async fn list(&self, dir: &str) -> miette::Result<Listing> {
        let mut listing = Listing::default();
        let mut entries = tokio::fs::read_dir(dir)
            .await
            .map_err(|e| JarscopeError::Transport {
                message: format!("cannot read {dir}: {e}"),
            })?;

        while let Some(entry) = entries.next_entry().await.map_err(JarscopeError::Io)? {
            let meta = match entry.metadata().await {
                Ok(m) if m.is_file() => m,
                Ok(_) => continue,
                Err(_) => {
                    listing.skipped_lines += 1;
                    continue;
                }
            };
            let modified: DateTime<Utc> = match meta.modified() {
                Ok(t) => t.into(),
                Err(_) => {
                    listing.skipped_lines += 1;
                    continue;
                }
            };
            listing.entries.push(RemoteEntry {
                name: entry.file_name().to_string_lossy().into_owned(),
                file_size: meta.len() as i64,
                modified,
            });
        }
        listing.entries.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(listing)
    }

    pub async fn list_recursive(&self, dir: &str) -> miette::Result<Listing> {
        let root = std::path::PathBuf::from(dir);
        if !root.is_dir() {
            return Err(JarscopeError::Transport {
                message: format!("cannot read {dir}: not a directory"),
            }
            .into());
        }
        let mut listing = Listing::default();
        let mut pending = vec![root.clone()];
        while let Some(current) = pending.pop() {
            let mut entries = tokio::fs::read_dir(&current)
                .await
                .map_err(JarscopeError::Io)?;
            while let Some(entry) = entries.next_entry().await.map_err(JarscopeError::Io)? {
                let path = entry.path();
                let meta = match entry.metadata().await {
                    Ok(m) => m,
                    Err(_) => {
                        listing.skipped_lines += 1;
                        continue;
                    }
                };
                if meta.is_dir() {
                    pending.push(path);
                    continue;
                }
                let (Ok(rel), Ok(modified)) = (path.strip_prefix(&root), meta.modified()) else {
                    listing.skipped_lines += 1;
                    continue;
                };
                listing.entries.push(RemoteEntry {
                    name: rel.to_string_lossy().replace('\\', "/"),
                    file_size: meta.len() as i64,
                    modified: modified.into(),
                });
            }
        }
        listing.entries.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(listing)
    }

    pub async fn fetch(&self, src: &str, dst: &Path) -> miette::Result<()> {
        if let Some(parent) = dst.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(JarscopeError::Io)?;
        }
        tokio::fs::copy(src, dst)
            .await
            .map_err(|e| JarscopeError::Transport {
                message: format!("cannot copy {src}: {e}"),
            })?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn lists_files_not_directories() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::write(tmp.path().join("a.jar"), b"aa").unwrap();
        std::fs::write(tmp.path().join("b.jar"), b"bbbb").unwrap();
        std::fs::create_dir(tmp.path().join("sub")).unwrap();

        let transport = LocalTransport;
        let listing = transport.list(tmp.path().to_str().unwrap()).await.unwrap();
        let names: Vec<&str> = listing.entries.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, vec!["a.jar", "b.jar"]);
        assert_eq!(listing.entries[1].file_size, 4);
    }

    #[tokio::test]
    async fn missing_directory_is_transport_error() {
        let transport = LocalTransport;
        let err = transport.list("/nonexistent/lib").await.unwrap_err();
        assert!(err.to_string().contains("Transport error"), "got: {err}");
    }

    #[tokio::test]
    async fn fetch_copies_and_creates_parents() {
        let tmp = tempfile::tempdir().unwrap();
        let src = tmp.path().join("orig.jar");
        std::fs::write(&src, b"payload").unwrap();

        let dst = tmp.path().join("nested/dir/copy.jar");
        let transport = LocalTransport;
        transport
            .fetch(src.to_str().unwrap(), &dst)
            .await
            .unwrap();
        assert_eq!(std::fs::read(&dst).unwrap(), b"payload");
    }
}
