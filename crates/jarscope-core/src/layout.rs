use chrono::{DateTime, Utc};
use std::path::{Path, PathBuf};

use crate::artifact::{jar_stem, ArtifactKind};

/// Directory under a decompile root holding retained JAR originals.
pub const RETAINED_JAR_DIR: &str = "_jar";
/// Directory under a decompile root holding retained `.class` originals.
pub const RETAINED_CLASS_DIR: &str = "_class";

/// On-disk layout of a decompile root.
///
/// Decompiled sources land in `{root}/{artifact_stem}/{YYYYMMDD}-{service}@{host}/`,
/// mirrored by `{root}/_jar/{service}@{host}/` (or `_class/`) for the retained
/// binaries. `YYYYMMDD` comes from the artifact's `last_modified`, so two
/// observations of the same artifact on different dates get distinct trees.
#[derive(Debug, Clone)]
pub struct DecompileLayout {
    root: PathBuf,
    kind: ArtifactKind,
}

impl DecompileLayout {
    pub fn new(root: impl Into<PathBuf>, kind: ArtifactKind) -> Self {
        Self {
            root: root.into(),
            kind,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// The `{YYYYMMDD}-{service}@{host}` fragment naming one observation.
    pub fn observation_fragment(
        last_modified: &DateTime<Utc>,
        service_name: &str,
        host: &str,
    ) -> String {
        format!("{}-{service_name}@{host}", last_modified.format("%Y%m%d"))
    }

    /// Output directory for decompiled sources of one `(artifact, service)` pair.
    pub fn source_dir(
        &self,
        artifact_name: &str,
        last_modified: &DateTime<Utc>,
        service_name: &str,
        host: &str,
    ) -> PathBuf {
        let stem = match self.kind {
            ArtifactKind::Jar => jar_stem(artifact_name).to_string(),
            ArtifactKind::Class => artifact_name.to_string(),
        };
        self.root
            .join(stem)
            .join(Self::observation_fragment(last_modified, service_name, host))
    }

    /// Directory retaining the fetched original binary for one service.
    pub fn retained_dir(&self, service_name: &str, host: &str) -> PathBuf {
        let bucket = match self.kind {
            ArtifactKind::Jar => RETAINED_JAR_DIR,
            ArtifactKind::Class => RETAINED_CLASS_DIR,
        };
        self.root.join(bucket).join(format!("{service_name}@{host}"))
    }

    /// Whether a directory name is a retained-originals bucket, not decompile
    /// output. The source ingestor skips these.
    pub fn is_retained_bucket(dir_name: &str) -> bool {
        dir_name == RETAINED_JAR_DIR || dir_name == RETAINED_CLASS_DIR
    }
}
