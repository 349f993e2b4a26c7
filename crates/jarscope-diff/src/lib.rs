//! Line-level diffing between two versions of an artifact.
//!
//! The inputs are plain `(path, content, hash)` sets; resolving versions to
//! file sets is the store's business, caching the results is the pipeline's.

mod pairing;
mod unified;

pub use pairing::{diff_file_sets, ChangeType, ComputedFileDiff, DiffReport, DiffSource, DiffSummary};
pub use unified::{unified_diff, FileDiffStats};
