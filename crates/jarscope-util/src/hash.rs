use sha2::{Digest, Sha256};
use std::io::Read;
use std::path::Path;

/// Compute the SHA-256 hash of a byte slice, returning a lowercase hex string.
pub fn sha256_bytes(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    format!("{:x}", hasher.finalize())
}

/// Compute the SHA-256 hash of a file, returning a lowercase hex string.
pub fn sha256_file(path: &Path) -> miette::Result<String> {
    use crate::errors::JarscopeError;

    let mut file = std::fs::File::open(path).map_err(JarscopeError::Io)?;
    let mut hasher = Sha256::new();
    let mut buffer = [0u8; 64 * 1024];
    loop {
        let n = file.read(&mut buffer).map_err(JarscopeError::Io)?;
        if n == 0 {
            break;
        }
        hasher.update(&buffer[..n]);
    }
    Ok(format!("{:x}", hasher.finalize()))
}

/// Normalize decompiled source content: `\r\n` becomes `\n`.
///
/// All hashing and line counting of `.java` sources operates on the
/// normalized form, so the same file decompiled on Windows and Linux
/// hosts dedups to one version.
pub fn normalize_source(content: &str) -> String {
    content.replace("\r\n", "\n")
}

/// Count lines in normalized content.
///
/// A trailing newline does not open a new line; a non-empty file without a
/// trailing newline still counts its last line. The empty file has zero lines.
pub fn count_lines(normalized: &str) -> u32 {
    let newlines = normalized.bytes().filter(|b| *b == b'\n').count() as u32;
    if !normalized.is_empty() && !normalized.ends_with('\n') {
        newlines + 1
    } else {
        newlines
    }
}

/// Hash normalized source content and count its lines in one pass over the input.
pub fn source_fingerprint(content: &str) -> (String, u32) {
    let normalized = normalize_source(content);
    (sha256_bytes(normalized.as_bytes()), count_lines(&normalized))
}
