use chrono::{DateTime, Utc};
use tracing::debug;

use crate::RemoteEntry;

/// Result of parsing one directory listing.
#[derive(Debug, Default)]
pub struct Listing {
    pub entries: Vec<RemoteEntry>,
    /// Malformed lines skipped while parsing. Reported as a warning, never
    /// an error.
    pub skipped_lines: u32,
}

/// Decode raw listing bytes via the shared fallback chain (utf-8-sig,
/// utf-8, gbk, gb2312, latin-1; first success wins).
pub fn decode_listing(bytes: &[u8]) -> miette::Result<String> {
    jarscope_util::encoding::decode_text(bytes)
}

/// Parse the output of `ls -l --time-style=full-iso`.
///
/// Expected fields per line: mode, links, owner, group, size, iso date,
/// time, zone, name. Only regular files are kept; `total` headers,
/// directories, and anything that does not fit the shape are skipped with
/// a count.
pub fn parse_listing(text: &str) -> Listing {
    let mut listing = Listing::default();
    for line in text.lines() {
        let line = line.trim_end();
        if line.is_empty() || line.starts_with("total ") || line == "total" {
            continue;
        }
        match parse_line(line) {
            Some(Parsed::File(entry)) => listing.entries.push(entry),
            Some(Parsed::NotAFile) => {}
            None => {
                debug!(line, "skipping malformed listing line");
                listing.skipped_lines += 1;
            }
        }
    }
    listing
}

/// Parse the output of `ls -lR --time-style=full-iso <root>`.
///
/// Recursive output interleaves `dir:` header lines with per-directory
/// blocks; entry names become paths relative to `root`. Used for `classes/`
/// trees, where loose `.class` files sit under package directories.
pub fn parse_recursive_listing(text: &str, root: &str) -> Listing {
    let root = root.trim_end_matches('/');
    let mut listing = Listing::default();
    let mut current_rel: Option<String> = None;

    for line in text.lines() {
        let line = line.trim_end();
        if line.is_empty() || line.starts_with("total ") || line == "total" {
            continue;
        }
        if let Some(dir) = line.strip_suffix(':') {
            let dir = dir.trim_end_matches('/');
            current_rel = if dir == root || dir == "." {
                Some(String::new())
            } else {
                dir.strip_prefix(root)
                    .map(|rel| rel.trim_start_matches('/').to_string())
                    .or_else(|| Some(dir.trim_start_matches("./").to_string()))
            };
            continue;
        }
        match parse_line(line) {
            Some(Parsed::File(mut entry)) => {
                if let Some(rel) = current_rel.as_deref() {
                    if !rel.is_empty() {
                        entry.name = format!("{rel}/{}", entry.name);
                    }
                }
                listing.entries.push(entry);
            }
            Some(Parsed::NotAFile) => {}
            None => {
                debug!(line, "skipping malformed listing line");
                listing.skipped_lines += 1;
            }
        }
    }
    listing
}

enum Parsed {
    File(RemoteEntry),
    /// Well-formed but not a regular file (directory, symlink, socket).
    NotAFile,
}

fn parse_line(line: &str) -> Option<Parsed> {
    let tokens: Vec<&str> = line.split_whitespace().collect();
    if tokens.len() < 9 {
        return None;
    }

    let mode = tokens[0];
    let file_size: i64 = tokens[4].parse().ok()?;
    let modified = parse_full_iso(tokens[5], tokens[6], tokens[7])?;
    // A name containing single spaces survives the re-join.
    let name = tokens[8..].join(" ");

    if !mode.starts_with('-') {
        return Some(Parsed::NotAFile);
    }
    Some(Parsed::File(RemoteEntry {
        name,
        file_size,
        modified,
    }))
}

fn parse_full_iso(date: &str, time: &str, zone: &str) -> Option<DateTime<Utc>> {
    let stamp = format!("{date} {time} {zone}");
    DateTime::parse_from_str(&stamp, "%Y-%m-%d %H:%M:%S%.f %z")
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}
