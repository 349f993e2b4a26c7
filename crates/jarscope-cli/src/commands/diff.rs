use std::path::Path;

use jarscope_ops::ops_diff::{self, DiffRequest};
use jarscope_util::errors::JarscopeError;

pub fn exec(
    db: &Path,
    kind: &str,
    name: &str,
    from: i64,
    to: i64,
    file: Option<String>,
    include_unchanged: bool,
) -> miette::Result<i32> {
    let request = DiffRequest {
        kind: parse_kind(kind)?,
        name: name.to_string(),
        from_version: from,
        to_version: to,
        file_path: file,
        include_unchanged,
    };
    let result = ops_diff::diff(db, &request)?;

    for file in &result.files {
        println!(
            "{} {} (+{} -{} {}%)",
            file.change_type, file.file_path, file.additions, file.deletions, file.change_percentage
        );
        if !file.unified_text.is_empty() {
            println!("{}", file.unified_text);
        }
    }
    for path in &result.unchanged {
        println!("unchanged {path}");
    }
    println!(
        "{} file(s) changed, {} insertion(s), {} deletion(s)",
        result.files_changed, result.insertions, result.deletions
    );
    Ok(0)
}

pub(crate) fn parse_kind(kind: &str) -> miette::Result<jarscope_core::artifact::ArtifactKind> {
    jarscope_core::artifact::ArtifactKind::parse(kind).ok_or_else(|| {
        JarscopeError::Config {
            message: format!("artifact kind must be jar or class, got {kind:?}"),
        }
        .into()
    })
}
