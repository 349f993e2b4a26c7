use jarscope_util::errors::JarscopeError;

/// Substitute `{service_name}` and `{server_base_path}` in a path template.
///
/// Any other `{…}` placeholder surviving substitution is a hard config
/// error: a typo in the document must fail loudly rather than produce a
/// path with literal braces on a remote host.
pub fn render_path(
    template: &str,
    service_name: &str,
    server_base_path: &str,
) -> miette::Result<String> {
    let rendered = template
        .replace("{service_name}", service_name)
        .replace("{server_base_path}", server_base_path);

    if let Some(placeholder) = find_placeholder(&rendered) {
        return Err(JarscopeError::Config {
            message: format!("Unknown placeholder {{{placeholder}}} in path template {template:?}"),
        }
        .into());
    }
    Ok(rendered)
}

/// First `{name}` token remaining in an already-substituted string.
fn find_placeholder(s: &str) -> Option<&str> {
    let open = s.find('{')?;
    let rest = &s[open + 1..];
    let close = rest.find('}')?;
    Some(&rest[..close])
}
