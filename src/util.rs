//! Shared utility functions.

use std::collections::BTreeMap;

/// Quote a value for a POSIX shell unless it is obviously safe.
pub fn shell_escape(s: &str) -> String {
    if !s.is_empty()
        && s.chars()
            .all(|c| c.is_alphanumeric() || c == '-' || c == '_' || c == '.' || c == '/')
    {
        s.to_string()
    } else {
        format!("'{}'", s.replace('\'', "'\"'\"'"))
    }
}

/// Make a string usable as a scheduler job name or file stem.
pub fn sanitize_name(s: &str) -> String {
    s.chars()
        .map(|c| {
            if c.is_alphanumeric() || c == '-' || c == '_' || c == '.' {
                c
            } else {
                '_'
            }
        })
        .collect()
}

/// Replace `{key}` placeholders with shell-escaped values.
///
/// Unknown placeholders are left untouched so that shell constructs such as
/// `${VAR}` survive rendering.
/// Substituted values are never rendered again.
pub fn render_template(template: &str, vars: &BTreeMap<&str, String>) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;
    while let Some(open) = rest.find('{') {
        out.push_str(&rest[..open]);
        let tail = &rest[open..];
        let value = tail
            .find('}')
            .and_then(|close| vars.get(&tail[1..close]).map(|v| (close, v)));
        match value {
            Some((close, value)) => {
                out.push_str(&shell_escape(value));
                rest = &tail[close + 1..];
            }
            None => {
                out.push('{');
                rest = &tail[1..];
            }
        }
    }
    out.push_str(rest);
    out
}
