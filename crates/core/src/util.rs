//! Slash-separated path helpers shared by providers, heaps and the markup inspector.

use crate::error::{NutpipeError, Result};

/// Joins segments with a single `/` between them, dropping empty segments.
///
/// A leading `/` on the first non-empty segment is kept.
pub fn merge_path<S: AsRef<str>>(segments: &[S]) -> String {
    let mut out = String::new();
    for segment in segments {
        let segment = segment.as_ref();
        if segment.is_empty() {
            continue;
        }
        if out.is_empty() {
            out.push_str(segment);
            continue;
        }
        match (out.ends_with('/'), segment.starts_with('/')) {
            (true, true) => out.push_str(&segment[1..]),
            (false, false) => {
                out.push('/');
                out.push_str(segment);
            }
            _ => out.push_str(segment),
        }
    }
    out
}

/// Resolves `.` and `..` segments.
///
/// Fails with `BadArgument` when a `..` would climb above the first segment.
/// Leading and trailing `/` are preserved.
pub fn simplify_path(path: &str) -> Result<String> {
    let absolute = path.starts_with('/');
    let trailing = path.len() > 1 && path.ends_with('/');
    let mut stack: Vec<&str> = Vec::new();

    for segment in path.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                if stack.pop().is_none() {
                    return Err(NutpipeError::bad_argument(format!(
                        "'{path}' escapes its root"
                    )));
                }
            }
            other => stack.push(other),
        }
    }

    let mut out = stack.join("/");
    if absolute {
        out.insert(0, '/');
    }
    if trailing && !stack.is_empty() {
        out.push('/');
    }
    Ok(out)
}

/// Returns the parent of a slash path, or the empty string at top level.
pub fn parent_of(path: &str) -> &str {
    let trimmed = path.trim_end_matches('/');
    match trimmed.rfind('/') {
        Some(idx) => &trimmed[..idx],
        None => "",
    }
}

/// Last segment of a slash path.
pub fn file_name(path: &str) -> &str {
    let trimmed = path.trim_end_matches('/');
    match trimmed.rfind('/') {
        Some(idx) => &trimmed[idx + 1..],
        None => trimmed,
    }
}

/// Hex rendering of an xxh3 digest, used for synthetic identifiers.
pub fn hex_digest(bytes: &[u8]) -> String {
    format!("{:016x}", xxhash_rust::xxh3::xxh3_64(bytes))
}
