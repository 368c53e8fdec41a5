//! Forward mapping: URL to a path relative to the mirror root.

use super::sanitize::{sanitize_segment, trim_trailing, truncate_on_char_boundary, SEGMENT_MAX};
use super::UrlModelError;
use std::path::PathBuf;
use url::Url;

/// File name used for a bare origin (`https://host/`) and for directory URLs.
pub const INDEX_FILE: &str = "index.html";

/// Suffix appended to final segments that carry no extension.
pub const HTML_SUFFIX: &str = ".html";

/// Maps `url` to `host/seg/.../name` relative to the mirror root.
///
/// Query and fragment are ignored. Empty segments (`a//b`) are dropped, a
/// trailing `/` maps to `index.html` in that directory, and a final segment
/// without an extension gets `.html` appended.
pub fn relative_path_for_url(url: &str) -> Result<PathBuf, UrlModelError> {
    let parsed = Url::parse(url).map_err(|source| UrlModelError::Parse {
        url: url.to_string(),
        source,
    })?;

    match parsed.scheme() {
        "http" | "https" => {}
        other => return Err(UrlModelError::UnsupportedScheme(other.to_string())),
    }

    let host = parsed
        .host_str()
        .filter(|h| !h.is_empty())
        .ok_or_else(|| UrlModelError::MissingHost(url.to_string()))?;

    let path = parsed.path();
    let mut segments: Vec<String> = path
        .split('/')
        .filter(|s| !s.is_empty())
        .map(sanitize_segment)
        .collect();

    if segments.is_empty() || path.ends_with('/') {
        segments.push(INDEX_FILE.to_string());
    }

    if let Some(last) = segments.last_mut() {
        if !has_extension(last) {
            if last.len() > SEGMENT_MAX - HTML_SUFFIX.len() {
                truncate_on_char_boundary(last, SEGMENT_MAX - HTML_SUFFIX.len());
                *last = trim_trailing(last.as_str());
            }
            last.push_str(HTML_SUFFIX);
        }
    }

    let mut rel = PathBuf::from(sanitize_segment(host));
    rel.extend(segments);
    Ok(rel)
}

/// True when `name` has a `.` after its first character (`.htaccess` has none).
pub(crate) fn has_extension(name: &str) -> bool {
    matches!(name.rfind('.'), Some(i) if i > 0)
}
