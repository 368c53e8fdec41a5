//! Inverse mapping: mirrored file path back to a url key.
//!
//! The inverse is lossy. Sanitized segments, the dropped port and query, and
//! the extensionless `.html` heuristic mean distinct URLs can share a mirror
//! path, and the key is not always the URL that was captured. It is stable:
//! mapping a URL forward and back always yields the same key.

use super::path::{has_extension, HTML_SUFFIX, INDEX_FILE};
use std::path::{Component, Path};

/// Scheme used for every reconstructed key; the mirror layout does not record it.
pub const KEY_SCHEME: &str = "https";

/// Rebuilds the url key for `rel`, a path relative to the mirror root.
///
/// Returns `None` for paths that cannot come from the forward mapping:
/// non-UTF-8 names, `..`/absolute components, or files directly under the root.
pub fn url_key_for_relative_path(rel: &Path) -> Option<String> {
    let mut parts = Vec::new();
    for component in rel.components() {
        match component {
            Component::Normal(name) => parts.push(name.to_str()?),
            Component::CurDir => {}
            _ => return None,
        }
    }

    let (host, rest) = parts.split_first()?;
    if rest.is_empty() {
        return None;
    }

    let mut path = rest.join("/");
    if path == INDEX_FILE {
        path.clear();
    } else if let Some(stem) = path.strip_suffix(HTML_SUFFIX) {
        let name = stem.rsplit('/').next().unwrap_or(stem);
        if !name.is_empty() && !has_extension(name) {
            path.truncate(stem.len());
        }
    }

    Some(format!("{KEY_SCHEME}://{host}/{path}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(p: &str) -> Option<String> {
        url_key_for_relative_path(Path::new(p))
    }

    #[test]
    fn bare_index_is_origin() {
        assert_eq!(key("example.com/index.html").as_deref(), Some("https://example.com/"));
    }

    #[test]
    fn html_suffix_stripped_only_for_extensionless_stems() {
        assert_eq!(
            key("example.com/game/assets.html").as_deref(),
            Some("https://example.com/game/assets")
        );
        assert_eq!(
            key("example.com/docs/index.html").as_deref(),
            Some("https://example.com/docs/index")
        );
        assert_eq!(
            key("example.com/archive.tar.html").as_deref(),
            Some("https://example.com/archive.tar.html")
        );
        assert_eq!(
            key("example.com/.well-known.html").as_deref(),
            Some("https://example.com/.well-known")
        );
    }

    #[test]
    fn other_files_kept_verbatim() {
        assert_eq!(
            key("cdn.example.com/game/data/assets.swf").as_deref(),
            Some("https://cdn.example.com/game/data/assets.swf")
        );
    }

    #[test]
    fn rejects_paths_outside_layout() {
        assert_eq!(key("stray.txt"), None);
        assert_eq!(key("../example.com/a.js"), None);
        assert_eq!(key(""), None);
    }
}
