//! URL modeling: mapping captured URLs to mirror paths and back.
//!
//! Layout under the mirror root is `host/dir/.../file`. See [`path`] for the
//! forward rules and [`key`] for the (lossy) inverse used to key the
//! downloaded-resource index.

mod key;
mod path;
mod sanitize;

pub use key::{url_key_for_relative_path, KEY_SCHEME};
pub use path::{relative_path_for_url, HTML_SUFFIX, INDEX_FILE};
pub use sanitize::{sanitize_segment, SEGMENT_MAX};

use std::path::{Path, PathBuf};

/// Errors deriving a mirror path from a URL.
#[derive(Debug, thiserror::Error)]
pub enum UrlModelError {
    #[error("invalid URL {url}: {source}")]
    Parse {
        url: String,
        source: url::ParseError,
    },
    #[error("unsupported URL scheme: {0}")]
    UnsupportedScheme(String),
    #[error("URL has no host: {0}")]
    MissingHost(String),
    #[error("path is not inside the mirror root: {0}")]
    OutsideRoot(PathBuf),
}

/// Where a captured URL lands on disk and the key it is indexed under.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MirrorTarget {
    pub path: PathBuf,
    pub url_key: String,
}

/// Deterministic URL <-> mirror path mapping rooted at one directory.
#[derive(Debug, Clone)]
pub struct PathMapper {
    root: PathBuf,
}

impl PathMapper {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        PathMapper { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Absolute mirror path for `url`.
    ///
    /// # Examples
    ///
    /// - `https://example.com/` → `<root>/example.com/index.html`
    /// - `https://example.com/game/assets` → `<root>/example.com/game/assets.html`
    pub fn to_path(&self, url: &str) -> Result<PathBuf, UrlModelError> {
        Ok(self.root.join(relative_path_for_url(url)?))
    }

    /// Url key for a file under the mirror root, or `None` if it cannot be
    /// produced by [`PathMapper::to_path`].
    pub fn to_url_key(&self, path: &Path) -> Option<String> {
        let rel = path.strip_prefix(&self.root).ok()?;
        url_key_for_relative_path(rel)
    }

    /// Forward mapping plus the key the result is indexed under.
    pub fn target_for(&self, url: &str) -> Result<MirrorTarget, UrlModelError> {
        let path = self.to_path(url)?;
        let url_key = self
            .to_url_key(&path)
            .ok_or_else(|| UrlModelError::OutsideRoot(path.clone()))?;
        Ok(MirrorTarget { path, url_key })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn origin_round_trip() {
        let mapper = PathMapper::new("/srv/mirror");
        let path = mapper.to_path("https://example.com/").unwrap();
        assert_eq!(path, Path::new("/srv/mirror/example.com/index.html"));
        assert_eq!(mapper.to_url_key(&path).as_deref(), Some("https://example.com/"));
    }

    #[test]
    fn extensionless_document() {
        let mapper = PathMapper::new("/srv/mirror");
        assert_eq!(
            mapper.to_path("https://example.com/game/assets").unwrap(),
            Path::new("/srv/mirror/example.com/game/assets.html")
        );
    }

    #[test]
    fn key_is_stable_across_repeated_mapping() {
        let mapper = PathMapper::new("/srv/mirror");
        for url in [
            "https://example.com/game/assets",
            "http://example.com:8080/docs/",
            "https://example.com/a/b.tar.gz?x=1",
            "https://example.com/CON",
            "https://example.com/.profile",
        ] {
            let first = mapper.target_for(url).unwrap();
            let second = mapper.target_for(url).unwrap();
            assert_eq!(first, second);
            // Feeding the key back in lands on the same file.
            let again = mapper.target_for(&first.url_key).unwrap();
            assert_eq!(again.path, first.path, "{url}");
            assert_eq!(again.url_key, first.url_key, "{url}");
        }
    }

    #[test]
    fn truncated_segments_map_back_to_the_same_file() {
        let mapper = PathMapper::new("/srv/mirror");
        for name in [
            format!("{}.b", "a".repeat(254)),
            format!("{}.js", "c".repeat(300)),
            format!("dir/{}", "d".repeat(260)),
        ] {
            let url = format!("https://example.com/{name}");
            let target = mapper.target_for(&url).unwrap();
            let file = target.path.file_name().unwrap().to_str().unwrap();
            assert!(!file.ends_with('.') && !file.ends_with(' '), "{file}");
            assert_eq!(mapper.target_for(&target.url_key).unwrap(), target, "{url}");
        }
    }

    #[test]
    fn distinct_urls_may_collide() {
        let mapper = PathMapper::new("/m");
        let a = mapper.target_for("https://example.com/page").unwrap();
        let b = mapper.target_for("https://example.com/page.html").unwrap();
        let c = mapper.target_for("http://example.com:81/page?q=1").unwrap();
        assert_eq!(a, b);
        assert_eq!(a, c);
    }

    #[test]
    fn paths_outside_root_have_no_key() {
        let mapper = PathMapper::new("/srv/mirror");
        assert_eq!(mapper.to_url_key(Path::new("/tmp/example.com/a.js")), None);
    }
}
