//! Image discovery.
//!
//! First stage of the build pipeline. Walks the input root, yields every
//! file with a recognized image extension, and drops paths matching a
//! blacklist pattern.
//!
//! ## Blacklist semantics
//!
//! Each blacklist entry is a glob ([`glob::Pattern`]) matched against the
//! slash-separated path relative to the input root, e.g.
//! `assets/images/drafts/*` or `**/*-original.png`. A path matching any
//! pattern is never discovered, so it can reach neither the manifest nor
//! the whitelist.
//!
//! ## Ordering
//!
//! The result is sorted lexicographically by relative path so manifest
//! diffs stay stable across runs regardless of filesystem iteration order.
//!
//! ## Failure
//!
//! Any traversal error (unreadable directory, permission failure) aborts
//! discovery — a partial image list would silently drop entries from the
//! manifest and mark their outputs for collection.

use glob::Pattern;
use std::path::{Path, PathBuf};
use thiserror::Error;
use walkdir::WalkDir;

/// File extensions recognized as images (lowercased before comparison).
pub const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "webp"];

#[derive(Error, Debug)]
pub enum DiscoverError {
    #[error("traversal error: {0}")]
    Walk(#[from] walkdir::Error),
    #[error("invalid blacklist pattern {0:?}: {1}")]
    Pattern(String, #[source] glob::PatternError),
}

/// A source image found under the input root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveredImage {
    /// Path relative to the input root.
    pub path: PathBuf,
    /// The same path with `/` separators, used for slugs, manifest keys,
    /// and blacklist matching.
    pub rel: String,
}

impl DiscoveredImage {
    /// Absolute path of the source file.
    pub fn absolute(&self, input_root: &Path) -> PathBuf {
        input_root.join(&self.path)
    }
}

/// Walk `input_root` and return every non-blacklisted image, sorted by
/// relative path.
pub fn discover_images(
    input_root: &Path,
    blacklist: &[String],
) -> Result<Vec<DiscoveredImage>, DiscoverError> {
    let patterns = compile_blacklist(blacklist)?;

    let mut images = Vec::new();
    for entry in WalkDir::new(input_root).sort_by_file_name() {
        let entry = entry?;
        if !entry.file_type().is_file() || !is_image(entry.path()) {
            continue;
        }
        // Walkdir yields paths under input_root, so the prefix always strips.
        let rel_path = entry
            .path()
            .strip_prefix(input_root)
            .unwrap_or(entry.path())
            .to_path_buf();
        let rel = slash_path(&rel_path);
        if patterns.iter().any(|p| p.matches(&rel)) {
            continue;
        }
        images.push(DiscoveredImage {
            path: rel_path,
            rel,
        });
    }

    images.sort_by(|a, b| a.rel.cmp(&b.rel));
    Ok(images)
}

fn compile_blacklist(blacklist: &[String]) -> Result<Vec<Pattern>, DiscoverError> {
    blacklist
        .iter()
        .map(|raw| Pattern::new(raw).map_err(|e| DiscoverError::Pattern(raw.clone(), e)))
        .collect()
}

fn is_image(path: &Path) -> bool {
    let ext = path
        .extension()
        .map(|e| e.to_string_lossy().to_lowercase())
        .unwrap_or_default();
    IMAGE_EXTENSIONS.contains(&ext.as_str())
}

/// Render a relative path with `/` separators on every platform.
pub fn slash_path(path: &Path) -> String {
    let parts: Vec<String> = path
        .components()
        .map(|c| c.as_os_str().to_string_lossy().to_string())
        .collect();
    parts.join("/")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn touch(root: &Path, rel: &str) {
        let path = root.join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, "fake image").unwrap();
    }

    #[test]
    fn finds_recognized_extensions_only() {
        let tmp = TempDir::new().unwrap();
        touch(tmp.path(), "a.jpg");
        touch(tmp.path(), "b.PNG");
        touch(tmp.path(), "notes.txt");
        touch(tmp.path(), "page.html");

        let images = discover_images(tmp.path(), &[]).unwrap();
        let rels: Vec<&str> = images.iter().map(|i| i.rel.as_str()).collect();
        assert_eq!(rels, vec!["a.jpg", "b.PNG"]);
    }

    #[test]
    fn recurses_into_subdirectories() {
        let tmp = TempDir::new().unwrap();
        touch(tmp.path(), "assets/images/deep/nested/photo.jpeg");

        let images = discover_images(tmp.path(), &[]).unwrap();
        assert_eq!(images.len(), 1);
        assert_eq!(images[0].rel, "assets/images/deep/nested/photo.jpeg");
        assert_eq!(
            images[0].absolute(tmp.path()),
            tmp.path().join("assets/images/deep/nested/photo.jpeg")
        );
    }

    #[test]
    fn order_is_lexicographic() {
        let tmp = TempDir::new().unwrap();
        touch(tmp.path(), "z.jpg");
        touch(tmp.path(), "a/b.jpg");
        touch(tmp.path(), "a.jpg");

        let images = discover_images(tmp.path(), &[]).unwrap();
        let rels: Vec<&str> = images.iter().map(|i| i.rel.as_str()).collect();
        assert_eq!(rels, vec!["a.jpg", "a/b.jpg", "z.jpg"]);
    }

    #[test]
    fn missing_root_is_an_error() {
        let tmp = TempDir::new().unwrap();
        let result = discover_images(&tmp.path().join("nope"), &[]);
        assert!(matches!(result, Err(DiscoverError::Walk(_))));
    }

    // =========================================================================
    // Blacklist
    // =========================================================================

    #[test]
    fn blacklist_exact_path() {
        let tmp = TempDir::new().unwrap();
        touch(tmp.path(), "keep.jpg");
        touch(tmp.path(), "skip.jpg");

        let images = discover_images(tmp.path(), &["skip.jpg".into()]).unwrap();
        assert_eq!(images.len(), 1);
        assert_eq!(images[0].rel, "keep.jpg");
    }

    #[test]
    fn blacklist_glob_over_directories() {
        let tmp = TempDir::new().unwrap();
        touch(tmp.path(), "drafts/a.jpg");
        touch(tmp.path(), "drafts/deep/b.jpg");
        touch(tmp.path(), "final/c.jpg");

        let images = discover_images(tmp.path(), &["drafts/**".into()]).unwrap();
        let rels: Vec<&str> = images.iter().map(|i| i.rel.as_str()).collect();
        assert_eq!(rels, vec!["final/c.jpg"]);
    }

    #[test]
    fn blacklist_suffix_glob() {
        let tmp = TempDir::new().unwrap();
        touch(tmp.path(), "a/photo-original.png");
        touch(tmp.path(), "a/photo.png");

        let images = discover_images(tmp.path(), &["**/*-original.png".into()]).unwrap();
        assert_eq!(images.len(), 1);
        assert_eq!(images[0].rel, "a/photo.png");
    }

    #[test]
    fn invalid_pattern_is_an_error() {
        let tmp = TempDir::new().unwrap();
        let result = discover_images(tmp.path(), &["[".into()]);
        assert!(matches!(result, Err(DiscoverError::Pattern(..))));
    }
}
