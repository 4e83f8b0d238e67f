//! Manifest types and the on-disk manifest store.
//!
//! The manifest is the durable record mapping each source image to the
//! variants generated for it, keyed by slug. It is what makes rebuilds
//! incremental: an image whose fingerprint and planned widths both match
//! its manifest entry is carried forward without touching the encoder.
//!
//! ## Storage
//!
//! Persisted as human-editable YAML at `basepath/ManifestFile`:
//!
//! ```yaml
//! version: 1
//! images:
//!   my-photo:
//!     source: assets/images/my-photo.jpg
//!     fingerprint: 9f86d08…
//!     natural_width: 2000
//!     files:
//!       - file_name: my-photo-400.jpg
//!         width: 400
//!         format: jpg
//! ```
//!
//! A missing file bootstraps to an empty manifest (first run). Malformed
//! content or an unknown `version` is an error — silently regenerating
//! everything would hide a corrupted or hand-mangled file. A blank
//! `ManifestFile` setting disables persistence entirely: loads yield the
//! empty manifest and saves are no-ops, so every run regenerates.
//!
//! Saves go through a temp file in the target directory followed by an
//! atomic rename, so a crash mid-write never corrupts the previous
//! manifest. This module owns the serialization format; everything else
//! operates on the in-memory values.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Version of the manifest schema. Bumped when the layout or the slug/
/// fingerprint computation changes incompatibly.
pub const MANIFEST_VERSION: u32 = 1;

#[derive(Error, Debug)]
pub enum ManifestError {
    #[error("cannot access manifest {0}: {1}")]
    Io(PathBuf, #[source] io::Error),
    #[error("malformed manifest {0}: {1}")]
    Parse(PathBuf, #[source] serde_yaml::Error),
    #[error("manifest {0} has version {1}, expected {2}")]
    Version(PathBuf, u32, u32),
}

/// Output format of a generated variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Format {
    Jpg,
    Png,
    Webp,
}

impl Format {
    /// Classify a source path by extension.
    pub fn from_path(path: &Path) -> Option<Format> {
        let ext = path
            .extension()
            .map(|e| e.to_string_lossy().to_lowercase())?;
        match ext.as_str() {
            "jpg" | "jpeg" => Some(Format::Jpg),
            "png" => Some(Format::Png),
            "webp" => Some(Format::Webp),
            _ => None,
        }
    }

    /// Canonical file extension for generated variants.
    pub fn ext(self) -> &'static str {
        match self {
            Format::Jpg => "jpg",
            Format::Png => "png",
            Format::Webp => "webp",
        }
    }
}

/// One generated output file of a source image.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GeneratedFile {
    /// File name inside the output image folder, e.g. `my-photo-400.jpg`.
    pub file_name: String,
    /// Pixel width of this variant.
    pub width: u32,
    pub format: Format,
}

/// Manifest record for a single source image, keyed by slug.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ManifestEntry {
    /// Source path relative to the input root, `/`-separated.
    pub source: String,
    /// SHA-256 of the source file contents, hex encoded.
    pub fingerprint: String,
    /// Natural pixel width of the source. Lets the reconciler re-plan
    /// widths for an unchanged image without decoding it again.
    pub natural_width: u32,
    /// Generated variants, ordered by ascending width.
    pub files: Vec<GeneratedFile>,
}

impl ManifestEntry {
    /// The widths this entry has variants for, in file order.
    pub fn widths(&self) -> Vec<u32> {
        self.files.iter().map(|f| f.width).collect()
    }
}

/// The full manifest: slug → entry.
///
/// A `BTreeMap` keeps the serialized form sorted, so re-runs with unchanged
/// inputs write byte-identical files and diffs stay readable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Manifest {
    pub version: u32,
    pub images: BTreeMap<String, ManifestEntry>,
}

impl Default for Manifest {
    fn default() -> Self {
        Self::empty()
    }
}

impl Manifest {
    /// The empty manifest (first run, or persistence disabled).
    pub fn empty() -> Self {
        Self {
            version: MANIFEST_VERSION,
            images: BTreeMap::new(),
        }
    }

    /// Load the manifest from `path`.
    ///
    /// `None` (persistence disabled) and a missing file both yield the
    /// empty manifest. Unreadable or malformed content is an error.
    pub fn load(path: Option<&Path>) -> Result<Manifest, ManifestError> {
        let Some(path) = path else {
            return Ok(Manifest::empty());
        };
        let content = match std::fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Manifest::empty()),
            Err(e) => return Err(ManifestError::Io(path.to_path_buf(), e)),
        };
        let manifest: Manifest = serde_yaml::from_str(&content)
            .map_err(|e| ManifestError::Parse(path.to_path_buf(), e))?;
        if manifest.version != MANIFEST_VERSION {
            return Err(ManifestError::Version(
                path.to_path_buf(),
                manifest.version,
                MANIFEST_VERSION,
            ));
        }
        Ok(manifest)
    }

    /// Persist the manifest to `path`, replacing any prior content.
    ///
    /// `None` is a no-op. The write goes to a temp file in the target
    /// directory and is renamed over the destination.
    pub fn save(&self, path: Option<&Path>) -> Result<(), ManifestError> {
        let Some(path) = path else {
            return Ok(());
        };
        let yaml = serde_yaml::to_string(self)
            .map_err(|e| ManifestError::Parse(path.to_path_buf(), e))?;
        let dir = path.parent().unwrap_or_else(|| Path::new("."));
        let tmp = tempfile::NamedTempFile::new_in(dir)
            .map_err(|e| ManifestError::Io(path.to_path_buf(), e))?;
        std::fs::write(tmp.path(), yaml).map_err(|e| ManifestError::Io(path.to_path_buf(), e))?;
        tmp.persist(path)
            .map_err(|e| ManifestError::Io(path.to_path_buf(), e.error))?;
        Ok(())
    }
}
