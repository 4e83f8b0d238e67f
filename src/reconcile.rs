//! Manifest reconciliation.
//!
//! Second stage of the build pipeline. Compares the discovered images
//! against the previous manifest and decides, per image, whether the old
//! outputs can be reused or the image must be regenerated — and at which
//! widths.
//!
//! ## Reuse rule
//!
//! An old entry is carried forward **verbatim** when all of these hold:
//!
//! 1. it records the same source path (slugs can move between sources
//!    after renames, so the key alone is not enough),
//! 2. the source fingerprint (SHA-256 of the file contents) matches —
//!    content-based rather than mtime-based so it survives `git checkout`,
//! 3. re-planning widths from the entry's recorded natural width under the
//!    current configuration yields exactly the entry's width set, and
//! 4. every recorded output file is still on disk.
//!
//! Anything else is regenerated from scratch. Images present only in the
//! old manifest are simply not carried forward, which is what makes their
//! outputs collectable.
//!
//! ## Width planning
//!
//! For each configured width `w ≤ natural`, the variant is kept only when
//! `w / natural` does not exceed the format's scale threshold
//! (`JpgScaleThreshold` for JPEG sources, `ScaleThreshold` otherwise) —
//! a near-full-size copy is not worth a separate file.
//!
//! ## Unreadable sources
//!
//! A source whose bytes or dimensions cannot be read is skipped and
//! reported rather than aborting the run: it is excluded from the new
//! manifest and the whitelist, so the next run retries it and nothing of
//! it survives a cull.

use crate::config::Config;
use crate::discover::DiscoveredImage;
use crate::manifest::{Format, GeneratedFile, Manifest, ManifestEntry};
use crate::naming::{self, PathToSlug};
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Why a source image was skipped this run.
#[derive(Error, Debug)]
pub enum ReadError {
    #[error("cannot read {0}: {1}")]
    Io(PathBuf, #[source] std::io::Error),
    #[error("cannot determine dimensions of {0}: {1}")]
    Dimensions(PathBuf, #[source] image::ImageError),
}

/// A source image excluded from this run (retried on the next one).
#[derive(Debug)]
pub struct SkippedImage {
    pub rel: String,
    pub error: ReadError,
}

/// What the transformer must do for one image.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    /// Outputs already on disk match; only a missing original copy may be
    /// produced.
    Reuse,
    /// Regenerate every planned variant (and refresh the original copy).
    Regenerate,
}

/// Per-image work order produced by reconciliation.
#[derive(Debug, Clone)]
pub struct ImagePlan {
    pub image: DiscoveredImage,
    pub slug: String,
    pub format: Format,
    pub action: Action,
    /// The entry's variants: recorded ones for [`Action::Reuse`], planned
    /// ones for [`Action::Regenerate`].
    pub files: Vec<GeneratedFile>,
}

/// Result of reconciling discovery against the old manifest.
#[derive(Debug)]
pub struct Reconciliation {
    /// The new manifest (reused entries verbatim + freshly planned ones).
    pub manifest: Manifest,
    pub path_to_slug: PathToSlug,
    pub plans: Vec<ImagePlan>,
    pub skipped: Vec<SkippedImage>,
}

impl Reconciliation {
    pub fn reused(&self) -> usize {
        self.plans
            .iter()
            .filter(|p| p.action == Action::Reuse)
            .count()
    }

    pub fn regenerated(&self) -> usize {
        self.plans.len() - self.reused()
    }
}

/// SHA-256 of a file's contents, returned as a hex string.
pub fn fingerprint_file(path: &Path) -> std::io::Result<String> {
    let bytes = std::fs::read(path)?;
    Ok(format!("{:x}", Sha256::digest(&bytes)))
}

/// Plan the variant widths for an image of the given natural width.
///
/// Keeps configured widths that fit inside the natural width and whose
/// scale ratio does not exceed the format's threshold. The result is in
/// configured (ascending) order.
pub fn plan_widths(natural_width: u32, format: Format, config: &Config) -> Vec<u32> {
    let threshold = match format {
        Format::Jpg => config.jpg_scale_threshold,
        _ => config.scale_threshold,
    };
    config
        .widths
        .iter()
        .copied()
        .filter(|&w| w <= natural_width && f64::from(w) / f64::from(natural_width) <= threshold)
        .collect()
}

/// Compare discovered images against the old manifest and produce the new
/// manifest, the path→slug mapping, and the per-image work orders.
pub fn reconcile(
    config: &Config,
    images: &[DiscoveredImage],
    old_manifest: &Manifest,
) -> Reconciliation {
    let path_to_slug = naming::assign_slugs(images);
    let input_root = config.input_folder_path();
    let image_folder = config.image_folder_path();

    let mut manifest = Manifest::empty();
    let mut plans = Vec::new();
    let mut skipped = Vec::new();

    for image in images {
        // assign_slugs covers every discovered image
        let Some(slug) = path_to_slug.get(&image.rel) else {
            continue;
        };
        // Discovery only yields recognized extensions
        let Some(format) = Format::from_path(&image.path) else {
            continue;
        };
        let source = image.absolute(&input_root);

        let fingerprint = match fingerprint_file(&source) {
            Ok(fp) => fp,
            Err(e) => {
                skipped.push(SkippedImage {
                    rel: image.rel.clone(),
                    error: ReadError::Io(source, e),
                });
                continue;
            }
        };

        if let Some(entry) = old_manifest.images.get(slug) {
            if can_reuse(entry, &image.rel, &fingerprint, format, config, &image_folder) {
                manifest.images.insert(slug.clone(), entry.clone());
                plans.push(ImagePlan {
                    image: image.clone(),
                    slug: slug.clone(),
                    format,
                    action: Action::Reuse,
                    files: entry.files.clone(),
                });
                continue;
            }
        }

        let natural_width = match image::image_dimensions(&source) {
            Ok((w, _)) => w,
            Err(e) => {
                skipped.push(SkippedImage {
                    rel: image.rel.clone(),
                    error: ReadError::Dimensions(source, e),
                });
                continue;
            }
        };

        let files: Vec<GeneratedFile> = plan_widths(natural_width, format, config)
            .into_iter()
            .map(|width| GeneratedFile {
                file_name: naming::variant_file_name(slug, width, format),
                width,
                format,
            })
            .collect();

        manifest.images.insert(
            slug.clone(),
            ManifestEntry {
                source: image.rel.clone(),
                fingerprint,
                natural_width,
                files: files.clone(),
            },
        );
        plans.push(ImagePlan {
            image: image.clone(),
            slug: slug.clone(),
            format,
            action: Action::Regenerate,
            files,
        });
    }

    Reconciliation {
        manifest,
        path_to_slug,
        plans,
        skipped,
    }
}

fn can_reuse(
    entry: &ManifestEntry,
    rel: &str,
    fingerprint: &str,
    format: Format,
    config: &Config,
    image_folder: &Path,
) -> bool {
    entry.source == rel
        && entry.fingerprint == fingerprint
        && entry.widths() == plan_widths(entry.natural_width, format, config)
        && entry
            .files
            .iter()
            .all(|f| image_folder.join(&f.file_name).exists())
}
