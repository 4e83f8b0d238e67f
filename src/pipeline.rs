//! Build orchestration: discover → reconcile → transform → persist → cull.
//!
//! [`build`] is the whole program behind the CLI. It wires the stages
//! together, prunes failed images from the manifest before persisting so
//! they are retried on the next run, and assembles the whitelist the
//! garbage collector works from.

use crate::config::{Config, ConfigError};
use crate::cull::{self, CullError, CullStats, Whitelist};
use crate::discover::{self, DiscoverError};
use crate::manifest::{Manifest, ManifestError};
use crate::reconcile::{self, Action};
use crate::transform::{self, TransformError};
use std::collections::BTreeSet;
use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// Run-aborting failures. Per-image problems never surface here; they are
/// reported inside the run and counted in the [`BuildReport`].
#[derive(Error, Debug)]
pub enum BuildError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Discover(#[from] DiscoverError),
    #[error(transparent)]
    Manifest(#[from] ManifestError),
    #[error(transparent)]
    Transform(#[from] TransformError),
    #[error(transparent)]
    Cull(#[from] CullError),
    #[error("cannot create {0}: {1}")]
    CreateDir(PathBuf, #[source] std::io::Error),
}

/// Summary of a build run.
#[derive(Debug, Default)]
pub struct BuildReport {
    pub discovered: usize,
    pub reused: usize,
    pub regenerated: usize,
    pub variants_written: usize,
    pub copied: usize,
    pub skipped: usize,
    pub failed: usize,
    pub cull: Option<CullStats>,
}

impl fmt::Display for BuildReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} reused, {} regenerated ({} variants written), {} copied",
            self.reused, self.regenerated, self.variants_written, self.copied
        )?;
        if self.skipped > 0 || self.failed > 0 {
            write!(f, ", {} skipped, {} failed", self.skipped, self.failed)?;
        }
        if let Some(cull) = &self.cull {
            write!(f, "; culled {}", cull.deleted)?;
            if cull.failed > 0 {
                write!(f, " ({} deletions failed)", cull.failed)?;
            }
        }
        Ok(())
    }
}

/// Run the full pipeline for one configuration.
pub fn build(config: &Config) -> Result<BuildReport, BuildError> {
    let input_folder = config.input_folder_path();
    let image_folder = config.image_folder_path();
    let manifest_path = config.manifest_path();

    println!("==> Stage 1: Discovering images in {}", input_folder.display());
    let images = discover::discover_images(&input_folder, &config.blacklist)?;
    let old_manifest = Manifest::load(manifest_path.as_deref())?;
    std::fs::create_dir_all(&image_folder)
        .map_err(|e| BuildError::CreateDir(image_folder.clone(), e))?;

    println!("==> Stage 2: Reconciling against the previous manifest");
    let recon = reconcile::reconcile(config, &images, &old_manifest);
    for skip in &recon.skipped {
        eprintln!("Warning: skipping {}: {}", skip.rel, skip.error);
    }

    println!(
        "==> Stage 3: Transforming images ({} workers)",
        config.effective_workers()
    );
    let outcome = transform::transform(config, &recon.plans)?;
    for failure in &outcome.failures {
        eprintln!("Warning: {failure}");
    }

    let failed_slugs: BTreeSet<&str> = outcome.failures.iter().map(|f| f.slug.as_str()).collect();
    let survived = |action: Action| {
        recon
            .plans
            .iter()
            .filter(|p| p.action == action && !failed_slugs.contains(p.slug.as_str()))
            .count()
    };
    let mut report = BuildReport {
        discovered: images.len(),
        reused: survived(Action::Reuse),
        regenerated: survived(Action::Regenerate),
        variants_written: outcome.variants_written,
        copied: outcome.copies.len(),
        skipped: recon.skipped.len(),
        failed: outcome.failures.len(),
        cull: None,
    };

    // A failed image contributes nothing to the manifest or whitelist, so
    // the next run regenerates it and culling collects its partial output.
    let mut manifest = recon.manifest;
    manifest
        .images
        .retain(|slug, _| !failed_slugs.contains(slug.as_str()));
    manifest.save(manifest_path.as_deref())?;

    if config.cull {
        let mut whitelist = Whitelist::new();
        for entry in manifest.images.values() {
            for file in &entry.files {
                whitelist.insert(&image_folder.join(&file.file_name));
            }
        }
        for name in &outcome.copies {
            whitelist.insert(&image_folder.join(name));
        }

        println!("==> Stage 4: Culling stale outputs");
        report.cull = Some(cull::cull(&image_folder, &whitelist)?);
    }

    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn report_display_minimal() {
        let report = BuildReport {
            discovered: 5,
            reused: 3,
            regenerated: 2,
            variants_written: 6,
            copied: 5,
            ..BuildReport::default()
        };
        assert_eq!(
            report.to_string(),
            "3 reused, 2 regenerated (6 variants written), 5 copied"
        );
    }

    #[test]
    fn report_display_with_problems_and_cull() {
        let report = BuildReport {
            discovered: 4,
            reused: 1,
            regenerated: 1,
            variants_written: 2,
            copied: 2,
            skipped: 1,
            failed: 1,
            cull: Some(CullStats {
                deleted: 3,
                failed: 1,
            }),
        };
        assert_eq!(
            report.to_string(),
            "1 reused, 1 regenerated (2 variants written), 2 copied, \
             1 skipped, 1 failed; culled 3 (1 deletions failed)"
        );
    }
}
