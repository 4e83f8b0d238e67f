//! Whitelist-driven garbage collection of the output image folder.
//!
//! Runs only when culling is requested. Every file under the output image
//! folder whose canonical path is not on the whitelist gets deleted, then
//! directories left empty are removed depth-first. Nothing outside the
//! image folder is ever touched.
//!
//! Both sides are normalized with `fs::canonicalize` before comparison, so
//! symlinked output folders and relative base paths cannot cause a
//! legitimate output to be collected. A per-file deletion failure is
//! reported and collection continues; only a failure to enumerate the
//! folder aborts.

use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use walkdir::WalkDir;

#[derive(Error, Debug)]
pub enum CullError {
    #[error("cannot walk output folder: {0}")]
    Walk(#[from] walkdir::Error),
}

/// Canonical paths of every file that must survive collection.
#[derive(Debug, Default)]
pub struct Whitelist {
    paths: BTreeSet<PathBuf>,
}

impl Whitelist {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a file as protected. A path that cannot be canonicalized
    /// does not exist, so there is nothing to protect.
    pub fn insert(&mut self, path: &Path) {
        if let Ok(canonical) = fs::canonicalize(path) {
            self.paths.insert(canonical);
        }
    }

    pub fn contains(&self, canonical: &Path) -> bool {
        self.paths.contains(canonical)
    }

    pub fn len(&self) -> usize {
        self.paths.len()
    }

    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }
}

/// What collection did (and failed to do).
#[derive(Debug, Default)]
pub struct CullStats {
    pub deleted: usize,
    pub failed: usize,
}

/// Delete everything under `image_folder` that is not whitelisted, then
/// sweep up empty directories. The folder itself always survives.
pub fn cull(image_folder: &Path, whitelist: &Whitelist) -> Result<CullStats, CullError> {
    let mut stats = CullStats::default();

    for entry in WalkDir::new(image_folder).sort_by_file_name() {
        let entry = entry?;
        if !entry.file_type().is_file() {
            continue;
        }
        // The entry was just enumerated, so canonicalize only fails on a
        // concurrent removal; nothing left to delete then.
        let Ok(canonical) = fs::canonicalize(entry.path()) else {
            continue;
        };
        if whitelist.contains(&canonical) {
            continue;
        }
        match fs::remove_file(entry.path()) {
            Ok(()) => {
                println!("Culled {}", entry.path().display());
                stats.deleted += 1;
            }
            Err(e) => {
                eprintln!("Warning: cannot delete {}: {e}", entry.path().display());
                stats.failed += 1;
            }
        }
    }

    // Contents-first so a directory is visited after its children, letting
    // nested empty directories collapse in one pass. remove_dir refuses
    // non-empty directories, which is exactly the filter we want.
    for entry in WalkDir::new(image_folder)
        .contents_first(true)
        .into_iter()
        .flatten()
    {
        if entry.file_type().is_dir() && entry.path() != image_folder {
            let _ = fs::remove_dir(entry.path());
        }
    }

    Ok(stats)
}
