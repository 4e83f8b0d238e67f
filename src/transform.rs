//! Variant generation, optimization, and original copies.
//!
//! Third stage of the build pipeline. Executes the work orders produced by
//! reconciliation on a bounded rayon pool, one worker owning one image
//! end to end, then merges the per-image results single-threaded.
//!
//! Each image moves through a small state machine:
//!
//! ```text
//! Pending → Resizing → Optimizing → Copying → Done
//!                \          \          \
//!                 `----------`----------`---→ Failed
//! ```
//!
//! `Failed` is terminal for the run. A failed image is reported with the
//! stage it died in, and the pipeline drops its manifest entry so nothing
//! of it is whitelisted and the next run starts it over from `Pending`.
//!
//! Reused images skip straight to `Copying`: their variants are already on
//! disk, only a missing original copy is produced. Regenerated images
//! always get a fresh copy so a changed source never leaves a stale
//! original behind.
//!
//! The optimizer, when configured, is an external command run once per
//! written file with the file's absolute path appended as the final
//! argument. Each invocation is bounded by `OptimTimeoutSecs`; a timeout
//! kills the child and fails the image.

use crate::config::Config;
use crate::manifest::Format;
use crate::naming;
use crate::reconcile::{Action, ImagePlan};
use image::DynamicImage;
use image::codecs::jpeg::JpegEncoder;
use image::codecs::png::PngEncoder;
use image::codecs::webp::WebPEncoder;
use image::imageops::FilterType;
use rayon::prelude::*;
use std::io::BufWriter;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::time::{Duration, Instant};
use thiserror::Error;

/// How often a running optimizer child is polled for exit.
const OPTIMIZER_POLL_INTERVAL: Duration = Duration::from_millis(25);

/// Where an image's processing stands (or stopped).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Pending,
    Resizing,
    Optimizing,
    Copying,
    Done,
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Stage::Pending => "pending",
            Stage::Resizing => "resizing",
            Stage::Optimizing => "optimizing",
            Stage::Copying => "copying",
            Stage::Done => "done",
        };
        f.write_str(name)
    }
}

/// Why a single image failed this run.
#[derive(Error, Debug)]
pub enum OptimizationError {
    #[error("cannot decode {0}: {1}")]
    Decode(PathBuf, #[source] image::ImageError),
    #[error("cannot encode {0}: {1}")]
    Encode(PathBuf, #[source] image::ImageError),
    #[error("io error on {0}: {1}")]
    Io(PathBuf, #[source] std::io::Error),
    #[error("optimizer `{0}` exited with {2} on {1}")]
    Optimizer(String, PathBuf, String),
    #[error("optimizer `{0}` timed out after {2}s on {1}")]
    Timeout(String, PathBuf, u64),
}

/// Run-level transformation failures (per-image ones are [`ImageFailure`]).
#[derive(Error, Debug)]
pub enum TransformError {
    #[error("cannot build worker pool: {0}")]
    Pool(#[from] rayon::ThreadPoolBuildError),
}

/// One image that reached `Failed`, with the stage it died in.
#[derive(Debug)]
pub struct ImageFailure {
    pub slug: String,
    pub rel: String,
    pub stage: Stage,
    pub error: OptimizationError,
}

impl std::fmt::Display for ImageFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} failed while {}: {}", self.rel, self.stage, self.error)
    }
}

/// One image that reached `Done`.
#[derive(Debug)]
struct ImageOutput {
    variants_written: usize,
    /// File name of the original copy placed in the image folder, if any.
    copy: Option<String>,
}

/// Merged result of the transformation stage.
#[derive(Debug, Default)]
pub struct TransformOutcome {
    /// Variant files written this run (not counting reused ones).
    pub variants_written: usize,
    /// Original copies present after this run (fresh or kept), as file
    /// names inside the image folder. These belong in the whitelist but
    /// never in the manifest.
    pub copies: Vec<String>,
    pub failures: Vec<ImageFailure>,
}

/// Execute every work order on a pool of `effective_workers()` threads and
/// merge the results.
pub fn transform(config: &Config, plans: &[ImagePlan]) -> Result<TransformOutcome, TransformError> {
    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(config.effective_workers())
        .build()?;

    let results: Vec<Result<ImageOutput, ImageFailure>> = pool.install(|| {
        plans
            .par_iter()
            .map(|plan| process_image(config, plan))
            .collect()
    });

    let mut outcome = TransformOutcome::default();
    for result in results {
        match result {
            Ok(output) => {
                outcome.variants_written += output.variants_written;
                outcome.copies.extend(output.copy);
            }
            Err(failure) => outcome.failures.push(failure),
        }
    }
    Ok(outcome)
}

/// Take one image from `Pending` all the way to `Done`.
fn process_image(config: &Config, plan: &ImagePlan) -> Result<ImageOutput, ImageFailure> {
    let source = plan.image.absolute(&config.input_folder_path());
    let image_folder = config.image_folder_path();
    let fail = |stage: Stage, error: OptimizationError| ImageFailure {
        slug: plan.slug.clone(),
        rel: plan.image.rel.clone(),
        stage,
        error,
    };

    let mut variants_written = 0;
    if plan.action == Action::Regenerate && !plan.files.is_empty() {
        let img = image::open(&source)
            .map_err(|e| fail(Stage::Resizing, OptimizationError::Decode(source.clone(), e)))?;
        let mut written = Vec::with_capacity(plan.files.len());
        for file in &plan.files {
            let dest = image_folder.join(&file.file_name);
            let resized = img.resize(file.width, u32::MAX, FilterType::Lanczos3);
            write_variant(&resized, &dest, file.format, config.jpg_quality)
                .map_err(|e| fail(Stage::Resizing, e))?;
            written.push(dest);
            variants_written += 1;
        }

        if let Some(cmd) = &config.optim_command {
            for dest in &written {
                run_optimizer(cmd, dest, config.optim_timeout_secs)
                    .map_err(|e| fail(Stage::Optimizing, e))?;
            }
        }
    }

    let copy = if config.do_copy {
        let name = naming::original_file_name(&plan.slug, plan.format);
        let dest = image_folder.join(&name);
        if plan.action == Action::Regenerate || !dest.exists() {
            std::fs::copy(&source, &dest)
                .map_err(|e| fail(Stage::Copying, OptimizationError::Io(dest.clone(), e)))?;
        }
        Some(name)
    } else {
        None
    };

    Ok(ImageOutput {
        variants_written,
        copy,
    })
}

/// Encode a resized image to `dest` in its source format.
///
/// JPEG output is converted to RGB8 first (the encoder rejects alpha);
/// WebP is written lossless, matching how variants are fingerprinted by
/// their source rather than their own bytes.
fn write_variant(
    img: &DynamicImage,
    dest: &Path,
    format: Format,
    jpg_quality: u8,
) -> Result<(), OptimizationError> {
    let file = std::fs::File::create(dest)
        .map_err(|e| OptimizationError::Io(dest.to_path_buf(), e))?;
    let writer = BufWriter::new(file);
    let encoded = match format {
        Format::Jpg => {
            let rgb = DynamicImage::ImageRgb8(img.to_rgb8());
            rgb.write_with_encoder(JpegEncoder::new_with_quality(writer, jpg_quality))
        }
        Format::Png => img.write_with_encoder(PngEncoder::new(writer)),
        Format::Webp => img.write_with_encoder(WebPEncoder::new_lossless(writer)),
    };
    encoded.map_err(|e| OptimizationError::Encode(dest.to_path_buf(), e))
}

/// Run the configured optimizer over one written file.
///
/// The file's path is appended as the command's final argument. The child
/// is polled until it exits or the deadline passes; on timeout it is
/// killed and reaped.
fn run_optimizer(cmd: &[String], file: &Path, timeout_secs: u64) -> Result<(), OptimizationError> {
    let program = cmd.first().map(String::as_str).unwrap_or("");
    let mut child = Command::new(program)
        .args(&cmd[1..])
        .arg(file)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn()
        .map_err(|e| OptimizationError::Io(file.to_path_buf(), e))?;

    let deadline = Instant::now() + Duration::from_secs(timeout_secs);
    loop {
        match child.try_wait() {
            Ok(Some(status)) => {
                if status.success() {
                    return Ok(());
                }
                return Err(OptimizationError::Optimizer(
                    program.to_string(),
                    file.to_path_buf(),
                    status.to_string(),
                ));
            }
            Ok(None) => {
                if Instant::now() >= deadline {
                    let _ = child.kill();
                    let _ = child.wait();
                    return Err(OptimizationError::Timeout(
                        program.to_string(),
                        file.to_path_buf(),
                        timeout_secs,
                    ));
                }
                std::thread::sleep(OPTIMIZER_POLL_INTERVAL);
            }
            Err(e) => return Err(OptimizationError::Io(file.to_path_buf(), e)),
        }
    }
}
