//! # Enfasten
//!
//! An incremental responsive-image builder for static sites. Point it at a
//! generated site (Jekyll's `_site`, for example) and it produces
//! downscaled, optimized variants of every image into a parallel output
//! folder, driven by an `enfasten.yml` in the project root.
//!
//! # Architecture: One Pipeline, Five Stages
//!
//! ```text
//! 1. Discover   input folder   →  image list      (walk, filter, blacklist)
//! 2. Reconcile  old manifest   →  work orders     (reuse or regenerate, plan widths)
//! 3. Transform  work orders    →  image folder    (resize, optimize, copy)
//! 4. Persist    new manifest   →  enfasten_manifest.yml
//! 5. Cull       whitelist      →  deletions       (opt-in garbage collection)
//! ```
//!
//! The manifest is the memory between runs: a YAML map from slug to source
//! path, content fingerprint, natural width, and generated files. A source
//! whose fingerprint and planned widths both match its manifest entry is
//! not touched again, so rebuilding an unchanged site does no image work.
//! Fingerprints are content hashes rather than mtimes, which makes the
//! cache survive `git checkout` and fresh CI clones.
//!
//! # Module Map
//!
//! | Module | Role |
//! |--------|------|
//! | [`config`] | `enfasten.yml` loading, validation, derived paths |
//! | [`discover`] | Stage 1 — walks the input folder, filters by extension and blacklist |
//! | [`naming`] | Slug assignment (collision-stable) and output file names |
//! | [`manifest`] | The YAML manifest: schema, atomic persistence |
//! | [`reconcile`] | Stage 2 — fingerprints sources, plans widths, decides reuse vs regenerate |
//! | [`transform`] | Stage 3 — resizes, runs the optimizer command, copies originals |
//! | [`cull`] | Stage 5 — whitelist-driven deletion of stale outputs |
//! | [`pipeline`] | Wires the stages together behind one `build` call |
//!
//! # Design Decisions
//!
//! ## Manifest Over Mtime
//!
//! Incremental state lives in one human-readable YAML file keyed by slug.
//! Each entry records the SHA-256 of the source bytes and the natural
//! width, so the reuse decision needs no image decoding at all: hash the
//! file, re-plan the widths from the recorded natural width, and compare.
//!
//! ## Whitelist Garbage Collection
//!
//! The output image folder is owned entirely by this tool, so cleanup is
//! inverted: rather than tracking what each run deleted, every run can
//! enumerate exactly which files should exist (manifest entries plus
//! original copies) and `--cull` deletes the rest. Renamed sources,
//! removed widths, and aborted runs all get cleaned up by the same
//! mechanism.
//!
//! ## Per-Image Failure Isolation
//!
//! One corrupt photo should not abort a thousand-image build. Unreadable
//! sources and failed optimizer invocations fail that image only: it is
//! reported, left out of the manifest and whitelist, and retried from
//! scratch on the next run. Configuration and manifest problems, by
//! contrast, fail fast.
//!
//! ## External Optimizer, Internal Resizer
//!
//! Resizing is done in-process with the `image` crate (Lanczos3), but
//! byte-level optimization is delegated to whatever command the user
//! configures (`optipng`, `jpegoptim`, ...). Those tools are better at
//! squeezing bytes than any reimplementation would be, and the
//! subprocess boundary keeps their failures isolated per image.

pub mod config;
pub mod cull;
pub mod discover;
pub mod manifest;
pub mod naming;
pub mod pipeline;
pub mod reconcile;
pub mod transform;
