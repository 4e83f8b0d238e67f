use clap::Parser;
use enfasten::{config, pipeline};
use std::path::PathBuf;

fn version_string() -> &'static str {
    let on_tag = env!("ON_RELEASE_TAG");
    if on_tag == "true" {
        env!("CARGO_PKG_VERSION")
    } else {
        let hash = env!("GIT_HASH");
        if hash.is_empty() {
            "dev@unknown"
        } else {
            // Leaked once at startup — trivial, called exactly once
            Box::leak(format!("dev@{hash}").into_boxed_str())
        }
    }
}

#[derive(Parser)]
#[command(name = "enfasten")]
#[command(about = "Incremental responsive-image builder for static sites")]
#[command(long_about = "\
Incremental responsive-image builder for static sites

Reads enfasten.yml from the base path, walks the configured input folder
for images, and writes downscaled, optimized variants into the output
image folder. A YAML manifest remembers what was built so unchanged
images are never reprocessed.

Typical layout:

  mysite/
  ├── enfasten.yml                 # Configuration
  ├── enfasten_manifest.yml        # Build memory (created by enfasten)
  ├── _site/                       # Input: your generated site
  │   └── assets/photos/dawn.jpg
  └── _fastsite/                   # Output
      └── assets/images/
          ├── dawn-400.jpg         # Generated variants
          ├── dawn-800.jpg
          └── dawn.jpg             # Copy of the original

Variants are named {slug}-{width}.{ext}. Widths come from the Widths
config list; near-full-size variants are skipped per ScaleThreshold.
Pass --cull to delete output images no longer produced by the build.")]
#[command(version = version_string())]
struct Cli {
    /// The folder in which to search for enfasten.yml
    #[arg(long, default_value = ".")]
    basepath: PathBuf,

    /// Whether to cull stale output images this run
    #[arg(long)]
    cull: bool,
}

fn main() {
    let cli = Cli::parse();
    if let Err(err) = run(&cli) {
        eprintln!("FATAL ERROR: {err}");
        std::process::exit(1);
    }
}

fn run(cli: &Cli) -> Result<(), pipeline::BuildError> {
    let config = config::Config::load(&cli.basepath, cli.cull)?;
    let report = pipeline::build(&config)?;
    println!("==> Build complete: {report}");
    Ok(())
}
