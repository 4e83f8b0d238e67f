//! Build configuration module.
//!
//! Handles loading and validating `enfasten.yml`. The file lives in the
//! base path (the directory that also contains the site folders) and uses
//! PascalCase keys:
//!
//! ```yaml
//! # All options are optional - defaults shown below
//!
//! InputFolder: _site            # Site folder to read images from
//! OutputFolder: _fastsite       # Folder generated images are written under
//! ImageFolder: assets/images    # Image subfolder inside the output folder
//! ManifestFile: enfasten_manifest.yml   # "" disables persistence
//! SizesAttr: ""                 # srcset sizes attribute (kept for compatibility)
//! OptimCommand: null            # e.g. ["optipng", "-quiet"] — file path appended
//! ScaleThreshold: 0.9           # skip widths that shrink less than this ratio
//! JpgScaleThreshold: 0.7        # same, for JPEG sources
//! JpgQuality: 90                # JPEG encoding quality (1-100)
//! DoCopy: true                  # copy originals into the output folder
//! Widths: [400, 800, 1600]      # target widths to generate
//! Blacklist: []                 # glob patterns over root-relative paths
//! Workers: null                 # parallel workers (omit for auto = CPU cores)
//! OptimTimeoutSecs: 60          # per-invocation optimizer timeout
//! ```
//!
//! Config files are sparse — override just the values you want. Unknown
//! keys are rejected to catch typos early.
//!
//! The base path and the cull flag come from the command line, not the
//! file. [`Config::load`] assembles all of it into one immutable value
//! that is threaded through the pipeline; nothing mutates it after load.

use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Name of the configuration file within the base path.
pub const CONFIG_FILENAME: &str = "enfasten.yml";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("cannot read {0}: {1}")]
    Io(PathBuf, #[source] std::io::Error),
    #[error("YAML parse error in {0}: {1}")]
    Yaml(PathBuf, #[source] serde_yaml::Error),
    #[error("config validation error: {0}")]
    Validation(String),
}

/// Build configuration loaded from `enfasten.yml`.
///
/// All fields have defaults matching the stock file above. User files need
/// only specify the values they want to override.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields, rename_all = "PascalCase")]
pub struct Config {
    /// Site folder images are discovered under, relative to the base path.
    pub input_folder: String,
    /// Folder generated output is written under, relative to the base path.
    pub output_folder: String,
    /// Image subfolder inside the output folder.
    pub image_folder: String,
    /// Manifest file path relative to the base path. Blank disables
    /// persistence: every run starts from an empty manifest and saves nothing.
    pub manifest_file: String,
    /// `sizes` attribute for generated srcsets. Accepted for compatibility
    /// with existing config files; HTML rewriting is outside this pipeline.
    pub sizes_attr: String,
    /// External optimizer command as argv. The generated file's absolute
    /// path is appended as the final argument. `None` disables optimization.
    pub optim_command: Option<Vec<String>>,
    /// Skip a target width when target/natural exceeds this ratio — the
    /// size reduction is too small to be worth a separate file.
    pub scale_threshold: f64,
    /// Same as `scale_threshold`, applied to JPEG sources.
    pub jpg_scale_threshold: f64,
    /// JPEG encoding quality (1-100).
    pub jpg_quality: u8,
    /// Copy originals verbatim into the output image folder.
    pub do_copy: bool,
    /// Target widths to generate, in increasing order.
    pub widths: Vec<u32>,
    /// Glob patterns over slash-separated root-relative source paths.
    /// Matching images are never discovered.
    pub blacklist: Vec<String>,
    /// Maximum parallel transform workers. When absent, defaults to the
    /// number of CPU cores. Values larger than the core count are clamped.
    pub workers: Option<usize>,
    /// Per-invocation timeout for the optimizer command, in seconds.
    pub optim_timeout_secs: u64,

    /// Directory containing `enfasten.yml` and the site folders (from the
    /// command line).
    #[serde(skip)]
    pub base_path: PathBuf,
    /// Whether the garbage-collection pass runs (from the command line).
    #[serde(skip)]
    pub cull: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            input_folder: "_site".to_string(),
            output_folder: "_fastsite".to_string(),
            image_folder: "assets/images".to_string(),
            manifest_file: "enfasten_manifest.yml".to_string(),
            sizes_attr: String::new(),
            optim_command: None,
            scale_threshold: 0.9,
            jpg_scale_threshold: 0.7,
            jpg_quality: 90,
            do_copy: true,
            widths: Vec::new(),
            blacklist: Vec::new(),
            workers: None,
            optim_timeout_secs: 60,
            base_path: PathBuf::new(),
            cull: false,
        }
    }
}

impl Config {
    /// Load `enfasten.yml` from `base_path` and assemble the full config.
    ///
    /// A missing or malformed file is fatal: the pipeline refuses to run
    /// against guessed settings.
    pub fn load(base_path: &Path, cull: bool) -> Result<Config, ConfigError> {
        let config_path = base_path.join(CONFIG_FILENAME);
        let content = fs::read_to_string(&config_path)
            .map_err(|e| ConfigError::Io(config_path.clone(), e))?;
        let mut config: Config = serde_yaml::from_str(&content)
            .map_err(|e| ConfigError::Yaml(config_path, e))?;
        config.base_path = base_path.to_path_buf();
        config.cull = cull;
        config.validate()?;
        Ok(config)
    }

    /// Validate config values are within acceptable ranges.
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (name, value) in [
            ("ScaleThreshold", self.scale_threshold),
            ("JpgScaleThreshold", self.jpg_scale_threshold),
        ] {
            if !(value > 0.0 && value <= 1.0) {
                return Err(ConfigError::Validation(format!(
                    "{name} must be within (0, 1], got {value}"
                )));
            }
        }
        if self.jpg_quality == 0 || self.jpg_quality > 100 {
            return Err(ConfigError::Validation(format!(
                "JpgQuality must be 1-100, got {}",
                self.jpg_quality
            )));
        }
        if self.widths.first() == Some(&0) {
            return Err(ConfigError::Validation("Widths must be positive".into()));
        }
        if !self.widths.windows(2).all(|w| w[0] < w[1]) {
            return Err(ConfigError::Validation(
                "Widths must be strictly increasing".into(),
            ));
        }
        if let Some(cmd) = &self.optim_command {
            if cmd.is_empty() {
                return Err(ConfigError::Validation(
                    "OptimCommand must name a program".into(),
                ));
            }
        }
        Ok(())
    }

    /// `basepath/InputFolder` — where source images are discovered.
    pub fn input_folder_path(&self) -> PathBuf {
        self.base_path.join(&self.input_folder)
    }

    /// `basepath/OutputFolder/ImageFolder` — where generated images land.
    pub fn image_folder_path(&self) -> PathBuf {
        self.base_path
            .join(&self.output_folder)
            .join(&self.image_folder)
    }

    /// Manifest location, or `None` when persistence is disabled.
    pub fn manifest_path(&self) -> Option<PathBuf> {
        if self.manifest_file.is_empty() {
            None
        } else {
            Some(self.base_path.join(&self.manifest_file))
        }
    }

    /// Resolve the effective transform worker count.
    ///
    /// - `None` → use all available cores
    /// - `Some(n)` → use `min(n, cores)` (user can constrain down, not up)
    pub fn effective_workers(&self) -> usize {
        let cores = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1);
        self.workers.map(|n| n.clamp(1, cores)).unwrap_or(cores)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn load_from_str(yaml: &str) -> Result<Config, ConfigError> {
        let tmp = TempDir::new().unwrap();
        fs::write(tmp.path().join(CONFIG_FILENAME), yaml).unwrap();
        Config::load(tmp.path(), false)
    }

    // =========================================================================
    // Defaults and loading
    // =========================================================================

    #[test]
    fn empty_file_yields_defaults() {
        let config = load_from_str("{}").unwrap();
        assert_eq!(config.input_folder, "_site");
        assert_eq!(config.output_folder, "_fastsite");
        assert_eq!(config.image_folder, "assets/images");
        assert_eq!(config.manifest_file, "enfasten_manifest.yml");
        assert_eq!(config.scale_threshold, 0.9);
        assert_eq!(config.jpg_scale_threshold, 0.7);
        assert_eq!(config.jpg_quality, 90);
        assert!(config.do_copy);
        assert!(config.widths.is_empty());
        assert!(config.optim_command.is_none());
        assert_eq!(config.optim_timeout_secs, 60);
    }

    #[test]
    fn sparse_file_overrides_only_named_keys() {
        let config = load_from_str("Widths: [400, 800]\nJpgQuality: 80\n").unwrap();
        assert_eq!(config.widths, vec![400, 800]);
        assert_eq!(config.jpg_quality, 80);
        assert_eq!(config.input_folder, "_site");
    }

    #[test]
    fn snake_case_keys_rejected() {
        // Unknown keys are rejected to catch typos
        assert!(matches!(
            load_from_str("input_folder: foo\n"),
            Err(ConfigError::Yaml(..))
        ));
    }

    #[test]
    fn missing_file_is_fatal() {
        let tmp = TempDir::new().unwrap();
        assert!(matches!(
            Config::load(tmp.path(), false),
            Err(ConfigError::Io(..))
        ));
    }

    #[test]
    fn malformed_yaml_is_fatal() {
        assert!(matches!(
            load_from_str(": not yaml ["),
            Err(ConfigError::Yaml(..))
        ));
    }

    #[test]
    fn cull_flag_attached_from_cli() {
        let tmp = TempDir::new().unwrap();
        fs::write(tmp.path().join(CONFIG_FILENAME), "{}").unwrap();
        let config = Config::load(tmp.path(), true).unwrap();
        assert!(config.cull);
        assert_eq!(config.base_path, tmp.path());
    }

    // =========================================================================
    // Validation
    // =========================================================================

    #[test]
    fn threshold_out_of_range_rejected() {
        assert!(matches!(
            load_from_str("ScaleThreshold: 1.5\n"),
            Err(ConfigError::Validation(_))
        ));
        assert!(matches!(
            load_from_str("JpgScaleThreshold: 0.0\n"),
            Err(ConfigError::Validation(_))
        ));
    }

    #[test]
    fn quality_out_of_range_rejected() {
        assert!(matches!(
            load_from_str("JpgQuality: 0\n"),
            Err(ConfigError::Validation(_))
        ));
    }

    #[test]
    fn widths_must_increase() {
        assert!(matches!(
            load_from_str("Widths: [800, 400]\n"),
            Err(ConfigError::Validation(_))
        ));
        assert!(matches!(
            load_from_str("Widths: [400, 400]\n"),
            Err(ConfigError::Validation(_))
        ));
    }

    #[test]
    fn empty_optim_command_rejected() {
        assert!(matches!(
            load_from_str("OptimCommand: []\n"),
            Err(ConfigError::Validation(_))
        ));
    }

    // =========================================================================
    // Derived paths
    // =========================================================================

    #[test]
    fn derived_paths_join_base() {
        let config = Config {
            base_path: PathBuf::from("/site"),
            ..Config::default()
        };
        assert_eq!(config.input_folder_path(), PathBuf::from("/site/_site"));
        assert_eq!(
            config.image_folder_path(),
            PathBuf::from("/site/_fastsite/assets/images")
        );
        assert_eq!(
            config.manifest_path(),
            Some(PathBuf::from("/site/enfasten_manifest.yml"))
        );
    }

    #[test]
    fn blank_manifest_file_disables_persistence() {
        let config = Config {
            manifest_file: String::new(),
            ..Config::default()
        };
        assert_eq!(config.manifest_path(), None);
    }

    #[test]
    fn effective_workers_clamps_to_cores() {
        let cores = std::thread::available_parallelism().unwrap().get();

        let config = Config {
            workers: Some(100_000),
            ..Config::default()
        };
        assert_eq!(config.effective_workers(), cores);

        let config = Config {
            workers: Some(1),
            ..Config::default()
        };
        assert_eq!(config.effective_workers(), 1);
    }
}
