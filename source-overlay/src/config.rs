//! Overlay configuration.
//!
//! Settings come from defaults, optionally overridden by an INI file:
//!
//! ```ini
//! [overlay]
//! base_directory = /home/me/project/.pyre
//! isolate = false
//! source_suffixes = .py, .pyi
//! initializer_stem = __init__
//! source_directories = src, third_party/stubs
//! log_file = /tmp/source-overlay.log
//! ```
//!
//! Missing sections and keys keep their defaults. Relative paths are kept
//! as written and resolved by the caller.

use std::path::{Path, PathBuf};

use ini::Ini;
use thiserror::Error;

use crate::merge::{PathMerger, DEFAULT_INITIALIZER_STEM, DEFAULT_SOURCE_SUFFIXES};
use crate::overlay::OverlayDirectory;

/// Name of the directory, relative to the working directory, that holds
/// overlay roots by default.
pub const DEFAULT_BASE_DIRECTORY_NAME: &str = ".pyre";

/// INI section read by [`OverlayConfig::load`].
const SECTION: &str = "overlay";

/// Errors that can occur while loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The file could not be read or parsed.
    #[error("failed to read config {}: {reason}", path.display())]
    Read { path: PathBuf, reason: String },

    /// A key holds a value of the wrong shape.
    #[error("invalid value for '{key}': {value}")]
    InvalidValue { key: String, value: String },
}

/// Settings for building overlays.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OverlayConfig {
    /// Directory under which overlay roots are created.
    pub base_directory: PathBuf,

    /// Use a per-process overlay root that is removed on cleanup.
    pub isolate: bool,

    /// File name suffixes that are merged.
    pub source_suffixes: Vec<String>,

    /// File stem of package initializer files.
    pub initializer_stem: String,

    /// Source directories to merge when none are given explicitly.
    pub source_directories: Vec<PathBuf>,

    /// Write logs here instead of stderr.
    pub log_file: Option<PathBuf>,
}

impl Default for OverlayConfig {
    fn default() -> Self {
        let base_directory = std::env::current_dir()
            .map(|cwd| cwd.join(DEFAULT_BASE_DIRECTORY_NAME))
            .unwrap_or_else(|_| PathBuf::from(DEFAULT_BASE_DIRECTORY_NAME));

        Self {
            base_directory,
            isolate: false,
            source_suffixes: DEFAULT_SOURCE_SUFFIXES.iter().map(|s| s.to_string()).collect(),
            initializer_stem: DEFAULT_INITIALIZER_STEM.to_string(),
            source_directories: Vec::new(),
            log_file: None,
        }
    }
}

impl OverlayConfig {
    /// Load configuration from an INI file on top of the defaults.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let ini = Ini::load_from_file(path).map_err(|e| ConfigError::Read {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        Self::from_ini(&ini)
    }

    /// Parse configuration from INI text on top of the defaults.
    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        let ini = Ini::load_from_str(content).map_err(|e| ConfigError::Read {
            path: PathBuf::from("<string>"),
            reason: e.to_string(),
        })?;
        Self::from_ini(&ini)
    }

    fn from_ini(ini: &Ini) -> Result<Self, ConfigError> {
        let mut config = Self::default();

        let Some(section) = ini.section(Some(SECTION)) else {
            return Ok(config);
        };

        if let Some(value) = section.get("base_directory") {
            config.base_directory = PathBuf::from(value.trim());
        }
        if let Some(value) = section.get("isolate") {
            config.isolate = parse_bool("isolate", value)?;
        }
        if let Some(value) = section.get("source_suffixes") {
            let suffixes = split_list(value);
            if suffixes.is_empty() {
                return Err(ConfigError::InvalidValue {
                    key: "source_suffixes".to_string(),
                    value: value.to_string(),
                });
            }
            config.source_suffixes = suffixes;
        }
        if let Some(value) = section.get("initializer_stem") {
            config.initializer_stem = value.trim().to_string();
        }
        if let Some(value) = section.get("source_directories") {
            config.source_directories = split_list(value).into_iter().map(PathBuf::from).collect();
        }
        if let Some(value) = section.get("log_file") {
            let value = value.trim();
            config.log_file = (!value.is_empty()).then(|| PathBuf::from(value));
        }

        Ok(config)
    }

    /// Set the base directory.
    pub fn with_base_directory(mut self, base_directory: impl Into<PathBuf>) -> Self {
        self.base_directory = base_directory.into();
        self
    }

    /// Enable or disable isolation mode.
    pub fn with_isolate(mut self, isolate: bool) -> Self {
        self.isolate = isolate;
        self
    }

    /// Set the source directories.
    pub fn with_source_directories(mut self, directories: Vec<PathBuf>) -> Self {
        self.source_directories = directories;
        self
    }

    /// Create the path merger these settings describe.
    pub fn merger(&self) -> PathMerger {
        PathMerger::new(self.source_suffixes.clone(), self.initializer_stem.clone())
    }

    /// Create the overlay directory these settings describe.
    pub fn overlay_directory(&self) -> OverlayDirectory {
        OverlayDirectory::new(&self.base_directory, self.isolate).with_merger(self.merger())
    }
}

fn parse_bool(key: &str, value: &str) -> Result<bool, ConfigError> {
    match value.trim().to_lowercase().as_str() {
        "true" | "yes" | "1" | "on" => Ok(true),
        "false" | "no" | "0" | "off" => Ok(false),
        _ => Err(ConfigError::InvalidValue {
            key: key.to_string(),
            value: value.to_string(),
        }),
    }
}

fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(str::to_string)
        .collect()
}
