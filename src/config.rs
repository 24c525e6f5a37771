//! # Configuration Module
//!
//! Data directory setup and the runtime configuration file.
//!
//! ## Data Storage
//!
//! The library database lives in the platform-standard data directory:
//! - Linux: `~/.local/share/mixquery/library.db`
//! - macOS: `~/Library/Application Support/mixquery/library.db`
//! - Windows: `%APPDATA%\mixquery\library.db`
//!
//! ## Configuration File
//!
//! An optional JSON file, by default `<data dir>/mixquery/config.json`. Every
//! field may be omitted:
//!
//! ```json
//! {
//!   "db_path": "/srv/music/library.db",
//!   "default_page_size": 50,
//!   "recommendation_groups": {
//!     "0": { "anchor": { "kind": "percentile", "value": 0.1 } },
//!     "12": { "anchor": { "kind": "centroid" }, "features": ["rms", "energy"] }
//!   }
//! }
//! ```
//!
//! A `recommendation_groups` table replaces the built-in groups `0..=9`
//! entirely.

use crate::engine::DEFAULT_PAGE_SIZE;
use crate::recommend::RecommendationTable;
use anyhow::{anyhow, bail, Context, Result};
use log::{debug, info};
use path_absolutize::Absolutize;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

const APP_DIR: &str = "mixquery";
const DB_FILE: &str = "library.db";
const CONFIG_FILE: &str = "config.json";

/// Returns the platform-appropriate data directory for mixquery, creating it
/// if needed.
///
/// # Errors
///
/// This function will return an error if:
/// - The system data directory cannot be determined
/// - The `mixquery` subdirectory cannot be created due to permissions
pub fn get_data_dir() -> Result<PathBuf> {
    let data_dir = dirs::data_dir().ok_or_else(|| {
        anyhow!(
            "Could not determine system data directory. Please ensure your platform supports standard data directories."
        )
    })?;
    app_dir_in(&data_dir)
}

/// Returns the default database file path.
///
/// # Examples
///
/// ```no_run
/// use mixquery::config::get_db_path;
///
/// let db_path = get_db_path()?;
/// println!("Database location: {}", db_path.display());
/// # Ok::<(), anyhow::Error>(())
/// ```
///
/// # Errors
///
/// Same as [`get_data_dir`].
pub fn get_db_path() -> Result<PathBuf> {
    Ok(get_data_dir()?.join(DB_FILE))
}

fn app_dir_in(data_dir: &Path) -> Result<PathBuf> {
    let app_dir = data_dir.join(APP_DIR);
    fs::create_dir_all(&app_dir).with_context(|| {
        format!(
            "Failed to create mixquery data directory at {}. Please check file permissions.",
            app_dir.display()
        )
    })?;
    Ok(app_dir)
}

/// Make a user-supplied path absolute against the current directory.
///
/// # Errors
///
/// Returns an error if the current directory cannot be read.
pub fn absolute_path(path: &Path) -> Result<PathBuf> {
    Ok(path
        .absolutize()
        .with_context(|| format!("Could not resolve path {}", path.display()))?
        .into_owned())
}

/// Configuration for runtime behavior
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// Path to the database file
    pub db_path: PathBuf,
    /// Rows per page when neither the caller nor `pipe::limit` sets one
    pub default_page_size: u64,
    /// Group id to anchor mapping for `pipe::recommend`
    pub recommendation_groups: RecommendationTable,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            db_path: get_db_path().unwrap_or_else(|_| PathBuf::from(DB_FILE)),
            default_page_size: DEFAULT_PAGE_SIZE,
            recommendation_groups: RecommendationTable::default(),
        }
    }
}

impl RuntimeConfig {
    /// Parse a configuration file. Relative `db_path` values are resolved
    /// against the file's directory.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or is not valid JSON.
    pub fn from_file(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        let mut config: Self = serde_json::from_str(&text)
            .with_context(|| format!("Invalid config file {}", path.display()))?;

        if config.db_path.is_relative() {
            if let Some(parent) = path.parent() {
                config.db_path = parent.join(&config.db_path);
            }
        }
        config.db_path = absolute_path(&config.db_path)?;

        debug!("Loaded configuration from {}: {config:?}", path.display());
        Ok(config)
    }

    /// Load the effective configuration.
    ///
    /// An explicit `config_path` must exist. Without one, the default config
    /// file is read when present and defaults are used otherwise. A
    /// `db_override` (from `--db`) wins over the file.
    ///
    /// # Errors
    ///
    /// Returns an error if an explicit config file is missing or any config
    /// file is invalid.
    pub fn load(config_path: Option<&Path>, db_override: Option<&Path>) -> Result<Self> {
        let mut config = match config_path {
            Some(path) => {
                if !path.exists() {
                    bail!("Config file {} does not exist", path.display());
                }
                Self::from_file(&absolute_path(path)?)?
            }
            None => match get_data_dir().map(|dir| dir.join(CONFIG_FILE)) {
                Ok(default_path) if default_path.exists() => Self::from_file(&default_path)?,
                _ => Self::default(),
            },
        };

        if let Some(db_path) = db_override {
            config.db_path = absolute_path(db_path)?;
        }

        info!("Using database {}", config.db_path.display());
        Ok(config)
    }
}
