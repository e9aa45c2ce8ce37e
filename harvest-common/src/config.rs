//! Configuration loading and root folder resolution
//!
//! Root folder resolution priority:
//! 1. Command-line argument (highest priority)
//! 2. Environment variable (`HARVEST_ROOT_FOLDER`)
//! 3. TOML config file (`root_folder`)
//! 4. OS-dependent compiled default (fallback)

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Environment variable overriding the root folder
pub const ROOT_FOLDER_ENV: &str = "HARVEST_ROOT_FOLDER";

/// Environment variable pointing at the TOML config file
pub const CONFIG_PATH_ENV: &str = "HARVEST_CONFIG";

/// Config file name looked up inside the root folder
pub const CONFIG_FILE_NAME: &str = "harvest.toml";

/// Complete TOML configuration file
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct TomlConfig {
    pub root_folder: Option<PathBuf>,
    pub logging: LoggingConfig,
    pub store: StoreConfig,
    pub sources: SourcesConfig,
    pub directory: DirectoryConfig,
    pub harvest: HarvestSettings,
}

/// `[logging]` section
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default `tracing` filter level (overridden by RUST_LOG)
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

/// `[store]` section
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct StoreConfig {
    /// Database path, relative paths resolve against the root folder
    pub path: PathBuf,
    /// Upper bound on retrying a locked database, milliseconds
    pub lock_wait_ms: u64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("harvest.db"),
            lock_wait_ms: 5000,
        }
    }
}

/// `[sources]` section: input documents and connector data
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SourcesConfig {
    /// Directory holding connector data (JSON-lines exports, tags)
    pub root: PathBuf,
    pub default_data: PathBuf,
    pub driverlog: Option<PathBuf>,
    pub project_list: Option<PathBuf>,
    pub corrections: Option<PathBuf>,
}

impl Default for SourcesConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from("sources"),
            default_data: PathBuf::from("default_data.json"),
            driverlog: None,
            project_list: None,
            corrections: None,
        }
    }
}

/// `[directory]` section: identity directory lookups
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct DirectoryConfig {
    pub enabled: bool,
    pub base_url: String,
    /// Per-lookup timeout, milliseconds
    pub timeout_ms: u64,
    /// Minimum spacing between lookups, milliseconds
    pub min_interval_ms: u64,
}

impl Default for DirectoryConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            base_url: "https://api.launchpad.net/1.0".to_string(),
            timeout_ms: 10_000,
            min_interval_ms: 100,
        }
    }
}

/// `[harvest]` section
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct HarvestSettings {
    /// Repositories harvested concurrently
    pub max_parallel_repos: usize,
    /// Records per merge transaction
    pub merge_chunk_size: usize,
    pub days_to_update_members: u32,
    pub members_look_ahead: u32,
}

impl Default for HarvestSettings {
    fn default() -> Self {
        Self {
            max_parallel_repos: 4,
            merge_chunk_size: 200,
            days_to_update_members: 30,
            members_look_ahead: 250,
        }
    }
}

impl TomlConfig {
    /// Resolve a possibly relative path against the root folder
    pub fn resolve_path(root: &Path, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            root.join(path)
        }
    }
}

/// Load and parse a TOML config file
pub fn load_toml_config(path: &Path) -> Result<TomlConfig> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| Error::Config(format!("Read {} failed: {}", path.display(), e)))?;
    toml::from_str(&content)
        .map_err(|e| Error::Config(format!("Parse {} failed: {}", path.display(), e)))
}

/// Load the TOML config, degrading to defaults when the file is missing
///
/// A file that exists but does not parse is still an error.
pub fn load_toml_config_or_default(path: &Path) -> Result<TomlConfig> {
    if !path.exists() {
        warn!(
            path = %path.display(),
            "Config file not found, using defaults"
        );
        return Ok(TomlConfig::default());
    }
    let config = load_toml_config(path)?;
    info!(path = %path.display(), "Loaded config file");
    Ok(config)
}

/// Serialize a config back to disk
pub fn write_toml_config(config: &TomlConfig, path: &Path) -> Result<()> {
    let content = toml::to_string_pretty(config)
        .map_err(|e| Error::Config(format!("Serialize TOML failed: {}", e)))?;
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, content)?;
    Ok(())
}

/// Root folder resolver following CLI → ENV → TOML → default priority
pub struct RootFolderResolver {
    cli_arg: Option<PathBuf>,
    toml_root: Option<PathBuf>,
}

impl RootFolderResolver {
    pub fn new(cli_arg: Option<PathBuf>, toml_root: Option<PathBuf>) -> Self {
        Self { cli_arg, toml_root }
    }

    pub fn resolve(&self) -> PathBuf {
        if let Some(path) = &self.cli_arg {
            return path.clone();
        }

        if let Ok(path) = std::env::var(ROOT_FOLDER_ENV) {
            if !path.trim().is_empty() {
                return PathBuf::from(path);
            }
        }

        if let Some(path) = &self.toml_root {
            return path.clone();
        }

        default_root_folder()
    }
}

/// Get OS-dependent default root folder path
pub fn default_root_folder() -> PathBuf {
    if cfg!(target_os = "linux") {
        // ~/.local/share/harvest (or /var/lib/harvest for system-wide)
        dirs::data_local_dir()
            .map(|d| d.join("harvest"))
            .unwrap_or_else(|| PathBuf::from("/var/lib/harvest"))
    } else if cfg!(target_os = "macos") {
        dirs::data_dir()
            .map(|d| d.join("harvest"))
            .unwrap_or_else(|| PathBuf::from("/Library/Application Support/harvest"))
    } else if cfg!(target_os = "windows") {
        dirs::data_local_dir()
            .map(|d| d.join("harvest"))
            .unwrap_or_else(|| PathBuf::from("C:\\ProgramData\\harvest"))
    } else {
        PathBuf::from("./harvest_data")
    }
}

/// Config file path: `HARVEST_CONFIG`, else `harvest.toml` in the root folder
pub fn default_config_path(root_folder: &Path) -> PathBuf {
    if let Ok(path) = std::env::var(CONFIG_PATH_ENV) {
        if !path.trim().is_empty() {
            return PathBuf::from(path);
        }
    }
    root_folder.join(CONFIG_FILE_NAME)
}
