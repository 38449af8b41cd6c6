use crate::error::{RegistryError, Result, ResultExt as _};
use crate::profiling::ProfileOptions;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Directory name under the platform data directory.
pub const APP_DIR_NAME: &str = "dataset-registry";

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct SearchSettings {
    /// Page size when a caller does not ask for one
    pub default_per_page: usize,
    /// Largest page size a caller may request
    pub max_per_page: usize,
}

impl Default for SearchSettings {
    fn default() -> Self {
        Self {
            default_per_page: 20,
            max_per_page: 100,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct LoggingSettings {
    /// Filter directive used when `RUST_LOG` is unset
    pub level: String,
    /// Also write daily-rotated log files
    pub file_logging: bool,
    /// Where rotated logs go; defaults to `<data dir>/dataset-registry/logs`
    pub log_dir: Option<PathBuf>,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_owned(),
            file_logging: false,
            log_dir: None,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct RegistryConfig {
    /// Root of the version store
    pub storage_root: PathBuf,
    /// JSON file holding registry state; in-memory only when unset
    pub state_file: Option<PathBuf>,
    pub search: SearchSettings,
    pub profiling: ProfileOptions,
    pub logging: LoggingSettings,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self::rooted_at(&base_dir())
    }
}

impl RegistryConfig {
    /// Store files under `<root>/versions` and state in `<root>/registry.json`.
    pub fn rooted_at(root: &Path) -> Self {
        Self {
            storage_root: root.join("versions"),
            state_file: Some(root.join("registry.json")),
            search: SearchSettings::default(),
            profiling: ProfileOptions::default(),
            logging: LoggingSettings::default(),
        }
    }

    /// Files under `storage_root`, nothing persisted between runs.
    pub fn in_memory(storage_root: PathBuf) -> Self {
        Self {
            storage_root,
            state_file: None,
            ..Self::rooted_at(Path::new("."))
        }
    }
}

/// Platform data directory for the registry, or the working directory when
/// the platform has none.
pub fn base_dir() -> PathBuf {
    dirs::data_dir()
        .map(|d| d.join(APP_DIR_NAME))
        .unwrap_or_else(|| PathBuf::from(".").join(APP_DIR_NAME))
}

pub fn get_config_path() -> PathBuf {
    base_dir().join("config.json")
}

/// Load configuration from `path`, or defaults when the file does not exist.
///
/// # Errors
///
/// `Validation` when the file exists but is not a valid configuration.
pub fn load_config(path: &Path) -> Result<RegistryConfig> {
    if !path.exists() {
        return Ok(RegistryConfig::default());
    }
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config {}", path.display()))?;
    serde_json::from_str(&content).map_err(|e| {
        RegistryError::Validation(format!("config {} is malformed: {e}", path.display()))
    })
}

pub fn save_config(config: &RegistryConfig, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let content = serde_json::to_string_pretty(config)?;
    std::fs::write(path, content)?;
    Ok(())
}
