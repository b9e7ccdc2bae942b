//! Layered settings.
//!
//! Values are merged in this order, later sources winning:
//! built-in defaults, `.hdlindex/settings.toml` (searched upward from the
//! current directory), then `HDLX_` environment variables. A double
//! underscore separates nesting levels:
//!
//! - `HDLX_INDEXING__ENABLE_THREADS=false` sets `indexing.enable_threads`
//! - `HDLX_INDEXING__WORKER_THREADS=4` sets `indexing.worker_threads`
//! - `HDLX_LOGGING__DEFAULT=debug` sets `logging.default`

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{IndexError, IndexResult};

pub const CONFIG_DIR: &str = ".hdlindex";
pub const CONFIG_FILE: &str = "settings.toml";
const ENV_PREFIX: &str = "HDLX_";

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct Settings {
    /// Version of the settings schema
    #[serde(default = "default_version")]
    pub version: u32,

    /// Directory holding `.hdlindex`; substituted for `${workspace_loc}`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub workspace_root: Option<PathBuf>,

    #[serde(default)]
    pub indexing: IndexingConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct IndexingConfig {
    /// Run per-file stage work on a worker pool
    #[serde(default = "default_true")]
    pub enable_threads: bool,

    /// Worker pool size (0 = one per CPU)
    #[serde(default = "default_worker_threads")]
    pub worker_threads: usize,

    /// Apply invalidations immediately instead of deferring them
    #[serde(default = "default_true")]
    pub auto_rebuild: bool,

    /// Include search directories added to every index
    #[serde(default)]
    pub include_paths: Vec<String>,

    /// Global macro definitions (`NAME = "value"`)
    #[serde(default)]
    pub defines: IndexMap<String, String>,

    /// Extensions picked up by source collection
    #[serde(default = "default_source_extensions")]
    pub source_extensions: Vec<String>,

    /// Gitignore-style patterns excluded from source collection
    #[serde(default = "default_ignore_patterns")]
    pub ignore_patterns: Vec<String>,

    /// Quiet period before a modified file is reported
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,

    /// Where cache snapshots are written
    #[serde(default = "default_cache_dir")]
    pub cache_dir: PathBuf,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct LoggingConfig {
    /// Level for everything not listed in `modules`
    #[serde(default = "default_log_level")]
    pub default: String,

    /// Per-target overrides, e.g. `"hdlindex::indexing" = "debug"`
    #[serde(default)]
    pub modules: IndexMap<String, String>,
}

fn default_version() -> u32 {
    1
}
fn default_true() -> bool {
    true
}
fn default_worker_threads() -> usize {
    num_cpus::get()
}
fn default_source_extensions() -> Vec<String> {
    ["sv", "svh", "v", "vh", "vl", "vlog", "svi"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}
fn default_ignore_patterns() -> Vec<String> {
    vec![
        ".git/".to_string(),
        ".hdlindex/".to_string(),
        "work/".to_string(),
    ]
}
fn default_debounce_ms() -> u64 {
    300
}
fn default_cache_dir() -> PathBuf {
    PathBuf::from(CONFIG_DIR).join("cache")
}
fn default_log_level() -> String {
    "warn".to_string()
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            version: default_version(),
            workspace_root: None,
            indexing: IndexingConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl Default for IndexingConfig {
    fn default() -> Self {
        Self {
            enable_threads: true,
            worker_threads: default_worker_threads(),
            auto_rebuild: true,
            include_paths: Vec::new(),
            defines: IndexMap::new(),
            source_extensions: default_source_extensions(),
            ignore_patterns: default_ignore_patterns(),
            debounce_ms: default_debounce_ms(),
            cache_dir: default_cache_dir(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            default: default_log_level(),
            modules: IndexMap::new(),
        }
    }
}

impl IndexingConfig {
    /// Worker count with the `0 = auto` rule applied.
    pub fn effective_threads(&self) -> usize {
        if self.worker_threads == 0 {
            num_cpus::get()
        } else {
            self.worker_threads
        }
    }
}

impl Settings {
    /// Load settings from defaults, the workspace settings file and the environment.
    pub fn load() -> IndexResult<Self> {
        let config_path = Self::find_workspace_config()
            .unwrap_or_else(|| PathBuf::from(CONFIG_DIR).join(CONFIG_FILE));

        let mut settings = Self::figment(&config_path).extract::<Settings>().map_err(Box::new)?;
        if settings.workspace_root.is_none() {
            settings.workspace_root = Self::workspace_root();
        }
        Ok(settings)
    }

    /// Load settings from a specific file (plus environment overrides).
    pub fn load_from(path: impl AsRef<Path>) -> IndexResult<Self> {
        Ok(Self::figment(path.as_ref())
            .extract::<Settings>()
            .map_err(Box::new)?)
    }

    fn figment(path: &Path) -> Figment {
        Figment::new()
            .merge(Serialized::defaults(Settings::default()))
            .merge(Toml::file(path))
            .merge(Env::prefixed(ENV_PREFIX).map(|key| {
                key.as_str().to_lowercase().replace("__", ".").into()
            }))
    }

    fn find_workspace_config() -> Option<PathBuf> {
        Self::workspace_root().map(|root| root.join(CONFIG_DIR).join(CONFIG_FILE))
    }

    /// Nearest ancestor of the current directory holding `.hdlindex/`.
    pub fn workspace_root() -> Option<PathBuf> {
        let current = std::env::current_dir().ok()?;
        current
            .ancestors()
            .find(|dir| dir.join(CONFIG_DIR).is_dir())
            .map(Path::to_path_buf)
    }

    pub fn save(&self, path: impl AsRef<Path>) -> IndexResult<()> {
        let path = path.as_ref();
        let write_err = |reason: String| IndexError::ConfigWrite {
            path: path.to_path_buf(),
            reason,
        };

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| write_err(e.to_string()))?;
        }
        let body = toml::to_string_pretty(self).map_err(|e| write_err(e.to_string()))?;
        std::fs::write(path, body).map_err(|e| write_err(e.to_string()))?;
        Ok(())
    }

    /// Write a default settings file under `dir`, refusing to clobber unless `force`.
    pub fn init_config_file(dir: impl AsRef<Path>, force: bool) -> IndexResult<PathBuf> {
        let dir = dir.as_ref();
        let config_path = dir.join(CONFIG_DIR).join(CONFIG_FILE);

        if !force && config_path.exists() {
            return Err(IndexError::ConfigWrite {
                path: config_path,
                reason: "configuration file already exists, use --force to overwrite".to_string(),
            });
        }

        let settings = Settings {
            workspace_root: Some(dir.to_path_buf()),
            ..Settings::default()
        };
        settings.save(&config_path)?;
        Ok(config_path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_default_settings() {
        let settings = Settings::default();
        assert_eq!(settings.version, 1);
        assert!(settings.indexing.enable_threads);
        assert!(settings.indexing.auto_rebuild);
        assert!(settings.indexing.worker_threads > 0);
        assert!(settings.indexing.source_extensions.contains(&"svh".to_string()));
        assert_eq!(settings.logging.default, "warn");
    }

    #[test]
    fn test_load_from_toml() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("settings.toml");

        let toml_content = r#"
version = 2

[indexing]
enable_threads = false
worker_threads = 3
include_paths = ["rtl/include", "${workspace_loc}/common"]
source_extensions = ["sv"]

[indexing.defines]
SIM = "1"

[logging]
default = "info"

[logging.modules]
"hdlindex::indexing" = "debug"
"#;
        fs::write(&config_path, toml_content).unwrap();

        let settings = Settings::load_from(&config_path).unwrap();
        assert_eq!(settings.version, 2);
        assert!(!settings.indexing.enable_threads);
        assert_eq!(settings.indexing.worker_threads, 3);
        assert_eq!(settings.indexing.include_paths.len(), 2);
        assert_eq!(settings.indexing.source_extensions, vec!["sv"]);
        assert_eq!(settings.indexing.defines.get("SIM").map(String::as_str), Some("1"));
        assert_eq!(settings.logging.default, "info");
        assert_eq!(settings.logging.modules["hdlindex::indexing"], "debug");
        // untouched values fall back to defaults
        assert!(settings.indexing.auto_rebuild);
        assert_eq!(settings.indexing.debounce_ms, 300);
    }

    #[test]
    fn test_save_and_reload() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("nested").join("settings.toml");

        let mut settings = Settings::default();
        settings.indexing.worker_threads = 2;
        settings.indexing.auto_rebuild = false;
        settings.save(&config_path).unwrap();

        let loaded = Settings::load_from(&config_path).unwrap();
        assert_eq!(loaded.indexing.worker_threads, 2);
        assert!(!loaded.indexing.auto_rebuild);
    }

    #[test]
    fn test_init_config_file_refuses_overwrite() {
        let temp_dir = TempDir::new().unwrap();

        let path = Settings::init_config_file(temp_dir.path(), false).unwrap();
        assert!(path.exists());
        assert!(path.ends_with(".hdlindex/settings.toml"));

        let again = Settings::init_config_file(temp_dir.path(), false);
        assert!(matches!(again, Err(IndexError::ConfigWrite { .. })));

        assert!(Settings::init_config_file(temp_dir.path(), true).is_ok());
    }

    #[test]
    fn test_effective_threads() {
        let mut config = IndexingConfig {
            worker_threads: 0,
            ..IndexingConfig::default()
        };
        assert_eq!(config.effective_threads(), num_cpus::get());
        config.worker_threads = 5;
        assert_eq!(config.effective_threads(), 5);
    }
}
