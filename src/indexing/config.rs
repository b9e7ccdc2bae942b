use indexmap::IndexMap;

use crate::config::IndexingConfig;

/// Per-index engine settings.
#[derive(Debug, Clone)]
pub struct IndexConfig {
    pub enable_threads: bool,
    pub worker_threads: usize,
    pub auto_rebuild: bool,
    /// Appended to the include paths found by root discovery.
    pub include_paths: Vec<String>,
    /// Seed for the index's global defines.
    pub defines: IndexMap<String, String>,
    /// Rewrite resolved include paths into `${workspace_loc}` form when the
    /// provider has a workspace root.
    pub use_workspace_relative: bool,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            enable_threads: false,
            worker_threads: 1,
            auto_rebuild: true,
            include_paths: Vec::new(),
            defines: IndexMap::new(),
            use_workspace_relative: false,
        }
    }
}

impl IndexConfig {
    pub fn from_settings(settings: &IndexingConfig) -> Self {
        Self {
            enable_threads: settings.enable_threads,
            worker_threads: settings.effective_threads(),
            auto_rebuild: settings.auto_rebuild,
            include_paths: settings.include_paths.clone(),
            defines: settings.defines.clone(),
            use_workspace_relative: false,
        }
    }

    pub fn with_threads(mut self, threads: usize) -> Self {
        self.enable_threads = threads > 1;
        self.worker_threads = threads.max(1);
        self
    }

    pub fn with_auto_rebuild(mut self, auto_rebuild: bool) -> Self {
        self.auto_rebuild = auto_rebuild;
        self
    }

    pub fn with_include_path(mut self, dir: impl Into<String>) -> Self {
        self.include_paths.push(dir.into());
        self
    }

    pub fn with_define(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.defines.insert(name.into(), value.into());
        self
    }

    pub fn with_workspace_relative(mut self, enabled: bool) -> Self {
        self.use_workspace_relative = enabled;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_settings() {
        let mut settings = IndexingConfig::default();
        settings.enable_threads = true;
        settings.worker_threads = 3;
        settings.auto_rebuild = false;
        settings.defines.insert("SIM".into(), "1".into());

        let config = IndexConfig::from_settings(&settings);
        assert!(config.enable_threads);
        assert_eq!(config.worker_threads, 3);
        assert!(!config.auto_rebuild);
        assert_eq!(config.defines.get("SIM").map(String::as_str), Some("1"));
    }

    #[test]
    fn test_with_threads() {
        assert!(!IndexConfig::default().with_threads(1).enable_threads);
        let config = IndexConfig::default().with_threads(4);
        assert!(config.enable_threads);
        assert_eq!(config.worker_threads, 4);
    }
}
