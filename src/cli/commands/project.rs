//! Opening an index from settings and command-line flags.

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::config::Settings;
use crate::fs::{FileSystemProvider, LocalFileSystem, path_to_string};
use crate::indexing::{ArgFileDiscovery, Index, IndexConfig, RootDiscovery, SourceCollection};
use crate::storage::MemoryCache;

/// Where the index comes from and how it runs.
#[derive(Debug, Default, Clone)]
pub struct ProjectArgs {
    pub base: PathBuf,
    pub argfile: Option<PathBuf>,
    pub threads: Option<usize>,
    pub no_threads: bool,
    /// Ignore a persisted snapshot.
    pub fresh: bool,
}

pub struct Project {
    pub fs: Arc<LocalFileSystem>,
    pub index: Arc<Index>,
}

impl Project {
    /// Build the index and restore its snapshot when still valid.
    pub fn open(settings: &Settings, args: &ProjectArgs) -> Result<Self> {
        let fs = Arc::new(
            LocalFileSystem::new(settings.workspace_root.clone())
                .with_ignore_patterns(settings.indexing.ignore_patterns.clone()),
        );

        let (base, discovery): (PathBuf, Box<dyn RootDiscovery>) = match &args.argfile {
            Some(argfile) => (absolute(argfile)?, Box::new(ArgFileDiscovery::new())),
            None => (
                absolute(&args.base)?,
                Box::new(SourceCollection::new(settings.indexing.source_extensions.iter())),
            ),
        };
        let base_location = path_to_string(&base);

        let mut config = IndexConfig::from_settings(&settings.indexing);
        if args.no_threads {
            config.enable_threads = false;
        } else if let Some(threads) = args.threads {
            config = config.with_threads(threads);
        }

        let snapshot_dir = snapshot_dir(settings, &base_location);
        if args.fresh && snapshot_dir.exists() {
            std::fs::remove_dir_all(&snapshot_dir)
                .with_context(|| format!("Cannot clear snapshot {}", snapshot_dir.display()))?;
        }

        let provider: Arc<dyn FileSystemProvider> = fs.clone();
        let index = Index::builder(base_location, provider)
            .cache(Box::new(MemoryCache::with_snapshot(&snapshot_dir)))
            .discovery(discovery)
            .config(config)
            .build();
        let state = index.init();
        tracing::debug!("[cli] opened {} in state {state}", index.base_location());

        Ok(Self { fs, index })
    }

    /// Flush the snapshot and detach from the file system.
    pub fn close(self) {
        self.index.dispose();
    }
}

fn absolute(path: &Path) -> Result<PathBuf> {
    std::path::absolute(path).with_context(|| format!("Invalid path {}", path.display()))
}

/// Snapshot directory for one base location, under the configured cache dir.
pub fn snapshot_dir(settings: &Settings, base_location: &str) -> PathBuf {
    let cache_dir = &settings.indexing.cache_dir;
    let root = if cache_dir.is_absolute() {
        cache_dir.clone()
    } else {
        settings
            .workspace_root
            .clone()
            .or_else(|| std::env::current_dir().ok())
            .unwrap_or_default()
            .join(cache_dir)
    };
    root.join(slug(base_location))
}

fn slug(base_location: &str) -> String {
    let slug: String = base_location
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '.' || c == '-' { c } else { '_' })
        .collect();
    slug.trim_matches('_').to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_slug() {
        assert_eq!(slug("/work/chip/rtl"), "work_chip_rtl");
        assert_eq!(slug("C:/proj/files.f"), "C__proj_files.f");
    }

    #[test]
    fn test_snapshot_dir_under_workspace_root() {
        let settings = Settings {
            workspace_root: Some(PathBuf::from("/ws")),
            ..Settings::default()
        };
        assert_eq!(
            snapshot_dir(&settings, "/ws/rtl"),
            PathBuf::from("/ws/.hdlindex/cache/ws_rtl")
        );
    }

    #[test]
    fn test_open_indexes_directory_and_persists_snapshot() {
        let dir = TempDir::new().unwrap();
        let rtl = dir.path().join("rtl");
        std::fs::create_dir_all(&rtl).unwrap();
        std::fs::write(rtl.join("defs.svh"), "`define WIDTH 8\n").unwrap();
        std::fs::write(rtl.join("top.sv"), "`include \"defs.svh\"\nmodule top; endmodule\n").unwrap();

        let mut settings = Settings {
            workspace_root: Some(dir.path().to_path_buf()),
            ..Settings::default()
        };
        settings.indexing.enable_threads = false;
        let args = ProjectArgs {
            base: rtl.clone(),
            ..ProjectArgs::default()
        };

        let project = Project::open(&settings, &args).unwrap();
        project.index.ensure_parsed();
        assert_eq!(project.index.file_list().len(), 2);
        let base_location = project.index.base_location().to_string();
        project.close();

        assert!(snapshot_dir(&settings, &base_location).join("snapshot.json").exists());
    }
}
