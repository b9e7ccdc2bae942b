//! Restoring an index from its snapshot on the local file system.

mod common;

use std::fs::{self, OpenOptions};
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use common::{CountingScanner, PKG_SVH, TOP_SV};
use hdlindex::{
    ExplicitRoots, FileSystemProvider, Index, IndexConfig, IndexState, LocalFileSystem, MemoryCache, NameMatch,
    fs::path_to_string,
};
use tempfile::TempDir;

struct Project {
    sources: TempDir,
    cache: TempDir,
    fs: Arc<LocalFileSystem>,
}

impl Project {
    fn new(files: &[(&str, &str)]) -> Self {
        let sources = TempDir::new().unwrap();
        for (name, content) in files {
            let path = sources.path().join(name);
            fs::create_dir_all(path.parent().unwrap()).unwrap();
            fs::write(path, content).unwrap();
        }
        Self {
            sources,
            cache: TempDir::new().unwrap(),
            fs: Arc::new(LocalFileSystem::new(None)),
        }
    }

    fn base(&self) -> String {
        path_to_string(self.sources.path())
    }

    fn path(&self, name: &str) -> String {
        format!("{}/{name}", self.base())
    }

    fn index(&self, scanner: &Arc<CountingScanner>, config: IndexConfig) -> Arc<Index> {
        let provider: Arc<dyn FileSystemProvider> = self.fs.clone();
        Index::builder(self.base(), provider)
            .discovery(Box::new(ExplicitRoots::new(["top.sv"])))
            .cache(Box::new(MemoryCache::with_snapshot(self.cache.path())))
            .preprocessor(scanner.clone())
            .factory(scanner.clone())
            .config(config)
            .build()
    }

    /// Build once with a fresh index and drop it, leaving a snapshot behind.
    fn persist(&self, config: IndexConfig) {
        let scanner = Arc::new(CountingScanner::default());
        let index = self.index(&scanner, config);
        assert_eq!(index.init(), IndexState::AllInvalid);
        assert_eq!(index.ensure_parsed(), IndexState::AllFilesParsed);
        index.dispose();
        assert!(self.cache.path().join("snapshot.json").exists());
    }
}

fn touch_later(path: &Path) {
    let file = OpenOptions::new().write(true).open(path).unwrap();
    file.set_modified(SystemTime::now() + Duration::from_secs(5)).unwrap();
}

#[test]
fn test_valid_snapshot_skips_all_work() {
    let project = Project::new(&[("top.sv", TOP_SV), ("pkg.svh", PKG_SVH)]);
    project.persist(IndexConfig::default());

    let scanner = Arc::new(CountingScanner::default());
    let index = project.index(&scanner, IndexConfig::default());
    assert_eq!(index.init(), IndexState::FileTreeValid);
    assert!(!index.is_dirty());

    assert_eq!(index.ensure_parsed(), IndexState::AllFilesParsed);
    assert_eq!(scanner.counts(), (0, 0));

    let found = index.find_global_scope_decl("f", &NameMatch::Exact);
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].file, project.path("pkg.svh"));
    assert_eq!(index.file_list().len(), 2);
}

#[test]
fn test_touched_file_discards_snapshot() {
    let project = Project::new(&[("top.sv", TOP_SV), ("pkg.svh", PKG_SVH)]);
    project.persist(IndexConfig::default());

    let pkg = project.sources.path().join("pkg.svh");
    fs::write(&pkg, "package pkg;\n  task t(); endtask\nendpackage\n").unwrap();
    touch_later(&pkg);

    let scanner = Arc::new(CountingScanner::default());
    let index = project.index(&scanner, IndexConfig::default());
    assert_eq!(index.init(), IndexState::AllInvalid);

    index.ensure_parsed();
    assert_eq!(scanner.counts(), (2, 2));
    assert!(index.find_global_scope_decl("f", &NameMatch::Exact).is_empty());
    assert_eq!(index.find_global_scope_decl("t", &NameMatch::Exact).len(), 1);
}

#[test]
fn test_other_global_defines_discard_snapshot() {
    let project = Project::new(&[("top.sv", TOP_SV), ("pkg.svh", PKG_SVH)]);
    project.persist(IndexConfig::default());

    let scanner = Arc::new(CountingScanner::default());
    let index = project.index(&scanner, IndexConfig::default().with_define("SIM", "1"));
    assert_eq!(index.init(), IndexState::AllInvalid);
    assert_eq!(index.global_defines(), vec![("SIM".to_string(), "1".to_string())]);

    index.ensure_parsed();
    assert_eq!(scanner.counts(), (2, 2));
}

#[test]
fn test_resolvable_missing_include_discards_snapshot() {
    let project = Project::new(&[("top.sv", "`include \"late.svh\"\nmodule top; endmodule\n")]);
    project.persist(IndexConfig::default());

    fs::write(project.sources.path().join("late.svh"), "class late_cls; endclass\n").unwrap();

    let scanner = Arc::new(CountingScanner::default());
    let index = project.index(&scanner, IndexConfig::default());
    assert_eq!(index.init(), IndexState::AllInvalid);
    assert_eq!(index.find_global_scope_decl("late_cls", &NameMatch::Exact).len(), 1);
}

#[test]
fn test_restored_index_reports_diagnostics() {
    let project = Project::new(&[("top.sv", "`include \"absent.svh\"\nmodule top; endmodule\n")]);
    project.persist(IndexConfig::default());

    let scanner = Arc::new(CountingScanner::default());
    let index = project.index(&scanner, IndexConfig::default());
    assert_eq!(index.init(), IndexState::FileTreeValid);

    let recorded = project.fs.diagnostics(&project.path("top.sv"));
    assert_eq!(recorded.len(), 1);
    assert_eq!(recorded[0].line, 1);
    assert_eq!(recorded[0].message, "Failed to find include file absent.svh");
}
