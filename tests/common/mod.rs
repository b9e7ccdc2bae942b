//! Fixtures shared by the integration tests.
#![allow(dead_code)]

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use hdlindex::indexing::{Discovery, RootDiscovery};
use hdlindex::{
    ExplicitRoots, FileFactory, FileSystemProvider, Index, IndexConfig, IndexResult, MacroContext, Marker,
    MemoryFileSystem, NameMatch, PreProcessor, StructuralScanner, SymbolTree,
};

pub const TOP_SV: &str = "`include \"pkg.svh\"\nmodule top;\n  import pkg::*;\nendmodule\n";
pub const PKG_SVH: &str =
    "package pkg;\n  function automatic int f(input int a);\n    return a;\n  endfunction\nendpackage\n";

/// Structural scanner that counts each pass it runs.
#[derive(Default)]
pub struct CountingScanner {
    pub preprocessed: AtomicUsize,
    pub parsed: AtomicUsize,
}

impl CountingScanner {
    pub fn counts(&self) -> (usize, usize) {
        (
            self.preprocessed.load(Ordering::SeqCst),
            self.parsed.load(Ordering::SeqCst),
        )
    }
}

impl PreProcessor for CountingScanner {
    fn preprocess(&self, content: &[u8], path: &str, markers: &mut Vec<Marker>) -> Option<SymbolTree> {
        self.preprocessed.fetch_add(1, Ordering::SeqCst);
        StructuralScanner.preprocess(content, path, markers)
    }
}

impl FileFactory for CountingScanner {
    fn parse(
        &self,
        content: &[u8],
        path: &str,
        macros: &MacroContext,
        markers: &mut Vec<Marker>,
    ) -> Option<SymbolTree> {
        self.parsed.fetch_add(1, Ordering::SeqCst);
        StructuralScanner.parse(content, path, macros, markers)
    }
}

/// Explicit roots, counting how often discovery runs.
pub struct CountingDiscovery {
    inner: ExplicitRoots,
    pub runs: Arc<AtomicUsize>,
}

impl CountingDiscovery {
    pub fn new(roots: &[&str]) -> Self {
        Self {
            inner: ExplicitRoots::new(roots.iter().copied()),
            runs: Arc::new(AtomicUsize::new(0)),
        }
    }
}

impl RootDiscovery for CountingDiscovery {
    fn discover(&self, base: &str, fs: &dyn FileSystemProvider) -> IndexResult<Discovery> {
        self.runs.fetch_add(1, Ordering::SeqCst);
        self.inner.discover(base, fs)
    }
}

pub fn memory_fs(files: &[(&str, &str)]) -> Arc<MemoryFileSystem> {
    let fs = Arc::new(MemoryFileSystem::new());
    for (path, content) in files {
        fs.write_file(path, *content);
    }
    fs
}

/// Index rooted at `/proj` using the built-in scanner.
pub fn index_over(fs: &Arc<MemoryFileSystem>, roots: &[&str], config: IndexConfig) -> Arc<Index> {
    let provider: Arc<dyn FileSystemProvider> = fs.clone();
    Index::builder("/proj", provider)
        .discovery(Box::new(ExplicitRoots::new(roots.iter().copied())))
        .config(config)
        .build()
}

/// Index rooted at `/proj` whose stage work is counted.
pub fn counted_index(
    fs: &Arc<MemoryFileSystem>,
    discovery: CountingDiscovery,
    scanner: &Arc<CountingScanner>,
) -> Arc<Index> {
    let provider: Arc<dyn FileSystemProvider> = fs.clone();
    Index::builder("/proj", provider)
        .discovery(Box::new(discovery))
        .preprocessor(scanner.clone())
        .factory(scanner.clone())
        .build()
}

/// Files declaring `name` at global or package scope.
pub fn decl_files(index: &Index, name: &str) -> Vec<String> {
    let mut files: Vec<String> = index
        .find_global_scope_decl(name, &NameMatch::Exact)
        .into_iter()
        .map(|d| d.file)
        .collect();
    files.sort();
    files
}
