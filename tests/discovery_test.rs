//! Root discovery from argument files and source directories on disk.

use std::fs;
use std::sync::Arc;

use hdlindex::fs::path_to_string;
use hdlindex::{
    ArgFileDiscovery, FileChangeEvent, FileChangeKind, FileSystemProvider, Index, IndexState, LocalFileSystem,
    NameMatch, SourceCollection,
};
use tempfile::TempDir;

fn write(dir: &TempDir, name: &str, content: &str) {
    let path = dir.path().join(name);
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, content).unwrap();
}

fn decl_files(index: &Index, name: &str) -> Vec<String> {
    index
        .find_global_scope_decl(name, &NameMatch::Exact)
        .into_iter()
        .map(|d| d.file)
        .collect()
}

fn arg_file_project() -> TempDir {
    let dir = TempDir::new().unwrap();
    write(
        &dir,
        "files.f",
        "// project sources\n+incdir+inc\n+define+WIDE=1\n-f nested.f\ntop.sv\n",
    );
    write(&dir, "nested.f", "# leaf cells\nsub/leaf.sv\n");
    write(&dir, "inc/defs.svh", "`define HAS_DEFS\n");
    write(
        &dir,
        "top.sv",
        "`include \"defs.svh\"\n`ifdef WIDE\nmodule wide_top; endmodule\n`else\nmodule narrow_top; endmodule\n`endif\n",
    );
    write(&dir, "sub/leaf.sv", "module leaf; endmodule\n");
    dir
}

#[test]
fn test_arg_file_supplies_roots_include_dirs_and_defines() {
    let dir = arg_file_project();
    let base = path_to_string(dir.path());
    let fs = Arc::new(LocalFileSystem::new(None));
    let provider: Arc<dyn FileSystemProvider> = fs.clone();
    let index = Index::builder(format!("{base}/files.f"), provider)
        .discovery(Box::new(ArgFileDiscovery::new()))
        .build();

    assert_eq!(
        index.root_files(),
        vec![format!("{base}/sub/leaf.sv"), format!("{base}/top.sv")]
    );
    assert_eq!(index.resolved_base_location_dir(), base);
    assert!(index.file_list().contains(&format!("{base}/inc/defs.svh")));
    assert!(index.missing_includes().is_empty());

    assert_eq!(decl_files(&index, "wide_top"), vec![format!("{base}/top.sv")]);
    assert!(decl_files(&index, "narrow_top").is_empty());
    assert_eq!(decl_files(&index, "leaf"), vec![format!("{base}/sub/leaf.sv")]);
}

#[test]
fn test_arg_file_edit_rediscovers_roots() {
    let dir = arg_file_project();
    let base = path_to_string(dir.path());
    let fs = Arc::new(LocalFileSystem::new(None));
    let provider: Arc<dyn FileSystemProvider> = fs.clone();
    let index = Index::builder(format!("{base}/files.f"), provider)
        .discovery(Box::new(ArgFileDiscovery::new()))
        .build();
    assert_eq!(decl_files(&index, "leaf"), vec![format!("{base}/sub/leaf.sv")]);

    write(&dir, "files.f", "+incdir+inc\ntop.sv\n");
    fs.notify(&FileChangeEvent::new(FileChangeKind::Modified, format!("{base}/files.f")));
    assert!(index.is_dirty());

    assert!(decl_files(&index, "leaf").is_empty());
    assert_eq!(decl_files(&index, "narrow_top"), vec![format!("{base}/top.sv")]);
    assert_eq!(index.root_files(), vec![format!("{base}/top.sv")]);
}

#[test]
fn test_missing_arg_file_leaves_index_undiscovered() {
    let dir = TempDir::new().unwrap();
    let base = path_to_string(dir.path());
    let provider: Arc<dyn FileSystemProvider> = Arc::new(LocalFileSystem::new(None));
    let index = Index::builder(format!("{base}/absent.f"), provider)
        .discovery(Box::new(ArgFileDiscovery::new()))
        .build();

    assert_eq!(index.ensure_parsed(), IndexState::AllInvalid);
    assert!(index.root_files().is_empty());
}

#[test]
fn test_source_collection_picks_up_new_files() {
    let dir = TempDir::new().unwrap();
    write(&dir, "rtl/a.sv", "module a; endmodule\n");
    write(&dir, "rtl/notes.txt", "module not_a_source; endmodule\n");
    let base = path_to_string(dir.path());

    let fs = Arc::new(LocalFileSystem::new(None));
    let provider: Arc<dyn FileSystemProvider> = fs.clone();
    let index = Index::builder(base.clone(), provider)
        .discovery(Box::new(SourceCollection::new(["sv", "svh"])))
        .build();
    assert_eq!(index.file_list(), vec![format!("{base}/rtl/a.sv")]);
    assert!(decl_files(&index, "not_a_source").is_empty());

    write(&dir, "rtl/deep/b.sv", "module b; endmodule\n");
    fs.notify(&FileChangeEvent::new(FileChangeKind::Added, format!("{base}/rtl/deep/b.sv")));
    assert!(index.is_dirty());
    assert_eq!(decl_files(&index, "b"), vec![format!("{base}/rtl/deep/b.sv")]);
}
