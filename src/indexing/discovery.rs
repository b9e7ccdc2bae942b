//! Root file discovery.
//!
//! A discovery strategy turns an index's base location into the list of
//! root files plus the include paths and defines that come with them.

use indexmap::IndexMap;
use std::collections::HashSet;

use crate::error::{IndexError, IndexResult};
use crate::fs::FileSystemProvider;
use crate::indexing::paths;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Discovery {
    pub root_files: Vec<String>,
    pub include_paths: Vec<String>,
    pub defines: IndexMap<String, String>,
}

pub trait RootDiscovery: Send + Sync {
    /// Find the root files for `base`, the resolved base location.
    fn discover(&self, base: &str, fs: &dyn FileSystemProvider) -> IndexResult<Discovery>;

    /// Whether a newly added file could change the discovered roots.
    fn tracks(&self, _base: &str, _path: &str) -> bool {
        false
    }

    /// A file whose modification changes the discovery result itself.
    fn source_file(&self, _base: &str) -> Option<String> {
        None
    }
}

/// Every file under the base directory with a source extension is a root.
#[derive(Debug, Clone)]
pub struct SourceCollection {
    extensions: Vec<String>,
}

impl SourceCollection {
    pub fn new<I, S>(extensions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            extensions: extensions
                .into_iter()
                .map(|e| e.into().trim_start_matches('.').to_ascii_lowercase())
                .collect(),
        }
    }

    fn has_source_extension(&self, path: &str) -> bool {
        let name = paths::file_name(path);
        match name.rsplit_once('.') {
            Some((_, ext)) => self.extensions.iter().any(|e| e.eq_ignore_ascii_case(ext)),
            None => false,
        }
    }
}

impl Default for SourceCollection {
    fn default() -> Self {
        Self::new(["sv", "svh", "v", "vh"])
    }
}

impl RootDiscovery for SourceCollection {
    fn discover(&self, base: &str, fs: &dyn FileSystemProvider) -> IndexResult<Discovery> {
        if !fs.is_dir(base) {
            return Err(IndexError::Discovery {
                base: base.to_string(),
                reason: "not a directory".to_string(),
            });
        }
        let mut root_files: Vec<String> = fs
            .list_files(base)
            .into_iter()
            .filter(|p| self.has_source_extension(p))
            .map(|p| paths::normalize(&p))
            .collect();
        root_files.sort();
        root_files.dedup();

        Ok(Discovery {
            root_files,
            include_paths: vec![paths::normalize(base)],
            defines: IndexMap::new(),
        })
    }

    fn tracks(&self, base: &str, path: &str) -> bool {
        let base = paths::normalize(base);
        let path = paths::normalize(path);
        path.strip_prefix(&base)
            .is_some_and(|rest| rest.starts_with('/'))
            && self.has_source_extension(&path)
    }
}

/// Reads roots, include directories and defines from an argument file.
///
/// Understands `+incdir+a+b`, `-I<dir>`, `-incdir <dir>`, `+define+N=V`,
/// `-DN=V`, nested `-f <file>`/`-F <file>`, and `//` or `#` comments.
/// Relative paths resolve against the directory of the file naming them.
#[derive(Debug, Clone, Copy, Default)]
pub struct ArgFileDiscovery;

impl ArgFileDiscovery {
    pub fn new() -> Self {
        Self
    }

    fn read(
        &self,
        path: &str,
        fs: &dyn FileSystemProvider,
        visited: &mut HashSet<String>,
        out: &mut Discovery,
    ) -> IndexResult<()> {
        if !visited.insert(path.to_string()) {
            tracing::warn!("[discovery] argument file '{path}' includes itself; skipping");
            return Ok(());
        }
        let bytes = fs.open_stream(path).ok_or_else(|| IndexError::ArgFileNotFound {
            path: path.to_string(),
        })?;
        let text = String::from_utf8_lossy(&bytes);
        let dir = paths::parent_dir(path).unwrap_or_default();

        let tokens = tokenize(&text);
        let mut iter = tokens.into_iter();
        while let Some(token) = iter.next() {
            let resolve = |p: &str| paths::join(&dir, &paths::expand_env(p));

            if let Some(rest) = token.strip_prefix("+incdir+") {
                out.include_paths
                    .extend(rest.split('+').filter(|d| !d.is_empty()).map(resolve));
            } else if let Some(rest) = token.strip_prefix("+define+") {
                for def in rest.split('+').filter(|d| !d.is_empty()) {
                    insert_define(&mut out.defines, def);
                }
            } else if token == "-incdir" || token == "-I" {
                match iter.next() {
                    Some(d) => out.include_paths.push(resolve(d.as_str())),
                    None => tracing::warn!("[discovery] '{token}' without a directory in {path}"),
                }
            } else if let Some(d) = token.strip_prefix("-I") {
                out.include_paths.push(resolve(d));
            } else if let Some(def) = token.strip_prefix("-D") {
                insert_define(&mut out.defines, def);
            } else if token == "-f" || token == "-F" {
                match iter.next() {
                    Some(nested) => {
                        let nested = resolve(nested.as_str());
                        if let Err(e) = self.read(&nested, fs, visited, out) {
                            tracing::warn!("[discovery] {e}");
                        }
                    }
                    None => tracing::warn!("[discovery] '{token}' without a file in {path}"),
                }
            } else if token.starts_with('-') || token.starts_with('+') {
                tracing::debug!("[discovery] ignoring option '{token}' in {path}");
            } else {
                let file = resolve(token.as_str());
                if !out.root_files.contains(&file) {
                    out.root_files.push(file);
                }
            }
        }
        Ok(())
    }
}

impl RootDiscovery for ArgFileDiscovery {
    fn discover(&self, base: &str, fs: &dyn FileSystemProvider) -> IndexResult<Discovery> {
        let mut out = Discovery::default();
        let mut visited = HashSet::new();
        self.read(&paths::normalize(base), fs, &mut visited, &mut out)?;
        out.include_paths.dedup();
        Ok(out)
    }

    fn source_file(&self, base: &str) -> Option<String> {
        Some(paths::normalize(base))
    }
}

/// A fixed set of roots.
#[derive(Debug, Clone, Default)]
pub struct ExplicitRoots {
    discovery: Discovery,
}

impl ExplicitRoots {
    pub fn new<I, S>(files: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            discovery: Discovery {
                root_files: files.into_iter().map(Into::into).collect(),
                ..Discovery::default()
            },
        }
    }

    pub fn with_include_path(mut self, dir: impl Into<String>) -> Self {
        self.discovery.include_paths.push(dir.into());
        self
    }

    pub fn with_define(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.discovery.defines.insert(name.into(), value.into());
        self
    }
}

impl RootDiscovery for ExplicitRoots {
    fn discover(&self, base: &str, _fs: &dyn FileSystemProvider) -> IndexResult<Discovery> {
        let dir = base.to_string();
        let resolve = |p: &String| paths::join(&dir, p);
        Ok(Discovery {
            root_files: self.discovery.root_files.iter().map(resolve).collect(),
            include_paths: self.discovery.include_paths.iter().map(resolve).collect(),
            defines: self.discovery.defines.clone(),
        })
    }
}

fn insert_define(defines: &mut IndexMap<String, String>, def: &str) {
    match def.split_once('=') {
        Some((name, value)) => defines.insert(name.to_string(), value.to_string()),
        None => defines.insert(def.to_string(), String::new()),
    };
}

/// Split argument file text into tokens, dropping comments and quotes.
fn tokenize(text: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    for line in text.lines() {
        let line = line.trim();
        if line.starts_with('#') {
            continue;
        }
        let line = match line.find("//") {
            Some(idx) => &line[..idx],
            None => line,
        };

        let mut current = String::new();
        let mut quoted = false;
        for c in line.chars() {
            match c {
                '"' => quoted = !quoted,
                c if c.is_whitespace() && !quoted => {
                    if !current.is_empty() {
                        tokens.push(std::mem::take(&mut current));
                    }
                }
                c => current.push(c),
            }
        }
        if !current.is_empty() {
            tokens.push(current);
        }
    }
    tokens
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fs::MemoryFileSystem;

    #[test]
    fn test_tokenize_comments_and_quotes() {
        let text = "# header\n top.sv // trailing\n\"dir with space/a.sv\"  -f  more.f\n";
        assert_eq!(
            tokenize(text),
            vec!["top.sv", "dir with space/a.sv", "-f", "more.f"]
        );
    }

    #[test]
    fn test_arg_file_options() {
        let fs = MemoryFileSystem::new();
        fs.write_file(
            "/proj/sim/files.f",
            "+incdir+../inc+../common\n\
             -I../vip\n\
             -incdir /abs/inc\n\
             +define+SIM+WIDTH=8\n\
             -DDEBUG=1\n\
             -timescale=1ns/1ps\n\
             ../rtl/top.sv\n\
             -f nested.f\n",
        );
        fs.write_file("/proj/sim/nested.f", "../rtl/core.sv\n-f files.f\n");

        let found = ArgFileDiscovery::new()
            .discover("/proj/sim/files.f", &fs)
            .unwrap();
        assert_eq!(found.root_files, vec!["/proj/rtl/top.sv", "/proj/rtl/core.sv"]);
        assert_eq!(
            found.include_paths,
            vec!["/proj/inc", "/proj/common", "/proj/vip", "/abs/inc"]
        );
        assert_eq!(found.defines.get("SIM").map(String::as_str), Some(""));
        assert_eq!(found.defines.get("WIDTH").map(String::as_str), Some("8"));
        assert_eq!(found.defines.get("DEBUG").map(String::as_str), Some("1"));
    }

    #[test]
    fn test_missing_arg_file() {
        let fs = MemoryFileSystem::new();
        let err = ArgFileDiscovery::new().discover("/proj/none.f", &fs).unwrap_err();
        assert!(matches!(err, IndexError::ArgFileNotFound { .. }));
    }

    #[test]
    fn test_source_collection() {
        let fs = MemoryFileSystem::new();
        fs.write_file("/proj/rtl/top.sv", "module top; endmodule");
        fs.write_file("/proj/rtl/pkg.svh", "");
        fs.write_file("/proj/doc/readme.md", "");

        let collection = SourceCollection::new(["sv", ".SVH"]);
        let found = collection.discover("/proj", &fs).unwrap();
        assert_eq!(found.root_files, vec!["/proj/rtl/pkg.svh", "/proj/rtl/top.sv"]);
        assert_eq!(found.include_paths, vec!["/proj"]);

        assert!(collection.tracks("/proj", "/proj/rtl/new.sv"));
        assert!(!collection.tracks("/proj", "/proj/rtl/new.txt"));
        assert!(!collection.tracks("/proj", "/project2/new.sv"));
        assert!(collection.discover("/proj/rtl/top.sv", &fs).is_err());
    }

    #[test]
    fn test_explicit_roots_resolve_against_base() {
        let fs = MemoryFileSystem::new();
        let found = ExplicitRoots::new(["top.sv", "/abs/other.sv"])
            .with_include_path("inc")
            .with_define("SIM", "1")
            .discover("/proj", &fs)
            .unwrap();
        assert_eq!(found.root_files, vec!["/proj/top.sv", "/abs/other.sv"]);
        assert_eq!(found.include_paths, vec!["/proj/inc"]);
        assert_eq!(found.defines.len(), 1);
    }
}
