use serde::{Deserialize, Serialize};
use std::fmt;

/// Modification time reported by a file system provider (milliseconds).
pub type Timestamp = u64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Location {
    pub line: u32,
    pub column: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ItemKind {
    File,
    Include,
    MacroDef,
    PreProcCond,
    PackageDecl,
    ModuleDecl,
    InterfaceDecl,
    ProgramDecl,
    ClassDecl,
    Function,
    Task,
    TypedefStmt,
    Covergroup,
    Import,
    Extends,
}

/// Severity of a diagnostic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MarkerKind {
    Info,
    Warning,
    Error,
}

/// What raised a diagnostic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MarkerCategory {
    Generic,
    MissingInclude,
    UndefinedMacro,
    ParseError,
    External,
}

/// A located, categorized diagnostic attached to one file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Marker {
    pub kind: MarkerKind,
    pub category: MarkerCategory,
    pub message: String,
    pub location: Option<Location>,
}

impl Location {
    pub fn new(line: u32, column: u32) -> Self {
        Self { line, column }
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.line, self.column)
    }
}

impl ItemKind {
    /// Check membership in a set of kinds.
    pub fn is_elem_of(&self, kinds: &[ItemKind]) -> bool {
        kinds.contains(self)
    }

    /// Kinds that open a named scope in the symbol tree.
    pub fn is_scope(&self) -> bool {
        matches!(
            self,
            ItemKind::File
                | ItemKind::PreProcCond
                | ItemKind::PackageDecl
                | ItemKind::ModuleDecl
                | ItemKind::InterfaceDecl
                | ItemKind::ProgramDecl
                | ItemKind::ClassDecl
                | ItemKind::Function
                | ItemKind::Task
                | ItemKind::Covergroup
        )
    }
}

impl fmt::Display for ItemKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

impl Marker {
    pub fn new(kind: MarkerKind, category: MarkerCategory, message: impl Into<String>) -> Self {
        Self {
            kind,
            category,
            message: message.into(),
            location: None,
        }
    }

    pub fn error(category: MarkerCategory, message: impl Into<String>) -> Self {
        Self::new(MarkerKind::Error, category, message)
    }

    pub fn warning(category: MarkerCategory, message: impl Into<String>) -> Self {
        Self::new(MarkerKind::Warning, category, message)
    }

    pub fn with_location(mut self, location: Location) -> Self {
        self.location = Some(location);
        self
    }

    /// Line used when forwarding to a diagnostic sink (0 when unknown).
    pub fn line(&self) -> u32 {
        self.location.map(|l| l.line).unwrap_or(0)
    }

    /// Diagnostics regenerated every time the file is parsed.
    pub fn is_parse_phase(&self) -> bool {
        matches!(
            self.category,
            MarkerCategory::UndefinedMacro | MarkerCategory::ParseError
        )
    }

    /// Diagnostics regenerated every time the file tree is built.
    pub fn is_resolution_phase(&self) -> bool {
        self.category == MarkerCategory::MissingInclude
    }
}
