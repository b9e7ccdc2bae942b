//! Structural symbol trees produced by the preprocessor and file factory.
//!
//! A tree is a plain owned value: indexes copy it into file tree nodes and the
//! cache without sharing. Items nest the way the source nests, with
//! `PreProcCond` items wrapping the active region of a conditional block.

use serde::{Deserialize, Serialize};

use crate::types::{ItemKind, Location};

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SymbolTree {
    pub path: String,
    pub items: Vec<SymbolItem>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SymbolItem {
    pub kind: ItemKind,
    pub name: String,
    pub location: Location,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_location: Option<Location>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<SymbolItem>,
    /// Kind-specific payload: a macro body, or the superclass of a class.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

impl SymbolItem {
    pub fn new(kind: ItemKind, name: impl Into<String>, location: Location) -> Self {
        Self {
            kind,
            name: name.into(),
            location,
            end_location: None,
            children: Vec::new(),
            detail: None,
        }
    }

    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }

    pub fn with_children(mut self, children: Vec<SymbolItem>) -> Self {
        self.children = children;
        self
    }
}

impl SymbolTree {
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            items: Vec::new(),
        }
    }

    /// Depth-first, pre-order visit of every item.
    pub fn walk<'a>(&'a self, mut visit: impl FnMut(&'a SymbolItem)) {
        fn go<'a>(items: &'a [SymbolItem], visit: &mut impl FnMut(&'a SymbolItem)) {
            for item in items {
                visit(item);
                go(&item.children, visit);
            }
        }
        go(&self.items, &mut visit);
    }

    /// Every item of the given kind, in source order.
    pub fn collect_kind(&self, kind: ItemKind) -> Vec<&SymbolItem> {
        let mut out = Vec::new();
        self.walk(|item| {
            if item.kind == kind {
                out.push(item);
            }
        });
        out
    }

    /// Include directives, in source order.
    pub fn includes(&self) -> Vec<&SymbolItem> {
        self.collect_kind(ItemKind::Include)
    }

    /// Macro definitions as `(name, body)` pairs, in source order.
    pub fn macro_defs(&self) -> Vec<(String, String)> {
        self.collect_kind(ItemKind::MacroDef)
            .into_iter()
            .map(|item| (item.name.clone(), item.detail.clone().unwrap_or_default()))
            .collect()
    }

    pub fn item_count(&self) -> usize {
        let mut count = 0;
        self.walk(|_| count += 1);
        count
    }
}
