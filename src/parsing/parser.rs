//! Collaborator interfaces that turn file contents into symbol trees.
//!
//! Both passes are pure: everything they report goes into the `markers`
//! vector handed in by the caller, and malformed input produces markers
//! rather than a failure. `None` is reserved for content the implementation
//! cannot treat as source at all.

use crate::parsing::MacroContext;
use crate::symbol::SymbolTree;
use crate::types::Marker;

/// Structural pass run before dependency resolution.
///
/// The returned tree must list every include directive and macro
/// definition, in all conditional branches, since macro state is not yet
/// known. It should report `Generic` markers only.
pub trait PreProcessor: Send + Sync {
    fn preprocess(&self, content: &[u8], path: &str, markers: &mut Vec<Marker>) -> Option<SymbolTree>;
}

/// Full pass producing the declarations of one file.
///
/// `macros` holds every definition visible to the file; conditional blocks
/// are evaluated against it.
pub trait FileFactory: Send + Sync {
    fn parse(
        &self,
        content: &[u8],
        path: &str,
        macros: &MacroContext,
        markers: &mut Vec<Marker>,
    ) -> Option<SymbolTree>;
}
