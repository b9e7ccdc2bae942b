use serde::{Deserialize, Serialize};
use std::fmt;

/// Pipeline progress of an index, strictly ordered.
///
/// Moves forward one stage at a time and only drops back on invalidation.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[repr(u8)]
pub enum IndexState {
    #[default]
    AllInvalid = 0,
    RootFilesDiscovered = 1,
    FilesPreProcessed = 2,
    FileTreeValid = 3,
    AllFilesParsed = 4,
}

impl IndexState {
    pub const ALL: [IndexState; 5] = [
        IndexState::AllInvalid,
        IndexState::RootFilesDiscovered,
        IndexState::FilesPreProcessed,
        IndexState::FileTreeValid,
        IndexState::AllFilesParsed,
    ];

    /// The stage that follows this one.
    pub fn next(self) -> Option<IndexState> {
        Self::ALL.get(self as usize + 1).copied()
    }

    pub(crate) fn from_u8(value: u8) -> IndexState {
        Self::ALL
            .get(value as usize)
            .copied()
            .unwrap_or(IndexState::AllInvalid)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            IndexState::AllInvalid => "all-invalid",
            IndexState::RootFilesDiscovered => "root-files-discovered",
            IndexState::FilesPreProcessed => "files-preprocessed",
            IndexState::FileTreeValid => "file-tree-valid",
            IndexState::AllFilesParsed => "all-files-parsed",
        }
    }
}

impl fmt::Display for IndexState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
