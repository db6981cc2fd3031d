use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use super::BlockId;

/// Which part of a program the registrant attends.
///
/// An empty block selection is treated exactly like [`Attendance::Full`].
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Attendance {
    #[default]
    Full,
    Blocks(BTreeSet<BlockId>),
}

impl Attendance {
    /// Builds an attendance from a block list, collapsing an empty list to Full.
    pub fn from_blocks<I>(blocks: I) -> Self
    where
        I: IntoIterator<Item = BlockId>,
    {
        let set: BTreeSet<BlockId> = blocks.into_iter().collect();
        if set.is_empty() {
            Self::Full
        } else {
            Self::Blocks(set)
        }
    }

    pub fn is_full(&self) -> bool {
        match self {
            Self::Full => true,
            Self::Blocks(set) => set.is_empty(),
        }
    }

    /// Selected blocks in ascending order; empty for full attendance.
    pub fn blocks(&self) -> Vec<BlockId> {
        match self {
            Self::Full => Vec::new(),
            Self::Blocks(set) => set.iter().copied().collect(),
        }
    }

    pub fn block_count(&self) -> usize {
        match self {
            Self::Full => 0,
            Self::Blocks(set) => set.len(),
        }
    }

    /// `"Full"` or the block names joined with `", "`.
    pub fn attendance_type(&self) -> String {
        if self.is_full() {
            return "Full".to_string();
        }
        self.blocks()
            .iter()
            .map(BlockId::to_string)
            .collect::<Vec<_>>()
            .join(", ")
    }
}
