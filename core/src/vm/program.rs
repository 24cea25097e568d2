use std::{collections::BTreeSet, ops::Deref, sync::Arc};

use serde::{Deserialize, Serialize};

/// Decoded instruction stream; immutable and cheap to share.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Program(Arc<[i32]>);

impl Program {
    pub fn new(slots: impl Into<Arc<[i32]>>) -> Self {
        Program(slots.into())
    }

    #[inline]
    pub fn slots(&self) -> &[i32] {
        &self.0
    }

    pub fn stats(&self) -> ProgramStats {
        ProgramStats::of(&self.0)
    }
}

impl Deref for Program {
    type Target = [i32];

    #[inline]
    fn deref(&self) -> &[i32] {
        &self.0
    }
}

impl From<Vec<i32>> for Program {
    fn from(value: Vec<i32>) -> Self {
        Program(value.into())
    }
}

/// Summary written next to a bytecode dump.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ProgramStats {
    pub length: usize,
    pub unique: usize,
    pub min: Option<i32>,
    pub max: Option<i32>,
}

impl ProgramStats {
    pub fn of(slots: &[i32]) -> Self {
        let unique = slots.iter().copied().collect::<BTreeSet<_>>();
        Self {
            length: slots.len(),
            unique: unique.len(),
            min: unique.first().copied(),
            max: unique.last().copied(),
        }
    }
}
