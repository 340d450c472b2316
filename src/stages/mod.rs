//! The individual steps of a backup run.
//!
//! Stages only decide *what* to run and how to treat failures of single
//! items. The actual work is delegated to the [backends](crate::backends).

pub mod archive;
pub mod dump;
pub mod notify;
pub mod sync;

use std::collections::BTreeSet;
use std::fmt;
use std::path::PathBuf;

/// An item of a stage that failed without aborting the stage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItemFailure {
    pub item: String,
    pub cause: String,
}

impl ItemFailure {
    pub fn new(item: impl Into<String>, cause: impl fmt::Display) -> Self {
        Self {
            item: item.into(),
            cause: cause.to_string(),
        }
    }
}

impl fmt::Display for ItemFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.item, self.cause)
    }
}

/// Outcome of a stage processing several independent items.
///
/// Failures keep the order in which the items were processed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StageResult {
    pub produced: BTreeSet<PathBuf>,
    pub failures: Vec<ItemFailure>,
    /// Items were stopped or skipped because the run was cancelled.
    pub interrupted: bool,
}

impl StageResult {
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }
}
