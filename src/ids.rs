//! Correlation identifiers
//!
//! Other subsystems never see native handles; they see a [`CorrelationId`]
//! handed out by an [`IdAllocator`] when a window is admitted.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// Internal identifier that stands in for a native handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CorrelationId(pub u64);

impl fmt::Display for CorrelationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "cid:{}", self.0)
    }
}

/// Issues identifiers that are unique among live allocations of a category.
pub trait IdAllocator: Send {
    fn allocate(&mut self, category: &str) -> CorrelationId;
}

/// Monotonic allocator. Identifiers are never reused, so uniqueness among
/// live allocations holds trivially.
#[derive(Debug, Default)]
pub struct SequentialIdAllocator {
    next: HashMap<String, u64>,
}

impl SequentialIdAllocator {
    pub fn new() -> Self {
        Self::default()
    }
}

impl IdAllocator for SequentialIdAllocator {
    fn allocate(&mut self, category: &str) -> CorrelationId {
        let next = self.next.entry(category.to_string()).or_insert(1);
        let id = *next;
        *next += 1;
        CorrelationId(id)
    }
}
