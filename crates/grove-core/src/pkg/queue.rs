//! Level-synchronized resolution queue.
//!
//! Each level holds at most one item per package name. An item goes into the
//! first level that does not yet contain its name, or a new trailing level.

use super::descriptor::PackageDescriptor;
use super::tree::NodeId;
use std::collections::VecDeque;

/// A pending resolution request.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolutionQueueItem {
    pub parent: NodeId,
    pub package_name: String,
    pub descriptor: PackageDescriptor,
}

#[derive(Debug, Default)]
pub struct ResolutionQueue {
    levels: VecDeque<Vec<ResolutionQueueItem>>,
}

impl ResolutionQueue {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_item(&mut self, item: ResolutionQueueItem) {
        let slot = self
            .levels
            .iter_mut()
            .find(|level| !level.iter().any(|i| i.package_name == item.package_name));

        match slot {
            Some(level) => level.push(item),
            None => self.levels.push_back(vec![item]),
        }
    }

    /// Remove and return the next level, or `None` once drained.
    pub fn pull_level(&mut self) -> Option<Vec<ResolutionQueueItem>> {
        self.levels.pop_front()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.levels.is_empty()
    }

    /// Number of queued levels.
    #[must_use]
    pub fn depth(&self) -> usize {
        self.levels.len()
    }
}
