//! Level-synchronized dependency tree construction.
//!
//! Each level is processed in three steps:
//! 1. items already satisfied by a node in their parent's ancestry are dropped
//! 2. metadata for the remaining items is fetched concurrently
//! 3. the results are committed one by one, in queue order
//!
//! Step 3 only starts once every lookup of the level has completed, so the
//! tree shape does not depend on which response arrives first.
//!
//! Placement: a node with a semver range goes to the root unless the root
//! already has a child of that name, in which case it nests under the parent
//! that asked for it. Nodes without a range always nest under their parent.

use super::descriptor::{convert_dependencies_map, PackageDescriptor};
use super::error::PkgError;
use super::queue::{ResolutionQueue, ResolutionQueueItem};
use super::resolver::Resolvers;
use super::tree::{DepTree, DepTreeNode, NodeId};
use super::version::satisfies;
use futures::future::try_join_all;
use std::collections::BTreeMap;
use tracing::{debug, info, trace};

pub struct DepTreeBuilder<'r> {
    resolvers: &'r Resolvers,
    tree: DepTree,
    queue: ResolutionQueue,
}

impl<'r> DepTreeBuilder<'r> {
    #[must_use]
    pub fn new(resolvers: &'r Resolvers) -> Self {
        Self {
            resolvers,
            tree: DepTree::new(),
            queue: ResolutionQueue::new(),
        }
    }

    /// Queue root-level dependencies. Items are seeded in name order.
    pub fn resolve_dependencies(&mut self, dependencies: &BTreeMap<String, PackageDescriptor>) {
        for (name, descriptor) in dependencies {
            self.queue.add_item(ResolutionQueueItem {
                parent: NodeId::ROOT,
                package_name: name.clone(),
                descriptor: descriptor.clone(),
            });
        }
    }

    /// Drain the queue and return the finished tree.
    ///
    /// # Errors
    ///
    /// Returns the first resolver or parse failure; the partial tree is dropped.
    pub async fn build(mut self) -> Result<DepTree, PkgError> {
        let mut level_no = 0usize;

        while let Some(level) = self.queue.pull_level() {
            level_no += 1;
            let total = level.len();
            let pending: Vec<ResolutionQueueItem> = level
                .into_iter()
                .filter(|item| !self.is_satisfied(item))
                .collect();

            debug!(
                level = level_no,
                items = total,
                to_resolve = pending.len(),
                "Resolving level"
            );

            let resolvers = self.resolvers;
            let lookups = pending.iter().map(|item| async move {
                let resolver = resolvers.get(&item.descriptor.resolver_name).map_err(|_| {
                    PkgError::resolver_unknown(&item.descriptor.resolver_name, &item.package_name)
                })?;
                resolver
                    .get_metadata(&item.package_name, &item.descriptor)
                    .await
            });
            let results = try_join_all(lookups).await?;

            let mut created = Vec::new();
            for (item, meta) in pending.into_iter().zip(results) {
                if let Some(existing) = self.find_exact(item.parent, &item.package_name, &meta.version)
                {
                    trace!(
                        package = %item.package_name,
                        version = %meta.version,
                        node = existing.index(),
                        "Reusing identical resolved node"
                    );
                    continue;
                }

                let dependencies = convert_dependencies_map(resolvers, &meta.dependencies)?;
                let target = self.placement(&item);
                let node = DepTreeNode::package(
                    item.package_name,
                    meta.version,
                    item.descriptor.resolver_name,
                )
                .with_dependencies(dependencies)
                .with_options(meta.options);

                created.push(self.tree.add_child(target, node)?);
            }

            for id in created {
                for (name, descriptor) in &self.tree.node(id).dependencies {
                    self.queue.add_item(ResolutionQueueItem {
                        parent: id,
                        package_name: name.clone(),
                        descriptor: descriptor.clone(),
                    });
                }
            }
        }

        info!(
            packages = self.tree.len() - 1,
            levels = level_no,
            "Resolved dependency tree"
        );
        debug!(tree = %self.tree.render(), "Dependency tree");

        Ok(self.tree)
    }

    /// A node in the parent's ancestry already satisfies the item's range.
    fn is_satisfied(&self, item: &ResolutionQueueItem) -> bool {
        let Some(range) = item.descriptor.sem_version.as_deref() else {
            return false;
        };

        self.tree.ancestry(item.parent).any(|ancestor| {
            self.tree
                .child_by_name(ancestor, &item.package_name)
                .and_then(|c| self.tree.node(c).package_version.as_deref())
                .is_some_and(|v| satisfies(v, range))
        })
    }

    fn find_exact(&self, parent: NodeId, name: &str, version: &str) -> Option<NodeId> {
        self.tree.ancestry(parent).find_map(|ancestor| {
            self.tree
                .child_by_name(ancestor, name)
                .filter(|c| self.tree.node(*c).package_version.as_deref() == Some(version))
        })
    }

    fn placement(&self, item: &ResolutionQueueItem) -> NodeId {
        let has_range = item.descriptor.sem_version.is_some();
        let at_root = self
            .tree
            .child_by_name(NodeId::ROOT, &item.package_name)
            .is_some();

        if has_range && !at_root {
            NodeId::ROOT
        } else {
            item.parent
        }
    }
}
