//! Dependency resolution task.

use super::{TaskAction, TaskContext, TaskError};
use crate::pkg::builder::DepTreeBuilder;
use crate::pkg::descriptor::convert_dependencies_map;
use crate::pkg::lockfile::{LockStore, DEFAULT_PROFILE};
use crate::pkg::tree::DepTree;
use futures::future::BoxFuture;
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, info};

/// Resolves the declared dependencies into a tree, or loads it from the lock
/// profile, and publishes the tree under the task's name.
///
/// - `update_lock`: always resolve, then overwrite the lock
/// - `use_lock` with an existing lock: load it, no resolver is called
/// - `use_lock` without a lock: resolve, then write the lock
/// - neither flag: resolve without touching the lock
#[derive(Debug, Clone)]
pub struct DependencyResolveTask {
    dependencies: BTreeMap<String, Value>,
    lock_profile: String,
}

impl Default for DependencyResolveTask {
    fn default() -> Self {
        Self {
            dependencies: BTreeMap::new(),
            lock_profile: DEFAULT_PROFILE.to_string(),
        }
    }
}

impl DependencyResolveTask {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_lock_profile(mut self, profile: impl Into<String>) -> Self {
        self.lock_profile = profile.into();
        self
    }

    /// Add raw declarations (`name -> "^1.0.0" | "file:..." | {descriptor}`).
    #[must_use]
    pub fn with_dependencies(mut self, dependencies: BTreeMap<String, Value>) -> Self {
        self.dependencies.extend(dependencies);
        self
    }

    #[must_use]
    pub fn lock_profile(&self) -> &str {
        &self.lock_profile
    }

    async fn resolve(&self, cx: TaskContext<'_>) -> Result<DepTree, TaskError> {
        let resolvers = cx.project.resolvers();
        let descriptors = convert_dependencies_map(resolvers, &self.dependencies)?;

        let mut builder = DepTreeBuilder::new(resolvers);
        builder.resolve_dependencies(&descriptors);
        Ok(builder.build().await?)
    }

    async fn load_or_resolve(
        &self,
        cx: TaskContext<'_>,
        store: &dyn LockStore,
    ) -> Result<DepTree, TaskError> {
        let config = cx.project.config();

        if !config.update_lock && config.use_lock && store.exists() {
            info!(task = %cx.name, profile = %self.lock_profile, "Using lock profile");
            return Ok(store.load()?);
        }

        let tree = self.resolve(cx).await?;
        if config.update_lock || config.use_lock {
            store.save(&tree)?;
            info!(task = %cx.name, profile = %self.lock_profile, "Lock profile written");
        }
        Ok(tree)
    }
}

impl TaskAction for DependencyResolveTask {
    fn exec<'a>(&'a self, cx: TaskContext<'a>) -> BoxFuture<'a, Result<(), TaskError>> {
        Box::pin(async move {
            let store = cx.project.lock_stores().get(&self.lock_profile).ok_or_else(|| {
                TaskError::configuration(
                    cx.name,
                    format!("no lock store registered for profile '{}'", self.lock_profile),
                )
            })?;

            let tree = self.load_or_resolve(cx, store.as_ref()).await?;
            info!(task = %cx.name, packages = tree.len().saturating_sub(1), "Dependencies resolved");
            debug!("Dependency tree:\n{}", tree.render());

            cx.project.publish_tree(cx.name, Arc::new(tree));
            Ok(())
        })
    }
}
