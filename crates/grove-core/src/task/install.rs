//! Installs a resolved dependency tree into a modules folder.

use super::{TaskAction, TaskContext, TaskError};
use crate::paths::normalize_path;
use crate::pkg::extract::{ExtractionPipeline, DEFAULT_MODULES_FOLDER};
use crate::pkg::lockfile::LockRecord;
use crate::pkg::tree::DepTree;
use futures::future::BoxFuture;
use grove_util::fs::{atomic_write, read_to_string_lossy, remove_path};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info};

/// Written inside the modules folder after a successful install.
pub const STATE_FILE: &str = ".grove-state";

/// Extracts the tree published by a resolve task.
///
/// The modules folder is wiped before every install. An install is skipped
/// when the state file records the same tree hash.
#[derive(Debug, Clone)]
pub struct InstallTask {
    resolve_task: String,
    modules_folder: String,
    target: Option<String>,
}

impl Default for InstallTask {
    fn default() -> Self {
        Self {
            resolve_task: "resolve".to_string(),
            modules_folder: DEFAULT_MODULES_FOLDER.to_string(),
            target: None,
        }
    }
}

impl InstallTask {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_resolve_task(mut self, task: impl Into<String>) -> Self {
        self.resolve_task = task.into();
        self
    }

    #[must_use]
    pub fn with_modules_folder(mut self, folder: impl Into<String>) -> Self {
        self.modules_folder = folder.into();
        self
    }

    /// Install below `target` (relative to the project root) instead of the root.
    #[must_use]
    pub fn with_target(mut self, target: impl Into<String>) -> Self {
        self.target = Some(target.into());
        self
    }

    fn target_dir(&self, cx: TaskContext<'_>) -> PathBuf {
        let root = cx.project.root();
        match &self.target {
            Some(target) => normalize_path(root, target),
            None => root.to_path_buf(),
        }
    }

    fn state_path(&self, cx: TaskContext<'_>) -> PathBuf {
        self.target_dir(cx).join(&self.modules_folder).join(STATE_FILE)
    }

    fn tree(&self, cx: TaskContext<'_>) -> Result<Arc<DepTree>, TaskError> {
        cx.project.resolved_tree(&self.resolve_task).ok_or_else(|| {
            TaskError::configuration(
                cx.name,
                format!("dependency tree is not resolved by '{}'", self.resolve_task),
            )
        })
    }
}

impl TaskAction for InstallTask {
    fn implicit_dependencies(&self) -> Vec<String> {
        vec![self.resolve_task.clone()]
    }

    fn up_to_date<'a>(&'a self, cx: TaskContext<'a>) -> BoxFuture<'a, Result<bool, TaskError>> {
        Box::pin(async move {
            let Some(tree) = cx.project.resolved_tree(&self.resolve_task) else {
                return Ok(false);
            };
            let Ok(recorded) = read_to_string_lossy(&self.state_path(cx)) else {
                return Ok(false);
            };
            let current = LockRecord::from_tree(&tree).content_hash()?;
            Ok(recorded.trim() == current)
        })
    }

    fn exec<'a>(&'a self, cx: TaskContext<'a>) -> BoxFuture<'a, Result<(), TaskError>> {
        Box::pin(async move {
            let tree = self.tree(cx)?;
            let target = self.target_dir(cx);
            let modules = target.join(&self.modules_folder);

            remove_path(&modules)
                .map_err(|e| TaskError::io(format!("Failed to remove {}", modules.display()), &e))?;
            debug!(path = %modules.display(), "Cleared modules folder");

            let summary = ExtractionPipeline::new(cx.project.resolvers(), &target)
                .with_modules_folder(self.modules_folder.clone())
                .extract_tree(&tree)
                .await?;

            let hash = LockRecord::from_tree(&tree).content_hash()?;
            let state = self.state_path(cx);
            std::fs::create_dir_all(&modules)
                .and_then(|()| atomic_write(&state, hash.as_bytes()))
                .map_err(|e| TaskError::io(format!("Failed to write {}", state.display()), &e))?;

            info!(
                task = %cx.name,
                packages = summary.packages,
                links = summary.links,
                "Install finished"
            );
            Ok(())
        })
    }
}
