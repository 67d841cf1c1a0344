//! Removes files and folders matching glob patterns.

use super::{TaskAction, TaskContext, TaskError};
use futures::future::BoxFuture;
use grove_util::fs::remove_path;
use std::path::Path;
use tracing::debug;

#[derive(Debug, Clone, Default)]
pub struct CleanTask {
    patterns: Vec<String>,
}

impl CleanTask {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a glob pattern, relative to the project root.
    #[must_use]
    pub fn clean(mut self, pattern: impl Into<String>) -> Self {
        self.patterns.push(pattern.into());
        self
    }

    fn remove_matches(&self, task: &str, root: &Path) -> Result<usize, TaskError> {
        let mut removed = 0;
        for pattern in &self.patterns {
            let full = if Path::new(pattern).is_absolute() {
                pattern.clone()
            } else {
                root.join(pattern).to_string_lossy().into_owned()
            };

            let entries = glob::glob(&full).map_err(|e| {
                TaskError::configuration(task, format!("Invalid pattern '{pattern}': {e}"))
            })?;

            // Collected up front: removing a folder mid-walk would break the walk.
            let matches = entries
                .collect::<Result<Vec<_>, _>>()
                .map_err(|e| {
                    TaskError::io(format!("Failed to read {}", e.path().display()), e.error())
                })?;

            for path in matches {
                remove_path(&path)
                    .map_err(|e| TaskError::io(format!("Failed to remove {}", path.display()), &e))?;
                debug!(path = %path.display(), "Removed");
                removed += 1;
            }
        }
        Ok(removed)
    }
}

impl TaskAction for CleanTask {
    fn exec<'a>(&'a self, cx: TaskContext<'a>) -> BoxFuture<'a, Result<(), TaskError>> {
        Box::pin(async move {
            let removed = self.remove_matches(cx.name, cx.project.root())?;
            debug!(task = %cx.name, removed, "Clean finished");
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::task::Project;
    use std::fs;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_clean_globs() {
        let dir = tempdir().unwrap();
        let root = dir.path();
        fs::create_dir_all(root.join("node_modules/a/lib")).unwrap();
        fs::write(root.join("node_modules/a/lib/x.js"), "").unwrap();
        fs::create_dir_all(root.join("dist")).unwrap();
        fs::write(root.join("dist/app.js"), "").unwrap();
        fs::write(root.join("dist/app.js.map"), "").unwrap();
        fs::write(root.join("keep.txt"), "").unwrap();

        let mut project = Project::new(root, Config::new(root.to_path_buf()));
        project
            .add_task(
                "clean",
                CleanTask::new()
                    .clean("node_modules")
                    .clean("dist/*.map")
                    .clean("missing/**"),
            )
            .unwrap();
        project.run("clean").await.unwrap();

        assert!(!root.join("node_modules").exists());
        assert!(!root.join("dist/app.js.map").exists());
        assert!(root.join("dist/app.js").exists());
        assert!(root.join("keep.txt").exists());
    }

    #[tokio::test]
    async fn test_invalid_pattern() {
        let dir = tempdir().unwrap();
        let mut project = Project::new(dir.path(), Config::new(dir.path().to_path_buf()));
        project
            .add_task("clean", CleanTask::new().clean("[broken"))
            .unwrap();

        let err = project.run("clean").await.unwrap_err();
        assert!(matches!(err, TaskError::Configuration { .. }));
    }
}
