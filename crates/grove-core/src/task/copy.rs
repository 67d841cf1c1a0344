//! Copies files and folders into a target folder.

use super::{TaskAction, TaskContext, TaskError};
use crate::paths::normalize_path;
use futures::future::BoxFuture;
use grove_util::fs::copy_dir_all;
use std::fs;
use std::path::Path;
use tracing::info;

/// Folder sources have their contents copied into the target; file sources
/// are copied into it under their own name.
#[derive(Debug, Clone, Default)]
pub struct CopyTask {
    sources: Vec<String>,
    target: Option<String>,
}

impl CopyTask {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn source(mut self, source: impl Into<String>) -> Self {
        self.sources.push(source.into());
        self
    }

    #[must_use]
    pub fn target(mut self, target: impl Into<String>) -> Self {
        self.target = Some(target.into());
        self
    }

    fn copy_all(&self, task: &str, root: &Path) -> Result<(), TaskError> {
        if self.sources.is_empty() {
            return Err(TaskError::configuration(task, "no source path given"));
        }
        let target = self
            .target
            .as_deref()
            .filter(|t| !t.trim().is_empty())
            .map(|t| normalize_path(root, t))
            .ok_or_else(|| TaskError::configuration(task, "no target path given"))?;

        for source in &self.sources {
            let source = normalize_path(root, source);
            info!(from = %source.display(), into = %target.display(), "Copying");

            let copy_failed =
                |e: std::io::Error| TaskError::io(format!("Failed to copy {}", source.display()), &e);

            if source.is_dir() {
                copy_dir_all(&source, &target).map_err(copy_failed)?;
            } else {
                let name = source.file_name().ok_or_else(|| {
                    TaskError::configuration(task, format!("invalid source {}", source.display()))
                })?;
                fs::create_dir_all(&target).map_err(copy_failed)?;
                fs::copy(&source, target.join(name)).map_err(copy_failed)?;
            }
        }
        Ok(())
    }
}

impl TaskAction for CopyTask {
    fn exec<'a>(&'a self, cx: TaskContext<'a>) -> BoxFuture<'a, Result<(), TaskError>> {
        Box::pin(async move { self.copy_all(cx.name, cx.project.root()) })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::task::Project;
    use tempfile::tempdir;

    fn project_with(root: &Path, task: CopyTask) -> Project {
        let mut project = Project::new(root, Config::new(root.to_path_buf()));
        project.add_task("copy", task).unwrap();
        project
    }

    #[tokio::test]
    async fn test_copy_folder_and_file() {
        let dir = tempdir().unwrap();
        let root = dir.path();
        fs::create_dir_all(root.join("lib/nested")).unwrap();
        fs::write(root.join("lib/nested/a.js"), "a").unwrap();
        fs::write(root.join("README.md"), "readme").unwrap();

        let project = project_with(root, CopyTask::new().source("lib").source("README.md").target("dist"));
        project.run("copy").await.unwrap();

        assert_eq!(fs::read_to_string(root.join("dist/nested/a.js")).unwrap(), "a");
        assert_eq!(fs::read_to_string(root.join("dist/README.md")).unwrap(), "readme");
    }

    #[tokio::test]
    async fn test_missing_target_is_configuration_error() {
        let dir = tempdir().unwrap();
        let project = project_with(dir.path(), CopyTask::new().source("lib"));

        let err = project.run("copy").await.unwrap_err();
        assert_eq!(err, TaskError::configuration("copy", "no target path given"));
    }

    #[tokio::test]
    async fn test_missing_source_is_configuration_error() {
        let dir = tempdir().unwrap();
        let project = project_with(dir.path(), CopyTask::new().target("dist"));

        let err = project.run("copy").await.unwrap_err();
        assert_eq!(err, TaskError::configuration("copy", "no source path given"));
    }

    #[tokio::test]
    async fn test_unreadable_source_fails() {
        let dir = tempdir().unwrap();
        let project = project_with(dir.path(), CopyTask::new().source("nope.txt").target("dist"));

        assert!(matches!(project.run("copy").await, Err(TaskError::Io { .. })));
    }
}
