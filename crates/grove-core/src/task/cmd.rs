//! Shell command task.

use super::{TaskAction, TaskContext, TaskError};
use crate::paths::normalize_path;
use crate::process::{run_script, ScriptOptions};
use futures::future::BoxFuture;
use std::collections::BTreeMap;

/// Runs one shell command in the project root. A non-zero exit fails the task.
#[derive(Debug, Clone, Default)]
pub struct CmdTask {
    command: String,
    env: BTreeMap<String, String>,
    path: Vec<String>,
}

impl CmdTask {
    #[must_use]
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    /// Prepend a directory, relative to the project root, to `PATH`.
    #[must_use]
    pub fn with_path(mut self, entry: impl Into<String>) -> Self {
        self.path.push(entry.into());
        self
    }
}

impl TaskAction for CmdTask {
    fn exec<'a>(&'a self, cx: TaskContext<'a>) -> BoxFuture<'a, Result<(), TaskError>> {
        Box::pin(async move {
            if self.command.trim().is_empty() {
                return Ok(());
            }

            let root = cx.project.root();
            let mut options = ScriptOptions {
                env: self.env.clone(),
                ..ScriptOptions::default()
            };
            for entry in &self.path {
                options = options.with_path_prefix(normalize_path(root, entry));
            }

            let output = run_script(&self.command, root, &options)
                .await
                .map_err(|e| TaskError::io(format!("Failed to start `{}`", self.command), &e))?;

            if !output.success() {
                return Err(TaskError::CommandFailed {
                    task: cx.name.to_string(),
                    command: self.command.clone(),
                    code: output.exit_code,
                });
            }
            Ok(())
        })
    }
}
