use crate::pkg::PkgError;
use thiserror::Error;

/// Task graph errors.
///
/// `Clone` because a memoized outcome is handed to every caller of a task.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TaskError {
    #[error("Task dependency cycle: {}", path.join(" -> "))]
    Cycle { path: Vec<String> },

    #[error("Unknown task '{0}'")]
    UnknownTask(String),

    #[error("Task '{0}' is already defined")]
    DuplicateTask(String),

    #[error("Task '{task}' is misconfigured: {message}")]
    Configuration { task: String, message: String },

    #[error("Task '{0}' cannot be changed after it has run")]
    AlreadyStarted(String),

    #[error("Task '{task}': `{command}` exited with code {code}")]
    CommandFailed {
        task: String,
        command: String,
        code: i32,
    },

    #[error("{context}: {message}")]
    Io { context: String, message: String },

    #[error(transparent)]
    Pkg(#[from] PkgError),

    #[error("Task '{task}' failed because '{dependency}' failed")]
    Dependency {
        task: String,
        dependency: String,
        #[source]
        source: Box<TaskError>,
    },
}

impl TaskError {
    pub fn configuration(task: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Configuration {
            task: task.into(),
            message: message.into(),
        }
    }

    pub fn io(context: impl Into<String>, err: &std::io::Error) -> Self {
        Self::Io {
            context: context.into(),
            message: err.to_string(),
        }
    }

    /// The innermost error, following dependency failures down to the task
    /// that actually failed.
    #[must_use]
    pub fn root_cause(&self) -> &TaskError {
        let mut current = self;
        while let Self::Dependency { source, .. } = current {
            current = source;
        }
        current
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cycle_message() {
        let err = TaskError::Cycle {
            path: vec!["a".into(), "b".into(), "a".into()],
        };
        assert_eq!(err.to_string(), "Task dependency cycle: a -> b -> a");
    }

    #[test]
    fn test_root_cause() {
        let inner = TaskError::configuration("copy", "missing target");
        let err = TaskError::Dependency {
            task: "dist".into(),
            dependency: "build".into(),
            source: Box::new(TaskError::Dependency {
                task: "build".into(),
                dependency: "copy".into(),
                source: Box::new(inner.clone()),
            }),
        };
        assert_eq!(err.root_cause(), &inner);
    }
}
