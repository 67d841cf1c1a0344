//! Task graph execution.
//!
//! A [`Project`] owns named tasks. Running a task first runs its dependencies
//! concurrently, then checks whether the task is up to date, then executes
//! it. Each task executes at most once per project: the outcome, success or
//! failure, is kept and handed to every later caller.

pub mod clean;
pub mod cmd;
pub mod copy;
pub mod error;
pub mod install;
pub mod project;
pub mod resolve;

pub use clean::CleanTask;
pub use cmd::CmdTask;
pub use copy::CopyTask;
pub use error::TaskError;
pub use install::InstallTask;
pub use project::Project;
pub use resolve::DependencyResolveTask;

use futures::future::BoxFuture;
use std::sync::Arc;
use tokio::sync::OnceCell;

/// What a running task can see.
#[derive(Clone, Copy)]
pub struct TaskContext<'a> {
    pub project: &'a Project,
    /// Name the task is registered under.
    pub name: &'a str,
}

/// The work behind a task.
pub trait TaskAction: Send + Sync {
    /// Tasks this action always needs, in addition to declared ones.
    fn implicit_dependencies(&self) -> Vec<String> {
        Vec::new()
    }

    /// Checked after dependencies complete. Never up to date by default.
    fn up_to_date<'a>(&'a self, _cx: TaskContext<'a>) -> BoxFuture<'a, Result<bool, TaskError>> {
        Box::pin(async { Ok(false) })
    }

    fn exec<'a>(&'a self, cx: TaskContext<'a>) -> BoxFuture<'a, Result<(), TaskError>>;
}

/// Groups dependencies without doing work of its own.
#[derive(Debug, Default, Clone, Copy)]
pub struct GroupTask;

impl TaskAction for GroupTask {
    fn exec<'a>(&'a self, _cx: TaskContext<'a>) -> BoxFuture<'a, Result<(), TaskError>> {
        Box::pin(async { Ok(()) })
    }
}

/// A named node in the task graph.
pub struct Task {
    name: String,
    dependencies: Vec<String>,
    action: Arc<dyn TaskAction>,
    outcome: OnceCell<Result<(), TaskError>>,
}

impl Task {
    pub(crate) fn new(name: impl Into<String>, action: Arc<dyn TaskAction>) -> Self {
        Self {
            name: name.into(),
            dependencies: action.implicit_dependencies(),
            action,
            outcome: OnceCell::new(),
        }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Dependency task names, in declaration order.
    #[must_use]
    pub fn dependencies(&self) -> &[String] {
        &self.dependencies
    }

    /// Whether the task has finished running.
    #[must_use]
    pub fn is_completed(&self) -> bool {
        self.outcome.initialized()
    }

    /// The memoized outcome, once completed.
    #[must_use]
    pub fn outcome(&self) -> Option<&Result<(), TaskError>> {
        self.outcome.get()
    }

    pub(crate) fn action(&self) -> &dyn TaskAction {
        self.action.as_ref()
    }

    pub(crate) fn cell(&self) -> &OnceCell<Result<(), TaskError>> {
        &self.outcome
    }

    pub(crate) fn push_dependency(&mut self, name: String) {
        if !self.dependencies.contains(&name) {
            self.dependencies.push(name);
        }
    }
}
