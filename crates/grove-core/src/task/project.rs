//! The project: task map plus the registries tasks share.

use super::{Task, TaskAction, TaskContext, TaskError};
use crate::config::Config;
use crate::pkg::lockfile::{FsLockStore, LockStore, LockStores, DEFAULT_PROFILE};
use crate::pkg::resolver::{DependencyResolver, Resolvers};
use crate::pkg::tree::DepTree;
use futures::future::{try_join_all, BoxFuture};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, OnceLock, PoisonError};
use tracing::{debug, info};

pub struct Project {
    root: PathBuf,
    config: Config,
    tasks: BTreeMap<String, Task>,
    resolvers: Resolvers,
    lock_stores: LockStores,
    trees: Mutex<BTreeMap<String, Arc<DepTree>>>,
    validated: OnceLock<Result<(), TaskError>>,
}

impl fmt::Debug for Project {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Project")
            .field("root", &self.root)
            .field("tasks", &self.tasks.keys().collect::<Vec<_>>())
            .field("resolvers", &self.resolvers)
            .field("lock_stores", &self.lock_stores)
            .finish_non_exhaustive()
    }
}

impl Project {
    /// Create an empty project rooted at `root`, with the default lock
    /// profile stored next to the manifest.
    #[must_use]
    pub fn new(root: impl Into<PathBuf>, config: Config) -> Self {
        let root = root.into();
        let mut lock_stores = LockStores::new();
        lock_stores.insert(
            DEFAULT_PROFILE,
            Arc::new(FsLockStore::for_profile(&root, DEFAULT_PROFILE)),
        );

        Self {
            root,
            config,
            tasks: BTreeMap::new(),
            resolvers: Resolvers::new(),
            lock_stores,
            trees: Mutex::new(BTreeMap::new()),
            validated: OnceLock::new(),
        }
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    #[must_use]
    pub fn config(&self) -> &Config {
        &self.config
    }

    #[must_use]
    pub fn resolvers(&self) -> &Resolvers {
        &self.resolvers
    }

    #[must_use]
    pub fn lock_stores(&self) -> &LockStores {
        &self.lock_stores
    }

    pub fn register_resolver(&mut self, name: impl Into<String>, resolver: Arc<dyn DependencyResolver>) {
        self.resolvers.insert(name, resolver);
    }

    pub fn register_lock_store(&mut self, profile: impl Into<String>, store: Arc<dyn LockStore>) {
        self.lock_stores.insert(profile, store);
    }

    /// Look up a task by name.
    pub fn task(&self, name: &str) -> Result<&Task, TaskError> {
        self.tasks
            .get(name)
            .ok_or_else(|| TaskError::UnknownTask(name.to_string()))
    }

    /// All tasks, in name order.
    pub fn tasks(&self) -> impl Iterator<Item = &Task> {
        self.tasks.values()
    }

    /// Register a task under `name`.
    pub fn add_task<A>(&mut self, name: &str, action: A) -> Result<(), TaskError>
    where
        A: TaskAction + 'static,
    {
        if self.tasks.contains_key(name) {
            return Err(TaskError::DuplicateTask(name.to_string()));
        }
        self.tasks
            .insert(name.to_string(), Task::new(name, Arc::new(action)));
        self.validated = OnceLock::new();
        Ok(())
    }

    /// Make `task` depend on `dependency`.
    ///
    /// # Errors
    ///
    /// Fails with `UnknownTask` if either name is unregistered, `AlreadyStarted`
    /// once `task` has run, and `Cycle` if `dependency` already reaches `task`.
    pub fn depends_on(&mut self, task: &str, dependency: &str) -> Result<(), TaskError> {
        self.task(dependency)?;
        if self.task(task)?.is_completed() {
            return Err(TaskError::AlreadyStarted(task.to_string()));
        }

        if let Some(path) = self.find_path(dependency, task, &mut BTreeSet::new()) {
            let mut cycle = vec![task.to_string()];
            cycle.extend(path);
            return Err(TaskError::Cycle { path: cycle });
        }

        if let Some(entry) = self.tasks.get_mut(task) {
            entry.push_dependency(dependency.to_string());
        }
        self.validated = OnceLock::new();
        Ok(())
    }

    /// Check that every dependency names a registered task and that the graph
    /// has no cycle.
    pub fn validate(&self) -> Result<(), TaskError> {
        for task in self.tasks.values() {
            for dep in task.dependencies() {
                self.task(dep)?;
            }
        }

        let mut done = BTreeSet::new();
        for name in self.tasks.keys() {
            let mut stack = Vec::new();
            self.check_acyclic(name, &mut stack, &mut done)?;
        }
        Ok(())
    }

    /// Run `name` and everything it depends on.
    ///
    /// The graph is validated before the first run.
    pub async fn run(&self, name: &str) -> Result<(), TaskError> {
        self.validated.get_or_init(|| self.validate()).clone()?;
        self.run_task(name).await
    }

    /// Record the tree resolved by task `task`.
    pub fn publish_tree(&self, task: &str, tree: Arc<DepTree>) {
        self.trees
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(task.to_string(), tree);
    }

    /// The tree resolved by task `task`, once it has run.
    #[must_use]
    pub fn resolved_tree(&self, task: &str) -> Option<Arc<DepTree>> {
        self.trees
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(task)
            .cloned()
    }

    fn run_task<'a>(&'a self, name: &'a str) -> BoxFuture<'a, Result<(), TaskError>> {
        Box::pin(async move {
            let task = self.task(name)?;
            task.cell()
                .get_or_init(|| self.execute(task))
                .await
                .clone()
        })
    }

    async fn execute(&self, task: &Task) -> Result<(), TaskError> {
        let deps = task.dependencies().iter().map(|dep| async move {
            self.run_task(dep)
                .await
                .map_err(|e| TaskError::Dependency {
                    task: task.name().to_string(),
                    dependency: dep.clone(),
                    source: Box::new(e),
                })
        });
        try_join_all(deps).await?;

        let cx = TaskContext {
            project: self,
            name: task.name(),
        };

        if task.action().up_to_date(cx).await? {
            info!(task = %task.name(), "Task is up to date");
            return Ok(());
        }

        info!(task = %task.name(), "Executing task");
        let result = task.action().exec(cx).await;
        debug!(task = %task.name(), ok = result.is_ok(), "Task finished");
        result
    }

    /// A dependency path from `from` to `to`, both included.
    fn find_path(&self, from: &str, to: &str, seen: &mut BTreeSet<String>) -> Option<Vec<String>> {
        if from == to {
            return Some(vec![to.to_string()]);
        }
        if !seen.insert(from.to_string()) {
            return None;
        }
        let task = self.tasks.get(from)?;
        task.dependencies().iter().find_map(|dep| {
            self.find_path(dep, to, seen).map(|mut path| {
                path.insert(0, from.to_string());
                path
            })
        })
    }

    fn check_acyclic(
        &self,
        name: &str,
        stack: &mut Vec<String>,
        done: &mut BTreeSet<String>,
    ) -> Result<(), TaskError> {
        if done.contains(name) {
            return Ok(());
        }
        if let Some(pos) = stack.iter().position(|n| n == name) {
            let mut path = stack[pos..].to_vec();
            path.push(name.to_string());
            return Err(TaskError::Cycle { path });
        }

        stack.push(name.to_string());
        for dep in self.task(name)?.dependencies() {
            self.check_acyclic(dep, stack, done)?;
        }
        stack.pop();
        done.insert(name.to_string());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task::GroupTask;
    use futures::future::join_all;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use tempfile::tempdir;
    use tokio::time::Instant;

    type Spans = Arc<Mutex<BTreeMap<String, (Instant, Instant)>>>;

    #[derive(Clone, Default)]
    struct Probe {
        runs: Arc<AtomicUsize>,
        spans: Spans,
        delay: Duration,
        fail: bool,
        fresh: bool,
        implicit: Vec<String>,
    }

    impl Probe {
        fn delayed(spans: &Spans, ms: u64) -> Self {
            Self {
                spans: Arc::clone(spans),
                delay: Duration::from_millis(ms),
                ..Self::default()
            }
        }

        fn span(&self, name: &str) -> (Instant, Instant) {
            self.spans.lock().unwrap()[name]
        }
    }

    impl TaskAction for Probe {
        fn implicit_dependencies(&self) -> Vec<String> {
            self.implicit.clone()
        }

        fn up_to_date<'a>(&'a self, _cx: TaskContext<'a>) -> BoxFuture<'a, Result<bool, TaskError>> {
            Box::pin(async move { Ok(self.fresh) })
        }

        fn exec<'a>(&'a self, cx: TaskContext<'a>) -> BoxFuture<'a, Result<(), TaskError>> {
            Box::pin(async move {
                self.runs.fetch_add(1, Ordering::SeqCst);
                let start = Instant::now();
                tokio::time::sleep(self.delay).await;
                self.spans
                    .lock()
                    .unwrap()
                    .insert(cx.name.to_string(), (start, Instant::now()));
                if self.fail {
                    return Err(TaskError::configuration(cx.name, "probe failure"));
                }
                Ok(())
            })
        }
    }

    fn project() -> (tempfile::TempDir, Project) {
        let dir = tempdir().unwrap();
        let project = Project::new(dir.path(), Config::new(dir.path().to_path_buf()));
        (dir, project)
    }

    #[tokio::test]
    async fn test_concurrent_runs_execute_once() {
        let (_dir, mut project) = project();
        let probe = Probe {
            delay: Duration::from_millis(20),
            ..Probe::default()
        };
        project.add_task("a", probe.clone()).unwrap();

        let results = join_all((0..8).map(|_| project.run("a"))).await;
        assert!(results.iter().all(Result::is_ok));
        assert_eq!(probe.runs.load(Ordering::SeqCst), 1);

        project.run("a").await.unwrap();
        assert_eq!(probe.runs.load(Ordering::SeqCst), 1);
        assert!(project.task("a").unwrap().is_completed());
    }

    #[tokio::test]
    async fn test_failure_is_memoized() {
        let (_dir, mut project) = project();
        let probe = Probe {
            fail: true,
            ..Probe::default()
        };
        project.add_task("bad", probe.clone()).unwrap();

        let first = project.run("bad").await.unwrap_err();
        let second = project.run("bad").await.unwrap_err();
        assert_eq!(first, second);
        assert_eq!(probe.runs.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_dependency_order() {
        let (_dir, mut project) = project();
        let spans = Spans::default();
        let a = Probe::delayed(&spans, 30);
        project.add_task("a", a.clone()).unwrap();
        project.add_task("b", Probe::delayed(&spans, 10)).unwrap();
        project.add_task("c", Probe::delayed(&spans, 20)).unwrap();
        project.depends_on("b", "a").unwrap();
        project.depends_on("c", "b").unwrap();

        project.run("c").await.unwrap();

        let (a_start, a_end) = a.span("a");
        let (b_start, b_end) = a.span("b");
        let (c_start, _) = a.span("c");
        assert!(a_start <= a_end);
        assert!(b_start >= a_end);
        assert!(c_start >= b_end);
    }

    #[tokio::test(start_paused = true)]
    async fn test_sibling_dependencies_run_concurrently() {
        let (_dir, mut project) = project();
        let spans = Spans::default();
        project.add_task("x", Probe::delayed(&spans, 100)).unwrap();
        project.add_task("y", Probe::delayed(&spans, 100)).unwrap();
        project.add_task("all", GroupTask).unwrap();
        project.depends_on("all", "x").unwrap();
        project.depends_on("all", "y").unwrap();

        let start = Instant::now();
        project.run("all").await.unwrap();
        assert!(start.elapsed() < Duration::from_millis(150));
    }

    #[tokio::test]
    async fn test_dependency_failure_stops_dependents() {
        let (_dir, mut project) = project();
        let bad = Probe {
            fail: true,
            ..Probe::default()
        };
        let after = Probe::default();
        project.add_task("bad", bad).unwrap();
        project.add_task("after", after.clone()).unwrap();
        project.depends_on("after", "bad").unwrap();

        let err = project.run("after").await.unwrap_err();
        assert!(matches!(
            &err,
            TaskError::Dependency { task, dependency, .. } if task == "after" && dependency == "bad"
        ));
        assert!(matches!(err.root_cause(), TaskError::Configuration { task, .. } if task == "bad"));
        assert_eq!(after.runs.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_up_to_date_skips_exec() {
        let (_dir, mut project) = project();
        let probe = Probe {
            fresh: true,
            ..Probe::default()
        };
        project.add_task("cached", probe.clone()).unwrap();
        project.run("cached").await.unwrap();
        assert_eq!(probe.runs.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_depends_on_rejects_cycles() {
        let (_dir, mut project) = project();
        for name in ["a", "b", "c"] {
            project.add_task(name, Probe::default()).unwrap();
        }
        project.depends_on("a", "b").unwrap();
        project.depends_on("b", "c").unwrap();

        let err = project.depends_on("c", "a").unwrap_err();
        assert_eq!(
            err,
            TaskError::Cycle {
                path: vec!["c".into(), "a".into(), "b".into(), "c".into()]
            }
        );
        assert!(matches!(
            project.depends_on("a", "a"),
            Err(TaskError::Cycle { .. })
        ));
    }

    #[tokio::test]
    async fn test_implicit_cycle_rejected_before_run() {
        let (_dir, mut project) = project();
        let needs = |dep: &str| Probe {
            implicit: vec![dep.to_string()],
            ..Probe::default()
        };
        project.add_task("a", needs("b")).unwrap();
        project.add_task("b", needs("a")).unwrap();

        let err = project.run("a").await.unwrap_err();
        assert_eq!(
            err,
            TaskError::Cycle {
                path: vec!["a".into(), "b".into(), "a".into()]
            }
        );
    }

    #[tokio::test]
    async fn test_registration_errors() {
        let (_dir, mut project) = project();
        project.add_task("a", Probe::default()).unwrap();

        assert_eq!(
            project.add_task("a", Probe::default()),
            Err(TaskError::DuplicateTask("a".into()))
        );
        assert_eq!(
            project.depends_on("a", "missing"),
            Err(TaskError::UnknownTask("missing".into()))
        );
        assert_eq!(
            project.run("nope").await,
            Err(TaskError::UnknownTask("nope".into()))
        );

        project.add_task("b", Probe::default()).unwrap();
        project.run("a").await.unwrap();
        assert_eq!(
            project.depends_on("a", "b"),
            Err(TaskError::AlreadyStarted("a".into()))
        );
    }

    #[test]
    fn test_default_lock_store_registered() {
        let (_dir, project) = project();
        assert!(project.lock_stores().contains(DEFAULT_PROFILE));
    }

    #[test]
    fn test_debug_lists_tasks_and_registries() {
        let (_dir, mut project) = project();
        project.add_task("build", Probe::default()).unwrap();

        let rendered = format!("{project:?}");
        assert!(rendered.starts_with("Project {"), "{rendered}");
        assert!(rendered.contains(r#"tasks: ["build"]"#), "{rendered}");
        assert!(rendered.contains(DEFAULT_PROFILE), "{rendered}");
    }
}
