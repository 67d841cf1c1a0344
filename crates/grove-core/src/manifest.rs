//! Project manifest (`grove.json`) loading.
//!
//! The manifest declares resolvers and tasks; [`Manifest::into_project`]
//! turns it into a runnable [`Project`].

use crate::config::Config;
use crate::error::Error;
use crate::paths::{cache_dir, normalize_path};
use crate::pkg::{
    FileResolver, FsContentCache, FsLockStore, NpmResolver, RegistryClient, DEFAULT_MODULES_FOLDER,
    DEFAULT_PROFILE,
};
use crate::task::{
    CleanTask, CmdTask, CopyTask, DependencyResolveTask, GroupTask, InstallTask, Project,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;
use tracing::debug;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Manifest {
    #[serde(default)]
    pub name: Option<String>,

    /// Resolvers by registry name. `npm` and `file` are registered when empty.
    #[serde(default)]
    pub resolvers: BTreeMap<String, ResolverSpec>,

    #[serde(default)]
    pub tasks: BTreeMap<String, TaskSpec>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ResolverSpec {
    #[serde(rename_all = "camelCase")]
    Npm {
        #[serde(default)]
        registry: Option<String>,
        #[serde(default = "default_true")]
        cache: bool,
    },
    #[serde(rename_all = "camelCase")]
    File {
        #[serde(default)]
        base: Option<String>,
        #[serde(default)]
        dep_properties: Option<Vec<String>>,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskSpec {
    #[serde(default)]
    pub depends_on: Vec<String>,

    #[serde(flatten)]
    pub kind: TaskKind,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum TaskKind {
    #[serde(rename_all = "camelCase")]
    Cmd {
        command: String,
        #[serde(default)]
        env: BTreeMap<String, String>,
        #[serde(default)]
        path: Vec<String>,
    },
    Clean {
        #[serde(default)]
        paths: Vec<String>,
    },
    Copy {
        #[serde(default)]
        from: Vec<String>,
        #[serde(default)]
        into: Option<String>,
    },
    #[serde(rename_all = "camelCase")]
    Resolve {
        #[serde(default)]
        lock_profile: Option<String>,
        #[serde(default)]
        dependencies: BTreeMap<String, Value>,
    },
    #[serde(rename_all = "camelCase")]
    Install {
        #[serde(default)]
        resolve_task: Option<String>,
        #[serde(default)]
        modules_folder: Option<String>,
        #[serde(default)]
        target: Option<String>,
    },
    Group,
}

fn default_true() -> bool {
    true
}

impl Manifest {
    /// Read and parse a manifest file.
    pub fn load(path: &Path) -> Result<Self, Error> {
        let content = std::fs::read_to_string(path).map_err(|source| Error::ManifestRead {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(&content).map_err(|source| Error::ManifestParse {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn parse(content: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(content)
    }

    /// Build a project rooted at `root`: resolvers, lock stores, tasks and
    /// their edges. The task graph is validated before returning.
    pub fn into_project(self, root: &Path, config: Config) -> Result<Project, Error> {
        let channel = config.channel;
        let mut project = Project::new(root, config);

        if self.resolvers.is_empty() {
            project.register_resolver("npm", Arc::new(npm_resolver("npm", None, true, channel)?));
            project.register_resolver("file", Arc::new(FileResolver::new("file", root)));
        }
        for (name, spec) in &self.resolvers {
            match spec {
                ResolverSpec::Npm { registry, cache } => {
                    let resolver = npm_resolver(name, registry.as_deref(), *cache, channel)?;
                    project.register_resolver(name.clone(), Arc::new(resolver));
                }
                ResolverSpec::File {
                    base,
                    dep_properties,
                } => {
                    let base = base
                        .as_deref()
                        .map_or_else(|| root.to_path_buf(), |b| normalize_path(root, b));
                    let mut resolver = FileResolver::new(name.clone(), base);
                    if let Some(props) = dep_properties {
                        resolver = resolver.with_dep_properties(props.iter().cloned());
                    }
                    project.register_resolver(name.clone(), Arc::new(resolver));
                }
            }
            debug!(resolver = %name, "Registered resolver");
        }

        for (name, spec) in &self.tasks {
            match &spec.kind {
                TaskKind::Cmd { command, env, path } => {
                    let mut task = CmdTask::new(command.clone());
                    for (key, value) in env {
                        task = task.with_env(key.clone(), value.clone());
                    }
                    for entry in path {
                        task = task.with_path(entry.clone());
                    }
                    project.add_task(name, task)?;
                }
                TaskKind::Clean { paths } => {
                    let task = paths
                        .iter()
                        .fold(CleanTask::new(), |task, p| task.clean(p.clone()));
                    project.add_task(name, task)?;
                }
                TaskKind::Copy { from, into } => {
                    let mut task = from
                        .iter()
                        .fold(CopyTask::new(), |task, s| task.source(s.clone()));
                    if let Some(into) = into {
                        task = task.target(into.clone());
                    }
                    project.add_task(name, task)?;
                }
                TaskKind::Resolve {
                    lock_profile,
                    dependencies,
                } => {
                    let profile = lock_profile.as_deref().unwrap_or(DEFAULT_PROFILE);
                    if !project.lock_stores().contains(profile) {
                        project.register_lock_store(
                            profile,
                            Arc::new(FsLockStore::for_profile(root, profile)),
                        );
                    }
                    let task = DependencyResolveTask::new()
                        .with_lock_profile(profile)
                        .with_dependencies(dependencies.clone());
                    project.add_task(name, task)?;
                }
                TaskKind::Install {
                    resolve_task,
                    modules_folder,
                    target,
                } => {
                    let mut task = InstallTask::new().with_modules_folder(
                        modules_folder
                            .clone()
                            .unwrap_or_else(|| DEFAULT_MODULES_FOLDER.to_string()),
                    );
                    if let Some(resolve) = resolve_task {
                        task = task.with_resolve_task(resolve.clone());
                    }
                    if let Some(target) = target {
                        task = task.with_target(target.clone());
                    }
                    project.add_task(name, task)?;
                }
                TaskKind::Group => project.add_task(name, GroupTask)?,
            }
        }

        for (name, spec) in &self.tasks {
            for dep in &spec.depends_on {
                project.depends_on(name, dep)?;
            }
        }
        project.validate()?;

        Ok(project)
    }
}

fn npm_resolver(
    name: &str,
    registry: Option<&str>,
    cache: bool,
    channel: crate::config::Channel,
) -> Result<NpmResolver, Error> {
    let client = match registry {
        Some(url) => RegistryClient::new(url)?,
        None => RegistryClient::from_env()?,
    };
    let resolver = NpmResolver::new(name, client.clone());
    if !cache {
        return Ok(resolver);
    }
    let root = NpmResolver::cache_root(&cache_dir(channel), client.base_url().as_str());
    Ok(resolver.with_cache(Arc::new(FsContentCache::new(root))))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task::TaskError;
    use tempfile::tempdir;

    const DEMO: &str = r#"{
        "name": "demo",
        "resolvers": {
            "npm": { "type": "npm", "registry": "http://127.0.0.1:1/", "cache": false },
            "file": { "type": "file", "depProperties": ["dependencies", "peerDependencies"] }
        },
        "tasks": {
            "clean":   { "type": "clean", "paths": ["node_modules"] },
            "resolve": { "type": "resolve", "lockProfile": "ci",
                         "dependencies": { "left-pad": "^1.3.0" } },
            "install": { "type": "install", "dependsOn": ["clean"] },
            "build":   { "type": "cmd", "command": "echo build", "env": { "A": "1" },
                         "path": ["bin"], "dependsOn": ["install"] },
            "dist":    { "type": "copy", "from": ["lib"], "into": "dist", "dependsOn": ["build"] },
            "all":     { "type": "group", "dependsOn": ["dist", "clean"] }
        }
    }"#;

    #[test]
    fn test_parse_demo() {
        let manifest = Manifest::parse(DEMO).unwrap();
        assert_eq!(manifest.name.as_deref(), Some("demo"));
        assert_eq!(manifest.tasks.len(), 6);
        assert_eq!(
            manifest.resolvers["npm"],
            ResolverSpec::Npm {
                registry: Some("http://127.0.0.1:1/".into()),
                cache: false
            }
        );
        assert_eq!(manifest.tasks["install"].depends_on, vec!["clean".to_string()]);
        assert_eq!(
            manifest.tasks["install"].kind,
            TaskKind::Install {
                resolve_task: None,
                modules_folder: None,
                target: None
            }
        );
    }

    #[test]
    fn test_into_project_wires_tasks() {
        let dir = tempdir().unwrap();
        let project = Manifest::parse(DEMO)
            .unwrap()
            .into_project(dir.path(), Config::new(dir.path().to_path_buf()))
            .unwrap();

        let install = project.task("install").unwrap();
        assert_eq!(install.dependencies(), ["resolve".to_string(), "clean".to_string()]);
        assert!(project.resolvers().get("npm").is_ok());
        assert!(project.resolvers().get("file").is_ok());
        assert!(project.lock_stores().contains("ci"));
        assert!(project.lock_stores().contains(DEFAULT_PROFILE));
    }

    #[test]
    fn test_default_resolvers() {
        let dir = tempdir().unwrap();
        let project = Manifest::default()
            .into_project(dir.path(), Config::new(dir.path().to_path_buf()))
            .unwrap();
        assert!(project.resolvers().get("npm").is_ok());
        assert!(project.resolvers().get("file").is_ok());
    }

    #[test]
    fn test_cycle_is_rejected() {
        let dir = tempdir().unwrap();
        let manifest = Manifest::parse(
            r#"{ "tasks": {
                "a": { "type": "group", "dependsOn": ["b"] },
                "b": { "type": "group", "dependsOn": ["a"] }
            } }"#,
        )
        .unwrap();

        let err = manifest
            .into_project(dir.path(), Config::new(dir.path().to_path_buf()))
            .unwrap_err();
        assert!(matches!(err, Error::Task(TaskError::Cycle { .. })));
    }

    #[test]
    fn test_unknown_dependency() {
        let dir = tempdir().unwrap();
        let manifest =
            Manifest::parse(r#"{ "tasks": { "a": { "type": "group", "dependsOn": ["zzz"] } } }"#)
                .unwrap();

        let err = manifest
            .into_project(dir.path(), Config::new(dir.path().to_path_buf()))
            .unwrap_err();
        assert!(matches!(err, Error::Task(TaskError::UnknownTask(ref n)) if n == "zzz"));
    }

    #[test]
    fn test_unknown_task_type() {
        assert!(Manifest::parse(r#"{ "tasks": { "a": { "type": "deploy" } } }"#).is_err());
    }

    #[test]
    fn test_load_errors() {
        let dir = tempdir().unwrap();
        let missing = dir.path().join("grove.json");
        assert!(matches!(Manifest::load(&missing), Err(Error::ManifestRead { .. })));

        std::fs::write(&missing, "{ not json").unwrap();
        assert!(matches!(Manifest::load(&missing), Err(Error::ManifestParse { .. })));
    }
}
