//! Materialize a resolved tree on disk.
//!
//! Two passes over the tree:
//! - install, top-down: `preinstall` in the parent folder, then extraction
//!   into `<parent>/<modules>/<name>`, then the node's children
//! - post-install, bottom-up: the node's children first, then its `install`
//!   script, then its bin links into `<parent>/<modules>/.bin`
//!
//! Siblings run concurrently in both passes. Extraction and linking go through
//! the file gate.

use super::error::PkgError;
use super::link::link_bins;
use super::resolver::Resolvers;
use super::tree::{DepTree, DepTreeNode, NodeId};
use crate::gate::{Gate, FILE_LIMIT};
use crate::process::{run_script, ScriptOptions};
use futures::future::{try_join_all, BoxFuture};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Default modules folder name.
pub const DEFAULT_MODULES_FOLDER: &str = "node_modules";

/// Counts reported by [`ExtractionPipeline::extract_tree`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExtractSummary {
    pub packages: usize,
    pub links: usize,
}

pub struct ExtractionPipeline<'a> {
    resolvers: &'a Resolvers,
    target: PathBuf,
    modules_folder: String,
    file_gate: Gate,
}

impl<'a> ExtractionPipeline<'a> {
    #[must_use]
    pub fn new(resolvers: &'a Resolvers, target: impl Into<PathBuf>) -> Self {
        Self {
            resolvers,
            target: target.into(),
            modules_folder: DEFAULT_MODULES_FOLDER.to_string(),
            file_gate: Gate::new(FILE_LIMIT),
        }
    }

    #[must_use]
    pub fn with_modules_folder(mut self, folder: impl Into<String>) -> Self {
        self.modules_folder = folder.into();
        self
    }

    #[must_use]
    pub fn with_file_gate(mut self, gate: Gate) -> Self {
        self.file_gate = gate;
        self
    }

    /// The top-level `.bin` folder, prepended to `PATH` for lifecycle scripts.
    #[must_use]
    pub fn bin_dir(&self) -> PathBuf {
        self.target.join(&self.modules_folder).join(".bin")
    }

    /// Run both passes over `tree`.
    ///
    /// # Errors
    ///
    /// Returns the first extraction, script or link failure. Whatever was
    /// already written stays on disk.
    pub async fn extract_tree(&self, tree: &DepTree) -> Result<ExtractSummary, PkgError> {
        let packages = self
            .install_children(tree, NodeId::ROOT, self.target.clone())
            .await?;
        info!(packages, target = %self.target.display(), "Install phase completed");

        let links = self
            .post_install_children(tree, NodeId::ROOT, self.target.clone())
            .await?;
        info!(links, "Post-install phase completed");

        Ok(ExtractSummary { packages, links })
    }

    fn install_children<'s>(
        &'s self,
        tree: &'s DepTree,
        id: NodeId,
        parent_path: PathBuf,
    ) -> BoxFuture<'s, Result<usize, PkgError>> {
        Box::pin(async move {
            let jobs = installable_children(tree, id)
                .map(|(child, node)| self.install_node(tree, child, node, &parent_path));
            Ok(try_join_all(jobs).await?.into_iter().sum())
        })
    }

    async fn install_node(
        &self,
        tree: &DepTree,
        id: NodeId,
        node: &DepTreeNode,
        parent_path: &Path,
    ) -> Result<usize, PkgError> {
        let (name, resolved_by) = match (&node.package_name, &node.resolved_by) {
            (Some(name), Some(resolved_by)) => (name.as_str(), resolved_by.as_str()),
            _ => return Ok(0),
        };
        let resolver = self.resolvers.get(resolved_by)?;
        let package_dir = parent_path.join(&self.modules_folder).join(name);

        if let Some(script) = node.script("preinstall") {
            self.run_lifecycle(name, "preinstall", script, parent_path)
                .await?;
        }

        self.file_gate
            .acquire(async {
                std::fs::create_dir_all(&package_dir).map_err(|e| {
                    PkgError::extract_failed(format!(
                        "Failed to create {}: {e}",
                        package_dir.display()
                    ))
                })?;
                resolver.extract(&package_dir, node).await
            })
            .await?;
        debug!(package = %name, path = %package_dir.display(), "Extracted package");

        let nested = self.install_children(tree, id, package_dir).await?;
        Ok(nested + 1)
    }

    fn post_install_children<'s>(
        &'s self,
        tree: &'s DepTree,
        id: NodeId,
        parent_path: PathBuf,
    ) -> BoxFuture<'s, Result<usize, PkgError>> {
        Box::pin(async move {
            let jobs = installable_children(tree, id)
                .map(|(child, node)| self.post_install_node(tree, child, node, &parent_path));
            Ok(try_join_all(jobs).await?.into_iter().sum())
        })
    }

    async fn post_install_node(
        &self,
        tree: &DepTree,
        id: NodeId,
        node: &DepTreeNode,
        parent_path: &Path,
    ) -> Result<usize, PkgError> {
        let Some(name) = node.package_name.as_deref() else {
            return Ok(0);
        };
        let modules = parent_path.join(&self.modules_folder);
        let package_dir = modules.join(name);

        let nested = self
            .post_install_children(tree, id, package_dir.clone())
            .await?;

        if let Some(script) = node.script("install") {
            self.run_lifecycle(name, "install", script, &package_dir)
                .await?;
        }

        let bin_dir = modules.join(".bin");
        let links = self
            .file_gate
            .acquire(async { link_bins(&bin_dir, &package_dir, node) })
            .await?;

        Ok(nested + links)
    }

    async fn run_lifecycle(
        &self,
        package: &str,
        stage: &str,
        script: &str,
        cwd: &Path,
    ) -> Result<(), PkgError> {
        info!(package, stage, script, "Running lifecycle script");
        let options = ScriptOptions::captured().with_path_prefix(self.bin_dir());

        let output = run_script(script, cwd, &options).await.map_err(|e| {
            PkgError::script_failed(format!("{package} {stage} script could not start: {e}"))
        })?;

        if !output.success() {
            return Err(PkgError::script_failed(format!(
                "{package} {stage} script exited with code {}: {}",
                output.exit_code, output.stderr
            )));
        }
        Ok(())
    }
}

fn installable_children(
    tree: &DepTree,
    id: NodeId,
) -> impl Iterator<Item = (NodeId, &DepTreeNode)> {
    tree.children(id)
        .iter()
        .map(move |c| (*c, tree.node(*c)))
        .filter(|(_, node)| node.is_installable())
}
