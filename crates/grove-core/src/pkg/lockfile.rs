//! Lock profiles: persisted dependency trees for reproducible installs.
//!
//! ## File Format
//!
//! The default profile is stored as `grove.lock` in the project root, other
//! profiles as `grove.<profile>.lock`. The document is the root record:
//!
//! ```json
//! {
//!   "children": [
//!     {
//!       "packageName": "a",
//!       "packageVersion": "1.0.1",
//!       "resolvedBy": "npm",
//!       "dependencies": { "b": { "resolverName": "npm", "semVersion": "^2.0.0", ... } },
//!       "options": { "bin": "cli.js" },
//!       "children": [ ... ]
//!     }
//!   ]
//! }
//! ```

use super::descriptor::PackageDescriptor;
use super::error::PkgError;
use super::tree::{DepTree, DepTreeNode, NodeId};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::debug;

/// Name of the profile used when none is given.
pub const DEFAULT_PROFILE: &str = "default";

/// Parent-free projection of a tree node.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LockRecord {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub package_name: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub package_version: Option<String>,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub dependencies: BTreeMap<String, PackageDescriptor>,

    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub options: Value,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolved_by: Option<String>,

    #[serde(default)]
    pub children: Vec<LockRecord>,
}

impl LockRecord {
    /// Project a whole tree, starting at its root.
    #[must_use]
    pub fn from_tree(tree: &DepTree) -> Self {
        Self::from_node(tree, tree.root())
    }

    fn from_node(tree: &DepTree, id: NodeId) -> Self {
        let node = tree.node(id);
        Self {
            package_name: node.package_name.clone(),
            package_version: node.package_version.clone(),
            dependencies: node.dependencies.clone(),
            options: node.options.clone(),
            resolved_by: node.resolved_by.clone(),
            children: tree
                .children(id)
                .iter()
                .map(|c| Self::from_node(tree, *c))
                .collect(),
        }
    }

    /// Rebuild a tree, reattaching parent links.
    ///
    /// # Errors
    ///
    /// Returns `PKG_LOCK_INVALID` if the root carries a name or a node has two
    /// children with the same name.
    pub fn to_tree(&self) -> Result<DepTree, PkgError> {
        if self.package_name.is_some() || self.package_version.is_some() {
            return Err(PkgError::lock_invalid(
                "Lock root must not carry a package name or version",
            ));
        }

        let mut tree = DepTree::new();
        for child in &self.children {
            child.attach(&mut tree, NodeId::ROOT)?;
        }
        Ok(tree)
    }

    fn attach(&self, tree: &mut DepTree, parent: NodeId) -> Result<(), PkgError> {
        let mut node = DepTreeNode::default()
            .with_dependencies(self.dependencies.clone())
            .with_options(self.options.clone());
        node.package_name.clone_from(&self.package_name);
        node.package_version.clone_from(&self.package_version);
        node.resolved_by.clone_from(&self.resolved_by);
        let id = tree
            .add_child(parent, node)
            .map_err(|e| PkgError::lock_invalid(e.message().to_string()))?;
        for child in &self.children {
            child.attach(tree, id)?;
        }
        Ok(())
    }

    /// BLAKE3 digest of the canonical JSON form.
    ///
    /// # Errors
    ///
    /// Returns `PKG_LOCK_WRITE_FAILED` if serialization fails.
    pub fn content_hash(&self) -> Result<String, PkgError> {
        let json = serde_json::to_string(self)
            .map_err(|e| PkgError::lock_write_failed(format!("Failed to serialize lock: {e}")))?;
        Ok(grove_util::hash::blake3_bytes(json.as_bytes()))
    }
}

/// Persists and reloads one lock profile.
pub trait LockStore: Send + Sync {
    fn exists(&self) -> bool;

    /// # Errors
    ///
    /// Returns `PKG_LOCK_INVALID` if the lock is missing or malformed.
    fn load(&self) -> Result<DepTree, PkgError>;

    /// # Errors
    ///
    /// Returns `PKG_LOCK_WRITE_FAILED` if the lock cannot be written.
    fn save(&self, tree: &DepTree) -> Result<(), PkgError>;
}

/// JSON lock file on disk, written atomically.
#[derive(Debug, Clone)]
pub struct FsLockStore {
    path: PathBuf,
}

impl FsLockStore {
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Store for `profile` inside `project_root`.
    #[must_use]
    pub fn for_profile(project_root: &Path, profile: &str) -> Self {
        Self::new(project_root.join(lock_file_name(profile)))
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// `grove.lock` for the default profile, `grove.<profile>.lock` otherwise.
#[must_use]
pub fn lock_file_name(profile: &str) -> String {
    if profile == DEFAULT_PROFILE {
        "grove.lock".to_string()
    } else {
        format!("grove.{profile}.lock")
    }
}

impl LockStore for FsLockStore {
    fn exists(&self) -> bool {
        self.path.is_file()
    }

    fn load(&self) -> Result<DepTree, PkgError> {
        let content = fs::read_to_string(&self.path).map_err(|e| {
            if e.kind() == io::ErrorKind::NotFound {
                PkgError::lock_invalid(format!("Lock file not found: {}", self.path.display()))
            } else {
                PkgError::lock_invalid(format!("Failed to read lock file: {e}"))
            }
        })?;

        let record: LockRecord = serde_json::from_str(&content)
            .map_err(|e| PkgError::lock_invalid(format!("Invalid lock file JSON: {e}")))?;

        debug!(path = %self.path.display(), "Loaded lock file");
        record.to_tree()
    }

    fn save(&self, tree: &DepTree) -> Result<(), PkgError> {
        let content = serde_json::to_string_pretty(&LockRecord::from_tree(tree))
            .map_err(|e| PkgError::lock_write_failed(format!("Failed to serialize lock: {e}")))?;

        grove_util::fs::atomic_write(&self.path, content.as_bytes())
            .map_err(|e| PkgError::lock_write_failed(format!("Failed to write lock file: {e}")))?;

        debug!(path = %self.path.display(), "Wrote lock file");
        Ok(())
    }
}

/// Project-scoped lock stores keyed by profile name.
#[derive(Clone, Default)]
pub struct LockStores {
    items: BTreeMap<String, Arc<dyn LockStore>>,
}

impl LockStores {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, profile: impl Into<String>, store: Arc<dyn LockStore>) {
        self.items.insert(profile.into(), store);
    }

    #[must_use]
    pub fn get(&self, profile: &str) -> Option<Arc<dyn LockStore>> {
        self.items.get(profile).cloned()
    }

    #[must_use]
    pub fn contains(&self, profile: &str) -> bool {
        self.items.contains_key(profile)
    }
}

impl fmt::Debug for LockStores {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.items.keys()).finish()
    }
}
