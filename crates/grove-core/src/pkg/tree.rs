//! Resolved dependency tree.
//!
//! Nodes live in an arena owned by [`DepTree`]. Ownership flows from parent to
//! children through `children`; `parent` is a navigation-only index.

use super::descriptor::PackageDescriptor;
use super::error::PkgError;
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt::Write;

/// Index of a node inside its [`DepTree`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(usize);

impl NodeId {
    /// The synthetic root is always the first node.
    pub const ROOT: NodeId = NodeId(0);

    #[must_use]
    pub fn index(self) -> usize {
        self.0
    }
}

/// One resolved package occurrence.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct DepTreeNode {
    pub package_name: Option<String>,
    pub package_version: Option<String>,
    pub dependencies: BTreeMap<String, PackageDescriptor>,
    pub options: Value,
    pub resolved_by: Option<String>,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
}

impl DepTreeNode {
    /// Create a package node.
    #[must_use]
    pub fn package(
        name: impl Into<String>,
        version: impl Into<String>,
        resolved_by: impl Into<String>,
    ) -> Self {
        Self {
            package_name: Some(name.into()),
            package_version: Some(version.into()),
            resolved_by: Some(resolved_by.into()),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_dependencies(mut self, dependencies: BTreeMap<String, PackageDescriptor>) -> Self {
        self.dependencies = dependencies;
        self
    }

    #[must_use]
    pub fn with_options(mut self, options: Value) -> Self {
        self.options = options;
        self
    }

    #[must_use]
    pub fn parent(&self) -> Option<NodeId> {
        self.parent
    }

    #[must_use]
    pub fn children(&self) -> &[NodeId] {
        &self.children
    }

    /// Whether the node carries everything extraction needs.
    #[must_use]
    pub fn is_installable(&self) -> bool {
        self.package_name.is_some() && self.package_version.is_some() && self.resolved_by.is_some()
    }

    /// Look up a lifecycle script from `options.scripts`.
    #[must_use]
    pub fn script(&self, name: &str) -> Option<&str> {
        self.options.get("scripts")?.get(name)?.as_str()
    }

    /// The `bin` entry from options, if any.
    #[must_use]
    pub fn bin(&self) -> Option<&Value> {
        self.options.get("bin").filter(|v| !v.is_null())
    }

    fn label(&self) -> String {
        match (&self.package_name, &self.package_version) {
            (Some(name), Some(version)) => format!("{name}@{version}"),
            (Some(name), None) => name.clone(),
            _ => "<root>".to_string(),
        }
    }
}

/// Arena-backed dependency tree with a synthetic root.
#[derive(Debug, Clone)]
pub struct DepTree {
    nodes: Vec<DepTreeNode>,
}

impl Default for DepTree {
    fn default() -> Self {
        Self::new()
    }
}

impl DepTree {
    /// Create a tree holding only the root.
    #[must_use]
    pub fn new() -> Self {
        Self {
            nodes: vec![DepTreeNode::default()],
        }
    }

    #[must_use]
    pub fn root(&self) -> NodeId {
        NodeId::ROOT
    }

    /// Get a node by id.
    ///
    /// Ids are only handed out by this tree, so indexing cannot go out of bounds.
    #[must_use]
    pub fn node(&self, id: NodeId) -> &DepTreeNode {
        &self.nodes[id.0]
    }

    #[must_use]
    pub fn children(&self, id: NodeId) -> &[NodeId] {
        &self.nodes[id.0].children
    }

    #[must_use]
    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.nodes[id.0].parent
    }

    /// Number of nodes including the root.
    #[must_use]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nodes.len() == 1
    }

    /// Find the direct child of `id` with the given package name.
    #[must_use]
    pub fn child_by_name(&self, id: NodeId, name: &str) -> Option<NodeId> {
        self.children(id)
            .iter()
            .copied()
            .find(|c| self.node(*c).package_name.as_deref() == Some(name))
    }

    /// Iterate `id` and its ancestors up to the root.
    pub fn ancestry(&self, id: NodeId) -> impl Iterator<Item = NodeId> + '_ {
        std::iter::successors(Some(id), move |n| self.parent(*n))
    }

    /// Append `node` as a child of `parent`.
    ///
    /// # Errors
    ///
    /// Returns `PKG_TREE_CONFLICT` if `parent` already has a child of that name.
    pub fn add_child(&mut self, parent: NodeId, mut node: DepTreeNode) -> Result<NodeId, PkgError> {
        if let Some(name) = node.package_name.as_deref() {
            if self.child_by_name(parent, name).is_some() {
                return Err(PkgError::tree_conflict(&self.node(parent).label(), name));
            }
        }

        let id = NodeId(self.nodes.len());
        node.parent = Some(parent);
        node.children.clear();
        self.nodes.push(node);
        self.nodes[parent.0].children.push(id);
        Ok(id)
    }

    /// Iterate every non-root node in insertion order.
    pub fn packages(&self) -> impl Iterator<Item = (NodeId, &DepTreeNode)> {
        self.nodes
            .iter()
            .enumerate()
            .skip(1)
            .map(|(i, n)| (NodeId(i), n))
    }

    /// Render an indented listing, children sorted by name.
    #[must_use]
    pub fn render(&self) -> String {
        let mut out = String::new();
        self.render_into(&mut out, NodeId::ROOT, 0);
        out
    }

    fn render_into(&self, out: &mut String, id: NodeId, depth: usize) {
        let node = self.node(id);
        let _ = write!(out, "{}{}", "  ".repeat(depth), node.label());
        if let Some(resolver) = node.resolved_by.as_deref() {
            let _ = write!(out, " ({resolver})");
        }
        out.push('\n');

        let mut children = self.children(id).to_vec();
        children.sort_by(|a, b| self.node(*a).package_name.cmp(&self.node(*b).package_name));
        for child in children {
            self.render_into(out, child, depth + 1);
        }
    }
}
