//! Pluggable package sources.

use super::descriptor::PackageDescriptor;
use super::error::PkgError;
use super::tree::DepTreeNode;
use futures::future::BoxFuture;
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;
use std::sync::Arc;

/// Metadata returned by a resolver for one constraint.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct PackageMetadata {
    pub name: String,
    pub version: String,
    /// Raw declarations, parsed later through [`super::descriptor::convert_dependencies_map`].
    pub dependencies: BTreeMap<String, Value>,
    /// Resolver-specific payload (`bin`, `scripts`, `dist`, ...).
    pub options: Value,
}

/// A package source.
///
/// Implementations must be safe to call concurrently; bounding their own
/// network and file I/O is their responsibility.
pub trait DependencyResolver: Send + Sync {
    /// Turn the part of a declaration after the `resolver:` prefix into a descriptor.
    ///
    /// # Errors
    ///
    /// Returns `PKG_SPEC_INVALID` if the declaration cannot be understood.
    fn parse_dependency_item(
        &self,
        name: &str,
        description: &str,
    ) -> Result<PackageDescriptor, PkgError>;

    /// Resolve a descriptor to a concrete version and its declared dependencies.
    fn get_metadata<'a>(
        &'a self,
        name: &'a str,
        descriptor: &'a PackageDescriptor,
    ) -> BoxFuture<'a, Result<PackageMetadata, PkgError>>;

    /// Materialize the package contents of `node` into `target_dir`.
    fn extract<'a>(
        &'a self,
        target_dir: &'a Path,
        node: &'a DepTreeNode,
    ) -> BoxFuture<'a, Result<(), PkgError>>;
}

/// Project-scoped registry of resolvers keyed by name.
#[derive(Clone, Default)]
pub struct Resolvers {
    items: BTreeMap<String, Arc<dyn DependencyResolver>>,
}

impl Resolvers {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a resolver, replacing any previous one of the same name.
    pub fn insert(&mut self, name: impl Into<String>, resolver: Arc<dyn DependencyResolver>) {
        self.items.insert(name.into(), resolver);
    }

    /// Look up a resolver by name.
    ///
    /// # Errors
    ///
    /// Returns `PKG_RESOLVER_UNKNOWN` if no resolver is registered under `name`.
    pub fn get(&self, name: &str) -> Result<Arc<dyn DependencyResolver>, PkgError> {
        self.items.get(name).cloned().ok_or_else(|| {
            PkgError::new(
                super::error::codes::PKG_RESOLVER_UNKNOWN,
                format!("Resolver not found: {name}"),
            )
        })
    }

    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.items.contains_key(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.items.keys().map(String::as_str)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

impl fmt::Debug for Resolvers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.items.keys()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pkg::error::codes;
    use crate::pkg::testing::FakeResolver;

    #[test]
    fn test_registry_lookup() {
        let mut resolvers = Resolvers::new();
        assert!(resolvers.is_empty());
        resolvers.insert("npm", Arc::new(FakeResolver::new("npm")));

        assert!(resolvers.contains("npm"));
        assert!(resolvers.get("npm").is_ok());
        assert_eq!(resolvers.names().collect::<Vec<_>>(), vec!["npm"]);

        let err = resolvers.get("git").err().unwrap();
        assert_eq!(err.code(), codes::PKG_RESOLVER_UNKNOWN);
    }
}
