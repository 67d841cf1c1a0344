//! Resolver for packages on the local filesystem (`file:<path>`).
//!
//! The path points at a package folder or a gzipped tarball and is resolved
//! against the project root. Its `package.json` supplies the version, the
//! dependencies and the `bin`/`scripts` entries.

use super::descriptor::PackageDescriptor;
use super::error::PkgError;
use super::resolver::{DependencyResolver, PackageMetadata};
use super::tarball::{read_package_json, spawn_fs, unpack_tgz};
use super::tree::DepTreeNode;
use crate::paths::normalize_path;
use futures::future::BoxFuture;
use serde_json::{json, Map, Value};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Version reported when `package.json` has none.
const FALLBACK_VERSION: &str = "1.0.0";

pub struct FileResolver {
    name: String,
    base_path: PathBuf,
    dep_properties: Vec<String>,
}

impl FileResolver {
    /// Manifest sections merged into a package's dependencies by default.
    pub const DEP_PROPERTIES: [&'static str; 1] = ["dependencies"];

    #[must_use]
    pub fn new(name: impl Into<String>, base_path: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            base_path: base_path.into(),
            dep_properties: Self::DEP_PROPERTIES.iter().map(|s| (*s).to_string()).collect(),
        }
    }

    /// Read dependencies from these `package.json` sections, later sections
    /// overriding earlier ones.
    #[must_use]
    pub fn with_dep_properties<I, S>(mut self, properties: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.dep_properties = properties.into_iter().map(Into::into).collect();
        self
    }

    fn source_path(&self, file_path: &str) -> PathBuf {
        normalize_path(&self.base_path, file_path)
    }

    async fn metadata(
        &self,
        name: &str,
        descriptor: &PackageDescriptor,
    ) -> Result<PackageMetadata, PkgError> {
        let file_path = descriptor.arg_str("filePath").ok_or_else(|| {
            PkgError::spec_invalid(format!("Missing file path for '{name}'"))
        })?;
        let module_name = descriptor.arg_str("moduleName").unwrap_or(name);
        let source = self.source_path(file_path);
        debug!(package = %module_name, path = %source.display(), "Reading local package");

        let manifest =
            spawn_fs(PkgError::resolution_failed, move || read_manifest(&source)).await?;

        let mut dependencies = BTreeMap::new();
        for property in &self.dep_properties {
            if let Some(section) = manifest.get(property).and_then(Value::as_object) {
                dependencies.extend(section.iter().map(|(k, v)| (k.clone(), v.clone())));
            }
        }

        let mut options = Map::new();
        options.insert("filePath".to_string(), json!(file_path));
        for field in ["bin", "scripts"] {
            if let Some(value) = manifest.get(field).filter(|v| !v.is_null()) {
                options.insert(field.to_string(), value.clone());
            }
        }

        Ok(PackageMetadata {
            name: module_name.to_string(),
            version: manifest
                .get("version")
                .and_then(Value::as_str)
                .unwrap_or(FALLBACK_VERSION)
                .to_string(),
            dependencies,
            options: Value::Object(options),
        })
    }

    async fn unpack(&self, target_dir: &Path, node: &DepTreeNode) -> Result<(), PkgError> {
        let file_path = node
            .options
            .get("filePath")
            .and_then(Value::as_str)
            .ok_or_else(|| {
                PkgError::extract_failed(format!(
                    "No file path recorded for {}",
                    node.package_name.as_deref().unwrap_or_default()
                ))
            })?;
        let source = self.source_path(file_path);
        let dest = target_dir.to_path_buf();
        spawn_fs(PkgError::extract_failed, move || unpack_source(&source, &dest)).await
    }
}

fn read_manifest(source: &Path) -> Result<Value, PkgError> {
    if source.is_dir() {
        let manifest = source.join("package.json");
        let content = fs::read_to_string(&manifest).map_err(|e| {
            PkgError::resolution_failed(format!("Failed to read {}: {e}", manifest.display()))
        })?;
        return serde_json::from_str(&content).map_err(|e| {
            PkgError::resolution_failed(format!("Invalid {}: {e}", manifest.display()))
        });
    }

    let bytes = fs::read(source).map_err(|e| {
        PkgError::resolution_failed(format!("Failed to read {}: {e}", source.display()))
    })?;
    read_package_json(&bytes)
}

/// Copy a package folder or unpack a tarball into `dest`.
fn unpack_source(source: &Path, dest: &Path) -> Result<(), PkgError> {
    if source.is_dir() {
        let files = grove_util::fs::copy_dir_all(source, dest).map_err(|e| {
            PkgError::extract_failed(format!("Failed to copy {}: {e}", source.display()))
        })?;
        debug!(path = %source.display(), files, "Copied local package");
        return Ok(());
    }

    let bytes = fs::read(source).map_err(|e| {
        PkgError::extract_failed(format!("Failed to read {}: {e}", source.display()))
    })?;
    unpack_tgz(&bytes, dest)?;
    Ok(())
}

impl DependencyResolver for FileResolver {
    fn parse_dependency_item(
        &self,
        name: &str,
        description: &str,
    ) -> Result<PackageDescriptor, PkgError> {
        if description.trim().is_empty() {
            return Err(PkgError::spec_invalid(format!("Empty file path for '{name}'")));
        }
        Ok(PackageDescriptor::new(
            self.name.clone(),
            json!({ "filePath": description, "moduleName": name }),
        ))
    }

    fn get_metadata<'a>(
        &'a self,
        name: &'a str,
        descriptor: &'a PackageDescriptor,
    ) -> BoxFuture<'a, Result<PackageMetadata, PkgError>> {
        Box::pin(self.metadata(name, descriptor))
    }

    fn extract<'a>(
        &'a self,
        target_dir: &'a Path,
        node: &'a DepTreeNode,
    ) -> BoxFuture<'a, Result<(), PkgError>> {
        Box::pin(self.unpack(target_dir, node))
    }
}
