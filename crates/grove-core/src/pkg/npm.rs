//! Resolver backed by an npm-compatible registry.

use super::cache::{item_key, ContentCache};
use super::descriptor::PackageDescriptor;
use super::error::PkgError;
use super::registry::{get_tarball_url, get_version_manifest, RegistryClient};
use super::resolver::{DependencyResolver, PackageMetadata};
use super::tarball::{download_tarball, spawn_fs, unpack_tgz, MAX_TARBALL_SIZE};
use super::tree::DepTreeNode;
use super::version::resolve_version;
use bytes::Bytes;
use futures::future::BoxFuture;
use serde_json::{json, Map, Value};
use std::collections::BTreeMap;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, warn};

/// Version fields carried into node options.
const OPTION_FIELDS: [&str; 3] = ["bin", "dist", "scripts"];

pub struct NpmResolver {
    name: String,
    registry: RegistryClient,
    cache: Option<Arc<dyn ContentCache>>,
}

impl NpmResolver {
    #[must_use]
    pub fn new(name: impl Into<String>, registry: RegistryClient) -> Self {
        Self {
            name: name.into(),
            registry,
            cache: None,
        }
    }

    /// Keep downloaded tarballs in `cache`, keyed by `name#version`.
    #[must_use]
    pub fn with_cache(mut self, cache: Arc<dyn ContentCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    /// Cache folder for a registry under `cache_base`: the registry URL with
    /// every `/` replaced by `%2f`.
    #[must_use]
    pub fn cache_root(cache_base: &Path, registry_url: &str) -> PathBuf {
        cache_base.join(registry_url.replace('/', "%2f"))
    }

    #[must_use]
    pub fn registry(&self) -> &RegistryClient {
        &self.registry
    }

    async fn metadata(
        &self,
        key: &str,
        descriptor: &PackageDescriptor,
    ) -> Result<PackageMetadata, PkgError> {
        let package = descriptor.arg_str("packageName").unwrap_or(key);
        let range = descriptor.arg_str("packageVersion");
        debug!(package, range = range.unwrap_or(""), "Get metadata");

        let packument = self.registry.fetch_packument(package).await?;
        let version = resolve_version(&packument, range)?;
        let manifest = get_version_manifest(&packument, &version)
            .ok_or_else(|| PkgError::version_not_found(package, &version))?;

        let dependencies: BTreeMap<String, Value> = manifest
            .get("dependencies")
            .and_then(Value::as_object)
            .map(|deps| deps.iter().map(|(k, v)| (k.clone(), v.clone())).collect())
            .unwrap_or_default();

        let options: Map<String, Value> = OPTION_FIELDS
            .iter()
            .filter_map(|field| {
                manifest
                    .get(*field)
                    .filter(|v| !v.is_null())
                    .map(|v| ((*field).to_string(), v.clone()))
            })
            .collect();

        Ok(PackageMetadata {
            name: manifest
                .get("name")
                .and_then(Value::as_str)
                .unwrap_or(package)
                .to_string(),
            version,
            dependencies,
            options: Value::Object(options),
        })
    }

    /// Tarball bytes for `node`, from the cache when possible.
    async fn tarball(&self, node: &DepTreeNode) -> Result<Bytes, PkgError> {
        let name = node.package_name.as_deref().unwrap_or_default();
        let version = node.package_version.as_deref().unwrap_or_default();
        let key = item_key(name, version);

        if let Some(cache) = &self.cache {
            if cache.has(&key) {
                // A corrupt item is evicted by the cache and the error surfaced as is.
                let bytes = read_cached(cache.as_ref(), &key).map_err(|e| {
                    warn!(package = %name, version = %version, error = %e, "Cached tarball rejected");
                    e
                })?;
                debug!(package = %name, version = %version, "Tarball cache hit");
                return Ok(bytes);
            } else {
                debug!(package = %name, version = %version, "Tarball cache miss");
            }
        }

        let url = node
            .options
            .get("dist")
            .and_then(get_tarball_url)
            .ok_or_else(|| {
                PkgError::download_failed(format!("No tarball URL for {name}@{version}"))
            })?;

        let bytes = self
            .registry
            .gate()
            .acquire(download_tarball(self.registry.http(), url, MAX_TARBALL_SIZE))
            .await?;

        if let Some(cache) = &self.cache {
            cache.write(&key, &mut &bytes[..])?;
        }
        Ok(bytes)
    }
}

fn read_cached(cache: &dyn ContentCache, key: &str) -> Result<Bytes, PkgError> {
    let mut reader = cache.read(key)?;
    let mut buf = Vec::new();
    reader
        .read_to_end(&mut buf)
        .map_err(|e| PkgError::cache_error(format!("Failed to read cache item {key}: {e}")))?;
    Ok(Bytes::from(buf))
}

impl DependencyResolver for NpmResolver {
    fn parse_dependency_item(
        &self,
        name: &str,
        description: &str,
    ) -> Result<PackageDescriptor, PkgError> {
        Ok(PackageDescriptor::new(
            self.name.clone(),
            json!({ "packageName": name, "packageVersion": description }),
        )
        .with_sem_version(description))
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
        Box::pin(async move {
            let bytes = self.tarball(node).await?;
            let dest = target_dir.to_path_buf();
            let files =
                spawn_fs(PkgError::extract_failed, move || unpack_tgz(&bytes, &dest)).await?;
            debug!(
                package = node.package_name.as_deref().unwrap_or_default(),
                files,
                "Unpacked tarball"
            );
            Ok(())
        })
    }
}
