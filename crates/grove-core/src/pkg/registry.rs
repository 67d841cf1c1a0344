//! npm registry client.

use super::error::PkgError;
use crate::gate::{Gate, NETWORK_LIMIT};
use reqwest::Client;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::OnceCell;
use tracing::{debug, trace};
use url::Url;

/// Default npm registry URL.
pub const DEFAULT_REGISTRY: &str = "https://registry.npmjs.org/";

/// Environment variable to override registry URL.
pub const REGISTRY_ENV: &str = "GROVE_NPM_REGISTRY";

type PackumentCell = Arc<OnceCell<Result<Arc<Value>, PkgError>>>;

/// Registry client for fetching package metadata.
///
/// Every request goes through the network gate. Packuments are fetched at most
/// once per package name; concurrent callers for the same name share the
/// in-flight request and its outcome.
#[derive(Debug, Clone)]
pub struct RegistryClient {
    base_url: Url,
    http: Client,
    gate: Gate,
    packuments: Arc<Mutex<HashMap<String, PackumentCell>>>,
}

impl RegistryClient {
    /// Create a new registry client with the given base URL.
    ///
    /// # Errors
    /// Returns an error if the URL is invalid or the HTTP client cannot be created.
    pub fn new(base_url: &str) -> Result<Self, PkgError> {
        // Url::join drops the last segment unless the base ends with '/'.
        let normalized = if base_url.ends_with('/') {
            base_url.to_string()
        } else {
            format!("{base_url}/")
        };
        let base_url = Url::parse(&normalized)
            .map_err(|e| PkgError::registry(format!("Invalid registry URL '{base_url}': {e}")))?;

        let http = Client::builder()
            .connect_timeout(Duration::from_secs(5))
            .timeout(Duration::from_secs(15))
            .user_agent(concat!("grove/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| PkgError::registry(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self {
            base_url,
            http,
            gate: Gate::new(NETWORK_LIMIT),
            packuments: Arc::new(Mutex::new(HashMap::new())),
        })
    }

    /// Create a client using the registry URL from environment or default.
    ///
    /// # Errors
    /// Returns an error if the client cannot be created.
    pub fn from_env() -> Result<Self, PkgError> {
        let url = std::env::var(REGISTRY_ENV).unwrap_or_else(|_| DEFAULT_REGISTRY.to_string());
        Self::new(&url)
    }

    /// Replace the HTTP client.
    #[must_use]
    pub fn with_http(mut self, http: Client) -> Self {
        self.http = http;
        self
    }

    /// Replace the network gate, e.g. to share it between registries.
    #[must_use]
    pub fn with_gate(mut self, gate: Gate) -> Self {
        self.gate = gate;
        self
    }

    /// Get the base URL.
    #[must_use]
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Get the HTTP client (for reuse in tarball downloads).
    #[must_use]
    pub fn http(&self) -> &Client {
        &self.http
    }

    #[must_use]
    pub fn gate(&self) -> &Gate {
        &self.gate
    }

    /// URL of the packument for `name`. Scoped names keep their `@` and have
    /// the `/` encoded.
    ///
    /// # Errors
    /// Returns `PKG_REGISTRY_ERROR` if the URL cannot be built.
    pub fn packument_url(&self, name: &str) -> Result<Url, PkgError> {
        let encoded_name = if name.starts_with('@') {
            name.replace('/', "%2F")
        } else {
            name.to_string()
        };

        self.base_url
            .join(&encoded_name)
            .map_err(|e| PkgError::registry(format!("Failed to build URL for '{name}': {e}")))
    }

    /// Fetch the packument (package metadata) for a package, once per name.
    ///
    /// # Errors
    /// Returns an error if the request fails or the package is not found.
    /// A failure is remembered like a success.
    pub async fn fetch_packument(&self, name: &str) -> Result<Arc<Value>, PkgError> {
        let cell = {
            let mut packuments = self
                .packuments
                .lock()
                .map_err(|_| PkgError::registry("Packument table poisoned"))?;
            Arc::clone(packuments.entry(name.to_string()).or_default())
        };

        if cell.initialized() {
            trace!(package = %name, "Packument served from memory");
        }

        cell.get_or_init(|| async {
            self.gate
                .acquire(self.request_packument(name))
                .await
                .map(Arc::new)
        })
        .await
        .clone()
    }

    async fn request_packument(&self, name: &str) -> Result<Value, PkgError> {
        let url = self.packument_url(name)?;
        debug!(package = %name, url = %url, "Fetching packument");

        let response = self.http.get(url.as_str()).send().await?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Err(PkgError::not_found(name));
        }

        if !response.status().is_success() {
            return Err(PkgError::registry(format!(
                "Registry returned status {} for '{name}'",
                response.status()
            )));
        }

        let json: Value = response.json().await?;
        Ok(json)
    }
}

/// Extract the version object for a specific version.
#[must_use]
pub fn get_version_manifest<'a>(packument: &'a Value, version: &str) -> Option<&'a Value> {
    packument.get("versions")?.get(version)
}

/// Extract the tarball URL from a version's `dist` field.
#[must_use]
pub fn get_tarball_url(dist: &Value) -> Option<&str> {
    dist.get("tarball")?.as_str()
}
