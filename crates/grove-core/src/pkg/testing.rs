//! Fixtures for engine tests: an in-memory resolver, tarball builder and a
//! loopback registry.

use super::descriptor::PackageDescriptor;
use super::error::PkgError;
use super::registry::RegistryClient;
use super::resolver::{DependencyResolver, PackageMetadata};
use super::tree::DepTreeNode;
use futures::future::BoxFuture;
use serde_json::{json, Value};
use std::collections::{BTreeMap, HashMap};
use std::io::{BufRead, BufReader, Write};
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

struct Entry {
    delay: Duration,
    meta: PackageMetadata,
}

/// Answers `(name, range)` lookups from a fixed table, after a fixed delay.
pub(crate) struct FakeResolver {
    name: String,
    semver: bool,
    entries: HashMap<(String, String), Entry>,
    calls: Mutex<Vec<String>>,
    extracted: Mutex<Vec<PathBuf>>,
}

impl FakeResolver {
    pub(crate) fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            semver: true,
            entries: HashMap::new(),
            calls: Mutex::new(Vec::new()),
            extracted: Mutex::new(Vec::new()),
        }
    }

    /// Produce descriptors without a semver range.
    pub(crate) fn without_semver(mut self) -> Self {
        self.semver = false;
        self
    }

    pub(crate) fn package(
        self,
        name: &str,
        range: &str,
        version: &str,
        delay_ms: u64,
        deps: &[(&str, &str)],
    ) -> Self {
        self.package_with_options(name, range, version, delay_ms, deps, Value::Null)
    }

    pub(crate) fn package_with_options(
        mut self,
        name: &str,
        range: &str,
        version: &str,
        delay_ms: u64,
        deps: &[(&str, &str)],
        options: Value,
    ) -> Self {
        let dependencies: BTreeMap<String, Value> = deps
            .iter()
            .map(|(n, r)| ((*n).to_string(), json!(r)))
            .collect();
        self.entries.insert(
            (name.to_string(), range.to_string()),
            Entry {
                delay: Duration::from_millis(delay_ms),
                meta: PackageMetadata {
                    name: name.to_string(),
                    version: version.to_string(),
                    dependencies,
                    options,
                },
            },
        );
        self
    }

    /// Metadata lookups seen so far, as `name@range`.
    pub(crate) fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    /// Directories passed to `extract`, in call order.
    pub(crate) fn extracted(&self) -> Vec<PathBuf> {
        self.extracted.lock().unwrap().clone()
    }
}

impl DependencyResolver for FakeResolver {
    fn parse_dependency_item(
        &self,
        name: &str,
        description: &str,
    ) -> Result<PackageDescriptor, PkgError> {
        let descriptor = PackageDescriptor::new(
            self.name.clone(),
            json!({ "packageName": name, "packageVersion": description }),
        );
        Ok(if self.semver {
            descriptor.with_sem_version(description)
        } else {
            descriptor
        })
    }

    fn get_metadata<'a>(
        &'a self,
        name: &'a str,
        descriptor: &'a PackageDescriptor,
    ) -> BoxFuture<'a, Result<PackageMetadata, PkgError>> {
        Box::pin(async move {
            let range = descriptor.arg_str("packageVersion").unwrap_or_default();
            self.calls.lock().unwrap().push(format!("{name}@{range}"));
            let entry = self
                .entries
                .get(&(name.to_string(), range.to_string()))
                .ok_or_else(|| PkgError::version_not_found(name, range))?;
            tokio::time::sleep(entry.delay).await;
            Ok(entry.meta.clone())
        })
    }

    fn extract<'a>(
        &'a self,
        target_dir: &'a Path,
        node: &'a DepTreeNode,
    ) -> BoxFuture<'a, Result<(), PkgError>> {
        Box::pin(async move {
            std::fs::create_dir_all(target_dir)?;
            let manifest = json!({
                "name": node.package_name,
                "version": node.package_version,
            });
            std::fs::write(target_dir.join("package.json"), manifest.to_string())?;

            let bins: Vec<&str> = match node.bin() {
                Some(Value::String(path)) => vec![path.as_str()],
                Some(Value::Object(map)) => map.values().filter_map(Value::as_str).collect(),
                _ => Vec::new(),
            };
            for bin in bins {
                let path = target_dir.join(bin);
                if let Some(parent) = path.parent() {
                    std::fs::create_dir_all(parent)?;
                }
                std::fs::write(path, "#!/bin/sh\necho ok\n")?;
            }

            self.extracted.lock().unwrap().push(target_dir.to_path_buf());
            Ok(())
        })
    }
}

/// Build a gzipped tarball from `(path, contents)` pairs.
pub(crate) fn make_tgz(entries: &[(&str, &str)]) -> Vec<u8> {
    use flate2::write::GzEncoder;
    use flate2::Compression;

    let mut tar_bytes = Vec::new();
    {
        let mut builder = tar::Builder::new(&mut tar_bytes);
        for (path, data) in entries {
            let mut header = tar::Header::new_gnu();
            header.set_path(path).unwrap();
            header.set_size(data.len() as u64);
            header.set_mode(0o644);
            header.set_cksum();
            builder.append(&header, data.as_bytes()).unwrap();
        }
        builder.finish().unwrap();
    }

    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(&tar_bytes).unwrap();
    encoder.finish().unwrap()
}

type Routes = Arc<Mutex<HashMap<String, (u16, Vec<u8>)>>>;

/// Loopback HTTP server answering fixed routes, counting hits per path.
pub(crate) struct TestRegistry {
    addr: SocketAddr,
    routes: Routes,
    hits: Arc<Mutex<HashMap<String, usize>>>,
}

impl TestRegistry {
    pub(crate) fn start() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let routes: Routes = Arc::default();
        let hits: Arc<Mutex<HashMap<String, usize>>> = Arc::default();

        let (r, h) = (Arc::clone(&routes), Arc::clone(&hits));
        std::thread::spawn(move || {
            for stream in listener.incoming() {
                let Ok(stream) = stream else { break };
                let (r, h) = (Arc::clone(&r), Arc::clone(&h));
                std::thread::spawn(move || serve(stream, &r, &h));
            }
        });

        Self { addr, routes, hits }
    }

    pub(crate) fn url(&self) -> String {
        format!("http://{}/", self.addr)
    }

    pub(crate) fn route(&self, path: &str, status: u16, body: Vec<u8>) {
        self.routes
            .lock()
            .unwrap()
            .insert(path.to_string(), (status, body));
    }

    pub(crate) fn hits(&self, path: &str) -> usize {
        self.hits.lock().unwrap().get(path).copied().unwrap_or(0)
    }

    /// A client for this registry that bypasses any configured proxy.
    pub(crate) fn client(&self) -> RegistryClient {
        RegistryClient::new(&self.url())
            .unwrap()
            .with_http(reqwest::Client::builder().no_proxy().build().unwrap())
    }
}

fn serve(mut stream: TcpStream, routes: &Routes, hits: &Mutex<HashMap<String, usize>>) {
    let mut reader = BufReader::new(stream.try_clone().unwrap());
    let mut request_line = String::new();
    if reader.read_line(&mut request_line).is_err() {
        return;
    }
    loop {
        let mut line = String::new();
        match reader.read_line(&mut line) {
            Ok(0) | Err(_) => break,
            Ok(_) if line == "\r\n" || line == "\n" => break,
            Ok(_) => {}
        }
    }

    let path = request_line
        .split_whitespace()
        .nth(1)
        .unwrap_or("/")
        .to_string();
    *hits.lock().unwrap().entry(path.clone()).or_default() += 1;

    let (status, body) = routes
        .lock()
        .unwrap()
        .get(&path)
        .cloned()
        .unwrap_or((404, b"{}".to_vec()));
    let head = format!(
        "HTTP/1.1 {status} X\r\nContent-Length: {}\r\nContent-Type: application/json\r\nConnection: close\r\n\r\n",
        body.len()
    );
    let _ = stream.write_all(head.as_bytes());
    let _ = stream.write_all(&body);
    let _ = stream.flush();
}
