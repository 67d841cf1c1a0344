//! Tarball download and extraction.

use super::error::PkgError;
use bytes::Bytes;
use flate2::read::GzDecoder;
use reqwest::Client;
use std::fs::{self, File};
use std::io::{self, Read};
use std::path::{Component, Path, PathBuf};
use std::time::Duration;
use tar::Archive;

/// Maximum tarball size (200 MB).
pub const MAX_TARBALL_SIZE: u64 = 200 * 1024 * 1024;

/// Download timeout in seconds.
const DOWNLOAD_TIMEOUT_SECS: u64 = 30;

/// Download a tarball from a URL.
///
/// # Errors
/// Returns an error if the download fails or exceeds the size limit.
pub async fn download_tarball(client: &Client, url: &str, max_bytes: u64) -> Result<Bytes, PkgError> {
    let response = client
        .get(url)
        .timeout(Duration::from_secs(DOWNLOAD_TIMEOUT_SECS))
        .send()
        .await
        .map_err(|e| PkgError::download_failed(format!("Failed to download '{url}': {e}")))?;

    if !response.status().is_success() {
        return Err(PkgError::download_failed(format!(
            "Download failed with status {} for '{url}'",
            response.status()
        )));
    }

    if let Some(len) = response.content_length() {
        if len > max_bytes {
            return Err(PkgError::download_failed(format!(
                "Tarball too large: {len} bytes (max: {max_bytes})"
            )));
        }
    }

    let bytes = response
        .bytes()
        .await
        .map_err(|e| PkgError::download_failed(format!("Failed to read response body: {e}")))?;

    if bytes.len() as u64 > max_bytes {
        return Err(PkgError::download_failed(format!(
            "Tarball too large: {} bytes (max: {max_bytes})",
            bytes.len()
        )));
    }

    Ok(bytes)
}

/// Run filesystem work on the blocking thread pool.
///
/// A panicking or cancelled job becomes `fail(message)`.
pub(crate) async fn spawn_fs<T, F>(fail: fn(String) -> PkgError, work: F) -> Result<T, PkgError>
where
    F: FnOnce() -> Result<T, PkgError> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(work)
        .await
        .map_err(|e| fail(format!("Filesystem job failed: {e}")))?
}

/// Unpack a gzipped tarball into `dest`.
///
/// When every entry shares one top-level folder (`package/` for registry
/// tarballs), that folder is stripped. Symlinks and other special entries are
/// skipped. Returns the number of files written.
///
/// # Errors
/// Returns `PKG_EXTRACT_FAILED` for unreadable archives, absolute paths or
/// entries escaping `dest`.
pub fn unpack_tgz(bytes: &[u8], dest: &Path) -> Result<usize, PkgError> {
    let strip = common_root(bytes)?.is_some();
    fs::create_dir_all(dest)?;

    let mut archive = Archive::new(GzDecoder::new(bytes));
    let mut written = 0;

    for entry in archive
        .entries()
        .map_err(|e| PkgError::extract_failed(format!("Failed to read tarball entries: {e}")))?
    {
        let mut entry = entry
            .map_err(|e| PkgError::extract_failed(format!("Failed to read tarball entry: {e}")))?;
        let path = entry
            .path()
            .map_err(|e| PkgError::extract_failed(format!("Failed to read entry path: {e}")))?
            .into_owned();

        let rel = sanitize(&path, strip)?;
        if rel.as_os_str().is_empty() {
            continue;
        }
        let dest_path = dest.join(&rel);

        let kind = entry.header().entry_type();
        if kind.is_dir() {
            fs::create_dir_all(&dest_path)?;
        } else if kind.is_file() {
            if let Some(parent) = dest_path.parent() {
                fs::create_dir_all(parent)?;
            }
            let mut file = File::create(&dest_path)?;
            io::copy(&mut entry, &mut file)?;
            written += 1;

            #[cfg(unix)]
            {
                use std::os::unix::fs::PermissionsExt;
                if let Ok(mode) = entry.header().mode() {
                    let _ = fs::set_permissions(&dest_path, fs::Permissions::from_mode(mode | 0o600));
                }
            }
        }
    }

    Ok(written)
}

/// Read `package.json` from a gzipped tarball, at the top level or inside the
/// single top-level folder.
///
/// # Errors
/// Returns `PKG_EXTRACT_FAILED` if the archive is unreadable or has no
/// parseable `package.json`.
pub fn read_package_json(bytes: &[u8]) -> Result<serde_json::Value, PkgError> {
    let mut archive = Archive::new(GzDecoder::new(bytes));

    for entry in archive
        .entries()
        .map_err(|e| PkgError::extract_failed(format!("Failed to read tarball entries: {e}")))?
    {
        let mut entry = entry
            .map_err(|e| PkgError::extract_failed(format!("Failed to read tarball entry: {e}")))?;
        if !entry.header().entry_type().is_file() {
            continue;
        }

        let is_manifest = entry.path().is_ok_and(|p| {
            let parts: Vec<Component<'_>> = p.components().collect();
            matches!(parts.as_slice(), [Component::Normal(n)] if *n == "package.json")
                || matches!(parts.as_slice(), [Component::Normal(_), Component::Normal(n)] if *n == "package.json")
        });
        if !is_manifest {
            continue;
        }

        let mut content = String::new();
        entry
            .read_to_string(&mut content)
            .map_err(|e| PkgError::extract_failed(format!("Failed to read package.json: {e}")))?;
        return serde_json::from_str(&content)
            .map_err(|e| PkgError::extract_failed(format!("Invalid package.json in tarball: {e}")));
    }

    Err(PkgError::extract_failed("No package.json found in tarball"))
}

/// The single top-level folder shared by all entries, if any.
fn common_root(bytes: &[u8]) -> Result<Option<PathBuf>, PkgError> {
    let mut archive = Archive::new(GzDecoder::new(bytes));
    let mut root: Option<PathBuf> = None;

    for entry in archive
        .entries()
        .map_err(|e| PkgError::extract_failed(format!("Failed to read tarball entries: {e}")))?
    {
        let entry = entry
            .map_err(|e| PkgError::extract_failed(format!("Failed to read tarball entry: {e}")))?;
        let path = entry
            .path()
            .map_err(|e| PkgError::extract_failed(format!("Failed to read entry path: {e}")))?;

        let mut components = path.components().filter(|c| !matches!(c, Component::CurDir));
        let (Some(Component::Normal(first)), has_rest) = (components.next(), components.next().is_some())
        else {
            return Ok(None);
        };
        if !has_rest && !entry.header().entry_type().is_dir() {
            return Ok(None);
        }

        match &root {
            None => root = Some(PathBuf::from(first)),
            Some(existing) if existing.as_os_str() == first => {}
            Some(_) => return Ok(None),
        }
    }

    Ok(root)
}

fn sanitize(path: &Path, strip: bool) -> Result<PathBuf, PkgError> {
    let display = path.to_string_lossy();
    let mut out = PathBuf::new();

    for component in path.components() {
        match component {
            Component::Normal(part) => out.push(part),
            Component::CurDir => {}
            Component::ParentDir => {
                return Err(PkgError::extract_failed(format!(
                    "Tarball contains path traversal: {display}"
                )));
            }
            Component::RootDir | Component::Prefix(_) => {
                return Err(PkgError::extract_failed(format!(
                    "Tarball contains absolute path: {display}"
                )));
            }
        }
    }

    if strip {
        let mut parts = out.components();
        parts.next();
        return Ok(parts.as_path().to_path_buf());
    }
    Ok(out)
}
