//! Executable links for package `bin` entries.

use super::error::PkgError;
use super::tree::DepTreeNode;
use serde_json::Value;
use std::fs;
use std::io;
use std::path::{Component, Path};
use tracing::debug;

/// `(link name, path relative to the package dir)` pairs declared by `node`.
///
/// A string `bin` is linked under the package name without its scope; a map
/// links each key.
///
/// # Errors
///
/// Returns `PKG_LINK_FAILED` for a `bin` that is neither a string nor a map,
/// for a link name that is not a plain file name, and for a path that leaves
/// the package dir.
pub fn bin_entries(node: &DepTreeNode) -> Result<Vec<(String, String)>, PkgError> {
    let name = node.package_name.as_deref().unwrap_or_default();

    let entries = match node.bin() {
        None => return Ok(Vec::new()),
        Some(Value::String(path)) => {
            let link = name.rsplit('/').next().unwrap_or(name);
            vec![(link.to_string(), path.clone())]
        }
        Some(Value::Object(map)) => map
            .iter()
            .filter_map(|(k, v)| v.as_str().map(|p| (k.clone(), p.to_string())))
            .collect(),
        Some(other) => {
            return Err(PkgError::link_failed(format!(
                "Unsupported bin entry for {name}: {other}"
            )))
        }
    };

    for (link, path) in &entries {
        check_link_name(name, link)?;
        check_link_target(name, path)?;
    }
    Ok(entries)
}

fn check_link_name(package: &str, link: &str) -> Result<(), PkgError> {
    if link.is_empty() || link == "." || link == ".." || link.contains(['/', '\\']) {
        return Err(PkgError::link_failed(format!(
            "Invalid bin name for {package}: {link:?}"
        )));
    }
    Ok(())
}

fn check_link_target(package: &str, path: &str) -> Result<(), PkgError> {
    let mut normal = false;
    for component in Path::new(path).components() {
        match component {
            Component::Normal(_) => normal = true,
            Component::CurDir => {}
            Component::ParentDir => {
                return Err(PkgError::link_failed(format!(
                    "Bin path of {package} leaves the package: {path}"
                )))
            }
            Component::RootDir | Component::Prefix(_) => {
                return Err(PkgError::link_failed(format!(
                    "Bin path of {package} is absolute: {path}"
                )))
            }
        }
    }
    if !normal || path.contains('\\') {
        return Err(PkgError::link_failed(format!(
            "Invalid bin path for {package}: {path:?}"
        )));
    }
    Ok(())
}

/// Link every bin entry of `node` (extracted at `package_dir`) into `bin_dir`.
///
/// Link targets are made readable and executable by the owner. A link that
/// already exists is left alone. Returns the number of links created.
///
/// # Errors
///
/// Returns `PKG_LINK_FAILED` on any other I/O failure.
pub fn link_bins(bin_dir: &Path, package_dir: &Path, node: &DepTreeNode) -> Result<usize, PkgError> {
    let entries = bin_entries(node)?;
    if entries.is_empty() {
        return Ok(0);
    }

    fs::create_dir_all(bin_dir).map_err(|e| {
        PkgError::link_failed(format!("Failed to create {}: {e}", bin_dir.display()))
    })?;

    let mut created = 0;
    for (name, rel) in entries {
        let target = package_dir.join(&rel);
        let link = bin_dir.join(&name);

        match create_file_link(&target, &link) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
                debug!(bin = %name, link = %link.display(), "Bin link already exists");
                continue;
            }
            Err(e) => {
                return Err(PkgError::link_failed(format!(
                    "Failed to link {} -> {}: {e}",
                    link.display(),
                    target.display()
                )));
            }
        }

        grove_util::fs::make_executable(&target).map_err(|e| {
            PkgError::link_failed(format!("Failed to mark {} executable: {e}", target.display()))
        })?;

        debug!(bin = %name, target = %target.display(), "Linked bin");
        created += 1;
    }

    Ok(created)
}

fn create_file_link(target: &Path, link: &Path) -> io::Result<()> {
    #[cfg(unix)]
    {
        std::os::unix::fs::symlink(target, link)
    }

    #[cfg(windows)]
    {
        std::os::windows::fs::symlink_file(target, link)
    }
}
