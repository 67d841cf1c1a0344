use crate::config::Channel;
use crate::version::SCHEMA_VERSION;
use std::path::{Path, PathBuf};

/// Project manifest filename.
pub const MANIFEST_NAME: &str = "grove.json";

/// Environment variable to override the cache directory.
pub const CACHE_DIR_ENV: &str = "GROVE_CACHE_DIR";

/// Find the project root by walking up from `cwd` looking for `grove.json`.
///
/// Returns the first directory containing the manifest, or `None`.
#[must_use]
pub fn project_root(cwd: &Path) -> Option<PathBuf> {
    let mut current = cwd.to_path_buf();

    loop {
        if current.join(MANIFEST_NAME).is_file() {
            return Some(current);
        }

        if !current.pop() {
            return None;
        }
    }
}

/// Get the cache directory for grove.
///
/// Uses platform-appropriate locations with versioning:
/// - Linux: `$XDG_CACHE_HOME/grove/v{N}/{channel}` or `~/.cache/grove/v{N}/{channel}`
/// - macOS: `~/Library/Caches/grove/v{N}/{channel}`
/// - Windows: `%LOCALAPPDATA%\grove\cache\v{N}\{channel}`
///
/// `GROVE_CACHE_DIR` replaces the platform base when set.
#[must_use]
pub fn cache_dir(channel: Channel) -> PathBuf {
    let base = std::env::var_os(CACHE_DIR_ENV).map_or_else(
        || {
            dirs_next::cache_dir().map_or_else(
                || {
                    dirs_next::home_dir().map_or_else(
                        || PathBuf::from(".grove-cache"),
                        |p| p.join(".cache").join("grove"),
                    )
                },
                |p| p.join("grove"),
            )
        },
        PathBuf::from,
    );

    base.join(format!("v{SCHEMA_VERSION}"))
        .join(channel.as_str())
}

/// Resolve `path` against `base` unless it is already absolute.
#[must_use]
pub fn normalize_path(base: &Path, path: &str) -> PathBuf {
    let p = Path::new(path);
    if p.is_absolute() {
        p.to_path_buf()
    } else {
        base.join(p)
    }
}
