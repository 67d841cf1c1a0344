//! Package engine error types.

use std::fmt;
use std::io;

/// Package engine error codes.
pub mod codes {
    pub const PKG_SPEC_INVALID: &str = "PKG_SPEC_INVALID";
    pub const PKG_NOT_FOUND: &str = "PKG_NOT_FOUND";
    pub const PKG_VERSION_NOT_FOUND: &str = "PKG_VERSION_NOT_FOUND";
    pub const PKG_RESOLUTION_FAILED: &str = "PKG_RESOLUTION_FAILED";
    pub const PKG_RESOLVER_UNKNOWN: &str = "PKG_RESOLVER_UNKNOWN";
    pub const PKG_REGISTRY_ERROR: &str = "PKG_REGISTRY_ERROR";
    pub const PKG_DOWNLOAD_FAILED: &str = "PKG_DOWNLOAD_FAILED";
    pub const PKG_EXTRACT_FAILED: &str = "PKG_EXTRACT_FAILED";
    pub const PKG_SCRIPT_FAILED: &str = "PKG_SCRIPT_FAILED";
    pub const PKG_LINK_FAILED: &str = "PKG_LINK_FAILED";
    pub const PKG_CACHE_ERROR: &str = "PKG_CACHE_ERROR";
    pub const PKG_CACHE_INTEGRITY: &str = "PKG_CACHE_INTEGRITY";
    pub const PKG_LOCK_INVALID: &str = "PKG_LOCK_INVALID";
    pub const PKG_LOCK_WRITE_FAILED: &str = "PKG_LOCK_WRITE_FAILED";
    pub const PKG_TREE_CONFLICT: &str = "PKG_TREE_CONFLICT";
}

/// Package engine error.
///
/// `Clone` so a memoized failure can be handed to every waiting caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PkgError {
    code: &'static str,
    message: String,
}

impl PkgError {
    /// Create a new error with the given code and message.
    #[must_use]
    pub fn new(code: &'static str, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    /// Get the error code.
    #[must_use]
    pub fn code(&self) -> &'static str {
        self.code
    }

    /// Get the error message.
    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Create an invalid dependency declaration error.
    pub fn spec_invalid(msg: impl Into<String>) -> Self {
        Self::new(codes::PKG_SPEC_INVALID, msg)
    }

    /// Create a package not found error.
    #[must_use]
    pub fn not_found(name: &str) -> Self {
        Self::new(codes::PKG_NOT_FOUND, format!("Package not found: {name}"))
    }

    /// Create a version not found error.
    #[must_use]
    pub fn version_not_found(name: &str, range: &str) -> Self {
        Self::new(
            codes::PKG_VERSION_NOT_FOUND,
            format!("No version of {name} satisfies range: {range}"),
        )
    }

    /// Create a resolution failed error.
    pub fn resolution_failed(msg: impl Into<String>) -> Self {
        Self::new(codes::PKG_RESOLUTION_FAILED, msg)
    }

    /// Create an unknown resolver error.
    #[must_use]
    pub fn resolver_unknown(resolver: &str, package: &str) -> Self {
        Self::new(
            codes::PKG_RESOLVER_UNKNOWN,
            format!("Unknown resolver '{resolver}' for package {package}"),
        )
    }

    /// Create a registry error.
    pub fn registry(msg: impl Into<String>) -> Self {
        Self::new(codes::PKG_REGISTRY_ERROR, msg)
    }

    /// Create a download failed error.
    pub fn download_failed(msg: impl Into<String>) -> Self {
        Self::new(codes::PKG_DOWNLOAD_FAILED, msg)
    }

    /// Create an extraction failed error.
    pub fn extract_failed(msg: impl Into<String>) -> Self {
        Self::new(codes::PKG_EXTRACT_FAILED, msg)
    }

    /// Create a lifecycle script failure.
    pub fn script_failed(msg: impl Into<String>) -> Self {
        Self::new(codes::PKG_SCRIPT_FAILED, msg)
    }

    /// Create a link failed error.
    pub fn link_failed(msg: impl Into<String>) -> Self {
        Self::new(codes::PKG_LINK_FAILED, msg)
    }

    /// Create a cache error.
    pub fn cache_error(msg: impl Into<String>) -> Self {
        Self::new(codes::PKG_CACHE_ERROR, msg)
    }

    /// Create a cache integrity error.
    #[must_use]
    pub fn cache_integrity(key: &str, expected: &str, actual: &str) -> Self {
        Self::new(
            codes::PKG_CACHE_INTEGRITY,
            format!("Cache item {key} failed integrity check: expected {expected}, got {actual}"),
        )
    }

    /// Create a lock invalid error.
    pub fn lock_invalid(msg: impl Into<String>) -> Self {
        Self::new(codes::PKG_LOCK_INVALID, msg)
    }

    /// Create a lock write failed error.
    pub fn lock_write_failed(msg: impl Into<String>) -> Self {
        Self::new(codes::PKG_LOCK_WRITE_FAILED, msg)
    }

    /// Create a tree conflict error (duplicate child name).
    #[must_use]
    pub fn tree_conflict(parent: &str, name: &str) -> Self {
        Self::new(
            codes::PKG_TREE_CONFLICT,
            format!("{parent} already has a child named {name}"),
        )
    }
}

impl fmt::Display for PkgError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}

impl std::error::Error for PkgError {}

impl From<io::Error> for PkgError {
    fn from(e: io::Error) -> Self {
        Self::new(codes::PKG_CACHE_ERROR, e.to_string())
    }
}

impl From<reqwest::Error> for PkgError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            Self::new(codes::PKG_REGISTRY_ERROR, format!("Request timed out: {e}"))
        } else if e.is_connect() {
            Self::new(codes::PKG_REGISTRY_ERROR, format!("Connection failed: {e}"))
        } else {
            Self::new(codes::PKG_REGISTRY_ERROR, e.to_string())
        }
    }
}

impl From<serde_json::Error> for PkgError {
    fn from(e: serde_json::Error) -> Self {
        Self::new(codes::PKG_REGISTRY_ERROR, format!("Invalid JSON: {e}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_code_format() {
        let err = PkgError::resolver_unknown("git", "left-pad");
        assert_eq!(err.code(), codes::PKG_RESOLVER_UNKNOWN);
        assert!(err.to_string().starts_with("PKG_RESOLVER_UNKNOWN: "));
        assert!(err.message().contains("git"));
    }

    #[test]
    fn test_error_is_clone() {
        let err = PkgError::cache_integrity("a#1.0.0", "aa", "bb");
        let copy = err.clone();
        assert_eq!(err, copy);
    }

    #[test]
    fn test_error_codes_uppercase() {
        let all_codes = [
            codes::PKG_SPEC_INVALID,
            codes::PKG_NOT_FOUND,
            codes::PKG_VERSION_NOT_FOUND,
            codes::PKG_RESOLUTION_FAILED,
            codes::PKG_RESOLVER_UNKNOWN,
            codes::PKG_REGISTRY_ERROR,
            codes::PKG_DOWNLOAD_FAILED,
            codes::PKG_EXTRACT_FAILED,
            codes::PKG_SCRIPT_FAILED,
            codes::PKG_LINK_FAILED,
            codes::PKG_CACHE_ERROR,
            codes::PKG_CACHE_INTEGRITY,
            codes::PKG_LOCK_INVALID,
            codes::PKG_LOCK_WRITE_FAILED,
            codes::PKG_TREE_CONFLICT,
        ];

        for code in all_codes {
            assert!(
                code.chars().all(|c| c.is_uppercase() || c == '_'),
                "Error code '{code}' should be SCREAMING_SNAKE_CASE"
            );
        }
    }
}
