//! Dependency declaration parsing.
//!
//! A declaration is either a string or an explicit descriptor object:
//!
//! - `"^1.2.0"`: no resolver prefix, handled by the default `npm` resolver
//! - `"file:./vendor/pkg.tgz"`: routed to the resolver registered as `file`
//! - `{ "resolverName": "npm", "resolverArgs": {...}, "semVersion": "^1" }`: taken as-is

use super::error::PkgError;
use super::resolver::Resolvers;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// Resolver used for declarations without a `resolver:` prefix.
pub const DEFAULT_RESOLVER: &str = "npm";

/// A parsed dependency declaration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PackageDescriptor {
    /// Name of the resolver that handles this package.
    #[serde(alias = "resolver")]
    pub resolver_name: String,

    /// Resolver-specific arguments.
    #[serde(default, alias = "args")]
    pub resolver_args: Value,

    /// Semver range used for satisfaction checks, if the source has one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sem_version: Option<String>,
}

impl PackageDescriptor {
    #[must_use]
    pub fn new(resolver_name: impl Into<String>, resolver_args: Value) -> Self {
        Self {
            resolver_name: resolver_name.into(),
            resolver_args,
            sem_version: None,
        }
    }

    #[must_use]
    pub fn with_sem_version(mut self, range: impl Into<String>) -> Self {
        self.sem_version = Some(range.into());
        self
    }

    /// Look up a string argument by key.
    #[must_use]
    pub fn arg_str(&self, key: &str) -> Option<&str> {
        self.resolver_args.get(key).and_then(Value::as_str)
    }
}

/// Parse one dependency declaration into a descriptor.
///
/// # Errors
///
/// Returns `PKG_RESOLVER_UNKNOWN` if the prefix names an unregistered resolver
/// and `PKG_SPEC_INVALID` if the declaration is neither a string nor an object.
pub fn parse_dependency_item(
    resolvers: &Resolvers,
    name: &str,
    description: &Value,
) -> Result<PackageDescriptor, PkgError> {
    match description {
        Value::Object(_) => serde_json::from_value(description.clone()).map_err(|e| {
            PkgError::spec_invalid(format!("Invalid descriptor for '{name}': {e}"))
        }),
        Value::String(raw) => match raw.split_once(':') {
            None => resolvers
                .get(DEFAULT_RESOLVER)
                .map_err(|_| PkgError::resolver_unknown(DEFAULT_RESOLVER, name))?
                .parse_dependency_item(name, raw),
            Some((prefix, rest)) => resolvers
                .get(prefix)
                .map_err(|_| PkgError::resolver_unknown(prefix, name))?
                .parse_dependency_item(name, rest),
        },
        other => Err(PkgError::spec_invalid(format!(
            "Dependency description for '{name}' should be a string or object, got {}",
            json_type_name(other)
        ))),
    }
}

/// Parse a whole `name -> declaration` map.
///
/// # Errors
///
/// Returns the first parse error encountered, in name order.
pub fn convert_dependencies_map(
    resolvers: &Resolvers,
    dependencies: &BTreeMap<String, Value>,
) -> Result<BTreeMap<String, PackageDescriptor>, PkgError> {
    dependencies
        .iter()
        .map(|(name, description)| {
            parse_dependency_item(resolvers, name, description).map(|d| (name.clone(), d))
        })
        .collect()
}

fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pkg::error::codes;
    use crate::pkg::testing::FakeResolver;
    use serde_json::json;
    use std::sync::Arc;

    fn resolvers() -> Resolvers {
        let mut resolvers = Resolvers::new();
        resolvers.insert("npm", Arc::new(FakeResolver::new("npm")));
        resolvers.insert("file", Arc::new(FakeResolver::new("file")));
        resolvers
    }

    #[test]
    fn test_bare_range_uses_default_resolver() {
        let d = parse_dependency_item(&resolvers(), "left-pad", &json!("^1.3.0")).unwrap();
        assert_eq!(d.resolver_name, "npm");
        assert_eq!(d.sem_version.as_deref(), Some("^1.3.0"));
        assert_eq!(d.arg_str("packageName"), Some("left-pad"));
    }

    #[test]
    fn test_prefix_routes_to_named_resolver() {
        let d = parse_dependency_item(&resolvers(), "local", &json!("file:./vendor/x.tgz")).unwrap();
        assert_eq!(d.resolver_name, "file");
        assert_eq!(d.arg_str("packageVersion"), Some("./vendor/x.tgz"));
    }

    #[test]
    fn test_object_is_explicit_descriptor() {
        let raw = json!({ "resolver": "file", "args": { "filePath": "a" }, "semVersion": "^1" });
        let d = parse_dependency_item(&resolvers(), "a", &raw).unwrap();
        assert_eq!(d.resolver_name, "file");
        assert_eq!(d.arg_str("filePath"), Some("a"));
        assert_eq!(d.sem_version.as_deref(), Some("^1"));
    }

    #[test]
    fn test_unknown_prefix() {
        let err = parse_dependency_item(&resolvers(), "x", &json!("git:foo")).unwrap_err();
        assert_eq!(err.code(), codes::PKG_RESOLVER_UNKNOWN);
    }

    #[test]
    fn test_non_string_rejected() {
        let err = parse_dependency_item(&resolvers(), "x", &json!(3)).unwrap_err();
        assert_eq!(err.code(), codes::PKG_SPEC_INVALID);
        assert!(err.message().contains("number"));
    }

    #[test]
    fn test_convert_map() {
        let mut deps = BTreeMap::new();
        deps.insert("a".to_string(), json!("^1.0.0"));
        deps.insert("b".to_string(), json!("file:b"));
        let map = convert_dependencies_map(&resolvers(), &deps).unwrap();
        assert_eq!(map.len(), 2);
        assert_eq!(map["b"].resolver_name, "file");
    }

    #[test]
    fn test_descriptor_serializes_camel_case() {
        let d = PackageDescriptor::new("npm", json!({})).with_sem_version("^1");
        let v = serde_json::to_value(&d).unwrap();
        assert_eq!(v["resolverName"], "npm");
        assert_eq!(v["semVersion"], "^1");
    }
}
