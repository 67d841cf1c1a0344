//! npm-flavoured semver ranges on top of the `semver` crate.
//!
//! Supported syntax beyond `semver::VersionReq`:
//! - OR ranges: `^1.0.0 || ^2.0.0`
//! - hyphen ranges: `1.0.0 - 2.0.0`
//! - x-ranges: `1.x`, `1.2.x`, `*`, empty string, and partials (`1.2` is `1.2.x`)
//! - space-separated comparators: `>= 2.1.2 < 3.0.0`
//! - bare versions mean an exact match (`1.2.3` is `=1.2.3`)

use super::error::PkgError;
use semver::{Version, VersionReq};

/// A parsed range: satisfied if any alternative matches.
#[derive(Debug, Clone)]
pub struct NpmRange {
    alternatives: Vec<VersionReq>,
}

impl NpmRange {
    /// Parse an npm range string.
    ///
    /// # Errors
    ///
    /// Returns `PKG_SPEC_INVALID` if no alternative parses.
    pub fn parse(range: &str) -> Result<Self, PkgError> {
        let mut alternatives = Vec::new();
        let mut last_err = None;

        for alt in range.split("||").map(str::trim) {
            match parse_single(alt) {
                Ok(req) => alternatives.push(req),
                Err(e) => last_err = Some(e),
            }
        }

        if alternatives.is_empty() {
            return Err(last_err.unwrap_or_else(|| {
                PkgError::spec_invalid(format!("Invalid version range '{range}'"))
            }));
        }

        Ok(Self { alternatives })
    }

    #[must_use]
    pub fn matches(&self, version: &Version) -> bool {
        self.alternatives.iter().any(|req| req.matches(version))
    }
}

/// Whether `version` satisfies `range`.
///
/// Unparseable versions or ranges never satisfy.
#[must_use]
pub fn satisfies(version: &str, range: &str) -> bool {
    let Ok(version) = Version::parse(version.trim()) else {
        return false;
    };
    NpmRange::parse(range).is_ok_and(|r| r.matches(&version))
}

/// Highest version in `versions` satisfying `range`.
///
/// # Errors
///
/// Returns `PKG_SPEC_INVALID` if the range does not parse.
pub fn max_satisfying<'a, I>(versions: I, range: &str) -> Result<Option<Version>, PkgError>
where
    I: IntoIterator<Item = &'a str>,
{
    let range = NpmRange::parse(range)?;
    Ok(versions
        .into_iter()
        .filter_map(|v| Version::parse(v).ok())
        .filter(|v| range.matches(v))
        .max())
}

/// Resolve a range or dist-tag against a packument.
///
/// - `None`, `""` and `latest` resolve to `dist-tags.latest`
/// - any other dist-tag name resolves to that tag
/// - otherwise the highest satisfying published version wins
///
/// # Errors
///
/// Returns `PKG_VERSION_NOT_FOUND` if nothing matches.
pub fn resolve_version(packument: &serde_json::Value, range: Option<&str>) -> Result<String, PkgError> {
    let name = packument
        .get("name")
        .and_then(|v| v.as_str())
        .unwrap_or("unknown");
    let range = range.map(str::trim).unwrap_or("");
    let tags = packument.get("dist-tags");

    if range.is_empty() || range == "latest" {
        return tags
            .and_then(|t| t.get("latest"))
            .and_then(|v| v.as_str())
            .map(String::from)
            .ok_or_else(|| PkgError::version_not_found(name, "latest (no dist-tags.latest found)"));
    }

    if let Some(tagged) = tags.and_then(|t| t.get(range)).and_then(|v| v.as_str()) {
        return Ok(tagged.to_string());
    }

    let versions: Vec<&str> = packument
        .get("versions")
        .and_then(|v| v.as_object())
        .map(|o| o.keys().map(String::as_str).collect())
        .unwrap_or_default();

    max_satisfying(versions, range)?
        .map(|v| v.to_string())
        .ok_or_else(|| PkgError::version_not_found(name, range))
}

fn parse_single(range: &str) -> Result<VersionReq, PkgError> {
    let range = range.trim();
    let invalid = |e: semver::Error| PkgError::spec_invalid(format!("Invalid version range '{range}': {e}"));

    if range.is_empty() {
        return Ok(VersionReq::STAR);
    }

    if let Some((start, end)) = range.split_once(" - ") {
        return VersionReq::parse(&format!(">={}, <={}", start.trim(), end.trim())).map_err(invalid);
    }

    if let Ok(exact) = Version::parse(range.trim_start_matches('v')) {
        return VersionReq::parse(&format!("={exact}")).map_err(invalid);
    }

    if is_partial_version(range) || (range.contains(['x', 'X', '*']) && !range.contains(' ')) {
        return VersionReq::parse(&convert_x_range(range)?).map_err(invalid);
    }

    VersionReq::parse(&join_comparators(range)).map_err(invalid)
}

/// `">= 2.1.2 < 3.0.0"` to `">=2.1.2, <3.0.0"`.
fn join_comparators(range: &str) -> String {
    let mut out: Vec<String> = Vec::new();
    let mut pending_op = String::new();

    for token in range.split_whitespace() {
        if token.chars().any(|c| c.is_ascii_digit()) {
            out.push(format!("{pending_op}{token}"));
            pending_op.clear();
        } else {
            pending_op.push_str(token);
        }
    }

    if !pending_op.is_empty() {
        out.push(pending_op);
    }

    if out.len() > 1 && !range.contains(',') {
        out.join(", ")
    } else {
        range.to_string()
    }
}

fn convert_x_range(range: &str) -> Result<String, PkgError> {
    let parts: Vec<&str> = range.trim_start_matches('v').split('.').collect();
    let is_wild = |p: &str| matches!(p, "x" | "X" | "*");
    let bump = |n: u64| {
        n.checked_add(1).ok_or_else(|| {
            PkgError::spec_invalid(format!("Invalid version range '{range}': component too large"))
        })
    };

    // Missing trailing components count as wildcards: `1.2` is `1.2.x`.
    let ranged = match parts.as_slice() {
        [major] if is_wild(*major) => "*".to_string(),
        [major, rest @ ..] if rest.iter().all(|p| is_wild(*p)) => match major.parse::<u64>() {
            Ok(m) => format!(">={m}.0.0, <{}.0.0", bump(m)?),
            Err(_) => "*".to_string(),
        },
        [major, minor] | [major, minor, _] if !is_wild(*minor) => {
            match (major.parse::<u64>(), minor.parse::<u64>()) {
                (Ok(m), Ok(n)) => format!(">={m}.{n}.0, <{m}.{}.0", bump(n)?),
                _ => range.replace(['x', 'X', '*'], "0"),
            }
        }
        _ => range.replace(['x', 'X', '*'], "0"),
    };
    Ok(ranged)
}

/// `1` or `1.2` with no operator, which npm reads as an x-range.
fn is_partial_version(range: &str) -> bool {
    let parts: Vec<&str> = range.trim_start_matches('v').split('.').collect();
    parts.len() <= 2 && parts.iter().all(|p| !p.is_empty() && p.bytes().all(|b| b.is_ascii_digit()))
}
