//! Path normalization and matching.
//!
//! # Responsibilities
//! - Validate and normalize registration paths
//! - Validate group path prefixes
//! - Split request paths at prefix boundaries
//!
//! # Design Decisions
//! - Matching is exact string equality, case-sensitive
//! - Request paths are never normalized: `/a/` does not match `/a`
//! - No wildcards or parameterised segments

use crate::routing::router::RouteError;

/// Normalize a registration path.
///
/// The path must be non-empty and start with `/`. Trailing slashes are
/// stripped except for the root path itself.
pub fn normalize_path(path: &str) -> Result<String, RouteError> {
    if path.is_empty() {
        return Err(RouteError::EmptyPath);
    }
    if !path.starts_with('/') {
        return Err(RouteError::MissingLeadingSlash(path.to_string()));
    }
    if path == "/" {
        return Ok(path.to_string());
    }
    let trimmed = path.trim_end_matches('/');
    if trimmed.is_empty() {
        return Err(RouteError::InvalidPath(path.to_string()));
    }
    Ok(trimmed.to_string())
}

/// Validate a group or controller prefix. Empty means "no prefix".
pub fn validate_prefix(prefix: &str) -> Result<(), RouteError> {
    if !prefix.is_empty() && !prefix.starts_with('/') {
        return Err(RouteError::InvalidPrefix(prefix.to_string()));
    }
    Ok(())
}

/// Remainder of `path` after `prefix`, only at a segment boundary.
pub fn strip_path_prefix<'a>(path: &'a str, prefix: &str) -> Option<&'a str> {
    let rest = path.strip_prefix(prefix)?;
    if prefix.ends_with('/') || rest.is_empty() || rest.starts_with('/') {
        Some(rest)
    } else {
        None
    }
}
