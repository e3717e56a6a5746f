//! Deterministic collection names for repositories.
//!
//! Remote repositories map to `repo_{owner}_{repo}`, local directories to
//! `repo_local_{hash}` where the hash covers the absolute path. Every name is
//! lowercase and restricted to `[a-z0-9_]`.

use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use regex::Regex;

use crate::locator::RepoLocator;

pub const COLLECTION_PREFIX: &str = "repo_";

const HASH_CHARS: usize = 12;

static OWNER_REPO_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"[/:]([^/:]+)/([^/:]+)$").expect("owner/repo regex is valid")
});

/// Canonical collection name for `locator`.
#[must_use]
pub fn name_from_locator(locator: &RepoLocator) -> String {
    match locator {
        RepoLocator::GitUrl(url) => name_from_git_url(url),
        RepoLocator::LocalPath(path) => name_from_local_path(path),
    }
}

/// Collection name for `locator`, or the sanitized `explicit` name when one is given.
#[must_use]
pub fn resolve_collection_name(locator: &RepoLocator, explicit: Option<&str>) -> String {
    match explicit.map(str::trim).filter(|name| !name.is_empty()) {
        Some(name) => sanitize(name),
        None => name_from_locator(locator),
    }
}

/// Map a filename-style identifier from older deployments to a canonical name.
///
/// `acme_widgets.json` and `acme/widgets` both become `repo_acme_widgets`.
/// Names already in canonical form are returned unchanged.
#[must_use]
pub fn name_from_legacy_identifier(id: &str) -> String {
    let id = id.trim();
    let lower = id.to_lowercase();
    if lower.starts_with(COLLECTION_PREFIX) {
        return sanitize(&lower);
    }
    let stem = strip_file_extension(id).trim_matches('/');
    format!("{COLLECTION_PREFIX}{}", sanitize(stem))
}

/// Lowercase and replace every character outside `[a-z0-9_]` with `_`.
#[must_use]
pub fn sanitize(raw: &str) -> String {
    raw.to_lowercase()
        .chars()
        .map(|c| {
            if c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect()
}

fn name_from_git_url(url: &str) -> String {
    let trimmed = url.trim().trim_end_matches('/');
    let trimmed = trimmed.strip_suffix(".git").unwrap_or(trimmed);
    let trimmed = trimmed.trim_end_matches('/');

    if let Some(caps) = OWNER_REPO_RE.captures(trimmed) {
        let owner = &caps[1];
        let repo = &caps[2];
        return sanitize(&format!("{COLLECTION_PREFIX}{owner}_{repo}"));
    }

    tracing::warn!(url, "could not extract owner/repo from git url, hashing it");
    format!("{COLLECTION_PREFIX}remote_{}", short_hash(trimmed))
}

fn name_from_local_path(path: &Path) -> String {
    let absolute = std::path::absolute(path).unwrap_or_else(|_| path.to_path_buf());
    // Rebuilding from components drops trailing separators and `.` segments.
    let normalized: PathBuf = absolute.components().collect();
    let key = normalized.to_string_lossy().replace('\\', "/");
    format!("{COLLECTION_PREFIX}local_{}", short_hash(&key))
}

fn short_hash(input: &str) -> String {
    let hex = blake3::hash(input.as_bytes()).to_hex();
    hex[..HASH_CHARS].to_owned()
}

fn strip_file_extension(id: &str) -> &str {
    match id.rsplit_once('.') {
        Some((stem, ext))
            if !stem.is_empty()
                && !ext.is_empty()
                && ext.len() <= 5
                && ext.chars().all(|c| c.is_ascii_alphanumeric()) =>
        {
            stem
        }
        _ => id,
    }
}
