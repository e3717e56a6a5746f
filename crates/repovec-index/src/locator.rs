//! Repository locators: remote Git URLs or local directories.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use regex::Regex;

static SCP_LIKE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Za-z0-9._-]+@[A-Za-z0-9.-]+:[^/]").expect("scp-like git url regex is valid")
});

const URL_SCHEMES: &[&str] = &["https://", "http://", "ssh://", "git://"];

/// Where a repository comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RepoLocator {
    /// Cloned shallowly before loading.
    GitUrl(String),
    /// Read in place; must be an existing directory.
    LocalPath(PathBuf),
}

impl RepoLocator {
    /// Classify `input` as a Git URL (`http(s)://`, `ssh://`, `git://`,
    /// `user@host:path`) or otherwise a local path.
    #[must_use]
    pub fn parse(input: &str) -> Self {
        let trimmed = input.trim();
        let lower = trimmed.to_ascii_lowercase();
        if URL_SCHEMES.iter().any(|scheme| lower.starts_with(scheme))
            || SCP_LIKE_RE.is_match(trimmed)
        {
            Self::GitUrl(trimmed.to_owned())
        } else {
            Self::LocalPath(PathBuf::from(trimmed))
        }
    }

    #[must_use]
    pub fn is_remote(&self) -> bool {
        matches!(self, Self::GitUrl(_))
    }

    #[must_use]
    pub fn local_path(&self) -> Option<&Path> {
        match self {
            Self::LocalPath(path) => Some(path),
            Self::GitUrl(_) => None,
        }
    }
}

impl fmt::Display for RepoLocator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::GitUrl(url) => f.write_str(url),
            Self::LocalPath(path) => write!(f, "{}", path.display()),
        }
    }
}
