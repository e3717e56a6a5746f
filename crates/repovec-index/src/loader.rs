//! Repository loading: clone or open, walk, filter, read.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};

use crate::error::{IndexError, Result};
use crate::locator::RepoLocator;

/// Directory names never descended into.
pub const EXCLUDED_DIRS: &[&str] = &[
    ".git",
    ".hg",
    ".svn",
    "node_modules",
    "__pycache__",
    ".pytest_cache",
    ".mypy_cache",
    "dist",
    "build",
    "out",
    "target",
    ".next",
    "venv",
    ".venv",
    "env",
];

/// File extensions (without the dot, compared case-insensitively) that are loaded.
pub const ALLOWED_EXTENSIONS: &[&str] = &[
    "py", "js", "ts", "tsx", "jsx", "java", "sql", "json", "md",
];

/// A text file read from a repository.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileRecord {
    /// Relative to the repository root, `/`-separated.
    pub path: String,
    pub content: String,
}

/// Files loaded from one repository plus the count of candidates that were skipped.
#[derive(Debug, Default)]
pub struct LoadedRepo {
    pub files: Vec<FileRecord>,
    pub skipped: usize,
}

/// Loader settings.
#[derive(Debug, Clone)]
pub struct LoaderConfig {
    /// Parent directory for shallow clones of remote repositories.
    pub clone_root: PathBuf,
    /// Leave clones on disk after ingestion instead of removing them.
    pub keep_clones: bool,
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self {
            clone_root: std::env::temp_dir().join("repovec"),
            keep_clones: false,
        }
    }
}

/// Clone directories currently held by a [`Checkout`].
type ActiveClones = Arc<Mutex<HashSet<PathBuf>>>;

/// A checked-out repository. Removes its clone directory on drop when owned.
///
/// Removal runs synchronously inside `drop`, so the guard should be dropped as
/// soon as the files are read. A clone directory is claimed for the lifetime of
/// the guard; claims only coordinate loaders sharing one [`RepoLoader`], not
/// separate processes using the same `clone_root`.
#[derive(Debug)]
pub struct Checkout {
    root: PathBuf,
    cleanup: bool,
    claim: Option<ActiveClones>,
}

impl Checkout {
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }
}

impl Drop for Checkout {
    fn drop(&mut self) {
        if self.cleanup {
            match std::fs::remove_dir_all(&self.root) {
                Ok(()) => tracing::debug!(path = %self.root.display(), "removed clone"),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => {
                    tracing::warn!(path = %self.root.display(), "failed to remove clone: {e}");
                }
            }
        }
        if let Some(active) = self.claim.take() {
            lock(&active).remove(&self.root);
        }
    }
}

/// Turns a [`RepoLocator`] into [`FileRecord`]s.
///
/// Every clone of a loader shares one set of checked-out directories, so two
/// concurrent ingestions of one remote repository never walk and delete the
/// same clone.
#[derive(Debug, Clone, Default)]
pub struct RepoLoader {
    config: LoaderConfig,
    active: ActiveClones,
}

impl RepoLoader {
    #[must_use]
    pub fn new(config: LoaderConfig) -> Self {
        Self {
            config,
            active: ActiveClones::default(),
        }
    }

    /// Make the repository available on disk.
    ///
    /// Remote repositories are shallow-cloned into `clone_root/<dir_name>`; an
    /// existing clone (one with a `.git` entry) is reused.
    ///
    /// # Errors
    ///
    /// Returns [`IndexError::Ingestion`] if a local path is not a directory, the
    /// clone directory is already checked out, or the clone fails.
    pub async fn checkout(&self, locator: &RepoLocator, dir_name: &str) -> Result<Checkout> {
        match locator {
            RepoLocator::LocalPath(path) => {
                let is_dir = tokio::fs::metadata(path)
                    .await
                    .map(|m| m.is_dir())
                    .unwrap_or(false);
                if !is_dir {
                    return Err(IndexError::Ingestion(format!(
                        "local path {} does not exist or is not a directory",
                        path.display()
                    )));
                }
                Ok(Checkout {
                    root: path.clone(),
                    cleanup: false,
                    claim: None,
                })
            }
            RepoLocator::GitUrl(url) => {
                let target = self.config.clone_root.join(dir_name);
                if !lock(&self.active).insert(target.clone()) {
                    return Err(IndexError::Ingestion(format!(
                        "{} is already being ingested",
                        target.display()
                    )));
                }
                let checkout = Checkout {
                    root: target.clone(),
                    cleanup: !self.config.keep_clones,
                    claim: Some(Arc::clone(&self.active)),
                };
                if tokio::fs::try_exists(target.join(".git"))
                    .await
                    .unwrap_or(false)
                {
                    tracing::info!(path = %target.display(), "reusing existing clone");
                    return Ok(checkout);
                }
                clone_shallow(url, &target).await?;
                Ok(checkout)
            }
        }
    }

    /// Load every qualifying file of `locator`.
    ///
    /// # Errors
    ///
    /// Returns [`IndexError::Ingestion`] if the repository cannot be checked out
    /// or contains no qualifying files.
    pub async fn load(&self, locator: &RepoLocator, dir_name: &str) -> Result<LoadedRepo> {
        let checkout = self.checkout(locator, dir_name).await?;
        load_dir(checkout.root()).await
    }
}

fn lock(active: &Mutex<HashSet<PathBuf>>) -> std::sync::MutexGuard<'_, HashSet<PathBuf>> {
    active.lock().unwrap_or_else(PoisonError::into_inner)
}

async fn clone_shallow(url: &str, target: &Path) -> Result<()> {
    if url.chars().any(char::is_whitespace) {
        return Err(IndexError::Ingestion("git URL must not contain whitespace".to_owned()));
    }
    if let Some(parent) = target.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    if tokio::fs::try_exists(target).await.unwrap_or(false) {
        tokio::fs::remove_dir_all(target).await?;
    }

    tracing::info!(url, path = %target.display(), "cloning repository");
    let output = tokio::process::Command::new("git")
        .arg("clone")
        .arg("--depth=1")
        .arg("--")
        .arg(url)
        .arg(target)
        .output()
        .await
        .map_err(|e| IndexError::Ingestion(format!("failed to run git: {e}")))?;

    if !output.status.success() {
        if let Err(e) = tokio::fs::remove_dir_all(target).await
            && e.kind() != std::io::ErrorKind::NotFound
        {
            tracing::warn!(path = %target.display(), "failed to remove partial clone: {e}");
        }
        return Err(IndexError::Ingestion(format!(
            "git clone of {url} failed with exit code {}: {}",
            output.status.code().unwrap_or(-1),
            String::from_utf8_lossy(&output.stderr).trim()
        )));
    }
    Ok(())
}

/// Walk `root` and read every qualifying file.
///
/// # Errors
///
/// Returns [`IndexError::Ingestion`] if no qualifying file is found.
pub async fn load_dir(root: &Path) -> Result<LoadedRepo> {
    let walk_root = root.to_path_buf();
    let candidates = tokio::task::spawn_blocking(move || collect_candidates(&walk_root))
        .await
        .map_err(|e| IndexError::Ingestion(format!("directory walk task failed: {e}")))?;

    let mut loaded = LoadedRepo::default();
    for path in candidates {
        let rel_path = relative_path(root, &path);
        match read_text(&path).await {
            Ok(Some(content)) => loaded.files.push(FileRecord {
                path: rel_path,
                content,
            }),
            Ok(None) => {
                loaded.skipped += 1;
                tracing::warn!(file = %rel_path, "skipping binary file");
            }
            Err(e) => {
                loaded.skipped += 1;
                tracing::warn!(file = %rel_path, "skipping unreadable file: {e}");
            }
        }
    }

    if loaded.files.is_empty() {
        return Err(IndexError::Ingestion(format!(
            "no qualifying files found in {}",
            root.display()
        )));
    }

    tracing::info!(
        files = loaded.files.len(),
        skipped = loaded.skipped,
        "repository loaded"
    );
    Ok(loaded)
}

fn collect_candidates(root: &Path) -> Vec<PathBuf> {
    ignore::WalkBuilder::new(root)
        .standard_filters(false)
        .follow_links(false)
        .sort_by_file_name(|a, b| a.cmp(b))
        .filter_entry(|entry| {
            let is_dir = entry.file_type().is_some_and(|ft| ft.is_dir());
            !(is_dir && entry.depth() > 0 && is_excluded_dir(entry.file_name()))
        })
        .build()
        .filter_map(|entry| match entry {
            Ok(entry) => Some(entry),
            Err(e) => {
                tracing::warn!("skipping unreadable entry: {e}");
                None
            }
        })
        .filter(|e| e.file_type().is_some_and(|ft| ft.is_file()) && has_allowed_extension(e.path()))
        .map(ignore::DirEntry::into_path)
        .collect()
}

fn is_excluded_dir(name: &std::ffi::OsStr) -> bool {
    name.to_str().is_some_and(|n| EXCLUDED_DIRS.contains(&n))
}

/// Whether `path` carries one of [`ALLOWED_EXTENSIONS`].
#[must_use]
pub fn has_allowed_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|ext| {
            ALLOWED_EXTENSIONS
                .iter()
                .any(|allowed| allowed.eq_ignore_ascii_case(ext))
        })
}

/// Read `path` as UTF-8. `Ok(None)` means the bytes look binary.
async fn read_text(path: &Path) -> std::io::Result<Option<String>> {
    let bytes = tokio::fs::read(path).await?;
    Ok(decode_text(bytes))
}

/// `None` if `bytes` contain a null byte or are not valid UTF-8.
#[must_use]
pub fn decode_text(bytes: Vec<u8>) -> Option<String> {
    if bytes.contains(&0) {
        return None;
    }
    String::from_utf8(bytes).ok()
}

fn relative_path(root: &Path, path: &Path) -> String {
    let rel = path.strip_prefix(root).unwrap_or(path);
    rel.components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}
