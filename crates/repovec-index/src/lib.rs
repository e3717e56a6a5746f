//! Repository ingestion and hybrid search.
//!
//! [`RepoIndexer`] loads a repository (shallow clone or local directory), embeds
//! every qualifying file and writes one point per file into a collection named by
//! [`naming`]. [`SearchEngine`] answers vector, keyword, hybrid, multi-repository
//! and exact-path queries against those collections.

pub mod error;
pub mod indexer;
pub mod loader;
pub mod locator;
pub mod naming;
pub mod search;

pub use error::{IndexError, Result};
pub use indexer::{IngestReport, ReingestPolicy, RepoIndexer};
pub use loader::{FileRecord, LoadedRepo, LoaderConfig, RepoLoader};
pub use locator::RepoLocator;
pub use naming::{name_from_legacy_identifier, name_from_locator, resolve_collection_name};
pub use search::{FusedHit, SearchConfig, SearchEngine, SearchHit, fuse, keyword_score};
