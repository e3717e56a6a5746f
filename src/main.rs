mod config;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, bail};
use clap::{Parser, Subcommand, ValueEnum};
use repovec_embed::{EmbeddingGenerator, preferred_device};
use repovec_index::{
    RepoIndexer, RepoLoader, RepoLocator, SearchEngine, SearchHit, name_from_legacy_identifier,
    name_from_locator,
};
use repovec_store::{QdrantOps, VectorStoreManager};
use serde::Serialize;

use crate::config::{Config, resolve_config_path};

const DEFAULT_TOP_K: usize = 10;

/// Ingest repositories into Qdrant and search them.
#[derive(Parser, Debug)]
#[command(name = "repovec", version, about)]
struct Cli {
    /// Path to the TOML config file.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Clone or open a repository and index every qualifying file.
    Ingest {
        /// Git URL or local directory.
        locator: String,
        /// Store under this collection name instead of the derived one.
        #[arg(long)]
        collection: Option<String>,
    },
    /// Search one repository.
    Search {
        /// Collection name, legacy identifier, Git URL or local directory.
        target: String,
        /// Free-text query (vector and hybrid modes).
        query: Option<String>,
        /// Keyword for keyword and hybrid modes.
        #[arg(long)]
        keyword: Option<String>,
        #[arg(short, long, value_enum, default_value_t = ModeArg::Hybrid)]
        mode: ModeArg,
        #[arg(short = 'k', long, default_value_t = DEFAULT_TOP_K)]
        top_k: usize,
        /// Vector weight for hybrid mode, within [0, 1].
        #[arg(short, long)]
        weight: Option<f32>,
    },
    /// Vector search across several repositories.
    Multi {
        query: String,
        /// Collections to search; repeat the flag for each.
        #[arg(short, long = "collection", required = true)]
        collections: Vec<String>,
        #[arg(short = 'k', long, default_value_t = DEFAULT_TOP_K)]
        top_k: usize,
    },
    /// Print the stored content of one file.
    Get {
        target: String,
        /// Repository-relative path, `/`-separated.
        path: String,
    },
    /// Delete the collection of a repository.
    Delete {
        locator: String,
        #[arg(long)]
        collection: Option<String>,
    },
    /// Print the collection name for a locator or legacy identifier.
    Name {
        input: String,
        /// Treat the input as a legacy filename-style identifier.
        #[arg(long)]
        legacy: bool,
    },
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
enum ModeArg {
    Vector,
    Keyword,
    Hybrid,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_subscriber();

    let cli = Cli::parse();
    let config_path = resolve_config_path(cli.config.as_deref());
    let config = Config::load(&config_path)
        .with_context(|| format!("loading {}", config_path.display()))?;
    config.validate()?;

    match cli.command {
        Command::Name { input, legacy } => {
            let name = if legacy {
                name_from_legacy_identifier(&input)
            } else {
                name_from_locator(&RepoLocator::parse(&input))
            };
            println!("{name}");
        }
        Command::Ingest {
            locator,
            collection,
        } => {
            let app = App::build(&config)?;
            let report = app
                .indexer
                .ingest(&RepoLocator::parse(&locator), collection.as_deref())
                .await
                .with_context(|| format!("ingesting {locator}"))?;
            print_json(&report)?;
        }
        Command::Search {
            target,
            query,
            keyword,
            mode,
            top_k,
            weight,
        } => {
            let app = App::build(&config)?;
            let collection = collection_for_target(&target);
            let hits = match mode {
                ModeArg::Vector => {
                    let query = query.context("vector search needs a query")?;
                    app.engine.vector_search(&collection, &query, top_k).await?
                }
                ModeArg::Keyword => {
                    let Some(keyword) = keyword.or(query) else {
                        bail!("keyword search needs --keyword or a query");
                    };
                    app.engine
                        .keyword_search(&collection, &keyword, top_k)
                        .await?
                }
                ModeArg::Hybrid => {
                    let query = query.context("hybrid search needs a query")?;
                    app.engine
                        .combined_search(&collection, &query, keyword.as_deref(), top_k, weight)
                        .await?
                }
            };
            print_hits(&hits)?;
        }
        Command::Multi {
            query,
            collections,
            top_k,
        } => {
            let app = App::build(&config)?;
            let collections: Vec<String> =
                collections.iter().map(|c| collection_for_target(c)).collect();
            let hits = app.engine.multi_search(&collections, &query, top_k).await?;
            print_hits(&hits)?;
        }
        Command::Get { target, path } => {
            let app = App::build(&config)?;
            let collection = collection_for_target(&target);
            match app.engine.get_by_path(&collection, &path).await? {
                Some(record) => print!("{}", record.content),
                None => bail!("{path} not found in {collection}"),
            }
        }
        Command::Delete {
            locator,
            collection,
        } => {
            let app = App::build(&config)?;
            let name = app
                .indexer
                .delete(&RepoLocator::parse(&locator), collection.as_deref())
                .await?;
            tracing::info!(collection = %name, "collection removed");
            println!("{name}");
        }
    }

    Ok(())
}

fn init_subscriber() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

/// Shared pipeline handles. The embedding model loads on first use.
struct App {
    indexer: RepoIndexer,
    engine: SearchEngine,
}

impl App {
    fn build(config: &Config) -> anyhow::Result<Self> {
        let ops = QdrantOps::new(&config.store.qdrant_url, config.store.api_key.as_deref())
            .with_context(|| format!("connecting to Qdrant at {}", config.store.qdrant_url))?;
        let store = VectorStoreManager::new(Arc::new(ops))
            .with_upsert_batch_size(config.store.upsert_batch_size)
            .with_scroll_page_size(config.store.scroll_page_size);

        let source = config.model_source();
        tracing::debug!(model = %source, "embedding model configured");
        let embedder = Arc::new(
            EmbeddingGenerator::bert(source, preferred_device())
                .with_batch_size(config.embedding.batch_size),
        );

        let indexer = RepoIndexer::new(
            RepoLoader::new(config.loader_config()),
            Arc::clone(&embedder),
            store.clone(),
        )
        .with_policy(config.ingest.reingest);
        let engine = SearchEngine::new(store, embedder, config.search_config());

        Ok(Self { indexer, engine })
    }
}

/// Map a CLI target to a collection name.
///
/// Git URLs and existing directories are named from their locator; anything else
/// is a collection name or legacy identifier.
fn collection_for_target(target: &str) -> String {
    let locator = RepoLocator::parse(target);
    let is_local_dir = locator.local_path().is_some_and(std::path::Path::is_dir);
    if locator.is_remote() || is_local_dir {
        name_from_locator(&locator)
    } else {
        name_from_legacy_identifier(target)
    }
}

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string(value)?);
    Ok(())
}

fn print_hits(hits: &[SearchHit]) -> anyhow::Result<()> {
    for hit in hits {
        print_json(hit)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_parses_search_flags() {
        let cli = Cli::try_parse_from([
            "repovec",
            "search",
            "repo_acme_widgets",
            "validate token",
            "--keyword",
            "token",
            "--mode",
            "hybrid",
            "-k",
            "5",
            "--weight",
            "0.4",
        ])
        .unwrap();
        let Command::Search {
            target,
            query,
            keyword,
            mode,
            top_k,
            weight,
        } = cli.command
        else {
            panic!("expected search command");
        };
        assert_eq!(target, "repo_acme_widgets");
        assert_eq!(query.as_deref(), Some("validate token"));
        assert_eq!(keyword.as_deref(), Some("token"));
        assert_eq!(mode, ModeArg::Hybrid);
        assert_eq!(top_k, 5);
        assert_eq!(weight, Some(0.4));
    }

    #[test]
    fn cli_multi_requires_collections() {
        assert!(Cli::try_parse_from(["repovec", "multi", "query"]).is_err());
        let cli = Cli::try_parse_from([
            "repovec",
            "multi",
            "query",
            "--collection",
            "repo_a_b",
            "--collection",
            "repo_c_d",
        ])
        .unwrap();
        let Command::Multi { collections, .. } = cli.command else {
            panic!("expected multi command");
        };
        assert_eq!(collections, ["repo_a_b", "repo_c_d"]);
    }

    #[test]
    fn cli_global_config_flag() {
        let cli =
            Cli::try_parse_from(["repovec", "name", "x", "--config", "custom.toml"]).unwrap();
        assert_eq!(cli.config, Some(PathBuf::from("custom.toml")));
    }

    #[test]
    fn target_resolution() {
        assert_eq!(
            collection_for_target("https://github.com/acme/widgets.git"),
            "repo_acme_widgets"
        );
        assert_eq!(collection_for_target("repo_acme_widgets"), "repo_acme_widgets");
        assert_eq!(collection_for_target("acme_widgets.json"), "repo_acme_widgets");

        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().to_str().unwrap();
        assert!(collection_for_target(target).starts_with("repo_local_"));
    }
}
