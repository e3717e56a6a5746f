use std::io::Write;
use std::path::Path;

use repovec_index::ReingestPolicy;
use serial_test::serial;

use super::*;

const ENV_KEYS: [&str; 7] = [
    "REPOVEC_QDRANT_URL",
    "REPOVEC_QDRANT_API_KEY",
    "QDRANT_API_KEY",
    "REPOVEC_EMBEDDING_MODEL",
    "REPOVEC_EMBEDDING_BATCH_SIZE",
    "REPOVEC_KEEP_CLONES",
    "REPOVEC_CONFIG",
];

fn clear_env() {
    for key in ENV_KEYS {
        unsafe { std::env::remove_var(key) };
    }
}

fn write_config(dir: &Path, body: &str) -> PathBuf {
    let path = dir.join("repovec.toml");
    let mut f = std::fs::File::create(&path).unwrap();
    write!(f, "{body}").unwrap();
    path
}

#[test]
fn defaults() {
    let config = Config::default();
    assert_eq!(config.store.qdrant_url, "http://localhost:6334");
    assert!(config.store.api_key.is_none());
    assert_eq!(config.store.upsert_batch_size, 100);
    assert_eq!(config.store.scroll_page_size, 100);
    assert_eq!(config.embedding.model, "sentence-transformers/all-MiniLM-L6-v2");
    assert_eq!(config.embedding.batch_size, 32);
    assert!(!config.ingest.keep_clones);
    assert_eq!(config.ingest.reingest, ReingestPolicy::Recreate);
    assert_eq!(config.search.max_top_k, 50);
    assert!((config.search.vector_weight - 0.7).abs() < f32::EPSILON);
    config.validate().unwrap();
}

#[test]
#[serial]
fn missing_file_falls_back_to_defaults() {
    clear_env();
    let dir = tempfile::tempdir().unwrap();
    let config = Config::load(&dir.path().join("absent.toml")).unwrap();
    assert_eq!(config.store.qdrant_url, "http://localhost:6334");
}

#[test]
#[serial]
fn parse_valid_toml() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_config(
        dir.path(),
        r#"
[store]
qdrant_url = "http://qdrant:6334"
upsert_batch_size = 10

[embedding]
model_path = "/models/minilm"
batch_size = 8

[ingest]
clone_root = "/var/cache/repovec"
keep_clones = true
reingest = "overwrite"

[search]
max_top_k = 20
vector_weight = 0.5
"#,
    );

    clear_env();

    let config = Config::load(&path).unwrap();
    assert_eq!(config.store.qdrant_url, "http://qdrant:6334");
    assert_eq!(config.store.upsert_batch_size, 10);
    assert_eq!(config.store.scroll_page_size, 100);
    assert_eq!(config.embedding.batch_size, 8);
    assert_eq!(config.ingest.reingest, ReingestPolicy::Overwrite);
    assert!(config.ingest.keep_clones);
    assert_eq!(config.search.max_top_k, 20);
    assert_eq!(
        config.model_source(),
        ModelSource::Local {
            path: PathBuf::from("/models/minilm")
        }
    );
    assert_eq!(
        config.loader_config().clone_root,
        PathBuf::from("/var/cache/repovec")
    );
    assert!(config.loader_config().keep_clones);
    assert_eq!(config.search_config().max_top_k, 20);
}

#[test]
#[serial]
fn invalid_toml_is_an_error() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_config(dir.path(), "[store\nqdrant_url = 1");
    clear_env();
    assert!(Config::load(&path).is_err());
}

#[test]
#[serial]
fn unknown_reingest_policy_is_an_error() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_config(dir.path(), "[ingest]\nreingest = \"merge\"\n");
    clear_env();
    assert!(Config::load(&path).is_err());
}

#[test]
#[serial]
fn env_overrides() {
    clear_env();
    unsafe {
        std::env::set_var("REPOVEC_QDRANT_URL", "http://remote:6334");
        std::env::set_var("REPOVEC_EMBEDDING_MODEL", "BAAI/bge-small-en-v1.5");
        std::env::set_var("REPOVEC_EMBEDDING_BATCH_SIZE", "4");
        std::env::set_var("REPOVEC_KEEP_CLONES", "true");
    }

    let mut config = Config::default();
    config.apply_env_overrides();
    clear_env();

    assert_eq!(config.store.qdrant_url, "http://remote:6334");
    assert_eq!(config.embedding.batch_size, 4);
    assert!(config.ingest.keep_clones);
    assert_eq!(
        config.model_source(),
        ModelSource::HuggingFace {
            repo_id: "BAAI/bge-small-en-v1.5".into()
        }
    );
}

#[test]
#[serial]
fn invalid_env_values_are_ignored() {
    clear_env();
    unsafe {
        std::env::set_var("REPOVEC_EMBEDDING_BATCH_SIZE", "many");
        std::env::set_var("REPOVEC_KEEP_CLONES", "sometimes");
    }

    let mut config = Config::default();
    config.apply_env_overrides();
    clear_env();

    assert_eq!(config.embedding.batch_size, 32);
    assert!(!config.ingest.keep_clones);
}

#[test]
#[serial]
fn api_key_prefers_repovec_variable() {
    clear_env();
    unsafe {
        std::env::set_var("QDRANT_API_KEY", "generic");
    }
    let mut config = Config::default();
    config.apply_env_overrides();
    assert_eq!(config.store.api_key.as_deref(), Some("generic"));

    unsafe {
        std::env::set_var("REPOVEC_QDRANT_API_KEY", "specific");
    }
    let mut config = Config::default();
    config.apply_env_overrides();
    clear_env();
    assert_eq!(config.store.api_key.as_deref(), Some("specific"));
}

#[test]
fn api_key_is_redacted_in_debug() {
    let mut config = Config::default();
    config.store.api_key = Some("super-secret".into());
    let dbg = format!("{config:?}");
    assert!(!dbg.contains("super-secret"));
    assert!(dbg.contains("[REDACTED]"));
}

#[test]
fn validate_rejects_bad_values() {
    let mut config = Config::default();
    config.store.upsert_batch_size = 0;
    assert!(config.validate().is_err());

    let mut config = Config::default();
    config.embedding.batch_size = 0;
    assert!(config.validate().is_err());

    let mut config = Config::default();
    config.search.max_top_k = 0;
    assert!(config.validate().is_err());

    for weight in [-0.1, 1.01, f32::NAN] {
        let mut config = Config::default();
        config.search.vector_weight = weight;
        assert!(config.validate().is_err(), "{weight} should be rejected");
    }
}

#[test]
#[serial]
fn config_path_resolution_order() {
    clear_env();
    assert_eq!(
        resolve_config_path(Some(Path::new("cli.toml"))),
        PathBuf::from("cli.toml")
    );
    assert_eq!(resolve_config_path(None), PathBuf::from("config/default.toml"));

    unsafe { std::env::set_var("REPOVEC_CONFIG", "/etc/repovec.toml") };
    assert_eq!(resolve_config_path(None), PathBuf::from("/etc/repovec.toml"));
    assert_eq!(
        resolve_config_path(Some(Path::new("cli.toml"))),
        PathBuf::from("cli.toml")
    );
    clear_env();
}
