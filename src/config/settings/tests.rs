use super::*;
use std::collections::HashMap;
use tempfile::TempDir;

fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
    let vars: HashMap<String, String> = pairs
        .iter()
        .map(|(name, value)| ((*name).to_string(), (*value).to_string()))
        .collect();
    move |name: &str| vars.get(name).cloned()
}

#[test]
fn default_config() {
    let config = Config::default();
    assert_eq!(config.embedding.backend, EmbeddingBackend::Ollama);
    assert_eq!(config.embedding.url, "http://localhost:11434");
    assert_eq!(config.embedding.dimension, 768);
    assert_eq!(config.embedding.batch_size, 16);
    assert_eq!(config.embedding.retries, 3);
    assert_eq!(config.embedding.timeout(), Duration::from_secs(30));
    assert_eq!(config.embedding.retry_backoff(), Duration::from_millis(800));
    assert_eq!(config.generation.model, "deepseek-r1:8b");
    assert_eq!(config.generation.max_tokens, 1024);
    assert_eq!(config.store.collection, "kb_collection");
    assert_eq!(config.chunking.target_size, 1000);
    assert_eq!(config.chunking.overlap, 200);
    assert_eq!(config.query.default_top_k, 5);
    assert!(config.validate().is_ok());
}

#[test]
fn config_validation() {
    let config = Config::default();

    let mut invalid = config.clone();
    invalid.embedding.url = "ftp://localhost:11434".to_string();
    assert!(matches!(invalid.validate(), Err(ConfigError::InvalidUrl(_))));

    let mut invalid = config.clone();
    invalid.embedding.batch_size = 0;
    assert!(matches!(
        invalid.validate(),
        Err(ConfigError::InvalidBatchSize(0))
    ));

    let mut invalid = config.clone();
    invalid.embedding.dimension = 32;
    assert!(invalid.validate().is_err());

    let mut invalid = config.clone();
    invalid.embedding.retries = 0;
    assert!(matches!(invalid.validate(), Err(ConfigError::InvalidRetries(0))));

    let mut invalid = config.clone();
    invalid.embedding.retry_backoff_secs = -1.0;
    assert!(invalid.validate().is_err());

    let mut invalid = config.clone();
    invalid.generation.temperature = 2.5;
    assert!(invalid.validate().is_err());

    let mut invalid = config.clone();
    invalid.generation.model = "   ".to_string();
    assert!(matches!(invalid.validate(), Err(ConfigError::InvalidModel(_))));

    let mut invalid = config.clone();
    invalid.store.collection = String::new();
    assert!(invalid.validate().is_err());

    let mut invalid = config.clone();
    invalid.store.port = 0;
    assert!(matches!(invalid.validate(), Err(ConfigError::InvalidPort(0))));

    let mut invalid = config.clone();
    invalid.chunking.overlap = invalid.chunking.target_size;
    assert!(matches!(
        invalid.validate(),
        Err(ConfigError::OverlapTooLarge(1000, 1000))
    ));

    let mut invalid = config.clone();
    invalid.server.bind = "not an address".to_string();
    assert!(invalid.validate().is_err());

    let mut invalid = config;
    invalid.query.default_top_k = 0;
    assert!(invalid.validate().is_err());
}

#[test]
fn gemini_backend_requires_api_key() {
    let mut config = Config::default();
    config.embedding.backend = EmbeddingBackend::Gemini;
    config.embedding.url = EmbeddingBackend::Gemini.default_url().to_string();
    assert!(matches!(
        config.validate(),
        Err(ConfigError::MissingApiKey("gemini"))
    ));

    config.embedding.api_key = Some("secret".to_string());
    assert!(config.validate().is_ok());
}

#[test]
fn port_is_not_checked_for_embedded_stores() {
    let mut config = Config::default();
    config.store.backend = StoreBackend::Lancedb;
    config.store.port = 0;
    assert!(config.validate().is_ok());
}

#[test]
fn qdrant_url_generation() {
    let mut store = StoreSettings::default();
    assert_eq!(store.qdrant_url(), "http://localhost:6334");

    store.host = "https://qdrant.example.com/".to_string();
    store.port = 443;
    assert_eq!(store.qdrant_url(), "https://qdrant.example.com:443");
}

#[test]
fn toml_serialization() {
    let mut config = Config::default();
    config.embedding.api_key = Some("key".to_string());
    config.store.path = Some(PathBuf::from("/tmp/vectors"));

    let toml_str = toml::to_string(&config).expect("should serialize toml correctly");
    let parsed: Config = toml::from_str(&toml_str).expect("should parse toml correctly");
    assert_eq!(config, parsed);
}

#[test]
fn partial_config_uses_defaults() {
    let partial = r#"
        [embedding]
        model = "bge-m3"

        [store]
        backend = "lancedb"
    "#;

    let config: Config = toml::from_str(partial).expect("should parse toml correctly");
    assert_eq!(config.embedding.model, "bge-m3");
    assert_eq!(config.embedding.batch_size, 16);
    assert_eq!(config.store.backend, StoreBackend::Lancedb);
    assert_eq!(config.generation, GenerationSettings::default());
}

#[test]
fn load_missing_config_returns_defaults() {
    let temp_dir = TempDir::new().expect("should create temp dir");

    let config = Config::load_file(temp_dir.path()).expect("missing file should load defaults");
    assert_eq!(config.embedding, EmbeddingSettings::default());
    assert_eq!(config.get_base_dir(), temp_dir.path());
    assert_eq!(
        config.vector_database_path(),
        temp_dir.path().join("vectors")
    );
}

#[test]
fn save_then_load_round_trip() {
    let temp_dir = TempDir::new().expect("should create temp dir");
    let mut config = Config {
        base_dir: temp_dir.path().join("nested"),
        ..Config::default()
    };
    config.store.backend = StoreBackend::Memory;
    config.query.include_sources = false;

    config.save().expect("should save config");
    let loaded = Config::load_file(temp_dir.path().join("nested")).expect("should load config");
    assert_eq!(loaded, config);
}

#[test]
fn invalid_toml_is_rejected() {
    let temp_dir = TempDir::new().expect("should create temp dir");
    fs::write(temp_dir.path().join("config.toml"), "[embedding\nmodel = 1")
        .expect("should write config");

    assert!(Config::load_file(temp_dir.path()).is_err());
}

#[test]
fn env_overrides_replace_file_values() {
    let mut config = Config::default();
    let lookup = lookup_from(&[
        ("EMBED_BACKEND", "Remote"),
        ("EMBED_URL", "http://embed.local/embed"),
        ("EMBED_BATCH_SIZE", "32"),
        ("EMBED_RETRY_BACKOFF", "1.5"),
        ("GEN_TEMPERATURE", "0.7"),
        ("STORE_BACKEND", "memory"),
        ("QDRANT_PORT", "7000"),
        ("CHUNK_SIZE", "500"),
        ("CHUNK_OVERLAP", "50"),
        ("RAG_TOP_K", "8"),
        ("RAG_INCLUDE_SOURCES", "no"),
    ]);

    config
        .apply_env_overrides(lookup)
        .expect("overrides should apply");

    assert_eq!(config.embedding.backend, EmbeddingBackend::Remote);
    assert_eq!(config.embedding.url, "http://embed.local/embed");
    assert_eq!(config.embedding.batch_size, 32);
    assert!((config.embedding.retry_backoff_secs - 1.5).abs() < f64::EPSILON);
    assert!((config.generation.temperature - 0.7).abs() < f32::EPSILON);
    assert_eq!(config.store.backend, StoreBackend::Memory);
    assert_eq!(config.store.port, 7000);
    assert_eq!(config.chunking.target_size, 500);
    assert_eq!(config.chunking.overlap, 50);
    assert_eq!(config.query.default_top_k, 8);
    assert!(!config.query.include_sources);
    assert!(config.validate().is_ok());
}

#[test]
fn gemini_api_key_is_a_fallback() {
    let mut config = Config::default();
    config
        .apply_env_overrides(lookup_from(&[("GEMINI_API_KEY", "gemini-key")]))
        .expect("overrides should apply");
    assert_eq!(config.embedding.api_key.as_deref(), Some("gemini-key"));

    let mut config = Config::default();
    config
        .apply_env_overrides(lookup_from(&[
            ("GEMINI_API_KEY", "gemini-key"),
            ("EMBED_API_KEY", "embed-key"),
        ]))
        .expect("overrides should apply");
    assert_eq!(config.embedding.api_key.as_deref(), Some("embed-key"));
}

#[test]
fn blank_env_values_are_ignored() {
    let mut config = Config::default();
    config
        .apply_env_overrides(lookup_from(&[("EMBED_MODEL", "  "), ("RAG_TOP_K", "")]))
        .expect("blank values should be ignored");
    assert_eq!(config, Config::default());
}

#[test]
fn unparseable_env_values_fail_fast() {
    let cases = [
        ("EMBED_DIM", "wide"),
        ("QDRANT_PORT", "70000"),
        ("RAG_INCLUDE_SOURCES", "maybe"),
        ("STORE_BACKEND", "postgres"),
    ];

    for (name, value) in cases {
        let mut config = Config::default();
        let result = config.apply_env_overrides(lookup_from(&[(name, value)]));
        assert!(
            matches!(result, Err(ConfigError::InvalidEnvValue { name: ref got, .. }) if got == name),
            "{name}={value} should be rejected"
        );
    }
}

#[test]
fn setter_validation() {
    let mut embedding = EmbeddingSettings::default();

    assert!(embedding.set_batch_size(1).is_ok());
    assert!(embedding.set_batch_size(1000).is_ok());
    assert!(embedding.set_batch_size(0).is_err());
    assert!(embedding.set_batch_size(1001).is_err());

    assert!(embedding.set_dimension(1024).is_ok());
    assert!(embedding.set_dimension(63).is_err());
    assert_eq!(embedding.dimension, 1024);
}

#[test]
fn error_display_messages() {
    let errors = vec![
        ConfigError::InvalidUrl("invalid-url".to_string()),
        ConfigError::InvalidPort(0),
        ConfigError::InvalidBatchSize(0),
        ConfigError::InvalidModel(String::new()),
        ConfigError::MissingApiKey("gemini"),
        ConfigError::InvalidEnvValue {
            name: "EMBED_DIM".to_string(),
            value: "x".to_string(),
        },
    ];

    for error in errors {
        let message = format!("{error}");
        assert!(message.len() > 10);
    }
}
