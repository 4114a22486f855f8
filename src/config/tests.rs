use super::*;
use serial_test::serial;
use std::fs;
use tempfile::TempDir;

const OVERRIDDEN: [&str; 3] = ["EMBED_MODEL", "QDRANT_COLLECTION", "RAG_TOP_K"];

fn clear_overrides() {
    for name in OVERRIDDEN {
        // SAFETY: env-mutating tests are serialized with `#[serial]`
        unsafe { std::env::remove_var(name) };
    }
}

#[test]
#[serial]
fn load_applies_process_environment() {
    let temp_dir = TempDir::new().expect("should create temp dir");
    fs::write(
        temp_dir.path().join("config.toml"),
        "[embedding]\nmodel = \"from-file\"\n\n[store]\ncollection = \"file_collection\"\n",
    )
    .expect("should write config");

    clear_overrides();
    // SAFETY: env-mutating tests are serialized with `#[serial]`
    unsafe {
        std::env::set_var("EMBED_MODEL", "from-env");
        std::env::set_var("RAG_TOP_K", "9");
    }

    let config = Config::load(temp_dir.path());
    clear_overrides();

    let config = config.expect("config should load");
    assert_eq!(config.embedding.model, "from-env");
    assert_eq!(config.store.collection, "file_collection");
    assert_eq!(config.query.default_top_k, 9);
}

#[test]
#[serial]
fn load_rejects_invalid_environment() {
    let temp_dir = TempDir::new().expect("should create temp dir");

    clear_overrides();
    // SAFETY: env-mutating tests are serialized with `#[serial]`
    unsafe { std::env::set_var("RAG_TOP_K", "many") };

    let result = Config::load(temp_dir.path());
    clear_overrides();

    assert!(result.is_err());
}

#[test]
#[serial]
fn load_rejects_invalid_file_values() {
    let temp_dir = TempDir::new().expect("should create temp dir");
    fs::write(
        temp_dir.path().join("config.toml"),
        "[chunking]\ntarget_size = 400\noverlap = 400\n",
    )
    .expect("should write config");

    clear_overrides();
    let error = Config::load(temp_dir.path()).expect_err("overlap equal to size is invalid");
    assert!(format!("{error:#}").contains("overlap"));
}

#[test]
fn config_dir_is_named_after_the_crate() {
    let dir = get_config_dir().expect("platform config directory should resolve");
    assert!(dir.ends_with("kb-rag"));
}
