
use anyhow::{Context, Result};
use console::style;
use dialoguer::{Confirm, Input, Password, Select};
use std::path::{Path, PathBuf};

use super::settings::{
    Config, EmbeddingBackend, EmbeddingSettings, GenerationBackend, GenerationSettings,
    StoreBackend, StoreSettings,
};

#[inline]
pub fn run_interactive_config(config_dir: &Path) -> Result<()> {
    eprintln!("{}", style("🔧 kb-rag Configuration Setup").bold().cyan());
    eprintln!();

    let mut config = load_existing_config(config_dir);

    eprintln!("{}", style("Embedding Provider").bold().yellow());
    eprintln!("Configure the service that turns text into vectors.");
    eprintln!();
    configure_embedding(&mut config.embedding)?;

    eprintln!();
    eprintln!("{}", style("Generation Provider").bold().yellow());
    eprintln!("Configure the language model that writes answers.");
    eprintln!();
    configure_generation(&mut config.generation)?;

    eprintln!();
    eprintln!("{}", style("Vector Store").bold().yellow());
    eprintln!();
    configure_store(&mut config.store)?;

    if config.embedding.backend == EmbeddingBackend::Ollama {
        eprintln!();
        eprintln!("{}", style("Testing configuration...").yellow());

        if test_ollama_connection(&config.embedding.url) {
            eprintln!("{}", style("✓ Ollama connection successful!").green());
        } else {
            eprintln!(
                "{}",
                style("⚠ Warning: Could not connect to Ollama").yellow()
            );
            eprintln!("You can continue, but make sure Ollama is running before ingesting.");
        }
    }

    eprintln!();
    if Confirm::new()
        .with_prompt("Save configuration?")
        .default(true)
        .interact()?
    {
        config.save().context("Failed to save configuration")?;
        eprintln!("{}", style("✓ Configuration saved successfully!").green());
        eprintln!(
            "Configuration saved to: {}",
            style(config.config_file_path().display()).cyan()
        );
    } else {
        eprintln!("Configuration not saved.");
    }

    Ok(())
}

#[inline]
pub fn show_config(config_dir: &Path) -> Result<()> {
    let config = Config::load(config_dir).context("Failed to load configuration")?;

    eprintln!("{}", style("📋 Current Configuration").bold().cyan());
    eprintln!();

    eprintln!("{}", style("Embedding:").bold().yellow());
    eprintln!("  Backend: {}", style(config.embedding.backend.as_str()).cyan());
    eprintln!("  URL: {}", style(&config.embedding.url).cyan());
    eprintln!("  Model: {}", style(&config.embedding.model).cyan());
    eprintln!("  Dimension: {}", style(config.embedding.dimension).cyan());
    eprintln!("  Batch Size: {}", style(config.embedding.batch_size).cyan());
    eprintln!(
        "  Retries: {} (backoff {}s)",
        style(config.embedding.retries).cyan(),
        style(config.embedding.retry_backoff_secs).cyan()
    );
    eprintln!("  API Key: {}", mask_secret(config.embedding.api_key.as_deref()));

    eprintln!();
    eprintln!("{}", style("Generation:").bold().yellow());
    eprintln!("  Backend: {}", style(config.generation.backend.as_str()).cyan());
    eprintln!("  URL: {}", style(&config.generation.url).cyan());
    eprintln!("  Model: {}", style(&config.generation.model).cyan());
    eprintln!("  Max Tokens: {}", style(config.generation.max_tokens).cyan());
    eprintln!("  Temperature: {}", style(config.generation.temperature).cyan());

    eprintln!();
    eprintln!("{}", style("Vector Store:").bold().yellow());
    eprintln!("  Backend: {}", style(config.store.backend.as_str()).cyan());
    match config.store.backend {
        StoreBackend::Qdrant => {
            eprintln!("  URL: {}", style(config.store.qdrant_url()).cyan());
            eprintln!("  Collection: {}", style(&config.store.collection).cyan());
        }
        StoreBackend::Lancedb => {
            eprintln!(
                "  Path: {}",
                style(config.vector_database_path().display()).cyan()
            );
        }
        StoreBackend::Memory => eprintln!("  {}", style("Documents are not persisted").dim()),
    }

    eprintln!();
    eprintln!("{}", style("Chunking & Query:").bold().yellow());
    eprintln!(
        "  Chunk Size: {} chars (overlap {})",
        style(config.chunking.target_size).cyan(),
        style(config.chunking.overlap).cyan()
    );
    eprintln!("  Default top_k: {}", style(config.query.default_top_k).cyan());
    eprintln!("  Server Bind: {}", style(&config.server.bind).cyan());

    eprintln!();
    eprintln!(
        "Config file: {}",
        style(config.config_file_path().display()).dim()
    );

    Ok(())
}

fn load_existing_config(config_dir: &Path) -> Config {
    Config::load_file(config_dir).map_or_else(
        |_| {
            eprintln!(
                "{}",
                style("No existing configuration found. Using defaults.").yellow()
            );
            Config {
                base_dir: config_dir.to_path_buf(),
                ..Config::default()
            }
        },
        |config| {
            eprintln!("{}", style("Found existing configuration.").green());
            config
        },
    )
}

fn configure_embedding(embedding: &mut EmbeddingSettings) -> Result<()> {
    let names: Vec<&str> = EmbeddingBackend::ALL.iter().map(|b| b.as_str()).collect();
    let default_index = EmbeddingBackend::ALL
        .iter()
        .position(|&b| b == embedding.backend)
        .unwrap_or(0);

    let index = Select::new()
        .with_prompt("Embedding backend")
        .default(default_index)
        .items(&names)
        .interact()?;
    let backend = EmbeddingBackend::ALL[index];

    let default_url = if backend == embedding.backend {
        embedding.url.clone()
    } else {
        backend.default_url().to_string()
    };

    let url = prompt_url("Embedding service URL", default_url)?;
    let model = prompt_model("Embedding model", embedding.model.clone())?;

    let dimension: usize = Input::new()
        .with_prompt("Embedding dimension")
        .default(embedding.dimension)
        .validate_with(|input: &usize| -> Result<(), &str> {
            if (64..=4096).contains(input) {
                Ok(())
            } else {
                Err("Dimension must be between 64 and 4096")
            }
        })
        .interact_text()?;

    let batch_size: usize = Input::new()
        .with_prompt("Batch size for embedding requests")
        .default(embedding.batch_size)
        .validate_with(|input: &usize| -> Result<(), &str> {
            if *input == 0 {
                Err("Batch size must be greater than 0")
            } else if *input > 1000 {
                Err("Batch size must be 1000 or less")
            } else {
                Ok(())
            }
        })
        .interact_text()?;

    if backend != EmbeddingBackend::Ollama {
        embedding.api_key = prompt_api_key(
            "Embedding API key",
            embedding.api_key.take(),
            backend == EmbeddingBackend::Gemini,
        )?;
    }

    embedding.backend = backend;
    embedding.url = url;
    embedding.model = model;
    embedding.set_dimension(dimension)?;
    embedding.set_batch_size(batch_size)?;

    Ok(())
}

fn configure_generation(generation: &mut GenerationSettings) -> Result<()> {
    let names: Vec<&str> = GenerationBackend::ALL.iter().map(|b| b.as_str()).collect();
    let default_index = GenerationBackend::ALL
        .iter()
        .position(|&b| b == generation.backend)
        .unwrap_or(0);

    let index = Select::new()
        .with_prompt("Generation backend")
        .default(default_index)
        .items(&names)
        .interact()?;
    let backend = GenerationBackend::ALL[index];

    let url = prompt_url("Generation service URL", generation.url.clone())?;
    let model = prompt_model("Generation model", generation.model.clone())?;

    if backend == GenerationBackend::Remote {
        generation.api_key = prompt_api_key("Generation API key", generation.api_key.take(), false)?;
    }

    generation.backend = backend;
    generation.url = url;
    generation.model = model;

    Ok(())
}

fn configure_store(store: &mut StoreSettings) -> Result<()> {
    let names: Vec<&str> = StoreBackend::ALL.iter().map(|b| b.as_str()).collect();
    let default_index = StoreBackend::ALL
        .iter()
        .position(|&b| b == store.backend)
        .unwrap_or(0);

    let index = Select::new()
        .with_prompt("Vector store backend")
        .default(default_index)
        .items(&names)
        .interact()?;
    store.backend = StoreBackend::ALL[index];

    match store.backend {
        StoreBackend::Qdrant => {
            store.host = Input::new()
                .with_prompt("Qdrant host")
                .default(store.host.clone())
                .validate_with(|input: &String| -> Result<(), &str> {
                    if input.trim().is_empty() {
                        Err("Host cannot be empty")
                    } else {
                        Ok(())
                    }
                })
                .interact_text()?;

            store.port = Input::new()
                .with_prompt("Qdrant gRPC port")
                .default(store.port)
                .validate_with(|input: &u16| -> Result<(), &str> {
                    if *input == 0 {
                        Err("Port must be greater than 0")
                    } else {
                        Ok(())
                    }
                })
                .interact_text()?;

            store.collection = prompt_model("Collection name", store.collection.clone())?;
        }
        StoreBackend::Lancedb => {
            let current = store
                .path
                .as_ref()
                .map(|path| path.display().to_string())
                .unwrap_or_default();
            let path: String = Input::new()
                .with_prompt("Database directory (empty for the config directory)")
                .default(current)
                .allow_empty(true)
                .interact_text()?;
            store.path = (!path.trim().is_empty()).then(|| PathBuf::from(path.trim()));
        }
        StoreBackend::Memory => {}
    }

    Ok(())
}

fn prompt_url(prompt: &str, default: String) -> Result<String> {
    let url: String = Input::new()
        .with_prompt(prompt)
        .default(default)
        .validate_with(|input: &String| -> Result<(), String> {
            match url::Url::parse(input) {
                Ok(url) if matches!(url.scheme(), "http" | "https") => Ok(()),
                _ => Err("URL must start with http:// or https://".to_string()),
            }
        })
        .interact_text()?;
    Ok(url)
}

fn prompt_model(prompt: &str, default: String) -> Result<String> {
    let name: String = Input::new()
        .with_prompt(prompt)
        .default(default)
        .validate_with(|input: &String| -> Result<(), &str> {
            if input.trim().is_empty() {
                Err("Name cannot be empty")
            } else {
                Ok(())
            }
        })
        .interact_text()?;
    Ok(name)
}

fn prompt_api_key(prompt: &str, current: Option<String>, required: bool) -> Result<Option<String>> {
    if current.is_some()
        && Confirm::new()
            .with_prompt(format!("{prompt} is set. Keep it?"))
            .default(true)
            .interact()?
    {
        return Ok(current);
    }

    let key = Password::new()
        .with_prompt(prompt)
        .allow_empty_password(!required)
        .interact()?;

    Ok((!key.trim().is_empty()).then_some(key))
}

fn mask_secret(secret: Option<&str>) -> String {
    match secret {
        Some(secret) if secret.chars().count() > 8 => {
            let prefix: String = secret.chars().take(4).collect();
            format!("{prefix}…")
        }
        Some(_) => "****".to_string(),
        None => "(not set)".to_string(),
    }
}

fn test_ollama_connection(base_url: &str) -> bool {
    let url = format!("{}/api/version", base_url.trim_end_matches('/'));

    let agent: ureq::Agent = ureq::Agent::config_builder()
        .timeout_global(Some(std::time::Duration::from_secs(5)))
        .build()
        .into();

    match agent.get(&url).call() {
        Ok(_) => true,
        Err(ureq::Error::StatusCode(code)) if (400..500).contains(&code) => true,
        Err(_) => false,
    }
}
