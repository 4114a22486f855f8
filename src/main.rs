use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;

use kb_rag::commands::{self, DEFAULT_INGEST_BATCH_SIZE};
use kb_rag::config::{Config, get_config_dir, run_interactive_config, show_config};

#[derive(Parser)]
#[command(name = "kb-rag")]
#[command(about = "Knowledge-base question answering over your own documents")]
#[command(version)]
struct Cli {
    /// Directory holding config.toml (defaults to the user config directory)
    #[arg(long, global = true, value_name = "DIR")]
    config_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Configure providers and storage interactively
    Config {
        /// Show current configuration
        #[arg(long)]
        show: bool,
    },
    /// Start the HTTP API
    Serve {
        /// Address to listen on, overriding the configured one
        #[arg(long, value_name = "ADDR")]
        bind: Option<String>,
        /// Skip the provider check and warm-up embedding
        #[arg(long)]
        no_warm_up: bool,
    },
    /// Ingest a .txt/.md file or every such file under a folder
    Ingest {
        path: PathBuf,
        /// Delete documents with the same title before ingesting
        #[arg(long)]
        replace: bool,
        /// Documents sent per ingestion call
        #[arg(long, default_value_t = DEFAULT_INGEST_BATCH_SIZE)]
        batch_size: usize,
    },
    /// Ask a question
    Query {
        text: String,
        /// Number of passages to retrieve
        #[arg(long)]
        top_k: Option<usize>,
    },
    /// Delete documents whose metadata matches every key=value filter
    Delete {
        #[arg(long = "filter", value_name = "KEY=VALUE", required = true)]
        filters: Vec<String>,
    },
    /// Show store contents and provider health
    Status,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    let config_dir = match cli.config_dir {
        Some(dir) => dir,
        None => get_config_dir().context("Failed to resolve config directory")?,
    };

    match cli.command {
        Commands::Config { show } => {
            if show {
                show_config(&config_dir)?;
            } else {
                run_interactive_config(&config_dir)?;
            }
        }
        Commands::Serve { bind, no_warm_up } => {
            let config = Config::load(&config_dir)?;
            let warm_up = config.server.warm_up && !no_warm_up;
            commands::serve(&config, bind.as_deref(), warm_up).await?;
        }
        Commands::Ingest {
            path,
            replace,
            batch_size,
        } => {
            let config = Config::load(&config_dir)?;
            commands::ingest_path(&config, &path, replace, batch_size).await?;
        }
        Commands::Query { text, top_k } => {
            let config = Config::load(&config_dir)?;
            commands::query(&config, &text, top_k).await?;
        }
        Commands::Delete { filters } => {
            let config = Config::load(&config_dir)?;
            commands::delete(&config, &filters).await?;
        }
        Commands::Status => {
            let config = Config::load(&config_dir)?;
            commands::show_status(&config).await?;
        }
    }

    Ok(())
}
