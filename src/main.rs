//! Gemini Relay
//!
//! A self-hosted relay for the Google Gemini API with multi-key rotation
//! and failover.

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::io::Read;
use std::path::PathBuf;
use std::sync::Arc;

use gemini_relay::{
    config::{Environment, Settings},
    server::App,
    services::gemini::{GeminiClient, GenerateClient},
    services::key_pool::{ApiKey, RotationPolicy},
    services::relay::RelayService,
    store::{FileStore, StateStore},
};

/// Gemini Relay
///
/// Ask Google Gemini from the command line or over a local HTTP endpoint,
/// rotating across a pool of API keys on failure.
#[derive(Parser, Debug)]
#[command(name = "gemini-relay")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Log level: trace, debug, info, warn, error (overrides LOG_LEVEL env var)
    #[arg(long)]
    log_level: Option<String>,

    /// Environment: dev, prod (overrides ENVIRONMENT env var)
    #[arg(short, long)]
    env: Option<Environment>,

    /// Key rotation policy (overrides ROTATION_POLICY env var)
    #[arg(long, value_enum)]
    policy: Option<RotationPolicy>,

    /// Model name (overrides GEMINI_MODEL env var)
    #[arg(long)]
    model: Option<String>,

    /// State file path (overrides STATE_FILE env var)
    #[arg(long)]
    state_file: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Send a question through the key pool and print the answer
    Ask {
        /// The question; read from stdin when omitted
        text: Vec<String>,

        /// Override the configured system prompt for this question
        #[arg(long)]
        system_prompt: Option<String>,
    },

    /// Manage the API key pool
    Keys {
        #[command(subcommand)]
        command: KeysCommand,
    },

    /// Show the most recent question and answer
    History,

    /// Serve the relay over HTTP
    Serve {
        /// Port to listen on (overrides PORT env var)
        #[arg(short, long)]
        port: Option<u16>,

        /// Host to bind to (overrides HOST env var)
        #[arg(long)]
        host: Option<String>,
    },
}

#[derive(Subcommand, Debug)]
enum KeysCommand {
    /// Add a key to the pool
    Add { secret: String },

    /// Remove a key from the pool
    Remove { secret: String },

    /// List keys (redacted) with their health state
    List,

    /// Reset every key to active
    Unlock,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Load configuration first (before logging, so we can use log_level)
    let mut settings = Settings::load()?;

    // Override settings with CLI arguments
    if let Some(log_level) = args.log_level {
        settings.log_level = log_level;
    }
    if let Some(env) = args.env {
        settings.environment = env;
    }
    if let Some(policy) = args.policy {
        settings.policy = policy;
    }
    if let Some(model) = args.model {
        settings.model = model;
    }
    if let Some(state_file) = args.state_file {
        settings.state_file = state_file;
    }

    init_tracing(&settings.log_level);

    match args.command {
        Command::Ask {
            text,
            system_prompt,
        } => {
            if let Some(prompt) = system_prompt {
                settings.system_prompt = Some(prompt);
            }
            let question = read_question(text)?;
            ask(settings, &question).await
        }
        Command::Keys { command } => keys(settings, command).await,
        Command::History => history(settings).await,
        Command::Serve { port, host } => {
            if let Some(port) = port {
                settings.port = port;
            }
            if let Some(host) = host {
                settings.host = host;
            }

            tracing::info!(
                app_name = %settings.app_name,
                version = %settings.app_version,
                environment = %settings.environment,
                "Starting application"
            );

            let app = App::new(settings).await?;
            app.run_with_graceful_shutdown().await?;

            tracing::info!("Application shutdown complete");
            Ok(())
        }
    }
}

/// Build the relay service with the file-backed store
fn build_relay(settings: &Settings) -> Result<(Arc<RelayService>, Arc<FileStore>)> {
    let settings = Arc::new(settings.clone());
    let store = Arc::new(FileStore::new(&settings.state_file));
    let client: Arc<dyn GenerateClient> = Arc::new(GeminiClient::new(
        settings.model.clone(),
        settings.base_url.clone(),
        settings.request_timeout_seconds,
    )?);
    let relay = Arc::new(RelayService::new(settings, store.clone(), client));
    Ok((relay, store))
}

async fn ask(settings: Settings, question: &str) -> Result<()> {
    let (relay, _store) = build_relay(&settings)?;
    relay.seed_keys().await?;

    let outcome = relay.ask(question).await?;
    println!("{}", outcome.text);

    if !outcome.ok {
        std::process::exit(1);
    }
    Ok(())
}

async fn keys(settings: Settings, command: KeysCommand) -> Result<()> {
    let store = FileStore::new(&settings.state_file);

    match command {
        KeysCommand::Add { secret } => {
            let mut pool = store.load_pool().await?;
            if !pool.insert(ApiKey::new(secret)) {
                anyhow::bail!("That key is already in the pool");
            }
            store.save_pool(&pool).await?;
            println!("Added. The pool now holds {} key(s).", pool.len());
        }
        KeysCommand::Remove { secret } => {
            let mut pool = store.load_pool().await?;
            if !pool.remove(&secret) {
                anyhow::bail!("No such key in the pool");
            }
            store.save_pool(&pool).await?;
            println!("Removed. The pool now holds {} key(s).", pool.len());
        }
        KeysCommand::List => {
            let pool = store.load_pool().await?;
            if pool.is_empty() {
                println!("No keys configured.");
            }
            for (position, key) in pool.iter().enumerate() {
                println!("{position}: {} [{}]", key.masked_secret(), key.health());
            }
        }
        KeysCommand::Unlock => {
            let mut pool = store.load_pool().await?;
            pool.reset_all();
            store.save_pool(&pool).await?;
            println!("All {} key(s) reset to active.", pool.len());
        }
    }
    Ok(())
}

async fn history(settings: Settings) -> Result<()> {
    let store = FileStore::new(&settings.state_file);
    let (question, answer) = store.last_exchange().await?;

    match (question, answer) {
        (None, None) => println!("No history yet."),
        (question, answer) => {
            println!("Q: {}", question.unwrap_or_else(|| "(none)".to_string()));
            println!();
            println!("A: {}", answer.unwrap_or_else(|| "(none)".to_string()));
        }
    }
    Ok(())
}

/// Join CLI words into the question, falling back to stdin
fn read_question(text: Vec<String>) -> Result<String> {
    let question = if text.is_empty() {
        let mut buffer = String::new();
        std::io::stdin().read_to_string(&mut buffer)?;
        buffer
    } else {
        text.join(" ")
    };

    let question = question.trim().to_string();
    if question.is_empty() {
        anyhow::bail!("Nothing to ask: pass the question as arguments or on stdin");
    }
    Ok(question)
}

/// Initialize tracing subscriber with the specified log level
fn init_tracing(log_level: &str) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}
