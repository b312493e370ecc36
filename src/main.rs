mod config;
mod error;
mod knowledge;
mod llm;
mod resolver;
mod session;
mod shell;
mod suggestions;
mod utils;
mod vector_db;

use anyhow::Result;
use clap::Parser;
use config::{API_KEY_ENV, AppConfig, CONFIG_PATH_ENV, default_config_path};
use knowledge::KnowledgeStore;
use llm::{ChatCompletionsClient, GenerationClient};
use resolver::{AnswerResolver, PromptStyle};
use session::ConversationSession;
use shell::Shell;
use std::path::PathBuf;
use std::sync::Arc;
use std::{env, io};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

/// Chat with Ravi's digital self, grounded on a curated Q/A knowledge base.
#[derive(Parser, Debug)]
#[command(name = "ravigpt", version, about)]
struct Cli {
    /// Path to the TOML configuration file.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// JSONL knowledge base (overrides the config file).
    #[arg(short, long)]
    knowledge_base: Option<PathBuf>,

    /// Prompt wording used when delegating to the model.
    #[arg(long, value_enum)]
    style: Option<PromptStyle>,

    /// Log level (trace, debug, info, warn, error).
    #[arg(short, long)]
    log_level: Option<String>,

    /// Answer a single question and exit.
    #[arg(long)]
    ask: Option<String>,
}

impl Cli {
    /// Priority: --config flag > RAVIGPT_CONFIG env var > platform default.
    fn resolve_config_path(&self) -> PathBuf {
        if let Some(ref p) = self.config {
            return p.clone();
        }
        if let Ok(p) = env::var(CONFIG_PATH_ENV) {
            return PathBuf::from(p);
        }
        default_config_path()
    }
}

fn init_tracing(level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = AppConfig::load(cli.resolve_config_path())?;
    config.apply_api_key(env::var(API_KEY_ENV).ok());
    if let Some(path) = cli.knowledge_base {
        config.knowledge_base = path;
    }
    if let Some(style) = cli.style {
        config.resolver.style = style;
    }

    init_tracing(cli.log_level.as_deref().unwrap_or(&config.log_level));

    if config.generation.api_key.is_none() {
        warn!("No API key configured; set {API_KEY_ENV} unless the endpoint is unauthenticated");
    }

    let store = KnowledgeStore::load(&config.knowledge_base);
    if store.is_empty() {
        info!("Knowledge base is empty; every question goes to the model");
    }

    let client = ChatCompletionsClient::new(config.generation.clone())?;
    info!(model = %client.model_name(), "Generation client ready");

    let resolver = AnswerResolver::new(
        Arc::new(store),
        Arc::new(client),
        config.resolver.to_resolver_config(),
    );

    if let Some(question) = cli.ask {
        let mut session = ConversationSession::new();
        let answer = resolver.resolve(&mut session, &question).await?;
        println!("{}", answer.text);
        return Ok(());
    }

    println!("RaviGPT ready! Ask me anything (/topics for suggestions, /quit to exit)");

    let mut shell = Shell::new(resolver, config.suggestions);
    shell.run(io::stdin().lock(), &mut io::stdout()).await
}
