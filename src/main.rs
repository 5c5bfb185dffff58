#![warn(clippy::all, clippy::pedantic)]
#![allow(clippy::missing_errors_doc, clippy::missing_panics_doc)]

use anyhow::Result;
use chrono::{NaiveDate, Utc};
use clap::{Parser, Subcommand};
use std::net::SocketAddr;
use std::sync::Arc;
use steward::agent::{
    ConversationRequest, Orchestrator, Scope, ToolRegistry,
};
use steward::config::Config;
use steward::digest::DigestGenerator;
use steward::embedding::{EmbeddingProvider, NoopEmbedding, OpenAiEmbedding};
use steward::gateway::{self, AppState};
use steward::llm::{create_provider, CliStreamSink};
use steward::retrieval::RetrievalGateway;
use steward::store::{SqliteStore, Store};
use tracing::Level;
use tracing_subscriber::FmtSubscriber;

#[derive(Parser)]
#[command(name = "steward", about = "Executive-assistant conversation pipeline")]
struct Cli {
    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the HTTP gateway
    Serve {
        /// Override the configured bind port
        #[arg(long)]
        port: Option<u16>,
    },
    /// Run one conversation turn from the command line
    Chat {
        /// The message to send
        message: String,
        /// Bind the conversation to one project
        #[arg(long)]
        project: Option<String>,
        /// ISO date anchoring calendar retrieval
        #[arg(long)]
        date: Option<NaiveDate>,
    },
    /// Generate a daily digest
    Digest {
        /// ISO date, defaults to today
        #[arg(long)]
        date: Option<NaiveDate>,
        /// Persist the digest to the store
        #[arg(long)]
        persist: bool,
    },
}

struct App {
    orchestrator: Arc<Orchestrator>,
    digest: Arc<DigestGenerator>,
    store: Arc<dyn Store>,
    config: Config,
}

async fn build_app(config: Config) -> Result<App> {
    let provider = create_provider(&config.llm);

    let embedder: Arc<dyn EmbeddingProvider> = match config
        .embedding
        .api_key
        .clone()
        .or_else(|| config.llm.resolve_api_key())
    {
        Some(key) => Arc::new(OpenAiEmbedding::new(
            &config.embedding.base_url,
            &key,
            &config.embedding.model,
        )),
        None => {
            tracing::warn!("no embedding API key configured; semantic retrieval disabled");
            Arc::new(NoopEmbedding)
        }
    };

    let db_path = config.store.resolve_db_path(&config.workspace_dir);
    let store: Arc<dyn Store> = Arc::new(SqliteStore::open(&db_path).await?);

    let retrieval = Arc::new(RetrievalGateway::new(embedder, store.clone()));
    let registry = Arc::new(ToolRegistry::standard());
    let orchestrator = Arc::new(Orchestrator::new(
        provider,
        retrieval.clone(),
        registry,
        &config.llm,
        &config.agent,
    ));
    let digest = Arc::new(DigestGenerator::new(orchestrator.clone(), retrieval));

    Ok(App {
        orchestrator,
        digest,
        store,
        config,
    })
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose { Level::DEBUG } else { Level::INFO };
    let subscriber = FmtSubscriber::builder().with_max_level(level).finish();
    tracing::subscriber::set_global_default(subscriber)
        .expect("setting default subscriber failed");

    let config = Config::load()?;
    let app = build_app(config).await?;

    match cli.command {
        Command::Serve { port } => {
            let host = app.config.gateway.host.clone();
            let port = port.unwrap_or(app.config.gateway.port);
            let addr: SocketAddr = format!("{host}:{port}").parse()?;
            let state = AppState::new(
                app.orchestrator,
                app.digest,
                app.store,
                &app.config.agent,
            );
            gateway::run(state, addr).await
        }
        Command::Chat {
            message,
            project,
            date,
        } => {
            let scope = match project {
                Some(slug) => Scope::project(slug.clone(), slug),
                None => Scope::global(app.config.agent.default_user.clone()),
            };
            let request = ConversationRequest {
                scope,
                message,
                history: Vec::new(),
                date,
            };
            let result = app
                .orchestrator
                .run(&request, Some(Arc::new(CliStreamSink::new())))
                .await;
            println!("{}", result.reply);
            if !result.proposals.is_empty() {
                println!("\n--- proposals ---");
                println!("{}", serde_json::to_string_pretty(&result.proposals)?);
            }
            Ok(())
        }
        Command::Digest { date, persist } => {
            let scope = Scope::global(app.config.agent.default_user.clone());
            let date = date.unwrap_or_else(|| Utc::now().date_naive());
            let payload = app.digest.generate(&scope, date).await;
            if persist {
                let value = serde_json::to_value(&payload)?;
                app.store.save_digest(&scope, date, &value).await?;
            }
            println!("{}", serde_json::to_string_pretty(&payload)?);
            Ok(())
        }
    }
}
