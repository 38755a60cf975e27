//! gdrive_mcp - MCP server exposing Google Drive search and file retrieval.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use rmcp::transport::streamable_http_server::session::local::LocalSessionManager;
use rmcp::transport::streamable_http_server::StreamableHttpService;
use rmcp::{transport::stdio, ServiceExt};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use gdrive_mcp::credential::DEFAULT_TOKEN_FILE;
use gdrive_mcp::download::DEFAULT_CHUNK_SIZE;
use gdrive_mcp::server::{DriveTools, Session, SessionConfig, DEFAULT_PAGE_SIZE};
use gdrive_mcp::{setup, CredentialResolver, TokenSource};

/// MCP server for Google Drive.
#[derive(Parser)]
#[command(name = "gdrive_mcp")]
#[command(author, version, about, long_about = None)]
#[command(args_conflicts_with_subcommands = true)]
struct Cli {
    /// Path to the token file (.json or .bin).
    #[arg(long, global = true, env = "GDRIVE_TOKEN_PATH", default_value = DEFAULT_TOKEN_FILE)]
    token: PathBuf,

    #[command(flatten)]
    serve: ServeArgs,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Authorize access and write the token file.
    Setup {
        /// OAuth client secrets JSON downloaded from the Google Cloud console.
        #[arg(long, env = "GDRIVE_CLIENT_SECRETS")]
        credentials: PathBuf,
    },
}

#[derive(clap::Args)]
struct ServeArgs {
    /// Transport to serve on.
    #[arg(long, value_enum, env = "GDRIVE_MCP_TRANSPORT", default_value_t = Transport::Stdio)]
    transport: Transport,

    /// Listen address for the HTTP transport.
    #[arg(long, env = "GDRIVE_MCP_BIND", default_value = "127.0.0.1:8000")]
    bind: SocketAddr,

    /// Download chunk size in bytes.
    #[arg(long, env = "GDRIVE_CHUNK_SIZE", default_value_t = DEFAULT_CHUNK_SIZE)]
    chunk_size: u64,

    /// Search page size when the caller does not pass one.
    #[arg(long, default_value_t = DEFAULT_PAGE_SIZE)]
    page_size: u32,
}

#[derive(Clone, Copy, ValueEnum)]
enum Transport {
    /// MCP over stdin/stdout.
    Stdio,
    /// MCP streamable HTTP at /mcp.
    Http,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();

    // stdout carries the stdio transport, so logs go to stderr.
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "gdrive_mcp=info".into()),
        ))
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_ansi(false),
        )
        .init();

    let cli = Cli::parse();
    let source = TokenSource::new(&cli.token);

    match cli.command {
        Some(Commands::Setup { credentials }) => setup::setup(&credentials, &source)
            .await
            .with_context(|| format!("Setup failed for token file {:?}", cli.token)),
        None => serve(source, cli.serve).await,
    }
}

async fn serve(source: TokenSource, args: ServeArgs) -> Result<()> {
    let config = SessionConfig {
        chunk_size: args.chunk_size,
        default_page_size: args.page_size,
        ..SessionConfig::default()
    };
    let session = Arc::new(Session::new(source, CredentialResolver::new(), config));

    tracing::info!(token = %session.source().path().display(), "gdrive_mcp starting");
    session.warm_up().await;

    match args.transport {
        Transport::Stdio => {
            let service = DriveTools::new(session).serve(stdio()).await.inspect_err(|e| {
                tracing::error!("MCP serve error: {:?}", e);
            })?;
            service.waiting().await?;
        }
        Transport::Http => {
            let service = StreamableHttpService::new(
                move || Ok(DriveTools::new(Arc::clone(&session))),
                LocalSessionManager::default().into(),
                Default::default(),
            );
            let router = axum::Router::new().nest_service("/mcp", service);
            let listener = tokio::net::TcpListener::bind(args.bind)
                .await
                .with_context(|| format!("Failed to bind {}", args.bind))?;

            tracing::info!(addr = %args.bind, "serving MCP over HTTP at /mcp");
            axum::serve(listener, router)
                .with_graceful_shutdown(async {
                    let _ = tokio::signal::ctrl_c().await;
                })
                .await?;
        }
    }

    Ok(())
}
