//! blame-lens - per-line authorship annotations served over HTTP
//!
//! # Usage
//! ```bash
//! blame-lens /path/to/repository                      # Start server on :3001
//! blame-lens /path/to/repository --port 4000 --dark   # Dark-theme colors
//! blame-lens . --config annotations.toml              # Custom configuration
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use axum::Router;
use clap::Parser;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use blame_lens::annotate::{Annotator, DecorationHost, ThemeKind};
use blame_lens::config::AnnotationConfig;
use blame_lens::git::repository::head_summary;
use blame_lens::git::{GitRepository, VersionControl};
use blame_lens::routes::{self, store::DecorationStore};

/// blame-lens - Progressive line annotations for a git working copy
#[derive(Parser)]
#[command(name = "blame-lens")]
#[command(about = "Serves per-line authorship annotations for a git repository", long_about = None)]
struct Cli {
    /// Path to the git repository to annotate
    #[arg(value_name = "REPO_PATH")]
    repo_path: String,

    /// Port to run the server on
    #[arg(short, long, default_value = "3001")]
    port: u16,

    /// TOML file with annotation settings
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Use colors tuned for dark editor themes
    #[arg(long)]
    dark: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize tracing (quieter for production)
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "warn".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = match &cli.config {
        Some(path) => AnnotationConfig::load(path),
        None => Ok(AnnotationConfig::default()),
    };
    let config = match config {
        Ok(c) => c,
        Err(e) => {
            eprintln!("✗ {}", e);
            std::process::exit(1);
        }
    };

    let repo = match GitRepository::open(&cli.repo_path) {
        Ok(r) => r,
        Err(e) => {
            eprintln!("✗ Failed to open repository: {}", e);
            eprintln!("  Path: {}", cli.repo_path);
            std::process::exit(1);
        }
    };

    let canonical_path = repo.workdir().to_string_lossy().to_string();
    let head = head_summary(&repo);
    let theme = if cli.dark { ThemeKind::Dark } else { ThemeKind::Light };

    let store = Arc::new(DecorationStore::new());
    let vcs: Arc<dyn VersionControl> = Arc::new(repo);
    let host: Arc<dyn DecorationHost> = store.clone();
    let annotator = Annotator::new(vcs, host, config, theme);

    // CORS configuration
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let app = Router::new()
        .merge(routes::create_router(annotator, store))
        .layer(cors)
        .layer(TraceLayer::new_for_http());

    let addr = format!("127.0.0.1:{}", cli.port);
    let listener = match tokio::net::TcpListener::bind(&addr).await {
        Ok(l) => l,
        Err(e) => {
            eprintln!("✗ Failed to bind to port {}: {}", cli.port, e);
            eprintln!("  Try a different port with --port <PORT>");
            std::process::exit(1);
        }
    };

    println!();
    println!("  ┌─────────────────────────────────────────────┐");
    println!("  │                 blame-lens                  │");
    println!("  └─────────────────────────────────────────────┘");
    println!();
    println!("  Repository: {}", canonical_path);
    if let Some(head) = head {
        println!("  HEAD:       {} {}", &head.revision[..head.revision.len().min(8)], head.msg);
    }
    println!("  Server:     http://{}", addr);
    println!("  Theme:      {:?}", theme);
    println!();
    println!("  Press Ctrl+C to stop");
    println!();

    let shutdown = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
        println!("\n  Shutting down...");
    };

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await?;

    Ok(())
}
