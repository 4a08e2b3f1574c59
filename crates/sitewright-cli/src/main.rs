//! Sitewright CLI
//!
//! Main entry point for serving the Sitewright task gateway.

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use sitewright_orchestrator::{
    create_router, AppState, Config, Credentials, ProjectOrchestrator, SitewrightError, TaskQueue,
};
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

/// Runtime failure, such as a port that cannot be bound.
const EXIT_FAILURE: u8 = 1;
/// Configuration or credentials are missing or invalid.
const EXIT_CONFIG: u8 = 2;

/// Sitewright - build and publish static apps from task briefs
///
/// Accepts task requests over HTTP, generates the app with an LLM, pushes it
/// to a new GitHub repository, publishes it on GitHub Pages and reports the
/// result to the caller's evaluation URL.
#[derive(Parser, Debug)]
#[command(name = "sitewright")]
#[command(version, about, long_about = None)]
struct Args {
    /// Path to configuration file (default: sitewright.json in current directory)
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Address to bind (overrides config)
    #[arg(long, value_name = "ADDR")]
    host: Option<String>,

    /// Port to listen on (overrides config)
    #[arg(short, long)]
    port: Option<u16>,

    /// Environment file to load credentials from (default: .env if present)
    #[arg(long, value_name = "FILE")]
    env_file: Option<PathBuf>,

    /// Enable verbose output (sets log level to debug)
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    // Loaded before tracing so RUST_LOG from the file takes effect.
    let env_loaded = match &args.env_file {
        Some(path) => dotenvy::from_path(path).map(|()| Some(path.clone())),
        None => Ok(dotenvy::dotenv().ok()),
    };

    // Priority: RUST_LOG env var > --verbose flag > default (info)
    let filter = if args.verbose {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug"))
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let env_file = match env_loaded {
        Ok(path) => path,
        Err(e) => {
            eprintln!("Error: failed to load environment file: {e}");
            return ExitCode::from(EXIT_CONFIG);
        }
    };
    tracing::info!("Sitewright starting");
    tracing::debug!(env_file = ?env_file, config = ?args.config, "Startup inputs");

    match serve(args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::from(exit_status(&e))
        }
    }
}

fn exit_status(error: &anyhow::Error) -> u8 {
    let fatal = error
        .downcast_ref::<SitewrightError>()
        .is_some_and(SitewrightError::is_fatal);
    if fatal {
        EXIT_CONFIG
    } else {
        EXIT_FAILURE
    }
}

/// Loads configuration, wires the pipeline and serves until Ctrl+C.
async fn serve(args: Args) -> anyhow::Result<()> {
    let mut config = load_config(args.config.as_deref())?;

    if let Some(host) = args.host {
        config.host = host;
    }
    if let Some(port) = args.port {
        config.port = port;
    }
    config.validate()?;

    let credentials = Credentials::from_env()?;
    let config = config.with_credentials(credentials);
    print_config(&config);

    let orchestrator = Arc::new(ProjectOrchestrator::from_config(&config)?);
    let queue = TaskQueue::new(orchestrator, config.queue.max_concurrent_tasks);
    let router = create_router(AppState::new(&config, queue));

    let address = config.bind_address();
    let listener = TcpListener::bind(&address).await.map_err(|e| {
        anyhow::anyhow!(
            "Failed to bind {address}: {e}\n\nSuggestion: Choose another port with --port or stop the process using it"
        )
    })?;
    let local = listener.local_addr()?;

    tracing::info!(address = %local, "HTTP server listening");
    println!("Sitewright running on http://{local}");
    println!("Press Ctrl+C to stop");

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Sitewright stopped");
    Ok(())
}

/// Loads configuration from the explicit path or the working directory.
fn load_config(config_path: Option<&Path>) -> anyhow::Result<Config> {
    match config_path {
        Some(path) => {
            if !path.exists() {
                anyhow::bail!(
                    "Config file not found: '{}'\n\nSuggestion: Check the path or remove the --config flag to use defaults",
                    path.display()
                );
            }
            Ok(Config::load_from_file(path)?)
        }
        None => Ok(Config::load()?),
    }
}

/// Resolves when Ctrl+C is received.
async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => tracing::info!("Received Ctrl+C, shutting down"),
        Err(e) => {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    }
}

/// Prints the effective configuration, without secrets.
fn print_config(config: &Config) {
    println!("Configuration loaded:");
    println!("  Listen: {}", config.bind_address());
    println!("  Owner: {}", config.credentials.owner);
    println!("  GitHub API: {}", config.github.api_url);
    println!("  Branch: {}", config.github.branch);
    println!("  Model: {}", config.model.name);
    println!(
        "  Callback: {} attempts, {}ms initial delay",
        config.callback.max_attempts, config.callback.initial_delay_ms
    );
    println!("  Max concurrent tasks: {}", config.queue.max_concurrent_tasks);
    println!("  Strict auth status: {}", config.strict_auth_status);
}
