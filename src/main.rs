use std::sync::Arc;

use clap::{Parser, Subcommand};
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use agent_observer::{
    agent::CompletionClient,
    cli::{execute_command, ReportCommands},
    config::{Config, LogFormat},
    langbase::LangbaseClient,
    server::{AppState, McpServer},
    storage::SqliteStorage,
};

/// Session-scoped decision tracking for autonomous agents.
#[derive(Parser, Debug)]
#[command(name = "agent-observer", version, about)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the MCP server on stdio (default)
    Serve,

    /// Report on sessions persisted to the database
    Report {
        #[command(subcommand)]
        command: ReportCommands,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Load configuration
    let config = match Config::from_env() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Configuration error: {}", e);
            std::process::exit(1);
        }
    };

    // Initialize logging
    init_logging(&config);

    // Initialize storage
    let storage = match SqliteStorage::new(&config.database).await {
        Ok(s) => {
            info!(path = %config.database.path.display(), "Database initialized");
            s
        }
        Err(e) => {
            error!(error = %e, "Failed to initialize database");
            return Err(e.into());
        }
    };

    match cli.command.unwrap_or(Commands::Serve) {
        Commands::Serve => serve(config, storage).await,
        Commands::Report { command } => {
            let result = execute_command(command, &storage).await;
            if result.exit_code == 0 {
                println!("{}", result.message);
            } else {
                eprintln!("{}", result.message);
            }
            std::process::exit(result.exit_code);
        }
    }
}

async fn serve(config: Config, storage: SqliteStorage) -> anyhow::Result<()> {
    info!(
        version = env!("CARGO_PKG_VERSION"),
        "Agent observer starting..."
    );

    // Initialize Langbase client when an API key is configured
    let completion: Option<Arc<dyn CompletionClient>> = match &config.langbase {
        Some(langbase_config) => {
            let client =
                match LangbaseClient::new(langbase_config, &config.pipes, config.request.clone()) {
                    Ok(c) => {
                        info!(base_url = %c.base_url(), pipe = %c.pipe(), "Langbase client initialized");
                        c
                    }
                    Err(e) => {
                        error!(error = %e, "Failed to initialize Langbase client");
                        return Err(e.into());
                    }
                };

            // Analysis tools still register if the pipe cannot be created now
            if let Err(e) = client.ensure_analysis_pipe().await {
                warn!(error = %e, "Failed to ensure analysis pipe exists");
            }
            let client: Arc<dyn CompletionClient> = Arc::new(client);
            Some(client)
        }
        None => {
            info!("LANGBASE_API_KEY not set, task analysis disabled");
            None
        }
    };

    // Create application state
    let state = Arc::new(AppState::new(config, storage, completion));

    // Start MCP server
    let server = McpServer::new(state);

    info!("Server ready, waiting for requests on stdin...");

    if let Err(e) = server.run().await {
        error!(error = %e, "Server error");
        return Err(e.into());
    }

    info!("Server shutdown complete");
    Ok(())
}

/// Initialize tracing/logging
fn init_logging(config: &Config) {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.logging.level));

    match config.logging.format {
        LogFormat::Json => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(fmt::layer().json().with_writer(std::io::stderr))
                .init();
        }
        LogFormat::Pretty => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(fmt::layer().with_writer(std::io::stderr))
                .init();
        }
    }
}
