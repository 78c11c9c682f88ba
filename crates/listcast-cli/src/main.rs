//! listcast CLI tool.

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

mod commands;

use commands::ApiClient;

#[derive(Parser)]
#[command(name = "listcast")]
#[command(about = "Client for the listcast render orchestrator", long_about = None)]
struct Cli {
    /// API server URL
    #[arg(long, env = "LISTCAST_API_URL", default_value = "http://localhost:4000")]
    api_url: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Render a listing video and wait for the result
    Render {
        /// Listing ID
        listing_id: u64,
        /// Video variant (server default when omitted)
        #[arg(long)]
        variant: Option<String>,
    },
    /// Cancel the render in progress
    Cancel,
    /// Check that the server is up and whether it is busy
    Health,
    /// Validate a service configuration
    Validate {
        /// Path to the configuration file
        #[arg(default_value = "listcast.kdl")]
        path: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Render {
            listing_id,
            variant,
        } => {
            let client = ApiClient::new(&cli.api_url)?;
            commands::render::render(&client, listing_id, variant).await?;
        }
        Commands::Cancel => {
            let client = ApiClient::new(&cli.api_url)?;
            commands::service::cancel(&client).await?;
        }
        Commands::Health => {
            let client = ApiClient::new(&cli.api_url)?;
            commands::service::health(&client).await?;
        }
        Commands::Validate { path } => {
            commands::validate(&path)?;
        }
    }

    Ok(())
}
