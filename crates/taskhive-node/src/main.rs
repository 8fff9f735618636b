use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use taskhive_node::{api, NodeConfig, TaskhiveNode};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "taskhive")]
#[command(about = "Taskhive - micro-task marketplace node", long_about = None)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Verbosity level (can be repeated)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the node
    Start {
        /// Data directory for the file-backed store
        #[arg(short, long, default_value = "./data")]
        data_dir: PathBuf,

        /// Port for the HTTP API
        #[arg(long, default_value = "8080")]
        api_port: u16,
    },

    /// Write a default configuration file
    Init {
        /// Output directory for the configuration
        #[arg(short, long, default_value = ".")]
        output: PathBuf,
    },
}

fn init_tracing(verbose: u8) {
    let default_level = match verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("taskhive={0},tower_http={0}", default_level)));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match cli.command {
        Commands::Start { data_dir, api_port } => {
            let config = match &cli.config {
                Some(path) => NodeConfig::from_file(path)
                    .with_context(|| format!("load config {}", path.display()))?,
                None => NodeConfig::default_with_paths(data_dir, api_port),
            };

            let api_enabled = config.api.enabled;
            let host = config.api.host.clone();
            let port = config.api.port;

            let node = Arc::new(TaskhiveNode::new(config).await?);

            let server = if api_enabled {
                Some(api::start_api_server(node, host, port))
            } else {
                None
            };

            tokio::signal::ctrl_c()
                .await
                .context("listen for shutdown signal")?;
            info!("Shutting down");
            if let Some(server) = server {
                server.abort();
            }
        }
        Commands::Init { output } => {
            std::fs::create_dir_all(&output)
                .with_context(|| format!("create {}", output.display()))?;
            let path = output.join("taskhive.toml");
            NodeConfig::default().save_to_file(&path)?;
            info!(path = %path.display(), "Configuration written");
        }
    }

    Ok(())
}
