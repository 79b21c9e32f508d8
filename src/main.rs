//! dlock - Quorum-Voting Distributed Lock Service
//!
//! Runs one cluster member: the wire listener for peer and client
//! messages plus the read-only status API.

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tracing_subscriber::fmt::writer::BoxMakeWriter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use dlock::api::HttpServer;
use dlock::config::{DlockConfig, LoggingConfig};
use dlock::error::Result;
use dlock::network::NetworkServer;
use dlock::Node;

/// dlock - Quorum-Voting Distributed Lock Service
#[derive(Parser)]
#[command(name = "dlock")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "dlock.toml")]
    config: PathBuf,

    /// Log level (trace, debug, info, warn, error); overrides the config file
    #[arg(short, long)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the dlock node
    Start,

    /// Initialize a new configuration file
    Init {
        /// Output path for configuration file
        #[arg(short, long, default_value = "dlock.toml")]
        output: PathBuf,

        /// Node ID
        #[arg(long, default_value = "dlock1")]
        node_id: String,
    },

    /// Validate configuration file
    Validate,

    /// Show node information
    Info,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Start => run_start(cli.config, cli.log_level).await,
        Commands::Init { output, node_id } => run_init(output, node_id),
        Commands::Validate => run_validate(cli.config),
        Commands::Info => run_info(cli.config),
    }
}

/// Initialize logging
fn init_logging(logging: &LoggingConfig) -> Result<()> {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| logging.level.as_str().into());

    let (writer, ansi) = match &logging.file {
        Some(path) => {
            let file = std::fs::File::create(path)?;
            (BoxMakeWriter::new(Arc::new(file)), false)
        }
        None => (BoxMakeWriter::new(std::io::stdout), true),
    };

    let layer = tracing_subscriber::fmt::layer()
        .with_writer(writer)
        .with_ansi(ansi);

    if logging.format == "json" {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(layer.json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(layer)
            .init();
    }

    Ok(())
}

/// Start the dlock node
async fn run_start(config_path: PathBuf, log_level: Option<String>) -> Result<()> {
    let mut config = match DlockConfig::from_file(&config_path) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Failed to load configuration from {:?}: {}", config_path, e);
            eprintln!("Please check that the config file exists and is valid TOML");
            return Err(e);
        }
    };
    if let Some(level) = log_level {
        config.logging.level = level;
    }

    if let Err(e) = init_logging(&config.logging) {
        eprintln!("Failed to open log sink {:?}: {}", config.logging.file, e);
        return Err(e);
    }

    tracing::info!(
        "Server Name: {} No of servers: {}",
        config.node.id,
        config.cluster.peers.len()
    );
    tracing::info!(
        "Quorum: accept >= {}, reject >= {}, round timeout {:?}",
        config.voting.accept_quorum,
        config.voting.reject_quorum,
        config.voting.round_timeout()
    );

    let node = Arc::new(Node::with_http_transport(&config)?);

    let network_server = NetworkServer::new(config.node.bind_address.clone(), node.dispatcher());
    let listener = match network_server.bind().await {
        Ok(l) => l,
        Err(e) => {
            tracing::error!("{}", e);
            return Err(e);
        }
    };

    let http_server = HttpServer::new(config.api.clone(), Arc::clone(&node));

    tokio::select! {
        result = network_server.serve(listener) => {
            if let Err(e) = result {
                tracing::error!("Network server error: {}", e);
                return Err(e);
            }
        }
        result = http_server.start() => {
            if let Err(e) = result {
                tracing::error!("HTTP server error: {}", e);
                return Err(e);
            }
        }
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Received shutdown signal");
        }
    }

    tracing::info!("dlock shutdown complete");
    Ok(())
}

fn run_init(output: PathBuf, node_id: String) -> Result<()> {
    let config_content = format!(r#"# dlock Configuration
# Generated configuration file

[node]
id = "{node_id}"
bind_address = "0.0.0.0:8080"

[cluster]
request_timeout_ms = 2000

[[cluster.peers]]
id = "dlock1"
address = "192.168.33.10:8080"

[[cluster.peers]]
id = "dlock2"
address = "192.168.33.11:8080"

[[cluster.peers]]
id = "dlock3"
address = "192.168.33.12:8080"

[[cluster.peers]]
id = "dlock4"
address = "192.168.33.13:8080"

[voting]
poll_interval_ms = 1000
max_polls = 5
accept_quorum = 3
reject_quorum = 2

[client]
reply_address = "127.0.0.1:9000"

[api]
enabled = true
bind_address = "0.0.0.0:9080"

[logging]
level = "info"
format = "pretty"
# file = "dlock.log"
"#);

    std::fs::write(&output, config_content)?;
    println!("Configuration file created: {}", output.display());
    println!("\nEdit the peer list so every node carries the same four entries.");
    println!("Then start with: dlock --config {} start", output.display());

    Ok(())
}

fn run_validate(config_path: PathBuf) -> Result<()> {
    match DlockConfig::from_file(&config_path) {
        Ok(config) => {
            println!("✓ Configuration is valid");
            println!("  Node ID: {}", config.node.id);
            println!("  Bind Address: {}", config.node.bind_address);
            println!("  Peers: {}", config.cluster.peers.len());
            println!(
                "  Quorum: accept {} / reject {}",
                config.voting.accept_quorum, config.voting.reject_quorum
            );
            Ok(())
        }
        Err(e) => {
            eprintln!("✗ Configuration error: {}", e);
            Err(e)
        }
    }
}

fn run_info(config_path: PathBuf) -> Result<()> {
    let config = DlockConfig::from_file(&config_path)?;

    println!("dlock Node Information");
    println!("======================");
    println!();
    println!("Node ID:          {}", config.node.id);
    println!("Bind Address:     {}", config.node.bind_address);
    println!("Advertised As:    {}", config.advertise_address().unwrap_or("(not in peer list)"));
    println!("Client Replies:   {}", config.client.reply_address.as_deref().unwrap_or("(disabled)"));
    println!(
        "Status API:       {}",
        if config.api.enabled { config.api.bind_address.as_str() } else { "(disabled)" }
    );
    println!();
    println!("Cluster:");
    for peer in &config.cluster.peers {
        println!("  {:<16} {}", peer.id, peer.address);
    }
    println!();
    println!("Voting:");
    println!("  Accept Quorum:  {}", config.voting.accept_quorum);
    println!("  Reject Quorum:  {}", config.voting.reject_quorum);
    println!("  Poll Interval:  {} ms", config.voting.poll_interval_ms);
    println!("  Max Polls:      {}", config.voting.max_polls);
    println!("  Round Timeout:  {:?}", config.voting.round_timeout());

    Ok(())
}
