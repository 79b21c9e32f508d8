//! dlockctl - Command line client for dlock clusters
//!
//! Usage:
//!   dlockctl lock <name>          - Ask a node to acquire a lock
//!   dlockctl release <name>       - Ask a node to release a lock
//!   dlockctl status               - Show node status
//!   dlockctl locks                - List the node's lock table
//!   dlockctl watch                - Print replies posted to the client address

use anyhow::Context;
use axum::{extract::Json, http::StatusCode, routing::post, Router};
use clap::{Parser, Subcommand};
use serde::Deserialize;

use dlock::network::{Message, Reply, ReplyType};

/// dlock Cluster Client
#[derive(Parser)]
#[command(name = "dlockctl")]
#[command(about = "Acquire, release and inspect dlock locks", long_about = None)]
struct Cli {
    /// Wire endpoint of the node (lock and release requests)
    #[arg(short, long, default_value = "127.0.0.1:8080")]
    endpoint: String,

    /// Status API endpoint of the node
    #[arg(short, long, default_value = "127.0.0.1:9080")]
    api: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Request a lock; blocks until the voting round finishes
    Lock {
        /// Lock name
        name: String,
    },
    /// Release a lock held by the node
    Release {
        /// Lock name
        name: String,
    },
    /// Show status of the node
    Status,
    /// List every lock the node has seen
    Locks,
    /// Show the last keep-alive the node received
    Heartbeat,
    /// Send a keep-alive on behalf of a cluster member
    KeepAlive {
        /// Member ID to report as sender
        server_id: String,
    },
    /// Listen for replies posted to the client address
    Watch {
        /// Address to listen on
        #[arg(short, long, default_value = "127.0.0.1:9000")]
        listen: String,
    },
}

// ============ API Response Types ============

#[derive(Debug, Deserialize)]
struct StatusResponse {
    #[serde(default)]
    node_id: String,
    #[serde(default)]
    cluster_size: usize,
    #[serde(default)]
    accept_quorum: usize,
    #[serde(default)]
    reject_quorum: usize,
    #[serde(default)]
    poll_interval_ms: u64,
    #[serde(default)]
    max_polls: u32,
    #[serde(default)]
    locks: LockSummary,
    #[serde(default)]
    last_heartbeat: Option<HeartbeatRecord>,
}

#[derive(Debug, Default, Deserialize)]
struct LockSummary {
    #[serde(default)]
    total_locks: usize,
    #[serde(default)]
    held: usize,
    #[serde(default)]
    tentative: usize,
    #[serde(default)]
    pending: usize,
}

#[derive(Debug, Deserialize)]
struct HeartbeatRecord {
    peer: String,
    received_at: String,
}

#[derive(Debug, Deserialize)]
struct LockInfo {
    name: String,
    state: String,
    #[serde(default)]
    last_outcome: Option<String>,
    #[serde(default)]
    updated_at: String,
}

// ============ Main ============

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let wire = format!("http://{}/", cli.endpoint);
    let api = format!("http://{}", cli.api);

    let result = match &cli.command {
        Commands::Lock { name } => {
            send_request(&wire, Message::LockRequest { lock_name: name.clone() }).await
        }
        Commands::Release { name } => {
            send_request(&wire, Message::LockRelease { lock_name: name.clone() }).await
        }
        Commands::Status => show_status(&api).await,
        Commands::Locks => list_locks(&api).await,
        Commands::Heartbeat => show_heartbeat(&api).await,
        Commands::KeepAlive { server_id } => {
            send_keep_alive(&wire, server_id.clone()).await
        }
        Commands::Watch { listen } => watch(listen).await,
    };

    if let Err(e) = result {
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}

async fn send_request(url: &str, message: Message) -> anyhow::Result<()> {
    let client = reqwest::Client::new();

    let response = client
        .post(url)
        .json(&message.to_envelope())
        .send()
        .await
        .with_context(|| format!("cannot reach node at {}", url))?;

    if !response.status().is_success() {
        anyhow::bail!("Node error: {}", response.status());
    }

    let reply: Reply = response.json().await?;
    let verdict = match reply.kind {
        ReplyType::LockAccept => "✓ granted",
        ReplyType::LockReject => "✗ rejected",
        ReplyType::LockRel => "released",
    };
    println!("{} {} ({})", reply.lock_name, verdict, reply.kind);

    if reply.kind == ReplyType::LockReject {
        std::process::exit(2);
    }
    Ok(())
}

async fn send_keep_alive(url: &str, server_id: String) -> anyhow::Result<()> {
    let client = reqwest::Client::new();
    let envelope = Message::KeepAlive { server_id: server_id.clone() }.to_envelope();

    let response = client.post(url).json(&envelope).send().await?;

    if !response.status().is_success() {
        anyhow::bail!("Node error: {}", response.status());
    }

    println!("Keep-alive sent as {}", server_id);
    Ok(())
}

async fn show_status(endpoint: &str) -> anyhow::Result<()> {
    let url = format!("{}/status", endpoint);
    let client = reqwest::Client::new();

    let response = client
        .get(&url)
        .send()
        .await
        .with_context(|| format!("cannot reach status API at {}", url))?;

    if !response.status().is_success() {
        anyhow::bail!("API error: {}", response.status());
    }

    let status: StatusResponse = response.json().await?;

    println!();
    println!("Node Status");
    println!("===========");
    println!();
    println!("Node ID:        {}", status.node_id);
    println!("Cluster Size:   {}", status.cluster_size);
    println!(
        "Quorum:         accept {} / reject {}",
        status.accept_quorum, status.reject_quorum
    );
    println!(
        "Round Timeout:  {} polls x {} ms",
        status.max_polls, status.poll_interval_ms
    );
    println!();
    println!(
        "Locks:          {} seen, {} held, {} tentative, {} pending",
        status.locks.total_locks, status.locks.held, status.locks.tentative, status.locks.pending
    );
    match &status.last_heartbeat {
        Some(hb) => println!("Last Heartbeat: {} at {}", hb.peer, hb.received_at),
        None => println!("Last Heartbeat: none"),
    }
    println!();

    Ok(())
}

async fn list_locks(endpoint: &str) -> anyhow::Result<()> {
    let url = format!("{}/locks", endpoint);
    let client = reqwest::Client::new();

    let response = client
        .get(&url)
        .send()
        .await
        .with_context(|| format!("cannot reach status API at {}", url))?;

    if !response.status().is_success() {
        anyhow::bail!("API error: {}", response.status());
    }

    let locks: Vec<LockInfo> = response.json().await?;

    if locks.is_empty() {
        println!("No locks seen by this node");
        return Ok(());
    }

    println!();
    println!("{:<24} {:<24} {:<12} {}", "LOCK", "STATE", "LAST ROUND", "UPDATED");
    println!("{}", "-".repeat(86));
    for lock in &locks {
        println!(
            "{:<24} {:<24} {:<12} {}",
            lock.name,
            lock.state,
            lock.last_outcome.as_deref().unwrap_or("-"),
            lock.updated_at
        );
    }
    println!();

    Ok(())
}

async fn show_heartbeat(endpoint: &str) -> anyhow::Result<()> {
    let url = format!("{}/heartbeat", endpoint);
    let client = reqwest::Client::new();

    let response = client
        .get(&url)
        .send()
        .await
        .with_context(|| format!("cannot reach status API at {}", url))?;

    if !response.status().is_success() {
        anyhow::bail!("API error: {}", response.status());
    }

    let record: Option<HeartbeatRecord> = response.json().await?;
    match record {
        Some(hb) => println!("Last keep-alive from {} at {}", hb.peer, hb.received_at),
        None => println!("No keep-alive received yet"),
    }

    Ok(())
}

async fn watch(listen: &str) -> anyhow::Result<()> {
    let app = Router::new().route("/", post(print_reply));

    let listener = tokio::net::TcpListener::bind(listen)
        .await
        .with_context(|| format!("cannot listen on {}", listen))?;
    println!("Waiting for replies on {} (Ctrl+C to exit)", listen);

    tokio::select! {
        result = async { axum::serve(listener, app).await } => result?,
        _ = tokio::signal::ctrl_c() => {}
    }

    Ok(())
}

async fn print_reply(Json(reply): Json<Reply>) -> StatusCode {
    println!(
        "[{}] {} {}",
        chrono::Local::now().format("%H:%M:%S"),
        reply.kind,
        reply.lock_name
    );
    StatusCode::OK
}
