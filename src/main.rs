//! caphub — per-session capability server.
//!
//! Hosts one isolated capability set per client session over a single HTTP
//! endpoint: POST sends JSON-RPC requests, GET opens the NDJSON push stream,
//! DELETE ends the session. Dynamic tools are granted when a session's
//! messages match an activation rule.
//!
//! Usage:
//!   caphub                               # Default port 7070
//!   caphub --port 8080                   # Custom port
//!   caphub --require-identity            # Reject requests without x-user-id
//!   caphub --session-ttl-secs 600        # Evict sessions after ten minutes

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use caphub_capabilities::default_registry;
use caphub_server::{CapServer, ServerConfig};
use caphub_transport::{TransportConfig, TransportServer};
use clap::Parser;
use tracing::{debug, error, info};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "caphub", about = "caphub — per-session capability server")]
struct Cli {
    /// Port to listen on (0 for OS-assigned)
    #[arg(long, default_value = "7070")]
    port: u16,

    /// Hostname to bind to
    #[arg(long, default_value = "127.0.0.1")]
    hostname: String,

    /// Maximum concurrent listen connections
    #[arg(long, default_value = "64")]
    max_connections: usize,

    /// Close sessions older than this many seconds
    #[arg(long, default_value = "3600")]
    session_ttl_secs: u64,

    /// How often the eviction sweep runs
    #[arg(long, default_value = "60")]
    sweep_interval_secs: u64,

    /// Reject requests that carry no identity headers
    #[arg(long)]
    require_identity: bool,

    /// Enable permissive CORS
    #[arg(long)]
    cors: bool,

    /// Enable verbose logging
    #[arg(long)]
    verbose: bool,

    /// Write logs to a file (defaults to ./caphub.log if no path given)
    #[arg(long, default_missing_value = "DEFAULT", num_args = 0..=1)]
    log_file: Option<String>,

    /// Emit logs as JSON lines
    #[arg(long)]
    log_json: bool,
}

fn init_tracing(cli: &Cli) {
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    let Some(log_file_arg) = cli.log_file.as_deref() else {
        if cli.log_json {
            tracing_subscriber::fmt().json().with_env_filter(filter).init();
        } else {
            tracing_subscriber::fmt().with_env_filter(filter).init();
        }
        return;
    };

    let log_path = if log_file_arg == "DEFAULT" {
        PathBuf::from("caphub.log")
    } else {
        PathBuf::from(log_file_arg)
    };
    if let Some(parent) = log_path.parent() {
        let _ = std::fs::create_dir_all(parent);
    }
    let file = match std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&log_path)
    {
        Ok(file) => file,
        Err(e) => {
            eprintln!("Failed to open log file {}: {e}", log_path.display());
            std::process::exit(1);
        }
    };

    let writer = std::sync::Mutex::new(file);
    if cli.log_json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_writer(writer)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(writer)
            .with_ansi(false)
            .init();
    }
    eprintln!("Logging to {}", log_path.display());
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_tracing(&cli);

    let registry = match default_registry() {
        Ok(registry) => registry,
        Err(e) => {
            error!("Invalid capability registration: {e}");
            std::process::exit(1);
        }
    };

    let server_config = ServerConfig {
        session_ttl: Duration::from_secs(cli.session_ttl_secs),
        ..ServerConfig::default()
    };
    let server = Arc::new(CapServer::new(server_config, registry));

    let transport_config = TransportConfig {
        port: cli.port,
        hostname: cli.hostname.clone(),
        enable_cors: cli.cors,
        max_connections: Some(cli.max_connections),
        require_identity: cli.require_identity,
    };

    let mut transport = match TransportServer::start(transport_config, server.clone()).await {
        Ok(t) => t,
        Err(e) => {
            error!("Failed to start transport: {e}");
            std::process::exit(1);
        }
    };

    // ── Eviction sweep ───────────────────────────────────────────────────
    let sweep = {
        let server = server.clone();
        let period = Duration::from_secs(cli.sweep_interval_secs.max(1));
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let evicted = server.evict_expired();
                if evicted > 0 {
                    info!("Eviction sweep closed {evicted} sessions");
                } else {
                    debug!("Eviction sweep: nothing to close");
                }
            }
        })
    };

    println!();
    println!("╔══════════════════════════════════════════════════════════════╗");
    println!("║                        caphub server                         ║");
    println!("╚══════════════════════════════════════════════════════════════╝");
    println!();
    println!("  Endpoint:   http://{}:{}/mcp", cli.hostname, transport.port());
    println!("  Health:     http://{}:{}/health", cli.hostname, transport.port());
    println!("  Session TTL: {}s (sweep every {}s)", cli.session_ttl_secs, cli.sweep_interval_secs);
    println!(
        "  Identity:   {}",
        if cli.require_identity { "required" } else { "optional" }
    );
    println!();
    println!("  Press Ctrl+C to stop.");
    println!();

    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for shutdown signal: {e}");
    }

    info!("Shutdown signal received");
    sweep.abort();
    server.shutdown();
    transport.stop().await;
}
