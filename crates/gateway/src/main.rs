use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use sha2::{Digest, Sha256};
use tracing_subscriber::EnvFilter;

use mesh_gateway::api;
use mesh_gateway::bindings::Bindings;
use mesh_gateway::directory::{KeyDirectory, LocalDirectory, RemoteDirectory};
use mesh_gateway::relay::AgentHost;
use mesh_gateway::sched::AlarmRegistry;
use mesh_gateway::state::AppState;
use mesh_memory::Memory;
use mesh_runtime::http::HttpAgentFactory;
use mesh_runtime::scripted::ScriptedFactory;
use mesh_runtime::AgentFactory;
use mesh_store::Store;

#[derive(Parser)]
#[command(name = "agentmesh", about = "Multi-agent network kernel")]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(clap::Subcommand)]
enum Command {
    /// Run the gateway (default).
    Serve,
    /// Print the version.
    Version,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    match cli.command {
        None | Some(Command::Serve) => {
            init_tracing();
            run_server().await
        }
        Some(Command::Version) => {
            println!("agentmesh {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
    }
}

/// Structured JSON tracing (only for `serve`).
fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,mesh_gateway=debug")),
        )
        .json()
        .init();
}

async fn run_server() -> anyhow::Result<()> {
    tracing::info!("AgentMesh starting");

    let bindings = Bindings::from_env();
    for name in bindings.missing() {
        tracing::warn!(binding = name, "required binding missing, /health will report it");
    }

    // ── Record store ─────────────────────────────────────────────────
    let store_path = bindings
        .store_path
        .clone()
        .unwrap_or_else(|| "agentmesh.db".into());
    let store = Store::open(&store_path)
        .with_context(|| format!("opening store at {}", store_path.display()))?;
    tracing::info!(path = %store_path.display(), "record store ready");

    // ── Agent runtime factory ────────────────────────────────────────
    let factory: Arc<dyn AgentFactory> = match &bindings.model_api_key {
        Some(key) => {
            let base_url = bindings
                .model_base_url
                .clone()
                .unwrap_or_else(|| "https://openrouter.ai/api/v1".into());
            tracing::info!(base_url = %base_url, "HTTP agent runtime ready");
            Arc::new(
                HttpAgentFactory::new(base_url, key.clone())
                    .context("initializing agent runtime")?,
            )
        }
        None => {
            tracing::warn!("MODEL_API_KEY not set, using the scripted echo runtime");
            Arc::new(ScriptedFactory::new())
        }
    };

    // ── Key directory ────────────────────────────────────────────────
    let directory: Arc<dyn KeyDirectory> = match &bindings.relay {
        Some(relay) => {
            tracing::info!(relay = %relay, "remote key directory");
            Arc::new(RemoteDirectory::new(relay.clone()).context("initializing relay client")?)
        }
        None => {
            tracing::info!("serving the key directory in-process");
            Arc::new(LocalDirectory::new(store.clone()))
        }
    };

    // ── Admin token (read once, hash for constant-time comparison) ───
    let admin_token_hash = bindings.admin_token.as_ref().map(|token| {
        tracing::info!("admin bearer-token auth enabled");
        Sha256::digest(token.as_bytes()).to_vec()
    });
    if admin_token_hash.is_none() {
        tracing::warn!("ADMIN_TOKEN not set, protected routes will refuse access");
    }

    // ── Relay + scheduler ────────────────────────────────────────────
    let host = AgentHost::new();
    let alarms = AlarmRegistry::new();

    let state = AppState {
        bindings: Arc::new(bindings),
        store: store.clone(),
        memory: Memory::new(store.clone()),
        factory,
        host: host.clone(),
        alarms: alarms.clone(),
        directory,
        admin_token_hash,
    };

    // ── Reload registered agents (cold start) ────────────────────────
    let registered = store.registry_list().context("reading agent registry")?;
    for row in &registered {
        if let Err(e) = host
            .spawn_agent(state.actor_deps(), &row.name, row.created_at, None)
            .await
        {
            tracing::error!(agent = %row.name, error = %e, "failed to reload agent");
        }
    }
    tracing::info!(agents = registered.len(), "agents reloaded from registry");

    // ── Alarm dispatcher ─────────────────────────────────────────────
    tokio::spawn(alarms.clone().run(host.clone()));
    tracing::info!("alarm registry started");

    // ── Bind ─────────────────────────────────────────────────────────
    let host_addr = std::env::var("MESH_HOST").unwrap_or_else(|_| "0.0.0.0".into());
    let port = std::env::var("MESH_PORT")
        .ok()
        .and_then(|p| p.parse::<u16>().ok())
        .unwrap_or(8787);
    let addr = format!("{host_addr}:{port}");
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("binding to {addr}"))?;
    tracing::info!(addr = %addr, "AgentMesh listening");

    axum::serve(listener, api::app(state))
        .await
        .context("axum server error")?;
    Ok(())
}
