mod api;
mod auth;
mod cache;
mod config;
mod core;
mod engine;
mod error;
mod storage;

use cache::InProcessCache;
use clap::Parser;
use config::LedgerConfig;
use engine::Ledger;
use parking_lot::RwLock;
use std::sync::Arc;
use storage::SledStore;

#[derive(Parser)]
#[command(name = "cadcoin")]
#[command(about = "CAD-COIN ledger service: PoW-mined, fiat-pegged ledger with user-defined stablecoins", long_about = None)]
struct Cli {
    /// Configuration file path (defaults to ./cadcoin.toml if present)
    #[arg(short = 'c', long)]
    config: Option<String>,

    /// API bind port (overrides config)
    #[arg(short, long)]
    port: Option<u16>,

    /// Database path (overrides config)
    #[arg(short, long)]
    db: Option<String>,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt().with_target(false).with_level(true).init();

    let cli = Cli::parse();

    let mut cfg = LedgerConfig::load_with_overrides(cli.config).expect("failed to load configuration");
    if let Some(port) = cli.port {
        cfg.node.api_port = port;
    }
    if let Some(db) = cli.db {
        cfg.node.db_path = db;
    }
    cfg.validate().expect("invalid configuration");
    cfg.print_effective_config();

    let store: Arc<dyn storage::Store> =
        Arc::new(SledStore::open(&cfg.node.db_path).expect("failed to open database"));
    let cache: Arc<dyn cache::HotCache> = Arc::new(InProcessCache::new(60));
    let ledger = Ledger::new(store, cache, cfg.consensus.clone());
    ledger.ensure_genesis().expect("failed to seed genesis block");

    tracing::info!(
        bind = %format!("{}:{}", cfg.node.bind_address, cfg.node.api_port),
        "starting CAD-COIN ledger service"
    );

    let state = api::ApiState {
        ledger: Arc::new(RwLock::new(ledger)),
        security: Arc::new(cfg.security.clone()),
    };
    let app = api::create_router(state);

    let addr = format!("{}:{}", cfg.node.bind_address, cfg.node.api_port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .unwrap_or_else(|e| panic!("failed to bind {}: {}", addr, e));

    tokio::select! {
        result = axum::serve(listener, app) => {
            if let Err(e) = result {
                tracing::error!("server error: {}", e);
            }
        }
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("shutdown signal received, stopping node...");
        }
    }
}
