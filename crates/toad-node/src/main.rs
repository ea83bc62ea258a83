// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// VICE TOADS - NODE
//
// Main entry point for the toad-node binary.
// Loads configuration, opens the claim ledger and serves the REST API.
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

use clap::Parser;
use std::net::IpAddr;
use std::path::PathBuf;
use toad_core::config::{parse_setting, NodeConfig, StorageBackend};
use toad_node::rate_limiter::RateLimiter;
use toad_node::{api, AppState};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "toad-node")]
#[command(about = "Vice Toads claim ledger API", long_about = None)]
#[command(version)]
struct Args {
    /// TOML config file (defaults are used when omitted)
    #[arg(short, long, env = "TOAD_CONFIG")]
    config: Option<PathBuf>,

    /// Listen port, overrides config
    #[arg(short, long)]
    port: Option<u16>,

    /// Listen address, overrides config
    #[arg(long)]
    bind: Option<IpAddr>,

    /// Data directory, overrides config
    #[arg(long)]
    data_dir: Option<PathBuf>,

    /// Storage backend: json or sled
    #[arg(long)]
    storage: Option<String>,

    /// Write the effective config to this path and exit
    #[arg(long)]
    dump_config: Option<PathBuf>,
}

fn load_config(args: &Args) -> Result<NodeConfig, Box<dyn std::error::Error>> {
    let mut config = match &args.config {
        Some(path) => NodeConfig::load_from_file(path)?,
        None => NodeConfig::default(),
    };
    config.apply_env_overrides()?;

    if let Some(port) = args.port {
        config.api_port = port;
    }
    if let Some(bind) = args.bind {
        config.bind_addr = bind.to_string();
    }
    if let Some(dir) = &args.data_dir {
        config.data_dir = dir.clone();
    }
    if let Some(storage) = &args.storage {
        config.storage = parse_setting::<StorageBackend>(storage)?;
    }

    config.validate()?;
    Ok(config)
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();
    let config = load_config(&args)?;

    if let Some(path) = &args.dump_config {
        config.save_to_file(path)?;
        println!("📝 Config written to {}", path.display());
        return Ok(());
    }

    let bind: IpAddr = config.bind_addr.parse()?;
    let state = AppState::from_config(&config)?;
    let identities = state.ledger.identity_count()?;
    let limiter = RateLimiter::from_config(&config);

    println!("🐸 Vice Toads node v{}", env!("CARGO_PKG_VERSION"));
    println!(
        "💾 Ledger: {:?} backend in {} ({} identities)",
        config.storage,
        config.data_dir.display(),
        identities
    );
    println!(
        "⏳ Streak policy: {:?}, amount policy: {:?}",
        config.streak_policy, config.amount_policy
    );
    println!(
        "🌍 API Server running at http://{}:{} (Rate Limit: {} req/sec, {} claims/min per IP)",
        bind, config.api_port, config.rate_limit_per_sec, config.claim_submits_per_min
    );

    let (addr, server) = warp::serve(api::routes(state, limiter))
        .try_bind_with_graceful_shutdown((bind, config.api_port), async {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("shutdown requested");
        })?;
    tracing::info!(%addr, "listening");
    server.await;

    println!("👋 Vice Toads node stopped");
    Ok(())
}
