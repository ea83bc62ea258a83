// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// VICE TOADS CLI - daily claim client with offline mirror
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

use clap::{Parser, Subcommand};
use colored::*;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

mod commands;

#[derive(Parser)]
#[command(name = "toad-cli")]
#[command(about = "Vice Toads CLI - daily points claim", long_about = None)]
#[command(version)]
struct Cli {
    /// API endpoint URL (reads TOAD_API_URL env var, or defaults to http://localhost:3030)
    #[arg(
        short,
        long,
        env = "TOAD_API_URL",
        default_value = "http://localhost:3030"
    )]
    api: String,

    /// Config directory holding the offline mirror (default: ~/.toad)
    #[arg(short, long)]
    config_dir: Option<PathBuf>,

    /// Seconds to wait for the API before falling back to the mirror
    #[arg(short, long, default_value_t = 10)]
    timeout_secs: u64,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show points, streak and next reward for an address
    Status {
        /// Wallet address
        address: String,
    },

    /// Claim today's points
    Claim {
        /// Wallet address
        address: String,
    },

    /// Live countdown until the next claim
    Countdown {
        /// Wallet address
        address: String,

        /// Print one snapshot and exit
        #[arg(long)]
        once: bool,
    },

    /// Look up the social profile linked to an address
    Profile {
        /// Wallet address
        address: String,
    },

    /// Show the local offline mirror
    Mirror {
        /// Only this address
        address: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Quiet by default; RUST_LOG=debug shows mirror and transport detail
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    print_banner();

    let config_dir = cli.config_dir.unwrap_or_else(|| {
        dirs::home_dir()
            .unwrap_or_else(|| std::path::PathBuf::from("."))
            .join(".toad")
    });
    std::fs::create_dir_all(&config_dir)?;

    let ctx = commands::common::Context::new(&cli.api, &config_dir, cli.timeout_secs)?;

    match cli.command {
        Commands::Status { address } => commands::claim::status(&ctx, &address).await?,
        Commands::Claim { address } => commands::claim::claim(&ctx, &address).await?,
        Commands::Countdown { address, once } => {
            commands::countdown::handle(&ctx, &address, once).await?
        }
        Commands::Profile { address } => commands::profile::handle(&ctx, &address).await?,
        Commands::Mirror { address } => commands::mirror::handle(&ctx, address.as_deref())?,
    }

    Ok(())
}

fn print_banner() {
    println!();
    println!("{}", "╔═══════════════════════════════════════╗".green());
    println!(
        "{}",
        "║        VICE TOADS - CLAIM CLI         ║".green().bold()
    );
    println!("{}", "╚═══════════════════════════════════════╝".green());
    println!();
}

fn print_success(msg: &str) {
    println!("{} {}", "✓".green().bold(), msg);
}

fn print_error(msg: &str) {
    eprintln!("{} {}", "✗".red().bold(), msg);
}

fn print_info(msg: &str) {
    println!("{} {}", "ℹ".blue().bold(), msg);
}

fn print_warn(msg: &str) {
    println!("{} {}", "⚠".yellow().bold(), msg);
}

// ─────────────────────────────────────────────────────────────────
// UNIT TESTS
// ─────────────────────────────────────────────────────────────────
