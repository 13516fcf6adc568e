//! Custody - self-custody EVM wallet
//!
//! # WARNING
//! - Transfers are irreversible. Double-check the recipient before confirming.
//! - Anyone with your private key or recovery phrase controls your funds.
//! - The remembered wallet is only as strong as the secret protecting it.

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing::error;

// Use the library crate
use custody_wallet::cli::commands::{self, RevealTarget};
use custody_wallet::config::Config;

/// Custody - self-custody wallet for ETH, BNB, MATIC and AVAX
#[derive(Parser)]
#[command(name = "custody")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to config file
    #[arg(short, long, default_value = "custody.toml")]
    config: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create a new wallet with a fresh recovery phrase
    Create {
        /// Keep an encrypted copy so later commands can unlock it
        #[arg(long)]
        remember: bool,
    },

    /// Import a wallet from a private key or recovery phrase (prompted, hidden)
    Import {
        /// Import a raw private key
        #[arg(long, conflicts_with = "phrase")]
        key: bool,

        /// Import a 12-word recovery phrase
        #[arg(long)]
        phrase: bool,

        /// Keep an encrypted copy so later commands can unlock it
        #[arg(long)]
        remember: bool,
    },

    /// Unlock the remembered wallet
    Restore,

    /// Delete the remembered wallet without unlocking it
    Forget,

    /// Show native balances
    Balance {
        /// Only this chain (ETH, BNB, MATIC, AVAX)
        #[arg(long)]
        chain: Option<String>,
    },

    /// Send native coin
    Send {
        /// Chain id (ETH, BNB, MATIC, AVAX)
        chain: String,

        /// Recipient address or payment URI
        to: String,

        /// Amount in whole coins, e.g. "0.25"
        amount: String,

        /// Skip confirmation prompt
        #[arg(long)]
        force: bool,
    },

    /// Resolve scanned QR text to an address
    Scan {
        /// Recognized text
        text: String,
    },

    /// Reveal the private key or recovery phrase
    Reveal {
        #[arg(value_enum)]
        target: RevealTarget,
    },

    /// Show RPC endpoints
    Rpc,

    /// Show current configuration
    Config,

    /// Remove the remembered wallet and all session state
    Logout,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables from .env file
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("custody_wallet=info".parse()?),
        )
        .with_target(true)
        .with_file(true)
        .with_line_number(true)
        .init();

    // Parse CLI arguments
    let cli = Cli::parse();

    // Load configuration
    let config = match Config::load(&cli.config) {
        Ok(cfg) => cfg,
        Err(e) => {
            error!("Failed to load configuration: {:#}", e);
            std::process::exit(1);
        }
    };

    // Execute command
    let result = match cli.command {
        Commands::Create { remember } => commands::create(&config, remember).await,
        Commands::Import {
            key,
            phrase,
            remember,
        } => commands::import(&config, key, phrase, remember).await,
        Commands::Restore => commands::restore(&config).await,
        Commands::Forget => commands::forget(&config).await,
        Commands::Balance { chain } => commands::balance(&config, chain.as_deref()).await,
        Commands::Send {
            chain,
            to,
            amount,
            force,
        } => commands::send(&config, &chain, &to, &amount, force).await,
        Commands::Scan { text } => commands::scan(&text),
        Commands::Reveal { target } => commands::reveal(&config, target).await,
        Commands::Rpc => commands::rpc(&config),
        Commands::Config => commands::show_config(&config),
        Commands::Logout => commands::logout(&config).await,
    };

    if let Err(e) = result {
        error!("Command failed: {}", e);
        std::process::exit(1);
    }

    Ok(())
}
