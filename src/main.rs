//! bapvault - key vault host for the BAP Connect wallet extension
//!
//! Runs as a browser native-messaging host: the extension's background
//! worker forwards page requests over stdin/stdout and this process holds
//! the encrypted wallet, the unlocked session and all signing.
//!
//! # Security
//!
//! - The seed is encrypted at rest using AES-256-GCM with Argon2id key derivation
//! - The unlocked private key lives in memory-locked pages and is zeroed on lock
//! - Sessions expire after `security.session_ttl_secs`
//! - Logs go to stderr and never include secrets
//!
//! # Usage
//!
//! ```bash
//! # Launched by the browser
//! bapvault host
//!
//! # Create a wallet from the terminal
//! BAPVAULT_PASSWORD='...' bapvault create --words 24
//!
//! # With a config file
//! bapvault --config /etc/bapvault/bapvault.toml status
//! ```

use bapvault::api::{serve, RequestHandler};
use bapvault::broker::{BrokerHandle, RequestBroker, SeedChoice, SystemClock, WalletService};
use bapvault::config::{Config, LoggingConfig};
use bapvault::errors::{Result, VaultError};
use bapvault::keystore::{FileVaultStorage, KeyVault};
use bapvault::security::setup_memory_protection;
use clap::{Parser, Subcommand};
use secrecy::SecretString;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info, warn};

/// Application version
const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Environment variable holding the password for `create`
const PASSWORD_ENV: &str = "BAPVAULT_PASSWORD";

#[derive(Parser)]
#[command(name = "bapvault", version)]
#[command(about = "Key vault and signing host for the BAP Connect wallet")]
#[command(args_conflicts_with_subcommands = true)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Path to config file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Arguments the browser passes when launching a host (caller origin)
    #[arg(hide = true, trailing_var_arg = true, allow_hyphen_values = true)]
    caller: Vec<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Serve native-messaging requests on stdin/stdout (default)
    Host,

    /// Create a wallet; the password is read from BAPVAULT_PASSWORD
    Create {
        /// Recovery phrase length (12, 15, 18, 21 or 24)
        #[arg(short, long, default_value_t = 12)]
        words: usize,

        /// Restore from a phrase instead of generating one
        #[arg(long)]
        restore: Option<String>,
    },

    /// Show wallet status
    Status,

    /// Show the effective configuration
    Config,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config_path = cli.config.as_ref().map(|p| p.to_string_lossy().into_owned());
    let config = Config::load(config_path.as_deref())?;

    init_logging(&config.logging);
    info!("Starting bapvault v{}", VERSION);
    if !cli.caller.is_empty() {
        info!("Launched by {}", cli.caller.join(" "));
    }

    if let Err(e) = setup_memory_protection(config.security.disable_core_dumps) {
        warn!("Could not set up memory protection: {}", e);
    }

    if let Some(Commands::Config) = cli.command {
        let rendered = serde_json::to_string_pretty(&config)?;
        println!("{}", rendered);
        return Ok(());
    }

    let storage = Arc::new(FileVaultStorage::new(&config.storage.vault_dir)?);
    let vault = Arc::new(KeyVault::new(storage, config.key_vault_options()));
    vault.init()?;
    let service = Arc::new(WalletService::new(
        vault,
        config.wallet.chain_id,
        config.transfer_settings(),
    ));
    let (broker, worker) =
        RequestBroker::spawn(service, Arc::new(SystemClock), config.wallet.queue_depth);

    let outcome = match cli.command {
        None | Some(Commands::Host) => run_host(&broker, &config).await,
        Some(Commands::Create { words, restore }) => create_wallet(&broker, words, restore).await,
        Some(Commands::Status) => print_status(&broker).await,
        Some(Commands::Config) => Ok(()),
    };

    broker.shutdown().await?;
    if let Err(e) = worker.await {
        error!("Broker task failed: {}", e);
    }

    info!("bapvault stopped");
    outcome
}

async fn run_host(broker: &BrokerHandle, config: &Config) -> Result<()> {
    let handler = RequestHandler::new(broker.clone());
    let stdin = tokio::io::stdin();
    let stdout = tokio::io::stdout();

    tokio::select! {
        result = serve(&handler, stdin, stdout, config.wallet.max_message_bytes) => result,
        _ = shutdown_signal() => Ok(()),
    }
}

async fn create_wallet(broker: &BrokerHandle, words: usize, restore: Option<String>) -> Result<()> {
    let password = std::env::var(PASSWORD_ENV)
        .map(SecretString::new)
        .map_err(|_| VaultError::ConfigError(format!("{} environment variable not set", PASSWORD_ENV)))?;

    let seed = match restore {
        Some(phrase) => SeedChoice::Restore {
            mnemonic: SecretString::new(phrase),
        },
        None => SeedChoice::Generate { words },
    };

    let created = broker.create_wallet(password, seed).await?;
    println!("Address:  {}", created.address);
    println!("Password: {:?}", created.strength);
    println!("Recovery phrase (write it down, it is not shown again):");
    println!("{}", created.mnemonic.expose());
    Ok(())
}

async fn print_status(broker: &BrokerHandle) -> Result<()> {
    let status = broker.status().await?;
    println!("State:           {}", status.state);
    println!("Wallet:          {}", if status.has_wallet { "present" } else { "none" });
    if let Some(address) = status.address {
        println!("Address:         {}", address);
    }
    println!("Failed attempts: {}", status.failed_attempts);
    println!("Storage:         {}", if status.storage_available { "writable" } else { "unavailable" });
    if let Some(info) = status.storage {
        println!("Stored records:  {} ({} bytes)", info.item_count, info.total_bytes);
    }
    Ok(())
}

/// Initialize logging on stderr; stdout carries protocol frames
fn init_logging(logging: &LoggingConfig) {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&logging.level));

    let registry = tracing_subscriber::registry().with(filter);
    if logging.format == "json" {
        registry
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        registry
            .with(fmt::layer().with_writer(std::io::stderr))
            .init();
    }
}

/// Wait for shutdown signal
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!("Failed to install signal handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, shutting down...");
        }
        _ = terminate => {
            info!("Received SIGTERM, shutting down...");
        }
    }
}
