//! Configuration management for bapvault
//!
//! Supports loading configuration from:
//! - Built-in defaults
//! - Config file (bapvault.toml, or the path given with --config)
//! - Environment variables (BAPVAULT_SECURITY__SESSION_TTL_SECS, etc.)

use crate::broker::TransferSettings;
use crate::crypto::mnemonic::validate_derivation_path;
use crate::crypto::{KdfParams, DEFAULT_DERIVATION_PATH};
use crate::errors::{Result, VaultError};
use crate::keystore::storage::validate_profile_id;
use crate::keystore::KeyVaultOptions;
use crate::signer::validate_token;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tracing::info;

/// Argon2id memory floor in KiB (8 MiB)
const MIN_KDF_M_COST: u32 = 8 * 1024;

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    pub storage: StorageConfig,
    pub security: SecurityConfig,
    pub wallet: WalletConfig,
    pub logging: LoggingConfig,
}

/// Storage configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Directory holding `<profile>.vault.json` and `<profile>.account.json`
    pub vault_dir: PathBuf,

    /// Wallet profile served by this process
    pub profile_id: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            vault_dir: PathBuf::from("./data/vaults"),
            profile_id: "default".to_string(),
        }
    }
}

/// Security configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecurityConfig {
    /// Lock the session key into RAM
    pub enable_mlock: bool,

    /// Disable core dumps
    pub disable_core_dumps: bool,

    /// Unlocked session lifetime
    pub session_ttl_secs: u64,

    /// Argon2id memory cost in KiB
    pub kdf_m_cost: u32,

    /// Argon2id passes
    pub kdf_t_cost: u32,

    /// Argon2id lanes
    pub kdf_p_cost: u32,
}

impl Default for SecurityConfig {
    fn default() -> Self {
        let kdf = KdfParams::default();
        Self {
            enable_mlock: true,
            disable_core_dumps: true,
            session_ttl_secs: 900,
            kdf_m_cost: kdf.m_cost,
            kdf_t_cost: kdf.t_cost,
            kdf_p_cost: kdf.p_cost,
        }
    }
}

/// Wallet behaviour
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WalletConfig {
    /// Chain id bound into every transaction payload
    pub chain_id: u64,

    /// Token used when a send request names none
    pub default_token: String,

    /// Fee in parts per million of the amount (1000 = 0.1%)
    pub fee_rate_ppm: u32,

    /// BIP-44 account path
    pub derivation_path: String,

    /// Pending requests the broker queue holds
    pub queue_depth: usize,

    /// Largest native message accepted
    pub max_message_bytes: usize,
}

impl Default for WalletConfig {
    fn default() -> Self {
        Self {
            chain_id: 1,
            default_token: "BAP".to_string(),
            fee_rate_ppm: 1000,
            derivation_path: DEFAULT_DERIVATION_PATH.to_string(),
            queue_depth: 64,
            max_message_bytes: 1024 * 1024,
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,

    /// Log format (json, pretty)
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "pretty".to_string(),
        }
    }
}

impl Config {
    /// Load configuration from file and environment
    pub fn load(config_path: Option<&str>) -> Result<Self> {
        let defaults = config::Config::try_from(&Config::default())
            .map_err(|e| VaultError::ConfigError(e.to_string()))?;
        let mut builder = config::Config::builder().add_source(defaults);

        // Load from file if specified
        if let Some(path) = config_path {
            builder = builder.add_source(config::File::with_name(path).required(true));
        } else {
            builder = builder.add_source(config::File::with_name("bapvault").required(false));
        }

        // Load from environment (BAPVAULT_WALLET__CHAIN_ID, etc.)
        builder = builder.add_source(
            config::Environment::with_prefix("BAPVAULT")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        let config: Config = builder
            .build()
            .map_err(|e| VaultError::ConfigError(e.to_string()))?
            .try_deserialize()
            .map_err(|e| VaultError::ConfigError(e.to_string()))?;

        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        validate_profile_id(&self.storage.profile_id)
            .map_err(|_| VaultError::ConfigError(format!("Invalid profile id: {}", self.storage.profile_id)))?;

        if self.security.session_ttl_secs == 0 {
            return Err(VaultError::ConfigError(
                "session_ttl_secs must be greater than zero".to_string(),
            ));
        }

        if self.security.kdf_m_cost < MIN_KDF_M_COST {
            return Err(VaultError::ConfigError(format!(
                "kdf_m_cost must be at least {} KiB",
                MIN_KDF_M_COST
            )));
        }
        if self.security.kdf_t_cost == 0 || self.security.kdf_p_cost == 0 {
            return Err(VaultError::ConfigError(
                "kdf_t_cost and kdf_p_cost must be at least 1".to_string(),
            ));
        }

        validate_derivation_path(&self.wallet.derivation_path)?;
        validate_token(&self.wallet.default_token)
            .map_err(|_| VaultError::ConfigError(format!("Invalid default token: {}", self.wallet.default_token)))?;

        if self.wallet.queue_depth == 0 {
            return Err(VaultError::ConfigError("queue_depth must be at least 1".to_string()));
        }
        if self.wallet.max_message_bytes == 0 || self.wallet.max_message_bytes > u32::MAX as usize {
            return Err(VaultError::ConfigError(
                "max_message_bytes out of range".to_string(),
            ));
        }

        match self.logging.format.as_str() {
            "json" | "pretty" => {}
            other => {
                return Err(VaultError::ConfigError(format!(
                    "Unknown log format: {}",
                    other
                )))
            }
        }

        if !self.storage.vault_dir.exists() {
            info!(
                "Vault directory does not exist, will create: {:?}",
                self.storage.vault_dir
            );
        }

        Ok(())
    }

    pub fn kdf_params(&self) -> KdfParams {
        KdfParams::argon2id(
            self.security.kdf_m_cost,
            self.security.kdf_t_cost,
            self.security.kdf_p_cost,
        )
    }

    pub fn key_vault_options(&self) -> KeyVaultOptions {
        KeyVaultOptions {
            profile_id: self.storage.profile_id.clone(),
            kdf_params: self.kdf_params(),
            derivation_path: self.wallet.derivation_path.clone(),
            session_ttl: chrono::Duration::seconds(
                i64::try_from(self.security.session_ttl_secs).unwrap_or(i64::MAX / 1000),
            ),
            enable_mlock: self.security.enable_mlock,
        }
    }

    pub fn transfer_settings(&self) -> TransferSettings {
        TransferSettings {
            default_token: self.wallet.default_token.clone(),
            fee_rate_ppm: self.wallet.fee_rate_ppm,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.security.session_ttl_secs, 900);
        assert_eq!(config.security.kdf_m_cost, 65_536);
        assert_eq!(config.wallet.chain_id, 1);
        assert_eq!(config.wallet.default_token, "BAP");
        assert_eq!(config.wallet.fee_rate_ppm, 1000);
        assert_eq!(config.wallet.max_message_bytes, 1 << 20);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validation() {
        let mut config = Config::default();
        config.security.kdf_m_cost = 4096;
        assert!(matches!(config.validate(), Err(VaultError::ConfigError(_))));

        let mut config = Config::default();
        config.security.session_ttl_secs = 0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.storage.profile_id = "../x".to_string();
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.wallet.derivation_path = "nope".to_string();
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.logging.format = "xml".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            "[wallet]\nchain_id = 7\ndefault_token = \"USDT\"\n\n[security]\nsession_ttl_secs = 60"
        )
        .unwrap();

        let config = Config::load(file.path().to_str()).unwrap();
        assert_eq!(config.wallet.chain_id, 7);
        assert_eq!(config.wallet.default_token, "USDT");
        assert_eq!(config.security.session_ttl_secs, 60);
        // Untouched sections keep their defaults
        assert_eq!(config.storage.profile_id, "default");
        assert_eq!(config.key_vault_options().session_ttl, chrono::Duration::seconds(60));
    }

    #[test]
    fn test_env_override() {
        // No other test reads queue_depth
        std::env::set_var("BAPVAULT_WALLET__QUEUE_DEPTH", "7");
        let loaded = Config::load(None);
        std::env::remove_var("BAPVAULT_WALLET__QUEUE_DEPTH");

        assert_eq!(loaded.unwrap().wallet.queue_depth, 7);
    }
}
