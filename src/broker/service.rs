//! Wallet operations behind the broker.
//!
//! Every method here is synchronous and may block on Argon2id, signing or
//! disk I/O. The event loop runs them on the blocking pool, one at a time.
//! Session-bound operations check the session against the clock reading
//! taken when the request was dequeued.

use crate::broker::command::{AccountInfo, BrokerState, CreatedAccount, SeedChoice, SendReceipt, StatusInfo};
use crate::crypto::{Address, EntropySource, WordCount};
use crate::errors::{Result, VaultError};
use crate::keystore::{KeyVault, SessionHandle, TxRecord};
use crate::security::SecureString;
use crate::signer::{calculate_fee, format_amount, parse_amount, validate_token, SigningEngine, TransactionRequest};
use chrono::{DateTime, Utc};
use secrecy::ExposeSecret;
use std::sync::Arc;
use tracing::{info, warn};

/// Transfer defaults applied by `send_transaction`
#[derive(Debug, Clone)]
pub struct TransferSettings {
    pub default_token: String,
    pub fee_rate_ppm: u32,
}

pub struct WalletService {
    vault: Arc<KeyVault>,
    engine: SigningEngine,
    settings: TransferSettings,
}

impl WalletService {
    pub fn new(vault: Arc<KeyVault>, chain_id: u64, settings: TransferSettings) -> Self {
        let engine = SigningEngine::new(vault.clone(), chain_id);
        Self {
            vault,
            engine,
            settings,
        }
    }

    pub fn vault(&self) -> &Arc<KeyVault> {
        &self.vault
    }

    pub fn engine(&self) -> &SigningEngine {
        &self.engine
    }

    fn session(&self, now: DateTime<Utc>) -> Result<SessionHandle> {
        self.vault.session(now)
    }

    pub fn connect(&self, now: DateTime<Utc>) -> Result<Address> {
        Ok(self.session(now)?.address)
    }

    pub fn account(&self, now: DateTime<Utc>) -> Result<AccountInfo> {
        let session = self.session(now)?;
        Ok(AccountInfo {
            address: session.address,
            public_key: format!("0x{}", hex::encode(&session.public_key)),
        })
    }

    /// Build, sign and record a transfer using the next nonce
    pub fn send_transaction(
        &self,
        now: DateTime<Utc>,
        to: &str,
        amount: &str,
        token: Option<&str>,
    ) -> Result<SendReceipt> {
        let session = self.session(now)?;

        let to: Address = to.parse()?;
        let amount = parse_amount(amount)?;
        let token = match token.map(str::trim) {
            Some(token) if !token.is_empty() => token.to_string(),
            _ => self.settings.default_token.clone(),
        };
        validate_token(&token)?;

        let storage = self.vault.storage();
        let profile_id = self.vault.profile_id();
        let mut account = storage.load_account(profile_id)?;

        let tx = TransactionRequest {
            to,
            amount,
            token,
            nonce: account.next_nonce,
            fee: calculate_fee(amount, self.settings.fee_rate_ppm),
        };
        let signed = self.engine.sign_transaction(&session, &tx)?;

        account.next_nonce = tx
            .nonce
            .checked_add(1)
            .ok_or_else(|| VaultError::InternalError("nonce overflow".to_string()))?;
        account.history.push(TxRecord {
            tx_hash: signed.hash_hex(),
            to: tx.to,
            amount: tx.amount.to_string(),
            token: tx.token.clone(),
            fee: tx.fee.to_string(),
            nonce: tx.nonce,
            created_at: now.timestamp(),
        });
        storage.store_account(profile_id, &account)?;

        info!(
            "Transaction {} nonce={} to={} amount={} {}",
            signed.hash_hex(),
            tx.nonce,
            tx.to,
            format_amount(tx.amount),
            tx.token
        );
        Ok(SendReceipt {
            tx_hash: signed.hash_hex(),
            raw_transaction: signed.raw_hex(),
            nonce: tx.nonce,
        })
    }

    /// Sign the UTF-8 bytes of `message`; returns the `0x` hex signature
    pub fn sign_message(&self, now: DateTime<Utc>, message: &str) -> Result<String> {
        let session = self.session(now)?;
        let signature = self.engine.sign_message(&session, message.as_bytes())?;
        Ok(signature.to_hex())
    }

    pub fn unlock(&self, password: &str, now: DateTime<Utc>) -> Result<Address> {
        Ok(self.vault.unlock(password, now)?.address)
    }

    pub fn lock(&self) -> Result<()> {
        self.vault.lock()
    }

    pub fn create_wallet(&self, password: &str, seed: SeedChoice) -> Result<CreatedAccount> {
        let source = match seed {
            SeedChoice::Generate { words } => EntropySource::Random(WordCount::from_words(words)?),
            SeedChoice::Restore { mnemonic } => {
                EntropySource::Phrase(SecureString::new(mnemonic.expose_secret().clone()))
            }
        };

        let created = self.vault.create(password, source)?;
        Ok(CreatedAccount {
            address: created.vault.address,
            mnemonic: created.phrase,
            strength: created.strength,
        })
    }

    pub fn change_password(&self, old_password: &str, new_password: &str) -> Result<()> {
        self.vault.change_password(old_password, new_password).map(|_| ())
    }

    pub fn reset(&self) -> Result<()> {
        self.vault.reset()
    }

    /// Signed transactions, oldest first
    pub fn history(&self, now: DateTime<Utc>) -> Result<Vec<TxRecord>> {
        self.session(now)?;
        Ok(self.vault.storage().load_account(self.vault.profile_id())?.history)
    }

    pub fn status(&self, now: DateTime<Utc>, state: BrokerState) -> Result<StatusInfo> {
        let storage = self.vault.storage();
        let (has_wallet, address) = match storage.load_vault(self.vault.profile_id()) {
            Ok(stored) => (stored.is_some(), stored.map(|v| v.address)),
            Err(VaultError::DamagedVault(_)) => (true, None),
            Err(e) => return Err(e),
        };
        let info = match storage.info() {
            Ok(info) => Some(info),
            Err(e) => {
                warn!("Could not read storage usage: {}", e);
                None
            }
        };
        let active = self.vault.active_session(now)?;
        Ok(StatusInfo {
            state,
            has_wallet,
            address,
            failed_attempts: self.vault.failed_attempts(),
            expires_at: active.map(|s| s.expires_at),
            storage_available: storage.is_available(),
            storage: info,
        })
    }
}
