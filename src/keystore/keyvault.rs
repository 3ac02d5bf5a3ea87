//! KeyVault
//!
//! Owns the wallet lifecycle for one profile: creation, unlock into a
//! session, lock, password change and reset. Everything here is blocking
//! (Argon2id dominates); async callers go through `spawn_blocking`.

use crate::crypto::{derive_keypair, entropy_to_phrase, Address, EntropySource, KdfParams, KeyPair};
use crate::errors::{Result, VaultError};
use crate::keystore::password::{check_policy, PasswordStrength};
use crate::keystore::session::{Session, SessionHandle, SessionStore};
use crate::keystore::storage::{AccountState, VaultStorage};
use crate::keystore::vault::EncryptedVault;
use crate::security::{LockedMemory, SecureString};
use chrono::{DateTime, Duration, Utc};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};
use zeroize::{Zeroize, Zeroizing};

/// Per-vault settings
#[derive(Debug, Clone)]
pub struct KeyVaultOptions {
    pub profile_id: String,
    pub kdf_params: KdfParams,
    pub derivation_path: String,
    pub session_ttl: Duration,
    pub enable_mlock: bool,
}

/// Result of wallet creation
pub struct CreatedWallet {
    pub vault: EncryptedVault,
    /// Recovery phrase, shown to the user once
    pub phrase: SecureString,
    pub strength: PasswordStrength,
}

pub struct KeyVault {
    storage: Arc<dyn VaultStorage>,
    sessions: SessionStore,
    options: KeyVaultOptions,
    failed_attempts: AtomicU32,
}

impl KeyVault {
    pub fn new(storage: Arc<dyn VaultStorage>, options: KeyVaultOptions) -> Self {
        Self {
            storage,
            sessions: SessionStore::new(),
            options,
            failed_attempts: AtomicU32::new(0),
        }
    }

    /// Reset in-memory state at process start
    pub fn init(&self) -> Result<()> {
        self.sessions.init()?;
        self.failed_attempts.store(0, Ordering::SeqCst);
        debug!("Session store initialized for profile {}", self.options.profile_id);
        Ok(())
    }

    pub fn profile_id(&self) -> &str {
        &self.options.profile_id
    }

    pub fn options(&self) -> &KeyVaultOptions {
        &self.options
    }

    pub fn storage(&self) -> &Arc<dyn VaultStorage> {
        &self.storage
    }

    fn load_vault(&self) -> Result<EncryptedVault> {
        self.storage
            .load_vault(&self.options.profile_id)?
            .ok_or_else(|| VaultError::WalletNotFound(self.options.profile_id.clone()))
    }

    /// Stored vault to open with a password. A record that no longer parses
    /// is swapped for a placeholder so it fails exactly like a wrong password.
    fn load_vault_for_open(&self) -> Result<EncryptedVault> {
        match self.load_vault() {
            Err(VaultError::DamagedVault(profile_id)) => {
                Ok(EncryptedVault::damaged(&profile_id, &self.options.kdf_params))
            }
            other => other,
        }
    }

    pub fn has_wallet(&self) -> Result<bool> {
        match self.storage.load_vault(&self.options.profile_id) {
            Ok(stored) => Ok(stored.is_some()),
            Err(VaultError::DamagedVault(_)) => Ok(true),
            Err(e) => Err(e),
        }
    }

    /// Address of the stored wallet, available while locked
    pub fn stored_address(&self) -> Result<Address> {
        Ok(self.load_vault()?.address)
    }

    /// Create and persist a new wallet. Does not unlock it.
    pub fn create(&self, password: &str, source: EntropySource) -> Result<CreatedWallet> {
        let profile_id = &self.options.profile_id;
        if self.has_wallet()? {
            return Err(VaultError::WalletExists(profile_id.clone()));
        }

        let strength = check_policy(password)?;
        let entropy = source.into_entropy()?;
        let keypair = derive_keypair(entropy.expose(), &self.options.derivation_path)?;
        let address = keypair.address();
        let phrase = entropy_to_phrase(entropy.expose())?;

        let vault = EncryptedVault::seal(
            profile_id,
            entropy.expose(),
            address,
            password,
            &self.options.kdf_params,
        )?;

        self.storage.store_vault(&vault)?;
        self.storage.store_account(profile_id, &AccountState::default())?;

        info!("Created wallet {} for profile {}", address, profile_id);
        Ok(CreatedWallet {
            vault,
            phrase,
            strength,
        })
    }

    /// Open the stored vault and start a session at `now`
    pub fn unlock(&self, password: &str, now: DateTime<Utc>) -> Result<SessionHandle> {
        let vault = self.load_vault_for_open()?;
        self.unlock_vault(password, &vault, now)
    }

    /// Open `vault` and start a session at `now`.
    ///
    /// Any failure to open is `InvalidPassword` and counts as a failed
    /// attempt. Success replaces any existing session.
    pub fn unlock_vault(
        &self,
        password: &str,
        vault: &EncryptedVault,
        now: DateTime<Utc>,
    ) -> Result<SessionHandle> {
        let keypair = match self.open_keypair(password, vault) {
            Ok(keypair) => keypair,
            Err(e) => {
                let attempts = self.failed_attempts.fetch_add(1, Ordering::SeqCst) + 1;
                warn!("Unlock failed for profile {} (attempt {})", vault.profile_id, attempts);
                return Err(e);
            }
        };

        let mut key_bytes = keypair.secret_bytes();
        let private_key = LockedMemory::copy_from(&key_bytes, self.options.enable_mlock);
        key_bytes.zeroize();

        let session = Session::new(
            &keypair,
            private_key,
            now,
            now + self.options.session_ttl,
        );
        let handle = self.sessions.set(session)?;
        self.failed_attempts.store(0, Ordering::SeqCst);

        info!("Unlocked {} until {}", handle.address, handle.expires_at);
        Ok(handle)
    }

    fn open_keypair(&self, password: &str, vault: &EncryptedVault) -> Result<KeyPair> {
        let entropy = vault.open(password)?;
        let keypair = derive_keypair(&entropy, &self.options.derivation_path)
            .map_err(|_| VaultError::InvalidPassword)?;

        // The stored address must come from the sealed seed
        if !keypair.address().ct_eq(&vault.address) {
            return Err(VaultError::InvalidPassword);
        }
        Ok(keypair)
    }

    /// Wipe key material and end the session. Idempotent.
    pub fn lock(&self) -> Result<()> {
        if self.sessions.clear()? {
            info!("Wallet locked");
        }
        Ok(())
    }

    /// Active session as of `now`
    pub fn session(&self, now: DateTime<Utc>) -> Result<SessionHandle> {
        self.sessions.get(now)
    }

    /// Session valid at `now`, if any, without consuming an expiry
    pub fn active_session(&self, now: DateTime<Utc>) -> Result<Option<SessionHandle>> {
        self.sessions.peek(now)
    }

    pub fn failed_attempts(&self) -> u32 {
        self.failed_attempts.load(Ordering::SeqCst)
    }

    /// Borrow the session key pair for the duration of `f`
    pub fn with_signing_key<T>(
        &self,
        handle: &SessionHandle,
        f: impl FnOnce(&KeyPair) -> Result<T>,
    ) -> Result<T> {
        self.sessions.with_keypair(handle, f)
    }

    /// Raw private key for backup export. Never log or persist the result.
    pub fn export_private_key_never_logged(
        &self,
        handle: &SessionHandle,
    ) -> Result<Zeroizing<Vec<u8>>> {
        debug!("Private key export for session {}", handle.session_id);
        self.sessions.export_key(handle)
    }

    /// Re-seal the stored vault under `new_password`
    pub fn change_password(&self, old_password: &str, new_password: &str) -> Result<EncryptedVault> {
        let vault = self.load_vault_for_open()?;

        let entropy = match vault.open(old_password) {
            Ok(entropy) => entropy,
            Err(e) => {
                self.failed_attempts.fetch_add(1, Ordering::SeqCst);
                warn!("Password change rejected for profile {}", vault.profile_id);
                return Err(e);
            }
        };
        self.failed_attempts.store(0, Ordering::SeqCst);

        check_policy(new_password)?;

        let resealed = EncryptedVault::seal(
            &vault.profile_id,
            &entropy,
            vault.address,
            new_password,
            &self.options.kdf_params,
        )?;
        self.storage.store_vault(&resealed)?;

        info!("Password changed for profile {}", vault.profile_id);
        Ok(resealed)
    }

    /// Lock and delete the wallet and its account state
    pub fn reset(&self) -> Result<()> {
        self.lock()?;
        self.storage.delete_vault(&self.options.profile_id)?;
        self.storage.delete_account(&self.options.profile_id)?;
        self.failed_attempts.store(0, Ordering::SeqCst);
        info!("Wallet reset for profile {}", self.options.profile_id);
        Ok(())
    }
}
