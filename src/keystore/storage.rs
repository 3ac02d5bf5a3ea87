//! Extension-local persistence
//!
//! One `EncryptedVault` and one `AccountState` per profile id. The file
//! store writes `<dir>/<profile>.vault.json` and `<dir>/<profile>.account.json`
//! through a temp file and rename so a crash never leaves half a record.

use crate::crypto::Address;
use crate::errors::{Result, VaultError};
use crate::keystore::vault::EncryptedVault;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::{debug, warn};

/// A transaction this wallet signed
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TxRecord {
    pub tx_hash: String,
    pub to: Address,
    /// Base units, as a decimal string to survive JSON number limits
    pub amount: String,
    pub token: String,
    pub fee: String,
    pub nonce: u64,
    pub created_at: i64,
}

/// Per-profile account bookkeeping
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountState {
    pub next_nonce: u64,
    #[serde(default)]
    pub history: Vec<TxRecord>,
}

/// Usage summary
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StorageInfo {
    pub item_count: usize,
    pub total_bytes: u64,
}

/// Key-value store for wallet records, keyed by profile id
pub trait VaultStorage: Send + Sync {
    fn load_vault(&self, profile_id: &str) -> Result<Option<EncryptedVault>>;
    fn store_vault(&self, vault: &EncryptedVault) -> Result<()>;
    fn delete_vault(&self, profile_id: &str) -> Result<()>;

    fn load_account(&self, profile_id: &str) -> Result<AccountState>;
    fn store_account(&self, profile_id: &str, state: &AccountState) -> Result<()>;
    fn delete_account(&self, profile_id: &str) -> Result<()>;

    fn is_available(&self) -> bool;
    fn info(&self) -> Result<StorageInfo>;
}

/// Profile ids end up in file names
pub fn validate_profile_id(profile_id: &str) -> Result<()> {
    let ok = !profile_id.is_empty()
        && profile_id.len() <= 64
        && profile_id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
    if ok {
        Ok(())
    } else {
        Err(VaultError::InvalidRequest(format!(
            "Invalid profile id: {:?}",
            profile_id
        )))
    }
}

/// File-backed store in a single directory
pub struct FileVaultStorage {
    base_path: PathBuf,
}

impl FileVaultStorage {
    /// Open (and create if missing) the store directory
    pub fn new(base_path: impl AsRef<Path>) -> Result<Self> {
        let base_path = base_path.as_ref().to_path_buf();

        if !base_path.exists() {
            fs::create_dir_all(&base_path)?;
            restrict_dir(&base_path)?;
        }

        Ok(Self { base_path })
    }

    fn vault_path(&self, profile_id: &str) -> PathBuf {
        self.base_path.join(format!("{}.vault.json", profile_id))
    }

    fn account_path(&self, profile_id: &str) -> PathBuf {
        self.base_path.join(format!("{}.account.json", profile_id))
    }

    fn write_atomic(&self, path: &Path, contents: &[u8]) -> Result<()> {
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, contents)?;
        restrict_file(&tmp)?;
        fs::rename(&tmp, path)?;
        Ok(())
    }

    fn remove_if_present(path: &Path) -> Result<()> {
        match fs::remove_file(path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

impl VaultStorage for FileVaultStorage {
    fn load_vault(&self, profile_id: &str) -> Result<Option<EncryptedVault>> {
        validate_profile_id(profile_id)?;
        let path = self.vault_path(profile_id);
        if !path.exists() {
            return Ok(None);
        }
        let json = fs::read_to_string(&path)?;
        match serde_json::from_str(&json) {
            Ok(vault) => Ok(Some(vault)),
            Err(e) => {
                warn!("Vault record for profile {} does not parse: {}", profile_id, e);
                Err(VaultError::DamagedVault(profile_id.to_string()))
            }
        }
    }

    fn store_vault(&self, vault: &EncryptedVault) -> Result<()> {
        validate_profile_id(&vault.profile_id)?;
        let json = serde_json::to_vec_pretty(vault)?;
        self.write_atomic(&self.vault_path(&vault.profile_id), &json)?;
        debug!("Stored vault for profile {}", vault.profile_id);
        Ok(())
    }

    fn delete_vault(&self, profile_id: &str) -> Result<()> {
        validate_profile_id(profile_id)?;
        Self::remove_if_present(&self.vault_path(profile_id))
    }

    fn load_account(&self, profile_id: &str) -> Result<AccountState> {
        validate_profile_id(profile_id)?;
        let path = self.account_path(profile_id);
        if !path.exists() {
            return Ok(AccountState::default());
        }
        let json = fs::read_to_string(&path)?;
        Ok(serde_json::from_str(&json)?)
    }

    fn store_account(&self, profile_id: &str, state: &AccountState) -> Result<()> {
        validate_profile_id(profile_id)?;
        let json = serde_json::to_vec_pretty(state)?;
        self.write_atomic(&self.account_path(profile_id), &json)
    }

    fn delete_account(&self, profile_id: &str) -> Result<()> {
        validate_profile_id(profile_id)?;
        Self::remove_if_present(&self.account_path(profile_id))
    }

    fn is_available(&self) -> bool {
        let probe = self.base_path.join(".probe");
        let ok = fs::write(&probe, b"probe").is_ok();
        let _ = fs::remove_file(&probe);
        ok
    }

    fn info(&self) -> Result<StorageInfo> {
        let mut info = StorageInfo {
            item_count: 0,
            total_bytes: 0,
        };

        for entry in fs::read_dir(&self.base_path)? {
            let entry = entry?;
            let name = entry.file_name();
            let name = name.to_string_lossy();
            if name.ends_with(".vault.json") || name.ends_with(".account.json") {
                info.item_count += 1;
                info.total_bytes += entry.metadata()?.len();
            }
        }

        Ok(info)
    }
}

#[cfg(unix)]
fn restrict_dir(path: &Path) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(0o700))?;
    Ok(())
}

#[cfg(unix)]
fn restrict_file(path: &Path) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(0o600))?;
    Ok(())
}

#[cfg(not(unix))]
fn restrict_dir(_path: &Path) -> Result<()> {
    Ok(())
}

#[cfg(not(unix))]
fn restrict_file(_path: &Path) -> Result<()> {
    Ok(())
}

/// In-process store, used by tests and embedders that persist elsewhere
#[derive(Default)]
pub struct MemoryVaultStorage {
    vaults: Mutex<HashMap<String, EncryptedVault>>,
    accounts: Mutex<HashMap<String, AccountState>>,
}

impl MemoryVaultStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

fn poisoned<T>(_: T) -> VaultError {
    VaultError::StorageUnavailable("storage lock poisoned".to_string())
}

impl VaultStorage for MemoryVaultStorage {
    fn load_vault(&self, profile_id: &str) -> Result<Option<EncryptedVault>> {
        Ok(self.vaults.lock().map_err(poisoned)?.get(profile_id).cloned())
    }

    fn store_vault(&self, vault: &EncryptedVault) -> Result<()> {
        validate_profile_id(&vault.profile_id)?;
        self.vaults
            .lock()
            .map_err(poisoned)?
            .insert(vault.profile_id.clone(), vault.clone());
        Ok(())
    }

    fn delete_vault(&self, profile_id: &str) -> Result<()> {
        self.vaults.lock().map_err(poisoned)?.remove(profile_id);
        Ok(())
    }

    fn load_account(&self, profile_id: &str) -> Result<AccountState> {
        Ok(self
            .accounts
            .lock()
            .map_err(poisoned)?
            .get(profile_id)
            .cloned()
            .unwrap_or_default())
    }

    fn store_account(&self, profile_id: &str, state: &AccountState) -> Result<()> {
        validate_profile_id(profile_id)?;
        self.accounts
            .lock()
            .map_err(poisoned)?
            .insert(profile_id.to_string(), state.clone());
        Ok(())
    }

    fn delete_account(&self, profile_id: &str) -> Result<()> {
        self.accounts.lock().map_err(poisoned)?.remove(profile_id);
        Ok(())
    }

    fn is_available(&self) -> bool {
        true
    }

    fn info(&self) -> Result<StorageInfo> {
        let vaults = self.vaults.lock().map_err(poisoned)?;
        let accounts = self.accounts.lock().map_err(poisoned)?;
        let mut total_bytes = 0u64;
        for vault in vaults.values() {
            total_bytes += serde_json::to_vec(vault)?.len() as u64;
        }
        for state in accounts.values() {
            total_bytes += serde_json::to_vec(state)?.len() as u64;
        }
        Ok(StorageInfo {
            item_count: vaults.len() + accounts.len(),
            total_bytes,
        })
    }
}
