//! Wallet key storage and management
//!
//! This module provides:
//! - The encrypted vault record and its on-disk store
//! - The single unlocked session holding the account key
//! - KeyVault, which ties both to the wallet lifecycle

pub mod keyvault;
pub mod password;
pub mod session;
pub mod storage;
pub mod vault;

pub use keyvault::{CreatedWallet, KeyVault, KeyVaultOptions};
pub use password::{check_policy, strength, PasswordStrength};
pub use session::{Session, SessionHandle, SessionStore};
pub use storage::{AccountState, FileVaultStorage, MemoryVaultStorage, StorageInfo, TxRecord, VaultStorage};
pub use vault::EncryptedVault;
