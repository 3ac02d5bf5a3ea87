//! Requests accepted by the broker worker and the values it replies with.
//!
//! Each request that produces a result carries a `oneshot::Sender` for the
//! reply. The worker handles one request at a time in arrival order.

use crate::crypto::Address;
use crate::errors::Result;
use crate::keystore::{PasswordStrength, StorageInfo, TxRecord};
use crate::security::SecureString;
use chrono::{DateTime, Utc};
use secrecy::SecretString;
use serde::Serialize;
use std::fmt;
use tokio::sync::oneshot;

/// Broker lifecycle, published on a watch channel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum BrokerState {
    Locked,
    Unlocking,
    Unlocked,
    Signing,
}

impl fmt::Display for BrokerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Locked => write!(f, "locked"),
            Self::Unlocking => write!(f, "unlocking"),
            Self::Unlocked => write!(f, "unlocked"),
            Self::Signing => write!(f, "signing"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccountInfo {
    pub address: Address,
    /// SEC1 compressed public key, `0x` hex
    pub public_key: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SendReceipt {
    pub tx_hash: String,
    pub raw_transaction: String,
    pub nonce: u64,
}

pub struct CreatedAccount {
    pub address: Address,
    /// Shown once for backup
    pub mnemonic: SecureString,
    pub strength: PasswordStrength,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusInfo {
    pub state: BrokerState,
    pub has_wallet: bool,
    pub address: Option<Address>,
    pub failed_attempts: u32,
    pub expires_at: Option<DateTime<Utc>>,
    pub storage_available: bool,
    /// Absent when the store cannot be listed
    pub storage: Option<StorageInfo>,
}

/// Where a new wallet's seed comes from
pub enum SeedChoice {
    Generate { words: usize },
    Restore { mnemonic: SecretString },
}

type Reply<T> = oneshot::Sender<Result<T>>;

pub enum BrokerCommand {
    Connect {
        reply: Reply<Address>,
    },
    GetAccount {
        reply: Reply<AccountInfo>,
    },
    SendTransaction {
        to: String,
        amount: String,
        token: Option<String>,
        reply: Reply<SendReceipt>,
    },
    SignMessage {
        message: String,
        reply: Reply<String>,
    },
    Unlock {
        password: SecretString,
        reply: Reply<Address>,
    },
    Lock {
        reply: Reply<()>,
    },
    CreateWallet {
        password: SecretString,
        seed: SeedChoice,
        reply: Reply<CreatedAccount>,
    },
    ChangePassword {
        old_password: SecretString,
        new_password: SecretString,
        reply: Reply<()>,
    },
    ResetWallet {
        reply: Reply<()>,
    },
    GetHistory {
        reply: Reply<Vec<TxRecord>>,
    },
    Status {
        reply: Reply<StatusInfo>,
    },
    Shutdown,
}

impl BrokerCommand {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Connect { .. } => "connect",
            Self::GetAccount { .. } => "get_account",
            Self::SendTransaction { .. } => "send_transaction",
            Self::SignMessage { .. } => "sign_message",
            Self::Unlock { .. } => "unlock",
            Self::Lock { .. } => "lock",
            Self::CreateWallet { .. } => "create_wallet",
            Self::ChangePassword { .. } => "change_password",
            Self::ResetWallet { .. } => "reset_wallet",
            Self::GetHistory { .. } => "get_history",
            Self::Status { .. } => "status",
            Self::Shutdown => "shutdown",
        }
    }
}

// Manual Debug: oneshot::Sender has none and secrets must not print
impl fmt::Debug for BrokerCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SendTransaction { to, amount, token, .. } => f
                .debug_struct("SendTransaction")
                .field("to", to)
                .field("amount", amount)
                .field("token", token)
                .finish(),
            Self::SignMessage { message, .. } => f
                .debug_struct("SignMessage")
                .field("len", &message.len())
                .finish(),
            other => write!(f, "{}", other.name()),
        }
    }
}
