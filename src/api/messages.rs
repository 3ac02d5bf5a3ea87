//! JSON wire messages
//!
//! Requests are tagged by `type`. Every response carries `type`, `success`
//! and the request `id` when one was sent; failures add `error`.

use crate::errors::VaultError;
use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

#[derive(Debug, Deserialize)]
#[serde(tag = "type")]
pub enum WalletRequest {
    #[serde(rename = "BAP_CONNECT_REQUEST")]
    Connect,

    #[serde(rename = "BAP_GET_ACCOUNT")]
    GetAccount,

    #[serde(rename = "BAP_SEND_TRANSACTION", rename_all = "camelCase")]
    SendTransaction {
        to: String,
        amount: AmountInput,
        #[serde(default)]
        token: Option<String>,
    },

    #[serde(rename = "BAP_SIGN_MESSAGE")]
    SignMessage { message: String },

    #[serde(rename = "BAP_UNLOCK")]
    Unlock { password: SecretString },

    #[serde(rename = "BAP_LOCK")]
    Lock,

    #[serde(rename = "BAP_CREATE_WALLET", rename_all = "camelCase")]
    CreateWallet {
        password: SecretString,
        #[serde(default)]
        mnemonic: Option<SecretString>,
        #[serde(default)]
        word_count: Option<usize>,
    },

    #[serde(rename = "BAP_CHANGE_PASSWORD", rename_all = "camelCase")]
    ChangePassword {
        old_password: SecretString,
        new_password: SecretString,
    },

    #[serde(rename = "BAP_RESET_WALLET")]
    ResetWallet,

    #[serde(rename = "GET_TRANSACTION_HISTORY")]
    GetTransactionHistory,

    #[serde(rename = "BAP_STATUS")]
    Status,
}

impl WalletRequest {
    /// Response `type` for this request
    pub fn response_type(&self) -> &'static str {
        match self {
            Self::Connect => "BAP_CONNECT_RESPONSE",
            Self::GetAccount => "BAP_ACCOUNT_RESPONSE",
            Self::SendTransaction { .. } => "BAP_TRANSACTION_RESPONSE",
            Self::SignMessage { .. } => "BAP_SIGN_RESPONSE",
            Self::Unlock { .. } => "BAP_UNLOCK_RESPONSE",
            Self::Lock => "BAP_LOCK_RESPONSE",
            Self::CreateWallet { .. } => "BAP_CREATE_WALLET_RESPONSE",
            Self::ChangePassword { .. } => "BAP_CHANGE_PASSWORD_RESPONSE",
            Self::ResetWallet => "BAP_RESET_WALLET_RESPONSE",
            Self::GetTransactionHistory => "TRANSACTION_HISTORY_RESPONSE",
            Self::Status => "BAP_STATUS_RESPONSE",
        }
    }
}

/// Pages send amounts as strings or plain numbers
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum AmountInput {
    Text(String),
    Number(serde_json::Number),
}

impl AmountInput {
    pub fn into_text(self) -> String {
        match self {
            AmountInput::Text(text) => text,
            AmountInput::Number(number) => number.to_string(),
        }
    }
}

/// Response type for input that could not be read as a request
pub const ERROR_RESPONSE_TYPE: &str = "BAP_ERROR";

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WireError {
    pub code: &'static str,
    pub message: String,
    pub requires_unlock: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failed_attempts: Option<u32>,
}

impl WireError {
    pub fn from_error(err: &VaultError, failed_attempts: Option<u32>) -> Self {
        Self {
            code: err.code(),
            message: err.public_message(),
            requires_unlock: err.requires_unlock(),
            failed_attempts,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WireResponse {
    #[serde(rename = "type")]
    pub kind: String,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<Value>,
    #[serde(flatten)]
    pub fields: Map<String, Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<WireError>,
}

impl WireResponse {
    pub fn ok(kind: &str, id: Option<Value>, body: impl Serialize) -> Self {
        let fields = match serde_json::to_value(body) {
            Ok(Value::Object(map)) => map,
            _ => Map::new(),
        };
        Self {
            kind: kind.to_string(),
            success: true,
            id,
            fields,
            error: None,
        }
    }

    pub fn failure(kind: &str, id: Option<Value>, error: WireError) -> Self {
        Self {
            kind: kind.to_string(),
            success: false,
            id,
            fields: Map::new(),
            error: Some(error),
        }
    }
}

// Success bodies

#[derive(Serialize)]
pub struct AddressBody {
    pub address: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountBody {
    pub address: String,
    pub public_key: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionBody {
    pub tx_hash: String,
    pub raw_transaction: String,
    pub nonce: u64,
}

#[derive(Serialize)]
pub struct SignatureBody {
    pub signature: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateWalletBody {
    pub address: String,
    pub mnemonic: String,
    pub password_strength: crate::keystore::PasswordStrength,
}

#[derive(Serialize)]
pub struct HistoryBody {
    pub transactions: Vec<crate::keystore::TxRecord>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusBody {
    pub state: crate::broker::BrokerState,
    pub has_wallet: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
    pub failed_attempts: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<i64>,
    pub storage_available: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub storage: Option<crate::keystore::StorageInfo>,
}

#[derive(Serialize)]
pub struct Empty {}
