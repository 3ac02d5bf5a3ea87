//! Maps wire requests onto broker calls

use crate::api::messages::*;
use crate::broker::{BrokerHandle, SeedChoice};
use crate::errors::{Result, VaultError};
use serde_json::Value;
use tracing::{debug, info, warn};

const DEFAULT_WORD_COUNT: usize = 12;

pub struct RequestHandler {
    broker: BrokerHandle,
}

impl RequestHandler {
    pub fn new(broker: BrokerHandle) -> Self {
        Self { broker }
    }

    /// Handle one raw JSON message. Never fails; errors become responses.
    pub async fn handle_raw(&self, raw: &[u8]) -> WireResponse {
        let value: Value = match serde_json::from_slice(raw) {
            Ok(value) => value,
            Err(e) => {
                warn!("Unreadable message: {}", e);
                return invalid(None, "Message is not valid JSON".to_string());
            }
        };

        let id = value.get("id").cloned();
        match serde_json::from_value::<WalletRequest>(value) {
            Ok(request) => self.handle(request, id).await,
            Err(e) => {
                warn!("Rejected message: {}", e);
                invalid(id, format!("Unsupported request: {}", e))
            }
        }
    }

    pub async fn handle(&self, request: WalletRequest, id: Option<Value>) -> WireResponse {
        let kind = request.response_type();
        debug!("Request {}", kind);

        let result = self.execute(request).await;
        match result {
            Ok(response) => WireResponse { id, ..response },
            Err(err) => {
                let failed_attempts = match err {
                    VaultError::InvalidPassword => self.failed_attempts().await,
                    _ => None,
                };
                if matches!(
                    err,
                    VaultError::InternalError(_) | VaultError::StorageUnavailable(_) | VaultError::DamagedVault(_)
                ) {
                    warn!("{} failed: {}", kind, err);
                } else {
                    info!("{} rejected: {}", kind, err.code());
                }
                WireResponse::failure(kind, id, WireError::from_error(&err, failed_attempts))
            }
        }
    }

    async fn failed_attempts(&self) -> Option<u32> {
        self.broker.status().await.ok().map(|s| s.failed_attempts)
    }

    async fn execute(&self, request: WalletRequest) -> Result<WireResponse> {
        let kind = request.response_type();

        match request {
            WalletRequest::Connect => {
                let address = self.broker.connect().await?;
                Ok(WireResponse::ok(kind, None, AddressBody {
                    address: address.to_string(),
                }))
            }
            WalletRequest::GetAccount => {
                let account = self.broker.get_account().await?;
                Ok(WireResponse::ok(kind, None, AccountBody {
                    address: account.address.to_string(),
                    public_key: account.public_key,
                }))
            }
            WalletRequest::SendTransaction { to, amount, token } => {
                let receipt = self
                    .broker
                    .send_transaction(to, amount.into_text(), token)
                    .await?;
                Ok(WireResponse::ok(kind, None, TransactionBody {
                    tx_hash: receipt.tx_hash,
                    raw_transaction: receipt.raw_transaction,
                    nonce: receipt.nonce,
                }))
            }
            WalletRequest::SignMessage { message } => {
                let signature = self.broker.sign_message(message).await?;
                Ok(WireResponse::ok(kind, None, SignatureBody { signature }))
            }
            WalletRequest::Unlock { password } => {
                let address = self.broker.unlock(password).await?;
                Ok(WireResponse::ok(kind, None, AddressBody {
                    address: address.to_string(),
                }))
            }
            WalletRequest::Lock => {
                self.broker.lock().await?;
                Ok(WireResponse::ok(kind, None, Empty {}))
            }
            WalletRequest::CreateWallet {
                password,
                mnemonic,
                word_count,
            } => {
                let seed = match mnemonic {
                    Some(mnemonic) => SeedChoice::Restore { mnemonic },
                    None => SeedChoice::Generate {
                        words: word_count.unwrap_or(DEFAULT_WORD_COUNT),
                    },
                };
                let created = self.broker.create_wallet(password, seed).await?;
                Ok(WireResponse::ok(kind, None, CreateWalletBody {
                    address: created.address.to_string(),
                    mnemonic: created.mnemonic.expose().to_string(),
                    password_strength: created.strength,
                }))
            }
            WalletRequest::ChangePassword {
                old_password,
                new_password,
            } => {
                self.broker.change_password(old_password, new_password).await?;
                Ok(WireResponse::ok(kind, None, Empty {}))
            }
            WalletRequest::ResetWallet => {
                self.broker.reset_wallet().await?;
                Ok(WireResponse::ok(kind, None, Empty {}))
            }
            WalletRequest::GetTransactionHistory => {
                let transactions = self.broker.transaction_history().await?;
                Ok(WireResponse::ok(kind, None, HistoryBody { transactions }))
            }
            WalletRequest::Status => {
                let status = self.broker.status().await?;
                Ok(WireResponse::ok(kind, None, StatusBody {
                    state: status.state,
                    has_wallet: status.has_wallet,
                    address: status.address.map(|a| a.to_string()),
                    failed_attempts: status.failed_attempts,
                    expires_at: status.expires_at.map(|t| t.timestamp()),
                    storage_available: status.storage_available,
                    storage: status.storage,
                }))
            }
        }
    }
}

fn invalid(id: Option<Value>, message: String) -> WireResponse {
    WireResponse::failure(
        ERROR_RESPONSE_TYPE,
        id,
        WireError::from_error(&VaultError::InvalidRequest(message), None),
    )
}
