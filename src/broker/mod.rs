//! Request broker
//!
//! The single entry point for callers. Requests travel over one bounded
//! channel to one worker task, so wallet operations run strictly in arrival
//! order and never overlap with a session change.

pub mod clock;
pub mod command;
mod event_loop;
pub mod service;

pub use clock::{Clock, ManualClock, SystemClock};
pub use command::{AccountInfo, BrokerCommand, BrokerState, CreatedAccount, SeedChoice, SendReceipt, StatusInfo};
pub use service::{TransferSettings, WalletService};

use crate::crypto::Address;
use crate::errors::{Result, VaultError};
use crate::keystore::TxRecord;
use event_loop::Worker;
use secrecy::SecretString;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;

pub struct RequestBroker;

impl RequestBroker {
    /// Start the worker task and return a handle to it
    pub fn spawn(
        service: Arc<WalletService>,
        clock: Arc<dyn Clock>,
        queue_depth: usize,
    ) -> (BrokerHandle, JoinHandle<()>) {
        let (command_tx, command_rx) = mpsc::channel(queue_depth.max(1));
        let (state_tx, state_rx) = watch::channel(BrokerState::Locked);

        let worker = Worker {
            service,
            clock,
            state_tx,
        };
        let task = tokio::spawn(worker.run(command_rx));

        (
            BrokerHandle {
                commands: command_tx,
                state: state_rx,
            },
            task,
        )
    }
}

/// Cloneable client side of the broker
#[derive(Clone)]
pub struct BrokerHandle {
    commands: mpsc::Sender<BrokerCommand>,
    state: watch::Receiver<BrokerState>,
}

impl BrokerHandle {
    async fn request<T>(
        &self,
        build: impl FnOnce(oneshot::Sender<Result<T>>) -> BrokerCommand,
    ) -> Result<T> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.commands
            .send(build(reply_tx))
            .await
            .map_err(|_| VaultError::InternalError("broker stopped".to_string()))?;
        reply_rx
            .await
            .map_err(|_| VaultError::InternalError("broker dropped the request".to_string()))?
    }

    pub fn state(&self) -> BrokerState {
        *self.state.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<BrokerState> {
        self.state.clone()
    }

    pub async fn connect(&self) -> Result<Address> {
        self.request(|reply| BrokerCommand::Connect { reply }).await
    }

    pub async fn get_account(&self) -> Result<AccountInfo> {
        self.request(|reply| BrokerCommand::GetAccount { reply }).await
    }

    pub async fn send_transaction(
        &self,
        to: impl Into<String>,
        amount: impl Into<String>,
        token: Option<String>,
    ) -> Result<SendReceipt> {
        let (to, amount) = (to.into(), amount.into());
        self.request(|reply| BrokerCommand::SendTransaction {
            to,
            amount,
            token,
            reply,
        })
        .await
    }

    pub async fn sign_message(&self, message: impl Into<String>) -> Result<String> {
        let message = message.into();
        self.request(|reply| BrokerCommand::SignMessage { message, reply })
            .await
    }

    pub async fn unlock(&self, password: SecretString) -> Result<Address> {
        self.request(|reply| BrokerCommand::Unlock { password, reply })
            .await
    }

    pub async fn lock(&self) -> Result<()> {
        self.request(|reply| BrokerCommand::Lock { reply }).await
    }

    pub async fn create_wallet(&self, password: SecretString, seed: SeedChoice) -> Result<CreatedAccount> {
        self.request(|reply| BrokerCommand::CreateWallet {
            password,
            seed,
            reply,
        })
        .await
    }

    pub async fn change_password(
        &self,
        old_password: SecretString,
        new_password: SecretString,
    ) -> Result<()> {
        self.request(|reply| BrokerCommand::ChangePassword {
            old_password,
            new_password,
            reply,
        })
        .await
    }

    pub async fn reset_wallet(&self) -> Result<()> {
        self.request(|reply| BrokerCommand::ResetWallet { reply }).await
    }

    pub async fn transaction_history(&self) -> Result<Vec<TxRecord>> {
        self.request(|reply| BrokerCommand::GetHistory { reply }).await
    }

    pub async fn status(&self) -> Result<StatusInfo> {
        self.request(|reply| BrokerCommand::Status { reply }).await
    }

    /// Ask the worker to lock and exit after the requests already queued
    pub async fn shutdown(&self) -> Result<()> {
        self.commands
            .send(BrokerCommand::Shutdown)
            .await
            .map_err(|_| VaultError::InternalError("broker stopped".to_string()))
    }
}
