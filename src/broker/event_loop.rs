//! Broker worker task
//!
//! Pulls one command at a time off the bounded queue, reads the clock, runs
//! the operation on the blocking pool and waits for it before taking the
//! next command. Replies to callers that went away are dropped.

use crate::broker::clock::Clock;
use crate::broker::command::{BrokerCommand, BrokerState};
use crate::broker::service::WalletService;
use crate::errors::Result;
use secrecy::ExposeSecret;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot, watch};
use tracing::{debug, info, warn};

pub(crate) struct Worker {
    pub service: Arc<WalletService>,
    pub clock: Arc<dyn Clock>,
    pub state_tx: watch::Sender<BrokerState>,
}

/// Run `f` on the blocking pool
async fn blocking<T, F>(service: &Arc<WalletService>, f: F) -> Result<T>
where
    T: Send + 'static,
    F: FnOnce(&WalletService) -> Result<T> + Send + 'static,
{
    let service = service.clone();
    tokio::task::spawn_blocking(move || f(&service)).await?
}

impl Worker {
    /// Publish the post-operation state, then reply
    fn respond<T>(&self, reply: oneshot::Sender<Result<T>>, result: Result<T>, op: &str) {
        if let Err(e) = &result {
            debug!("{} failed: {}", op, e);
        }
        self.refresh_state();
        if reply.send(result).is_err() {
            debug!("Caller dropped before {} completed", op);
        }
    }

    fn set_state(&self, state: BrokerState) {
        self.state_tx.send_if_modified(|current| {
            if *current != state {
                debug!("Broker state {} -> {}", current, state);
                *current = state;
                true
            } else {
                false
            }
        });
    }

    /// Publish whatever the session store says right now
    fn refresh_state(&self) {
        let now = self.clock.now();
        let unlocked = matches!(self.service.vault().active_session(now), Ok(Some(_)));
        self.set_state(if unlocked {
            BrokerState::Unlocked
        } else {
            BrokerState::Locked
        });
    }

    fn current_state(&self) -> BrokerState {
        *self.state_tx.borrow()
    }

    pub async fn run(self, mut commands: mpsc::Receiver<BrokerCommand>) {
        info!("Request broker started");
        self.refresh_state();

        while let Some(command) = commands.recv().await {
            if matches!(command, BrokerCommand::Shutdown) {
                info!("Shutdown requested");
                break;
            }
            self.handle(command).await;
        }

        if let Err(e) = self.service.lock() {
            warn!("Lock on shutdown failed: {}", e);
        }
        self.set_state(BrokerState::Locked);
        info!("Request broker stopped");
    }

    async fn handle(&self, command: BrokerCommand) {
        let now = self.clock.now();
        let op = command.name();
        debug!("Handling {:?}", command);

        match command {
            BrokerCommand::Connect { reply } => {
                let result = blocking(&self.service, move |s| s.connect(now)).await;
                self.respond(reply, result, op);
            }
            BrokerCommand::GetAccount { reply } => {
                let result = blocking(&self.service, move |s| s.account(now)).await;
                self.respond(reply, result, op);
            }
            BrokerCommand::SendTransaction {
                to,
                amount,
                token,
                reply,
            } => {
                self.enter_signing();
                let result = blocking(&self.service, move |s| {
                    s.send_transaction(now, &to, &amount, token.as_deref())
                })
                .await;
                self.respond(reply, result, op);
            }
            BrokerCommand::SignMessage { message, reply } => {
                self.enter_signing();
                let result = blocking(&self.service, move |s| s.sign_message(now, &message)).await;
                self.respond(reply, result, op);
            }
            BrokerCommand::Unlock { password, reply } => {
                self.set_state(BrokerState::Unlocking);
                let result =
                    blocking(&self.service, move |s| s.unlock(password.expose_secret(), now)).await;
                self.respond(reply, result, op);
            }
            BrokerCommand::Lock { reply } => {
                let result = blocking(&self.service, |s| s.lock()).await;
                self.respond(reply, result, op);
            }
            BrokerCommand::CreateWallet {
                password,
                seed,
                reply,
            } => {
                let result = blocking(&self.service, move |s| {
                    s.create_wallet(password.expose_secret(), seed)
                })
                .await;
                self.respond(reply, result, op);
            }
            BrokerCommand::ChangePassword {
                old_password,
                new_password,
                reply,
            } => {
                let result = blocking(&self.service, move |s| {
                    s.change_password(old_password.expose_secret(), new_password.expose_secret())
                })
                .await;
                self.respond(reply, result, op);
            }
            BrokerCommand::ResetWallet { reply } => {
                let result = blocking(&self.service, |s| s.reset()).await;
                self.respond(reply, result, op);
            }
            BrokerCommand::GetHistory { reply } => {
                let result = blocking(&self.service, move |s| s.history(now)).await;
                self.respond(reply, result, op);
            }
            BrokerCommand::Status { reply } => {
                self.refresh_state();
                let state = self.current_state();
                let result = blocking(&self.service, move |s| s.status(now, state)).await;
                self.respond(reply, result, op);
            }
            BrokerCommand::Shutdown => {}
        }
    }

    fn enter_signing(&self) {
        if self.current_state() == BrokerState::Unlocked {
            self.set_state(BrokerState::Signing);
        }
    }
}
