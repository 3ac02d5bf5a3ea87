//! Signing engine
//!
//! Builds and signs transactions and messages with the session key. The
//! two digest prefixes keep message signatures from ever being valid
//! transaction signatures and vice versa.

use crate::crypto::{address_from_public_key, keccak256, Address, Signature};
use crate::errors::Result;
use crate::keystore::{KeyVault, SessionHandle};
use crate::signer::transaction::{SignedTransaction, TransactionRequest};
use std::sync::Arc;
use tracing::debug;

const TRANSACTION_PREFIX: &[u8] = b"\x19BAP Transaction:\n";
const MESSAGE_PREFIX: &[u8] = b"\x19BAP Signed Message:\n";

/// Data whose signature can be checked
#[derive(Debug, Clone, Copy)]
pub enum Signable<'a> {
    /// Encoded transaction payload
    Transaction(&'a [u8]),
    Message(&'a [u8]),
}

impl Signable<'_> {
    pub fn digest(&self) -> [u8; 32] {
        match self {
            Signable::Transaction(payload) => transaction_digest(payload),
            Signable::Message(message) => message_digest(message),
        }
    }
}

pub fn transaction_digest(payload: &[u8]) -> [u8; 32] {
    let mut data = Vec::with_capacity(TRANSACTION_PREFIX.len() + payload.len());
    data.extend_from_slice(TRANSACTION_PREFIX);
    data.extend_from_slice(payload);
    keccak256(&data)
}

/// Prefix, decimal byte length, message
pub fn message_digest(message: &[u8]) -> [u8; 32] {
    let len = message.len().to_string();
    let mut data = Vec::with_capacity(MESSAGE_PREFIX.len() + len.len() + message.len());
    data.extend_from_slice(MESSAGE_PREFIX);
    data.extend_from_slice(len.as_bytes());
    data.extend_from_slice(message);
    keccak256(&data)
}

pub struct SigningEngine {
    vault: Arc<KeyVault>,
    chain_id: u64,
}

impl SigningEngine {
    pub fn new(vault: Arc<KeyVault>, chain_id: u64) -> Self {
        Self { vault, chain_id }
    }

    pub fn chain_id(&self) -> u64 {
        self.chain_id
    }

    /// Address of a SEC1 public key
    pub fn derive_address(&self, public_key: &[u8]) -> Result<Address> {
        address_from_public_key(public_key)
    }

    pub fn sign_transaction(
        &self,
        session: &SessionHandle,
        tx: &TransactionRequest,
    ) -> Result<SignedTransaction> {
        tx.validate()?;

        let payload = tx.encode(self.chain_id);
        let digest = transaction_digest(&payload);
        let signature = self
            .vault
            .with_signing_key(session, |keypair| keypair.sign_digest(&digest))?;

        let signed = SignedTransaction::new(payload, signature);
        debug!(
            "Signed transaction nonce={} to={} hash={}",
            tx.nonce,
            tx.to,
            signed.hash_hex()
        );
        Ok(signed)
    }

    pub fn sign_message(&self, session: &SessionHandle, message: &[u8]) -> Result<Signature> {
        let digest = message_digest(message);
        let signature = self
            .vault
            .with_signing_key(session, |keypair| keypair.sign_digest(&digest))?;
        debug!("Signed message of {} bytes", message.len());
        Ok(signature)
    }

    /// True when `signature` over `signable` recovers to `address`
    pub fn verify(&self, address: &Address, signable: Signable<'_>, signature: &Signature) -> bool {
        match signature.recover(&signable.digest()) {
            Ok(recovered) => recovered.ct_eq(address),
            Err(_) => false,
        }
    }
}
