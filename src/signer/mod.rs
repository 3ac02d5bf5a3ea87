//! Transaction and message signing
//!
//! This module provides the transaction model and its canonical encoding,
//! and the signing engine that uses the unlocked session key.

pub mod engine;
pub mod transaction;

pub use engine::{message_digest, transaction_digest, Signable, SigningEngine};
pub use transaction::{
    calculate_fee, format_amount, parse_amount, validate_token, SignedTransaction,
    TransactionRequest, DECIMALS,
};
