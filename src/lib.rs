//! bapvault - non-custodial key vault and signing engine
//!
//! The wallet seed is sealed at rest with Argon2id and AES-256-GCM, opened
//! into a time-boxed session on unlock, and used only through a single
//! serialized request broker. Callers speak a small JSON protocol, carried
//! over browser native messaging by the `bapvault` binary.

pub mod api;
pub mod broker;
pub mod config;
pub mod crypto;
pub mod errors;
pub mod keystore;
pub mod security;
pub mod signer;

pub use errors::{Result, VaultError};
