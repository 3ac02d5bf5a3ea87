//! Cryptographic building blocks: secp256k1 keys, password sealing,
//! recovery phrases

pub mod cipher;
pub mod mnemonic;
pub mod secp;

pub use cipher::{KdfParams, Sealed};
pub use mnemonic::{derive_keypair, entropy_to_phrase, EntropySource, WordCount, DEFAULT_DERIVATION_PATH};
pub use secp::{address_from_public_key, checksum_address, keccak256, Address, KeyPair, Signature};
