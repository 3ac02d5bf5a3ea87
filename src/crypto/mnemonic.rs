//! Recovery phrases and HD key derivation
//!
//! Entropy is encoded as a BIP-39 English phrase; the BIP-39 seed (empty
//! passphrase) feeds BIP-32 derivation along a BIP-44 path to the account
//! key.

use crate::crypto::secp::KeyPair;
use crate::errors::{Result, VaultError};
use crate::security::{SecureBytes, SecureString};
use bip32::{DerivationPath, XPrv};
use bip39::{Language, Mnemonic};
use rand::{rngs::OsRng, RngCore};
use std::str::FromStr;
use zeroize::{Zeroize, Zeroizing};

/// Default account path (coin type 60, first account, first address)
pub const DEFAULT_DERIVATION_PATH: &str = "m/44'/60'/0'/0/0";

/// Allowed phrase lengths and the entropy each encodes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WordCount {
    Words12,
    Words15,
    Words18,
    Words21,
    Words24,
}

impl WordCount {
    pub fn from_words(words: usize) -> Result<Self> {
        match words {
            12 => Ok(WordCount::Words12),
            15 => Ok(WordCount::Words15),
            18 => Ok(WordCount::Words18),
            21 => Ok(WordCount::Words21),
            24 => Ok(WordCount::Words24),
            other => Err(VaultError::InvalidRequest(format!(
                "Unsupported word count: {}",
                other
            ))),
        }
    }

    pub fn entropy_len(&self) -> usize {
        match self {
            WordCount::Words12 => 16,
            WordCount::Words15 => 20,
            WordCount::Words18 => 24,
            WordCount::Words21 => 28,
            WordCount::Words24 => 32,
        }
    }
}

/// Where wallet entropy comes from at creation time
pub enum EntropySource {
    /// Fresh bytes from the OS CSPRNG
    Random(WordCount),
    /// Caller-supplied entropy (16..=32 bytes, multiple of 4)
    Bytes(SecureBytes),
    /// Restore from an existing recovery phrase
    Phrase(SecureString),
}

impl EntropySource {
    /// Resolve to raw entropy bytes
    pub fn into_entropy(self) -> Result<SecureBytes> {
        match self {
            EntropySource::Random(count) => {
                let mut bytes = SecureBytes::zeros(count.entropy_len());
                OsRng.fill_bytes(bytes.expose_mut());
                Ok(bytes)
            }
            EntropySource::Bytes(bytes) => {
                check_entropy_len(bytes.len())?;
                Ok(bytes)
            }
            EntropySource::Phrase(phrase) => {
                let mnemonic = parse_phrase(phrase.expose())?;
                Ok(SecureBytes::new(mnemonic.to_entropy()))
            }
        }
    }
}

fn check_entropy_len(len: usize) -> Result<()> {
    if !(16..=32).contains(&len) || len % 4 != 0 {
        return Err(VaultError::InvalidRequest(format!(
            "Entropy must be 16-32 bytes in steps of 4, got {}",
            len
        )));
    }
    Ok(())
}

fn parse_phrase(phrase: &str) -> Result<Mnemonic> {
    let normalized = Zeroizing::new(
        phrase
            .split_whitespace()
            .collect::<Vec<_>>()
            .join(" ")
            .to_lowercase(),
    );
    Mnemonic::parse_in_normalized(Language::English, normalized.as_str())
        .map_err(|e| VaultError::InvalidRequest(format!("Invalid recovery phrase: {}", e)))
}

/// Render entropy as its English recovery phrase
pub fn entropy_to_phrase(entropy: &[u8]) -> Result<SecureString> {
    check_entropy_len(entropy.len())?;
    let mnemonic = Mnemonic::from_entropy_in(Language::English, entropy)
        .map_err(|e| VaultError::InvalidRequest(format!("Invalid entropy: {}", e)))?;
    Ok(SecureString::new(mnemonic.to_string()))
}

/// Derive the account key pair from entropy along `path`
pub fn derive_keypair(entropy: &[u8], path: &str) -> Result<KeyPair> {
    check_entropy_len(entropy.len())?;
    let mnemonic = Mnemonic::from_entropy_in(Language::English, entropy)
        .map_err(|e| VaultError::InvalidRequest(format!("Invalid entropy: {}", e)))?;

    let mut seed = mnemonic.to_seed_normalized("");
    let derivation_path = DerivationPath::from_str(path)
        .map_err(|e| VaultError::ConfigError(format!("Invalid derivation path {}: {}", path, e)));

    let result = derivation_path.and_then(|path| {
        let child = XPrv::derive_from_path(&seed, &path)
            .map_err(|e| VaultError::InternalError(format!("HD derivation failed: {}", e)))?;
        let mut key_bytes: [u8; 32] = child.private_key().to_bytes().into();
        let keypair = KeyPair::from_bytes(&key_bytes);
        key_bytes.zeroize();
        keypair
    });

    seed.zeroize();
    result
}

/// Check a derivation path string without deriving anything
pub fn validate_derivation_path(path: &str) -> Result<()> {
    DerivationPath::from_str(path)
        .map(|_| ())
        .map_err(|e| VaultError::ConfigError(format!("Invalid derivation path {}: {}", path, e)))
}
