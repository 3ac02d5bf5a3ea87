//! Password-based sealing of vault secrets
//!
//! Argon2id stretches the password into a 256-bit key; AES-256-GCM seals
//! the secret under that key with a fresh random nonce per encryption.

use crate::errors::{Result, VaultError};
use aes_gcm::{
    aead::{Aead, KeyInit, Payload},
    Aes256Gcm, Nonce,
};
use argon2::{Algorithm, Argon2, Params, Version};
use rand::{rngs::OsRng, RngCore};
use serde::{Deserialize, Serialize};
use zeroize::Zeroizing;

/// Salt size for Argon2
pub const SALT_SIZE: usize = 16;

/// Nonce size for AES-GCM
pub const NONCE_SIZE: usize = 12;

/// Argon2id cost parameters, stored alongside each vault
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KdfParams {
    pub algorithm: KdfAlgorithm,
    /// Memory cost in KiB
    pub m_cost: u32,
    /// Number of passes
    pub t_cost: u32,
    /// Parallel lanes
    pub p_cost: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum KdfAlgorithm {
    Argon2id,
}

impl KdfParams {
    pub fn argon2id(m_cost: u32, t_cost: u32, p_cost: u32) -> Self {
        Self {
            algorithm: KdfAlgorithm::Argon2id,
            m_cost,
            t_cost,
            p_cost,
        }
    }
}

impl Default for KdfParams {
    fn default() -> Self {
        // 64 MiB, 3 passes, 4 lanes
        Self::argon2id(65_536, 3, 4)
    }
}

/// Sealed secret plus the random inputs needed to open it
pub struct Sealed {
    pub salt: [u8; SALT_SIZE],
    pub nonce: [u8; NONCE_SIZE],
    pub ciphertext: Vec<u8>,
}

/// Derive a 256-bit key from a password using Argon2id
pub fn derive_key(password: &[u8], salt: &[u8], params: &KdfParams) -> Result<Zeroizing<[u8; 32]>> {
    let argon_params = Params::new(params.m_cost, params.t_cost, params.p_cost, Some(32))
        .map_err(|e| VaultError::InternalError(format!("KDF parameters: {}", e)))?;
    let argon2 = Argon2::new(Algorithm::Argon2id, Version::V0x13, argon_params);

    let mut output = Zeroizing::new([0u8; 32]);
    argon2
        .hash_password_into(password, salt, &mut output[..])
        .map_err(|e| VaultError::InternalError(format!("KDF failed: {}", e)))?;

    Ok(output)
}

/// Encrypt `plaintext` under a key stretched from `password`
pub fn seal(password: &[u8], plaintext: &[u8], aad: &[u8], params: &KdfParams) -> Result<Sealed> {
    let mut salt = [0u8; SALT_SIZE];
    OsRng.fill_bytes(&mut salt);
    let mut nonce = [0u8; NONCE_SIZE];
    OsRng.fill_bytes(&mut nonce);

    let key = derive_key(password, &salt, params)?;
    let cipher = Aes256Gcm::new_from_slice(&key[..])
        .map_err(|e| VaultError::InternalError(e.to_string()))?;

    let ciphertext = cipher
        .encrypt(
            Nonce::from_slice(&nonce),
            Payload {
                msg: plaintext,
                aad,
            },
        )
        .map_err(|_| VaultError::InternalError("Encryption failed".to_string()))?;

    Ok(Sealed {
        salt,
        nonce,
        ciphertext,
    })
}

/// Open a sealed secret.
///
/// The KDF runs before any other check and every failure maps to
/// `InvalidPassword`, so a wrong password and a damaged record take the same
/// path. Callers with malformed salt or nonce should still call this with
/// placeholder values to keep the timing uniform.
pub fn open(
    password: &[u8],
    salt: &[u8],
    nonce: &[u8],
    ciphertext: &[u8],
    aad: &[u8],
    params: &KdfParams,
) -> Result<Zeroizing<Vec<u8>>> {
    let key = derive_key(password, salt, params).map_err(|_| VaultError::InvalidPassword)?;

    if nonce.len() != NONCE_SIZE {
        return Err(VaultError::InvalidPassword);
    }

    let cipher =
        Aes256Gcm::new_from_slice(&key[..]).map_err(|_| VaultError::InvalidPassword)?;
    let plaintext = cipher
        .decrypt(
            Nonce::from_slice(nonce),
            Payload {
                msg: ciphertext,
                aad,
            },
        )
        .map_err(|_| VaultError::InvalidPassword)?;

    Ok(Zeroizing::new(plaintext))
}
