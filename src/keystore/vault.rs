//! Encrypted vault record
//!
//! The at-rest form of a wallet: the seed entropy sealed with AES-256-GCM
//! under an Argon2id-stretched password. The record is bound to its profile
//! id through the AEAD associated data.

use crate::crypto::cipher::{self, KdfParams, NONCE_SIZE, SALT_SIZE};
use crate::crypto::Address;
use crate::errors::{Result, VaultError};
use base64::engine::general_purpose::STANDARD as B64;
use base64::Engine as _;
use serde::{Deserialize, Serialize};
use zeroize::Zeroizing;

/// Current record format
pub const VAULT_VERSION: u32 = 1;

/// Upper bounds accepted when opening; anything outside is treated as damage
const MAX_M_COST: u32 = 1 << 20; // 1 GiB
const MAX_T_COST: u32 = 64;
const MAX_P_COST: u32 = 16;

/// Persisted vault record, one per wallet profile
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EncryptedVault {
    /// Record format version
    pub version: u32,

    /// Profile this vault belongs to
    pub profile_id: String,

    /// Sealed seed entropy (base64)
    pub cipher_text: String,

    /// Argon2id salt (base64)
    pub salt: String,

    /// AES-GCM nonce (base64)
    pub iv: String,

    /// KDF parameters used for this record
    pub kdf_params: KdfParams,

    /// Account address, public, shown while locked
    pub address: Address,

    /// Creation timestamp (unix seconds)
    pub created_at: i64,
}

impl EncryptedVault {
    /// Seal `entropy` for `profile_id` under `password`
    pub fn seal(
        profile_id: &str,
        entropy: &[u8],
        address: Address,
        password: &str,
        kdf_params: &KdfParams,
    ) -> Result<Self> {
        let aad = associated_data(VAULT_VERSION, profile_id);
        let sealed = cipher::seal(password.as_bytes(), entropy, &aad, kdf_params)?;

        Ok(Self {
            version: VAULT_VERSION,
            profile_id: profile_id.to_string(),
            cipher_text: B64.encode(&sealed.ciphertext),
            salt: B64.encode(sealed.salt),
            iv: B64.encode(sealed.nonce),
            kdf_params: *kdf_params,
            address,
            created_at: chrono::Utc::now().timestamp(),
        })
    }

    /// Stand-in for a record that could not be read back. Opening it runs
    /// the KDF under `kdf_params` and always fails as `InvalidPassword`.
    pub fn damaged(profile_id: &str, kdf_params: &KdfParams) -> Self {
        Self {
            version: 0,
            profile_id: profile_id.to_string(),
            cipher_text: String::new(),
            salt: String::new(),
            iv: String::new(),
            kdf_params: *kdf_params,
            address: Address::from_bytes([0u8; 20]),
            created_at: 0,
        }
    }

    /// Open the record and return the seed entropy.
    ///
    /// Malformed fields are replaced by placeholders so the KDF and AEAD
    /// still run; the outcome is `InvalidPassword` either way.
    pub fn open(&self, password: &str) -> Result<Zeroizing<Vec<u8>>> {
        let mut damaged = self.version != VAULT_VERSION;

        let salt = match B64.decode(&self.salt) {
            Ok(salt) if salt.len() == SALT_SIZE => salt,
            _ => {
                damaged = true;
                vec![0u8; SALT_SIZE]
            }
        };
        let nonce = match B64.decode(&self.iv) {
            Ok(nonce) if nonce.len() == NONCE_SIZE => nonce,
            _ => {
                damaged = true;
                vec![0u8; NONCE_SIZE]
            }
        };
        let ciphertext = B64.decode(&self.cipher_text).unwrap_or_else(|_| {
            damaged = true;
            vec![0u8; 48]
        });
        let params = if params_in_bounds(&self.kdf_params) {
            self.kdf_params
        } else {
            damaged = true;
            KdfParams::default()
        };

        let aad = associated_data(self.version, &self.profile_id);
        let opened = cipher::open(password.as_bytes(), &salt, &nonce, &ciphertext, &aad, &params);

        match opened {
            Ok(entropy) if !damaged => Ok(entropy),
            _ => Err(VaultError::InvalidPassword),
        }
    }
}

fn associated_data(version: u32, profile_id: &str) -> Vec<u8> {
    format!("bapvault:v{}:{}", version, profile_id).into_bytes()
}

fn params_in_bounds(params: &KdfParams) -> bool {
    params.p_cost >= 1
        && params.p_cost <= MAX_P_COST
        && params.t_cost >= 1
        && params.t_cost <= MAX_T_COST
        && params.m_cost >= 8 * params.p_cost
        && params.m_cost <= MAX_M_COST
}
