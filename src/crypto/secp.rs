//! secp256k1 primitives
//!
//! Provides:
//! - Key pairs and recoverable ECDSA signatures (RFC 6979 nonces)
//! - Address derivation (Keccak-256 of the public key, last 20 bytes)
//! - EIP-55 checksummed address text
//! - Public key recovery for verification

use crate::errors::{Result, VaultError};
use k256::ecdsa::{RecoveryId, Signature as EcdsaSignature, SigningKey, VerifyingKey};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use sha3::{Digest, Keccak256};
use std::fmt;
use std::str::FromStr;
use subtle::ConstantTimeEq;

/// Compute keccak256 hash
pub fn keccak256(data: &[u8]) -> [u8; 32] {
    Keccak256::digest(data).into()
}

/// 20-byte account address
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Address([u8; 20]);

impl Address {
    pub fn from_bytes(bytes: [u8; 20]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 20] {
        &self.0
    }

    /// EIP-55 mixed-case rendering
    pub fn to_checksum(&self) -> String {
        checksum_address(&self.0)
    }

    /// Constant-time equality, used on the verification path
    pub fn ct_eq(&self, other: &Address) -> bool {
        self.0.ct_eq(&other.0).into()
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_checksum())
    }
}

impl fmt::Debug for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Address({})", self.to_checksum())
    }
}

impl FromStr for Address {
    type Err = VaultError;

    fn from_str(s: &str) -> Result<Self> {
        parse_address(s).map(Self)
    }
}

impl Serialize for Address {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_checksum())
    }
}

impl<'de> Deserialize<'de> for Address {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// Key pair derived from the wallet seed
pub struct KeyPair {
    signing_key: SigningKey,
}

impl KeyPair {
    /// Create from raw private key bytes (32 bytes)
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.len() != 32 {
            return Err(VaultError::InternalError(format!(
                "Expected 32-byte private key, got {}",
                bytes.len()
            )));
        }

        let signing_key = SigningKey::from_slice(bytes)
            .map_err(|_| VaultError::InternalError("Invalid secp256k1 scalar".to_string()))?;
        Ok(Self { signing_key })
    }

    /// SEC1 compressed public key (33 bytes)
    pub fn public_key(&self) -> Vec<u8> {
        self.signing_key
            .verifying_key()
            .to_encoded_point(true)
            .as_bytes()
            .to_vec()
    }

    pub fn address(&self) -> Address {
        address_of(self.signing_key.verifying_key())
    }

    /// Raw scalar; callers must wipe the copy
    pub(crate) fn secret_bytes(&self) -> [u8; 32] {
        self.signing_key.to_bytes().into()
    }

    /// Sign a 32-byte digest. Deterministic for a given key and digest.
    pub fn sign_digest(&self, digest: &[u8; 32]) -> Result<Signature> {
        let (signature, recovery_id) = self
            .signing_key
            .sign_prehash_recoverable(digest)
            .map_err(|_| VaultError::InternalError("Signing failed".to_string()))?;

        let mut bytes = [0u8; 65];
        bytes[..64].copy_from_slice(&signature.to_bytes());
        bytes[64] = recovery_id.to_byte();
        Ok(Signature(bytes))
    }
}

/// Recoverable signature, `r || s || v` with v in {0, 1}
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct Signature([u8; 65]);

impl Signature {
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.len() != 65 {
            return Err(VaultError::InvalidRequest(format!(
                "Signature must be 65 bytes, got {}",
                bytes.len()
            )));
        }
        let mut sig = [0u8; 65];
        sig.copy_from_slice(bytes);
        Ok(Self(sig))
    }

    pub fn from_hex(s: &str) -> Result<Self> {
        let raw = hex::decode(s.strip_prefix("0x").unwrap_or(s))
            .map_err(|e| VaultError::InvalidRequest(format!("Invalid signature hex: {}", e)))?;
        Self::from_bytes(&raw)
    }

    pub fn to_bytes(&self) -> [u8; 65] {
        self.0
    }

    pub fn recovery_byte(&self) -> u8 {
        self.0[64]
    }

    pub fn to_hex(&self) -> String {
        format!("0x{}", hex::encode(self.0))
    }

    /// Recover the signer address for `digest`
    pub fn recover(&self, digest: &[u8; 32]) -> Result<Address> {
        let invalid = || VaultError::InvalidRequest("Malformed signature".to_string());

        let signature = EcdsaSignature::from_slice(&self.0[..64]).map_err(|_| invalid())?;
        let recovery_id = RecoveryId::from_byte(self.0[64]).ok_or_else(invalid)?;
        let key = VerifyingKey::recover_from_prehash(digest, &signature, recovery_id)
            .map_err(|_| invalid())?;
        Ok(address_of(&key))
    }
}

impl fmt::Debug for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Signature({})", self.to_hex())
    }
}

fn address_of(key: &VerifyingKey) -> Address {
    let point = key.to_encoded_point(false);
    // Skip the 0x04 tag, hash the 64 coordinate bytes, keep the tail
    let hash = keccak256(&point.as_bytes()[1..]);
    let mut address = [0u8; 20];
    address.copy_from_slice(&hash[12..]);
    Address(address)
}

/// Derive the address of a SEC1-encoded public key (33 or 65 bytes)
pub fn address_from_public_key(public_key: &[u8]) -> Result<Address> {
    let key = VerifyingKey::from_sec1_bytes(public_key)
        .map_err(|_| VaultError::InvalidRequest("Invalid public key".to_string()))?;
    Ok(address_of(&key))
}

/// Convert an address to checksummed format (EIP-55)
pub fn checksum_address(address: &[u8; 20]) -> String {
    let addr_hex = hex::encode(address);
    let hash = hex::encode(keccak256(addr_hex.as_bytes()));

    let mut result = String::with_capacity(42);
    result.push_str("0x");

    for (c, h) in addr_hex.chars().zip(hash.chars()) {
        if c.is_ascii_alphabetic() && h >= '8' {
            result.push(c.to_ascii_uppercase());
        } else {
            result.push(c);
        }
    }

    result
}

/// Parse an address. All-lowercase and all-uppercase forms are accepted;
/// mixed case must carry a valid EIP-55 checksum.
pub fn parse_address(addr: &str) -> Result<[u8; 20]> {
    let trimmed = addr.trim();
    let body = trimmed.strip_prefix("0x").unwrap_or(trimmed);

    if body.len() != 40 || !body.chars().all(|c| c.is_ascii_hexdigit()) {
        return Err(VaultError::InvalidRequest(
            "Address must be 40 hex characters".to_string(),
        ));
    }

    let bytes = hex::decode(body.to_ascii_lowercase())
        .map_err(|e| VaultError::InvalidRequest(format!("Invalid address hex: {}", e)))?;
    let mut result = [0u8; 20];
    result.copy_from_slice(&bytes);

    let has_lower = body.chars().any(|c| c.is_ascii_lowercase());
    let has_upper = body.chars().any(|c| c.is_ascii_uppercase());
    if has_lower && has_upper && !verify_checksum(body) {
        return Err(VaultError::InvalidRequest(
            "Address checksum mismatch".to_string(),
        ));
    }

    Ok(result)
}

/// Verify an address checksum (EIP-55)
pub fn verify_checksum(addr: &str) -> bool {
    let addr = addr.strip_prefix("0x").unwrap_or(addr);

    if addr.len() != 40 {
        return false;
    }

    let Ok(bytes) = hex::decode(addr.to_ascii_lowercase()) else {
        return false;
    };

    let mut address = [0u8; 20];
    address.copy_from_slice(&bytes);

    checksum_address(&address)[2..] == *addr
}

#[cfg(test)]
mod tests {
    use super::*;

    const TEST_KEY: &str = "4c0883a69102937d6231471b5dbb6204fe5129617082792ae468d01a3f362318";

    #[test]
    fn test_address_checksum() {
        // Test vector from EIP-55
        let addr = hex::decode("5aaeb6053f3e94c9b9a09f33669435e7ef1beaed").unwrap();
        let mut address = [0u8; 20];
        address.copy_from_slice(&addr);

        assert_eq!(
            checksum_address(&address),
            "0x5aAeb6053F3E94C9b9A09f33669435E7Ef1BeAed"
        );
    }

    #[test]
    fn test_known_key_address() {
        let keypair = KeyPair::from_bytes(&hex::decode(TEST_KEY).unwrap()).unwrap();
        assert_eq!(
            keypair.address().to_string(),
            "0x2c7536E3605D9C16a7a3D7b1898e529396a65c23"
        );
    }

    #[test]
    fn test_address_from_public_key_matches_keypair() {
        let keypair = KeyPair::from_bytes(&[1u8; 32]).unwrap();
        let derived = address_from_public_key(&keypair.public_key()).unwrap();
        assert_eq!(derived, keypair.address());
        assert_eq!(address_from_public_key(&keypair.public_key()).unwrap(), derived);
    }

    #[test]
    fn test_parse_address_rules() {
        assert!(parse_address("0x5aAeb6053F3E94C9b9A09f33669435E7Ef1BeAed").is_ok());
        assert!(parse_address("0x5aaeb6053f3e94c9b9a09f33669435e7ef1beaed").is_ok());
        assert!(parse_address("5AAEB6053F3E94C9B9A09F33669435E7EF1BEAED").is_ok());

        // Bad checksum
        assert!(parse_address("0x5aAeb6053F3E94C9b9A09f33669435E7Ef1BeAeD").is_err());
        // Wrong length
        assert!(parse_address("0x1234").is_err());
        // Not hex
        assert!(parse_address("0xzzzzb6053f3e94c9b9a09f33669435e7ef1beaed").is_err());
        assert!(parse_address("0x").is_err());
    }

    #[test]
    fn test_sign_and_recover() {
        let keypair = KeyPair::from_bytes(&[3u8; 32]).unwrap();
        let digest = keccak256(b"payload");

        let sig = keypair.sign_digest(&digest).unwrap();
        assert!(sig.recovery_byte() <= 1);
        assert_eq!(sig.recover(&digest).unwrap(), keypair.address());

        let other = keccak256(b"other payload");
        let recovered = sig.recover(&other);
        assert!(recovered.map(|a| a != keypair.address()).unwrap_or(true));
    }

    #[test]
    fn test_signing_is_deterministic() {
        let keypair = KeyPair::from_bytes(&[5u8; 32]).unwrap();
        let digest = keccak256(b"same input");
        assert_eq!(
            keypair.sign_digest(&digest).unwrap(),
            keypair.sign_digest(&digest).unwrap()
        );
    }

    #[test]
    fn test_signature_hex_roundtrip() {
        let keypair = KeyPair::from_bytes(&[5u8; 32]).unwrap();
        let sig = keypair.sign_digest(&keccak256(b"x")).unwrap();
        assert_eq!(Signature::from_hex(&sig.to_hex()).unwrap(), sig);
        assert!(Signature::from_hex("0x1234").is_err());
    }
}
