//! Error types for bapvault

use thiserror::Error;

/// Main error type for vault, signing and broker operations
#[derive(Error, Debug)]
pub enum VaultError {
    // Password / unlock errors
    #[error("Password too weak: {0}")]
    WeakPassword(String),

    /// Wrong password, tampered vault and malformed vault all collapse here.
    #[error("Invalid password")]
    InvalidPassword,

    // Session errors
    #[error("Wallet is locked")]
    Locked,

    #[error("Session expired")]
    SessionExpired,

    // Request errors
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    // Wallet lifecycle errors
    #[error("Wallet already exists for profile: {0}")]
    WalletExists(String),

    #[error("No wallet for profile: {0}")]
    WalletNotFound(String),

    // Storage errors
    #[error("Storage unavailable: {0}")]
    StorageUnavailable(String),

    /// Stored vault that no longer parses. Unlock reports it as `InvalidPassword`.
    #[error("Vault record damaged for profile: {0}")]
    DamagedVault(String),

    // Configuration errors
    #[error("Configuration error: {0}")]
    ConfigError(String),

    // Internal errors
    #[error("Internal error: {0}")]
    InternalError(String),
}

impl VaultError {
    /// Stable code reported across the broker boundary
    pub fn code(&self) -> &'static str {
        match self {
            VaultError::WeakPassword(_) => "WEAK_PASSWORD",
            VaultError::InvalidPassword => "INVALID_PASSWORD",
            VaultError::Locked => "LOCKED",
            VaultError::SessionExpired => "SESSION_EXPIRED",
            VaultError::InvalidRequest(_) => "INVALID_REQUEST",
            VaultError::WalletExists(_) => "WALLET_EXISTS",
            VaultError::WalletNotFound(_) => "WALLET_NOT_FOUND",
            VaultError::StorageUnavailable(_) | VaultError::DamagedVault(_) => "STORAGE_UNAVAILABLE",
            VaultError::ConfigError(_) | VaultError::InternalError(_) => "INTERNAL",
        }
    }

    /// True when the caller should prompt for unlock
    pub fn requires_unlock(&self) -> bool {
        matches!(self, VaultError::Locked | VaultError::SessionExpired)
    }

    /// Message safe to hand to the page. Internal detail stays in the logs.
    pub fn public_message(&self) -> String {
        match self {
            VaultError::ConfigError(_) | VaultError::InternalError(_) => {
                "Internal wallet error".to_string()
            }
            VaultError::StorageUnavailable(_) | VaultError::DamagedVault(_) => {
                "Wallet storage unavailable".to_string()
            }
            other => other.to_string(),
        }
    }
}

impl From<std::io::Error> for VaultError {
    fn from(err: std::io::Error) -> Self {
        VaultError::StorageUnavailable(err.to_string())
    }
}

impl From<serde_json::Error> for VaultError {
    fn from(err: serde_json::Error) -> Self {
        VaultError::StorageUnavailable(format!("JSON error: {}", err))
    }
}

impl From<tokio::task::JoinError> for VaultError {
    fn from(err: tokio::task::JoinError) -> Self {
        VaultError::InternalError(format!("Worker task failed: {}", err))
    }
}

pub type Result<T> = std::result::Result<T, VaultError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codes() {
        assert_eq!(VaultError::Locked.code(), "LOCKED");
        assert_eq!(VaultError::InvalidPassword.code(), "INVALID_PASSWORD");
        assert_eq!(
            VaultError::InvalidRequest("bad".to_string()).code(),
            "INVALID_REQUEST"
        );
        assert_eq!(VaultError::InternalError("x".to_string()).code(), "INTERNAL");
    }

    #[test]
    fn test_internal_detail_hidden() {
        let err = VaultError::StorageUnavailable("/home/user/.vault: permission denied".to_string());
        assert!(!err.public_message().contains("/home/user"));

        let err = VaultError::InternalError("secret detail".to_string());
        assert_eq!(err.public_message(), "Internal wallet error");
    }

    #[test]
    fn test_requires_unlock() {
        assert!(VaultError::Locked.requires_unlock());
        assert!(VaultError::SessionExpired.requires_unlock());
        assert!(!VaultError::InvalidPassword.requires_unlock());
    }
}
