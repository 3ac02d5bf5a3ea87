//! Memory hygiene for secret material
//!
//! - Zeroizing wrappers for entropy, phrases and exported keys
//! - Page locking for the in-session private key
//! - Process hardening (core dumps)

pub mod mlock;
pub mod zeroize;

pub use mlock::{can_lock_memory, setup_memory_protection, LockedMemory};
pub use zeroize::{zeroize_slice, SecureBytes, SecureString};
