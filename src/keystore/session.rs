//! Unlocked-session state
//!
//! At most one session exists per process. It owns the account private key
//! in page-locked memory; everything that leaves this module is a
//! `SessionHandle`, which carries only public data.

use crate::crypto::{Address, KeyPair};
use crate::errors::{Result, VaultError};
use crate::security::LockedMemory;
use chrono::{DateTime, Utc};
use std::sync::Mutex;
use tracing::debug;
use uuid::Uuid;

/// Live unlocked session
pub struct Session {
    pub id: Uuid,
    pub unlocked_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub address: Address,
    pub public_key: Vec<u8>,
    private_key: LockedMemory,
}

impl Session {
    pub fn new(
        keypair: &KeyPair,
        private_key: LockedMemory,
        unlocked_at: DateTime<Utc>,
        expires_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            unlocked_at,
            expires_at,
            address: keypair.address(),
            public_key: keypair.public_key(),
            private_key,
        }
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }

    fn handle(&self, checked_at: DateTime<Utc>) -> SessionHandle {
        SessionHandle {
            session_id: self.id,
            checked_at,
            address: self.address,
            public_key: self.public_key.clone(),
            expires_at: self.expires_at,
        }
    }
}

/// Proof that a session was valid at `checked_at`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionHandle {
    pub session_id: Uuid,
    pub checked_at: DateTime<Utc>,
    pub address: Address,
    pub public_key: Vec<u8>,
    pub expires_at: DateTime<Utc>,
}

/// Holder for the single active session
#[derive(Default)]
pub struct SessionStore {
    active: Mutex<Option<Session>>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn slot(&self) -> Result<std::sync::MutexGuard<'_, Option<Session>>> {
        self.active
            .lock()
            .map_err(|_| VaultError::InternalError("session lock poisoned".to_string()))
    }

    /// Start from a clean slate
    pub fn init(&self) -> Result<()> {
        self.clear().map(|_| ())
    }

    /// Install `session`, dropping (and wiping) any previous one
    pub fn set(&self, session: Session) -> Result<SessionHandle> {
        let handle = session.handle(session.unlocked_at);
        let previous = self.slot()?.replace(session);
        if let Some(previous) = previous {
            debug!("Replaced session {}", previous.id);
        }
        Ok(handle)
    }

    /// Handle for the active session as seen at `now`.
    ///
    /// An expired session is cleared here and reported once as
    /// `SessionExpired`; afterwards the store is simply `Locked`.
    pub fn get(&self, now: DateTime<Utc>) -> Result<SessionHandle> {
        let mut slot = self.slot()?;
        match slot.as_ref() {
            None => Err(VaultError::Locked),
            Some(session) if session.is_expired(now) => {
                debug!("Session {} expired", session.id);
                *slot = None;
                Err(VaultError::SessionExpired)
            }
            Some(session) => Ok(session.handle(now)),
        }
    }

    /// Like `get` but leaves an expired session in place for `get` to report
    pub fn peek(&self, now: DateTime<Utc>) -> Result<Option<SessionHandle>> {
        Ok(self
            .slot()?
            .as_ref()
            .filter(|s| !s.is_expired(now))
            .map(|s| s.handle(now)))
    }

    /// Drop the active session. Idempotent.
    pub fn clear(&self) -> Result<bool> {
        Ok(self.slot()?.take().is_some())
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> Result<bool> {
        Ok(self
            .slot()?
            .as_ref()
            .map(|s| s.is_expired(now))
            .unwrap_or(false))
    }

    pub fn is_active(&self) -> Result<bool> {
        Ok(self.slot()?.is_some())
    }

    /// Run `f` with the session key pair.
    ///
    /// The handle must belong to the current session and must have been
    /// issued before that session expired. The key pair never outlives `f`.
    pub fn with_keypair<T>(
        &self,
        handle: &SessionHandle,
        f: impl FnOnce(&KeyPair) -> Result<T>,
    ) -> Result<T> {
        let slot = self.slot()?;
        let session = slot.as_ref().ok_or(VaultError::Locked)?;

        if session.id != handle.session_id {
            return Err(VaultError::Locked);
        }
        if handle.checked_at >= session.expires_at {
            return Err(VaultError::SessionExpired);
        }

        let keypair = KeyPair::from_bytes(session.private_key.as_slice())?;
        f(&keypair)
    }

    /// Copy of the private key for export
    pub fn export_key(&self, handle: &SessionHandle) -> Result<zeroize::Zeroizing<Vec<u8>>> {
        let slot = self.slot()?;
        let session = slot.as_ref().ok_or(VaultError::Locked)?;
        if session.id != handle.session_id {
            return Err(VaultError::Locked);
        }
        if handle.checked_at >= session.expires_at {
            return Err(VaultError::SessionExpired);
        }
        Ok(zeroize::Zeroizing::new(session.private_key.as_slice().to_vec()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn session(now: DateTime<Utc>, ttl: i64) -> Session {
        let key = [3u8; 32];
        let keypair = KeyPair::from_bytes(&key).unwrap();
        Session::new(
            &keypair,
            LockedMemory::copy_from(&key, false),
            now,
            now + Duration::seconds(ttl),
        )
    }

    #[test]
    fn test_empty_store_is_locked() {
        let store = SessionStore::new();
        assert!(matches!(store.get(Utc::now()), Err(VaultError::Locked)));
        assert!(!store.clear().unwrap());
    }

    #[test]
    fn test_init_clears() {
        let store = SessionStore::new();
        store.set(session(Utc::now(), 60)).unwrap();
        assert!(store.is_active().unwrap());
        store.init().unwrap();
        assert!(!store.is_active().unwrap());
    }

    #[test]
    fn test_set_get_clear() {
        let store = SessionStore::new();
        let now = Utc::now();
        let issued = store.set(session(now, 60)).unwrap();

        let handle = store.get(now + Duration::seconds(10)).unwrap();
        assert_eq!(handle.session_id, issued.session_id);
        assert_eq!(handle.address, issued.address);

        assert!(store.clear().unwrap());
        assert!(matches!(store.get(now), Err(VaultError::Locked)));
    }

    #[test]
    fn test_expiry_reported_once() {
        let store = SessionStore::new();
        let now = Utc::now();
        store.set(session(now, 60)).unwrap();

        let later = now + Duration::seconds(61);
        assert!(store.is_expired(later).unwrap());
        assert!(store.peek(later).unwrap().is_none());
        assert!(matches!(store.get(later), Err(VaultError::SessionExpired)));
        assert!(matches!(store.get(later), Err(VaultError::Locked)));
    }

    #[test]
    fn test_replaced_session_invalidates_old_handle() {
        let store = SessionStore::new();
        let now = Utc::now();
        let old = store.set(session(now, 60)).unwrap();
        store.set(session(now, 60)).unwrap();

        let result = store.with_keypair(&old, |kp| Ok(kp.address()));
        assert!(matches!(result, Err(VaultError::Locked)));
    }

    #[test]
    fn test_handle_checked_before_expiry_still_signs() {
        let store = SessionStore::new();
        let now = Utc::now();
        store.set(session(now, 60)).unwrap();

        // Checked one second before expiry; the work itself may finish after
        let handle = store.get(now + Duration::seconds(59)).unwrap();
        let address = store.with_keypair(&handle, |kp| Ok(kp.address())).unwrap();
        assert_eq!(address, handle.address);
    }
}
