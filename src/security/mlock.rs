//! Page locking for in-session key material
//!
//! The unlocked private key lives in a `LockedMemory` buffer for the
//! duration of a session. Locking keeps those pages out of swap; the buffer
//! is wiped before the pages are released.
//!
//! Page locks are not reference counted, so every buffer owns whole pages.
//! Unlocking one session's key never releases a page another key sits on.

use crate::errors::{Result, VaultError};
#[allow(unused_imports)]
use nix::libc;
use tracing::{debug, warn};

/// Whether the RLIMIT_MEMLOCK soft limit allows any locking at all
pub fn can_lock_memory() -> bool {
    #[cfg(target_os = "linux")]
    {
        use nix::sys::resource::{getrlimit, Resource};

        match getrlimit(Resource::RLIMIT_MEMLOCK) {
            Ok((soft, _hard)) => soft > 0,
            Err(_) => false,
        }
    }

    #[cfg(not(target_os = "linux"))]
    {
        true
    }
}

/// System page size, 4 KiB when it cannot be queried
pub fn page_size() -> usize {
    #[cfg(unix)]
    // SAFETY: sysconf has no preconditions
    let size = unsafe { libc::sysconf(libc::_SC_PAGESIZE) };
    #[cfg(not(unix))]
    let size: i64 = 4096;

    if size > 0 {
        size as usize
    } else {
        4096
    }
}

/// Round `[ptr, ptr + len)` out to whole pages
#[cfg(target_os = "linux")]
fn page_span(ptr: *const u8, len: usize) -> (usize, usize) {
    let page_size = page_size();
    let addr = ptr as usize;
    let start = addr & !(page_size - 1);
    let span = (len + (addr - start) + page_size - 1) & !(page_size - 1);
    (start, span)
}

/// Lock the pages backing a buffer
///
/// # Safety
/// `ptr..ptr+len` must be a live allocation owned by the caller
pub unsafe fn lock_memory(ptr: *const u8, len: usize) -> Result<()> {
    if ptr.is_null() || len == 0 {
        return Ok(());
    }

    #[cfg(target_os = "linux")]
    {
        use nix::sys::mman::mlock;

        let (start, span) = page_span(ptr, len);
        mlock(start as *const libc::c_void, span).map_err(|e| {
            warn!("mlock failed: {}", e);
            VaultError::InternalError(format!("mlock failed: {}", e))
        })?;
        debug!("Locked {} bytes of key memory", span);
        Ok(())
    }

    #[cfg(target_os = "macos")]
    {
        if libc::mlock(ptr as *const libc::c_void, len) == 0 {
            debug!("Locked {} bytes of key memory", len);
            Ok(())
        } else {
            let err = std::io::Error::last_os_error();
            warn!("mlock failed: {}", err);
            Err(VaultError::InternalError(format!("mlock failed: {}", err)))
        }
    }

    #[cfg(not(any(target_os = "linux", target_os = "macos")))]
    {
        warn!("Memory locking not supported on this platform");
        Ok(())
    }
}

/// Release pages previously locked with [`lock_memory`]
///
/// # Safety
/// The region must have been locked by `lock_memory` and still be live
pub unsafe fn unlock_memory(ptr: *const u8, len: usize) -> Result<()> {
    if ptr.is_null() || len == 0 {
        return Ok(());
    }

    #[cfg(target_os = "linux")]
    {
        use nix::sys::mman::munlock;

        let (start, span) = page_span(ptr, len);
        munlock(start as *const libc::c_void, span)
            .map_err(|e| VaultError::InternalError(format!("munlock failed: {}", e)))?;
        Ok(())
    }

    #[cfg(target_os = "macos")]
    {
        if libc::munlock(ptr as *const libc::c_void, len) == 0 {
            Ok(())
        } else {
            let err = std::io::Error::last_os_error();
            Err(VaultError::InternalError(format!("munlock failed: {}", err)))
        }
    }

    #[cfg(not(any(target_os = "linux", target_os = "macos")))]
    {
        Ok(())
    }
}

/// Fixed-size buffer for key material, page-locked when the platform and
/// rlimits allow. Wiped and unlocked on drop.
///
/// The bytes sit at the start of a page-aligned region inside an
/// over-sized allocation, so no other heap object shares those pages.
pub struct LockedMemory {
    buf: Vec<u8>,
    offset: usize,
    len: usize,
    /// Whole pages reserved for the key, starting at `offset`
    span: usize,
    locked: bool,
}

impl LockedMemory {
    /// Move `data` onto pages of its own, attempting to lock them when
    /// `try_lock` is set. The source vector is wiped.
    pub fn from_vec(mut data: Vec<u8>, try_lock: bool) -> Self {
        use zeroize::Zeroize;

        let page = page_size();
        let span = data.len().div_ceil(page).max(1) * page;
        let mut buf = vec![0u8; span + page];
        let offset = (page - buf.as_ptr() as usize % page) % page;
        let len = data.len();
        buf[offset..offset + len].copy_from_slice(&data);
        data.zeroize();

        let locked = try_lock
            && unsafe {
                match lock_memory(buf[offset..].as_ptr(), span) {
                    Ok(_) => true,
                    Err(e) => {
                        warn!("Key memory not locked, continuing: {}", e);
                        false
                    }
                }
            };

        Self {
            buf,
            offset,
            len,
            span,
            locked,
        }
    }

    /// Copy a slice into a fresh buffer
    pub fn copy_from(bytes: &[u8], try_lock: bool) -> Self {
        Self::from_vec(bytes.to_vec(), try_lock)
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.buf[self.offset..self.offset + self.len]
    }

    pub fn is_locked(&self) -> bool {
        self.locked
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

impl Drop for LockedMemory {
    fn drop(&mut self) {
        use zeroize::Zeroize;

        // Wipe in place first so the pages are clean when unlocked
        self.buf.as_mut_slice().zeroize();
        if self.locked {
            unsafe {
                let _ = unlock_memory(self.buf[self.offset..].as_ptr(), self.span);
            }
        }
        self.buf.zeroize();
    }
}

/// Process-wide hardening, called once from `main`
pub fn setup_memory_protection(disable_core_dumps: bool) -> Result<()> {
    #[cfg(target_os = "linux")]
    {
        use nix::sys::resource::{setrlimit, Resource};

        if disable_core_dumps {
            if let Err(e) = setrlimit(Resource::RLIMIT_CORE, 0, 0) {
                warn!("Could not disable core dumps: {}", e);
            } else {
                debug!("Core dumps disabled");
            }
        }
    }

    #[cfg(not(target_os = "linux"))]
    {
        let _ = disable_core_dumps;
    }

    if can_lock_memory() {
        debug!("Memory locking is available");
    } else {
        warn!("RLIMIT_MEMLOCK is zero, session keys will not be page-locked");
    }

    Ok(())
}
