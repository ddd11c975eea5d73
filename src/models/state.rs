// Application state (in-memory)
//
// Holds the process-wide "installed" flag. It is seeded once at startup from the
// install lock and only the installer's success path flips it. The install guard
// serializes install attempts inside this process.

use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::{Mutex, MutexGuard};

use crate::installation::lock::InstallLock;

#[derive(Debug, Default)]
pub struct AppState {
    installed: AtomicBool,
    install_guard: Mutex<()>,
}

impl AppState {
    pub fn new(installed: bool) -> Self {
        Self {
            installed: AtomicBool::new(installed),
            install_guard: Mutex::new(()),
        }
    }

    /// Seed the flag from the lock store.
    pub async fn from_lock(lock: &dyn InstallLock) -> Self {
        Self::new(lock.exists().await)
    }

    pub fn is_installed(&self) -> bool {
        self.installed.load(Ordering::SeqCst)
    }

    pub(crate) fn mark_installed(&self) {
        self.installed.store(true, Ordering::SeqCst);
    }

    /// Held for the whole install attempt.
    pub(crate) async fn begin_install(&self) -> MutexGuard<'_, ()> {
        self.install_guard.lock().await
    }
}
