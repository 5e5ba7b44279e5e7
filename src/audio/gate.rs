use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::debug;

/// Process-wide gate allowing one resolution or download at a time.
///
/// Acquisition is scoped: the permit is released when the returned
/// [`DownloadPermit`] is dropped, on every exit path.
#[derive(Clone)]
pub struct DownloadGate {
    lock: Arc<Mutex<()>>,
}

/// Proof of holding the [`DownloadGate`]
pub struct DownloadPermit {
    _guard: OwnedMutexGuard<()>,
}

impl DownloadGate {
    pub fn new() -> Self {
        Self {
            lock: Arc::new(Mutex::new(())),
        }
    }

    /// Waits until no other resolution is in flight.
    pub async fn acquire(&self) -> DownloadPermit {
        let guard = self.lock.clone().lock_owned().await;
        debug!("🔒 Gate de descarga adquirido");
        DownloadPermit { _guard: guard }
    }

    #[cfg(test)]
    pub fn is_busy(&self) -> bool {
        self.lock.try_lock().is_err()
    }
}

impl Default for DownloadGate {
    fn default() -> Self {
        Self::new()
    }
}
