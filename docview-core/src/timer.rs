use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::task::JoinHandle;

/// Runs the most recently scheduled task once `delay` has passed without a
/// newer schedule. Must be used from within a tokio runtime.
pub struct Debouncer {
    delay: Duration,
    ticket: Arc<AtomicU64>,
    pending: Mutex<Option<JoinHandle<()>>>,
}

impl Debouncer {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            ticket: Arc::new(AtomicU64::new(0)),
            pending: Mutex::new(None),
        }
    }

    pub fn schedule<F>(&self, task: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let ticket = self.ticket.fetch_add(1, Ordering::SeqCst) + 1;
        let current = Arc::clone(&self.ticket);
        let delay = self.delay;
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if current.load(Ordering::SeqCst) == ticket {
                task.await;
            }
        });

        // Superseded tasks wake up holding a stale ticket and exit.
        *self.pending.lock() = Some(handle);
    }

    /// Cancels the pending task, including one already past its delay.
    pub fn cancel(&self) {
        self.ticket.fetch_add(1, Ordering::SeqCst);
        if let Some(handle) = self.pending.lock().take() {
            handle.abort();
        }
    }

    pub fn is_pending(&self) -> bool {
        self.pending
            .lock()
            .as_ref()
            .map(|handle| !handle.is_finished())
            .unwrap_or(false)
    }
}

impl Drop for Debouncer {
    fn drop(&mut self) {
        self.cancel();
    }
}
