//! Close signal shared by the connection implementations.

use std::sync::atomic::{AtomicBool, Ordering};

use tokio::sync::Notify;

/// One-shot flag that wakes every pending `recv` when a connection closes.
#[derive(Debug, Default)]
pub(crate) struct ShutdownSignal {
    triggered: AtomicBool,
    notify: Notify,
}

impl ShutdownSignal {
    pub(crate) fn trigger(&self) {
        self.triggered.store(true, Ordering::Release);
        self.notify.notify_waiters();
    }

    pub(crate) fn is_triggered(&self) -> bool {
        self.triggered.load(Ordering::Acquire)
    }

    /// Resolves once [`trigger`](Self::trigger) has been called.
    pub(crate) async fn wait(&self) {
        // Register before checking the flag so a concurrent trigger
        // cannot slip between the check and the await.
        let notified = self.notify.notified();
        tokio::pin!(notified);
        notified.as_mut().enable();
        if self.is_triggered() {
            return;
        }
        notified.await;
    }
}
