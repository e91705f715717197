//! Cooperative cancellation.

use tokio::sync::watch;

/// Sender half: flips the shared flag. Cloneable; any holder may cancel.
#[derive(Clone)]
pub struct CancelHandle {
    tx: std::sync::Arc<watch::Sender<bool>>,
}

impl CancelHandle {
    pub fn cancel(&self) {
        // Receivers may all be gone once the run finished; that is fine.
        let _ = self.tx.send(true);
    }
}

/// Receiver half, checked by executors between scheduling rounds. Node
/// callables are never interrupted; cancellation takes effect at the next
/// round boundary.
#[derive(Clone)]
pub struct CancelToken {
    rx: watch::Receiver<bool>,
}

impl CancelToken {
    /// A token that never cancels.
    pub fn none() -> Self {
        cancel_pair().1
    }

    pub fn is_canceled(&self) -> bool {
        *self.rx.borrow()
    }
}

/// Create a linked cancel handle/token pair.
pub fn cancel_pair() -> (CancelHandle, CancelToken) {
    let (tx, rx) = watch::channel(false);
    (CancelHandle { tx: std::sync::Arc::new(tx) }, CancelToken { rx })
}
