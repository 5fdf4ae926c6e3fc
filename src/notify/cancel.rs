use std::sync::Arc;

use tokio::sync::watch;

/// Cooperative cancellation shared between a subscriber and the backend
/// feeding it.
///
/// Clones observe the same state. Cancelling is idempotent and can be done
/// from synchronous or asynchronous code on any thread.
#[derive(Debug, Clone)]
pub struct CancelHandle {
    tx: Arc<watch::Sender<bool>>,
}

impl CancelHandle {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(false);
        Self { tx: Arc::new(tx) }
    }

    /// Cancels the subscription. Returns true only for the call that
    /// actually flipped the state.
    pub fn cancel(&self) -> bool {
        !self.tx.send_replace(true)
    }

    pub fn is_cancelled(&self) -> bool {
        *self.tx.borrow()
    }

    /// Resolves once [`CancelHandle::cancel`] has been called on any clone.
    pub async fn cancelled(&self) {
        let mut rx = self.tx.subscribe();
        // The sender lives as long as `self`, so this cannot observe a
        // closed channel.
        let _ = rx.wait_for(|cancelled| *cancelled).await;
    }
}

impl Default for CancelHandle {
    fn default() -> Self {
        Self::new()
    }
}

/// Cancels its handle when dropped unless [`CancelGuard::disarm`] was
/// called first. Covers registrations abandoned mid-flight.
pub(crate) struct CancelGuard {
    handle: CancelHandle,
    armed: bool,
}

impl CancelGuard {
    pub(crate) fn new() -> Self {
        Self {
            handle: CancelHandle::new(),
            armed: true,
        }
    }

    pub(crate) fn handle(&self) -> CancelHandle {
        self.handle.clone()
    }

    /// Hands the handle over to the caller without cancelling it.
    pub(crate) fn disarm(mut self) -> CancelHandle {
        self.armed = false;
        self.handle.clone()
    }
}

impl Drop for CancelGuard {
    fn drop(&mut self) {
        if self.armed {
            self.handle.cancel();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_cancel_is_idempotent() {
        let handle = CancelHandle::new();
        let clone = handle.clone();

        assert!(!handle.is_cancelled());
        assert!(clone.cancel());
        assert!(!clone.cancel());
        assert!(!handle.cancel());
        assert!(handle.is_cancelled());
    }

    #[tokio::test]
    async fn test_cancelled_wakes_waiter() {
        let handle = CancelHandle::new();
        let waiter = {
            let handle = handle.clone();
            tokio::spawn(async move { handle.cancelled().await })
        };

        tokio::time::sleep(Duration::from_millis(10)).await;
        handle.cancel();

        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .expect("waiter not woken")
            .unwrap();
    }

    #[tokio::test]
    async fn test_cancelled_resolves_after_the_fact() {
        let handle = CancelHandle::new();
        handle.cancel();
        handle.cancelled().await;
    }

    #[test]
    fn test_guard_cancels_on_drop() {
        let guard = CancelGuard::new();
        let handle = guard.handle();

        drop(guard);
        assert!(handle.is_cancelled());
    }

    #[test]
    fn test_disarmed_guard_leaves_handle_live() {
        let guard = CancelGuard::new();
        let observer = guard.handle();

        let handle = guard.disarm();
        assert!(!observer.is_cancelled());
        assert!(handle.cancel());
        assert!(observer.is_cancelled());
    }

    #[test]
    fn test_cancel_from_other_thread() {
        let handle = CancelHandle::new();
        let remote = handle.clone();
        std::thread::spawn(move || remote.cancel()).join().unwrap();
        assert!(handle.is_cancelled());
    }
}
