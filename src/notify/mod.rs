//! Long-lived notification subscriptions.

mod cancel;
mod registrar;

pub(crate) use cancel::CancelGuard;
pub use cancel::CancelHandle;
pub use registrar::ConfirmationRegistrar;

use futures::stream::{self, BoxStream, StreamExt};
use tokio::sync::mpsc;

use crate::backend::BackendError;
use crate::types::TxConfirmation;

/// Backend failures reported after a subscription was set up. Shares the
/// subscription's cancel handle, so it ends as soon as that is cancelled.
pub type ErrorStream = Subscription<BackendError>;

/// A cancellable stream of notifications.
///
/// Items arrive in the order the backend emitted them. Once the subscription
/// is cancelled `recv` returns `None`, even if items were still buffered.
#[derive(Debug)]
pub struct Subscription<T> {
    items: mpsc::Receiver<T>,
    cancel: CancelHandle,
}

impl<T: Send + 'static> Subscription<T> {
    pub(crate) fn new(items: mpsc::Receiver<T>, cancel: CancelHandle) -> Self {
        Self { items, cancel }
    }

    /// Waits for the next notification.
    pub async fn recv(&mut self) -> Option<T> {
        if self.cancel.is_cancelled() {
            self.items.close();
            return None;
        }

        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => {
                self.items.close();
                None
            }
            item = self.items.recv() => item,
        }
    }

    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn cancel_handle(&self) -> CancelHandle {
        self.cancel.clone()
    }

    pub fn into_stream(self) -> BoxStream<'static, T> {
        stream::unfold(self, |mut sub| async move {
            let item = sub.recv().await?;
            Some((item, sub))
        })
        .boxed()
    }
}

/// Confirmation notification for a single registration.
///
/// Delivers at most one [`TxConfirmation`]. Reorg tracking beyond that point
/// happens on the caller's reorg channel, which stays live until the
/// registration is cancelled.
#[derive(Debug)]
pub struct ConfirmationEvent {
    confirmed: mpsc::Receiver<TxConfirmation>,
    cancel: CancelHandle,
    delivered: bool,
}

impl ConfirmationEvent {
    pub(crate) fn new(confirmed: mpsc::Receiver<TxConfirmation>, cancel: CancelHandle) -> Self {
        Self {
            confirmed,
            cancel,
            delivered: false,
        }
    }

    /// Waits for the confirmation. Returns `None` if it was already
    /// delivered, the registration was cancelled or the backend closed the
    /// subscription.
    pub async fn confirmed(&mut self) -> Option<TxConfirmation> {
        if self.delivered || self.cancel.is_cancelled() {
            return None;
        }

        let conf = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => None,
            conf = self.confirmed.recv() => conf,
        };

        if conf.is_some() {
            self.delivered = true;
            self.confirmed.close();
        }

        conf
    }

    /// Unsubscribes from the backend. Safe to call repeatedly.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn cancel_handle(&self) -> CancelHandle {
        self.cancel.clone()
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;

    #[tokio::test]
    async fn test_subscription_preserves_order() {
        let (tx, rx) = mpsc::channel(8);
        let mut sub = Subscription::new(rx, CancelHandle::new());

        for height in [100u32, 101, 102] {
            tx.send(height).await.unwrap();
        }
        drop(tx);

        assert_eq!(sub.recv().await, Some(100));
        assert_eq!(sub.recv().await, Some(101));
        assert_eq!(sub.recv().await, Some(102));
        assert_eq!(sub.recv().await, None);
    }

    #[tokio::test]
    async fn test_subscription_drops_buffered_items_after_cancel() {
        let (tx, rx) = mpsc::channel(8);
        let mut sub = Subscription::new(rx, CancelHandle::new());

        tx.send(1u32).await.unwrap();
        tx.send(2u32).await.unwrap();
        sub.cancel();
        sub.cancel();

        assert_eq!(sub.recv().await, None);
        assert!(tx.send(3).await.is_err());
    }

    #[tokio::test]
    async fn test_cancel_unblocks_pending_recv() {
        let (_tx, rx) = mpsc::channel::<u32>(8);
        let mut sub = Subscription::new(rx, CancelHandle::new());
        let handle = sub.cancel_handle();

        let pending = tokio::spawn(async move { sub.recv().await });
        tokio::task::yield_now().await;
        handle.cancel();

        assert_eq!(pending.await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_subscription_stream_ends_on_cancel() {
        let (tx, rx) = mpsc::channel(8);
        let sub = Subscription::new(rx, CancelHandle::new());
        let handle = sub.cancel_handle();
        let mut stream = sub.into_stream();

        tx.send(7u32).await.unwrap();
        assert_eq!(stream.next().await, Some(7));

        handle.cancel();
        assert_eq!(stream.next().await, None);
    }
}
