use std::pin::Pin;
use std::sync::Mutex;
use std::task::{Context, Poll};
use tokio::sync::{broadcast, watch};
use tokio_stream::wrappers::errors::BroadcastStreamRecvError;
use tokio_stream::wrappers::BroadcastStream;

/// The reactive cell holding the current model.
///
/// The cell pairs two channels: a `watch` channel carrying the latest value
/// (current-value read plus a coalescing change signal, which is what the
/// subscription loop wants -- it only ever cares about the newest model) and
/// a `broadcast` channel carrying every distinct write in order, which is
/// what [`ModelStream`] subscribers want.
///
/// Only the update loop writes; [`publish`](ModelCell::publish) suppresses
/// writes equal to the current value, so a change notification always means
/// the model actually changed.  Writes and subscriptions share one lock:
/// a subscriber's first value and its change stream form a single
/// consistent cut of the write sequence.
pub(crate) struct ModelCell<M: Clone + PartialEq + Send + Sync + 'static> {
    watch_tx: watch::Sender<M>,
    broadcast_tx: broadcast::Sender<M>,
    write_lock: Mutex<()>,
}

impl<M: Clone + PartialEq + Send + Sync + 'static> ModelCell<M> {
    pub fn new(initial: M, capacity: usize) -> Self {
        let (watch_tx, _) = watch::channel(initial);
        let (broadcast_tx, _) = broadcast::channel(capacity.max(1));
        ModelCell {
            watch_tx,
            broadcast_tx,
            write_lock: Mutex::new(()),
        }
    }

    /// Read the current model.
    pub fn current(&self) -> M {
        self.watch_tx.borrow().clone()
    }

    /// Write `next` if it differs from the current value.  Returns whether a
    /// change was published.
    pub fn publish(&self, next: &M) -> bool {
        let _guard = self.write_lock.lock().unwrap();
        if *self.watch_tx.borrow() == *next {
            return false;
        }
        self.watch_tx.send_replace(next.clone());
        let _ = self.broadcast_tx.send(next.clone());
        true
    }

    /// Latest-wins change signal for the subscription loop.  The receiver
    /// starts with the current value unseen, so the initial model counts as
    /// a change.
    pub fn changes(&self) -> watch::Receiver<M> {
        let mut rx = self.watch_tx.subscribe();
        rx.mark_changed();
        rx
    }

    /// Subscribe to the model: the current value immediately, then every
    /// subsequent distinct write in order.
    pub fn subscribe(&self) -> ModelStream<M> {
        // Attach to the broadcast channel and read the current value under
        // the write lock: the channel then carries exactly the writes after
        // the value read here, so subscribers see the full sequence in
        // write order with no duplicates.
        let _guard = self.write_lock.lock().unwrap();
        let changes = BroadcastStream::new(self.broadcast_tx.subscribe());
        let current = self.watch_tx.borrow().clone();
        ModelStream {
            pending: Some(current),
            changes,
        }
    }
}

/// A multi-subscriber stream of model values: the current model first, then
/// every subsequent distinct write, in write order.
///
/// Late subscribers never miss the current state but may miss transient
/// intermediate values published before they subscribed.  A subscriber that
/// falls further behind than the program's model channel capacity skips
/// ahead to the oldest retained value.
pub struct ModelStream<M: Clone + PartialEq + Send + Sync + 'static> {
    pending: Option<M>,
    changes: BroadcastStream<M>,
}

impl<M: Clone + PartialEq + Send + Sync + 'static> Unpin for ModelStream<M> {}

impl<M: Clone + PartialEq + Send + Sync + 'static> futures::Stream for ModelStream<M> {
    type Item = M;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        if let Some(model) = this.pending.take() {
            return Poll::Ready(Some(model));
        }
        loop {
            match Pin::new(&mut this.changes).poll_next(cx) {
                Poll::Ready(Some(Ok(model))) => return Poll::Ready(Some(model)),
                Poll::Ready(Some(Err(BroadcastStreamRecvError::Lagged(skipped)))) => {
                    log::warn!("model subscriber lagged, skipped {skipped} values");
                    continue;
                }
                Poll::Ready(None) => return Poll::Ready(None),
                Poll::Pending => return Poll::Pending,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;

    #[tokio::test]
    async fn current_reads_initial_value() {
        let cell = ModelCell::new(1, 16);
        assert_eq!(cell.current(), 1);
    }

    #[tokio::test]
    async fn publish_updates_current() {
        let cell = ModelCell::new(1, 16);
        assert!(cell.publish(&2));
        assert_eq!(cell.current(), 2);
    }

    #[tokio::test]
    async fn publish_suppresses_equal_values() {
        let cell = ModelCell::new(1, 16);
        assert!(!cell.publish(&1));

        let mut changes = cell.changes();
        changes.mark_unchanged();
        cell.publish(&1);
        assert!(!changes.has_changed().unwrap());
    }

    #[tokio::test]
    async fn subscribe_emits_current_then_writes() {
        let cell = ModelCell::new(0, 16);
        let mut models = cell.subscribe();
        cell.publish(&1);
        cell.publish(&2);
        assert_eq!(models.next().await, Some(0));
        assert_eq!(models.next().await, Some(1));
        assert_eq!(models.next().await, Some(2));
    }

    #[tokio::test]
    async fn late_subscriber_sees_current_value_without_replay() {
        let cell = ModelCell::new(0, 16);
        cell.publish(&1);
        cell.publish(&2);
        cell.publish(&3);
        let mut models = cell.subscribe();
        // Writes from before the subscription are not replayed: the first
        // value is the newest write, and nothing older follows it.
        assert_eq!(models.next().await, Some(3));
        cell.publish(&4);
        assert_eq!(models.next().await, Some(4));
    }

    #[tokio::test]
    async fn initial_model_counts_as_change() {
        let cell = ModelCell::new(7, 16);
        let mut changes = cell.changes();
        assert!(changes.has_changed().unwrap());
        assert_eq!(*changes.borrow_and_update(), 7);
        assert!(!changes.has_changed().unwrap());
    }
}
