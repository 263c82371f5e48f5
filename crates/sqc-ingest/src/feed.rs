//! Async fan-out of cursor changes.
//!
//! Observers are synchronous; `ChangeFeed` bridges them into a tokio
//! broadcast channel so async consumers can `.next().await` on changes.
//! Receivers that fall more than `capacity` changes behind lose the oldest
//! ones. Nothing is replayed to late subscribers.

use futures_util::stream::{BoxStream, StreamExt};
use sqc_reconcile::ChangeObserver;
use sqc_schemas::CursorChange;
use std::sync::Arc;
use tokio::sync::broadcast;
use tokio_stream::wrappers::errors::BroadcastStreamRecvError;
use tokio_stream::wrappers::BroadcastStream;
use tracing::warn;

#[derive(Debug, Clone)]
pub struct ChangeFeed {
    tx: broadcast::Sender<CursorChange>,
}

impl ChangeFeed {
    pub const DEFAULT_CAPACITY: usize = 1024;

    pub fn new(capacity: usize) -> Self {
        let (tx, _rx) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    /// Observer to register with `Autopilot::subscribe` or `subscribe_steps`.
    pub fn observer(&self) -> Arc<dyn ChangeObserver> {
        let tx = self.tx.clone();
        Arc::new(move |change: &CursorChange| {
            // No receivers is fine: the change is simply not wanted yet.
            let _ = tx.send(change.clone());
        })
    }

    /// Raw receiver, for callers that want to see lag explicitly.
    pub fn receiver(&self) -> broadcast::Receiver<CursorChange> {
        self.tx.subscribe()
    }

    /// Changes from now on. Lag is logged and skipped.
    pub fn changes(&self) -> BoxStream<'static, CursorChange> {
        BroadcastStream::new(self.tx.subscribe())
            .filter_map(|next| async move {
                match next {
                    Ok(change) => Some(change),
                    Err(BroadcastStreamRecvError::Lagged(skipped)) => {
                        warn!(skipped, "change feed receiver lagged");
                        None
                    }
                }
            })
            .boxed()
    }

    pub fn receiver_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for ChangeFeed {
    fn default() -> Self {
        Self::new(Self::DEFAULT_CAPACITY)
    }
}
