//! Interleaving and fault injection around a real store.
//!
//! Every call first yields to the scheduler a pseudo-random number of times
//! (deterministic per call index), so concurrent puts on a multi-thread
//! runtime interleave at store boundaries. Armed faults fail the next call of
//! their kind once, before it reaches the inner store.

use anyhow::{bail, Result};
use async_trait::async_trait;
use sqc_schemas::{Item, Seq};
use sqc_store::{CasOutcome, CursorStore, ItemStore, SeqRange, SortOrder};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

/// Store operation kinds, for fault arming and call counting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StoreOp {
    UpsertItem,
    GetItem,
    QueryRange,
    Latest,
    Record,
    CompareAndRecord,
}

#[derive(Debug, Default)]
struct Ledger {
    armed: HashMap<StoreOp, u32>,
    calls: HashMap<StoreOp, u64>,
}

#[derive(Debug, Clone)]
pub struct ChaosStore<S> {
    inner: S,
    max_yields: u32,
    tick: Arc<AtomicU64>,
    ledger: Arc<Mutex<Ledger>>,
}

impl<S> ChaosStore<S> {
    pub fn new(inner: S) -> Self {
        Self {
            inner,
            max_yields: 0,
            tick: Arc::new(AtomicU64::new(0)),
            ledger: Arc::new(Mutex::new(Ledger::default())),
        }
    }

    /// Yield up to `max_yields` times before each call.
    pub fn with_max_yields(mut self, max_yields: u32) -> Self {
        self.max_yields = max_yields;
        self
    }

    pub fn inner(&self) -> &S {
        &self.inner
    }

    fn ledger(&self) -> MutexGuard<'_, Ledger> {
        self.ledger.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Fail the next call of kind `op`. Arming twice fails the next two.
    pub fn fail_next(&self, op: StoreOp) {
        *self.ledger().armed.entry(op).or_default() += 1;
    }

    /// Drop every armed fault.
    pub fn disarm(&self) {
        self.ledger().armed.clear();
    }

    /// Calls of kind `op` seen so far, failed ones included.
    pub fn calls(&self, op: StoreOp) -> u64 {
        self.ledger().calls.get(&op).copied().unwrap_or(0)
    }

    async fn enter(&self, op: StoreOp) -> Result<()> {
        if self.max_yields > 0 {
            let n = self.tick.fetch_add(1, Ordering::Relaxed);
            let spins = (n.wrapping_mul(2_654_435_761) >> 7) % (u64::from(self.max_yields) + 1);
            for _ in 0..spins {
                tokio::task::yield_now().await;
            }
        }

        let mut ledger = self.ledger();
        *ledger.calls.entry(op).or_default() += 1;
        if let Some(left) = ledger.armed.get_mut(&op) {
            if *left > 0 {
                *left -= 1;
                bail!("injected {op:?} failure");
            }
        }
        Ok(())
    }
}

#[async_trait]
impl<S: ItemStore> ItemStore for ChaosStore<S> {
    async fn upsert_item(&self, item: &Item) -> Result<()> {
        self.enter(StoreOp::UpsertItem).await?;
        self.inner.upsert_item(item).await
    }

    async fn get_item(&self, queue: &str, seq: Seq) -> Result<Option<Item>> {
        self.enter(StoreOp::GetItem).await?;
        self.inner.get_item(queue, seq).await
    }

    async fn query_range(
        &self,
        queue: &str,
        range: SeqRange,
        limit: usize,
        order: SortOrder,
    ) -> Result<Vec<Item>> {
        self.enter(StoreOp::QueryRange).await?;
        self.inner.query_range(queue, range, limit, order).await
    }
}

#[async_trait]
impl<S: CursorStore> CursorStore for ChaosStore<S> {
    async fn latest(&self, queue: &str) -> Result<Option<Seq>> {
        self.enter(StoreOp::Latest).await?;
        self.inner.latest(queue).await
    }

    async fn record(&self, queue: &str, seq: Seq) -> Result<()> {
        self.enter(StoreOp::Record).await?;
        self.inner.record(queue, seq).await
    }

    async fn compare_and_record(&self, queue: &str, expected: Seq, new: Seq) -> Result<CasOutcome> {
        self.enter(StoreOp::CompareAndRecord).await?;
        self.inner.compare_and_record(queue, expected, new).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqc_store::MemoryStore;

    #[tokio::test]
    async fn armed_fault_fires_once() {
        let chaos = ChaosStore::new(MemoryStore::new());
        chaos.fail_next(StoreOp::Record);

        assert!(chaos.record("bob", 0).await.is_err());
        assert!(chaos.record("bob", 0).await.is_ok());
        assert_eq!(chaos.calls(StoreOp::Record), 2);
        assert_eq!(chaos.inner().cursor_history("bob"), vec![0]);
    }

    #[tokio::test]
    async fn disarm_clears_pending_faults() {
        let chaos = ChaosStore::new(MemoryStore::new()).with_max_yields(3);
        chaos.fail_next(StoreOp::Latest);
        chaos.disarm();
        assert_eq!(chaos.latest("bob").await.unwrap(), None);
    }
}
