use sqc_reconcile::ChangeObserver;
use sqc_schemas::{CursorChange, Seq};
use std::sync::{Arc, Mutex, MutexGuard};

/// Collects every change delivered to it. Clones share the same log.
#[derive(Debug, Clone, Default)]
pub struct Recorder {
    seen: Arc<Mutex<Vec<CursorChange>>>,
}

impl Recorder {
    pub fn new() -> Self {
        Self::default()
    }

    fn log(&self) -> MutexGuard<'_, Vec<CursorChange>> {
        self.seen.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn observer(&self) -> Arc<dyn ChangeObserver> {
        Arc::new(self.clone())
    }

    pub fn changes(&self) -> Vec<CursorChange> {
        self.log().clone()
    }

    /// `new` values in delivery order.
    pub fn positions(&self) -> Vec<Seq> {
        self.log().iter().map(|c| c.new).collect()
    }

    /// `(old, new)` pairs in delivery order.
    pub fn pairs(&self) -> Vec<(Seq, Seq)> {
        self.log().iter().map(|c| (c.old, c.new)).collect()
    }

    pub fn len(&self) -> usize {
        self.log().len()
    }

    pub fn is_empty(&self) -> bool {
        self.log().is_empty()
    }

    pub fn clear(&self) {
        self.log().clear();
    }
}

impl ChangeObserver for Recorder {
    fn on_change(&self, change: &CursorChange) {
        self.log().push(change.clone());
    }
}
