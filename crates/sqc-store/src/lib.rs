//! sqc-store
//!
//! Storage boundary consumed by the reconciler.
//!
//! This crate defines **only** the two store contracts and an in-memory
//! backend. The Postgres backend lives in `sqc-db`; no cursor logic belongs
//! here.
//!
//! # Logical tables
//! - **Items**: partition = queue, sort = seq, value = payload.
//! - **Cursor**: partition = queue, sort = seq. The highest recorded seq of a
//!   partition is the canonical cursor, so recording a lower value never
//!   moves the canonical cursor backward.

mod memory;

pub use memory::MemoryStore;

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sqc_schemas::{Item, Seq};

// ---------------------------------------------------------------------------
// Query shapes
// ---------------------------------------------------------------------------

/// Inclusive sequence range `[lo, hi]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeqRange {
    pub lo: Seq,
    pub hi: Seq,
}

impl SeqRange {
    pub fn new(lo: Seq, hi: Seq) -> Self {
        Self { lo, hi }
    }

    /// The window probed by one scan-ahead round: `(from, from + width]`.
    pub fn after(from: Seq, width: Seq) -> Self {
        Self {
            lo: from + 1,
            hi: from + width,
        }
    }

    pub fn contains(&self, seq: Seq) -> bool {
        self.lo <= seq && seq <= self.hi
    }

    pub fn is_empty(&self) -> bool {
        self.hi < self.lo
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum SortOrder {
    #[default]
    Ascending,
    Descending,
}

/// Outcome of a conditional cursor write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CasOutcome {
    /// The expected value was current; the new value is now recorded.
    Applied,
    /// Another writer moved the cursor first. Carries the value found
    /// ([`sqc_schemas::NO_CURSOR`] when none).
    Conflict { current: Seq },
}

impl CasOutcome {
    pub fn is_applied(&self) -> bool {
        matches!(self, CasOutcome::Applied)
    }
}

// ---------------------------------------------------------------------------
// Contracts
// ---------------------------------------------------------------------------

/// Item table contract.
///
/// Implementations must be `Send + Sync` so a single handle can be shared by
/// concurrently running puts.
#[async_trait]
pub trait ItemStore: Send + Sync {
    /// Insert or overwrite the item at `(item.queue, item.seq)`.
    async fn upsert_item(&self, item: &Item) -> Result<()>;

    /// Point lookup. `Ok(None)` when absent.
    async fn get_item(&self, queue: &str, seq: Seq) -> Result<Option<Item>>;

    /// Items of `queue` with seq inside `range`, sorted by seq in `order`,
    /// at most `limit` of them.
    async fn query_range(
        &self,
        queue: &str,
        range: SeqRange,
        limit: usize,
        order: SortOrder,
    ) -> Result<Vec<Item>>;
}

/// Cursor table contract.
#[async_trait]
pub trait CursorStore: Send + Sync {
    /// Highest recorded cursor value for `queue`, `Ok(None)` when none.
    async fn latest(&self, queue: &str) -> Result<Option<Seq>>;

    /// Record `seq` for `queue` unconditionally. Idempotent.
    async fn record(&self, queue: &str, seq: Seq) -> Result<()>;

    /// Record `new` only if the current canonical value equals `expected`
    /// ([`sqc_schemas::NO_CURSOR`] matches an empty partition). Check and
    /// write are atomic with respect to other calls on the same queue.
    async fn compare_and_record(&self, queue: &str, expected: Seq, new: Seq) -> Result<CasOutcome>;
}
