//! Cursor advancement against the stores.
//!
//! # Invariants
//! - The cursor only moves to `c + 1` (single step) or to the end of a gap-free
//!   run starting at `c + 1` (scan round). It never lands on a position with
//!   a missing predecessor.
//! - In atomic mode a write only happens if the canonical cursor still equals
//!   the value the decision was made on.
//! - Scan rounds never fail: store errors end the round as [`ScanRound::Aborted`].

use anyhow::{anyhow, Result};
use sqc_config::{AdvanceMode, AutopilotConfig};
use sqc_schemas::{BatchSize, CursorChange, Item, Seq, NO_CURSOR};
use sqc_store::{CasOutcome, CursorStore, ItemStore, SeqRange, SortOrder};
use std::sync::Arc;
use tracing::{debug, warn};

use crate::Notifier;

/// Result of [`Reconciler::try_advance`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Advance {
    /// Cursor moved from `old` to `new` (`new == old + 1`).
    Advanced { old: Seq, new: Seq },
    /// Position already confirmed; nothing written.
    Stale { last: Seq },
    /// Predecessor not yet confirmed; nothing written.
    OutOfOrder { last: Seq },
}

impl Advance {
    pub fn is_advanced(&self) -> bool {
        matches!(self, Advance::Advanced { .. })
    }

    /// Cursor value after the call, as far as this call observed it.
    pub fn last(&self) -> Seq {
        match *self {
            Advance::Advanced { new, .. } => new,
            Advance::Stale { last } | Advance::OutOfOrder { last } => last,
        }
    }

    fn classify(last: Seq, seq: Seq) -> Option<Self> {
        if seq <= last {
            Some(Advance::Stale { last })
        } else if seq > last + 1 {
            Some(Advance::OutOfOrder { last })
        } else {
            None
        }
    }
}

/// Result of one [`Reconciler::scan_ahead`] round.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanRound {
    /// Cursor persisted at `to`.
    Advanced { from: Seq, to: Seq },
    /// `from + 1` is missing, or another writer already covered the run.
    NoProgress,
    /// A store call failed; the error was logged and swallowed.
    Aborted,
}

impl ScanRound {
    /// True when the round confirmed a whole window, so the run may continue.
    pub fn filled(&self, batch: BatchSize) -> bool {
        match *self {
            ScanRound::Advanced { from, to } => to - from == batch.span(),
            _ => false,
        }
    }
}

/// End of the gap-free run starting right after `from`.
///
/// `seqs` must be ascending. Returns `from` when `from + 1` is absent.
pub fn contiguous_end(from: Seq, seqs: impl IntoIterator<Item = Seq>) -> Seq {
    let mut pointer = from;
    for seq in seqs {
        if seq <= pointer {
            continue;
        }
        if seq != pointer + 1 {
            break;
        }
        pointer = seq;
    }
    pointer
}

/// Single-step advance and bounded scan-ahead over a pair of stores.
pub struct Reconciler {
    items: Arc<dyn ItemStore>,
    cursors: Arc<dyn CursorStore>,
    mode: AdvanceMode,
    cas_retries: u32,
    notifier: Notifier,
}

impl std::fmt::Debug for Reconciler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Reconciler")
            .field("mode", &self.mode)
            .field("cas_retries", &self.cas_retries)
            .field("notifier", &self.notifier)
            .finish_non_exhaustive()
    }
}

impl Reconciler {
    pub fn new(
        config: &AutopilotConfig,
        items: Arc<dyn ItemStore>,
        cursors: Arc<dyn CursorStore>,
    ) -> Self {
        Self {
            items,
            cursors,
            mode: config.advance_mode,
            cas_retries: config.cas_retries,
            notifier: Notifier::new(),
        }
    }

    /// Step-level notifications: one per persisted cursor write.
    pub fn notifier(&self) -> &Notifier {
        &self.notifier
    }

    pub fn mode(&self) -> AdvanceMode {
        self.mode
    }

    /// Canonical cursor for `queue`, or [`NO_CURSOR`].
    ///
    /// A failed lookup is logged and reported as [`NO_CURSOR`].
    pub async fn current(&self, queue: &str) -> Seq {
        match self.cursors.latest(queue).await {
            Ok(Some(seq)) => seq,
            Ok(None) => NO_CURSOR,
            Err(err) => {
                warn!(queue, error = %err, "cursor lookup failed; treating as no cursor");
                NO_CURSOR
            }
        }
    }

    /// Confirm `seq` if and only if it is exactly `cursor + 1`.
    ///
    /// Errors only when the cursor write itself fails.
    pub async fn try_advance(&self, queue: &str, seq: Seq) -> Result<Advance> {
        let last = self.current(queue).await;
        if let Some(skip) = Advance::classify(last, seq) {
            debug!(queue, seq, last, outcome = ?skip, "single-step advance skipped");
            return Ok(skip);
        }

        match self.mode {
            AdvanceMode::Optimistic => self.cursors.record(queue, seq).await?,
            AdvanceMode::Atomic => {
                if let CasOutcome::Conflict { current } =
                    self.cursors.compare_and_record(queue, last, seq).await?
                {
                    // `seq == last + 1` and `current != last`, so `seq` is never
                    // the successor of `current`: the fresh value settles it.
                    let outcome = Advance::classify(current, seq)
                        .unwrap_or(Advance::Stale { last: current });
                    debug!(queue, seq, last, current, outcome = ?outcome, "single-step advance lost race");
                    return Ok(outcome);
                }
            }
        }

        debug!(queue, old = last, new = seq, "cursor stepped");
        self.notifier.emit(&CursorChange::step(queue, last, seq));
        Ok(Advance::Advanced { old: last, new: seq })
    }

    /// One scan round: probe `(from, from + batch]`, persist the end of the
    /// gap-free run starting at `from + 1`.
    pub async fn scan_ahead(&self, queue: &str, from: Seq, batch: BatchSize) -> ScanRound {
        let window = SeqRange::after(from, batch.span());
        let limit = batch.get() as usize;

        let mut found = match self
            .items
            .query_range(queue, window, limit, SortOrder::Ascending)
            .await
        {
            Ok(found) => found,
            Err(err) => {
                warn!(queue, from, error = %err, "scan query failed; ending run");
                return ScanRound::Aborted;
            }
        };
        found.sort_by_key(|item| item.seq);

        let to = contiguous_end(from, found.iter().map(|item| item.seq));
        if to == from {
            debug!(queue, from, found = found.len(), "scan found no successor");
            return ScanRound::NoProgress;
        }

        match self.persist_jump(queue, from, to).await {
            Ok(Some(old)) => {
                debug!(queue, old, new = to, "cursor jumped");
                self.notifier.emit(&CursorChange::step(queue, old, to));
                ScanRound::Advanced { from, to }
            }
            Ok(None) => {
                debug!(queue, from, to, "run already covered by another writer");
                ScanRound::NoProgress
            }
            Err(err) => {
                warn!(queue, from, to, error = %err, "scan cursor write failed; ending run");
                ScanRound::Aborted
            }
        }
    }

    /// True when the item right after `position` is stored.
    ///
    /// Used after a partial scan round: an item may have landed between the
    /// window query and the cursor write. A failed lookup counts as absent.
    pub async fn successor_present(&self, queue: &str, position: Seq) -> bool {
        match self.items.get_item(queue, position + 1).await {
            Ok(found) => found.is_some(),
            Err(err) => {
                warn!(queue, position, error = %err, "successor lookup failed");
                false
            }
        }
    }

    /// Store an item. Thin pass-through so callers only hold the reconciler.
    pub async fn store_item(&self, item: &Item) -> Result<()> {
        self.items.upsert_item(item).await
    }

    /// Write `to` as the cursor. Returns the value it replaced, or `None`
    /// when a concurrent writer already reached `to` (atomic mode only).
    async fn persist_jump(&self, queue: &str, from: Seq, to: Seq) -> Result<Option<Seq>> {
        match self.mode {
            AdvanceMode::Optimistic => {
                self.cursors.record(queue, to).await?;
                Ok(Some(from))
            }
            AdvanceMode::Atomic => {
                let mut expected = from;
                for _ in 0..=self.cas_retries {
                    match self.cursors.compare_and_record(queue, expected, to).await? {
                        CasOutcome::Applied => return Ok(Some(expected)),
                        CasOutcome::Conflict { current } if current >= to => return Ok(None),
                        // Items in (current, to] are known present, so `to`
                        // stays a valid target from any lower cursor that
                        // is at least `from`.
                        CasOutcome::Conflict { current } if current >= from => expected = current,
                        CasOutcome::Conflict { current } => {
                            return Err(anyhow!(
                                "cursor {current} below scan start {from}; refusing to jump"
                            ))
                        }
                    }
                }
                Err(anyhow!(
                    "cursor compare-and-record conflicted {} times",
                    self.cas_retries + 1
                ))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn contiguous_end_stops_at_first_gap() {
        assert_eq!(contiguous_end(-1, [0, 1, 2, 4]), 2);
        assert_eq!(contiguous_end(-1, [1, 2]), -1);
        assert_eq!(contiguous_end(3, Vec::<Seq>::new()), 3);
        assert_eq!(contiguous_end(3, [3, 4, 5]), 5);
    }

    #[test]
    fn classify_single_step() {
        assert_eq!(Advance::classify(4, 3), Some(Advance::Stale { last: 4 }));
        assert_eq!(Advance::classify(4, 4), Some(Advance::Stale { last: 4 }));
        assert_eq!(Advance::classify(4, 6), Some(Advance::OutOfOrder { last: 4 }));
        assert_eq!(Advance::classify(4, 5), None);
        assert_eq!(Advance::classify(NO_CURSOR, 0), None);
    }

    #[test]
    fn filled_means_full_window() {
        let b = BatchSize::new(5).unwrap();
        assert!(ScanRound::Advanced { from: 0, to: 5 }.filled(b));
        assert!(!ScanRound::Advanced { from: 0, to: 3 }.filled(b));
        assert!(!ScanRound::NoProgress.filled(b));
        assert!(!ScanRound::Aborted.filled(b));
    }
}
