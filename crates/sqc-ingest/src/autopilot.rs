use serde_json::Value;
use sqc_config::AutopilotConfig;
use sqc_reconcile::{Advance, ChangeObserver, Notifier, Reconciler, ScanRound, SubscriptionId};
use sqc_schemas::{CursorChange, Item, Seq};
use sqc_store::{CursorStore, ItemStore};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::PutError;

/// What a successful put did to the cursor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PutOutcome {
    /// Cursor moved from `old` to `new` after `rounds` scan-ahead rounds.
    Advanced { old: Seq, new: Seq, rounds: u32 },
    /// Stored ahead of the cursor; a later put will absorb it.
    Parked { last: Seq },
    /// Position already confirmed; stored (payload overwritten) only.
    Duplicate { last: Seq },
}

impl PutOutcome {
    pub fn is_advanced(&self) -> bool {
        matches!(self, PutOutcome::Advanced { .. })
    }

    /// Cursor value after the put, as far as the put observed it.
    pub fn last(&self) -> Seq {
        match *self {
            PutOutcome::Advanced { new, .. } => new,
            PutOutcome::Parked { last } | PutOutcome::Duplicate { last } => last,
        }
    }
}

/// How a chain of scan rounds ended.
#[derive(Debug, Clone, Copy)]
struct ScanRun {
    end: Seq,
    rounds: u32,
    aborted: bool,
}

/// Ingest coordinator. Share it behind an `Arc`; every method takes `&self`.
pub struct Autopilot {
    config: AutopilotConfig,
    reconciler: Reconciler,
    puts: Notifier,
}

impl std::fmt::Debug for Autopilot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Autopilot")
            .field("config", &self.config)
            .field("reconciler", &self.reconciler)
            .field("puts", &self.puts)
            .finish()
    }
}

impl Autopilot {
    pub fn new(
        config: AutopilotConfig,
        items: Arc<dyn ItemStore>,
        cursors: Arc<dyn CursorStore>,
    ) -> Self {
        let reconciler = Reconciler::new(&config, items, cursors);
        Self {
            config,
            reconciler,
            puts: Notifier::new(),
        }
    }

    pub fn config(&self) -> &AutopilotConfig {
        &self.config
    }

    pub fn reconciler(&self) -> &Reconciler {
        &self.reconciler
    }

    /// Observe one aggregated change per advancing put or catch-up.
    pub fn subscribe(&self, observer: Arc<dyn ChangeObserver>) -> SubscriptionId {
        self.puts.subscribe(observer)
    }

    /// Observe every individual cursor write.
    pub fn subscribe_steps(&self, observer: Arc<dyn ChangeObserver>) -> SubscriptionId {
        self.reconciler.notifier().subscribe(observer)
    }

    /// Remove an observer registered through either `subscribe` call.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.puts.unsubscribe(id) || self.reconciler.notifier().unsubscribe(id)
    }

    /// Queues with notification state in memory, across both notifiers.
    /// Zero whenever no put or catch-up is running.
    pub fn held_queues(&self) -> usize {
        self.puts.held_queues() + self.reconciler.notifier().held_queues()
    }

    /// Canonical cursor for `queue` (`-1` when unset or unreadable).
    pub async fn cursor(&self, queue: &str) -> Seq {
        self.reconciler.current(queue).await
    }

    /// Parse a raw document with the configured field names, then [`put`](Self::put) it.
    pub async fn put_document(&self, doc: Value) -> Result<PutOutcome, PutError> {
        let item = Item::from_document(doc, &self.config.fields())?;
        self.put(&item).await
    }

    /// Persist `item` and move the cursor as far as the stored items allow.
    pub async fn put(&self, item: &Item) -> Result<PutOutcome, PutError> {
        let queue = item.queue.as_str();
        let _puts = self.puts.hold(queue);
        let _steps = self.reconciler.notifier().hold(queue);

        self.reconciler
            .store_item(item)
            .await
            .map_err(PutError::PersistItem)?;

        let (old, first) = match self
            .reconciler
            .try_advance(queue, item.seq)
            .await
            .map_err(PutError::AdvanceWrite)?
        {
            Advance::Advanced { old, new } => (old, new),
            Advance::OutOfOrder { last } => {
                debug!(queue, seq = item.seq, last, "item parked ahead of cursor");
                return Ok(PutOutcome::Parked { last });
            }
            Advance::Stale { last } => {
                debug!(queue, seq = item.seq, last, "item already confirmed");
                return Ok(PutOutcome::Duplicate { last });
            }
        };

        let run = self.scan_from(queue, first, self.config.max_scan_rounds).await;
        self.announce(queue, old, run.end, run.rounds);

        Ok(PutOutcome::Advanced {
            old,
            new: run.end,
            rounds: run.rounds,
        })
    }

    /// Re-run the scan loop from the stored cursor, ignoring `max_scan_rounds`.
    ///
    /// Finishes runs that a put left behind because a scan round hit a store
    /// error or the round cap stopped it. Errors only when the very first
    /// round aborts, so nothing could be checked.
    pub async fn catch_up(&self, queue: &str) -> anyhow::Result<Option<CursorChange>> {
        let _puts = self.puts.hold(queue);
        let _steps = self.reconciler.notifier().hold(queue);
        let start = self.reconciler.current(queue).await;
        let run = self.scan_from(queue, start, None).await;

        if run.end == start {
            if run.aborted {
                anyhow::bail!("catch-up for queue '{queue}' aborted at cursor {start}; see warnings");
            }
            debug!(queue, cursor = start, "catch-up found nothing to confirm");
            return Ok(None);
        }

        Ok(self.announce(queue, start, run.end, run.rounds))
    }

    fn announce(&self, queue: &str, old: Seq, new: Seq, rounds: u32) -> Option<CursorChange> {
        let change = CursorChange::put(queue, old, new);
        if self.puts.emit(&change) {
            info!(queue, old, new, rounds, "cursor advanced");
            Some(change)
        } else {
            debug!(queue, old, new, "aggregated change superseded by a later put");
            None
        }
    }

    /// Chain scan rounds from `start` while whole windows are confirmed.
    ///
    /// After a partial round the successor of the new position is looked up
    /// once more: an item stored between that round's probe and its cursor
    /// write was rejected by its own put and would otherwise stay parked.
    async fn scan_from(&self, queue: &str, start: Seq, cap: Option<u32>) -> ScanRun {
        let batch = self.config.batch_size;
        let mut run = ScanRun {
            end: start,
            rounds: 0,
            aborted: false,
        };

        loop {
            if let Some(cap) = cap {
                if run.rounds >= cap {
                    debug!(queue, pointer = run.end, cap, "scan round cap reached");
                    break;
                }
            }
            run.rounds += 1;

            let round = self.reconciler.scan_ahead(queue, run.end, batch).await;
            match round {
                ScanRound::Advanced { to, .. } => {
                    run.end = to;
                    if round.filled(batch) {
                        continue;
                    }
                    if !self.reconciler.successor_present(queue, run.end).await {
                        break;
                    }
                    debug!(queue, pointer = run.end, "successor stored during round; rescanning");
                }
                ScanRound::NoProgress => break,
                ScanRound::Aborted => {
                    warn!(queue, pointer = run.end, "scan run aborted; cursor left for catch-up");
                    run.aborted = true;
                    break;
                }
            }
        }

        run
    }
}
