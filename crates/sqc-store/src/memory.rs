use anyhow::{anyhow, Result};
use async_trait::async_trait;
use serde_json::Value;
use sqc_schemas::{Item, Seq, NO_CURSOR};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::{Arc, RwLock};

use crate::{CasOutcome, CursorStore, ItemStore, SeqRange, SortOrder};

/// In-memory backend implementing both store contracts.
///
/// Thread-safe via `RwLock`; clones share the same tables. Locks are never
/// held across an `.await`. Not durable.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    items: Arc<RwLock<HashMap<String, BTreeMap<Seq, Value>>>>,
    cursors: Arc<RwLock<HashMap<String, BTreeSet<Seq>>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored items for `queue`.
    pub fn item_count(&self, queue: &str) -> usize {
        self.items
            .read()
            .map(|t| t.get(queue).map_or(0, BTreeMap::len))
            .unwrap_or(0)
    }

    /// Every cursor value ever recorded for `queue`, ascending.
    pub fn cursor_history(&self, queue: &str) -> Vec<Seq> {
        self.cursors
            .read()
            .map(|t| {
                t.get(queue)
                    .map(|s| s.iter().copied().collect())
                    .unwrap_or_default()
            })
            .unwrap_or_default()
    }

    fn canonical(marks: Option<&BTreeSet<Seq>>) -> Seq {
        marks
            .and_then(|s| s.iter().next_back().copied())
            .unwrap_or(NO_CURSOR)
    }
}

fn poisoned<T>(_: T) -> anyhow::Error {
    anyhow!("memory store lock poisoned")
}

#[async_trait]
impl ItemStore for MemoryStore {
    async fn upsert_item(&self, item: &Item) -> Result<()> {
        let mut t = self.items.write().map_err(poisoned)?;
        t.entry(item.queue.clone())
            .or_default()
            .insert(item.seq, item.payload.clone());
        Ok(())
    }

    async fn get_item(&self, queue: &str, seq: Seq) -> Result<Option<Item>> {
        let t = self.items.read().map_err(poisoned)?;
        Ok(t.get(queue).and_then(|rows| rows.get(&seq)).map(|payload| Item {
            queue: queue.to_string(),
            seq,
            payload: payload.clone(),
        }))
    }

    async fn query_range(
        &self,
        queue: &str,
        range: SeqRange,
        limit: usize,
        order: SortOrder,
    ) -> Result<Vec<Item>> {
        if range.is_empty() || limit == 0 {
            return Ok(Vec::new());
        }
        let t = self.items.read().map_err(poisoned)?;
        let Some(rows) = t.get(queue) else {
            return Ok(Vec::new());
        };

        let to_item = |(seq, payload): (&Seq, &Value)| Item {
            queue: queue.to_string(),
            seq: *seq,
            payload: payload.clone(),
        };
        let window = rows.range(range.lo..=range.hi);
        let out = match order {
            SortOrder::Ascending => window.take(limit).map(to_item).collect(),
            SortOrder::Descending => window.rev().take(limit).map(to_item).collect(),
        };
        Ok(out)
    }
}

#[async_trait]
impl CursorStore for MemoryStore {
    async fn latest(&self, queue: &str) -> Result<Option<Seq>> {
        let t = self.cursors.read().map_err(poisoned)?;
        Ok(t.get(queue).and_then(|s| s.iter().next_back().copied()))
    }

    async fn record(&self, queue: &str, seq: Seq) -> Result<()> {
        let mut t = self.cursors.write().map_err(poisoned)?;
        t.entry(queue.to_string()).or_default().insert(seq);
        Ok(())
    }

    async fn compare_and_record(&self, queue: &str, expected: Seq, new: Seq) -> Result<CasOutcome> {
        let mut t = self.cursors.write().map_err(poisoned)?;
        let current = Self::canonical(t.get(queue));
        if current != expected {
            return Ok(CasOutcome::Conflict { current });
        }
        t.entry(queue.to_string()).or_default().insert(new);
        Ok(CasOutcome::Applied)
    }
}
