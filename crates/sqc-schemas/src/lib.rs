//! sqc-schemas
//!
//! Shared value types for the sequence-cursor workspace: items, cursor
//! positions, batch sizes and change notifications. No IO.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// Position in a queue's sequence space.
///
/// Items always carry a non-negative value. Cursor positions use
/// [`NO_CURSOR`] to mean "nothing confirmed yet".
pub type Seq = i64;

/// Cursor sentinel: no item of the queue has been confirmed.
pub const NO_CURSOR: Seq = -1;

// ---------------------------------------------------------------------------
// Item
// ---------------------------------------------------------------------------

/// One stored item. Unique per `(queue, seq)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Item {
    pub queue: String,
    pub seq: Seq,
    /// The full submitted document.
    pub payload: Value,
}

impl Item {
    pub fn new(queue: impl Into<String>, seq: Seq, payload: Value) -> Result<Self, ItemError> {
        let queue = queue.into();
        if queue.is_empty() {
            return Err(ItemError::EmptyQueue);
        }
        if seq < 0 {
            return Err(ItemError::NegativeSeq(seq));
        }
        Ok(Self {
            queue,
            seq,
            payload,
        })
    }

    /// Build an item from a JSON document, reading the queue key and the
    /// sequence from the configured field names. The document itself becomes
    /// the payload.
    pub fn from_document(doc: Value, fields: &FieldNames) -> Result<Self, ItemError> {
        let queue = match doc.get(&fields.queue_field) {
            Some(Value::String(s)) => s.clone(),
            Some(Value::Number(n)) => n.to_string(),
            Some(_) => return Err(ItemError::BadField(fields.queue_field.clone())),
            None => return Err(ItemError::MissingField(fields.queue_field.clone())),
        };

        let seq = match doc.get(&fields.seq_field) {
            Some(v) => v
                .as_i64()
                .ok_or_else(|| ItemError::BadField(fields.seq_field.clone()))?,
            None => return Err(ItemError::MissingField(fields.seq_field.clone())),
        };

        Item::new(queue, seq, doc)
    }
}

/// Names of the document fields that carry the queue key and the sequence.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldNames {
    pub queue_field: String,
    pub seq_field: String,
}

impl Default for FieldNames {
    fn default() -> Self {
        Self {
            queue_field: "queue".to_string(),
            seq_field: "seq".to_string(),
        }
    }
}

/// Shape errors for caller-supplied items.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ItemError {
    EmptyQueue,
    NegativeSeq(Seq),
    MissingField(String),
    /// Field present but of the wrong type (or not an integer).
    BadField(String),
}

impl fmt::Display for ItemError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ItemError::EmptyQueue => write!(f, "item queue key is empty"),
            ItemError::NegativeSeq(s) => write!(f, "item seq must be >= 0, got {s}"),
            ItemError::MissingField(name) => write!(f, "document missing field '{name}'"),
            ItemError::BadField(name) => write!(f, "document field '{name}' has an invalid value"),
        }
    }
}

impl std::error::Error for ItemError {}

// ---------------------------------------------------------------------------
// Batch size
// ---------------------------------------------------------------------------

/// Scan window size. Always at least 1.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "u32", into = "u32")]
pub struct BatchSize(u32);

impl BatchSize {
    pub const DEFAULT: BatchSize = BatchSize(10);

    pub fn new(n: u32) -> Option<Self> {
        if n == 0 {
            None
        } else {
            Some(Self(n))
        }
    }

    pub fn get(self) -> u32 {
        self.0
    }

    /// Window width in sequence units.
    pub fn span(self) -> Seq {
        Seq::from(self.0)
    }
}

impl Default for BatchSize {
    fn default() -> Self {
        Self::DEFAULT
    }
}

impl TryFrom<u32> for BatchSize {
    type Error = String;

    fn try_from(n: u32) -> Result<Self, Self::Error> {
        BatchSize::new(n).ok_or_else(|| "batch_size must be >= 1".to_string())
    }
}

impl From<BatchSize> for u32 {
    fn from(b: BatchSize) -> u32 {
        b.0
    }
}

// ---------------------------------------------------------------------------
// Change notifications
// ---------------------------------------------------------------------------

/// Which layer emitted a [`CursorChange`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeScope {
    /// One persisted cursor write (single-step advance or one scan round).
    Step,
    /// Aggregated over a whole put (or catch-up) call.
    Put,
}

/// The cursor of `queue` moved from `old` to `new`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CursorChange {
    pub queue: String,
    pub old: Seq,
    pub new: Seq,
    pub scope: ChangeScope,
    pub at: DateTime<Utc>,
}

impl CursorChange {
    pub fn step(queue: impl Into<String>, old: Seq, new: Seq) -> Self {
        Self::with_scope(queue, old, new, ChangeScope::Step)
    }

    pub fn put(queue: impl Into<String>, old: Seq, new: Seq) -> Self {
        Self::with_scope(queue, old, new, ChangeScope::Put)
    }

    fn with_scope(queue: impl Into<String>, old: Seq, new: Seq, scope: ChangeScope) -> Self {
        Self {
            queue: queue.into(),
            old,
            new,
            scope,
            at: Utc::now(),
        }
    }

    /// Number of positions confirmed by this change.
    pub fn advanced_by(&self) -> Seq {
        self.new - self.old
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn item_rejects_negative_seq_and_empty_queue() {
        assert_eq!(
            Item::new("bob", -1, json!({})),
            Err(ItemError::NegativeSeq(-1))
        );
        assert_eq!(Item::new("", 0, json!({})), Err(ItemError::EmptyQueue));
        assert!(Item::new("bob", 0, json!({})).is_ok());
    }

    #[test]
    fn from_document_uses_configured_fields() {
        let fields = FieldNames {
            queue_field: "author".to_string(),
            seq_field: "n".to_string(),
        };
        let doc = json!({"author": "bob", "n": 7, "message": "hi"});
        let item = Item::from_document(doc.clone(), &fields).unwrap();
        assert_eq!(item.queue, "bob");
        assert_eq!(item.seq, 7);
        assert_eq!(item.payload, doc);
    }

    #[test]
    fn from_document_stringifies_numeric_queue() {
        let doc = json!({"queue": 42, "seq": 0});
        let item = Item::from_document(doc, &FieldNames::default()).unwrap();
        assert_eq!(item.queue, "42");
    }

    #[test]
    fn from_document_reports_shape_errors() {
        let fields = FieldNames::default();
        assert_eq!(
            Item::from_document(json!({"seq": 1}), &fields),
            Err(ItemError::MissingField("queue".to_string()))
        );
        assert_eq!(
            Item::from_document(json!({"queue": "a", "seq": 1.5}), &fields),
            Err(ItemError::BadField("seq".to_string()))
        );
        assert_eq!(
            Item::from_document(json!({"queue": "a", "seq": -3}), &fields),
            Err(ItemError::NegativeSeq(-3))
        );
        assert_eq!(
            Item::from_document(json!({"queue": ["a"], "seq": 1}), &fields),
            Err(ItemError::BadField("queue".to_string()))
        );
    }

    #[test]
    fn batch_size_rejects_zero() {
        assert!(BatchSize::new(0).is_none());
        assert_eq!(BatchSize::new(5).map(BatchSize::span), Some(5));
        assert!(serde_json::from_str::<BatchSize>("0").is_err());
        assert_eq!(
            serde_json::from_str::<BatchSize>("3").unwrap(),
            BatchSize::new(3).unwrap()
        );
    }

    #[test]
    fn change_constructors_set_scope() {
        let c = CursorChange::put("bob", -1, 1);
        assert_eq!(c.scope, ChangeScope::Put);
        assert_eq!(c.advanced_by(), 2);
        assert_eq!(CursorChange::step("bob", 0, 1).scope, ChangeScope::Step);
    }
}
