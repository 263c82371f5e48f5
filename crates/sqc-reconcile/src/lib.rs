//! sqc-reconcile
//!
//! Sequence Reconciler: moves a queue's cursor forward against the item and
//! cursor stores.
//!
//! - [`Reconciler::try_advance`] confirms exactly `cursor + 1`.
//! - [`Reconciler::scan_ahead`] probes one bounded window past a position and
//!   jumps over items that already arrived out of order.
//!
//! The cursor is re-read from the store on every operation; nothing about a
//! queue is cached in memory. Every persisted cursor write is announced on
//! the reconciler's [`Notifier`] as a step change.

mod notify;
mod reconciler;

pub use notify::{ChangeObserver, Notifier, QueueHold, SubscriptionId};
pub use reconciler::{contiguous_end, Advance, Reconciler, ScanRound};
