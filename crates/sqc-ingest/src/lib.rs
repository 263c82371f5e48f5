//! sqc-ingest
//!
//! Ingest Coordinator. One [`Autopilot::put`] persists an item, tries the
//! single-step advance, chains scan-ahead rounds while whole windows are
//! confirmed, and announces one aggregated change for the whole call.
//!
//! # Invariants
//! - The item is durable before any cursor decision is made.
//! - A put that does not advance the cursor emits nothing.
//! - Serially, the step notifications equal the contiguity oracle's
//!   positions for the same arrivals and batch size.

mod autopilot;
mod error;
mod feed;

pub use autopilot::{Autopilot, PutOutcome};
pub use error::PutError;
pub use feed::ChangeFeed;

pub use sqc_reconcile::{ChangeObserver, SubscriptionId};
