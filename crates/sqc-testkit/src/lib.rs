//! sqc-testkit
//!
//! Shared helpers for the scenario tests under `tests/`:
//! - [`ChaosStore`]: store wrapper that yields between operations and fails
//!   armed operations once.
//! - [`Recorder`]: observer that keeps every change it is handed.
//! - fixtures: known arrival orders, documents, ready-made autopilots.

mod chaos;
mod fixtures;
mod recorder;

pub use chaos::{ChaosStore, StoreOp};
pub use fixtures::{
    chaos_autopilot, doc, item, memory_autopilot, permutation, SCRAMBLED_10, SCRAMBLED_100,
};
pub use recorder::Recorder;
