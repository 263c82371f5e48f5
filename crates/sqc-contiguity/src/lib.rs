//! sqc-contiguity
//!
//! Reference model for cursor advancement. Given an arrival order of
//! sequence numbers and a batch size, computes every cursor position a
//! correctly-behaving store-backed reconciler reaches, in order.
//!
//! # Invariants
//!
//! - **Distinct, increasing**: every recorded position is strictly greater
//!   than the previous one.
//! - **Contiguous**: a position `p` is only recorded once every value in
//!   `[0, p]` has arrived.
//! - **Batched**: an arrival that extends the cursor by one is followed by
//!   greedy probing in windows of at most `batch_size` positions; the next
//!   window is only probed when the current one was entirely present.
//!
//! Deterministic, pure logic. No IO.

mod model;

pub use model::{cursor_positions, final_cursor, ContiguityError, ContiguityModel};
