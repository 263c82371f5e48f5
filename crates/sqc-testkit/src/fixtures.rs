use serde_json::{json, Value};
use sqc_config::AutopilotConfig;
use sqc_ingest::Autopilot;
use sqc_schemas::{Item, Seq};
use sqc_store::MemoryStore;
use std::sync::Arc;

use crate::ChaosStore;

/// Ten positions, arriving out of order.
pub const SCRAMBLED_10: [Seq; 10] = [2, 5, 1, 0, 4, 3, 9, 7, 8, 6];

/// A fixed scramble of `[0, 100)`.
pub const SCRAMBLED_100: [Seq; 100] = [
    49, 13, 34, 66, 19, 32, 89, 62, 56, 53, 36, 58, 54, 55, 47, 82, 35, 76, 94, 60, //
    98, 12, 5, 20, 96, 1, 39, 16, 7, 33, 22, 2, 11, 90, 81, 99, 57, 42, 27, 59, //
    80, 69, 3, 86, 21, 26, 38, 77, 6, 24, 78, 51, 87, 18, 23, 91, 68, 70, 79, 72, //
    85, 15, 92, 84, 41, 65, 61, 63, 8, 64, 14, 83, 10, 52, 29, 43, 74, 44, 31, 28, //
    75, 4, 48, 97, 46, 9, 93, 50, 95, 0, 17, 73, 88, 45, 25, 67, 71, 30, 40, 37,
];

/// Raw document with the default field names.
pub fn doc(queue: &str, seq: Seq) -> Value {
    json!({
        "queue": queue,
        "seq": seq,
        "message": format!("message {seq}"),
    })
}

pub fn item(queue: &str, seq: Seq) -> Item {
    Item {
        queue: queue.to_string(),
        seq,
        payload: doc(queue, seq),
    }
}

/// Deterministic Fisher-Yates over `[0, n)` driven by a fixed LCG.
pub fn permutation(n: Seq, seed: u64) -> Vec<Seq> {
    let mut v: Vec<Seq> = (0..n).collect();
    let mut state = seed;
    for i in (1..v.len()).rev() {
        state = state
            .wrapping_mul(6_364_136_223_846_793_005)
            .wrapping_add(1_442_695_040_888_963_407);
        let j = (state >> 33) as usize % (i + 1);
        v.swap(i, j);
    }
    v
}

/// Autopilot over a fresh in-memory store. The store handle is returned for
/// direct inspection.
pub fn memory_autopilot(config: AutopilotConfig) -> (Arc<Autopilot>, MemoryStore) {
    let store = MemoryStore::new();
    let autopilot = Autopilot::new(config, Arc::new(store.clone()), Arc::new(store.clone()));
    (Arc::new(autopilot), store)
}

/// Autopilot over a [`ChaosStore`] wrapping a fresh in-memory store.
pub fn chaos_autopilot(
    config: AutopilotConfig,
    max_yields: u32,
) -> (Arc<Autopilot>, ChaosStore<MemoryStore>) {
    let chaos = ChaosStore::new(MemoryStore::new()).with_max_yields(max_yields);
    let autopilot = Autopilot::new(config, Arc::new(chaos.clone()), Arc::new(chaos.clone()));
    (Arc::new(autopilot), chaos)
}
