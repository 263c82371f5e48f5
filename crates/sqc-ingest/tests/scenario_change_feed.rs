//! Scenario: async consumers follow the cursor through a ChangeFeed
//!
//! # Invariants under test
//!
//! 1. A feed registered on the put-level notifier yields one change per
//!    advancing put, in order.
//! 2. A feed on the step-level notifier yields every individual write.
//! 3. After `unsubscribe` nothing more is forwarded.

use futures_util::StreamExt;
use serde_json::json;
use sqc_config::AutopilotConfig;
use sqc_ingest::{Autopilot, ChangeFeed};
use sqc_schemas::{BatchSize, ChangeScope, Item};
use sqc_store::MemoryStore;
use std::sync::Arc;

fn autopilot(batch: u32) -> Autopilot {
    let store = MemoryStore::new();
    let config = AutopilotConfig::default().with_batch_size(BatchSize::new(batch).unwrap());
    Autopilot::new(config, Arc::new(store.clone()), Arc::new(store))
}

fn item(seq: i64) -> Item {
    Item::new("bob", seq, json!({"queue": "bob", "seq": seq})).unwrap()
}

#[tokio::test]
async fn put_and_step_feeds_see_their_own_granularity() {
    let ap = autopilot(2);
    let put_feed = ChangeFeed::new(16);
    let step_feed = ChangeFeed::new(16);
    let mut puts = put_feed.changes();
    let mut steps = step_feed.changes();
    ap.subscribe(put_feed.observer());
    ap.subscribe_steps(step_feed.observer());

    for seq in [3, 1, 2, 0] {
        ap.put(&item(seq)).await.unwrap();
    }

    let change = puts.next().await.unwrap();
    assert_eq!((change.old, change.new, change.scope), (-1, 3, ChangeScope::Put));

    let mut step_pairs = Vec::new();
    for _ in 0..3 {
        let c = steps.next().await.unwrap();
        assert_eq!(c.scope, ChangeScope::Step);
        step_pairs.push((c.old, c.new));
    }
    assert_eq!(step_pairs, vec![(-1, 0), (0, 2), (2, 3)]);
}

#[tokio::test]
async fn unsubscribed_feed_goes_quiet() {
    let ap = autopilot(10);
    let feed = ChangeFeed::new(16);
    let mut rx = feed.receiver();
    let id = ap.subscribe(feed.observer());

    ap.put(&item(0)).await.unwrap();
    assert!(ap.unsubscribe(id));
    assert!(!ap.unsubscribe(id));
    ap.put(&item(1)).await.unwrap();

    assert_eq!(rx.recv().await.unwrap().new, 0);
    assert!(rx.try_recv().is_err());
}
