//! Scenario: serial puts replay the contiguity oracle
//!
//! # Invariants under test
//!
//! 1. For a fixed arrival order and batch size, the step notifications of
//!    serial puts equal `cursor_positions(arrivals, batch)`.
//! 2. Every arrival order of `[0, M)` ends with cursor `M - 1`.
//! 3. Aggregated put notifications are strictly increasing and chain
//!    (`old` of one equals `new` of the previous).
//!
//! In-process, MemoryStore only.

use sqc_config::AutopilotConfig;
use sqc_contiguity::cursor_positions;
use sqc_ingest::PutOutcome;
use sqc_schemas::{BatchSize, ChangeScope, Seq};
use sqc_testkit::{item, memory_autopilot, permutation, Recorder, SCRAMBLED_10, SCRAMBLED_100};

const QUEUE: &str = "bob";

fn config(batch: u32) -> AutopilotConfig {
    AutopilotConfig::default().with_batch_size(BatchSize::new(batch).unwrap())
}

/// Put `arrivals` one after another; return (step recorder, put recorder, final cursor).
async fn replay(arrivals: &[Seq], batch: u32) -> (Recorder, Recorder, Seq) {
    let (autopilot, _store) = memory_autopilot(config(batch));
    let steps = Recorder::new();
    let puts = Recorder::new();
    autopilot.subscribe_steps(steps.observer());
    autopilot.subscribe(puts.observer());

    for &seq in arrivals {
        autopilot.put(&item(QUEUE, seq)).await.unwrap();
    }
    let cursor = autopilot.cursor(QUEUE).await;
    (steps, puts, cursor)
}

fn chained(pairs: &[(Seq, Seq)]) -> bool {
    pairs.windows(2).all(|w| w[0].1 == w[1].0) && pairs.iter().all(|(o, n)| n > o)
}

// ---------------------------------------------------------------------------
// 1. Oracle equivalence
// ---------------------------------------------------------------------------

#[tokio::test]
async fn scrambled_hundred_matches_oracle_for_each_batch() {
    for batch in [1_u32, 5, 10, 50] {
        let expected = cursor_positions(&SCRAMBLED_100, batch).unwrap();
        let (steps, puts, cursor) = replay(&SCRAMBLED_100, batch).await;

        assert_eq!(steps.positions(), expected, "batch={batch}");
        assert_eq!(cursor, 99, "batch={batch}");

        let pairs = puts.pairs();
        assert_eq!(pairs.first().map(|p| p.0), Some(-1), "batch={batch}");
        assert_eq!(pairs.last().map(|p| p.1), Some(99), "batch={batch}");
        assert!(chained(&pairs), "batch={batch}: {pairs:?}");
        assert!(puts.changes().iter().all(|c| c.scope == ChangeScope::Put));
    }
}

#[tokio::test]
async fn seeded_permutations_match_oracle() {
    for seed in [3_u64, 11, 2024] {
        let arrivals = permutation(60, seed);
        for batch in [1_u32, 4, 7] {
            let expected = cursor_positions(&arrivals, batch).unwrap();
            let (steps, _puts, cursor) = replay(&arrivals, batch).await;
            assert_eq!(steps.positions(), expected, "seed={seed} batch={batch}");
            assert_eq!(cursor, 59);
        }
    }
}

// ---------------------------------------------------------------------------
// 2. Documented scenarios
// ---------------------------------------------------------------------------

#[tokio::test]
async fn gap_filler_reports_the_whole_jump() {
    let (autopilot, _store) = memory_autopilot(config(5));
    let puts = Recorder::new();
    autopilot.subscribe(puts.observer());

    let first = autopilot.put(&item(QUEUE, 1)).await.unwrap();
    assert_eq!(first, PutOutcome::Parked { last: -1 });
    assert!(puts.is_empty(), "parked item must not notify");

    let second = autopilot.put(&item(QUEUE, 0)).await.unwrap();
    assert!(matches!(second, PutOutcome::Advanced { old: -1, new: 1, .. }));
    assert_eq!(puts.pairs(), vec![(-1, 1)]);
}

#[tokio::test]
async fn scrambled_ten_single_step_windows() {
    let (steps, puts, cursor) = replay(&SCRAMBLED_10, 1).await;

    assert_eq!(cursor, 9);
    assert_eq!(steps.positions(), (0..=9).collect::<Vec<_>>());
    assert_eq!(steps.positions(), cursor_positions(&SCRAMBLED_10, 1).unwrap());
    assert_eq!(puts.pairs(), vec![(-1, 2), (2, 5), (5, 9)]);
}
