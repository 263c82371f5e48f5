use anyhow::{Context, Result};
use sqc_config::AutopilotConfig;
use sqc_contiguity::{cursor_positions, final_cursor};
use sqc_ingest::{Autopilot, ChangeObserver};
use sqc_schemas::{BatchSize, CursorChange, Item, Seq};
use sqc_store::MemoryStore;
use std::sync::{Arc, Mutex};
use tokio::task::JoinSet;

const QUEUE: &str = "sim";

/// Run `arrivals` through the oracle and an in-memory coordinator and print
/// both position streams.
///
/// Serial runs must match exactly. Concurrent runs only promise the same
/// final cursor, so only that is compared.
pub async fn run(arrivals: &[Seq], batch_size: u32, concurrent: bool) -> Result<()> {
    let batch = BatchSize::new(batch_size).context("--batch-size must be >= 1")?;
    let oracle = cursor_positions(arrivals, batch_size)?;
    let expected_final = final_cursor(arrivals)?;

    let store = MemoryStore::new();
    let config = AutopilotConfig::default().with_batch_size(batch);
    let autopilot = Arc::new(Autopilot::new(
        config,
        Arc::new(store.clone()),
        Arc::new(store),
    ));

    let steps = Arc::new(Mutex::new(Vec::<Seq>::new()));
    let sink = Arc::clone(&steps);
    let observer: Arc<dyn ChangeObserver> = Arc::new(move |c: &CursorChange| {
        if let Ok(mut v) = sink.lock() {
            v.push(c.new);
        }
    });
    autopilot.subscribe_steps(observer);

    let items = arrivals
        .iter()
        .map(|&seq| Item::new(QUEUE, seq, serde_json::json!({ "seq": seq })))
        .collect::<Result<Vec<_>, _>>()?;

    if concurrent {
        let mut tasks = JoinSet::new();
        for item in items {
            let autopilot = Arc::clone(&autopilot);
            tasks.spawn(async move { autopilot.put(&item).await });
        }
        while let Some(joined) = tasks.join_next().await {
            joined.context("put task panicked")??;
        }
    } else {
        for item in &items {
            autopilot.put(item).await?;
        }
    }

    let cursor = autopilot.cursor(QUEUE).await;
    let observed = steps
        .lock()
        .map(|v| v.clone())
        .unwrap_or_default();

    println!("mode={}", if concurrent { "concurrent" } else { "serial" });
    println!("batch_size={}", batch.get());
    println!("advance_mode={}", autopilot.reconciler().mode().as_str());
    println!("oracle_positions={}", join(&oracle));
    println!("autopilot_positions={}", join(&observed));
    println!("final_cursor={cursor}");
    println!("final_match={}", cursor == expected_final);
    if !concurrent {
        println!("positions_match={}", observed == oracle);
    }
    Ok(())
}

fn join(xs: &[Seq]) -> String {
    xs.iter()
        .map(|x| x.to_string())
        .collect::<Vec<_>>()
        .join(",")
}
