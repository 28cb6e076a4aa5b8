//! Counter example binary
//!
//! Drives the counter through debounced saves, a fact lookup, the ticker and a
//! reset, on wall-clock time.

use counter::{CounterEnvironment, CounterEvent, CounterReducer, CounterState, AUTOSAVE_DELAY};
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use unflow_runtime::{Store, StoreConfig};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "counter=debug,unflow_runtime=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = StoreConfig::try_from_env()?;
    let store = Store::builder(
        CounterState::default(),
        CounterReducer,
        CounterEnvironment::system(),
    )
    .config(config)
    .on_state_change(|_before, after| {
        tracing::info!(
            count = after.count,
            saved = ?after.saved,
            ticking = after.ticking,
            "State changed"
        );
    })
    .build();

    println!("=== Counter Example: unflow ===\n");

    println!(">>> Tapping + three times, then -");
    store.send(CounterEvent::PlusTapped);
    store.send(CounterEvent::PlusTapped);
    store.send(CounterEvent::PlusTapped);
    store.send(CounterEvent::MinusTapped);
    println!("Count: {} (saved: {:?})", store.state(|s| s.count), store.state(|s| s.saved));

    tokio::time::sleep(AUTOSAVE_DELAY + Duration::from_millis(100)).await;
    println!("After autosave: saved = {:?}", store.state(|s| s.saved));

    println!("\n>>> Asking for a fact");
    let loaded = store
        .send_and_wait_for(
            CounterEvent::FactTapped,
            |action| matches!(action, counter::CounterAction::FactLoaded(_)),
            Duration::from_secs(2),
        )
        .await?;
    println!("Fact: {loaded:?}");

    println!("\n>>> Running the ticker for ~3 seconds");
    store.send(CounterEvent::TickerToggled);
    tokio::time::sleep(Duration::from_millis(3_100)).await;
    store.send(CounterEvent::TickerToggled);
    println!("Count after ticking: {}", store.state(|s| s.count));

    println!("\n>>> Refresh, then reset before anything lands");
    store.send(CounterEvent::Refreshed);
    println!("In-flight tasks: {:?}", store.active_ids());
    store.send(CounterEvent::ResetTapped);
    println!("In-flight tasks after reset: {:?}", store.active_ids());

    store.shutdown_with_default_timeout().await?;
    println!("\nFinal state: {:?}", store.snapshot());

    Ok(())
}
