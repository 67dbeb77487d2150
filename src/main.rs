use futures::StreamExt;
use rxs_core::{overlay, AsyncMode, Mode, SyncMode};
use rxs_db::{Database, ItemStore};
use rxs_relay::{Communicator, CommunicatorConfigBuilder, Matcher};
use serde_json::{json, Value};
use std::error::Error;
use std::sync::Arc;
use std::time::Duration;
use stress_test::{soak_replication, soak_scaling};
use tracing::info;
use tracing_subscriber::EnvFilter;


fn main() -> Result<(), Box<dyn Error>> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).with_target(false).init();

    let rt = tokio::runtime::Runtime::new()?;
    rt.block_on(async_main())
}

fn by_name(payload: &Value, item: &Value) -> bool {
    payload["name"] == item["name"]
}

/// A database over `store` matching records by name.
pub fn named_database<M: Mode>(store: ItemStore<Value, M>) -> Database<Value, M> {
    Database::builder()
        .update_equal(by_name)
        .remove_equal(by_name)
        .to_search(Value::clone)
        .from_update(|payload: &Value, item: &Value| overlay(payload, item))
        .build_on(store)
}

async fn async_main() -> Result<(), Box<dyn Error>> {
    println!("\n╔════════════════════════════════════════════════════════════╗");
    println!("║            PRIMARY → SECONDARY REPLICATION                 ║");
    println!("╚════════════════════════════════════════════════════════════╝");

    let seed = json!({ "id": "123123", "name": "sss", "age": 11 });
    let primary_store = ItemStore::<Value, SyncMode>::new(vec![seed.clone()]);
    let secondary = Arc::new(named_database(ItemStore::<Value, AsyncMode>::new(vec![seed])));

    let config = CommunicatorConfigBuilder::new()
        .watch_interval(50)
        .autostart_watch(true)
        .build();
    let communicator = Communicator::with_config(primary_store.clone(), Arc::clone(&secondary), config);

    let mut primary = named_database(primary_store.clone());
    primary.attach_observer(communicator.observer());

    // Follow one record on the secondary while the primary changes.
    let mut watched = secondary.find_observable_equal_to(json!({ "name": "alex" }))?;
    let watcher = tokio::spawn(async move {
        while let Some(item) = watched.next().await {
            println!("  secondary sees alex: age {}", item["age"]);
        }
    });

    communicator.connect();

    primary.insert_many(vec![
        json!({ "name": "alex", "age": 13 }),
        json!({ "name": "alex2", "age": 14 }),
        json!({ "name": "alex3", "age": 15 }),
    ])?;
    primary.update(json!({ "name": "alex", "age": 14 }))?;
    primary.remove(json!({ "name": "alex3" }))?;
    info!(pending = communicator.len(), "primary written");

    tokio::time::sleep(Duration::from_millis(200)).await;

    let replicated = secondary.store().find_many(|_| true).await;
    println!("\n[Primary]   {} records", primary_store.len());
    println!("[Secondary] {} records", replicated.len());
    for item in &replicated {
        println!("  {}", item);
    }

    // Pull a record that only exists on the secondary.
    secondary.insert(json!({ "name": "remote-only", "age": 40 }))?.await;
    let pulled = communicator
        .preload(Matcher::EqualTo(json!({ "name": "remote-only" })), None, None)
        .await?;
    println!("\n[Preload] pulled {:?}", pulled.map(|item| item["name"].clone()));

    communicator.destroy();
    secondary.destroy();
    let _ = watcher.await;

    println!("\n\n╔════════════════════════════════════════════════════════════╗");
    println!("║            REPLICATION SOAK RUNS                           ║");
    println!("╚════════════════════════════════════════════════════════════╝");

    let stats = soak_replication(500, 25).await?;
    stats.print();

    let stats = soak_replication(5000, 250).await?;
    stats.print();

    println!("\n\n╔════════════════════════════════════════════════════════════╗");
    println!("║          SCALING ANALYSIS (batch size)                     ║");
    println!("╚════════════════════════════════════════════════════════════╝");
    soak_scaling(2000, 400, 100).await?;

    println!("\n✓ All runs completed successfully!");
    Ok(())
}
