use std::time::Duration;

use indexer_config::shared::{RetryConfig, SyncConfig};
use indexer_telemetry::tracing::init_test_tracing;

use super::{F1, F2, F3, G1, G2, P1, P2, seed_catalog};
use crate::concurrency::shutdown::create_shutdown_channel;
use crate::destination::memory::MemoryDestination;
use crate::driver::SyncDriver;
use crate::error::ErrorKind;
use crate::store::memory::MemoryCheckpointStore;
use crate::test_utils::fixtures::{film, uuid};
use crate::types::{AggregateKind, Table};

fn sync_config() -> SyncConfig {
    SyncConfig {
        interval_ms: 60_000,
        retry: RetryConfig {
            initial_delay_ms: 10,
            max_delay_ms: 100,
            max_elapsed_ms: 1_000,
            ..RetryConfig::default()
        },
        ..SyncConfig::default()
    }
}

fn destination() -> MemoryDestination {
    MemoryDestination::with_indexes(["movies", "genres", "persons"])
}

#[tokio::test]
async fn cycle_syncs_every_default_aggregate() {
    init_test_tracing();

    let source = seed_catalog().await;
    let destination = destination();
    let driver = SyncDriver::from_config(&sync_config(), source, destination.clone(), |_| {
        MemoryCheckpointStore::new()
    });

    assert_eq!(driver.pipelines().len(), 3);

    let (_tx, rx) = create_shutdown_channel();
    let report = driver.run_cycle(&rx).await;

    let kinds: Vec<AggregateKind> = report.aggregates.iter().map(|a| a.aggregate).collect();
    assert_eq!(
        kinds,
        vec![AggregateKind::Film, AggregateKind::Genre, AggregateKind::Person]
    );
    assert_eq!(report.failed_tables(), 0);
    assert!(report.errors().is_none());

    let movies = destination.documents("movies").await;
    assert_eq!(
        movies.keys().copied().collect::<Vec<_>>(),
        vec![uuid(F1), uuid(F2), uuid(F3)]
    );

    let genres = destination.documents("genres").await;
    assert_eq!(
        genres.keys().copied().collect::<Vec<_>>(),
        vec![uuid(G1), uuid(G2)]
    );

    let persons = destination.documents("persons").await;
    assert_eq!(
        persons.keys().copied().collect::<Vec<_>>(),
        vec![uuid(P1), uuid(P2)]
    );
}

#[tokio::test]
async fn aggregates_keep_separate_checkpoints() {
    let source = seed_catalog().await;
    let stores = std::sync::Mutex::new(Vec::new());
    let driver = SyncDriver::from_config(&sync_config(), source, destination(), |aggregate| {
        let store = MemoryCheckpointStore::new();
        stores
            .lock()
            .unwrap()
            .push((aggregate.kind, store.clone()));
        store
    });

    let (_tx, rx) = create_shutdown_channel();
    driver.run_cycle(&rx).await;

    let stores = stores.into_inner().unwrap();
    assert_eq!(stores.len(), 3);

    for (kind, store) in stores {
        let entries = store.entries().await;
        let tables = kind.default_tables();
        assert_eq!(entries.len(), tables.len() * 2, "aggregate {kind}");
        for table in tables {
            assert!(entries.contains_key(&format!("{table}_last_updated")));
        }
    }
}

#[tokio::test]
async fn cycle_report_collects_table_errors() {
    let source = seed_catalog().await;
    source
        .break_table(Table::Person, ErrorKind::SourceQueryFailed)
        .await;

    let destination = destination();
    let driver = SyncDriver::from_config(&sync_config(), source, destination.clone(), |_| {
        MemoryCheckpointStore::new()
    });

    let (_tx, rx) = create_shutdown_channel();
    let report = driver.run_cycle(&rx).await;

    // The film and person aggregates both read the person table.
    assert_eq!(report.failed_tables(), 2);
    let errors = report.errors().unwrap();
    assert_eq!(
        errors.kinds(),
        vec![ErrorKind::SourceQueryFailed, ErrorKind::SourceQueryFailed]
    );
    assert_eq!(destination.documents("genres").await.len(), 2);
}

#[tokio::test(start_paused = true)]
async fn run_repeats_cycles_until_shutdown() {
    init_test_tracing();

    let source = seed_catalog().await;
    let destination = destination();
    let driver = SyncDriver::from_config(&sync_config(), source.clone(), destination.clone(), |_| {
        MemoryCheckpointStore::new()
    });

    let (tx, rx) = create_shutdown_channel();

    let changes = async {
        tokio::time::sleep(Duration::from_secs(1)).await;
        source.upsert_film(film(9, "Omega", 1_000)).await;

        tokio::time::sleep(Duration::from_secs(90)).await;
        tx.shutdown();
    };

    let (result, ()) = tokio::join!(driver.run(rx), changes);

    result.unwrap();
    assert!(destination.document("movies", uuid(9)).await.is_some());
}

#[tokio::test]
async fn run_returns_after_shutdown_without_sleeping() {
    let source = seed_catalog().await;
    let destination = destination();
    let driver = SyncDriver::from_config(&sync_config(), source, destination.clone(), |_| {
        MemoryCheckpointStore::new()
    });

    let (tx, rx) = create_shutdown_channel();
    tx.shutdown();

    tokio::time::timeout(Duration::from_secs(5), driver.run(rx))
        .await
        .unwrap()
        .unwrap();

    assert_eq!(destination.upsert_calls().await, 0);
}
