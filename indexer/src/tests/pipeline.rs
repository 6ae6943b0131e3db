use chrono::SecondsFormat;
use indexer_telemetry::tracing::init_test_tracing;

use super::{F1, F2, F3, G1, G2, P1, P2, aggregate, build_pipeline, seed_catalog};
use crate::concurrency::shutdown::create_shutdown_channel;
use crate::destination::memory::MemoryDestination;
use crate::error::ErrorKind;
use crate::source::base::ChangeExtractor;
use crate::store::memory::MemoryCheckpointStore;
use crate::test_utils::failing_store::FailingCheckpointStore;
use crate::test_utils::fixtures::{film, genre, person, ts, uuid};
use crate::test_utils::memory_source::MemorySource;
use crate::types::{AggregateKind, ChangeCursor, Table};

fn all_film_tables() -> Vec<Table> {
    AggregateKind::Film.default_tables()
}

fn timestamp(secs: i64) -> String {
    ts(secs).to_rfc3339_opts(SecondsFormat::Micros, false)
}

#[tokio::test]
async fn initial_sync_indexes_every_film() {
    init_test_tracing();

    let source = seed_catalog().await;
    let store = MemoryCheckpointStore::new();
    let destination = MemoryDestination::with_indexes(["movies"]);
    let pipeline = build_pipeline(
        aggregate(AggregateKind::Film, &all_film_tables()),
        2,
        &source,
        store.clone(),
        &destination,
    );

    let (_tx, rx) = create_shutdown_channel();
    let report = pipeline.run_once(&rx).await;

    assert_eq!(report.aggregate, AggregateKind::Film);
    assert_eq!(report.index_name, "movies");
    assert_eq!(report.failed_tables().count(), 0);

    let batches: Vec<usize> = report.tables.iter().map(|t| t.batches).collect();
    let documents: Vec<usize> = report.tables.iter().map(|t| t.documents).collect();
    assert_eq!(batches, vec![2, 1, 1]);
    assert_eq!(documents, vec![3, 3, 2]);

    assert_eq!(destination.documents("movies").await.len(), 3);

    let alpha = destination.document("movies", uuid(F1)).await.unwrap();
    assert_eq!(alpha["title"], "Alpha");
    assert_eq!(alpha["imdb_rating"], 7.0);
    assert_eq!(alpha["genre"][0]["name"], "Drama");
    assert_eq!(alpha["actors_names"], serde_json::json!(["Ann Actor"]));
    assert_eq!(alpha["writers_names"], serde_json::json!(["Wes Writer"]));
    assert_eq!(alpha["directors"], serde_json::json!([]));

    let entries = store.entries().await;
    assert_eq!(entries["film_work_last_updated"], timestamp(300));
    assert_eq!(entries["film_work_last_uuid"], uuid(F3).to_string());
    assert_eq!(entries["genre_last_updated"], timestamp(20));
    assert_eq!(entries["genre_last_uuid"], uuid(G2).to_string());
    assert_eq!(entries["person_last_updated"], timestamp(60));
    assert_eq!(entries["person_last_uuid"], uuid(P2).to_string());
}

#[tokio::test]
async fn rerun_without_changes_writes_nothing() {
    let source = seed_catalog().await;
    let destination = MemoryDestination::with_indexes(["movies"]);
    let pipeline = build_pipeline(
        aggregate(AggregateKind::Film, &all_film_tables()),
        100,
        &source,
        MemoryCheckpointStore::new(),
        &destination,
    );

    let (_tx, rx) = create_shutdown_channel();
    pipeline.run_once(&rx).await;
    let calls_after_first_run = destination.upsert_calls().await;

    let report = pipeline.run_once(&rx).await;

    assert!(report.tables.iter().all(|t| t.batches == 0 && t.error.is_none()));
    assert_eq!(destination.upsert_calls().await, calls_after_first_run);
}

#[tokio::test]
async fn changed_film_is_picked_up_after_checkpoint() {
    let source = seed_catalog().await;
    let destination = MemoryDestination::with_indexes(["movies"]);
    let pipeline = build_pipeline(
        aggregate(AggregateKind::Film, &[Table::FilmWork]),
        100,
        &source,
        MemoryCheckpointStore::new(),
        &destination,
    );

    let (_tx, rx) = create_shutdown_channel();
    pipeline.run_once(&rx).await;

    let mut renamed = film(F2, "Beta Reloaded", 400);
    renamed.rating = None;
    source.upsert_film(renamed).await;

    let report = pipeline.run_once(&rx).await;

    assert_eq!(report.tables[0].batches, 1);
    assert_eq!(report.tables[0].documents, 1);

    let beta = destination.document("movies", uuid(F2)).await.unwrap();
    assert_eq!(beta["title"], "Beta Reloaded");
    assert_eq!(beta["imdb_rating"], 0.0);
}

#[tokio::test]
async fn genre_change_refreshes_linked_films() {
    let source = MemorySource::new();
    source.upsert_genre(genre(G1, "Drama", 1000)).await;
    source.upsert_film(film(F1, "Alpha", 100)).await;
    source.upsert_film(film(F2, "Beta", 200)).await;
    source.upsert_film(film(F3, "Gamma", 300)).await;
    source.link_genre(uuid(G1), uuid(F1)).await;
    source.link_genre(uuid(G1), uuid(F1)).await;
    source.link_genre(uuid(G1), uuid(F2)).await;

    let roots = source
        .expand_to_root_ids(Table::FilmWork, Table::Genre, &[uuid(G1)])
        .await
        .unwrap();
    assert_eq!(roots, vec![uuid(F1), uuid(F2)]);

    let store = MemoryCheckpointStore::new();
    let destination = MemoryDestination::with_indexes(["movies"]);
    let pipeline = build_pipeline(
        aggregate(AggregateKind::Film, &[Table::Genre]),
        100,
        &source,
        store.clone(),
        &destination,
    );

    let (_tx, rx) = create_shutdown_channel();
    let report = pipeline.run_once(&rx).await;
    assert_eq!(report.tables[0].documents, 2);

    let documents = destination.documents("movies").await;
    assert_eq!(
        documents.keys().copied().collect::<Vec<_>>(),
        vec![uuid(F1), uuid(F2)]
    );
    for id in [uuid(F1), uuid(F2)] {
        let document = destination.document("movies", id).await.unwrap();
        assert_eq!(
            document["genre"],
            serde_json::json!([{ "id": uuid(G1), "name": "Drama" }])
        );
    }

    let entries = store.entries().await;
    assert_eq!(entries["genre_last_updated"], timestamp(1000));
    assert_eq!(entries["genre_last_uuid"], uuid(G1).to_string());
}

#[tokio::test]
async fn fan_out_returns_each_root_once_in_change_order() {
    let source = MemorySource::new();
    source.upsert_genre(genre(G1, "Drama", 10)).await;
    source.upsert_film(film(F1, "Alpha", 300)).await;
    source.upsert_film(film(F2, "Beta", 100)).await;
    source.upsert_film(film(F3, "Gamma", 100)).await;
    for film_id in [F1, F2, F2, F3, F1] {
        source.link_genre(uuid(G1), uuid(film_id)).await;
    }

    let roots = source
        .expand_to_root_ids(Table::FilmWork, Table::Genre, &[uuid(G1)])
        .await
        .unwrap();

    assert_eq!(roots, vec![uuid(F2), uuid(F3), uuid(F1)]);
}

#[tokio::test]
async fn unknown_role_skips_person_but_keeps_film() {
    let source = seed_catalog().await;
    source.upsert_person(person(203, "Pat Producer", 70)).await;
    source.link_person(uuid(203), uuid(F1), Some("producer")).await;

    let destination = MemoryDestination::with_indexes(["movies"]);
    let pipeline = build_pipeline(
        aggregate(AggregateKind::Film, &[Table::FilmWork]),
        100,
        &source,
        MemoryCheckpointStore::new(),
        &destination,
    );

    let (_tx, rx) = create_shutdown_channel();
    pipeline.run_once(&rx).await;

    let alpha = destination.document("movies", uuid(F1)).await.unwrap();
    assert_eq!(alpha["title"], "Alpha");
    assert_eq!(alpha["genre"][0]["id"], serde_json::json!(uuid(G1)));
    assert_eq!(alpha["actors_names"], serde_json::json!(["Ann Actor"]));
    assert_eq!(alpha["writers_names"], serde_json::json!(["Wes Writer"]));
    assert_eq!(alpha["directors_names"], serde_json::json!([]));
    assert!(!alpha.to_string().contains("Pat Producer"));
}

#[tokio::test]
async fn person_aggregate_lists_films_with_roles() {
    let source = seed_catalog().await;
    let destination = MemoryDestination::with_indexes(["persons"]);
    let pipeline = build_pipeline(
        aggregate(AggregateKind::Person, &[Table::FilmWork, Table::Person]),
        100,
        &source,
        MemoryCheckpointStore::new(),
        &destination,
    );

    let (_tx, rx) = create_shutdown_channel();
    let report = pipeline.run_once(&rx).await;
    assert_eq!(report.failed_tables().count(), 0);

    let ann = destination.document("persons", uuid(P1)).await.unwrap();
    assert_eq!(
        ann,
        serde_json::json!({
            "id": uuid(P1),
            "full_name": "Ann Actor",
            "films": [
                { "id": uuid(F1), "roles": ["actor"] },
                { "id": uuid(F2), "roles": ["actor"] },
            ],
        })
    );

    let wes = destination.document("persons", uuid(P2)).await.unwrap();
    assert_eq!(wes["films"], serde_json::json!([{ "id": uuid(F1), "roles": ["writer"] }]));
}

#[tokio::test]
async fn crash_before_checkpoint_replays_batch_with_identical_result() {
    init_test_tracing();

    let source = seed_catalog().await;
    let store = FailingCheckpointStore::wrap(MemoryCheckpointStore::new());
    let destination = MemoryDestination::with_indexes(["movies"]);
    let pipeline = build_pipeline(
        aggregate(AggregateKind::Film, &[Table::FilmWork]),
        100,
        &source,
        store.clone(),
        &destination,
    );

    store
        .fail_next_writes(ErrorKind::CheckpointStoreFailed, 1)
        .await;

    let (_tx, rx) = create_shutdown_channel();
    let report = pipeline.run_once(&rx).await;

    let error = report.tables[0].error.as_ref().unwrap();
    assert_eq!(error.kind(), ErrorKind::CheckpointStoreFailed);
    assert!(store.inner().entries().await.is_empty());

    let written_before_crash = destination.documents("movies").await;
    assert_eq!(written_before_crash.len(), 3);

    let report = pipeline.run_once(&rx).await;

    assert!(report.tables[0].error.is_none());
    assert_eq!(report.tables[0].batches, 1);
    assert_eq!(destination.documents("movies").await, written_before_crash);
    assert_eq!(
        store.inner().entries().await["film_work_last_uuid"],
        uuid(F3).to_string()
    );
}

#[tokio::test]
async fn rebuilding_documents_is_byte_identical() {
    let source = seed_catalog().await;
    let destination = MemoryDestination::with_indexes(["movies"]);
    let (_tx, rx) = create_shutdown_channel();

    build_pipeline(
        aggregate(AggregateKind::Film, &all_film_tables()),
        1,
        &source,
        MemoryCheckpointStore::new(),
        &destination,
    )
    .run_once(&rx)
    .await;
    let first = destination.documents("movies").await;
    let calls = destination.upsert_calls().await;

    build_pipeline(
        aggregate(AggregateKind::Film, &all_film_tables()),
        100,
        &source,
        MemoryCheckpointStore::new(),
        &destination,
    )
    .run_once(&rx)
    .await;

    assert!(destination.upsert_calls().await > calls);
    assert_eq!(destination.documents("movies").await, first);
}

#[tokio::test]
async fn failing_table_does_not_block_other_tables() {
    init_test_tracing();

    let source = seed_catalog().await;
    source
        .break_table(Table::Genre, ErrorKind::SourceQueryFailed)
        .await;

    let store = MemoryCheckpointStore::new();
    let destination = MemoryDestination::with_indexes(["movies"]);
    let pipeline = build_pipeline(
        aggregate(AggregateKind::Film, &all_film_tables()),
        100,
        &source,
        store.clone(),
        &destination,
    );

    let (_tx, rx) = create_shutdown_channel();
    let report = pipeline.run_once(&rx).await;

    let failed: Vec<Table> = report.failed_tables().map(|t| t.table).collect();
    assert_eq!(failed, vec![Table::Genre]);

    let entries = store.entries().await;
    assert!(entries.contains_key("film_work_last_updated"));
    assert!(entries.contains_key("person_last_updated"));
    assert!(!entries.contains_key("genre_last_updated"));
    assert!(!entries.contains_key("genre_last_uuid"));

    source.repair_table(Table::Genre).await;
    let report = pipeline.run_once(&rx).await;

    assert_eq!(report.failed_tables().count(), 0);
    assert_eq!(report.tables[0].batches, 0);
    assert_eq!(report.tables[1].batches, 1);
    assert_eq!(store.entries().await["genre_last_uuid"], uuid(G2).to_string());
}

#[tokio::test]
async fn missing_index_fails_without_retry() {
    let source = seed_catalog().await;
    let store = MemoryCheckpointStore::new();
    let destination = MemoryDestination::new();
    let pipeline = build_pipeline(
        aggregate(AggregateKind::Film, &[Table::FilmWork]),
        100,
        &source,
        store.clone(),
        &destination,
    );

    let (_tx, rx) = create_shutdown_channel();
    let report = pipeline.run_once(&rx).await;

    let error = report.tables[0].error.as_ref().unwrap();
    assert_eq!(error.kind(), ErrorKind::DestinationIndexMissing);
    assert_eq!(destination.upsert_calls().await, 1);
    assert!(store.entries().await.is_empty());
}

#[tokio::test(start_paused = true)]
async fn transient_failures_are_retried() {
    let source = seed_catalog().await;
    let destination = MemoryDestination::with_indexes(["movies"]);
    let pipeline = build_pipeline(
        aggregate(AggregateKind::Film, &[Table::FilmWork]),
        100,
        &source,
        MemoryCheckpointStore::new(),
        &destination,
    );

    source
        .fail_next_calls(ErrorKind::SourceConnectionFailed, 2)
        .await;
    destination
        .fail_next_upserts(ErrorKind::DestinationThrottled, 1)
        .await;

    let (_tx, rx) = create_shutdown_channel();
    let report = pipeline.run_once(&rx).await;

    assert!(report.tables[0].error.is_none());
    assert_eq!(report.tables[0].documents, 3);
    assert_eq!(destination.upsert_calls().await, 2);
}

#[tokio::test]
async fn batches_advance_strictly_and_terminate() {
    let source = seed_catalog().await;
    source.upsert_film(film(5, "Epsilon", 300)).await;
    source.upsert_film(film(4, "Delta", 300)).await;

    let oldest = source.oldest_modified(Table::FilmWork).await.unwrap().unwrap();
    let mut cursor = ChangeCursor::starting_at(oldest);
    let mut seen = Vec::new();

    loop {
        let batch = source
            .next_changed_batch(Table::FilmWork, &cursor, 1)
            .await
            .unwrap();
        if batch.is_empty() {
            assert_eq!(batch.cursor, cursor);
            break;
        }

        assert!(batch.cursor > cursor);
        seen.extend(batch.ids.iter().copied());
        cursor = batch.cursor;
    }

    assert_eq!(seen, vec![uuid(F1), uuid(F2), uuid(F3), uuid(4), uuid(5)]);
    assert_eq!(cursor, ChangeCursor::new(ts(300), uuid(5)));

    let again = source
        .next_changed_batch(Table::FilmWork, &cursor, 100)
        .await
        .unwrap();
    assert!(again.is_empty());
}

#[tokio::test]
async fn shutdown_before_run_skips_every_table() {
    let source = seed_catalog().await;
    let destination = MemoryDestination::with_indexes(["movies"]);
    let pipeline = build_pipeline(
        aggregate(AggregateKind::Film, &all_film_tables()),
        100,
        &source,
        MemoryCheckpointStore::new(),
        &destination,
    );

    let (tx, rx) = create_shutdown_channel();
    tx.shutdown();

    let report = pipeline.run_once(&rx).await;

    assert!(report.tables.is_empty());
    assert_eq!(destination.upsert_calls().await, 0);
    assert_eq!(source.calls().await, 0);
}

#[tokio::test]
async fn empty_tables_are_skipped() {
    let source = MemorySource::new();
    let store = MemoryCheckpointStore::new();
    let destination = MemoryDestination::with_indexes(["genres"]);
    let pipeline = build_pipeline(
        aggregate(AggregateKind::Genre, &[Table::FilmWork, Table::Genre]),
        100,
        &source,
        store.clone(),
        &destination,
    );

    let (_tx, rx) = create_shutdown_channel();
    let report = pipeline.run_once(&rx).await;

    assert_eq!(report.tables.len(), 2);
    assert_eq!(report.failed_tables().count(), 0);
    assert!(store.entries().await.is_empty());
    assert_eq!(destination.upsert_calls().await, 0);
}

#[tokio::test]
async fn rejected_documents_do_not_hold_back_the_checkpoint() {
    init_test_tracing();

    let source = seed_catalog().await;
    let store = MemoryCheckpointStore::new();
    let destination = MemoryDestination::with_indexes(["movies"]);
    destination
        .reject_document(uuid(F2), "mapper_parsing_exception")
        .await;
    let pipeline = build_pipeline(
        aggregate(AggregateKind::Film, &[Table::FilmWork]),
        100,
        &source,
        store.clone(),
        &destination,
    );

    let (_tx, rx) = create_shutdown_channel();
    let report = pipeline.run_once(&rx).await;

    let table = &report.tables[0];
    assert!(table.error.is_none());
    assert_eq!(table.batches, 1);
    assert_eq!(table.documents, 2);
    assert_eq!(table.failed_documents, 1);

    let movies = destination.documents("movies").await;
    assert_eq!(
        movies.keys().copied().collect::<Vec<_>>(),
        vec![uuid(F1), uuid(F3)]
    );

    let entries = store.entries().await;
    assert_eq!(entries["film_work_last_updated"], timestamp(300));
    assert_eq!(entries["film_work_last_uuid"], uuid(F3).to_string());

    // The rejected film is not replayed until it changes again.
    let calls = destination.upsert_calls().await;
    let report = pipeline.run_once(&rx).await;
    assert_eq!(report.tables[0].batches, 0);
    assert_eq!(destination.upsert_calls().await, calls);
}
