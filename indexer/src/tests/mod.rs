//! End-to-end scenarios over the in-memory source, checkpoint store and index.

mod driver;
mod pipeline;

use indexer_config::shared::RetryConfig;

use crate::destination::memory::MemoryDestination;
use crate::pipeline::AggregatePipeline;
use crate::retry::RetryPolicy;
use crate::store::base::CheckpointStore;
use crate::test_utils::fixtures::{film, genre, person, uuid};
use crate::test_utils::memory_source::MemorySource;
use crate::types::{AggregateConfig, AggregateKind, Table};

pub(crate) const F1: u128 = 1;
pub(crate) const F2: u128 = 2;
pub(crate) const F3: u128 = 3;
pub(crate) const G1: u128 = 101;
pub(crate) const G2: u128 = 102;
pub(crate) const P1: u128 = 201;
pub(crate) const P2: u128 = 202;

/// Three films, two genres and two people.
///
/// `g1` tags `f1` and `f2`, `g2` tags `f3`. `p1` acts in `f1` and `f2`, `p2` wrote `f1`.
pub(crate) async fn seed_catalog() -> MemorySource {
    let source = MemorySource::new();

    source.upsert_genre(genre(G1, "Drama", 10)).await;
    source.upsert_genre(genre(G2, "Comedy", 20)).await;
    source.upsert_person(person(P1, "Ann Actor", 50)).await;
    source.upsert_person(person(P2, "Wes Writer", 60)).await;
    source.upsert_film(film(F1, "Alpha", 100)).await;
    source.upsert_film(film(F2, "Beta", 200)).await;
    source.upsert_film(film(F3, "Gamma", 300)).await;

    source.link_genre(uuid(G1), uuid(F1)).await;
    source.link_genre(uuid(G1), uuid(F2)).await;
    source.link_genre(uuid(G2), uuid(F3)).await;
    source.link_person(uuid(P1), uuid(F1), Some("actor")).await;
    source.link_person(uuid(P1), uuid(F2), Some("actor")).await;
    source.link_person(uuid(P2), uuid(F1), Some("writer")).await;

    source
}

pub(crate) fn aggregate(kind: AggregateKind, tables: &[Table]) -> AggregateConfig {
    AggregateConfig {
        tables: tables.to_vec(),
        ..AggregateConfig::for_kind(kind)
    }
}

/// Retries transient failures for up to ten seconds with short delays.
pub(crate) fn fast_retry() -> RetryPolicy {
    RetryPolicy::new(RetryConfig {
        initial_delay_ms: 10,
        max_delay_ms: 100,
        backoff_multiplier: 2.0,
        max_elapsed_ms: 10_000,
        jitter_ratio: 0.0,
    })
}

pub(crate) fn build_pipeline<C>(
    config: AggregateConfig,
    batch_size: usize,
    source: &MemorySource,
    checkpoints: C,
    destination: &MemoryDestination,
) -> AggregatePipeline<MemorySource, C, MemoryDestination>
where
    C: CheckpointStore,
{
    AggregatePipeline::new(
        config,
        batch_size,
        source.clone(),
        checkpoints,
        destination.clone(),
        fast_retry(),
    )
}
