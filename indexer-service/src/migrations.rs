use indexer_config::shared::{IntoConnectOptions, PgConnectionConfig};
use sqlx::postgres::{PgConnectOptions, PgPoolOptions};
use sqlx::{Executor, PgPool};
use tracing::info;

const NUM_POOL_CONNECTIONS: u32 = 1;

/// Creates the `indexer` schema and applies pending checkpoint migrations.
///
/// Returns the pool used for the migrations so that the checkpoint store can reuse it.
pub async fn apply_indexer_migrations(config: &PgConnectionConfig) -> Result<PgPool, sqlx::Error> {
    let options: PgConnectOptions = config.with_db();

    let pool = PgPoolOptions::new()
        .max_connections(NUM_POOL_CONNECTIONS)
        .min_connections(NUM_POOL_CONNECTIONS)
        .after_connect(|conn, _meta| {
            Box::pin(async move {
                conn.execute("create schema if not exists indexer;").await?;

                // Keeps the `_sqlx_migrations` table out of the content schema.
                conn.execute("set search_path = 'indexer';").await?;

                Ok(())
            })
        })
        .connect_with(options)
        .await?;

    info!("applying indexer migrations");

    let migrator = sqlx::migrate!("./migrations");
    migrator.run(&pool).await?;

    info!("indexer migrations successfully applied");

    Ok(pool)
}
