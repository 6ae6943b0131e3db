use sqlx::PgPool;
use tracing::debug;

use crate::error::EtlResult;
use crate::store::base::CheckpointStore;

/// Checkpoint store backed by the `indexer.checkpoints` table.
///
/// Rows are keyed by `(scope, key)`, where the scope is the aggregate name. The table is
/// created by the service migrations before the store is used.
#[derive(Debug, Clone)]
pub struct PostgresCheckpointStore {
    pool: PgPool,
    scope: String,
}

impl PostgresCheckpointStore {
    pub fn new(pool: PgPool, scope: impl Into<String>) -> Self {
        Self {
            pool,
            scope: scope.into(),
        }
    }
}

impl CheckpointStore for PostgresCheckpointStore {
    async fn get(&self, key: &str) -> EtlResult<Option<String>> {
        let value: Option<String> = sqlx::query_scalar(
            r#"
            select value from indexer.checkpoints
            where scope = $1 and key = $2
            "#,
        )
        .bind(&self.scope)
        .bind(key)
        .fetch_optional(&self.pool)
        .await?;

        Ok(value)
    }

    async fn set(&self, key: &str, value: String) -> EtlResult<()> {
        self.set_many(vec![(key.to_string(), value)]).await
    }

    async fn set_many(&self, entries: Vec<(String, String)>) -> EtlResult<()> {
        let mut tx = self.pool.begin().await?;

        for (key, value) in &entries {
            sqlx::query(
                r#"
                insert into indexer.checkpoints (scope, key, value, updated_at)
                values ($1, $2, $3, now())
                on conflict (scope, key)
                do update set value = excluded.value, updated_at = excluded.updated_at
                "#,
            )
            .bind(&self.scope)
            .bind(key)
            .bind(value)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        debug!(scope = %self.scope, count = entries.len(), "checkpoint entries committed");

        Ok(())
    }
}
