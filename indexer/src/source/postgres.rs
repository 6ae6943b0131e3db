use chrono::{DateTime, Utc};
use indexer_config::shared::{IntoConnectOptions, PgConnectionConfig};
use pg_escape::quote_identifier;
use sqlx::PgPool;
use sqlx::postgres::{PgConnectOptions, PgPoolOptions};
use tracing::{debug, info};
use uuid::Uuid;

use crate::bail;
use crate::error::{ErrorKind, EtlResult};
use crate::source::base::{ChangeExtractor, RowFetcher};
use crate::types::{
    AggregateKind, ChangeCursor, ChangedBatch, FilmRow, GenreRow, PersonRow, RootRows, Table,
};

/// All queries run sequentially, so a single connection is enough.
const NUM_POOL_CONNECTIONS: u32 = 1;

/// Change extractor and row fetcher reading the content schema through sqlx.
#[derive(Debug, Clone)]
pub struct PostgresSource {
    pool: PgPool,
    schema: String,
}

impl PostgresSource {
    pub fn new(pool: PgPool, schema: impl Into<String>) -> Self {
        Self {
            pool,
            schema: schema.into(),
        }
    }

    /// Opens the connection pool described by `config`.
    pub async fn connect(config: &PgConnectionConfig) -> EtlResult<Self> {
        let options: PgConnectOptions = config.with_db();
        let pool = PgPoolOptions::new()
            .max_connections(NUM_POOL_CONNECTIONS)
            .min_connections(NUM_POOL_CONNECTIONS)
            .connect_with(options)
            .await?;

        info!(
            host = %config.host,
            dbname = %config.name,
            schema = %config.schema,
            "connected to source database"
        );

        Ok(Self::new(pool, config.schema.clone()))
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Schema-qualified, quoted name of `relation`.
    fn qualified(&self, relation: &str) -> String {
        format!(
            "{}.{}",
            quote_identifier(&self.schema),
            quote_identifier(relation)
        )
    }

    async fn fetch_film_rows(&self, ids: &[Uuid]) -> EtlResult<Vec<FilmRow>> {
        let query = format!(
            r#"
            select
                fw.id as film_id,
                fw.title,
                fw.description,
                fw.rating::float8 as rating,
                pfw.role,
                p.id as person_id,
                p.full_name as person_name,
                g.id as genre_id,
                g.name as genre_name
            from {film_work} fw
            left join {person_film_work} pfw on pfw.film_work_id = fw.id
            left join {person} p on p.id = pfw.person_id
            left join {genre_film_work} gfw on gfw.film_work_id = fw.id
            left join {genre} g on g.id = gfw.genre_id
            where fw.id = any($1)
            order by fw.modified, fw.id, p.full_name, p.id, pfw.role, g.name, g.id
            "#,
            film_work = self.qualified("film_work"),
            person_film_work = self.qualified("person_film_work"),
            person = self.qualified("person"),
            genre_film_work = self.qualified("genre_film_work"),
            genre = self.qualified("genre"),
        );

        Ok(sqlx::query_as::<_, FilmRow>(&query)
            .bind(ids)
            .fetch_all(&self.pool)
            .await?)
    }

    async fn fetch_genre_rows(&self, ids: &[Uuid]) -> EtlResult<Vec<GenreRow>> {
        let query = format!(
            r#"
            select g.id, g.name, g.description
            from {genre} g
            where g.id = any($1)
            order by g.modified, g.id
            "#,
            genre = self.qualified("genre"),
        );

        Ok(sqlx::query_as::<_, GenreRow>(&query)
            .bind(ids)
            .fetch_all(&self.pool)
            .await?)
    }

    async fn fetch_person_rows(&self, ids: &[Uuid]) -> EtlResult<Vec<PersonRow>> {
        let query = format!(
            r#"
            select
                p.id as person_id,
                p.full_name,
                pfw.role,
                pfw.film_work_id as film_id
            from {person} p
            left join {person_film_work} pfw on pfw.person_id = p.id
            where p.id = any($1)
            order by p.modified, p.id, pfw.film_work_id, pfw.role
            "#,
            person = self.qualified("person"),
            person_film_work = self.qualified("person_film_work"),
        );

        Ok(sqlx::query_as::<_, PersonRow>(&query)
            .bind(ids)
            .fetch_all(&self.pool)
            .await?)
    }
}

impl ChangeExtractor for PostgresSource {
    async fn oldest_modified(&self, table: Table) -> EtlResult<Option<DateTime<Utc>>> {
        let query = format!(
            "select min(modified) from {}",
            self.qualified(table.as_str())
        );

        let oldest: Option<DateTime<Utc>> = sqlx::query_scalar(&query)
            .fetch_one(&self.pool)
            .await?;

        Ok(oldest)
    }

    async fn next_changed_batch(
        &self,
        table: Table,
        cursor: &ChangeCursor,
        limit: usize,
    ) -> EtlResult<ChangedBatch> {
        let query = format!(
            r#"
            select id, modified
            from {}
            where (modified = $1 and id > $2) or modified > $1
            order by modified, id
            limit $3
            "#,
            self.qualified(table.as_str())
        );

        let rows: Vec<(Uuid, DateTime<Utc>)> = sqlx::query_as(&query)
            .bind(cursor.modified)
            .bind(cursor.id)
            .bind(i64::try_from(limit).unwrap_or(i64::MAX))
            .fetch_all(&self.pool)
            .await?;

        debug!(%table, %cursor, count = rows.len(), "extracted changed rows");

        Ok(ChangedBatch::from_rows(rows, *cursor))
    }

    async fn expand_to_root_ids(
        &self,
        root: Table,
        changed_table: Table,
        changed_ids: &[Uuid],
    ) -> EtlResult<Vec<Uuid>> {
        if changed_ids.is_empty() {
            return Ok(Vec::new());
        }

        let Some(link_table) = root.link_table(changed_table) else {
            bail!(
                ErrorKind::ConfigError,
                "Changed table is not linked to the aggregate root",
                format!("root: {root}, changed table: {changed_table}")
            );
        };

        let query = format!(
            r#"
            select distinct r.id, r.modified
            from {root_table} r
            join {link_table} l on l.{root_column} = r.id
            where l.{changed_column} = any($1)
            order by r.modified, r.id
            "#,
            root_table = self.qualified(root.as_str()),
            link_table = self.qualified(link_table),
            root_column = quote_identifier(root.link_column()),
            changed_column = quote_identifier(changed_table.link_column()),
        );

        let rows: Vec<(Uuid, DateTime<Utc>)> = sqlx::query_as(&query)
            .bind(changed_ids)
            .fetch_all(&self.pool)
            .await?;

        Ok(rows.into_iter().map(|(id, _)| id).collect())
    }
}

impl RowFetcher for PostgresSource {
    async fn fetch_root_rows(&self, kind: AggregateKind, root_ids: &[Uuid]) -> EtlResult<RootRows> {
        if root_ids.is_empty() {
            return Ok(match kind {
                AggregateKind::Film => RootRows::Film(Vec::new()),
                AggregateKind::Genre => RootRows::Genre(Vec::new()),
                AggregateKind::Person => RootRows::Person(Vec::new()),
            });
        }

        let rows = match kind {
            AggregateKind::Film => RootRows::Film(self.fetch_film_rows(root_ids).await?),
            AggregateKind::Genre => RootRows::Genre(self.fetch_genre_rows(root_ids).await?),
            AggregateKind::Person => RootRows::Person(self.fetch_person_rows(root_ids).await?),
        };

        debug!(aggregate = %kind, ids = root_ids.len(), rows = rows.len(), "fetched aggregate rows");

        Ok(rows)
    }
}
