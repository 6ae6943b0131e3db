//! Throwaway Postgres databases holding a `content` schema.
//!
//! Connection settings come from the environment:
//! - `TESTS_DATABASE_HOST`: Postgres server hostname. Tests are skipped when unset.
//! - `TESTS_DATABASE_PORT`: Postgres server port, defaults to `5432`.
//! - `TESTS_DATABASE_USERNAME`: Database user, defaults to `postgres`.
//! - `TESTS_DATABASE_PASSWORD`: Database password (optional).

use chrono::{DateTime, Utc};
use indexer_config::shared::{IntoConnectOptions, PgConnectionConfig, TlsConfig};
use secrecy::SecretString;
use sqlx::postgres::PgPoolOptions;
use sqlx::{Connection, Executor, PgConnection, PgPool};
use uuid::Uuid;

use crate::source::postgres::PostgresSource;
use crate::store::postgres::PostgresCheckpointStore;
use crate::test_utils::memory_source::{FilmRecord, GenreRecord, PersonRecord};
use crate::types::Table;

/// Schema the content tables are created in.
pub const TEST_CONTENT_SCHEMA: &str = "content";

const CONTENT_DDL: &str = r#"
    create schema content;

    create table content.film_work (
        id uuid primary key,
        title text not null,
        description text,
        rating double precision,
        type text not null default 'movie',
        created timestamptz not null default now(),
        modified timestamptz not null
    );

    create table content.genre (
        id uuid primary key,
        name text not null,
        description text,
        created timestamptz not null default now(),
        modified timestamptz not null
    );

    create table content.person (
        id uuid primary key,
        full_name text not null,
        created timestamptz not null default now(),
        modified timestamptz not null
    );

    create table content.genre_film_work (
        id uuid primary key default gen_random_uuid(),
        genre_id uuid not null references content.genre (id),
        film_work_id uuid not null references content.film_work (id),
        created timestamptz not null default now()
    );

    create table content.person_film_work (
        id uuid primary key default gen_random_uuid(),
        person_id uuid not null references content.person (id),
        film_work_id uuid not null references content.film_work (id),
        role text,
        created timestamptz not null default now()
    );
"#;

/// Generates connection settings for a uniquely named database, or [`None`] when no test
/// server is configured.
fn local_pg_connection_config() -> Option<PgConnectionConfig> {
    let host = std::env::var("TESTS_DATABASE_HOST").ok()?;

    Some(PgConnectionConfig {
        host,
        port: std::env::var("TESTS_DATABASE_PORT")
            .ok()
            .map(|port| {
                port.parse()
                    .expect("TESTS_DATABASE_PORT must be a valid port number")
            })
            .unwrap_or(5432),
        name: Uuid::new_v4().to_string(),
        username: std::env::var("TESTS_DATABASE_USERNAME")
            .unwrap_or_else(|_| "postgres".to_string()),
        password: std::env::var("TESTS_DATABASE_PASSWORD")
            .ok()
            .map(SecretString::new),
        schema: TEST_CONTENT_SCHEMA.to_string(),
        tls: TlsConfig::default(),
    })
}

/// A freshly created database with empty content tables.
///
/// The database is dropped together with this value. Dropping blocks on the current
/// runtime, so tests using it must run on the multi-threaded flavor.
pub struct TestDatabase {
    config: PgConnectionConfig,
    pool: PgPool,
}

/// Creates a database with the content schema.
///
/// Returns [`None`] when `TESTS_DATABASE_HOST` is not set.
///
/// # Panics
///
/// Panics if the database or its tables cannot be created.
pub async fn spawn_content_database() -> Option<TestDatabase> {
    let config = local_pg_connection_config()?;

    let mut connection = PgConnection::connect_with(&config.without_db())
        .await
        .expect("Failed to connect to Postgres");
    connection
        .execute(&*format!(r#"create database "{}";"#, config.name))
        .await
        .expect("Failed to create database");
    connection
        .close()
        .await
        .expect("Failed to close setup connection");

    let pool = PgPool::connect_with(config.with_db())
        .await
        .expect("Failed to connect to test database");
    pool.execute(CONTENT_DDL)
        .await
        .expect("Failed to create content tables");

    Some(TestDatabase { config, pool })
}

impl TestDatabase {
    pub fn config(&self) -> &PgConnectionConfig {
        &self.config
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Source reading the content schema through its own single-connection pool.
    pub async fn source(&self) -> PostgresSource {
        PostgresSource::connect(&self.config)
            .await
            .expect("Failed to connect source")
    }

    /// Runs the checkpoint migrations and returns a store for `scope`.
    pub async fn checkpoint_store(&self, scope: &str) -> PostgresCheckpointStore {
        let migrations_pool = PgPoolOptions::new()
            .max_connections(1)
            .after_connect(|conn, _meta| {
                Box::pin(async move {
                    conn.execute("create schema if not exists indexer;").await?;
                    conn.execute("set search_path = 'indexer';").await?;

                    Ok(())
                })
            })
            .connect_with(self.config.with_db())
            .await
            .expect("Failed to connect for migrations");

        sqlx::migrate!("../indexer-service/migrations")
            .run(&migrations_pool)
            .await
            .expect("Failed to run checkpoint migrations");
        migrations_pool.close().await;

        PostgresCheckpointStore::new(self.pool.clone(), scope)
    }

    pub async fn insert_film(&self, film: &FilmRecord) {
        sqlx::query(
            r#"
            insert into content.film_work (id, title, description, rating, modified)
            values ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(film.id)
        .bind(&film.title)
        .bind(&film.description)
        .bind(film.rating)
        .bind(film.modified)
        .execute(&self.pool)
        .await
        .expect("Failed to insert film");
    }

    pub async fn insert_genre(&self, genre: &GenreRecord) {
        sqlx::query(
            r#"
            insert into content.genre (id, name, description, modified)
            values ($1, $2, $3, $4)
            "#,
        )
        .bind(genre.id)
        .bind(&genre.name)
        .bind(&genre.description)
        .bind(genre.modified)
        .execute(&self.pool)
        .await
        .expect("Failed to insert genre");
    }

    pub async fn insert_person(&self, person: &PersonRecord) {
        sqlx::query(
            r#"
            insert into content.person (id, full_name, modified)
            values ($1, $2, $3)
            "#,
        )
        .bind(person.id)
        .bind(&person.full_name)
        .bind(person.modified)
        .execute(&self.pool)
        .await
        .expect("Failed to insert person");
    }

    /// Adds a `genre_film_work` row. Repeated calls add duplicate links.
    pub async fn link_genre(&self, genre_id: Uuid, film_id: Uuid) {
        sqlx::query("insert into content.genre_film_work (genre_id, film_work_id) values ($1, $2)")
            .bind(genre_id)
            .bind(film_id)
            .execute(&self.pool)
            .await
            .expect("Failed to link genre");
    }

    pub async fn link_person(&self, person_id: Uuid, film_id: Uuid, role: Option<&str>) {
        sqlx::query(
            r#"
            insert into content.person_film_work (person_id, film_work_id, role)
            values ($1, $2, $3)
            "#,
        )
        .bind(person_id)
        .bind(film_id)
        .bind(role)
        .execute(&self.pool)
        .await
        .expect("Failed to link person");
    }

    /// Sets `modified` of one row of `table`.
    pub async fn touch(&self, table: Table, id: Uuid, modified: DateTime<Utc>) {
        sqlx::query(&format!(
            "update {TEST_CONTENT_SCHEMA}.{table} set modified = $1 where id = $2"
        ))
        .bind(modified)
        .bind(id)
        .execute(&self.pool)
        .await
        .expect("Failed to touch row");
    }
}

/// Drops a database after terminating its remaining connections.
///
/// Cleanup errors are printed and otherwise ignored.
async fn drop_pg_database(config: &PgConnectionConfig) {
    let mut connection = match PgConnection::connect_with(&config.without_db()).await {
        Ok(connection) => connection,
        Err(err) => {
            eprintln!("warning: failed to connect to Postgres for cleanup: {err}");
            return;
        }
    };

    if let Err(err) = connection
        .execute(&*format!(
            r#"
            select pg_terminate_backend(pg_stat_activity.pid)
            from pg_stat_activity
            where pg_stat_activity.datname = '{}'
            and pid <> pg_backend_pid();"#,
            config.name
        ))
        .await
    {
        eprintln!(
            "warning: failed to terminate connections for database {}: {err}",
            config.name
        );
    }

    if let Err(err) = connection
        .execute(&*format!(r#"drop database if exists "{}";"#, config.name))
        .await
    {
        eprintln!("warning: failed to drop database {}: {err}", config.name);
    }
}

impl Drop for TestDatabase {
    fn drop(&mut self) {
        let pool = self.pool.clone();
        let config = self.config.clone();

        tokio::task::block_in_place(move || {
            tokio::runtime::Handle::current().block_on(async move {
                pool.close().await;
                drop_pg_database(&config).await;
            });
        });
    }
}
