use std::future::Future;

use chrono::{DateTime, SecondsFormat, Utc};
use uuid::Uuid;

use crate::error::EtlResult;
use crate::types::{ChangeCursor, Table};

/// Key-value storage for sync checkpoints of one aggregate.
///
/// Each instance is scoped to a single aggregate type; keys are unique within that
/// scope. Writes must be durable once the returned future resolves, since the sync
/// driver treats a completed write as a committed batch.
pub trait CheckpointStore {
    /// Returns the value stored under `key`, if any.
    fn get(&self, key: &str) -> impl Future<Output = EtlResult<Option<String>>> + Send;

    /// Stores `value` under `key`, replacing any previous value.
    fn set(&self, key: &str, value: String) -> impl Future<Output = EtlResult<()>> + Send;

    /// Stores every entry in a single durable write.
    ///
    /// Either all entries are persisted or none are.
    fn set_many(&self, entries: Vec<(String, String)>)
    -> impl Future<Output = EtlResult<()>> + Send;
}

/// Key holding the timestamp half of the cursor of `table`.
pub fn last_updated_key(table: Table) -> String {
    format!("{table}_last_updated")
}

/// Key holding the id half of the cursor of `table`.
pub fn last_uuid_key(table: Table) -> String {
    format!("{table}_last_uuid")
}

/// Reads the persisted cursor of `table`.
///
/// Returns [`None`] when no timestamp has been stored yet. A missing id with a stored
/// timestamp resumes from the nil UUID.
pub async fn load_cursor<S>(store: &S, table: Table) -> EtlResult<Option<ChangeCursor>>
where
    S: CheckpointStore,
{
    let Some(modified) = store.get(&last_updated_key(table)).await? else {
        return Ok(None);
    };
    let modified = DateTime::parse_from_rfc3339(&modified)?.with_timezone(&Utc);

    let id = match store.get(&last_uuid_key(table)).await? {
        Some(id) => Uuid::parse_str(&id)?,
        None => Uuid::nil(),
    };

    Ok(Some(ChangeCursor::new(modified, id)))
}

/// Persists `cursor` as the checkpoint of `table` in one write.
pub async fn store_cursor<S>(store: &S, table: Table, cursor: &ChangeCursor) -> EtlResult<()>
where
    S: CheckpointStore,
{
    store
        .set_many(vec![
            (
                last_updated_key(table),
                cursor.modified.to_rfc3339_opts(SecondsFormat::Micros, false),
            ),
            (last_uuid_key(table), cursor.id.hyphenated().to_string()),
        ])
        .await
}
