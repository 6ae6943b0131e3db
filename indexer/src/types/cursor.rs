use std::fmt;

use chrono::{DateTime, Utc};
use uuid::Uuid;

/// Position in the change order of a table.
///
/// Cursors order by `modified` first and break ties by `id`, matching the
/// `order by modified, id` used to extract changed rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ChangeCursor {
    pub modified: DateTime<Utc>,
    pub id: Uuid,
}

impl ChangeCursor {
    pub fn new(modified: DateTime<Utc>, id: Uuid) -> Self {
        Self { modified, id }
    }

    /// Cursor preceding every row whose `modified` is at least `oldest`.
    ///
    /// Uses the nil UUID, which sorts before every generated id.
    pub fn starting_at(oldest: DateTime<Utc>) -> Self {
        Self {
            modified: oldest,
            id: Uuid::nil(),
        }
    }

    /// Returns `true` if a row at `(modified, id)` comes strictly after this cursor.
    pub fn precedes(&self, modified: DateTime<Utc>, id: Uuid) -> bool {
        (modified == self.modified && id > self.id) || modified > self.modified
    }
}

impl fmt::Display for ChangeCursor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.modified.to_rfc3339(), self.id)
    }
}

/// Bounded run of changed-row ids and the cursor of its last row.
///
/// The cursor is only a candidate checkpoint until the batch has been written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangedBatch {
    pub ids: Vec<Uuid>,
    pub cursor: ChangeCursor,
}

impl ChangedBatch {
    /// Batch signalling that nothing changed after `cursor`.
    pub fn exhausted(cursor: ChangeCursor) -> Self {
        Self {
            ids: Vec::new(),
            cursor,
        }
    }

    /// Builds a batch from `(id, modified)` rows already sorted in change order.
    pub fn from_rows(rows: Vec<(Uuid, DateTime<Utc>)>, previous: ChangeCursor) -> Self {
        match rows.last() {
            Some(&(id, modified)) => Self {
                cursor: ChangeCursor::new(modified, id),
                ids: rows.into_iter().map(|(id, _)| id).collect(),
            },
            None => Self::exhausted(previous),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }
}
