//! Builders for source records with readable ids and timestamps.

use chrono::{DateTime, TimeZone, Utc};
use uuid::Uuid;

use crate::test_utils::memory_source::{FilmRecord, GenreRecord, PersonRecord};

/// Timestamp `secs` seconds after the Unix epoch.
pub fn ts(secs: i64) -> DateTime<Utc> {
    Utc.timestamp_opt(secs, 0)
        .single()
        .unwrap_or(DateTime::<Utc>::UNIX_EPOCH)
}

/// Deterministic id; `uuid(1) < uuid(2)`.
pub fn uuid(n: u128) -> Uuid {
    Uuid::from_u128(n)
}

pub fn film(id: u128, title: &str, modified: i64) -> FilmRecord {
    FilmRecord {
        id: uuid(id),
        title: title.to_string(),
        description: Some(format!("About {title}")),
        rating: Some(7.0),
        modified: ts(modified),
    }
}

pub fn genre(id: u128, name: &str, modified: i64) -> GenreRecord {
    GenreRecord {
        id: uuid(id),
        name: name.to_string(),
        description: None,
        modified: ts(modified),
    }
}

pub fn person(id: u128, full_name: &str, modified: i64) -> PersonRecord {
    PersonRecord {
        id: uuid(id),
        full_name: full_name.to_string(),
        modified: ts(modified),
    }
}
