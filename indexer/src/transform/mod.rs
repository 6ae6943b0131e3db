//! Consolidation of flattened join rows into aggregate documents.
//!
//! Every function here is pure: the same rows always produce the same documents, in
//! the order their root ids first appear.

mod film;
mod genre;
mod person;

pub use film::consolidate_films;
pub use genre::consolidate_genres;
pub use person::consolidate_persons;

use crate::types::{AggregateDocument, RootRows};

/// Builds the aggregate documents described by `rows`.
pub fn consolidate(rows: &RootRows) -> Vec<AggregateDocument> {
    match rows {
        RootRows::Film(rows) => consolidate_films(rows)
            .into_iter()
            .map(AggregateDocument::Film)
            .collect(),
        RootRows::Genre(rows) => consolidate_genres(rows)
            .into_iter()
            .map(AggregateDocument::Genre)
            .collect(),
        RootRows::Person(rows) => consolidate_persons(rows)
            .into_iter()
            .map(AggregateDocument::Person)
            .collect(),
    }
}
