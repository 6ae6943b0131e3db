//! Core data types: cursors, fetched rows and index documents.

mod cursor;
mod documents;
mod rows;

pub use cursor::{ChangeCursor, ChangedBatch};
pub use documents::{
    AggregateDocument, FilmDocument, GenreDocument, NamedRef, PersonDocument, PersonFilm,
    PersonRole, UnknownRole,
};
pub use indexer_config::shared::{AggregateConfig, AggregateKind, Table};
pub use rows::{FilmRow, GenreRow, PersonRow, RootRows};
