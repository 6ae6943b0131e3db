use std::collections::HashSet;

use crate::types::{GenreDocument, GenreRow};

/// Builds one document per genre; repeated ids keep the first row.
pub fn consolidate_genres(rows: &[GenreRow]) -> Vec<GenreDocument> {
    let mut seen = HashSet::new();

    rows.iter()
        .filter(|row| seen.insert(row.id))
        .map(|row| GenreDocument {
            id: row.id,
            name: row.name.clone(),
            description: row.description.clone(),
        })
        .collect()
}
