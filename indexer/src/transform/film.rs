use std::collections::HashMap;

use tracing::warn;
use uuid::Uuid;

use crate::types::{FilmDocument, FilmRow, NamedRef, PersonRole};

/// Film documents are built incrementally, one joined row at a time.
struct FilmBuilder {
    document: FilmDocument,
}

impl FilmBuilder {
    fn new(row: &FilmRow) -> Self {
        Self {
            document: FilmDocument {
                id: row.film_id,
                title: row.title.clone(),
                description: row.description.clone(),
                imdb_rating: row.rating.unwrap_or(0.0),
                genre: Vec::new(),
                actors: Vec::new(),
                writers: Vec::new(),
                directors: Vec::new(),
                actors_names: Vec::new(),
                writers_names: Vec::new(),
                directors_names: Vec::new(),
            },
        }
    }

    fn absorb(&mut self, row: &FilmRow) {
        if let (Some(id), Some(name)) = (row.genre_id, row.genre_name.as_ref()) {
            push_unique(&mut self.document.genre, None, id, name);
        }

        let (Some(person_id), Some(person_name)) = (row.person_id, row.person_name.as_ref())
        else {
            return;
        };

        let Some(role) = row.role.as_deref() else {
            return;
        };

        let role = match role.parse::<PersonRole>() {
            Ok(role) => role,
            Err(_) => {
                warn!(
                    film_id = %row.film_id,
                    %person_id,
                    role,
                    "unrecognized person role, skipping person"
                );
                return;
            }
        };

        let document = &mut self.document;
        let (people, names) = match role {
            PersonRole::Actor => (&mut document.actors, &mut document.actors_names),
            PersonRole::Writer => (&mut document.writers, &mut document.writers_names),
            PersonRole::Director => (&mut document.directors, &mut document.directors_names),
        };
        push_unique(people, Some(names), person_id, person_name);
    }
}

/// Appends `(id, name)` unless `id` is already present in `refs`.
fn push_unique(refs: &mut Vec<NamedRef>, names: Option<&mut Vec<String>>, id: Uuid, name: &str) {
    if refs.iter().any(|existing| existing.id == id) {
        return;
    }

    refs.push(NamedRef {
        id,
        name: name.to_string(),
    });
    if let Some(names) = names {
        names.push(name.to_string());
    }
}

/// Folds joined film rows into one document per film, in first-seen order.
pub fn consolidate_films(rows: &[FilmRow]) -> Vec<FilmDocument> {
    let mut positions: HashMap<Uuid, usize> = HashMap::new();
    let mut builders: Vec<FilmBuilder> = Vec::new();

    for row in rows {
        let position = *positions.entry(row.film_id).or_insert_with(|| {
            builders.push(FilmBuilder::new(row));
            builders.len() - 1
        });
        builders[position].absorb(row);
    }

    builders.into_iter().map(|builder| builder.document).collect()
}
