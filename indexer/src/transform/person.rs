use std::collections::HashMap;

use uuid::Uuid;

use crate::types::{PersonDocument, PersonFilm, PersonRow};

/// Folds person rows into one document per person.
///
/// Each film appears once per person with the ordered, distinct roles held in it. A
/// participation without a role still lists the film.
pub fn consolidate_persons(rows: &[PersonRow]) -> Vec<PersonDocument> {
    let mut positions: HashMap<Uuid, usize> = HashMap::new();
    let mut documents: Vec<PersonDocument> = Vec::new();

    for row in rows {
        let position = *positions.entry(row.person_id).or_insert_with(|| {
            documents.push(PersonDocument {
                id: row.person_id,
                full_name: row.full_name.clone(),
                films: Vec::new(),
            });
            documents.len() - 1
        });

        let Some(film_id) = row.film_id else {
            continue;
        };

        let films = &mut documents[position].films;
        let film = match films.iter().position(|film| film.id == film_id) {
            Some(index) => &mut films[index],
            None => {
                films.push(PersonFilm {
                    id: film_id,
                    roles: Vec::new(),
                });
                let last = films.len() - 1;
                &mut films[last]
            }
        };

        if let Some(role) = row.role.as_ref() {
            if !film.roles.contains(role) {
                film.roles.push(role.clone());
            }
        }
    }

    documents
}
