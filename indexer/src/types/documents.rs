use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Role of a person in a film, as stored in `person_film_work.role`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PersonRole {
    Actor,
    Writer,
    Director,
}

impl PersonRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            PersonRole::Actor => "actor",
            PersonRole::Writer => "writer",
            PersonRole::Director => "director",
        }
    }
}

impl fmt::Display for PersonRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownRole(pub String);

impl FromStr for PersonRole {
    type Err = UnknownRole;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "actor" => Ok(PersonRole::Actor),
            "writer" => Ok(PersonRole::Writer),
            "director" => Ok(PersonRole::Director),
            other => Err(UnknownRole(other.to_string())),
        }
    }
}

/// Id and display name of a nested genre or person.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NamedRef {
    pub id: Uuid,
    pub name: String,
}

/// Document stored in the film index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilmDocument {
    pub id: Uuid,
    pub title: String,
    pub description: Option<String>,
    pub imdb_rating: f64,
    pub genre: Vec<NamedRef>,
    pub actors: Vec<NamedRef>,
    pub writers: Vec<NamedRef>,
    pub directors: Vec<NamedRef>,
    pub actors_names: Vec<String>,
    pub writers_names: Vec<String>,
    pub directors_names: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenreDocument {
    pub id: Uuid,
    pub name: String,
    pub description: Option<String>,
}

/// A film a person took part in, with every role they held in it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PersonFilm {
    pub id: Uuid,
    pub roles: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PersonDocument {
    pub id: Uuid,
    pub full_name: String,
    pub films: Vec<PersonFilm>,
}

/// Fully denormalized document keyed by its root id.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum AggregateDocument {
    Film(FilmDocument),
    Genre(GenreDocument),
    Person(PersonDocument),
}

impl AggregateDocument {
    pub fn id(&self) -> Uuid {
        match self {
            AggregateDocument::Film(doc) => doc.id,
            AggregateDocument::Genre(doc) => doc.id,
            AggregateDocument::Person(doc) => doc.id,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_parsing() {
        assert_eq!("actor".parse::<PersonRole>(), Ok(PersonRole::Actor));
        assert_eq!(
            "producer".parse::<PersonRole>(),
            Err(UnknownRole("producer".to_string()))
        );
    }

    #[test]
    fn test_untagged_serialization_has_no_wrapper() {
        let doc = AggregateDocument::Genre(GenreDocument {
            id: Uuid::from_u128(1),
            name: "Drama".to_string(),
            description: None,
        });

        let json = serde_json::to_value(&doc).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "id": "00000000-0000-0000-0000-000000000001",
                "name": "Drama",
                "description": null
            })
        );
    }

    #[test]
    fn test_film_field_order_is_stable() {
        let doc = FilmDocument {
            id: Uuid::from_u128(7),
            title: "Star Wars".to_string(),
            description: None,
            imdb_rating: 8.6,
            genre: vec![],
            actors: vec![],
            writers: vec![],
            directors: vec![],
            actors_names: vec![],
            writers_names: vec![],
            directors_names: vec![],
        };

        let json = serde_json::to_string(&doc).unwrap();
        assert!(json.starts_with(r#"{"id":"00000000-0000-0000-0000-000000000007","title":"Star Wars""#));
        assert!(json.ends_with(r#""directors_names":[]}"#));
    }
}
