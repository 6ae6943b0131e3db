use sqlx::FromRow;
use uuid::Uuid;

/// One film joined with at most one person participation and one genre.
///
/// `None` related fields mean the film has no relation of that kind in this row.
#[derive(Debug, Clone, PartialEq, FromRow)]
pub struct FilmRow {
    pub film_id: Uuid,
    pub title: String,
    pub description: Option<String>,
    pub rating: Option<f64>,
    pub role: Option<String>,
    pub person_id: Option<Uuid>,
    pub person_name: Option<String>,
    pub genre_id: Option<Uuid>,
    pub genre_name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, FromRow)]
pub struct GenreRow {
    pub id: Uuid,
    pub name: String,
    pub description: Option<String>,
}

/// One person joined with at most one film participation.
#[derive(Debug, Clone, PartialEq, FromRow)]
pub struct PersonRow {
    pub person_id: Uuid,
    pub full_name: String,
    pub role: Option<String>,
    pub film_id: Option<Uuid>,
}

/// Flattened rows fetched for one aggregate kind.
#[derive(Debug, Clone, PartialEq)]
pub enum RootRows {
    Film(Vec<FilmRow>),
    Genre(Vec<GenreRow>),
    Person(Vec<PersonRow>),
}

impl RootRows {
    pub fn len(&self) -> usize {
        match self {
            RootRows::Film(rows) => rows.len(),
            RootRows::Genre(rows) => rows.len(),
            RootRows::Person(rows) => rows.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
