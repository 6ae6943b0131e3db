use std::cmp::Ordering;
use std::collections::{BTreeSet, HashMap, HashSet, VecDeque};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::error::{ErrorKind, EtlResult};
use crate::source::base::{ChangeExtractor, RowFetcher};
use crate::types::{
    AggregateKind, ChangeCursor, ChangedBatch, FilmRow, GenreRow, PersonRow, RootRows, Table,
};
use crate::{bail, etl_error};

#[derive(Debug, Clone)]
pub struct FilmRecord {
    pub id: Uuid,
    pub title: String,
    pub description: Option<String>,
    pub rating: Option<f64>,
    pub modified: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct GenreRecord {
    pub id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub modified: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct PersonRecord {
    pub id: Uuid,
    pub full_name: String,
    pub modified: DateTime<Utc>,
}

#[derive(Debug, Clone)]
struct PersonLink {
    person_id: Uuid,
    film_id: Uuid,
    role: Option<String>,
}

#[derive(Debug, Default)]
struct Inner {
    films: HashMap<Uuid, FilmRecord>,
    genres: HashMap<Uuid, GenreRecord>,
    persons: HashMap<Uuid, PersonRecord>,
    /// `(genre_id, film_id)` rows; duplicates are kept like in an unconstrained table.
    genre_links: Vec<(Uuid, Uuid)>,
    person_links: Vec<PersonLink>,
    injected_failures: VecDeque<ErrorKind>,
    broken_tables: HashMap<Table, ErrorKind>,
    calls: usize,
}

impl Inner {
    fn modified(&self, table: Table, id: Uuid) -> Option<DateTime<Utc>> {
        match table {
            Table::FilmWork => self.films.get(&id).map(|film| film.modified),
            Table::Genre => self.genres.get(&id).map(|genre| genre.modified),
            Table::Person => self.persons.get(&id).map(|person| person.modified),
        }
    }

    fn positions(&self, table: Table) -> Vec<(Uuid, DateTime<Utc>)> {
        let mut positions: Vec<(Uuid, DateTime<Utc>)> = match table {
            Table::FilmWork => self.films.values().map(|r| (r.id, r.modified)).collect(),
            Table::Genre => self.genres.values().map(|r| (r.id, r.modified)).collect(),
            Table::Person => self.persons.values().map(|r| (r.id, r.modified)).collect(),
        };
        positions.sort_by(|a, b| (a.1, a.0).cmp(&(b.1, b.0)));
        positions
    }

    /// Sorts ids of `table` by `(modified, id)`, dropping ids without a row.
    fn ordered_existing(&self, table: Table, ids: impl IntoIterator<Item = Uuid>) -> Vec<Uuid> {
        let mut rows: Vec<(DateTime<Utc>, Uuid)> = ids
            .into_iter()
            .collect::<BTreeSet<_>>()
            .into_iter()
            .filter_map(|id| self.modified(table, id).map(|modified| (modified, id)))
            .collect();
        rows.sort();
        rows.into_iter().map(|(_, id)| id).collect()
    }

    /// `(root_id, changed_id)` pairs of the link table between `root` and `changed`.
    fn link_pairs(&self, root: Table, changed: Table) -> Vec<(Uuid, Uuid)> {
        let genre_pairs = self.genre_links.iter().copied();
        let person_pairs = self
            .person_links
            .iter()
            .map(|link| (link.person_id, link.film_id));

        match (root, changed) {
            (Table::FilmWork, Table::Genre) => genre_pairs.map(|(g, f)| (f, g)).collect(),
            (Table::Genre, Table::FilmWork) => genre_pairs.collect(),
            (Table::FilmWork, Table::Person) => person_pairs.map(|(p, f)| (f, p)).collect(),
            (Table::Person, Table::FilmWork) => person_pairs.collect(),
            _ => Vec::new(),
        }
    }

    fn film_rows(&self, ids: &[Uuid]) -> Vec<FilmRow> {
        let mut rows = Vec::new();

        for film_id in self.ordered_existing(Table::FilmWork, ids.iter().copied()) {
            let Some(film) = self.films.get(&film_id) else {
                continue;
            };

            let mut people: Vec<(Option<&PersonRecord>, &PersonLink)> = self
                .person_links
                .iter()
                .filter(|link| link.film_id == film_id)
                .map(|link| (self.persons.get(&link.person_id), link))
                .collect();
            people.sort_by(|a, b| compare_people(a, b));

            let mut genres: Vec<Option<&GenreRecord>> = self
                .genre_links
                .iter()
                .filter(|(_, linked_film)| *linked_film == film_id)
                .map(|(genre_id, _)| self.genres.get(genre_id))
                .collect();
            genres.sort_by(|a, b| compare_genres(*a, *b));

            let people: Vec<Option<(Option<&PersonRecord>, &PersonLink)>> = if people.is_empty() {
                vec![None]
            } else {
                people.into_iter().map(Some).collect()
            };
            let genres: Vec<Option<&GenreRecord>> = if genres.is_empty() {
                vec![None]
            } else {
                genres
            };

            for &person in &people {
                for &genre in &genres {
                    rows.push(FilmRow {
                        film_id,
                        title: film.title.clone(),
                        description: film.description.clone(),
                        rating: film.rating,
                        role: person.and_then(|(_, link)| link.role.clone()),
                        person_id: person.and_then(|(record, _)| record.map(|p| p.id)),
                        person_name: person
                            .and_then(|(record, _)| record.map(|p| p.full_name.clone())),
                        genre_id: genre.map(|g| g.id),
                        genre_name: genre.map(|g| g.name.clone()),
                    });
                }
            }
        }

        rows
    }

    fn genre_rows(&self, ids: &[Uuid]) -> Vec<GenreRow> {
        self.ordered_existing(Table::Genre, ids.iter().copied())
            .into_iter()
            .filter_map(|id| self.genres.get(&id))
            .map(|genre| GenreRow {
                id: genre.id,
                name: genre.name.clone(),
                description: genre.description.clone(),
            })
            .collect()
    }

    fn person_rows(&self, ids: &[Uuid]) -> Vec<PersonRow> {
        let mut rows = Vec::new();

        for person_id in self.ordered_existing(Table::Person, ids.iter().copied()) {
            let Some(person) = self.persons.get(&person_id) else {
                continue;
            };

            let mut links: Vec<&PersonLink> = self
                .person_links
                .iter()
                .filter(|link| link.person_id == person_id)
                .collect();
            links.sort_by(|a, b| {
                a.film_id
                    .cmp(&b.film_id)
                    .then_with(|| compare_nulls_last(&a.role, &b.role))
            });

            if links.is_empty() {
                rows.push(PersonRow {
                    person_id,
                    full_name: person.full_name.clone(),
                    role: None,
                    film_id: None,
                });
            }

            for link in links {
                rows.push(PersonRow {
                    person_id,
                    full_name: person.full_name.clone(),
                    role: link.role.clone(),
                    film_id: Some(link.film_id),
                });
            }
        }

        rows
    }
}

/// Ascending order with `None` last, like Postgres sorts nulls.
fn compare_nulls_last<T: Ord>(a: &Option<T>, b: &Option<T>) -> Ordering {
    match (a, b) {
        (Some(a), Some(b)) => a.cmp(b),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

fn compare_people(
    a: &(Option<&PersonRecord>, &PersonLink),
    b: &(Option<&PersonRecord>, &PersonLink),
) -> Ordering {
    let name = |p: &(Option<&PersonRecord>, &PersonLink)| p.0.map(|r| r.full_name.clone());
    let id = |p: &(Option<&PersonRecord>, &PersonLink)| p.0.map(|r| r.id);

    compare_nulls_last(&name(a), &name(b))
        .then_with(|| compare_nulls_last(&id(a), &id(b)))
        .then_with(|| compare_nulls_last(&a.1.role, &b.1.role))
}

fn compare_genres(a: Option<&GenreRecord>, b: Option<&GenreRecord>) -> Ordering {
    compare_nulls_last(&a.map(|g| g.name.clone()), &b.map(|g| g.name.clone()))
        .then_with(|| compare_nulls_last(&a.map(|g| g.id), &b.map(|g| g.id)))
}

/// In-memory content schema implementing the extractor and fetcher contracts.
///
/// Queries follow the Postgres source: batches are ordered by `(modified, id)`, fan-out
/// returns distinct roots ordered by `(modified, id)`, and fetched rows are the product
/// of left joins ordered the same way as the SQL queries.
#[derive(Debug, Clone, Default)]
pub struct MemorySource {
    inner: Arc<Mutex<Inner>>,
}

impl MemorySource {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn upsert_film(&self, film: FilmRecord) {
        self.inner.lock().await.films.insert(film.id, film);
    }

    pub async fn upsert_genre(&self, genre: GenreRecord) {
        self.inner.lock().await.genres.insert(genre.id, genre);
    }

    pub async fn upsert_person(&self, person: PersonRecord) {
        self.inner.lock().await.persons.insert(person.id, person);
    }

    /// Adds a `genre_film_work` row. Adding the same pair twice keeps both rows.
    pub async fn link_genre(&self, genre_id: Uuid, film_id: Uuid) {
        self.inner.lock().await.genre_links.push((genre_id, film_id));
    }

    /// Adds a `person_film_work` row.
    pub async fn link_person(&self, person_id: Uuid, film_id: Uuid, role: Option<&str>) {
        self.inner.lock().await.person_links.push(PersonLink {
            person_id,
            film_id,
            role: role.map(str::to_string),
        });
    }

    /// Sets the `modified` column of one row, returning `false` if the row is missing.
    pub async fn touch(&self, table: Table, id: Uuid, modified: DateTime<Utc>) -> bool {
        let mut inner = self.inner.lock().await;
        let slot = match table {
            Table::FilmWork => inner.films.get_mut(&id).map(|r| &mut r.modified),
            Table::Genre => inner.genres.get_mut(&id).map(|r| &mut r.modified),
            Table::Person => inner.persons.get_mut(&id).map(|r| &mut r.modified),
        };

        match slot {
            Some(slot) => {
                *slot = modified;
                true
            }
            None => false,
        }
    }

    /// Makes the next `times` calls of any operation fail with `kind`.
    pub async fn fail_next_calls(&self, kind: ErrorKind, times: usize) {
        let mut inner = self.inner.lock().await;
        inner.injected_failures.extend(std::iter::repeat_n(kind, times));
    }

    /// Makes every batch extraction of `table` fail with `kind` until repaired.
    pub async fn break_table(&self, table: Table, kind: ErrorKind) {
        self.inner.lock().await.broken_tables.insert(table, kind);
    }

    pub async fn repair_table(&self, table: Table) {
        self.inner.lock().await.broken_tables.remove(&table);
    }

    /// Number of operations invoked, including failed ones.
    pub async fn calls(&self) -> usize {
        self.inner.lock().await.calls
    }

    async fn begin_call(&self) -> EtlResult<tokio::sync::MutexGuard<'_, Inner>> {
        let mut inner = self.inner.lock().await;
        inner.calls += 1;

        if let Some(kind) = inner.injected_failures.pop_front() {
            return Err(etl_error!(kind, "Injected source failure"));
        }

        Ok(inner)
    }
}

impl ChangeExtractor for MemorySource {
    async fn oldest_modified(&self, table: Table) -> EtlResult<Option<DateTime<Utc>>> {
        let inner = self.begin_call().await?;

        Ok(inner
            .positions(table)
            .first()
            .map(|&(_, modified)| modified))
    }

    async fn next_changed_batch(
        &self,
        table: Table,
        cursor: &ChangeCursor,
        limit: usize,
    ) -> EtlResult<ChangedBatch> {
        let inner = self.begin_call().await?;

        if let Some(&kind) = inner.broken_tables.get(&table) {
            bail!(kind, "Table is unavailable", table);
        }

        let rows: Vec<(Uuid, DateTime<Utc>)> = inner
            .positions(table)
            .into_iter()
            .filter(|&(id, modified)| cursor.precedes(modified, id))
            .take(limit)
            .collect();

        Ok(ChangedBatch::from_rows(rows, *cursor))
    }

    async fn expand_to_root_ids(
        &self,
        root: Table,
        changed_table: Table,
        changed_ids: &[Uuid],
    ) -> EtlResult<Vec<Uuid>> {
        let inner = self.begin_call().await?;

        if root.link_table(changed_table).is_none() {
            bail!(
                ErrorKind::ConfigError,
                "Changed table is not linked to the aggregate root",
                format!("root: {root}, changed table: {changed_table}")
            );
        }

        let changed: HashSet<Uuid> = changed_ids.iter().copied().collect();
        let roots = inner
            .link_pairs(root, changed_table)
            .into_iter()
            .filter(|(_, changed_id)| changed.contains(changed_id))
            .map(|(root_id, _)| root_id);

        Ok(inner.ordered_existing(root, roots))
    }
}

impl RowFetcher for MemorySource {
    async fn fetch_root_rows(&self, kind: AggregateKind, root_ids: &[Uuid]) -> EtlResult<RootRows> {
        let inner = self.begin_call().await?;

        Ok(match kind {
            AggregateKind::Film => RootRows::Film(inner.film_rows(root_ids)),
            AggregateKind::Genre => RootRows::Genre(inner.genre_rows(root_ids)),
            AggregateKind::Person => RootRows::Person(inner.person_rows(root_ids)),
        })
    }
}
