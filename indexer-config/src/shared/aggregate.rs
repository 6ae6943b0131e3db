use std::fmt;

use serde::{Deserialize, Serialize};

use crate::shared::ValidationError;

/// Root tables of the relational content schema.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Table {
    FilmWork,
    Genre,
    Person,
}

impl Table {
    pub fn as_str(&self) -> &'static str {
        match self {
            Table::FilmWork => "film_work",
            Table::Genre => "genre",
            Table::Person => "person",
        }
    }

    /// Returns the many-to-many table joining `self` and `other`.
    ///
    /// Only film works are linked to genres and persons, so every link table is named
    /// `{other}_film_work`. Returns [`None`] for genre↔person and for a table paired with itself.
    pub fn link_table(&self, other: Table) -> Option<&'static str> {
        match (self, other) {
            (Table::FilmWork, Table::Genre) | (Table::Genre, Table::FilmWork) => {
                Some("genre_film_work")
            }
            (Table::FilmWork, Table::Person) | (Table::Person, Table::FilmWork) => {
                Some("person_film_work")
            }
            _ => None,
        }
    }

    /// Name of the foreign-key column referencing this table from a link table.
    pub fn link_column(&self) -> &'static str {
        match self {
            Table::FilmWork => "film_work_id",
            Table::Genre => "genre_id",
            Table::Person => "person_id",
        }
    }
}

impl fmt::Display for Table {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Kinds of denormalized documents maintained in the search index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AggregateKind {
    Film,
    Genre,
    Person,
}

impl AggregateKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            AggregateKind::Film => "film",
            AggregateKind::Genre => "genre",
            AggregateKind::Person => "person",
        }
    }

    /// Table whose rows identify documents of this kind.
    pub fn root_table(&self) -> Table {
        match self {
            AggregateKind::Film => Table::FilmWork,
            AggregateKind::Genre => Table::Genre,
            AggregateKind::Person => Table::Person,
        }
    }

    /// Tables whose changes can alter documents of this kind.
    pub fn default_tables(&self) -> Vec<Table> {
        match self {
            AggregateKind::Film => vec![Table::FilmWork, Table::Genre, Table::Person],
            AggregateKind::Genre => vec![Table::FilmWork, Table::Genre],
            AggregateKind::Person => vec![Table::FilmWork, Table::Person],
        }
    }

    pub fn default_index_name(&self) -> &'static str {
        match self {
            AggregateKind::Film => "movies",
            AggregateKind::Genre => "genres",
            AggregateKind::Person => "persons",
        }
    }
}

impl fmt::Display for AggregateKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Synchronization settings for one aggregate type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct AggregateConfig {
    pub kind: AggregateKind,
    /// Index receiving the documents.
    pub index_name: String,
    /// Contributing tables, processed in the listed order.
    pub tables: Vec<Table>,
}

impl AggregateConfig {
    /// Builds the standard configuration for `kind`.
    pub fn for_kind(kind: AggregateKind) -> Self {
        Self {
            kind,
            index_name: kind.default_index_name().to_string(),
            tables: kind.default_tables(),
        }
    }

    /// Returns the film, genre and person aggregates with their standard tables and indexes.
    pub fn defaults() -> Vec<AggregateConfig> {
        vec![
            Self::for_kind(AggregateKind::Film),
            Self::for_kind(AggregateKind::Genre),
            Self::for_kind(AggregateKind::Person),
        ]
    }

    /// Validates that the index name is set and every table can be expanded to the root.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.index_name.trim().is_empty() {
            return Err(ValidationError::InvalidFieldValue {
                field: format!("sync.aggregates.{}.index_name", self.kind),
                constraint: "must not be empty".to_string(),
            });
        }

        if self.tables.is_empty() {
            return Err(ValidationError::InvalidFieldValue {
                field: format!("sync.aggregates.{}.tables", self.kind),
                constraint: "must list at least one table".to_string(),
            });
        }

        let root = self.kind.root_table();
        for table in &self.tables {
            if *table != root && root.link_table(*table).is_none() {
                return Err(ValidationError::UnlinkedTable {
                    aggregate: self.kind.to_string(),
                    table: table.to_string(),
                    root: root.to_string(),
                });
            }
        }

        Ok(())
    }
}
