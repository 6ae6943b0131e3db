use thiserror::Error;

/// Configuration validation errors.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    /// A field holds a value outside of its accepted range.
    #[error("Invalid value for `{field}`: {constraint}")]
    InvalidFieldValue { field: String, constraint: String },
    /// TLS is enabled but no trusted root certificates are provided.
    #[error("Invalid TLS config: `trusted_root_certs` must be set when `enabled` is true")]
    MissingTrustedRootCerts,
    /// A contributing table has no link to the aggregate root.
    #[error("Table `{table}` cannot contribute to aggregate `{aggregate}`: no link table to `{root}`")]
    UnlinkedTable {
        aggregate: String,
        table: String,
        root: String,
    },
    /// The same aggregate is configured more than once.
    #[error("Aggregate `{0}` is configured more than once")]
    DuplicateAggregate(String),
}
