use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use sqlx::postgres::{PgConnectOptions, PgSslMode};

use crate::shared::ValidationError;

/// Session parameters applied to every source connection.
pub struct DefaultPgConnectionOptions;

impl DefaultPgConnectionOptions {
    /// Returns the session parameters as key-value pairs for sqlx.
    pub fn to_key_value_pairs() -> Vec<(String, String)> {
        vec![
            ("datestyle".to_string(), "ISO".to_string()),
            ("timezone".to_string(), "UTC".to_string()),
            ("client_encoding".to_string(), "UTF8".to_string()),
        ]
    }
}

/// Connection settings for the Postgres database holding the content schema.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct PgConnectionConfig {
    pub host: String,
    pub port: u16,
    /// Database name.
    pub name: String,
    pub username: String,
    /// Redacted in debug output.
    pub password: Option<SecretString>,
    /// Schema containing `film_work`, `genre`, `person` and their link tables.
    #[serde(default = "default_schema")]
    pub schema: String,
    #[serde(default)]
    pub tls: TlsConfig,
}

fn default_schema() -> String {
    "content".to_string()
}

impl PgConnectionConfig {
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.schema.trim().is_empty() {
            return Err(ValidationError::InvalidFieldValue {
                field: "source.schema".to_string(),
                constraint: "must not be empty".to_string(),
            });
        }

        self.tls.validate()
    }
}

/// TLS settings for Postgres connections.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct TlsConfig {
    /// PEM-encoded trusted root certificates.
    #[serde(default)]
    pub trusted_root_certs: String,
    #[serde(default)]
    pub enabled: bool,
}

impl TlsConfig {
    /// Returns [`ValidationError::MissingTrustedRootCerts`] if TLS is enabled without certificates.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.enabled && self.trusted_root_certs.is_empty() {
            return Err(ValidationError::MissingTrustedRootCerts);
        }

        Ok(())
    }
}

/// Converts [`PgConnectionConfig`] into driver specific connect options.
pub trait IntoConnectOptions<Output> {
    /// Options targeting the server without selecting a database.
    fn without_db(&self) -> Output;

    /// Options targeting the configured database.
    fn with_db(&self) -> Output;
}

impl IntoConnectOptions<PgConnectOptions> for PgConnectionConfig {
    fn without_db(&self) -> PgConnectOptions {
        let ssl_mode = if self.tls.enabled {
            PgSslMode::VerifyFull
        } else {
            PgSslMode::Prefer
        };

        let mut options = PgConnectOptions::new_without_pgpass()
            .application_name("indexer")
            .host(&self.host)
            .username(&self.username)
            .port(self.port)
            .ssl_mode(ssl_mode)
            .options(DefaultPgConnectionOptions::to_key_value_pairs());

        if self.tls.enabled {
            options = options.ssl_root_cert_from_pem(self.tls.trusted_root_certs.clone().into_bytes());
        }

        if let Some(password) = &self.password {
            options = options.password(password.expose_secret());
        }

        options
    }

    fn with_db(&self) -> PgConnectOptions {
        let options: PgConnectOptions = self.without_db();
        options.database(&self.name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_schema_defaults_to_content() {
        let config: PgConnectionConfig = serde_json::from_str(
            r#"{"host": "localhost", "port": 5432, "name": "movies", "username": "app"}"#,
        )
        .unwrap();

        assert_eq!(config.schema, "content");
        assert!(config.password.is_none());
        assert!(!config.tls.enabled);
        config.validate().unwrap();
    }

    #[test]
    fn test_tls_without_certs_is_rejected() {
        let tls = TlsConfig {
            trusted_root_certs: String::new(),
            enabled: true,
        };
        assert_eq!(tls.validate(), Err(ValidationError::MissingTrustedRootCerts));
    }

    #[test]
    fn test_password_is_redacted() {
        let config: PgConnectionConfig = serde_json::from_str(
            r#"{"host": "db", "port": 5432, "name": "movies", "username": "app", "password": "hunter2"}"#,
        )
        .unwrap();

        assert!(!format!("{config:?}").contains("hunter2"));
    }

    #[test]
    fn test_key_value_pairs() {
        let pairs = DefaultPgConnectionOptions::to_key_value_pairs();
        assert!(pairs.contains(&("timezone".to_string(), "UTC".to_string())));
    }
}
