use std::time::Duration;

use secrecy::SecretString;
use serde::Deserialize;

use crate::shared::ValidationError;

/// Connection settings for the Elasticsearch cluster receiving documents.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct ElasticsearchConfig {
    /// Base URL, e.g. `http://localhost:9200`.
    pub url: String,
    /// Optional basic-auth user.
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<SecretString>,
    /// Per-request timeout. Default: 30000ms.
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
}

fn default_request_timeout_ms() -> u64 {
    30000
}

impl ElasticsearchConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        if !(self.url.starts_with("http://") || self.url.starts_with("https://")) {
            return Err(ValidationError::InvalidFieldValue {
                field: "elasticsearch.url".to_string(),
                constraint: "must start with http:// or https://".to_string(),
            });
        }

        if self.request_timeout_ms == 0 {
            return Err(ValidationError::InvalidFieldValue {
                field: "elasticsearch.request_timeout_ms".to_string(),
                constraint: "must be greater than 0".to_string(),
            });
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_url_scheme_is_required() {
        let config: ElasticsearchConfig =
            serde_json::from_str(r#"{"url": "localhost:9200"}"#).unwrap();
        assert!(config.validate().is_err());

        let config: ElasticsearchConfig =
            serde_json::from_str(r#"{"url": "http://localhost:9200"}"#).unwrap();
        config.validate().unwrap();
        assert_eq!(config.request_timeout(), Duration::from_secs(30));
    }
}
