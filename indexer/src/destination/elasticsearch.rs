use std::collections::HashMap;

use indexer_config::shared::ElasticsearchConfig;
use reqwest::{Client, RequestBuilder, StatusCode, header};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, info, warn};

use crate::destination::base::{BulkOutcome, Destination, DocumentFailure};
use crate::error::{ErrorKind, EtlError, EtlResult};
use crate::types::AggregateDocument;
use crate::{bail, etl_error};

const NDJSON_CONTENT_TYPE: &str = "application/x-ndjson";

#[derive(Debug, Deserialize)]
struct BulkResponse {
    errors: bool,
    #[serde(default)]
    items: Vec<HashMap<String, BulkItem>>,
}

#[derive(Debug, Deserialize)]
struct BulkItem {
    #[serde(rename = "_id")]
    id: Option<String>,
    status: u16,
    error: Option<serde_json::Value>,
}

/// Writes documents to Elasticsearch through the `_bulk` HTTP API.
#[derive(Debug, Clone)]
pub struct ElasticsearchDestination {
    client: Client,
    base_url: String,
    credentials: Option<(String, SecretString)>,
}

impl ElasticsearchDestination {
    pub fn new(config: &ElasticsearchConfig) -> EtlResult<Self> {
        let client = Client::builder()
            .timeout(config.request_timeout())
            .build()?;

        let credentials = match (&config.username, &config.password) {
            (Some(username), Some(password)) => Some((username.clone(), password.clone())),
            _ => None,
        };

        Ok(Self {
            client,
            base_url: config.url.trim_end_matches('/').to_string(),
            credentials,
        })
    }

    fn request(&self, builder: RequestBuilder) -> RequestBuilder {
        match &self.credentials {
            Some((username, password)) => {
                builder.basic_auth(username, Some(password.expose_secret()))
            }
            None => builder,
        }
    }

    /// Fails with [`ErrorKind::DestinationIndexMissing`] unless `index_name` exists.
    async fn ensure_index_exists(&self, index_name: &str) -> EtlResult<()> {
        let url = format!("{}/{}", self.base_url, index_name);
        let response = self.request(self.client.head(&url)).send().await?;

        match response.status() {
            status if status.is_success() => Ok(()),
            StatusCode::NOT_FOUND => bail!(
                ErrorKind::DestinationIndexMissing,
                "Index does not exist",
                index_name
            ),
            status => Err(status_error(status, format!("HEAD {url}"))),
        }
    }
}

impl Destination for ElasticsearchDestination {
    fn name() -> &'static str {
        "elasticsearch"
    }

    async fn upsert(
        &self,
        index_name: &str,
        documents: &[AggregateDocument],
    ) -> EtlResult<BulkOutcome> {
        if documents.is_empty() {
            return Ok(BulkOutcome::default());
        }

        self.ensure_index_exists(index_name).await?;

        let body = bulk_body(index_name, documents)?;
        let url = format!("{}/_bulk", self.base_url);
        let response = self
            .request(self.client.post(&url))
            .header(header::CONTENT_TYPE, NDJSON_CONTENT_TYPE)
            .body(body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(status_error(status, text));
        }

        let response: BulkResponse = response.json().await?;
        let outcome = bulk_outcome(response);

        if !outcome.failures.is_empty() {
            let failed_ids: Vec<&str> = outcome.failures.iter().map(|f| f.id.as_str()).collect();
            warn!(
                index = index_name,
                failed = outcome.failures.len(),
                ?failed_ids,
                first_reason = %outcome.failures[0].reason,
                "bulk upsert partially failed"
            );
        }

        info!(index = index_name, indexed = outcome.indexed, "documents upserted");

        Ok(outcome)
    }
}

/// Renders documents as `_bulk` NDJSON, one `index` action per document keyed by id.
fn bulk_body(index_name: &str, documents: &[AggregateDocument]) -> EtlResult<String> {
    let mut body = String::new();

    for document in documents {
        let action = json!({ "index": { "_index": index_name, "_id": document.id() } });
        body.push_str(&serde_json::to_string(&action)?);
        body.push('\n');
        body.push_str(&serde_json::to_string(document)?);
        body.push('\n');
    }

    debug!(index = index_name, bytes = body.len(), "built bulk request body");

    Ok(body)
}

fn bulk_outcome(response: BulkResponse) -> BulkOutcome {
    let items = response.items.into_iter().flat_map(HashMap::into_values);

    if !response.errors {
        return BulkOutcome {
            indexed: items.count(),
            failures: Vec::new(),
        };
    }

    let mut outcome = BulkOutcome::default();
    for item in items {
        if item.error.is_none() && item.status < 300 {
            outcome.indexed += 1;
            continue;
        }

        outcome.failures.push(DocumentFailure {
            id: item.id.unwrap_or_default(),
            reason: item
                .error
                .map(|error| error.to_string())
                .unwrap_or_else(|| format!("status {}", item.status)),
        });
    }

    outcome
}

/// Classifies a non-success HTTP status; throttling and server errors are transient.
fn status_error(status: StatusCode, detail: String) -> EtlError {
    let detail = format!("{status}: {detail}");

    if status == StatusCode::TOO_MANY_REQUESTS {
        etl_error!(ErrorKind::DestinationThrottled, "Elasticsearch throttled the request", detail)
    } else if status.is_server_error() {
        etl_error!(ErrorKind::DestinationIoError, "Elasticsearch server error", detail)
    } else {
        etl_error!(ErrorKind::DestinationQueryFailed, "Elasticsearch rejected the request", detail)
    }
}
