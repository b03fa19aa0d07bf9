//! Bulk loading into the document index
//!
//! Ships transformed documents to the index in fixed-size chunks over the
//! newline-delimited `_bulk` protocol and surfaces every per-record rejection
//! individually: a batch being accepted never means all of its records
//! succeeded. Transient transport failures (timeouts, 5xx) are retried up to
//! a configured bound; per-record rejects are application-level and never
//! retried here.

use reqwest::header::CONTENT_TYPE;
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, warn};

use crate::error::{EtlError, LoadError, Result};
use crate::schema;
use crate::transform::Movie;

const NDJSON: &str = "application/x-ndjson";

/// Loader configuration derived from [`EtlConfig`].
///
/// [`EtlConfig`]: crate::config::EtlConfig
#[derive(Debug, Clone)]
pub struct LoaderConfig {
    /// Records per bulk request (must be >= 1)
    pub batch_size: usize,
    /// Transport-level retries after the first attempt
    pub max_retries: u32,
    /// Backoff between retries
    pub retry_backoff: std::time::Duration,
}

/// Batches documents and ships them to the index.
///
/// The HTTP client is injected at construction; request timeouts are the
/// client's. Failed records never block or roll back siblings in their batch
/// or later batches; this is an at-least-once, best-effort append.
#[derive(Debug, Clone)]
pub struct BulkLoader {
    client: reqwest::Client,
    index_url: String,
    bulk_url: String,
    config: LoaderConfig,
}

impl BulkLoader {
    /// Create a loader for one index.
    ///
    /// A non-positive batch size is a construction-time
    /// [`EtlError::InvalidConfiguration`], never a run-time failure.
    pub fn new(
        client: reqwest::Client,
        base_url: &str,
        index: &str,
        config: LoaderConfig,
    ) -> Result<Self> {
        if config.batch_size == 0 {
            return Err(EtlError::InvalidConfiguration(
                "bulk batch size must be >= 1".to_string(),
            ));
        }

        let base = base_url.trim_end_matches('/');
        Ok(Self {
            client,
            index_url: format!("{base}/{index}"),
            bulk_url: format!("{base}/{index}/_bulk"),
            config,
        })
    }

    /// Create the index with its schema if it does not exist yet.
    ///
    /// Idempotent: the index already existing (HTTP 400 from the target) is
    /// success, matching repeated bootstrap calls across runs.
    pub async fn ensure_index(&self) -> Result<()> {
        let response = self
            .send_with_retry(|| self.client.put(&self.index_url).json(&schema::movies_index()))
            .await?;

        let status = response.status();
        if status.is_success() {
            debug!(url = %self.index_url, "index created");
            Ok(())
        } else if status == reqwest::StatusCode::BAD_REQUEST {
            debug!(url = %self.index_url, "index already exists");
            Ok(())
        } else {
            Err(EtlError::TargetUnavailable(format!(
                "index bootstrap returned {status}"
            )))
        }
    }

    /// Load records in consecutive batches of at most the configured size.
    ///
    /// Returns every per-record rejection reported by the index; the records
    /// themselves are not retained.
    pub async fn load(&self, records: &[Movie]) -> Result<Vec<LoadError>> {
        let mut errors = Vec::new();

        for chunk in records.chunks(self.config.batch_size) {
            let body = bulk_body(chunk)?;
            let response = self
                .send_with_retry(|| {
                    self.client
                        .post(&self.bulk_url)
                        .header(CONTENT_TYPE, NDJSON)
                        .body(body.clone())
                })
                .await?;

            let status = response.status();
            if !status.is_success() {
                return Err(EtlError::TargetUnavailable(format!(
                    "bulk request returned {status}"
                )));
            }

            let parsed: BulkResponse = response.json().await.map_err(|err| {
                EtlError::TargetUnavailable(format!("unreadable bulk response: {err}"))
            })?;

            let rejected = parsed.rejections();
            if !rejected.is_empty() {
                warn!(count = rejected.len(), "index rejected records in batch");
            }
            errors.extend(rejected);
        }

        Ok(errors)
    }

    /// Issue a request with bounded retries for transient failures.
    ///
    /// Retryable: connection errors, timeouts, 5xx responses. Everything else
    /// is returned to the caller for status handling.
    async fn send_with_retry(
        &self,
        build: impl Fn() -> reqwest::RequestBuilder,
    ) -> Result<reqwest::Response> {
        let mut attempt: u32 = 0;

        loop {
            let failure = match build().send().await {
                Ok(response) if response.status().is_server_error() => {
                    format!("target returned {}", response.status())
                },
                Ok(response) => return Ok(response),
                Err(err) => err.to_string(),
            };

            if attempt >= self.config.max_retries {
                return Err(EtlError::TargetUnavailable(format!(
                    "{failure} (after {attempt} retries)"
                )));
            }

            attempt += 1;
            warn!(attempt, failure = %failure, "transient index failure, retrying");
            tokio::time::sleep(self.config.retry_backoff).await;
        }
    }
}

/// Render one batch as newline-delimited action/document pairs.
fn bulk_body(chunk: &[Movie]) -> Result<String> {
    let mut body = String::new();
    for movie in chunk {
        let action = json!({"index": {"_id": &movie.id}});
        body.push_str(&serde_json::to_string(&action)?);
        body.push('\n');
        body.push_str(&serde_json::to_string(movie)?);
        body.push('\n');
    }
    Ok(body)
}

/// `_bulk` response body: per-item status, independent of the HTTP status.
#[derive(Debug, Deserialize)]
struct BulkResponse {
    #[serde(default)]
    items: Vec<BulkItem>,
}

#[derive(Debug, Deserialize)]
struct BulkItem {
    #[serde(alias = "create")]
    index: Option<BulkItemStatus>,
}

#[derive(Debug, Deserialize)]
struct BulkItemStatus {
    #[serde(rename = "_id")]
    id: Option<String>,
    error: Option<serde_json::Value>,
}

impl BulkResponse {
    fn rejections(self) -> Vec<LoadError> {
        self.items
            .into_iter()
            .filter_map(|item| item.index)
            .filter_map(|status| {
                let error = status.error?;
                Some(LoadError {
                    id: status.id.unwrap_or_default(),
                    reason: error
                        .get("reason")
                        .and_then(|r| r.as_str())
                        .map(str::to_string)
                        .unwrap_or_else(|| error.to_string()),
                })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transform::Movie;

    fn movie(id: &str) -> Movie {
        Movie {
            id: id.to_string(),
            title: format!("Movie {id}"),
            description: String::new(),
            imdb_rating: 0.0,
            genre: vec![],
            director: vec![],
            actors: vec![],
            actors_names: vec![],
            writers: vec![],
            writers_names: vec![],
        }
    }

    #[test]
    fn test_bulk_body_pairs_action_and_document() {
        let body = bulk_body(&[movie("m1"), movie("m2")]).unwrap();
        let lines: Vec<&str> = body.lines().collect();

        assert_eq!(lines.len(), 4);
        assert!(lines[0].contains(r#""_id":"m1""#));
        assert!(lines[1].contains(r#""title":"Movie m1""#));
        assert!(lines[2].contains(r#""_id":"m2""#));
        assert!(body.ends_with('\n'));
    }

    #[test]
    fn test_rejections_surface_reason() {
        let raw = serde_json::json!({
            "took": 3,
            "errors": true,
            "items": [
                {"index": {"_id": "m1", "status": 201}},
                {"index": {"_id": "m2", "status": 400, "error": {
                    "type": "strict_dynamic_mapping_exception",
                    "reason": "mapping set to strict"
                }}}
            ]
        });
        let response: BulkResponse = serde_json::from_value(raw).unwrap();

        let rejected = response.rejections();
        assert_eq!(rejected.len(), 1);
        assert_eq!(rejected[0].id, "m2");
        assert_eq!(rejected[0].reason, "mapping set to strict");
    }

    #[test]
    fn test_zero_batch_size_rejected_at_construction() {
        let result = BulkLoader::new(
            reqwest::Client::new(),
            "http://127.0.0.1:9200",
            "movies",
            LoaderConfig {
                batch_size: 0,
                max_retries: 0,
                retry_backoff: std::time::Duration::from_millis(1),
            },
        );
        assert!(matches!(result, Err(EtlError::InvalidConfiguration(_))));
    }
}
