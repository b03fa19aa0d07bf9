//! Integration tests for the bulk loader against a stubbed index target.

use std::time::Duration;

use serde_json::json;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use mdp_etl::{BulkLoader, EtlError, LoaderConfig, Movie};

fn movie(id: &str) -> Movie {
    Movie {
        id: id.to_string(),
        title: format!("Movie {id}"),
        description: "A test movie".to_string(),
        imdb_rating: 7.5,
        genre: vec!["Drama".to_string()],
        director: vec![],
        actors: vec![],
        actors_names: vec![],
        writers: vec![],
        writers_names: vec![],
    }
}

fn loader(server: &MockServer, batch_size: usize, max_retries: u32) -> BulkLoader {
    BulkLoader::new(
        reqwest::Client::new(),
        &server.uri(),
        "movies",
        LoaderConfig {
            batch_size,
            max_retries,
            retry_backoff: Duration::from_millis(10),
        },
    )
    .expect("loader config is valid")
}

fn bulk_ok() -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_json(json!({"took": 1, "errors": false, "items": []}))
}

#[tokio::test]
async fn test_batches_of_fifty() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/movies/_bulk"))
        .respond_with(bulk_ok())
        .expect(3)
        .mount(&server)
        .await;

    let records: Vec<Movie> = (0..120).map(|i| movie(&format!("m{i:03}"))).collect();
    let errors = loader(&server, 50, 0).load(&records).await.unwrap();
    assert!(errors.is_empty());

    // Three consecutive chunks: 50, 50, 20 (two NDJSON lines per record).
    let requests = server.received_requests().await.unwrap();
    let sizes: Vec<usize> = requests
        .iter()
        .map(|r| String::from_utf8_lossy(&r.body).lines().count() / 2)
        .collect();
    assert_eq!(sizes, vec![50, 50, 20]);
}

#[tokio::test]
async fn test_partial_failure_is_per_record() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/movies/_bulk"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "took": 2,
            "errors": true,
            "items": [
                {"index": {"_id": "m0", "status": 201}},
                {"index": {"_id": "m1", "status": 400, "error": {
                    "type": "mapper_parsing_exception",
                    "reason": "failed to parse field [imdb_rating]"
                }}},
                {"index": {"_id": "m2", "status": 201}}
            ]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let records = vec![movie("m0"), movie("m1"), movie("m2")];
    let errors = loader(&server, 50, 0).load(&records).await.unwrap();

    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].id, "m1");
    assert!(errors[0].reason.contains("imdb_rating"));
}

#[tokio::test]
async fn test_ensure_index_creates_once() {
    let server = MockServer::start().await;

    Mock::given(method("PUT"))
        .and(path("/movies"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"acknowledged": true})))
        .expect(1)
        .mount(&server)
        .await;

    loader(&server, 50, 0).ensure_index().await.unwrap();
}

#[tokio::test]
async fn test_ensure_index_tolerates_existing_index() {
    let server = MockServer::start().await;

    Mock::given(method("PUT"))
        .and(path("/movies"))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({
            "error": {"type": "resource_already_exists_exception"}
        })))
        .mount(&server)
        .await;

    loader(&server, 50, 0).ensure_index().await.unwrap();
}

#[tokio::test]
async fn test_transient_failures_retried_then_fatal() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/movies/_bulk"))
        .respond_with(ResponseTemplate::new(503))
        .expect(3) // initial attempt + 2 retries
        .mount(&server)
        .await;

    let err = loader(&server, 50, 2)
        .load(&[movie("m0")])
        .await
        .unwrap_err();

    assert!(matches!(err, EtlError::TargetUnavailable(_)));
}

#[tokio::test]
async fn test_transient_failure_recovers_within_bound() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/movies/_bulk"))
        .respond_with(ResponseTemplate::new(502))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/movies/_bulk"))
        .respond_with(bulk_ok())
        .mount(&server)
        .await;

    let errors = loader(&server, 50, 2).load(&[movie("m0")]).await.unwrap();
    assert!(errors.is_empty());
}
