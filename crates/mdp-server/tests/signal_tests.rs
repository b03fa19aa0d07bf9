//! Integration tests for the signal routes.

use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use http_body_util::BodyExt;
use serde_json::{json, Value};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use tempfile::TempDir;
use tokio::sync::Mutex;
use tower::ServiceExt;
use wiremock::matchers::method;
use wiremock::{Mock, MockServer, ResponseTemplate};

use mdp_etl::{
    BulkLoader, Etl, EtlRunner, JsonFileStorage, LoaderConfig, MovieExtractor, State, Transformer,
};
use mdp_server::{create_router, AppState};

/// Minimal wired app: empty temp source, stubbed index, one stream.
async fn test_app() -> (axum::Router, TempDir, MockServer) {
    let dir = tempfile::tempdir().expect("tempdir");

    let options = SqliteConnectOptions::new()
        .filename(dir.path().join("movies.sqlite"))
        .create_if_missing(true);
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect_with(options)
        .await
        .expect("sqlite pool");
    sqlx::raw_sql(
        r#"
        CREATE TABLE movies (
            id TEXT PRIMARY KEY, title TEXT, plot TEXT, genre TEXT,
            director TEXT, imdb_rating TEXT, writer TEXT, writers TEXT
        );
        CREATE TABLE actors (id INTEGER PRIMARY KEY, name TEXT);
        CREATE TABLE movie_actors (movie_id TEXT, actor_id INTEGER);
        CREATE TABLE writers (id TEXT PRIMARY KEY, name TEXT);
        "#,
    )
    .execute(&pool)
    .await
    .expect("create schema");

    let server = MockServer::start().await;
    Mock::given(method("PUT"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"acknowledged": true})))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({"took": 1, "errors": false, "items": []})),
        )
        .mount(&server)
        .await;

    let extractor = MovieExtractor::new(pool, Duration::from_secs(5));
    let transformer = Transformer::new(Arc::new(extractor.clone()));
    let loader = BulkLoader::new(
        reqwest::Client::new(),
        &server.uri(),
        "movies",
        LoaderConfig {
            batch_size: 50,
            max_retries: 0,
            retry_backoff: Duration::from_millis(10),
        },
    )
    .expect("loader");
    let storage = JsonFileStorage::new(dir.path().join("state.json"));
    let state = State::new(Box::new(storage)).await.expect("state");

    let etl = Etl::new(
        "filmwork",
        extractor,
        transformer,
        loader,
        Arc::new(Mutex::new(state)),
        50,
        500,
    );

    let app = create_router(AppState {
        runner: Arc::new(EtlRunner::new(vec![etl])),
    });

    (app, dir, server)
}

async fn body_json(response: axum::response::Response) -> Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn test_signal_accepted_for_known_stream() {
    let (app, _dir, _server) = test_app().await;

    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/signal/filmwork")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::ACCEPTED);
    let body = body_json(response).await;
    assert_eq!(body["result"], "Signal accepted");
    assert_eq!(body["error"], false);
}

#[tokio::test]
async fn test_unknown_stream_rejected() {
    let (app, _dir, _server) = test_app().await;

    let response = app
        .oneshot(
            Request::builder()
                .uri("/signal/series")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    let body = body_json(response).await;
    assert_eq!(body["error"]["status"], 404);
    assert!(body["error"]["message"]
        .as_str()
        .unwrap()
        .contains("unknown stream"));
}

#[tokio::test]
async fn test_health_endpoint() {
    let (app, _dir, _server) = test_app().await;

    let response = app
        .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_root_lists_streams() {
    let (app, _dir, _server) = test_app().await;

    let response = app
        .oneshot(Request::builder().uri("/").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["streams"][0]["stream"], "filmwork");
    assert_eq!(body["streams"][0]["status"], "idle");
}
