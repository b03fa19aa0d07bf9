//! Source extraction from the movie database
//!
//! Reads movie rows changed since a watermark, plus the joined dependents
//! (actors via the link table, writers resolved later from ids embedded in
//! the row). All queries are parameterized; id sets go through
//! [`sqlx::QueryBuilder`] bindings, never string-built predicates.
//!
//! Watermark semantics: rows are scanned in id order, so the watermark is the
//! last-processed id and `id > watermark` captures rows appended since the
//! previous run. The source schema carries no update timestamp, so in-place
//! updates are only picked up by a full rescan (run with no watermark),
//! the documented fallback for sources that cannot express true incremental
//! change.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sqlx::sqlite::SqlitePool;
use sqlx::QueryBuilder;

use crate::error::{EtlError, Result};

/// One related person row (actor or writer) as stored in the source.
///
/// A related entity with no usable name keeps its id and an absent name; a
/// missing row is simply absent from the result, never an error.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Person {
    pub id: String,
    pub name: Option<String>,
}

/// Which grouped relation a person lookup resolves against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PersonGroup {
    Actors,
    Writers,
}

impl PersonGroup {
    fn table(self) -> &'static str {
        match self {
            PersonGroup::Actors => "actors",
            PersonGroup::Writers => "writers",
        }
    }
}

/// Batch-resolve person rows for an id set.
///
/// The seam between the transformer and the source: the transform may need a
/// second round-trip for dependents the raw row only references by id.
#[async_trait]
pub trait PeopleLookup: Send + Sync {
    async fn people_by_ids(&self, group: PersonGroup, ids: &[String]) -> Result<Vec<Person>>;
}

/// One unprocessed movie row plus its joined aggregates.
///
/// Owned transiently: produced by the extractor, passed to the transformer,
/// discarded after the transform.
#[derive(Debug, Clone)]
pub struct RawMovie {
    pub row: MovieRow,
    /// Actors joined through the link table, in id order.
    pub actors: Vec<Person>,
}

/// The raw `movies` row as stored in the source.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct MovieRow {
    pub id: String,
    pub title: Option<String>,
    /// `plot` column, aliased in the query.
    pub description: Option<String>,
    /// Comma-separated genre list, `N/A` when absent.
    pub genre: Option<String>,
    /// Comma-separated director list, `N/A` when absent.
    pub director: Option<String>,
    /// Loosely-typed rating text, e.g. `"8.5"` or `"N/A"`.
    pub imdb_rating: Option<String>,
    /// Single writer id, used when `writers` is empty.
    pub writer: Option<String>,
    /// JSON-encoded list of `{"id": ...}` writer references.
    pub writers: Option<String>,
}

/// Forward-only pages of changed movie ids.
///
/// Keyset pagination keeps memory bounded for large sources; each page is
/// fetched on demand and the cursor only moves forward.
pub struct ChangedIdPages<'a> {
    extractor: &'a MovieExtractor,
    cursor: Option<String>,
    page_size: usize,
    done: bool,
}

impl ChangedIdPages<'_> {
    /// Fetch the next page of ids. An empty page means the scan is finished.
    pub async fn next_page(&mut self) -> Result<Vec<String>> {
        if self.done {
            return Ok(Vec::new());
        }

        let ids = self
            .extractor
            .ids_after(self.cursor.as_deref(), self.page_size)
            .await?;

        if let Some(last) = ids.last() {
            self.cursor = Some(last.clone());
        }
        if ids.len() < self.page_size {
            self.done = true;
        }

        Ok(ids)
    }
}

/// Extracts movie data from the source database.
///
/// The connection pool is injected at construction; its lifecycle is owned by
/// the orchestrator.
#[derive(Debug, Clone)]
pub struct MovieExtractor {
    pool: SqlitePool,
    timeout: Duration,
}

impl MovieExtractor {
    pub fn new(pool: SqlitePool, timeout: Duration) -> Self {
        Self { pool, timeout }
    }

    /// Ids of movies changed since the given watermark, in id order.
    ///
    /// `since: None` performs the full-rescan fallback.
    pub fn changed_ids(&self, since: Option<String>, page_size: usize) -> ChangedIdPages<'_> {
        ChangedIdPages {
            extractor: self,
            cursor: since,
            page_size,
            done: false,
        }
    }

    /// Fetch one movie row plus its joined actors.
    ///
    /// Returns `Ok(None)` when the id no longer exists in the source.
    pub async fn fetch_raw(&self, movie_id: &str) -> Result<Option<RawMovie>> {
        let row = self
            .query(
                sqlx::query_as::<_, MovieRow>(
                    r#"
                    SELECT id, title, plot AS description, genre, director,
                           imdb_rating, writer, writers
                    FROM movies
                    WHERE id = ?
                    "#,
                )
                .bind(movie_id)
                .fetch_optional(&self.pool),
            )
            .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        let actors = self
            .query(
                sqlx::query_as::<_, Person>(
                    r#"
                    SELECT CAST(a.id AS TEXT) AS id, a.name
                    FROM actors a
                    JOIN movie_actors ma ON ma.actor_id = a.id
                    WHERE ma.movie_id = ?
                    ORDER BY a.id ASC
                    "#,
                )
                .bind(movie_id)
                .fetch_all(&self.pool),
            )
            .await?;

        Ok(Some(RawMovie { row, actors }))
    }

    async fn ids_after(&self, cursor: Option<&str>, limit: usize) -> Result<Vec<String>> {
        let query = match cursor {
            Some(cursor) => sqlx::query_scalar::<_, String>(
                "SELECT id FROM movies WHERE id > ? ORDER BY id ASC LIMIT ?",
            )
            .bind(cursor.to_string())
            .bind(limit as i64),
            None => sqlx::query_scalar::<_, String>(
                "SELECT id FROM movies ORDER BY id ASC LIMIT ?",
            )
            .bind(limit as i64),
        };

        self.query(query.fetch_all(&self.pool)).await
    }

    /// Run a source query under the configured timeout.
    async fn query<T>(
        &self,
        fut: impl std::future::Future<Output = std::result::Result<T, sqlx::Error>>,
    ) -> Result<T> {
        match tokio::time::timeout(self.timeout, fut).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(err)) => Err(EtlError::SourceUnavailable(err.to_string())),
            Err(_) => Err(EtlError::SourceUnavailable(format!(
                "source query timed out after {:?}",
                self.timeout
            ))),
        }
    }
}

#[async_trait]
impl PeopleLookup for MovieExtractor {
    async fn people_by_ids(&self, group: PersonGroup, ids: &[String]) -> Result<Vec<Person>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let mut builder = QueryBuilder::<sqlx::Sqlite>::new("SELECT CAST(id AS TEXT) AS id, name FROM ");
        builder.push(group.table());
        builder.push(" WHERE id IN (");
        let mut separated = builder.separated(", ");
        for id in ids {
            separated.push_bind(id);
        }
        separated.push_unseparated(")");
        builder.push(" ORDER BY id ASC");

        self.query(builder.build_query_as::<Person>().fetch_all(&self.pool))
            .await
    }
}
