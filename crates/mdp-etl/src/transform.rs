//! Normalization of raw movie rows into index-ready documents
//!
//! Every rule here is independently testable: rating coercion, CSV-to-list
//! conversion, name collection, and the writers merge. The produced document
//! always carries every field the index schema declares; absent source data
//! maps to a defined default (`0.0`, `""`, `[]`), never an unset field.

use std::collections::HashSet;
use std::sync::Arc;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::{EtlError, Result};
use crate::extract::{MovieRow, PeopleLookup, Person, PersonGroup, RawMovie};

/// Sentinel the source uses for "no data" in loosely-typed text fields.
const NO_DATA: &str = "N/A";

/// A person reference inside an index document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersonDoc {
    pub id: String,
    /// `None` when the source had no usable name for this person.
    pub name: Option<String>,
}

/// The normalized, index-ready movie document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Movie {
    pub id: String,
    pub title: String,
    pub description: String,
    pub imdb_rating: f64,
    pub genre: Vec<String>,
    pub director: Vec<String>,
    pub actors: Vec<PersonDoc>,
    pub actors_names: Vec<String>,
    pub writers: Vec<PersonDoc>,
    pub writers_names: Vec<String>,
}

/// Embedded writer reference as serialized inside the `writers` column.
#[derive(Debug, Deserialize)]
struct WriterRef {
    id: String,
}

/// Turns raw rows into [`Movie`] documents.
///
/// Writers are referenced by id inside the raw row; the transformer resolves
/// them through the [`PeopleLookup`] seam so the document always carries the
/// current rows, not whatever names the row may have embedded.
#[derive(Clone)]
pub struct Transformer {
    lookup: Arc<dyn PeopleLookup>,
    rating_re: Regex,
}

impl Transformer {
    pub fn new(lookup: Arc<dyn PeopleLookup>) -> Self {
        Self {
            lookup,
            // First decimal-looking substring; downstream sorting and
            // filtering depend on this exact rule.
            rating_re: Regex::new(r"\d+\.\d+").expect("rating pattern is valid"),
        }
    }

    /// Normalize one raw movie into an index document.
    ///
    /// An unexpected shape in the record (malformed embedded writers) is a
    /// local [`EtlError::Transform`]; the caller skips the record and keeps
    /// the run going.
    pub async fn transform(&self, raw: &RawMovie) -> Result<Movie> {
        let row = &raw.row;

        let writer_ids = embedded_writer_ids(row).map_err(|reason| EtlError::Transform {
            id: row.id.clone(),
            reason,
        })?;
        let writers = self
            .lookup
            .people_by_ids(PersonGroup::Writers, &writer_ids)
            .await?;

        Ok(Movie {
            id: row.id.clone(),
            title: clean_scalar(row.title.as_deref()),
            description: clean_scalar(row.description.as_deref()),
            imdb_rating: self.extract_rating(row.imdb_rating.as_deref()),
            genre: split_csv_list(row.genre.as_deref()),
            director: split_csv_list(row.director.as_deref()),
            actors_names: collect_names(&raw.actors),
            writers_names: collect_names(&writers),
            actors: to_person_docs(&raw.actors),
            writers: to_person_docs(&writers),
        })
    }

    /// Coerce the loosely-typed rating text to a number.
    ///
    /// Takes the first decimal-looking substring; anything without one
    /// (including the `N/A` sentinel) defaults to `0.0`.
    pub fn extract_rating(&self, raw: Option<&str>) -> f64 {
        raw.and_then(|value| self.rating_re.find(value))
            .and_then(|found| found.as_str().parse().ok())
            .unwrap_or(0.0)
    }
}

impl std::fmt::Debug for Transformer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Transformer").finish_non_exhaustive()
    }
}

/// Writer ids referenced by the raw row, in embedded order, deduplicated.
///
/// The JSON `writers` list wins; the single `writer` column is only consulted
/// when the list is absent or empty. Only the ids are taken; any embedded
/// names may be stale and are re-resolved against the source.
fn embedded_writer_ids(row: &MovieRow) -> std::result::Result<Vec<String>, String> {
    let mut ids = Vec::new();

    if let Some(raw) = row
        .writers
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty() && *s != NO_DATA)
    {
        let refs: Vec<WriterRef> = serde_json::from_str(raw)
            .map_err(|err| format!("malformed writers payload: {err}"))?;
        ids.extend(refs.into_iter().map(|w| w.id));
    }

    if ids.is_empty() {
        if let Some(writer) = row
            .writer
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty() && *s != NO_DATA)
        {
            ids.push(writer.to_string());
        }
    }

    let mut seen = HashSet::new();
    ids.retain(|id| seen.insert(id.clone()));
    Ok(ids)
}

/// Split a comma-separated text field into a list.
///
/// The `N/A` sentinel (or an empty value) maps to an empty list; the sentinel
/// itself never appears inside a produced list.
pub fn split_csv_list(raw: Option<&str>) -> Vec<String> {
    match raw.map(str::trim) {
        None | Some("") | Some(NO_DATA) => Vec::new(),
        Some(value) => value
            .split(',')
            .map(|item| item.trim().to_string())
            .filter(|item| !item.is_empty() && item != NO_DATA)
            .collect(),
    }
}

/// Collect person names in extraction order.
///
/// Absent names are filtered out; absent entities were never fetched, so the
/// list reflects exactly the people the source still knows a name for.
pub fn collect_names(people: &[Person]) -> Vec<String> {
    people
        .iter()
        .filter_map(|person| normalize_name(person.name.as_deref()))
        .collect()
}

fn to_person_docs(people: &[Person]) -> Vec<PersonDoc> {
    people
        .iter()
        .map(|person| PersonDoc {
            id: person.id.clone(),
            name: normalize_name(person.name.as_deref()),
        })
        .collect()
}

fn normalize_name(name: Option<&str>) -> Option<String> {
    name.map(str::trim)
        .filter(|s| !s.is_empty() && *s != NO_DATA)
        .map(str::to_string)
}

fn clean_scalar(raw: Option<&str>) -> String {
    match raw.map(str::trim) {
        None | Some("") | Some(NO_DATA) => String::new(),
        Some(value) => value.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::collections::HashMap;

    /// Lookup double resolving ids from a fixed map.
    struct MapLookup(HashMap<String, Option<String>>);

    #[async_trait]
    impl PeopleLookup for MapLookup {
        async fn people_by_ids(
            &self,
            _group: PersonGroup,
            ids: &[String],
        ) -> Result<Vec<Person>> {
            let mut found: Vec<Person> = ids
                .iter()
                .filter_map(|id| {
                    self.0.get(id).map(|name| Person {
                        id: id.clone(),
                        name: name.clone(),
                    })
                })
                .collect();
            found.sort_by(|a, b| a.id.cmp(&b.id));
            Ok(found)
        }
    }

    fn raw_movie(row: MovieRow, actors: Vec<Person>) -> RawMovie {
        RawMovie { row, actors }
    }

    fn base_row() -> MovieRow {
        MovieRow {
            id: "tt0000001".to_string(),
            title: Some("Carmencita".to_string()),
            description: Some("A short film".to_string()),
            genre: Some("Documentary, Short".to_string()),
            director: Some("William K.L. Dickson".to_string()),
            imdb_rating: Some("5.7".to_string()),
            writer: None,
            writers: None,
        }
    }

    fn transformer() -> Transformer {
        Transformer::new(Arc::new(MapLookup(HashMap::new())))
    }

    #[test]
    fn test_rating_with_denominator() {
        assert_eq!(transformer().extract_rating(Some("8.5/10")), 8.5);
    }

    #[test]
    fn test_rating_sentinel_defaults_to_zero() {
        assert_eq!(transformer().extract_rating(Some("N/A")), 0.0);
    }

    #[test]
    fn test_rating_absent_defaults_to_zero() {
        assert_eq!(transformer().extract_rating(None), 0.0);
    }

    #[test]
    fn test_rating_plain_decimal() {
        assert_eq!(transformer().extract_rating(Some("9.1")), 9.1);
    }

    #[test]
    fn test_rating_takes_first_decimal() {
        assert_eq!(transformer().extract_rating(Some("7.2 (was 6.9)")), 7.2);
    }

    #[test]
    fn test_csv_list_basic() {
        assert_eq!(
            split_csv_list(Some("Action, Horror")),
            vec!["Action".to_string(), "Horror".to_string()]
        );
    }

    #[test]
    fn test_csv_list_sentinel_is_empty() {
        assert!(split_csv_list(Some("N/A")).is_empty());
        assert!(split_csv_list(Some("")).is_empty());
        assert!(split_csv_list(None).is_empty());
    }

    #[test]
    fn test_csv_list_never_contains_sentinel() {
        assert_eq!(
            split_csv_list(Some("Action, N/A, Horror")),
            vec!["Action".to_string(), "Horror".to_string()]
        );
    }

    #[test]
    fn test_collect_names_filters_absent() {
        let people = vec![
            Person {
                id: "1".to_string(),
                name: Some("Greta Gerwig".to_string()),
            },
            Person {
                id: "2".to_string(),
                name: None,
            },
            Person {
                id: "3".to_string(),
                name: Some("N/A".to_string()),
            },
        ];
        assert_eq!(collect_names(&people), vec!["Greta Gerwig".to_string()]);
    }

    #[tokio::test]
    async fn test_transform_resolves_writers_from_lookup() {
        // The embedded payload carries a stale name; only the id is used.
        let lookup = MapLookup(HashMap::from([
            ("w1".to_string(), Some("Fresh Name".to_string())),
            ("w2".to_string(), Some("Second Writer".to_string())),
        ]));
        let transformer = Transformer::new(Arc::new(lookup));

        let mut row = base_row();
        row.writers = Some(
            r#"[{"id": "w1", "name": "Stale Name"}, {"id": "w2"}, {"id": "w1"}]"#.to_string(),
        );

        let movie = transformer.transform(&raw_movie(row, vec![])).await.unwrap();

        assert_eq!(
            movie.writers_names,
            vec!["Fresh Name".to_string(), "Second Writer".to_string()]
        );
        // Duplicated embedded references resolve once.
        assert_eq!(movie.writers.len(), 2);
    }

    #[tokio::test]
    async fn test_transform_falls_back_to_single_writer_column() {
        let lookup = MapLookup(HashMap::from([(
            "w9".to_string(),
            Some("Lone Writer".to_string()),
        )]));
        let transformer = Transformer::new(Arc::new(lookup));

        let mut row = base_row();
        row.writer = Some("w9".to_string());

        let movie = transformer.transform(&raw_movie(row, vec![])).await.unwrap();
        assert_eq!(movie.writers_names, vec!["Lone Writer".to_string()]);
    }

    #[tokio::test]
    async fn test_transform_missing_writer_resolves_to_absence() {
        let transformer = transformer();

        let mut row = base_row();
        row.writers = Some(r#"[{"id": "missing"}]"#.to_string());

        let movie = transformer.transform(&raw_movie(row, vec![])).await.unwrap();
        assert!(movie.writers.is_empty());
        assert!(movie.writers_names.is_empty());
    }

    #[tokio::test]
    async fn test_transform_malformed_writers_is_local_error() {
        let transformer = transformer();

        let mut row = base_row();
        row.writers = Some("not json".to_string());

        let err = transformer
            .transform(&raw_movie(row, vec![]))
            .await
            .unwrap_err();
        assert!(matches!(err, EtlError::Transform { ref id, .. } if id == "tt0000001"));
    }

    #[tokio::test]
    async fn test_transform_full_document_shape() {
        let transformer = transformer();

        let mut row = base_row();
        row.imdb_rating = Some("N/A".to_string());
        row.description = None;

        let actors = vec![
            Person {
                id: "10".to_string(),
                name: Some("First Actor".to_string()),
            },
            Person {
                id: "11".to_string(),
                name: Some("N/A".to_string()),
            },
        ];

        let movie = transformer.transform(&raw_movie(row, actors)).await.unwrap();

        assert_eq!(movie.id, "tt0000001");
        assert_eq!(movie.imdb_rating, 0.0);
        assert_eq!(movie.description, "");
        assert_eq!(movie.genre, vec!["Documentary".to_string(), "Short".to_string()]);
        // Both actor entities survive; only the usable name reaches the list.
        assert_eq!(movie.actors.len(), 2);
        assert_eq!(movie.actors[1].name, None);
        assert_eq!(movie.actors_names, vec!["First Actor".to_string()]);
    }
}
