//! Target index schema
//!
//! The mapping shipped with the loader and applied through the idempotent
//! index bootstrap. `dynamic: strict` keeps documents honest: every field the
//! transformer produces is declared here, and nothing else is accepted.

use serde_json::{json, Value};

/// Mapping body for the movies index.
pub fn movies_index() -> Value {
    json!({
        "settings": {
            "refresh_interval": "1s",
            "analysis": {
                "filter": {
                    "english_stop": {
                        "type": "stop",
                        "stopwords": "_english_"
                    },
                    "english_stemmer": {
                        "type": "stemmer",
                        "language": "english"
                    },
                    "english_possessive_stemmer": {
                        "type": "stemmer",
                        "language": "possessive_english"
                    }
                },
                "analyzer": {
                    "en_text": {
                        "tokenizer": "standard",
                        "filter": [
                            "lowercase",
                            "english_possessive_stemmer",
                            "english_stop",
                            "english_stemmer"
                        ]
                    }
                }
            }
        },
        "mappings": {
            "dynamic": "strict",
            "properties": {
                "id": {"type": "keyword"},
                "title": {
                    "type": "text",
                    "analyzer": "en_text",
                    "fields": {
                        "raw": {"type": "keyword"}
                    }
                },
                "description": {"type": "text", "analyzer": "en_text"},
                "imdb_rating": {"type": "float"},
                "genre": {"type": "keyword"},
                "director": {"type": "text", "analyzer": "en_text"},
                "actors_names": {"type": "text", "analyzer": "en_text"},
                "writers_names": {"type": "text", "analyzer": "en_text"},
                "actors": {
                    "type": "nested",
                    "dynamic": "strict",
                    "properties": {
                        "id": {"type": "keyword"},
                        "name": {"type": "text", "analyzer": "en_text"}
                    }
                },
                "writers": {
                    "type": "nested",
                    "dynamic": "strict",
                    "properties": {
                        "id": {"type": "keyword"},
                        "name": {"type": "text", "analyzer": "en_text"}
                    }
                }
            }
        }
    })
}
