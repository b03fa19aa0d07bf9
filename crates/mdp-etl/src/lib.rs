//! MDP ETL Library
//!
//! Incremental ETL core for the movie data pipeline: extracts changed rows
//! from the relational source, normalizes them into index documents, and bulk
//! loads them into the HTTP document index, resuming from per-stream
//! watermark checkpoints.
//!
//! # Architecture
//!
//! - **state**: pluggable checkpoint persistence (JSON file or in-process map)
//! - **extract**: id-ordered changed-row scan plus dependent lookups
//! - **transform**: normalization rules producing index-ready documents
//! - **load**: chunked `_bulk` shipping with per-record error reporting
//! - **pipeline**: run orchestration, watermark advancement, trigger surface
//!
//! # Example
//!
//! ```no_run
//! use mdp_etl::{EtlConfig, EtlRunner};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), mdp_etl::EtlError> {
//!     let config = EtlConfig::load()?;
//!     let runner = EtlRunner::from_config(&config).await?;
//!     let summary = runner.run_all().await;
//!     println!("loaded {} records", summary.records_loaded);
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod error;
pub mod extract;
pub mod load;
pub mod pipeline;
pub mod schema;
pub mod state;
pub mod transform;

// Re-export commonly used types
pub use config::EtlConfig;
pub use error::{EtlError, LoadError, Result};
pub use extract::{MovieExtractor, PeopleLookup, Person, PersonGroup, RawMovie};
pub use load::{BulkLoader, LoaderConfig};
pub use pipeline::{Etl, EtlRunner, RunReport, RunStatus, RunSummary, SharedState, TriggerOutcome};
pub use state::{Checkpoint, JsonFileStorage, MemoryStorage, State, StateStorage};
pub use transform::{Movie, PersonDoc, Transformer};
