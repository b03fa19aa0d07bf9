//! MDP Server Library
//!
//! HTTP signal server for the movie data pipeline.
//!
//! # Overview
//!
//! Exposes the pipeline's trigger surface over HTTP: a signal names one of
//! the configured streams (`filmwork`, `genre`, `person` by default) and
//! requests an immediate ETL run for it. Concurrent signals for the same
//! stream are serialized and coalesced by the runner; the server itself stays
//! stateless apart from the shared [`EtlRunner`] handle.
//!
//! [`EtlRunner`]: mdp_etl::EtlRunner

pub mod config;
pub mod error;
pub mod routes;

// Re-export commonly used types
pub use config::ServerConfig;
pub use error::AppError;
pub use routes::{create_router, AppState};
