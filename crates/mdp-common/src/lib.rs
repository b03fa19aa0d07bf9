//! MDP Common Library
//!
//! Shared infrastructure for the MDP (movie data pipeline) workspace.
//!
//! # Overview
//!
//! This crate provides functionality used across all MDP workspace members:
//!
//! - **Logging**: Centralized `tracing` initialization with configurable
//!   level, format, and output target
//!
//! # Example
//!
//! ```no_run
//! use mdp_common::logging::{init_logging, LogConfig};
//!
//! fn main() -> anyhow::Result<()> {
//!     let config = LogConfig::from_env()?;
//!     init_logging(&config)?;
//!     tracing::info!("Application started");
//!     Ok(())
//! }
//! ```

pub mod logging;

pub use logging::{init_logging, LogConfig};
