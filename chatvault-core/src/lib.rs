//! # chatvault-core
//!
//! Core library for chatvault - a chat workspace intelligence cache.
//!
//! This library provides:
//! - Domain types for messages, users, and issue tickets
//! - A rate-limited chat API client with bounded concurrency
//! - A partitioned Parquet storage layer (writer + reader)
//! - Thread reconstruction and view formatting over flat rows
//! - Configuration management and logging infrastructure
//!
//! ## Architecture
//!
//! Data flows through three stages:
//! - **Ingest:** paginated channel history plus thread expansion, with a
//!   single-flight user cache in front of the `users.info` endpoint
//! - **Persist:** one Snappy-Parquet file per `(entity, dt, channel)`
//!   partition, keyed by the message's own UTC date
//! - **Read:** partition pruning, thread reconstruction from flat rows, and
//!   mention-resolved text views
//!
//! ## Example
//!
//! ```rust,no_run
//! use chatvault_core::store::{ParquetWriter, PartitionReader};
//! use chatvault_core::threads::reconstruct;
//!
//! let reader = PartitionReader::new("cache/raw");
//! let rows = reader.read_channel("engineering", "2025-10-20").expect("read");
//! let threads = reconstruct(rows);
//! ```

// Re-export commonly used items at the crate root
pub use config::{ChatCredentials, Config, IssueCredentials, TokenKind};
pub use error::{Error, Result};
pub use ingest::{CacheCoordinator, CacheOptions, CacheRunResult};
pub use types::*;

// Public modules
pub mod cache;
pub mod client;
pub mod config;
pub mod enrich;
pub mod error;
pub mod fetcher;
pub mod ingest;
pub mod logging;
pub mod mentions;
pub mod store;
pub mod threads;
pub mod types;
pub mod view;
pub mod window;
