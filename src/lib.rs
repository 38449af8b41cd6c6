//! # Dataset Registry
//!
//! Tracks named datasets, their versioned file artifacts, computed statistics
//! and quality metrics, and group-based access control.
//!
//! ## Quick Start
//!
//! ```no_run
//! use dataset_registry::config::RegistryConfig;
//! use dataset_registry::registry::{DatasetRegistry, NewDataset};
//! use std::path::Path;
//!
//! # fn example() -> dataset_registry::error::Result<()> {
//! let registry = DatasetRegistry::open(RegistryConfig::rooted_at(Path::new("data")))?;
//! let alice = registry.register_user("alice", None)?;
//! let dataset = registry.create_dataset(NewDataset::new("sales"), &alice.id)?;
//! registry.add_version(&dataset.id, "1.0", Path::new("sales.jsonl"), &alice.id, None)?;
//!
//! let report = registry.get_statistics(&dataset.id, None, false, &alice.id)?;
//! for (column, kind) in &report.statistics.data_types {
//!     println!("{column}: {}", kind.as_str());
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ## Core Modules
//!
//! - [`registry`]: the catalog, access control, version store, diffing, search
//!   and archives
//! - [`profiling`]: statistics and quality metrics of NDJSON files
//! - [`integrity`]: SHA-256 hashing of stored files
//! - [`config`]: JSON configuration with defaults
//! - [`logging`]: `tracing` subscriber setup
//! - [`error`]: error types and handling utilities
//! - [`utils`]: formatting helpers for terminal output
//!
//! ## Versions Are Immutable
//!
//! Adding a version copies the source file into the store and records its
//! digest. Stored files are never modified; only the cached quality metrics of
//! a version change afterwards.

#![warn(clippy::all, rust_2018_idioms)]

pub mod config;
pub mod error;
pub mod integrity;
pub mod logging;
pub mod profiling;
pub mod registry;
pub mod utils;
