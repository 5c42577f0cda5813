//! # mtar Core Library
//!
//! This crate provides the core functionality for the `mtar` deduplicating
//! archiver: byte-identical files are stored once, compressed, and referenced
//! by content fingerprint from an ordered entry index.
//!
//! It is designed to be used by the `mtar` command-line application, but its
//! public API can also be used to programmatically create, inspect, verify and
//! extract `.mtar` archives.
//!
//! ## Key Modules
//!
//! - [`hash`]: BLAKE3 content fingerprints.
//! - [`compress`]: Block compression using `zstd`, with a raw fallback.
//! - [`store`]: The content-addressed block store.
//! - [`walk`]: Ordered traversal of a source tree.
//! - [`archive`]: The archive model and the on-disk container format.
//! - [`workers`]: The parallel create pipeline.
//! - [`extract`]: Listing, extraction and verification.
//!
//! ## Examples
//!
//! ```no_run
//! use std::path::Path;
//! use mtar::{create_archive, extract_archive, CreateOptions, ExtractOptions};
//!
//! # fn main() -> Result<(), mtar::ArchiverError> {
//! create_archive(Path::new("backup.mtar"), Path::new("project"), &CreateOptions::default())?;
//! extract_archive(Path::new("backup.mtar"), Path::new("restored"), &ExtractOptions::default())?;
//! # Ok(())
//! # }
//! ```

pub mod archive;
pub mod cli;
pub mod cli_runner;
pub mod compress;
pub mod error;
pub mod extract;
pub mod hash;
pub mod store;
pub mod walk;
pub mod workers;

// Cross-platform filesystem wrapper
pub mod fsx;

pub use error::ArchiverError;
pub use extract::{extract_archive, list_archive, verify_archive, ExtractOptions, ExtractSummary, VerifyReport};
pub use workers::{create_archive, CreateOptions, CreateSummary};
