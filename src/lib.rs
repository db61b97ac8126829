//! piwigo-dl core library
//!
//! Downloads Piwigo photo albums to the local filesystem, resuming
//! interrupted transfers and skipping files that are already current.
//!
//! # Architecture
//!
//! The library is organized into the following modules:
//! - [`fetch`] - Resumable, cache-aware HTTP download of single files
//! - [`piwigo`] - Piwigo web-service API client and wire models
//! - [`album`] - Album listing and per-image download orchestration

// Clippy lints - strict for library code
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod album;
pub mod fetch;
pub mod piwigo;

// Re-export commonly used types
pub use album::{AlbumError, AlbumImage, AlbumStats, download_album, list_album};
pub use fetch::{FetchError, FetchOutcome, Fetcher, PartialMetadata, TempRecord};
pub use piwigo::{Client, PiwigoError};
