//! Resumable, cache-aware HTTP download of a single file.
//!
//! The module is split along the seams a fetch call crosses:
//!
//! - [`metadata`]: the fixed header format of the partial-download file
//! - [`record`]: an owned handle over the open partial-download file
//! - [`decision`]: the pure table mapping local state to an action
//! - [`fetcher`]: the HTTP state machine driving a single fetch call
//! - [`publish`]: atomic promotion of a staged payload to its destination

pub mod decision;
pub mod error;
pub mod fetcher;
pub mod metadata;
pub mod publish;
pub mod record;

pub use decision::{Action, plan};
pub use error::FetchError;
pub use fetcher::{FetchOutcome, Fetcher, PART_SUFFIX, part_path};
pub use metadata::PartialMetadata;
pub use publish::{STAGING_SUFFIX, publish, staging_path};
pub use record::TempRecord;
