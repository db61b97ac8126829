//! Piwigo web-service API: wire models and an authenticated client.

pub mod client;
pub mod model;

pub use client::{Client, PiwigoError};
pub use model::{Envelope, GetImagesResult, Image, Paging};
