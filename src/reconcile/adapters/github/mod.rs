//! GitHub adapters: REST hosting client and webhook payload decoding.

mod client;
mod models;
mod payload;

pub use client::{DEFAULT_API_BASE, GitHubRestClient};
pub use payload::{PayloadError, parse_webhook};
