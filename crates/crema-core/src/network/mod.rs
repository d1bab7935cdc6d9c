//! Network access for the worker.
//!
//! This module provides:
//! - the [`Fetcher`] capability trait
//! - a reqwest-backed implementation with timeouts
//! - exponential backoff used when retrying registration

mod client;
mod fetcher;
mod retry;

pub use client::{is_hop_by_hop, HttpFetcher};
pub use fetcher::Fetcher;
pub use retry::{retry_async, RetryConfig, RetryStats};
