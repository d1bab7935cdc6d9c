//! The network capability the worker fetches through.

use crate::error::Result;
use crate::request::{WorkerRequest, WorkerResponse};
use async_trait::async_trait;

/// Performs live fetches on behalf of the worker.
///
/// An `Err` means the network failed (unreachable, reset, timed out). HTTP
/// error statuses are successful fetches and come back as `Ok`.
#[async_trait]
pub trait Fetcher: Send + Sync {
    async fn fetch(&self, request: &WorkerRequest) -> Result<WorkerResponse>;
}
