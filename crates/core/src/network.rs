//! The network collaborator.

use async_trait::async_trait;

use crate::Error;
use crate::http::{Request, Response};

/// Performs real fetches on behalf of the controller.
///
/// Any HTTP status is a successful fetch; only transport failures (no
/// connection, timeout, oversize body) are errors.
#[async_trait]
pub trait Network: Send + Sync {
    async fn fetch(&self, request: &Request) -> Result<Response, Error>;
}
