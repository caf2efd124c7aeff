//! The storage seam the controller is written against.

use async_trait::async_trait;

use super::connection::CacheDb;
use crate::Error;
use crate::http::{Request, Response};

/// Named, versioned response caches.
///
/// Implementations must tolerate concurrent calls from independent fetch
/// handlers; writes are whole-entry overwrites so no read-modify-write is
/// ever required of them.
#[async_trait]
pub trait CacheStorage: Send + Sync {
    /// Open a generation, creating it if absent.
    async fn open(&self, name: &str) -> Result<(), Error>;

    async fn has(&self, name: &str) -> Result<bool, Error>;

    /// Generation names in creation order.
    async fn keys(&self) -> Result<Vec<String>, Error>;

    /// Delete a generation; false if it did not exist.
    async fn delete(&self, name: &str) -> Result<bool, Error>;

    async fn match_request(&self, name: &str, request: &Request) -> Result<Option<Response>, Error>;

    /// Store into an existing generation; `NotInstalled` if it is gone.
    async fn put(&self, name: &str, request: &Request, response: Response) -> Result<(), Error>;

    async fn entry_count(&self, name: &str) -> Result<u64, Error>;
}

#[async_trait]
impl CacheStorage for CacheDb {
    async fn open(&self, name: &str) -> Result<(), Error> {
        self.create_cache(name).await
    }

    async fn has(&self, name: &str) -> Result<bool, Error> {
        self.has_cache(name).await
    }

    async fn keys(&self) -> Result<Vec<String>, Error> {
        self.cache_names().await
    }

    async fn delete(&self, name: &str) -> Result<bool, Error> {
        self.delete_cache(name).await
    }

    async fn match_request(&self, name: &str, request: &Request) -> Result<Option<Response>, Error> {
        self.match_entry(name, request).await
    }

    async fn put(&self, name: &str, request: &Request, response: Response) -> Result<(), Error> {
        self.put_entry(name, request, &response).await
    }

    async fn entry_count(&self, name: &str) -> Result<u64, Error> {
        CacheDb::entry_count(self, name).await
    }
}
