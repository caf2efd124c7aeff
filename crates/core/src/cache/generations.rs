//! Cache generation and entry operations.
//!
//! A generation is a named map from request identity to the last response
//! stored for it. Entries are only ever overwritten whole or dropped with
//! their generation.

use std::collections::BTreeMap;

use super::connection::CacheDb;
use super::hash::compute_cache_key;
use crate::Error;
use crate::http::{Request, Response};
use tokio_rusqlite::params;
use tokio_rusqlite::rusqlite::{self, OptionalExtension};
use url::Url;

/// Summary row for a stored entry, without its body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryInfo {
    pub url: String,
    pub status: u16,
    pub size: usize,
    pub stored_at: String,
}

impl CacheDb {
    /// Create the named generation if it does not exist yet.
    pub async fn create_cache(&self, name: &str) -> Result<(), Error> {
        let name = name.to_string();
        let now = chrono::Utc::now().to_rfc3339();
        self.conn
            .call(move |conn| -> Result<(), Error> {
                conn.execute(
                    "INSERT INTO caches (name, created_at) VALUES (?1, ?2) ON CONFLICT(name) DO NOTHING",
                    params![name, now],
                )?;
                Ok(())
            })
            .await
            .map_err(Error::from)
    }

    pub async fn has_cache(&self, name: &str) -> Result<bool, Error> {
        let name = name.to_string();
        self.conn
            .call(move |conn| -> Result<bool, Error> {
                let exists = conn.query_row(
                    "SELECT EXISTS(SELECT 1 FROM caches WHERE name = ?1)",
                    params![name],
                    |row| row.get(0),
                )?;
                Ok(exists)
            })
            .await
            .map_err(Error::from)
    }

    /// All generation names in creation order.
    pub async fn cache_names(&self) -> Result<Vec<String>, Error> {
        self.conn
            .call(|conn| -> Result<Vec<String>, Error> {
                let mut stmt = conn.prepare("SELECT name FROM caches ORDER BY rowid ASC")?;
                let names = stmt
                    .query_map([], |row| row.get(0))?
                    .collect::<Result<Vec<String>, rusqlite::Error>>()?;
                Ok(names)
            })
            .await
            .map_err(Error::from)
    }

    /// Drop a generation and every entry in it.
    ///
    /// Returns false if no such generation existed.
    pub async fn delete_cache(&self, name: &str) -> Result<bool, Error> {
        let name = name.to_string();
        self.conn
            .call(move |conn| -> Result<bool, Error> {
                let deleted = conn.execute("DELETE FROM caches WHERE name = ?1", params![name])?;
                Ok(deleted > 0)
            })
            .await
            .map_err(Error::from)
    }

    /// Store `response` under the identity of `request`. Overwrites any
    /// previous entry for that identity.
    ///
    /// The generation must already exist: a write that lands after its
    /// generation was swept fails with `NOT_INSTALLED` instead of bringing
    /// the generation back.
    pub async fn put_entry(&self, name: &str, request: &Request, response: &Response) -> Result<(), Error> {
        if !request.is_get() {
            return Err(Error::InvalidInput(format!("cannot cache {} request", request.method)));
        }

        let name = name.to_string();
        let key = compute_cache_key(&request.method, &request.url);
        let method = request.method.to_ascii_uppercase();
        let url = request.url.to_string();
        let response_url = response.url.to_string();
        let status = response.status;
        let headers_json = serde_json::to_string(&response.headers)?;
        let body = response.body.to_vec();
        let now = chrono::Utc::now().to_rfc3339();

        self.conn
            .call(move |conn| -> Result<(), Error> {
                let tx = conn.transaction()?;
                let exists: bool =
                    tx.query_row("SELECT EXISTS(SELECT 1 FROM caches WHERE name = ?1)", params![&name], |row| {
                        row.get(0)
                    })?;
                if !exists {
                    return Err(Error::NotInstalled(name));
                }
                tx.execute(
                    "INSERT INTO entries (
                        cache_name, key, method, url, response_url, status, headers_json, body, stored_at
                    ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
                    ON CONFLICT(cache_name, key) DO UPDATE SET
                        method = excluded.method,
                        url = excluded.url,
                        response_url = excluded.response_url,
                        status = excluded.status,
                        headers_json = excluded.headers_json,
                        body = excluded.body,
                        stored_at = excluded.stored_at",
                    params![&name, &key, &method, &url, &response_url, status, &headers_json, &body, &now],
                )?;
                tx.commit()?;
                Ok(())
            })
            .await
            .map_err(Error::from)
    }

    /// Look up the stored response for `request` in one generation.
    pub async fn match_entry(&self, name: &str, request: &Request) -> Result<Option<Response>, Error> {
        let name = name.to_string();
        let key = compute_cache_key(&request.method, &request.url);

        let row = self
            .conn
            .call(move |conn| -> Result<Option<(String, u16, String, Vec<u8>)>, Error> {
                let row = conn
                    .query_row(
                        "SELECT response_url, status, headers_json, body
                         FROM entries WHERE cache_name = ?1 AND key = ?2",
                        params![name, key],
                        |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?)),
                    )
                    .optional()?;
                Ok(row)
            })
            .await
            .map_err(Error::from)?;

        let Some((response_url, status, headers_json, body)) = row else {
            return Ok(None);
        };

        let url = Url::parse(&response_url).map_err(|e| Error::InvalidUrl(format!("{response_url}: {e}")))?;
        let headers: BTreeMap<String, String> = serde_json::from_str(&headers_json)?;

        Ok(Some(Response { url, status, headers, body: body.into() }))
    }

    pub async fn entry_count(&self, name: &str) -> Result<u64, Error> {
        let name = name.to_string();
        self.conn
            .call(move |conn| -> Result<u64, Error> {
                let count: i64 =
                    conn.query_row("SELECT COUNT(*) FROM entries WHERE cache_name = ?1", params![name], |row| {
                        row.get(0)
                    })?;
                Ok(count as u64)
            })
            .await
            .map_err(Error::from)
    }

    /// List entries of a generation ordered by URL.
    pub async fn list_entries(&self, name: &str) -> Result<Vec<EntryInfo>, Error> {
        let name = name.to_string();
        self.conn
            .call(move |conn| -> Result<Vec<EntryInfo>, Error> {
                let mut stmt = conn.prepare(
                    "SELECT url, status, length(body), stored_at
                     FROM entries WHERE cache_name = ?1 ORDER BY url ASC",
                )?;
                let entries = stmt
                    .query_map(params![name], |row| {
                        Ok(EntryInfo {
                            url: row.get(0)?,
                            status: row.get(1)?,
                            size: row.get::<_, i64>(2)? as usize,
                            stored_at: row.get(3)?,
                        })
                    })?
                    .collect::<Result<Vec<_>, rusqlite::Error>>()?;
                Ok(entries)
            })
            .await
            .map_err(Error::from)
    }
}
