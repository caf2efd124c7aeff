//! Request and response values exchanged between governed pages, the
//! controller, the cache store, and the network.

use std::collections::BTreeMap;
use std::fmt;

use bytes::Bytes;
use url::Url;

use crate::Error;

/// What the page intends to do with the response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Destination {
    /// Top-level page navigation.
    Document,
    Style,
    Script,
    Image,
    Audio,
    Manifest,
    Font,
    /// Plain `fetch()` with no particular destination.
    #[default]
    Empty,
    Other,
}

impl fmt::Display for Destination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Destination::Document => "document",
            Destination::Style => "style",
            Destination::Script => "script",
            Destination::Image => "image",
            Destination::Audio => "audio",
            Destination::Manifest => "manifest",
            Destination::Font => "font",
            Destination::Empty => "",
            Destination::Other => "other",
        };
        f.write_str(s)
    }
}

/// An intercepted outgoing request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    pub method: String,
    pub url: Url,
    pub destination: Destination,
    pub headers: BTreeMap<String, String>,
}

impl Request {
    /// A plain GET with no destination.
    pub fn get(url: Url) -> Self {
        Self { method: "GET".into(), url, destination: Destination::Empty, headers: BTreeMap::new() }
    }

    /// A top-level navigation to `url`.
    pub fn navigate(url: Url) -> Self {
        Self { destination: Destination::Document, ..Self::get(url) }
    }

    /// Parse `url` and build a GET for the given destination.
    pub fn parse(url: &str, destination: Destination) -> Result<Self, Error> {
        let url = Url::parse(url).map_err(|e| Error::InvalidUrl(format!("{url}: {e}")))?;
        Ok(Self { destination, ..Self::get(url) })
    }

    pub fn with_destination(mut self, destination: Destination) -> Self {
        self.destination = destination;
        self
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into().to_ascii_lowercase(), value.into());
        self
    }

    pub fn is_get(&self) -> bool {
        self.method.eq_ignore_ascii_case("GET")
    }
}

/// A response as seen by the page.
///
/// The body is reference counted, so `clone()` yields an independent handle
/// over the same bytes: the copy persisted to the cache and the one returned
/// to the page never share a read cursor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    pub url: Url,
    pub status: u16,
    pub headers: BTreeMap<String, String>,
    pub body: Bytes,
}

impl Response {
    pub fn new(url: Url, status: u16, body: impl Into<Bytes>) -> Self {
        Self { url, status, headers: BTreeMap::new(), body: body.into() }
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into().to_ascii_lowercase(), value.into());
        self
    }

    /// Status in the 2xx range.
    pub fn is_ok(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Only a plain `200` is written to the cache on the fetch path.
    pub fn is_cacheable(&self) -> bool {
        self.status == 200
    }

    pub fn content_type(&self) -> Option<&str> {
        self.headers.get("content-type").map(String::as_str)
    }
}
