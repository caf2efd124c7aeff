//! Per-request routing decisions.
//!
//! Classification is recomputed for each intercepted request and never
//! stored.

use url::Url;

use crate::http::{Destination, Request};

/// Which fetch policy branch handles a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestClass {
    /// Page navigation or markup: network first, cache fallback.
    Document,
    /// Everything else: cache first, network fallback.
    Asset,
}

/// Where a served response came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseSource {
    Network,
    Cache,
    /// The precached root document standing in for an unreachable page.
    RootFallback,
}

impl std::fmt::Display for ResponseSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ResponseSource::Network => write!(f, "network"),
            ResponseSource::Cache => write!(f, "cache"),
            ResponseSource::RootFallback => write!(f, "root-fallback"),
        }
    }
}

/// Document is checked first; anything that is not a document is an asset.
pub fn classify(request: &Request) -> RequestClass {
    if request.destination == Destination::Document || is_markup(&request.url) {
        RequestClass::Document
    } else {
        RequestClass::Asset
    }
}

/// URL path names an HTML resource.
pub fn is_markup(url: &Url) -> bool {
    let path = url.path().to_ascii_lowercase();
    path.ends_with(".html") || path.ends_with(".htm")
}

/// URL lies under the audio asset directory.
pub fn is_audio(url: &Url, audio_dir: &str) -> bool {
    !audio_dir.is_empty() && url.path().contains(audio_dir)
}
