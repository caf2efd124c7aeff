//! Network client for swcache.
//!
//! This crate provides the HTTP fetch pipeline the cache controller uses as
//! its [`Network`](swcache_core::Network) collaborator, plus URL helpers
//! shared with the CLI.

pub mod fetch;

pub use fetch::{FetchClient, FetchConfig, UrlError, canonicalize, resolve};
