//! Core of the swcache offline cache controller.
//!
//! This crate provides:
//! - The cache controller (install / activate / fetch policy)
//! - Registration runtime that drives controller versions and open pages
//! - Cache store with SQLite backend
//! - Unified error types
//! - Configuration structures

pub mod cache;
pub mod config;
pub mod controller;
pub mod error;
pub mod http;
pub mod network;
pub mod registration;

#[cfg(test)]
pub(crate) mod testing;

pub use cache::{CacheDb, CacheStorage};
pub use config::{AppConfig, ConfigError};
pub use controller::{CacheController, ControllerConfig, LifecycleState, Served};
pub use error::Error;
pub use http::{Destination, Request, Response};
pub use network::Network;
pub use registration::{ClientId, Registration, UpdateOutcome};
