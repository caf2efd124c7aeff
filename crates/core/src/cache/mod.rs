//! SQLite-backed resource cache.
//!
//! Holds every cache generation the controller creates. It supports:
//!
//! - Request identity keys (method + absolute URL) hashed with SHA-256
//! - Automatic schema migrations
//! - WAL mode for concurrent fetch handlers
//! - Whole-generation deletion with cascading entry removal

pub mod connection;
pub mod generations;
pub mod hash;
pub mod migrations;
pub mod store;

pub use crate::Error;

pub use connection::CacheDb;
pub use generations::EntryInfo;
pub use store::CacheStorage;
