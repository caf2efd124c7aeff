//! Cache generation naming.

use std::fmt;

/// The naming convention shared by every generation this application creates:
/// a fixed prefix followed by a deployment version tag.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheName {
    prefix: String,
    version: String,
}

impl CacheName {
    pub fn new(prefix: impl Into<String>, version: impl Into<String>) -> Self {
        Self { prefix: prefix.into(), version: version.into() }
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    /// Name of the generation this deployment writes to.
    pub fn current(&self) -> String {
        format!("{}{}", self.prefix, self.version)
    }

    /// Whether `name` was created by this application.
    pub fn is_managed(&self, name: &str) -> bool {
        name.starts_with(&self.prefix)
    }

    /// A managed generation other than the current one.
    pub fn is_stale(&self, name: &str) -> bool {
        self.is_managed(name) && name != self.current()
    }
}

impl fmt::Display for CacheName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.prefix, self.version)
    }
}
