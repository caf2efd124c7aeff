//! Base path and precache manifest.

use std::fmt;

use url::Url;

use crate::Error;

const LOGO: &str = "assets/logo/same-battles-logo.png";
const WEEKS: u32 = 12;

/// Path prefix under which the site and its controller are deployed.
///
/// Always begins and ends with `/`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BasePath(String);

impl BasePath {
    pub fn new(path: &str) -> Result<Self, Error> {
        let path = path.trim();
        if !path.starts_with('/') {
            return Err(Error::InvalidInput(format!("base path must start with '/': {path}")));
        }
        if path.contains("//") || path.contains(['?', '#']) {
            return Err(Error::InvalidInput(format!("malformed base path: {path}")));
        }
        if path.ends_with('/') { Ok(Self(path.to_string())) } else { Ok(Self(format!("{path}/"))) }
    }

    pub fn root() -> Self {
        Self("/".into())
    }

    /// Directory containing a registered script, e.g. `/Mens-Group/sw.js`
    /// gives `/Mens-Group/`.
    pub fn from_script_path(script_path: &str) -> Result<Self, Error> {
        match script_path.rfind('/') {
            Some(idx) => Self::new(&script_path[..=idx]),
            None => Err(Error::InvalidInput(format!("script path must be absolute: {script_path}"))),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Prefix a relative resource path.
    pub fn join(&self, path: &str) -> String {
        format!("{}{}", self.0, path.trim_start_matches('/'))
    }

    /// The precached page served when a document cannot be fetched.
    pub fn root_document(&self) -> String {
        self.join("index.html")
    }

    pub fn contains(&self, path: &str) -> bool {
        path.starts_with(&self.0)
    }
}

impl fmt::Display for BasePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Ordered set of absolute paths precached at install time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Manifest {
    paths: Vec<String>,
}

impl Manifest {
    /// Build a manifest from explicit paths, dropping duplicates but keeping
    /// first-seen order.
    pub fn new<I, S>(paths: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut out: Vec<String> = Vec::new();
        for path in paths {
            let path = path.into();
            if !out.contains(&path) {
                out.push(path);
            }
        }
        Self { paths: out }
    }

    /// The deployment manifest: site root, shell resources, logo, and the
    /// twelve weekly content pages.
    pub fn standard(base: &BasePath) -> Self {
        let mut paths = vec![
            base.as_str().to_string(),
            base.join("index.html"),
            base.join("css/styles.css"),
            base.join("js/app.js"),
            base.join("manifest.json"),
            base.join(LOGO),
        ];
        paths.extend((1..=WEEKS).map(|week| base.join(&format!("weeks/week-{week:02}.html"))));
        Self::new(paths)
    }

    pub fn paths(&self) -> &[String] {
        &self.paths
    }

    pub fn len(&self) -> usize {
        self.paths.len()
    }

    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }

    /// Resolve every entry against `origin`.
    pub fn urls(&self, origin: &Url) -> Result<Vec<Url>, Error> {
        self.paths
            .iter()
            .map(|p| origin.join(p).map_err(|e| Error::InvalidUrl(format!("{p}: {e}"))))
            .collect()
    }
}
