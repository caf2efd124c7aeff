//! The cache controller.
//!
//! One controller exists per deployed version. It owns a single cache
//! generation and exposes the three lifecycle operations the runtime drives:
//!
//! - [`CacheController::on_install`]: best-effort precache of the manifest
//! - [`CacheController::on_activate`]: sweep stale generations
//! - [`CacheController::on_fetch`]: route an intercepted request
//!
//! ### Fetch policy
//! - Documents (navigations, `.html`): network first; on failure the cached
//!   copy, then the precached root document.
//! - Assets: cache first; on miss the network. Successful `200` responses
//!   are stored, except for audio which always passes through uncached.

pub mod lifecycle;
pub mod manifest;
pub mod naming;
pub mod policy;

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use futures::future::join_all;
use parking_lot::Mutex;
use url::Url;

use crate::Error;
use crate::cache::CacheStorage;
use crate::http::{Request, Response};
use crate::network::Network;

pub use lifecycle::LifecycleState;
pub use manifest::{BasePath, Manifest};
pub use naming::CacheName;
pub use policy::{RequestClass, ResponseSource, classify, is_audio, is_markup};

/// Default directory whose responses are never cached.
pub const DEFAULT_AUDIO_DIR: &str = "/assets/audio/";

/// Everything a controller needs, fixed at construction.
#[derive(Debug, Clone)]
pub struct ControllerConfig {
    /// Origin the site is served from; manifest paths resolve against it.
    pub origin: Url,
    pub base_path: BasePath,
    pub cache_name: CacheName,
    pub manifest: Manifest,
    pub audio_dir: String,
    /// Activate as soon as install finishes instead of waiting for every
    /// governed page to close.
    pub skip_waiting: bool,
}

impl ControllerConfig {
    /// Config with the standard manifest for `base_path`.
    pub fn new(origin: Url, base_path: BasePath, cache_name: CacheName) -> Self {
        let manifest = Manifest::standard(&base_path);
        Self { origin, base_path, cache_name, manifest, audio_dir: DEFAULT_AUDIO_DIR.into(), skip_waiting: true }
    }

    pub fn with_manifest(mut self, manifest: Manifest) -> Self {
        self.manifest = manifest;
        self
    }

    pub fn with_skip_waiting(mut self, skip_waiting: bool) -> Self {
        self.skip_waiting = skip_waiting;
        self
    }

    pub fn with_audio_dir(mut self, audio_dir: impl Into<String>) -> Self {
        self.audio_dir = audio_dir.into();
        self
    }

    /// Absolute URL of the precached root document.
    pub fn root_document_url(&self) -> Result<Url, Error> {
        let path = self.base_path.root_document();
        self.origin
            .join(&path)
            .map_err(|e| Error::InvalidUrl(format!("{path}: {e}")))
    }
}

/// Outcome of a precache run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InstallReport {
    pub cache_name: String,
    pub cached: Vec<String>,
    /// (url, reason) for every entry that could not be stored.
    pub failed: Vec<(String, String)>,
}

/// Outcome of the stale-generation sweep.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ActivateReport {
    pub cache_name: String,
    pub deleted: Vec<String>,
    /// (name, reason) for every stale generation that could not be deleted.
    pub failed: Vec<(String, String)>,
}

/// A response together with where it came from.
#[derive(Debug, Clone)]
pub struct Served {
    pub response: Response,
    pub source: ResponseSource,
}

impl Served {
    fn new(response: Response, source: ResponseSource) -> Self {
        Self { response, source }
    }
}

/// Cache controller for one deployment version.
pub struct CacheController<S, N> {
    config: ControllerConfig,
    storage: Arc<S>,
    network: Arc<N>,
    state: Mutex<LifecycleState>,
    skip_waiting: AtomicBool,
}

impl<S, N> CacheController<S, N>
where
    S: CacheStorage,
    N: Network,
{
    pub fn new(config: ControllerConfig, storage: Arc<S>, network: Arc<N>) -> Self {
        Self {
            config,
            storage,
            network,
            state: Mutex::new(LifecycleState::Uninstalled),
            skip_waiting: AtomicBool::new(false),
        }
    }

    pub fn config(&self) -> &ControllerConfig {
        &self.config
    }

    pub fn state(&self) -> LifecycleState {
        *self.state.lock()
    }

    /// Name of the generation this controller writes to.
    pub fn cache_name(&self) -> String {
        self.config.cache_name.current()
    }

    /// Whether install asked to activate without waiting for pages to close.
    pub fn skip_waiting_requested(&self) -> bool {
        self.skip_waiting.load(Ordering::Acquire)
    }

    /// Superseded by a newer version.
    pub fn mark_redundant(&self) -> Result<(), Error> {
        self.transition(LifecycleState::Redundant)
    }

    fn transition(&self, to: LifecycleState) -> Result<(), Error> {
        let mut state = self.state.lock();
        let from = *state;
        *state = from.transition(to)?;
        tracing::info!(cache = %self.config.cache_name, %from, %to, "controller state changed");
        Ok(())
    }

    /// Open the current generation and precache the manifest.
    ///
    /// Individual entry failures are logged and reported but never fail the
    /// install; only failing to open the generation does.
    pub async fn on_install(&self) -> Result<InstallReport, Error> {
        let urls = self.config.manifest.urls(&self.config.origin)?;
        self.transition(LifecycleState::Installing)?;

        let name = self.cache_name();
        if let Err(e) = self.storage.open(&name).await {
            tracing::warn!(cache = %name, error = %e, "cache install failed");
            self.transition(LifecycleState::Uninstalled)?;
            return Err(Error::CacheOpen { name, reason: e.to_string() });
        }

        let results = join_all(urls.into_iter().map(|url| self.precache(&name, url))).await;

        let mut report = InstallReport { cache_name: name, ..Default::default() };
        for (url, result) in results {
            match result {
                Ok(()) => report.cached.push(url.to_string()),
                Err(e) => {
                    tracing::warn!(url = %url, error = %e, "failed to precache");
                    report.failed.push((url.to_string(), e.to_string()));
                }
            }
        }

        self.transition(LifecycleState::Installed)?;
        self.skip_waiting.store(self.config.skip_waiting, Ordering::Release);

        tracing::info!(
            cache = %report.cache_name,
            cached = report.cached.len(),
            failed = report.failed.len(),
            "precache complete"
        );

        Ok(report)
    }

    async fn precache(&self, name: &str, url: Url) -> (Url, Result<(), Error>) {
        let request = Request::get(url.clone());
        let result = async {
            let response = self.network.fetch(&request).await?;
            if !response.is_ok() {
                return Err(Error::HttpError(format!("status {}", response.status)));
            }
            self.storage.put(name, &request, response).await
        }
        .await;
        (url, result)
    }

    /// Take over a generation activated by an earlier process.
    ///
    /// The stale sweep already ran when that generation was activated, so
    /// this only checks the generation still exists and starts serving.
    pub async fn resume(&self) -> Result<(), Error> {
        let name = self.cache_name();
        if !self.storage.has(&name).await? {
            return Err(Error::NotInstalled(name));
        }

        let mut state = self.state.lock();
        if *state != LifecycleState::Uninstalled {
            return Err(Error::InvalidTransition { from: *state, to: LifecycleState::Active });
        }
        *state = LifecycleState::Active;
        tracing::info!(cache = %name, "resumed active controller");
        Ok(())
    }

    /// Delete every managed generation other than the current one.
    ///
    /// Deletion is best-effort: failures are logged and activation proceeds.
    pub async fn on_activate(&self) -> Result<ActivateReport, Error> {
        self.transition(LifecycleState::Activating)?;

        let mut report = ActivateReport { cache_name: self.cache_name(), ..Default::default() };

        let names = match self.storage.keys().await {
            Ok(names) => names,
            Err(e) => {
                tracing::warn!(error = %e, "could not enumerate cache generations");
                Vec::new()
            }
        };

        for name in names.into_iter().filter(|n| self.config.cache_name.is_stale(n)) {
            match self.storage.delete(&name).await {
                Ok(_) => {
                    tracing::info!(cache = %name, "deleted stale cache generation");
                    report.deleted.push(name);
                }
                Err(e) => {
                    tracing::warn!(cache = %name, error = %e, "failed to delete stale cache generation");
                    report.failed.push((name, e.to_string()));
                }
            }
        }

        self.transition(LifecycleState::Active)?;
        Ok(report)
    }

    /// Produce the response for an intercepted request.
    ///
    /// An error is the network failure the page would have seen without a
    /// controller.
    pub async fn on_fetch(&self, request: Request) -> Result<Response, Error> {
        self.handle_fetch(request).await.map(|served| served.response)
    }

    /// Like [`on_fetch`](Self::on_fetch), also reporting the response source.
    pub async fn handle_fetch(&self, request: Request) -> Result<Served, Error> {
        if !self.state().can_intercept_fetch() || !request.is_get() {
            let response = self.network.fetch(&request).await?;
            return Ok(Served::new(response, ResponseSource::Network));
        }

        match classify(&request) {
            RequestClass::Document => self.network_first(request).await,
            RequestClass::Asset => self.cache_first(request).await,
        }
    }

    async fn network_first(&self, request: Request) -> Result<Served, Error> {
        let err = match self.network.fetch(&request).await {
            Ok(response) => {
                if response.is_cacheable() {
                    self.store(&request, response.clone()).await;
                }
                return Ok(Served::new(response, ResponseSource::Network));
            }
            Err(e) => e,
        };

        tracing::debug!(url = %request.url, error = %err, "document fetch failed, trying cache");

        if let Some(cached) = self.lookup(&request).await {
            return Ok(Served::new(cached, ResponseSource::Cache));
        }

        let root = Request::get(self.config.root_document_url()?);
        if let Some(cached) = self.lookup(&root).await {
            return Ok(Served::new(cached, ResponseSource::RootFallback));
        }

        Err(err)
    }

    async fn cache_first(&self, request: Request) -> Result<Served, Error> {
        if let Some(cached) = self.lookup(&request).await {
            tracing::debug!(url = %request.url, "cache hit");
            return Ok(Served::new(cached, ResponseSource::Cache));
        }

        tracing::debug!(url = %request.url, "cache miss");
        let response = self.network.fetch(&request).await?;

        if is_audio(&request.url, &self.config.audio_dir) {
            return Ok(Served::new(response, ResponseSource::Network));
        }

        if response.is_cacheable() {
            self.store(&request, response.clone()).await;
        }

        Ok(Served::new(response, ResponseSource::Network))
    }

    async fn lookup(&self, request: &Request) -> Option<Response> {
        match self.storage.match_request(&self.cache_name(), request).await {
            Ok(found) => found,
            Err(e) => {
                tracing::warn!(url = %request.url, error = %e, "cache lookup failed");
                None
            }
        }
    }

    async fn store(&self, request: &Request, response: Response) {
        let state = self.state();
        if !state.can_intercept_fetch() {
            tracing::debug!(url = %request.url, %state, "controller no longer active, not caching");
            return;
        }
        if let Err(e) = self.storage.put(&self.cache_name(), request, response).await {
            tracing::warn!(url = %request.url, error = %e, "failed to cache response");
        }
    }
}
