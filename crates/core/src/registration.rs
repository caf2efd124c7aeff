//! Registration: the hosting side of the controller lifecycle.
//!
//! A registration binds one script path under a base path. It drives
//! install and activate for each new controller version, tracks open pages
//! (clients), and routes their requests either through the active controller
//! or straight to the network when the page is not governed.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::RwLock;

use crate::Error;
use crate::cache::CacheStorage;
use crate::controller::{
    ActivateReport, BasePath, CacheController, InstallReport, LifecycleState, ResponseSource, Served,
};
use crate::http::Request;
use crate::network::Network;

/// Identifier of an open page.
pub type ClientId = u64;

/// What an update attempt did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpdateOutcome {
    /// The offered version is already active.
    Unchanged,
    /// Installed but held until every open page closes.
    Waiting(InstallReport),
    /// Installed and activated; open pages were claimed.
    Activated { install: InstallReport, activate: ActivateReport, claimed: usize },
}

struct State<S, N> {
    active: Option<Arc<CacheController<S, N>>>,
    waiting: Option<Arc<CacheController<S, N>>>,
    /// Client id to the cache name of the controller governing it, if any.
    clients: BTreeMap<ClientId, Option<String>>,
}

/// A registered controller script and the pages it may govern.
pub struct Registration<S, N> {
    base_path: BasePath,
    script_path: String,
    network: Arc<N>,
    state: RwLock<State<S, N>>,
    next_client: AtomicU64,
}

impl<S, N> Registration<S, N>
where
    S: CacheStorage,
    N: Network,
{
    /// Register `script_path`, which must live under `base_path`.
    pub fn new(base_path: BasePath, script_path: &str, network: Arc<N>) -> Result<Self, Error> {
        let script_dir = BasePath::from_script_path(script_path)?;
        if !script_dir.as_str().starts_with(base_path.as_str()) {
            return Err(Error::ScopeMismatch { script: script_path.to_string(), base_path: base_path.to_string() });
        }

        tracing::info!(script = script_path, base_path = %base_path, "controller registered");

        Ok(Self {
            base_path,
            script_path: script_path.to_string(),
            network,
            state: RwLock::new(State { active: None, waiting: None, clients: BTreeMap::new() }),
            next_client: AtomicU64::new(1),
        })
    }

    pub fn base_path(&self) -> &BasePath {
        &self.base_path
    }

    pub fn script_path(&self) -> &str {
        &self.script_path
    }

    pub fn active(&self) -> Option<Arc<CacheController<S, N>>> {
        self.state.read().active.clone()
    }

    pub fn waiting(&self) -> Option<Arc<CacheController<S, N>>> {
        self.state.read().waiting.clone()
    }

    /// Offer a controller version.
    ///
    /// A version whose cache name matches the active controller is ignored.
    /// Otherwise it is installed; if install asks to skip waiting, or no
    /// page is currently governed, it is activated straight away and claims
    /// every open page.
    pub async fn update(&self, controller: CacheController<S, N>) -> Result<UpdateOutcome, Error> {
        if let Some(active) = self.active()
            && active.cache_name() == controller.cache_name()
        {
            tracing::debug!(cache = %controller.cache_name(), "controller version unchanged");
            return Ok(UpdateOutcome::Unchanged);
        }

        let controller = Arc::new(controller);
        let install = controller.on_install().await?;

        let must_wait = !controller.skip_waiting_requested() && self.governed_clients() > 0;
        if must_wait {
            let previous = self.state.write().waiting.replace(controller);
            if let Some(previous) = previous {
                previous.mark_redundant()?;
            }
            return Ok(UpdateOutcome::Waiting(install));
        }

        let (activate, claimed) = self.activate(controller).await?;
        Ok(UpdateOutcome::Activated { install, activate, claimed })
    }

    /// Adopt a controller version activated by an earlier process as the
    /// active one and claim open pages.
    pub async fn resume(&self, controller: CacheController<S, N>) -> Result<usize, Error> {
        controller.resume().await?;
        let previous = self.state.write().active.replace(Arc::new(controller));
        if let Some(previous) = previous {
            previous.mark_redundant()?;
        }
        Ok(self.claim())
    }

    /// Activate the waiting controller once no page is governed by the old one.
    ///
    /// Returns `None` when nothing is waiting or pages still hold the old
    /// version.
    pub async fn try_activate_waiting(&self) -> Result<Option<(ActivateReport, usize)>, Error> {
        if self.governed_clients() > 0 {
            return Ok(None);
        }
        let Some(controller) = self.state.write().waiting.take() else {
            return Ok(None);
        };
        if controller.state() != LifecycleState::Installed {
            tracing::debug!(
                cache = %controller.cache_name(),
                state = %controller.state(),
                "dropping superseded waiting controller"
            );
            return Ok(None);
        }
        self.activate(controller).await.map(Some)
    }

    /// Activate `controller`. A version still waiting was installed before
    /// this one, so it is superseded and never activates.
    async fn activate(&self, controller: Arc<CacheController<S, N>>) -> Result<(ActivateReport, usize), Error> {
        let superseded = self.state.write().waiting.take();
        if let Some(superseded) = superseded
            && !Arc::ptr_eq(&superseded, &controller)
        {
            tracing::info!(cache = %superseded.cache_name(), "waiting controller superseded");
            superseded.mark_redundant()?;
        }

        let report = controller.on_activate().await?;

        let previous = self.state.write().active.replace(controller);
        if let Some(previous) = previous
            && previous.state() != LifecycleState::Redundant
        {
            previous.mark_redundant()?;
        }

        let claimed = self.claim();
        Ok((report, claimed))
    }

    /// Put every open page under the active controller. Returns how many
    /// pages changed controller.
    pub fn claim(&self) -> usize {
        let mut state = self.state.write();
        let Some(name) = state.active.as_ref().map(|c| c.cache_name()) else {
            return 0;
        };

        let mut claimed = 0;
        for governed in state.clients.values_mut() {
            if governed.as_deref() != Some(name.as_str()) {
                *governed = Some(name.clone());
                claimed += 1;
            }
        }

        tracing::info!(cache = %name, claimed, "claimed open clients");
        claimed
    }

    /// Open a page. It is governed by the active controller from the start,
    /// if there is one.
    pub fn open_client(&self) -> ClientId {
        let id = self.next_client.fetch_add(1, Ordering::Relaxed);
        let mut state = self.state.write();
        let governed = state.active.as_ref().map(|c| c.cache_name());
        state.clients.insert(id, governed);
        id
    }

    pub fn close_client(&self, id: ClientId) -> Result<(), Error> {
        self.state
            .write()
            .clients
            .remove(&id)
            .map(|_| ())
            .ok_or(Error::ClientNotFound(id))
    }

    /// Cache name of the controller governing `id`, if any.
    pub fn controller_of(&self, id: ClientId) -> Result<Option<String>, Error> {
        self.state
            .read()
            .clients
            .get(&id)
            .cloned()
            .ok_or(Error::ClientNotFound(id))
    }

    fn governed_clients(&self) -> usize {
        self.state.read().clients.values().filter(|c| c.is_some()).count()
    }

    /// Issue a request from page `id`.
    pub async fn fetch(&self, id: ClientId, request: Request) -> Result<Served, Error> {
        let controller = {
            let state = self.state.read();
            let governed = state.clients.get(&id).ok_or(Error::ClientNotFound(id))?;
            match (governed, &state.active) {
                (Some(name), Some(active)) if active.cache_name() == *name => Some(active.clone()),
                _ => None,
            }
        };

        match controller {
            Some(controller) => controller.handle_fetch(request).await,
            None => {
                let response = self.network.fetch(&request).await?;
                Ok(Served { response, source: ResponseSource::Network })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::CacheDb;
    use crate::controller::{CacheName, ControllerConfig, Manifest};
    use crate::http::Destination;
    use crate::testing::FakeNetwork;
    use url::Url;

    const ORIGIN: &str = "https://example.github.io";

    struct Harness {
        db: Arc<CacheDb>,
        net: Arc<FakeNetwork>,
        registration: Registration<CacheDb, FakeNetwork>,
    }

    impl Harness {
        async fn new() -> Self {
            let db = Arc::new(CacheDb::open_in_memory().await.unwrap());
            let net = Arc::new(FakeNetwork::new());
            net.respond(&format!("{ORIGIN}/index.html"), 200, "root");
            let registration = Registration::new(BasePath::root(), "/sw.js", net.clone()).unwrap();
            Self { db, net, registration }
        }

        fn controller(&self, version: &str) -> CacheController<CacheDb, FakeNetwork> {
            CacheController::new(self.config(version), self.db.clone(), self.net.clone())
        }

        fn config(&self, version: &str) -> ControllerConfig {
            ControllerConfig::new(Url::parse(ORIGIN).unwrap(), BasePath::root(), CacheName::new("app-", version))
                .with_manifest(Manifest::new(["/index.html"]))
        }
    }

    #[test]
    fn test_scope_mismatch() {
        let net = Arc::new(FakeNetwork::new());
        let result = Registration::<CacheDb, FakeNetwork>::new(BasePath::new("/Mens-Group/").unwrap(), "/sw.js", net);
        assert!(matches!(result, Err(Error::ScopeMismatch { .. })));
    }

    #[test]
    fn test_script_under_subpath() {
        let net = Arc::new(FakeNetwork::new());
        let registration =
            Registration::<CacheDb, FakeNetwork>::new(BasePath::new("/Mens-Group/").unwrap(), "/Mens-Group/sw.js", net)
                .unwrap();
        assert_eq!(registration.script_path(), "/Mens-Group/sw.js");
    }

    #[tokio::test]
    async fn test_first_update_activates_and_claims() {
        let h = Harness::new().await;
        let page = h.registration.open_client();
        assert_eq!(h.registration.controller_of(page).unwrap(), None);

        let outcome = h.registration.update(h.controller("v1")).await.unwrap();
        assert!(matches!(outcome, UpdateOutcome::Activated { claimed: 1, .. }));
        assert_eq!(h.registration.controller_of(page).unwrap().as_deref(), Some("app-v1"));
        assert_eq!(h.registration.active().unwrap().state(), LifecycleState::Active);
    }

    #[tokio::test]
    async fn test_same_version_is_unchanged() {
        let h = Harness::new().await;
        h.registration.update(h.controller("v1")).await.unwrap();

        let outcome = h.registration.update(h.controller("v1")).await.unwrap();
        assert_eq!(outcome, UpdateOutcome::Unchanged);
        assert_eq!(h.net.calls(&format!("{ORIGIN}/index.html")), 1);
    }

    #[tokio::test]
    async fn test_new_version_supersedes_old() {
        let h = Harness::new().await;
        let page = h.registration.open_client();
        h.registration.update(h.controller("v1")).await.unwrap();
        let old = h.registration.active().unwrap();

        let outcome = h.registration.update(h.controller("v2")).await.unwrap();
        match outcome {
            UpdateOutcome::Activated { activate, claimed, .. } => {
                assert_eq!(activate.deleted, vec!["app-v1"]);
                assert_eq!(claimed, 1);
            }
            other => panic!("unexpected outcome: {other:?}"),
        }

        assert_eq!(old.state(), LifecycleState::Redundant);
        assert_eq!(h.db.cache_names().await.unwrap(), vec!["app-v2"]);
        assert_eq!(h.registration.controller_of(page).unwrap().as_deref(), Some("app-v2"));
    }

    #[tokio::test]
    async fn test_governed_fetch_uses_controller() {
        let h = Harness::new().await;
        let page = h.registration.open_client();
        h.registration.update(h.controller("v1")).await.unwrap();
        h.net.go_offline();

        let request = Request::parse(&format!("{ORIGIN}/weeks/week-04.html"), Destination::Document).unwrap();
        let served = h.registration.fetch(page, request).await.unwrap();
        assert_eq!(served.source, ResponseSource::RootFallback);
    }

    #[tokio::test]
    async fn test_ungoverned_fetch_goes_to_network() {
        let h = Harness::new().await;
        let page = h.registration.open_client();
        h.net.go_offline();

        let request = Request::parse(&format!("{ORIGIN}/index.html"), Destination::Document).unwrap();
        assert!(h.registration.fetch(page, request).await.is_err());
    }

    #[tokio::test]
    async fn test_closed_client_is_unknown() {
        let h = Harness::new().await;
        let page = h.registration.open_client();
        h.registration.close_client(page).unwrap();

        assert!(matches!(h.registration.close_client(page), Err(Error::ClientNotFound(_))));
        let request = Request::parse(&format!("{ORIGIN}/"), Destination::Document).unwrap();
        assert!(matches!(h.registration.fetch(page, request).await, Err(Error::ClientNotFound(_))));
    }

    #[tokio::test]
    async fn test_resume_after_restart() {
        let h = Harness::new().await;
        h.registration.update(h.controller("v1")).await.unwrap();

        let restarted = Registration::new(BasePath::root(), "/sw.js", h.net.clone()).unwrap();
        let page = restarted.open_client();
        assert_eq!(restarted.resume(h.controller("v1")).await.unwrap(), 1);
        h.net.go_offline();

        let request = Request::parse(&format!("{ORIGIN}/index.html"), Destination::Document).unwrap();
        let served = restarted.fetch(page, request).await.unwrap();
        assert_eq!(served.source, ResponseSource::Cache);
    }

    #[tokio::test]
    async fn test_resume_unknown_version() {
        let h = Harness::new().await;
        let result = h.registration.resume(h.controller("v9")).await;
        assert!(matches!(result, Err(Error::NotInstalled(_))));
        assert!(h.registration.active().is_none());
    }

    #[tokio::test]
    async fn test_try_activate_waiting_without_waiting() {
        let h = Harness::new().await;
        assert!(h.registration.try_activate_waiting().await.unwrap().is_none());
        assert!(h.registration.waiting().is_none());
    }

    #[tokio::test]
    async fn test_waiting_version_activates_after_pages_close() {
        let h = Harness::new().await;
        let page = h.registration.open_client();
        h.registration.update(h.controller("v1")).await.unwrap();
        let old = h.registration.active().unwrap();

        let patient =
            CacheController::new(h.config("v2").with_skip_waiting(false), h.db.clone(), h.net.clone());
        let outcome = h.registration.update(patient).await.unwrap();
        assert!(matches!(outcome, UpdateOutcome::Waiting(_)));
        assert_eq!(h.registration.waiting().unwrap().state(), LifecycleState::Installed);
        assert_eq!(h.registration.controller_of(page).unwrap().as_deref(), Some("app-v1"));
        assert!(h.registration.try_activate_waiting().await.unwrap().is_none());

        h.registration.close_client(page).unwrap();
        let (report, claimed) = h.registration.try_activate_waiting().await.unwrap().unwrap();
        assert_eq!(report.deleted, vec!["app-v1"]);
        assert_eq!(claimed, 0);
        assert_eq!(old.state(), LifecycleState::Redundant);
        assert_eq!(h.registration.active().unwrap().cache_name(), "app-v2");
    }

    #[tokio::test]
    async fn test_skip_waiting_update_supersedes_waiting_version() {
        let h = Harness::new().await;
        let page = h.registration.open_client();
        h.registration.update(h.controller("v1")).await.unwrap();

        let patient = CacheController::new(h.config("v2").with_skip_waiting(false), h.db.clone(), h.net.clone());
        let outcome = h.registration.update(patient).await.unwrap();
        assert!(matches!(outcome, UpdateOutcome::Waiting(_)));
        let stale = h.registration.waiting().unwrap();

        let outcome = h.registration.update(h.controller("v3")).await.unwrap();
        assert!(matches!(outcome, UpdateOutcome::Activated { .. }));
        assert!(h.registration.waiting().is_none());
        assert_eq!(stale.state(), LifecycleState::Redundant);
        assert_eq!(h.db.cache_names().await.unwrap(), vec!["app-v3"]);

        h.registration.close_client(page).unwrap();
        assert!(h.registration.try_activate_waiting().await.unwrap().is_none());
        assert_eq!(h.registration.active().unwrap().cache_name(), "app-v3");
        assert_eq!(h.db.cache_names().await.unwrap(), vec!["app-v3"]);
    }

    #[tokio::test]
    async fn test_redundant_waiting_version_never_activates() {
        let h = Harness::new().await;
        let page = h.registration.open_client();
        h.registration.update(h.controller("v1")).await.unwrap();

        let patient = CacheController::new(h.config("v2").with_skip_waiting(false), h.db.clone(), h.net.clone());
        h.registration.update(patient).await.unwrap();
        h.registration.waiting().unwrap().mark_redundant().unwrap();

        h.registration.close_client(page).unwrap();
        assert!(h.registration.try_activate_waiting().await.unwrap().is_none());
        assert!(h.registration.waiting().is_none());
        assert_eq!(h.registration.active().unwrap().cache_name(), "app-v1");
        assert_eq!(h.db.cache_names().await.unwrap(), vec!["app-v1", "app-v2"]);
    }
}
