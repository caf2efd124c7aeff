//! Scripted network used by controller and registration tests.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;
use tokio::sync::Notify;

use crate::Error;
use crate::http::{Request, Response};
use crate::network::Network;

#[derive(Debug, Clone)]
enum Route {
    Respond(u16, Bytes),
    Fail,
}

/// Pauses the next fetch of one URL until released.
#[derive(Debug, Clone, Default)]
pub(crate) struct Gate {
    /// Signalled once the held fetch has started.
    pub(crate) entered: Arc<Notify>,
    pub(crate) release: Arc<Notify>,
}

/// Answers from a fixed route table and counts calls per URL.
/// Unknown URLs behave as if the device were offline.
#[derive(Debug, Default)]
pub(crate) struct FakeNetwork {
    routes: Mutex<HashMap<String, Route>>,
    calls: Mutex<HashMap<String, usize>>,
    gates: Mutex<HashMap<String, Gate>>,
}

impl FakeNetwork {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn respond(&self, url: &str, status: u16, body: &'static str) {
        self.routes
            .lock()
            .insert(url.to_string(), Route::Respond(status, Bytes::from_static(body.as_bytes())));
    }

    pub(crate) fn fail(&self, url: &str) {
        self.routes.lock().insert(url.to_string(), Route::Fail);
    }

    /// Drop every route, as if the connection went away.
    pub(crate) fn go_offline(&self) {
        self.routes.lock().clear();
    }

    /// Hold the next fetch of `url` in flight until `release` is notified.
    pub(crate) fn hold(&self, url: &str) -> Gate {
        let gate = Gate::default();
        self.gates.lock().insert(url.to_string(), gate.clone());
        gate
    }

    pub(crate) fn calls(&self, url: &str) -> usize {
        self.calls.lock().get(url).copied().unwrap_or(0)
    }

    pub(crate) fn total_calls(&self) -> usize {
        self.calls.lock().values().sum()
    }
}

#[async_trait]
impl Network for FakeNetwork {
    async fn fetch(&self, request: &Request) -> Result<Response, Error> {
        let url = request.url.to_string();
        *self.calls.lock().entry(url.clone()).or_default() += 1;

        let gate = self.gates.lock().remove(&url);
        if let Some(gate) = gate {
            gate.entered.notify_one();
            gate.release.notified().await;
        }

        let route = self.routes.lock().get(&url).cloned();
        match route {
            Some(Route::Respond(status, body)) => Ok(Response::new(request.url.clone(), status, body)),
            Some(Route::Fail) => Err(Error::Network(format!("connection reset: {url}"))),
            None => Err(Error::Network(format!("offline: {url}"))),
        }
    }
}
