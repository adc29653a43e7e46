//! In-memory collaborators for unit tests.

use crate::crds::{Grafana, GrafanaSpec, ObjectKey};
use crate::discovery::LibraryDiscovery;
use crate::error::{Error, Result};
use crate::plan::{ClusterAction, Planner};
use crate::recorder::EventRecorder;
use crate::runner::ActionRunner;
use crate::state::{ClusterState, StateReader};
use crate::store::GrafanaStore;
use async_trait::async_trait;
use kube::runtime::events::EventType;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use tokio_util::sync::CancellationToken;

pub(crate) fn grafana(namespace: &str, name: &str) -> Grafana {
    let mut grafana = Grafana::new(name, GrafanaSpec::default());
    grafana.metadata.namespace = Some(namespace.to_string());
    grafana.metadata.resource_version = Some("1".to_string());
    grafana
}

/// Single-object store that counts calls and can be told to fail
#[derive(Default)]
pub(crate) struct FakeStore {
    object: Mutex<Option<Grafana>>,
    gets: AtomicUsize,
    writes: AtomicUsize,
    /// Gets with a zero-based call index >= .0 fail with .1()
    get_error: Mutex<Option<(usize, fn() -> Error)>>,
    write_error: Mutex<Option<fn() -> Error>>,
}

impl FakeStore {
    pub(crate) fn empty() -> Self {
        Self::default()
    }

    pub(crate) fn with(grafana: Grafana) -> Self {
        let store = Self::default();
        *store.object.lock().unwrap() = Some(grafana);
        store
    }

    pub(crate) fn fail_gets_from(&self, call: usize, make: fn() -> Error) {
        *self.get_error.lock().unwrap() = Some((call, make));
    }

    pub(crate) fn fail_status_writes_with(&self, make: fn() -> Error) {
        *self.write_error.lock().unwrap() = Some(make);
    }

    /// Simulate another writer editing the stored object
    pub(crate) fn mutate(&self, f: impl FnOnce(&mut Grafana)) {
        if let Some(grafana) = self.object.lock().unwrap().as_mut() {
            f(grafana);
        }
    }

    pub(crate) fn stored(&self) -> Option<Grafana> {
        self.object.lock().unwrap().clone()
    }

    pub(crate) fn status_writes(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl GrafanaStore for FakeStore {
    async fn get(&self, key: &ObjectKey) -> Result<Grafana> {
        let call = self.gets.fetch_add(1, Ordering::SeqCst);
        if let Some((from, make)) = *self.get_error.lock().unwrap() {
            if call >= from {
                return Err(make());
            }
        }
        self.object
            .lock()
            .unwrap()
            .clone()
            .filter(|g| g.key().map(|k| &k == key).unwrap_or(false))
            .ok_or_else(|| Error::NotFound(format!("grafanas {}", key)))
    }

    async fn update_status(&self, grafana: &Grafana) -> Result<()> {
        self.writes.fetch_add(1, Ordering::SeqCst);
        if let Some(make) = *self.write_error.lock().unwrap() {
            return Err(make());
        }
        let mut object = self.object.lock().unwrap();
        match object.as_mut() {
            Some(stored) => {
                stored.status = grafana.status.clone();
                Ok(())
            }
            None => Err(Error::NotFound(grafana.metadata.name.clone().unwrap_or_default())),
        }
    }
}

/// Returns a fixed snapshot, or an error when `fail` is set
#[derive(Default)]
pub(crate) struct FakeStateReader {
    pub(crate) state: ClusterState,
    pub(crate) fail: bool,
}

#[async_trait]
impl StateReader for FakeStateReader {
    async fn read(&self, _grafana: &Grafana) -> Result<ClusterState> {
        if self.fail {
            return Err(crate::error::api_error(500, "InternalError").into());
        }
        Ok(self.state.clone())
    }
}

/// Plans a single ingress delete so the runner has something to run
pub(crate) struct FixedPlanner;

impl Planner for FixedPlanner {
    fn plan(&self, _state: &ClusterState, grafana: &Grafana) -> Vec<ClusterAction> {
        vec![ClusterAction::DeleteIngress {
            namespace: grafana.metadata.namespace.clone().unwrap_or_default(),
            name: "grafana-ingress".to_string(),
        }]
    }
}

#[derive(Default)]
pub(crate) struct FakeRunner {
    pub(crate) fail: bool,
    /// Cancel this token and hang, like an apply stuck on a slow API server
    pub(crate) cancel: Option<CancellationToken>,
    pub(crate) ran: Mutex<Vec<String>>,
}

#[async_trait]
impl ActionRunner for FakeRunner {
    async fn run(&self, action: &ClusterAction) -> Result<()> {
        if let Some(cancel) = &self.cancel {
            cancel.cancel();
            std::future::pending::<()>().await;
        }
        if self.fail {
            return Err(Error::Conflict("field manager conflict".to_string()));
        }
        self.ran.lock().unwrap().push(action.to_string());
        Ok(())
    }
}

#[derive(Default)]
pub(crate) struct FakeDiscovery {
    pub(crate) fail: bool,
}

#[async_trait]
impl LibraryDiscovery for FakeDiscovery {
    async fn discover(&self, _grafana: &Grafana) -> Result<()> {
        if self.fail {
            return Err(Error::Discovery("configmaps forbidden".to_string()));
        }
        Ok(())
    }
}

#[derive(Default)]
pub(crate) struct RecordingRecorder {
    pub(crate) events: Mutex<Vec<(String, String)>>,
}

#[async_trait]
impl EventRecorder for RecordingRecorder {
    async fn record(&self, _grafana: &Grafana, type_: EventType, reason: &str, note: String) {
        let kind = match type_ {
            EventType::Normal => "Normal",
            EventType::Warning => "Warning",
        };
        self.events
            .lock()
            .unwrap()
            .push((format!("{} {}", kind, reason), note));
    }
}
