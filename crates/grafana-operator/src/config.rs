//! # Controller Configuration
//!
//! Shared, internally synchronized configuration service. One instance is
//! created at process start and injected into every controller that needs
//! it. When the Grafana instance disappears the dashboard selector key is
//! removed and [`ControllerConfig::cleanup`] is called, so nothing derived
//! from the old instance survives into the next one.

use crate::crds::{GrafanaDashboardRef, GrafanaPlugin};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;
use tracing::debug;

/// Delay before a reconciled Grafana is looked at again
pub const REQUEUE_DELAY: Duration = Duration::from_secs(10);

pub const CONFIG_DASHBOARD_LABEL_SELECTOR: &str = "grafana.dashboards.selector";
pub const CONFIG_GRAFANA_DASHBOARDS_SYNCED: &str = "grafana.dashboards.synced";
pub const CONFIG_JSONNET_LIBRARIES: &str = "grafana.jsonnet.libraries";
pub const CONFIG_OPERATOR_NAMESPACE: &str = "grafana.operator.namespace";

#[derive(Debug, Default)]
struct Inner {
    values: HashMap<String, Value>,
    dashboards: Option<Vec<GrafanaDashboardRef>>,
    /// Plugins keyed by "<namespace>/<dashboard>"
    plugins: HashMap<String, Vec<GrafanaPlugin>>,
}

/// Process-wide configuration shared between the Grafana controller and its siblings
#[derive(Debug, Default)]
pub struct ControllerConfig {
    inner: RwLock<Inner>,
}

impl ControllerConfig {
    pub fn new() -> Self {
        Self::default()
    }

    // A panic while holding the lock leaves plain data behind, so poisoning is ignored.
    fn read(&self) -> RwLockReadGuard<'_, Inner> {
        self.inner.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, Inner> {
        self.inner.write().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn set_config_item(&self, key: &str, value: impl Into<Value>) {
        self.write().values.insert(key.to_string(), value.into());
    }

    pub fn remove_config_item(&self, key: &str) {
        self.write().values.remove(key);
    }

    pub fn has_config_item(&self, key: &str) -> bool {
        self.read().values.contains_key(key)
    }

    pub fn get_config_item(&self, key: &str) -> Option<Value> {
        self.read().values.get(key).cloned()
    }

    pub fn get_config_bool(&self, key: &str, default: bool) -> bool {
        self.read()
            .values
            .get(key)
            .and_then(Value::as_bool)
            .unwrap_or(default)
    }

    pub fn get_config_string(&self, key: &str, default: &str) -> String {
        self.read()
            .values
            .get(key)
            .and_then(Value::as_str)
            .unwrap_or(default)
            .to_string()
    }

    /// Dashboard inventory; `None` until someone has initialised it
    pub fn dashboards(&self) -> Option<Vec<GrafanaDashboardRef>> {
        self.read().dashboards.clone()
    }

    pub fn set_dashboards(&self, dashboards: Vec<GrafanaDashboardRef>) {
        self.write().dashboards = Some(dashboards);
    }

    /// Insert or replace a dashboard, matched by namespace and name
    pub fn add_dashboard(&self, dashboard: GrafanaDashboardRef) {
        let mut inner = self.write();
        let dashboards = inner.dashboards.get_or_insert_with(Vec::new);
        match dashboards
            .iter_mut()
            .find(|d| d.namespace == dashboard.namespace && d.name == dashboard.name)
        {
            Some(existing) => *existing = dashboard,
            None => dashboards.push(dashboard),
        }
    }

    pub fn remove_dashboard(&self, namespace: &str, name: &str) {
        let mut inner = self.write();
        if let Some(dashboards) = inner.dashboards.as_mut() {
            dashboards.retain(|d| !(d.namespace == namespace && d.name == name));
        }
        inner.plugins.remove(&plugin_key(namespace, name));
    }

    /// Forget every dashboard hash so the dashboard controller re-pushes all of them
    pub fn invalidate_dashboards(&self) {
        let mut inner = self.write();
        if let Some(dashboards) = inner.dashboards.as_mut() {
            for dashboard in dashboards.iter_mut() {
                dashboard.hash.clear();
            }
        }
    }

    pub fn set_plugins_for(&self, namespace: &str, dashboard: &str, plugins: Vec<GrafanaPlugin>) {
        self.write()
            .plugins
            .insert(plugin_key(namespace, dashboard), plugins);
    }

    pub fn plugins_for(&self, namespace: &str, dashboard: &str) -> Vec<GrafanaPlugin> {
        self.read()
            .plugins
            .get(&plugin_key(namespace, dashboard))
            .cloned()
            .unwrap_or_default()
    }

    /// Drop the dashboard inventory; `force` also drops plugin requirements
    pub fn cleanup(&self, force: bool) {
        let mut inner = self.write();
        inner.dashboards = Some(Vec::new());
        if force {
            inner.plugins.clear();
        }
        debug!(force, "controller config cleaned up");
    }
}

fn plugin_key(namespace: &str, dashboard: &str) -> String {
    format!("{}/{}", namespace, dashboard)
}
