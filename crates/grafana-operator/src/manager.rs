//! # Operator Manager
//!
//! Owns the process-wide pieces (client, controller config, readiness bus)
//! and runs the controller next to a small health server until shutdown.

use crate::config::{ControllerConfig, CONFIG_OPERATOR_NAMESPACE};
use crate::controller::{install_crd, GrafanaController};
use crate::error::{Error, Result};
use crate::events::ReadinessBus;
use crate::reconciler::{Collaborators, GrafanaReconciler};
use crate::OperatorConfig;
use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::get;
use axum::Router;
use kube::Client;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

/// Main operator manager
pub struct OperatorManager {
    config: OperatorConfig,
    client: Client,
    controller_config: Arc<ControllerConfig>,
    readiness: Arc<ReadinessBus>,
    shutdown: CancellationToken,
}

impl OperatorManager {
    pub async fn new(config: OperatorConfig) -> Result<Self> {
        let client = Client::try_default().await.map_err(Error::from)?;
        Ok(Self::with_client(config, client))
    }

    pub fn with_client(config: OperatorConfig, client: Client) -> Self {
        let controller_config = Arc::new(ControllerConfig::new());
        controller_config.set_config_item(CONFIG_OPERATOR_NAMESPACE, config.operator_namespace.clone());

        Self {
            config,
            client,
            controller_config,
            readiness: Arc::new(ReadinessBus::new()),
            shutdown: CancellationToken::new(),
        }
    }

    /// Shared configuration, for sibling controllers running in the same process
    pub fn controller_config(&self) -> Arc<ControllerConfig> {
        Arc::clone(&self.controller_config)
    }

    pub fn readiness(&self) -> Arc<ReadinessBus> {
        Arc::clone(&self.readiness)
    }

    pub fn config(&self) -> &OperatorConfig {
        &self.config
    }

    pub fn client(&self) -> &Client {
        &self.client
    }

    /// Token cancelled when the operator shuts down
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Start the operator
    pub async fn run(self) -> Result<()> {
        info!("Starting Grafana operator v{}", env!("CARGO_PKG_VERSION"));
        info!(config = ?self.config, "Configuration");

        if self.config.install_crd {
            install_crd(self.client.clone()).await?;
        }

        let parts = Collaborators::kube(
            self.client.clone(),
            Arc::clone(&self.controller_config),
            &self.config,
        );
        let reconciler = GrafanaReconciler::new(
            parts,
            Arc::clone(&self.controller_config),
            Arc::clone(&self.readiness),
        )
        .with_requeue_delay(self.config.requeue_delay);

        let controller = GrafanaController::new(
            self.client.clone(),
            Arc::new(reconciler),
            self.shutdown.clone(),
        )
        .namespace(self.config.watch_namespace.clone())
        .error_backoff(self.config.error_backoff);

        let health_handle = self.start_health_server().await?;

        let controller_handle = tokio::spawn(async move {
            if let Err(e) = controller.run().await {
                error!(error = %e, "Controller failed");
            }
        });

        self.wait_for_shutdown().await;
        info!("Shutdown signal received, stopping operator...");
        self.shutdown.cancel();

        if tokio::time::timeout(Duration::from_secs(30), controller_handle)
            .await
            .is_err()
        {
            error!("Controller did not stop within 30s");
        }
        health_handle.abort();

        info!("Grafana operator stopped");
        Ok(())
    }

    async fn start_health_server(&self) -> Result<tokio::task::JoinHandle<()>> {
        let addr: SocketAddr = self.config.health_addr;
        let listener = tokio::net::TcpListener::bind(addr)
            .await
            .map_err(|e| Error::InvalidConfig(format!("cannot bind health server on {}: {}", addr, e)))?;
        info!(%addr, "Starting health check server");

        let app = health_routes(Arc::clone(&self.readiness));
        let shutdown = self.shutdown.clone();
        Ok(tokio::spawn(async move {
            let server = axum::serve(listener, app)
                .with_graceful_shutdown(async move { shutdown.cancelled().await });
            if let Err(e) = server.await {
                error!(error = %e, "Health server failed");
            }
        }))
    }

    async fn wait_for_shutdown(&self) {
        #[cfg(unix)]
        let terminate = async {
            match signal::unix::signal(signal::unix::SignalKind::terminate()) {
                Ok(mut stream) => {
                    stream.recv().await;
                }
                Err(e) => {
                    error!(error = %e, "cannot install SIGTERM handler");
                    std::future::pending::<()>().await;
                }
            }
        };
        #[cfg(not(unix))]
        let terminate = std::future::pending::<()>();

        tokio::select! {
            _ = signal::ctrl_c() => {
                info!("Received SIGINT, shutting down");
            }
            _ = terminate => {
                info!("Received SIGTERM, shutting down");
            }
            _ = self.shutdown.cancelled() => {
                info!("Received shutdown signal from internal component");
            }
        }
    }

    /// Request shutdown from inside the process
    pub fn shutdown(&self) {
        self.shutdown.cancel();
    }
}

/// `/health` always answers; `/ready` follows the latest published readiness
pub fn health_routes(readiness: Arc<ReadinessBus>) -> Router {
    Router::new()
        .route("/health", get(|| async { "OK" }))
        .route("/ready", get(ready))
        .with_state(readiness)
}

async fn ready(State(readiness): State<Arc<ReadinessBus>>) -> (StatusCode, &'static str) {
    if readiness.latest().grafana_ready {
        (StatusCode::OK, "OK")
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "Grafana not ready")
    }
}

/// Operator builder for fluent configuration
pub struct OperatorBuilder {
    config: OperatorConfig,
}

impl OperatorBuilder {
    pub fn new() -> Self {
        Self {
            config: OperatorConfig::default(),
        }
    }

    pub fn watch_namespace(mut self, namespace: Option<String>) -> Self {
        self.config.watch_namespace = namespace;
        self
    }

    pub fn operator_namespace(mut self, namespace: String) -> Self {
        self.config.operator_namespace = namespace;
        self
    }

    pub fn requeue_delay(mut self, delay: Duration) -> Self {
        self.config.requeue_delay = delay;
        self
    }

    pub fn error_backoff(mut self, backoff: Duration) -> Self {
        self.config.error_backoff = backoff;
        self
    }

    pub fn health_addr(mut self, addr: SocketAddr) -> Self {
        self.config.health_addr = addr;
        self
    }

    pub fn install_crd(mut self, install: bool) -> Self {
        self.config.install_crd = install;
        self
    }

    pub fn openshift(mut self, enabled: bool) -> Self {
        self.config.openshift = enabled;
        self
    }

    pub fn config(&self) -> &OperatorConfig {
        &self.config
    }

    pub async fn build(self) -> Result<OperatorManager> {
        OperatorManager::new(self.config).await
    }
}

impl Default for OperatorBuilder {
    fn default() -> Self {
        Self::new()
    }
}
