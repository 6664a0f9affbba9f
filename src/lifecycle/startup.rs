//! Startup orchestration.
//!
//! # Order
//! ```text
//! TLS client material (fatal on error)
//!     → target registry, pair registry, supervisor
//!     → selector + proxy server
//!     → node listener
//!     → metrics exporter, monitoring listener (both optional, fatal on error)
//!     → run: window scheduler, monitoring API, accept loop
//! ```
//!
//! # Shutdown
//! Stop accepting, give established pairs `drain_timeout_secs` to finish,
//! then destroy whatever is left and wait briefly for the relays to unwind.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::Router;
use tokio::net::TcpListener;

use crate::admin::{self, AdminState};
use crate::config::ProxyConfig;
use crate::lifecycle::{Shutdown, TaskSupervisor, WindowResetScheduler};
use crate::load_balancer::{ordering_for, TargetRegistry, TargetSelector};
use crate::net::listener::{Listener, ListenerError};
use crate::net::tls::{TlsDialer, TlsError};
use crate::observability::metrics;
use crate::pairing::PairRegistry;
use crate::proxy::{ProxyServer, RelaySettings};

/// How long relays get to unwind after a forced close.
const FORCE_CLOSE_GRACE: Duration = Duration::from_secs(5);

#[derive(Debug, thiserror::Error)]
pub enum StartupError {
    #[error("TLS setup failed: {0}")]
    Tls(#[from] TlsError),
    #[error(transparent)]
    Listener(#[from] ListenerError),
    #[error("invalid {field} address `{value}`")]
    Address { field: &'static str, value: String },
    #[error("failed to bind monitoring API: {0}")]
    AdminBind(std::io::Error),
    #[error("failed to start metrics exporter: {0}")]
    Metrics(#[from] metrics_exporter_prometheus::BuildError),
}

/// A fully wired balancer, bound and ready to run.
pub struct Application {
    config: ProxyConfig,
    listener: Listener,
    server: ProxyServer<TlsDialer>,
    targets: Arc<TargetRegistry>,
    supervisor: TaskSupervisor,
    admin: Option<(TcpListener, Router)>,
}

impl Application {
    pub async fn build(config: ProxyConfig) -> Result<Self, StartupError> {
        let dialer = TlsDialer::from_config(
            &config.tls,
            Duration::from_secs(config.balancing.connect_timeout_secs),
        )?;

        let targets = Arc::new(TargetRegistry::from_config(&config.targets));
        let pairs = Arc::new(PairRegistry::new());
        let supervisor = TaskSupervisor::new();

        let selector = TargetSelector::new(targets.clone(), ordering_for(config.balancing.strategy), dialer);
        let server = ProxyServer::new(
            selector,
            pairs.clone(),
            supervisor.clone(),
            RelaySettings {
                node_timeout: Duration::from_secs(config.node.timeout_secs),
                buffer_size: config.balancing.relay_buffer_size,
            },
        );

        let listener = Listener::bind(&config.node).await?;

        if config.observability.metrics_enabled {
            let addr = parse_addr("metrics", &config.observability.metrics_address)?;
            metrics::init_metrics(addr)?;
        }

        let admin = if config.admin.enabled {
            let addr = parse_addr("admin", &config.admin.bind_address)?;
            let admin_listener = TcpListener::bind(addr).await.map_err(StartupError::AdminBind)?;
            let router = admin::setup_admin_router(AdminState {
                pairs,
                targets: targets.clone(),
                gate: listener.gate().clone(),
                supervisor: supervisor.clone(),
                api_key: Arc::from(config.admin.api_key.as_str()),
                started: Instant::now(),
            });
            Some((admin_listener, router))
        } else {
            None
        };

        tracing::info!(
            targets = targets.len(),
            strategy = ?config.balancing.strategy,
            node_timeout_secs = config.node.timeout_secs,
            "Balancer initialized"
        );

        Ok(Self {
            config,
            listener,
            server,
            targets,
            supervisor,
            admin,
        })
    }

    /// Address the node listener is bound to.
    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Address the monitoring API is bound to, if enabled.
    pub fn admin_addr(&self) -> Option<SocketAddr> {
        self.admin.as_ref().and_then(|(l, _)| l.local_addr().ok())
    }

    pub fn pairs(&self) -> &Arc<PairRegistry> {
        self.server.pairs()
    }

    pub fn targets(&self) -> &Arc<TargetRegistry> {
        &self.targets
    }

    pub fn supervisor(&self) -> &TaskSupervisor {
        &self.supervisor
    }

    /// Serve until `shutdown` fires, then drain.
    pub async fn run(self, shutdown: &Shutdown) -> Result<(), StartupError> {
        let Self {
            config,
            listener,
            server,
            supervisor,
            admin,
            ..
        } = self;
        let pairs = server.pairs().clone();

        supervisor.spawn(
            "window_reset",
            WindowResetScheduler::new(pairs.clone()).run(shutdown.subscribe()),
        );

        if let Some((admin_listener, router)) = admin {
            let rx = shutdown.subscribe();
            supervisor.spawn("admin_api", async move {
                if let Err(e) = admin::serve(admin_listener, router, rx).await {
                    tracing::error!(error = %e, "Monitoring API failed");
                }
            });
        }

        let accept_result = {
            let _accept_guard = supervisor.track("tcp_proxy_accept");
            server.run(listener, shutdown.subscribe()).await
        };

        let drain_timeout = Duration::from_secs(config.shutdown.drain_timeout_secs);
        tracing::info!(
            active_pairs = pairs.count_pairs(),
            drain_timeout_secs = config.shutdown.drain_timeout_secs,
            "Draining established pairs"
        );

        if !supervisor.wait_idle(drain_timeout).await {
            let remaining = pairs.all_pairs();
            tracing::warn!(pairs = remaining.len(), "Drain timeout reached, closing remaining pairs");
            for pair in remaining.values() {
                pair.node.destroy();
                pair.target.destroy();
            }
            if !supervisor.wait_idle(FORCE_CLOSE_GRACE).await {
                tracing::warn!(tasks = supervisor.active_count(), "Tasks still running at exit");
            }
        }

        tracing::info!("Shutdown complete");
        accept_result.map_err(StartupError::from)
    }
}

fn parse_addr(field: &'static str, value: &str) -> Result<SocketAddr, StartupError> {
    value.parse().map_err(|_| StartupError::Address {
        field,
        value: value.to_string(),
    })
}
