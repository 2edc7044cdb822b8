//! Daemon orchestration: assembly, lifecycle and signals.
//!
//! The [`Orchestrator`] owns the decision engine ([`PacketGate`]), the
//! optional mirror ingress, and the daemon's housekeeping tasks.
//!
//! # Startup Order
//!
//! 1. PID file
//! 2. Packet gate (loads the table file, starts stats/sweep tasks)
//! 3. Mirror ingress (needs a running gate for its workers)
//! 4. Daemon ticker (uptime and ingress metrics)
//!
//! # Shutdown Order
//!
//! Ingress first so no new frames arrive, then the gate, then the PID file.
//!
//! # Signals
//!
//! - `SIGHUP`: reload the table file; on failure the last-known-good
//!   tables stay in place.
//! - `SIGTERM` / `SIGINT`: graceful shutdown.

use std::path::Path;
use std::time::{Duration, Instant};

use anyhow::Result;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use pktgate_core::config::PktgateConfig;
use pktgate_core::metrics as m;
use pktgate_core::pipeline::{HealthStatus, Pipeline};
use pktgate_engine::tables::TableStore;
use pktgate_engine::{GateConfig, PacketGate, TableFile};

use crate::health::{ComponentHealth, DaemonHealth, aggregate_status};
use crate::ingress::{IngressHandle, MirrorIngress};
use crate::metrics_server;
use crate::pid_file::PidFile;

/// Interval of the daemon's own metrics ticker.
const TICK_INTERVAL: Duration = Duration::from_secs(10);

/// The main daemon orchestrator.
pub struct Orchestrator {
    config: PktgateConfig,
    gate: PacketGate,
    ingress: Option<IngressHandle>,
    pid_file: Option<PidFile>,
    shutdown: CancellationToken,
    ticker: Option<JoinHandle<()>>,
    start_time: Instant,
}

impl Orchestrator {
    /// Load `pktgate.toml` (with env overrides), validate, and build.
    pub async fn build(config_path: &Path) -> Result<Self> {
        let config = PktgateConfig::load(config_path)
            .await
            .map_err(|e| anyhow::anyhow!("failed to load config: {}", e))?;
        Self::build_from_config(config).await
    }

    /// Build from an already-loaded configuration.
    ///
    /// Installs the metrics recorder when `[metrics] enabled = true`.
    pub async fn build_from_config(config: PktgateConfig) -> Result<Self> {
        config
            .validate()
            .map_err(|e| anyhow::anyhow!("config validation failed: {}", e))?;

        if config.metrics.enabled {
            metrics_server::install_metrics_recorder(&config.metrics)?;
        }

        let gate_config = GateConfig::from_core(&config)
            .map_err(|e| anyhow::anyhow!("invalid engine config: {}", e))?;
        let gate = PacketGate::builder()
            .config(gate_config)
            .build()
            .map_err(|e| anyhow::anyhow!("failed to build packet gate: {}", e))?;

        tracing::info!(
            tables_path = config.engine.tables_path.as_str(),
            ingress = config.ingress.enabled,
            metrics = config.metrics.enabled,
            "orchestrator initialized"
        );

        Ok(Self {
            config,
            gate,
            ingress: None,
            pid_file: None,
            shutdown: CancellationToken::new(),
            ticker: None,
            start_time: Instant::now(),
        })
    }

    /// Check the configuration and the table file without starting anything.
    ///
    /// The table file is loaded into a scratch table store so capacity and
    /// entry validation errors surface exactly as they would at startup.
    pub async fn validate(config: &PktgateConfig) -> Result<()> {
        config
            .validate()
            .map_err(|e| anyhow::anyhow!("config validation failed: {}", e))?;
        let gate_config = GateConfig::from_core(config)
            .map_err(|e| anyhow::anyhow!("invalid engine config: {}", e))?;

        if let Some(path) = &gate_config.tables_path {
            let file = TableFile::load(path)
                .await
                .map_err(|e| anyhow::anyhow!("{}", e))?;
            let store = TableStore::new(gate_config.limits, gate_config.rule_order);
            store
                .replace_all(file.into_table_set(0))
                .map_err(|e| anyhow::anyhow!("table file {}: {}", path.display(), e))?;
        }
        Ok(())
    }

    /// Run until `SIGINT` or `SIGTERM`, reloading tables on `SIGHUP`.
    pub async fn run(&mut self) -> Result<()> {
        use tokio::signal::unix::{SignalKind, signal};

        let mut sighup = signal(SignalKind::hangup())
            .map_err(|e| anyhow::anyhow!("failed to install SIGHUP handler: {}", e))?;
        let mut sigterm = signal(SignalKind::terminate())
            .map_err(|e| anyhow::anyhow!("failed to install SIGTERM handler: {}", e))?;
        let mut sigint = signal(SignalKind::interrupt())
            .map_err(|e| anyhow::anyhow!("failed to install SIGINT handler: {}", e))?;

        self.start().await?;

        tracing::info!("pktgate-daemon running");
        let signal = loop {
            tokio::select! {
                _ = sighup.recv() => {
                    tracing::info!("SIGHUP received, reloading tables");
                    self.reload_tables().await;
                }
                _ = sigterm.recv() => break "SIGTERM",
                _ = sigint.recv() => break "SIGINT",
            }
        };
        tracing::info!(signal, "shutdown signal received");

        self.shutdown().await
    }

    /// Start the gate, the ingress (if enabled), and the ticker.
    ///
    /// On failure everything already started is rolled back.
    pub async fn start(&mut self) -> Result<()> {
        if !self.config.general.pid_file.is_empty() {
            self.pid_file = Some(PidFile::create(&self.config.general.pid_file)?);
        }

        if let Err(e) = self.gate.start().await {
            self.pid_file = None;
            return Err(anyhow::anyhow!("failed to start packet gate: {}", e));
        }

        if self.config.ingress.enabled {
            let spawned = match MirrorIngress::bind(&self.config.ingress).await {
                Ok(ingress) => ingress.spawn(&self.gate, self.shutdown.child_token()),
                Err(e) => Err(e),
            };
            match spawned {
                Ok(handle) => self.ingress = Some(handle),
                Err(e) => {
                    tracing::warn!("ingress startup failed, rolling back packet gate");
                    if let Err(stop_err) = self.gate.stop().await {
                        tracing::error!(error = %stop_err, "rollback of packet gate failed");
                    }
                    self.pid_file = None;
                    return Err(e);
                }
            }
        }

        record_build_info();
        self.ticker = Some(self.spawn_ticker());
        Ok(())
    }

    /// Reload the configured table file.
    ///
    /// Returns the new generation, or `None` when no file is configured or
    /// the reload failed (the previous tables stay published).
    pub async fn reload_tables(&self) -> Option<u64> {
        match self.gate.reload_tables().await {
            Ok(Some(generation)) => {
                tracing::info!(generation, "tables reloaded");
                Some(generation)
            }
            Ok(None) => {
                tracing::warn!("reload requested but no tables_path is configured");
                None
            }
            Err(e) => {
                tracing::error!(
                    error = %e,
                    generation = self.gate.tables().generation(),
                    "table reload failed, keeping last-known-good tables"
                );
                None
            }
        }
    }

    /// Stop everything that `start` spawned, then remove the PID file.
    pub async fn shutdown(&mut self) -> Result<()> {
        self.shutdown.cancel();
        if let Some(ingress) = self.ingress.take() {
            ingress.join().await;
        }
        if let Some(ticker) = self.ticker.take() {
            let _ = ticker.await;
        }

        let result = if self.gate.is_running() {
            self.gate
                .stop()
                .await
                .map_err(|e| anyhow::anyhow!("failed to stop packet gate: {}", e))
        } else {
            Ok(())
        };

        self.pid_file = None;
        self.shutdown = CancellationToken::new();
        result
    }

    /// Current aggregated health.
    pub async fn health(&self) -> DaemonHealth {
        let ingress_status = match &self.ingress {
            Some(handle) if handle.is_receiving() => HealthStatus::Healthy,
            Some(_) => HealthStatus::Unhealthy("receive loop exited".to_owned()),
            None => HealthStatus::Unhealthy("not running".to_owned()),
        };
        let components = vec![
            ComponentHealth::new("decision-engine", true, self.gate.health_check().await),
            ComponentHealth::new("mirror-ingress", self.config.ingress.enabled, ingress_status),
        ];

        DaemonHealth {
            status: aggregate_status(&components),
            uptime_secs: self.start_time.elapsed().as_secs(),
            tables_generation: self.gate.tables().generation(),
            components,
        }
    }

    pub fn config(&self) -> &PktgateConfig {
        &self.config
    }

    pub fn gate(&self) -> &PacketGate {
        &self.gate
    }

    pub fn ingress(&self) -> Option<&IngressHandle> {
        self.ingress.as_ref()
    }

    fn spawn_ticker(&self) -> JoinHandle<()> {
        let cancel = self.shutdown.clone();
        let start_time = self.start_time;
        let ingress_stats = self.ingress.as_ref().map(|h| h.stats().clone());

        tokio::spawn(async move {
            let mut interval = tokio::time::interval(TICK_INTERVAL);
            loop {
                tokio::select! {
                    _ = interval.tick() => {
                        #[allow(clippy::cast_precision_loss)]
                        metrics::gauge!(m::DAEMON_UPTIME_SECONDS)
                            .set(start_time.elapsed().as_secs() as f64);
                        if let Some(stats) = &ingress_stats {
                            stats.publish_metrics();
                        }
                    }
                    _ = cancel.cancelled() => break,
                }
            }
        })
    }
}

fn record_build_info() {
    metrics::gauge!(m::DAEMON_BUILD_INFO, "version" => env!("CARGO_PKG_VERSION")).set(1.0);
}
