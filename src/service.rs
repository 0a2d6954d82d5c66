//! Process bootstrap for the proxy pool service.
//!
//! This module wires together:
//! - configuration
//! - database connection pool and migrations
//! - the source registry, checker and optional GeoIP enrichment
//! - signal handling and the engine

use std::sync::Arc;
use std::time::Duration;

use tracing::{info, warn};

use crate::checker::{Checker, DEFAULT_PROBE_TIMEOUT, DEFAULT_TARGET_URL};
use crate::engine::{Engine, EngineConfig};
use crate::geoip::GeoIp;
use crate::infra::{shutdown_signal, PgProxyRepository, ShutdownCoordinator};
use crate::scraper::{default_sources, http_client};
use crate::telemetry::{init_telemetry, TelemetryConfig};

pub const DEFAULT_GEOIP_DB_PATH: &str = "data/GeoLite2-City.mmdb";

/// Service configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// PostgreSQL connection URL. Required.
    pub database_url: String,
    /// Path to the MMDB file; enrichment is skipped if it cannot be read.
    pub geoip_db_path: String,
    /// Maximum database connections.
    pub max_connections: u32,
    /// Probe target URL.
    pub check_target: String,
    /// Per-probe timeout.
    pub check_timeout: Duration,
}

impl Config {
    /// Load configuration from environment variables. A missing
    /// `DATABASE_URL` is a startup failure.
    pub fn from_env(engine: &EngineConfig) -> anyhow::Result<Self> {
        let database_url =
            std::env::var("DATABASE_URL").map_err(|_| anyhow::anyhow!("DATABASE_URL is not set"))?;

        let geoip_db_path = std::env::var("GEOIP_DB_PATH")
            .unwrap_or_else(|_| DEFAULT_GEOIP_DB_PATH.to_string());

        // Workers spend most of their time on probe I/O: one connection
        // per ten of them is empirically enough to keep SQL flowing.
        let max_connections: u32 = std::env::var("MAX_DB_CONNECTIONS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or_else(|| (engine.num_workers / 10).max(10) as u32);

        let check_target = std::env::var("PROXYPOOL_CHECK_TARGET")
            .unwrap_or_else(|_| DEFAULT_TARGET_URL.to_string());

        let check_timeout = std::env::var("PROXYPOOL_CHECK_TIMEOUT_SECS")
            .ok()
            .and_then(|v| v.parse().ok())
            .map(Duration::from_secs)
            .unwrap_or(DEFAULT_PROBE_TIMEOUT);

        Ok(Self {
            database_url,
            geoip_db_path,
            max_connections,
            check_target,
            check_timeout,
        })
    }
}

/// Start the service and block until shutdown completes.
pub async fn run() -> anyhow::Result<()> {
    init_telemetry(&TelemetryConfig::from_env());

    info!("Starting proxypool v{}", env!("CARGO_PKG_VERSION"));

    let engine_config = EngineConfig::from_env();
    let config = Config::from_env(&engine_config)?;
    info!(
        workers = engine_config.num_workers,
        batch_size = engine_config.batch_size,
        max_connections = config.max_connections,
        target = %config.check_target,
        "Configuration loaded"
    );

    let repo = PgProxyRepository::connect(&config.database_url, config.max_connections).await?;
    info!("Connected to PostgreSQL");

    crate::migrations::run(repo.pool()).await?;
    info!("Database migrations applied");

    let client = http_client()?;
    let sources = default_sources(&client);
    let checker = Checker::new(&config.check_target, config.check_timeout)?;

    let geoip = match GeoIp::open(&config.geoip_db_path) {
        Ok(geoip) => {
            info!(path = %config.geoip_db_path, "GeoIP enrichment enabled");
            Some(geoip)
        }
        Err(err) => {
            warn!(error = %err, "GeoIP disabled");
            None
        }
    };

    let shutdown = Arc::new(ShutdownCoordinator::new());
    let signal_task = {
        let shutdown = shutdown.clone();
        tokio::spawn(async move {
            shutdown_signal().await;
            shutdown.shutdown();
        })
    };

    let engine = Engine::new(Arc::new(repo), sources, checker, geoip, engine_config);
    engine.run(shutdown).await?;

    signal_task.abort();
    info!("Shutdown complete");
    Ok(())
}
