//! Proxy pool validation service.
//!
//! Continuously discovers public proxy servers (HTTP, HTTPS, SOCKS4,
//! SOCKS5) from remote text lists, probes them for liveness at high
//! concurrency, and persists liveness and metadata into PostgreSQL.
//! Clients query the store directly; this crate deliberately has no
//! serving API.
//!
//! ## Modules
//!
//! - [`domain`] - the Proxy entity and its enums
//! - [`scraper`] - candidate sources (remote text lists)
//! - [`checker`] - the single-proxy liveness probe
//! - [`geoip`] - optional country enrichment
//! - [`infra`] - persistence, errors, shutdown plumbing
//! - [`engine`] - the scraping loop and validation pipeline
//! - [`service`] - process bootstrap

pub mod checker;
pub mod domain;
pub mod engine;
pub mod geoip;
pub mod infra;
pub mod migrations;
pub mod scraper;
pub mod service;
pub mod telemetry;

// Re-export commonly used types
pub use checker::{CheckError, CheckResult, Checker};
pub use domain::{Anonymity, Protocol, Proxy, ProxyCandidate};
pub use engine::{Engine, EngineConfig};
pub use infra::{
    PgProxyRepository, ProxyRepository, RepositoryError, Result, ShutdownCoordinator,
    ShutdownSignal,
};
pub use scraper::{Source, SourceError};
