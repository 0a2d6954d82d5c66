//! Single-proxy liveness probing.
//!
//! A probe is one `HEAD` request to a fixed target, routed through the
//! candidate proxy with its declared scheme. A proxy that fails to forward
//! traffic is a valid *result*, not an error; the only errors this module
//! returns are programmer faults (bad target, unbuildable proxy address)
//! and cancellation.

use std::time::{Duration, Instant};

use reqwest::{Client, Proxy as UpstreamProxy, Url};
use thiserror::Error;

use crate::domain::Proxy;
use crate::infra::ShutdownSignal;

pub const DEFAULT_TARGET_URL: &str = "http://google.com";
pub const DEFAULT_PROBE_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Error, Debug)]
pub enum CheckError {
    #[error("invalid target url: {0}")]
    InvalidTarget(String),

    #[error("invalid proxy address {address}: {source}")]
    InvalidProxy {
        address: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("failed to build probe client: {0}")]
    Client(#[source] reqwest::Error),

    /// Distinguishable from the malformed-input errors above: the probe
    /// was aborted by the shutdown signal, not rejected.
    #[error("probe cancelled")]
    Cancelled,
}

/// Outcome of a single probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CheckResult {
    pub alive: bool,
    /// Wall-clock milliseconds from dispatch to status line; 0 iff dead.
    pub latency_ms: u32,
}

impl CheckResult {
    pub fn dead() -> Self {
        Self {
            alive: false,
            latency_ms: 0,
        }
    }
}

/// Probes proxies against a fixed target URL.
pub struct Checker {
    target_url: Url,
    timeout: Duration,
}

impl Checker {
    /// An unparseable target URL is rejected here, once, instead of on
    /// every probe.
    pub fn new(target_url: &str, timeout: Duration) -> Result<Self, CheckError> {
        let target_url = Url::parse(target_url)
            .map_err(|err| CheckError::InvalidTarget(format!("{target_url}: {err}")))?;
        Ok(Self {
            target_url,
            timeout,
        })
    }

    /// Probe a single proxy.
    ///
    /// The per-probe timeout is independent of (and stricter than) the
    /// shutdown signal; a timed-out or refused probe resolves to a dead
    /// result rather than an error.
    pub async fn check(
        &self,
        shutdown: &ShutdownSignal,
        proxy: &Proxy,
    ) -> Result<CheckResult, CheckError> {
        let address = proxy.url();
        let upstream = UpstreamProxy::all(&address).map_err(|source| CheckError::InvalidProxy {
            address: address.clone(),
            source,
        })?;

        // Fresh transport per probe; probes must not share connections.
        let client = Client::builder()
            .proxy(upstream)
            .timeout(self.timeout)
            .pool_max_idle_per_host(0)
            .build()
            .map_err(CheckError::Client)?;

        let start = Instant::now();
        let response = tokio::select! {
            _ = shutdown.wait() => return Err(CheckError::Cancelled),
            response = client.head(self.target_url.clone()).send() => response,
        };

        match response {
            Ok(response) if (200..400).contains(&response.status().as_u16()) => {
                // A live probe never reports 0 ms; the store reads that as dead.
                let latency_ms = (start.elapsed().as_millis() as u32).max(1);
                Ok(CheckResult {
                    alive: true,
                    latency_ms,
                })
            }
            _ => Ok(CheckResult::dead()),
        }
    }
}
