//! Candidate proxy sources.
//!
//! A source yields a finite batch of `host:port` candidates labeled with an
//! out-of-band protocol hint. One source failing never aborts a scrape
//! cycle; the engine logs it and moves on.

mod sources;

use async_trait::async_trait;
use thiserror::Error;

pub use sources::{default_sources, http_client, TextListSource, USER_AGENT};

use crate::domain::{Protocol, ProxyCandidate};
use crate::infra::ShutdownSignal;

#[derive(Error, Debug)]
pub enum SourceError {
    /// The remote endpoint could not be reached.
    #[error("fetch failed: {0}")]
    Unavailable(#[source] reqwest::Error),

    /// The remote endpoint answered with a non-success status.
    #[error("unexpected status: {0}")]
    Status(reqwest::StatusCode),

    /// The payload could not be decoded. Bad lines — even all of them —
    /// are skipped silently and never surface here.
    #[error("malformed payload: {0}")]
    Malformed(String),

    #[error("fetch cancelled")]
    Cancelled,
}

/// A remote list of proxy candidates.
#[async_trait]
pub trait Source: Send + Sync {
    /// Stable human label, unique within the configured source set.
    fn name(&self) -> &str;

    /// Fetch the candidate list. Non-restartable; the engine calls it anew
    /// each scrape cycle.
    async fn fetch(&self, shutdown: &ShutdownSignal)
        -> Result<Vec<ProxyCandidate>, SourceError>;
}

/// Parse a UTF-8 proxy list, one `host:port` per line.
///
/// Blank lines and `#` comments are tolerated; a line without a `:` or
/// whose port is not a decimal in `[1, 65535]` is skipped. The protocol is
/// not encoded in the payload, it is declared by whoever registered the
/// source.
pub fn parse_proxy_list(payload: &str, protocol: Option<Protocol>) -> Vec<ProxyCandidate> {
    payload
        .lines()
        .filter_map(|line| parse_line(line, protocol))
        .collect()
}

fn parse_line(line: &str, protocol: Option<Protocol>) -> Option<ProxyCandidate> {
    let line = line.trim();
    if line.is_empty() || line.starts_with('#') {
        return None;
    }

    // Split on the first colon only; anything trailing makes the port
    // unparseable and skips the line.
    let (host, port) = line.split_once(':')?;
    if host.is_empty() {
        return None;
    }
    let port: u16 = port.parse().ok()?;
    if port == 0 {
        return None;
    }

    Some(ProxyCandidate::new(host, port, protocol))
}
