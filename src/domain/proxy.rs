//! The proxy entity and its supporting types.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Forwarding protocol spoken by a proxy.
///
/// Stored as lowercase text; an empty column means the protocol was never
/// declared by a source nor resolved by a check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    Http,
    Https,
    Socks4,
    Socks5,
}

impl Protocol {
    pub fn as_str(&self) -> &'static str {
        match self {
            Protocol::Http => "http",
            Protocol::Https => "https",
            Protocol::Socks4 => "socks4",
            Protocol::Socks5 => "socks5",
        }
    }

    /// Parse a stored column value. Empty or unknown strings map to `None`.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "http" => Some(Protocol::Http),
            "https" => Some(Protocol::Https),
            "socks4" => Some(Protocol::Socks4),
            "socks5" => Some(Protocol::Socks5),
            _ => None,
        }
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Anonymity classification. Reserved: the column exists but the minimal
/// liveness probe never populates it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Anonymity {
    Transparent,
    Anonymous,
    Elite,
}

impl Anonymity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Anonymity::Transparent => "transparent",
            Anonymity::Anonymous => "anonymous",
            Anonymity::Elite => "elite",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "transparent" => Some(Anonymity::Transparent),
            "anonymous" => Some(Anonymity::Anonymous),
            "elite" => Some(Anonymity::Elite),
            _ => None,
        }
    }
}

impl fmt::Display for Anonymity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A `host:port` pair as emitted by a source, before the store has assigned
/// an identity. Only the scraper produces these and only `save_batch`
/// consumes them, so an unidentified record can never reach the writer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProxyCandidate {
    pub ip: String,
    pub port: u16,
    pub protocol: Option<Protocol>,
}

impl ProxyCandidate {
    pub fn new(ip: impl Into<String>, port: u16, protocol: Option<Protocol>) -> Self {
        Self {
            ip: ip.into(),
            port,
            protocol,
        }
    }

    /// The `ip:port` natural key.
    pub fn address(&self) -> String {
        format!("{}:{}", self.ip, self.port)
    }
}

/// A proxy server row.
///
/// `latency_ms == 0` means the most recent check failed; whether the proxy
/// was ever tried at all is carried by `last_checked_at`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Proxy {
    /// Store-assigned surrogate key.
    pub id: i64,
    pub ip: String,
    pub port: u16,
    pub protocol: Option<Protocol>,
    /// ISO-3166 alpha-2 code; empty until a successful check resolved it.
    pub country: String,
    pub anonymity: Option<Anonymity>,
    pub latency_ms: u32,
    pub last_checked_at: Option<DateTime<Utc>>,
    /// Set by the store on first insert; `None` only on records that have
    /// not round-tripped through it.
    pub created_at: Option<DateTime<Utc>>,
}

impl Proxy {
    /// The `ip:port` natural key.
    pub fn address(&self) -> String {
        format!("{}:{}", self.ip, self.port)
    }

    /// Full URL form, e.g. `socks5://1.2.3.4:1080`. An undeclared protocol
    /// defaults to `http`.
    pub fn url(&self) -> String {
        let scheme = self.protocol.map_or("http", |p| p.as_str());
        format!("{}://{}:{}", scheme, self.ip, self.port)
    }
}
