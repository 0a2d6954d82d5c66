//! Common test fixtures: an in-memory repository, static sources and a
//! loopback HTTP proxy stub.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::atomic::{AtomicI64, AtomicUsize, Ordering};

use async_trait::async_trait;
use chrono::Utc;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::sync::{Mutex, RwLock};
use tokio::task::JoinHandle;

use proxypool::domain::{Protocol, Proxy, ProxyCandidate};
use proxypool::infra::{ProxyRepository, Result, ShutdownSignal};
use proxypool::scraper::{Source, SourceError};

pub fn candidate(ip: &str, port: u16, protocol: Protocol) -> ProxyCandidate {
    ProxyCandidate::new(ip, port, Some(protocol))
}

/// Repository backed by a plain `Vec`. Mirrors the store contract closely
/// enough for pipeline tests: natural-key dedup on insert, stalest-first
/// selection, monotonic country/protocol on update.
///
/// `gate` lets a test stall `update_batch` by holding the write half.
pub struct InMemoryRepository {
    rows: Mutex<Vec<Proxy>>,
    next_id: AtomicI64,
    pub select_calls: AtomicUsize,
    pub gate: RwLock<()>,
}

impl InMemoryRepository {
    pub fn new() -> Self {
        Self {
            rows: Mutex::new(Vec::new()),
            next_id: AtomicI64::new(1),
            select_calls: AtomicUsize::new(0),
            gate: RwLock::new(()),
        }
    }

    pub async fn snapshot(&self) -> Vec<Proxy> {
        self.rows.lock().await.clone()
    }

    pub async fn checked_count(&self) -> usize {
        self.rows
            .lock()
            .await
            .iter()
            .filter(|p| p.last_checked_at.is_some())
            .count()
    }
}

#[async_trait]
impl ProxyRepository for InMemoryRepository {
    async fn save_batch(&self, candidates: &[ProxyCandidate]) -> Result<()> {
        let mut rows = self.rows.lock().await;
        for candidate in candidates {
            let exists = rows
                .iter()
                .any(|row| row.ip == candidate.ip && row.port == candidate.port);
            if exists {
                continue;
            }
            rows.push(Proxy {
                id: self.next_id.fetch_add(1, Ordering::SeqCst),
                ip: candidate.ip.clone(),
                port: candidate.port,
                protocol: candidate.protocol,
                country: String::new(),
                anonymity: None,
                latency_ms: 0,
                last_checked_at: None,
                created_at: Some(Utc::now()),
            });
        }
        Ok(())
    }

    async fn get_proxies_to_check(&self, limit: usize) -> Result<Vec<Proxy>> {
        self.select_calls.fetch_add(1, Ordering::SeqCst);
        let rows = self.rows.lock().await;
        let mut selected: Vec<Proxy> = rows.clone();
        // `None` sorts before any `Some`: never-checked rows come first.
        selected.sort_by_key(|p| p.last_checked_at);
        selected.truncate(limit);
        Ok(selected)
    }

    async fn update_batch(&self, proxies: &[Proxy]) -> Result<()> {
        let _gate = self.gate.read().await;
        let mut rows = self.rows.lock().await;
        for update in proxies {
            if let Some(row) = rows.iter_mut().find(|row| row.id == update.id) {
                row.latency_ms = update.latency_ms;
                row.last_checked_at = update.last_checked_at;
                if !update.country.is_empty() {
                    row.country = update.country.clone();
                }
                if update.protocol.is_some() {
                    row.protocol = update.protocol;
                }
            }
        }
        Ok(())
    }

    async fn count(&self) -> Result<i64> {
        Ok(self.rows.lock().await.len() as i64)
    }
}

/// A source that always yields the same candidate list.
pub struct StaticSource {
    name: String,
    candidates: Vec<ProxyCandidate>,
}

impl StaticSource {
    pub fn new(name: &str, candidates: Vec<ProxyCandidate>) -> Self {
        Self {
            name: name.to_string(),
            candidates,
        }
    }
}

#[async_trait]
impl Source for StaticSource {
    fn name(&self) -> &str {
        &self.name
    }

    async fn fetch(&self, _shutdown: &ShutdownSignal) -> std::result::Result<Vec<ProxyCandidate>, SourceError> {
        Ok(self.candidates.clone())
    }
}

/// A source that always fails, for one-bad-source-does-not-abort tests.
pub struct BrokenSource;

#[async_trait]
impl Source for BrokenSource {
    fn name(&self) -> &str {
        "broken"
    }

    async fn fetch(&self, _shutdown: &ShutdownSignal) -> std::result::Result<Vec<ProxyCandidate>, SourceError> {
        Err(SourceError::Malformed("payload is not valid UTF-8".to_string()))
    }
}

/// Minimal forwarding-proxy stand-in: accepts a connection, reads the
/// request head, answers `200 OK`. Good enough to make a HEAD probe
/// through it succeed.
pub async fn spawn_proxy_stub() -> (SocketAddr, JoinHandle<()>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let handle = tokio::spawn(async move {
        loop {
            let Ok((mut stream, _)) = listener.accept().await else {
                return;
            };
            tokio::spawn(async move {
                let mut buf = [0u8; 1024];
                let mut head = Vec::new();
                loop {
                    match stream.read(&mut buf).await {
                        Ok(0) | Err(_) => break,
                        Ok(n) => {
                            head.extend_from_slice(&buf[..n]);
                            if head.windows(4).any(|w| w == b"\r\n\r\n") {
                                break;
                            }
                        }
                    }
                }
                let _ = stream
                    .write_all(b"HTTP/1.1 200 OK\r\nContent-Length: 0\r\n\r\n")
                    .await;
                let _ = stream.shutdown().await;
            });
        }
    });
    (addr, handle)
}

/// A loopback port with nothing listening on it.
pub async fn unused_port() -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    drop(listener);
    port
}
