//! PostgreSQL proxy repository.
//!
//! # Work distribution
//!
//! `get_proxies_to_check` selects with `FOR UPDATE SKIP LOCKED`, so
//! concurrent engine replicas lock disjoint row sets and never probe the
//! same proxy twice in one cycle:
//! ```sql
//! SELECT ... ORDER BY last_checked_at ASC NULLS FIRST
//!     LIMIT $1 FOR UPDATE SKIP LOCKED
//! ```
//!
//! # Pooler compatibility
//!
//! Every query runs with `persistent(false)`: a transaction-mode pooler
//! (PgBouncer et al.) multiplexes sessions and rejects named prepared
//! statements, so none may be created. This stays an implementation detail
//! of this adapter and never leaks into the trait contract.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::{PgPool, PgPoolOptions};

use crate::domain::{Anonymity, Protocol, Proxy, ProxyCandidate};
use crate::infra::error::{RepositoryError, Result};
use crate::infra::traits::ProxyRepository;

/// Rows per batched UPDATE. PostgreSQL caps a statement at ~32k bind
/// parameters, and smaller UNNEST arrays keep the plans cheap; one engine
/// flush (`batch_size` results) normally fits in a single chunk.
const MAX_UPDATE_ROWS: usize = 1000;

/// (id, ip, port, protocol, country, anonymity, latency_ms,
/// last_checked_at, created_at) as selected below.
type ProxyRow = (
    i64,
    String,
    i32,
    String,
    String,
    String,
    i32,
    Option<DateTime<Utc>>,
    DateTime<Utc>,
);

pub struct PgProxyRepository {
    pool: PgPool,
}

impl PgProxyRepository {
    /// Connect a fresh pool. `max_connections` is sized by the caller to
    /// roughly a tenth of the worker count; workers spend most of their
    /// time on probe I/O, not in SQL.
    pub async fn connect(database_url: &str, max_connections: u32) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await?;
        Ok(Self::new(pool))
    }

    /// Wrap an existing pool.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl ProxyRepository for PgProxyRepository {
    async fn save_batch(&self, candidates: &[ProxyCandidate]) -> Result<()> {
        if candidates.is_empty() {
            return Ok(());
        }

        // Row-at-a-time on one checked-out connection: rows before a bad
        // one stay committed and the error names the row that failed.
        let mut conn = self.pool.acquire().await?;
        for (index, candidate) in candidates.iter().enumerate() {
            sqlx::query(
                r#"
                INSERT INTO proxies (ip, port, protocol, created_at)
                VALUES ($1, $2, $3, NOW())
                ON CONFLICT (ip, port) DO NOTHING
                "#,
            )
            .bind(&candidate.ip)
            .bind(i32::from(candidate.port))
            .bind(candidate.protocol.map_or("", |p| p.as_str()))
            .persistent(false)
            .execute(&mut *conn)
            .await
            .map_err(|source| RepositoryError::BatchItem {
                index,
                address: candidate.address(),
                source,
            })?;
        }

        Ok(())
    }

    async fn get_proxies_to_check(&self, limit: usize) -> Result<Vec<Proxy>> {
        let rows: Vec<ProxyRow> = sqlx::query_as(
            r#"
            SELECT id, ip, port, protocol, country, anonymity, latency_ms,
                   last_checked_at, created_at
            FROM proxies
            ORDER BY last_checked_at ASC NULLS FIRST
            LIMIT $1
            FOR UPDATE SKIP LOCKED
            "#,
        )
        .bind(limit as i64)
        .persistent(false)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(row_into_proxy).collect())
    }

    async fn update_batch(&self, proxies: &[Proxy]) -> Result<()> {
        for chunk in proxies.chunks(MAX_UPDATE_ROWS) {
            let columns = UpdateColumns::from_proxies(chunk);

            // Single round trip per chunk. The CASE arms keep country and
            // protocol monotonic: a resolved value is never blanked.
            sqlx::query(
                r#"
                UPDATE proxies AS p SET
                    latency_ms = u.latency_ms,
                    last_checked_at = u.last_checked_at,
                    country = CASE WHEN u.country <> '' THEN u.country ELSE p.country END,
                    protocol = CASE WHEN u.protocol <> '' THEN u.protocol ELSE p.protocol END
                FROM UNNEST($1::bigint[], $2::int[], $3::timestamptz[], $4::text[], $5::text[])
                    AS u(id, latency_ms, last_checked_at, country, protocol)
                WHERE p.id = u.id
                "#,
            )
            .bind(&columns.ids)
            .bind(&columns.latencies)
            .bind(&columns.checked_at)
            .bind(&columns.countries)
            .bind(&columns.protocols)
            .persistent(false)
            .execute(&self.pool)
            .await?;
        }

        Ok(())
    }

    async fn count(&self) -> Result<i64> {
        let row: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM proxies")
            .persistent(false)
            .fetch_one(&self.pool)
            .await?;
        Ok(row.0)
    }
}

/// Parallel bind arrays for one chunk of the UNNEST-driven UPDATE.
struct UpdateColumns {
    ids: Vec<i64>,
    latencies: Vec<i32>,
    checked_at: Vec<Option<DateTime<Utc>>>,
    countries: Vec<String>,
    protocols: Vec<String>,
}

impl UpdateColumns {
    fn from_proxies(chunk: &[Proxy]) -> Self {
        let mut columns = Self {
            ids: Vec::with_capacity(chunk.len()),
            latencies: Vec::with_capacity(chunk.len()),
            checked_at: Vec::with_capacity(chunk.len()),
            countries: Vec::with_capacity(chunk.len()),
            protocols: Vec::with_capacity(chunk.len()),
        };
        for proxy in chunk {
            columns.ids.push(proxy.id);
            columns.latencies.push(proxy.latency_ms as i32);
            columns.checked_at.push(proxy.last_checked_at);
            columns.countries.push(proxy.country.clone());
            columns
                .protocols
                .push(proxy.protocol.map_or("", |p| p.as_str()).to_string());
        }
        columns
    }
}

fn row_into_proxy(row: ProxyRow) -> Proxy {
    let (id, ip, port, protocol, country, anonymity, latency_ms, last_checked_at, created_at) = row;
    Proxy {
        id,
        ip,
        port: port.clamp(0, i32::from(u16::MAX)) as u16,
        protocol: Protocol::parse(&protocol),
        country,
        anonymity: Anonymity::parse(&anonymity),
        latency_ms: latency_ms.max(0) as u32,
        last_checked_at,
        created_at: Some(created_at),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn checked_proxy(id: i64, latency_ms: u32) -> Proxy {
        Proxy {
            id,
            ip: format!("10.0.{}.{}", id / 256, id % 256),
            port: 8080,
            protocol: Some(Protocol::Http),
            country: String::new(),
            anonymity: None,
            latency_ms,
            last_checked_at: Some(Utc::now()),
            created_at: None,
        }
    }

    #[test]
    fn update_columns_mirror_the_chunk_row_for_row() {
        let now = Utc::now();
        let mut alive = checked_proxy(1, 230);
        alive.country = "DE".to_string();
        alive.last_checked_at = Some(now);
        let mut dead = checked_proxy(2, 0);
        dead.protocol = None;
        dead.last_checked_at = Some(now);

        let columns = UpdateColumns::from_proxies(&[alive, dead]);

        assert_eq!(columns.ids, vec![1, 2]);
        assert_eq!(columns.latencies, vec![230, 0]);
        assert_eq!(columns.checked_at, vec![Some(now), Some(now)]);
        // Empty country/protocol text is what the UPDATE's CASE arms key
        // on to leave a previously resolved value alone.
        assert_eq!(columns.countries, vec!["DE".to_string(), String::new()]);
        assert_eq!(columns.protocols, vec!["http".to_string(), String::new()]);
    }

    #[test]
    fn update_chunks_cover_every_result_in_order() {
        let proxies: Vec<Proxy> = (0..2347).map(|id| checked_proxy(id, 1)).collect();

        let chunks: Vec<&[Proxy]> = proxies.chunks(MAX_UPDATE_ROWS).collect();
        assert_eq!(chunks.len(), 3);
        for chunk in &chunks {
            assert!(chunk.len() <= MAX_UPDATE_ROWS);
        }

        let ids: Vec<i64> = chunks
            .iter()
            .flat_map(|chunk| UpdateColumns::from_proxies(chunk).ids)
            .collect();
        assert_eq!(ids, (0..2347).collect::<Vec<i64>>());
    }

    #[test]
    fn one_engine_flush_fits_in_a_single_update_chunk() {
        let proxies: Vec<Proxy> = (0..500).map(|id| checked_proxy(id, 1)).collect();
        assert_eq!(proxies.chunks(MAX_UPDATE_ROWS).count(), 1);
    }

    #[test]
    fn row_mapping_parses_enums_and_ids() {
        let now = Utc::now();
        let proxy = row_into_proxy((
            7,
            "10.0.0.1".to_string(),
            1080,
            "socks5".to_string(),
            "DE".to_string(),
            "elite".to_string(),
            120,
            Some(now),
            now,
        ));

        assert_eq!(proxy.id, 7);
        assert_eq!(proxy.port, 1080);
        assert_eq!(proxy.protocol, Some(Protocol::Socks5));
        assert_eq!(proxy.anonymity, Some(Anonymity::Elite));
        assert_eq!(proxy.country, "DE");
        assert_eq!(proxy.latency_ms, 120);
        assert_eq!(proxy.last_checked_at, Some(now));
        assert_eq!(proxy.created_at, Some(now));
    }

    #[test]
    fn row_mapping_treats_empty_columns_as_unset() {
        let now = Utc::now();
        let proxy = row_into_proxy((
            1,
            "10.0.0.1".to_string(),
            8080,
            String::new(),
            String::new(),
            String::new(),
            0,
            None,
            now,
        ));

        assert_eq!(proxy.protocol, None);
        assert_eq!(proxy.anonymity, None);
        assert!(proxy.country.is_empty());
        assert_eq!(proxy.last_checked_at, None);
    }
}
