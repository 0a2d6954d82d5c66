//! Trait definition for the persistence seam.

use async_trait::async_trait;
#[cfg(test)]
use mockall::automock;

use crate::domain::{Proxy, ProxyCandidate};

use super::error::Result;

/// Persistence contract for the proxy pool.
///
/// Invariant: `(ip, port)` is the natural key; inserting a colliding
/// candidate is a silent no-op and never overwrites existing metadata.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait ProxyRepository: Send + Sync {
    /// Insert candidates that are not yet in the pool.
    ///
    /// Atomicity is per row, not per batch: the first failing row aborts
    /// the call with an error naming it, and earlier rows stay committed.
    async fn save_batch(&self, candidates: &[ProxyCandidate]) -> Result<()>;

    /// Select up to `limit` proxies, stalest first with never-checked rows
    /// ahead of everything else.
    ///
    /// Selected rows are locked and rows locked by a concurrent caller are
    /// skipped, so replicated engines see disjoint work sets.
    async fn get_proxies_to_check(&self, limit: usize) -> Result<Vec<Proxy>>;

    /// Write check results back by id in one round trip. Unknown ids are
    /// silently ignored; a non-empty `country` or `protocol` is never
    /// overwritten with an empty one.
    async fn update_batch(&self, proxies: &[Proxy]) -> Result<()>;

    /// Total number of rows in the pool. Telemetry only.
    async fn count(&self) -> Result<i64>;
}
