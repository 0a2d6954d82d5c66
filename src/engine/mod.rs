//! The validation pipeline engine.
//!
//! Four cooperating activities over two bounded queues:
//!
//! ```text
//! scrape loop ──► repository.save_batch
//! producer    ──► job queue ──► workers ×N ──► result queue ──► writer
//! ```
//!
//! Each queue holds `2 × batch_size` entries. A full job queue blocks the
//! producer and a full result queue blocks the workers, so a stalled
//! writer visibly slows the whole pipeline instead of buffering results
//! without bound.
//!
//! # Shutdown ordering
//!
//! On cancellation the scrape loop exits at its next select; the producer
//! returns, dropping the job sender and closing the queue; workers drain
//! the remaining (bounded) jobs — in-flight probes resolve dead
//! immediately but their results are still delivered, so
//! `last_checked_at` advances and a restart does not re-pick the same
//! rows; the last worker's exit drops the final result sender; the writer
//! drains, performs its final flush and returns. `run` awaits everything.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::{mpsc, Mutex};
use tokio::time::interval;
use tracing::{debug, error, info, warn};

use crate::checker::{CheckError, CheckResult, Checker};
use crate::domain::Proxy;
use crate::geoip::GeoIp;
use crate::infra::{ProxyRepository, RepositoryError, ShutdownCoordinator, ShutdownSignal};
use crate::scraper::{Source, SourceError};

/// Configuration for the validation engine.
///
/// Intervals and sizes of zero fall back to the defaults.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Concurrent probe workers.
    pub num_workers: usize,
    /// Rows per producer fetch and per writer flush.
    pub batch_size: usize,
    /// How often the sources are scraped.
    pub scrape_interval: Duration,
    /// How often the producer polls the store for work.
    pub producer_interval: Duration,
    /// Upper bound on how long a result sits unflushed in the writer.
    pub flush_interval: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            num_workers: 50,
            batch_size: 100,
            scrape_interval: Duration::from_secs(600),
            producer_interval: Duration::from_secs(1),
            flush_interval: Duration::from_secs(5),
        }
    }
}

impl EngineConfig {
    /// Load configuration from environment. The production defaults are
    /// larger than [`EngineConfig::default`]: each worker spends almost
    /// all of its time waiting on the network.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            num_workers: env_parse("PROXYPOOL_NUM_WORKERS").unwrap_or(1000),
            batch_size: env_parse("PROXYPOOL_BATCH_SIZE").unwrap_or(500),
            scrape_interval: env_parse("PROXYPOOL_SCRAPE_INTERVAL_SECS")
                .map(Duration::from_secs)
                .unwrap_or(defaults.scrape_interval),
            ..defaults
        }
        .normalized()
    }

    fn normalized(mut self) -> Self {
        let defaults = Self::default();
        if self.num_workers == 0 {
            self.num_workers = defaults.num_workers;
        }
        if self.batch_size == 0 {
            self.batch_size = defaults.batch_size;
        }
        if self.scrape_interval.is_zero() {
            self.scrape_interval = defaults.scrape_interval;
        }
        if self.producer_interval.is_zero() {
            self.producer_interval = defaults.producer_interval;
        }
        if self.flush_interval.is_zero() {
            self.flush_interval = defaults.flush_interval;
        }
        self
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|v| v.parse().ok())
}

/// Orchestrates scraping and the producer / worker pool / writer pipeline.
pub struct Engine<R> {
    repo: Arc<R>,
    sources: Vec<Arc<dyn Source>>,
    checker: Arc<Checker>,
    geoip: Option<Arc<GeoIp>>,
    config: EngineConfig,
}

impl<R: ProxyRepository + 'static> Engine<R> {
    pub fn new(
        repo: Arc<R>,
        sources: Vec<Arc<dyn Source>>,
        checker: Checker,
        geoip: Option<GeoIp>,
        config: EngineConfig,
    ) -> Self {
        Self {
            repo,
            sources,
            checker: Arc::new(checker),
            geoip: geoip.map(Arc::new),
            config: config.normalized(),
        }
    }

    /// Run until the coordinator fires, then drain and return.
    ///
    /// Transient repository failures are logged and absorbed; a fatal one
    /// initiates shutdown and is returned once the pipeline has unwound.
    pub async fn run(self, shutdown: Arc<ShutdownCoordinator>) -> Result<(), RepositoryError> {
        let Engine {
            repo,
            sources,
            checker,
            geoip,
            config,
        } = self;

        info!(
            workers = config.num_workers,
            batch_size = config.batch_size,
            sources = sources.len(),
            "Starting validation engine"
        );

        let capacity = config.batch_size * 2;
        let (job_tx, job_rx) = mpsc::channel::<Proxy>(capacity);
        let job_rx = Arc::new(Mutex::new(job_rx));
        let (result_tx, result_rx) = mpsc::channel::<Proxy>(capacity);

        let scraper = tokio::spawn(run_scrape_loop(
            repo.clone(),
            sources,
            shutdown.clone(),
            config.scrape_interval,
        ));

        let producer = tokio::spawn(run_producer(
            repo.clone(),
            job_tx,
            shutdown.clone(),
            config.clone(),
        ));

        let mut workers = Vec::with_capacity(config.num_workers);
        for _ in 0..config.num_workers {
            workers.push(tokio::spawn(run_worker(
                job_rx.clone(),
                result_tx.clone(),
                checker.clone(),
                geoip.clone(),
                shutdown.signal(),
            )));
        }
        // The workers now hold the only result senders: the queue closes
        // exactly when the last worker exits.
        drop(result_tx);

        let writer = tokio::spawn(run_writer(repo, result_rx, shutdown, config));

        let mut outcome = Ok(());
        for (task, handle) in [("scrape loop", scraper), ("producer", producer)] {
            match handle.await {
                Ok(result) => {
                    if outcome.is_ok() {
                        outcome = result;
                    }
                }
                Err(err) => error!(task, error = %err, "Pipeline task panicked"),
            }
        }
        for handle in workers {
            if let Err(err) = handle.await {
                error!(task = "worker", error = %err, "Pipeline task panicked");
            }
        }
        match writer.await {
            Ok(result) => {
                if outcome.is_ok() {
                    outcome = result;
                }
            }
            Err(err) => error!(task = "writer", error = %err, "Pipeline task panicked"),
        }

        info!("Engine stopped");
        outcome
    }
}

/// Periodically walks the sources and saves what they yield. The first
/// cycle runs immediately at startup.
async fn run_scrape_loop<R: ProxyRepository>(
    repo: Arc<R>,
    sources: Vec<Arc<dyn Source>>,
    shutdown: Arc<ShutdownCoordinator>,
    every: Duration,
) -> Result<(), RepositoryError> {
    let signal = shutdown.signal();
    let mut ticker = interval(every);
    loop {
        tokio::select! {
            _ = signal.wait() => return Ok(()),
            _ = ticker.tick() => {}
        }
        scrape_cycle(repo.as_ref(), &sources, &shutdown).await?;
    }
}

async fn scrape_cycle<R: ProxyRepository>(
    repo: &R,
    sources: &[Arc<dyn Source>],
    shutdown: &ShutdownCoordinator,
) -> Result<(), RepositoryError> {
    let signal = shutdown.signal();
    for source in sources {
        if signal.is_shutdown() {
            return Ok(());
        }
        info!(source = source.name(), "Scraping");
        let candidates = match source.fetch(&signal).await {
            Ok(candidates) => candidates,
            Err(SourceError::Cancelled) => return Ok(()),
            Err(err) => {
                warn!(source = source.name(), error = %err, "Scrape failed");
                continue;
            }
        };
        if candidates.is_empty() {
            continue;
        }
        match repo.save_batch(&candidates).await {
            Ok(()) => {
                info!(
                    source = source.name(),
                    count = candidates.len(),
                    "Saved scraped proxies"
                );
            }
            Err(err) if err.is_transient() => {
                warn!(source = source.name(), error = %err, "Saving scraped proxies failed");
            }
            Err(err) => {
                error!(source = source.name(), error = %err, "Saving scraped proxies failed fatally");
                shutdown.shutdown();
                return Err(err);
            }
        }
    }

    // Pool-size telemetry once per cycle.
    match repo.count().await {
        Ok(total) => info!(total, "Scrape cycle finished"),
        Err(err) => warn!(error = %err, "Counting proxies failed"),
    }
    Ok(())
}

/// Polls the store for the stalest proxies and feeds the job queue. The
/// blocking enqueue is the backpressure seam: a saturated pipeline stops
/// the database polling entirely.
async fn run_producer<R: ProxyRepository>(
    repo: Arc<R>,
    jobs: mpsc::Sender<Proxy>,
    shutdown: Arc<ShutdownCoordinator>,
    config: EngineConfig,
) -> Result<(), RepositoryError> {
    let signal = shutdown.signal();
    let mut ticker = interval(config.producer_interval);
    loop {
        tokio::select! {
            // Returning drops `jobs`, which closes the queue and tells the
            // workers to drain.
            _ = signal.wait() => return Ok(()),
            _ = ticker.tick() => {}
        }

        let batch = match repo.get_proxies_to_check(config.batch_size).await {
            Ok(batch) => batch,
            Err(err) if err.is_transient() => {
                warn!(error = %err, "Producer fetch failed");
                continue;
            }
            Err(err) => {
                error!(error = %err, "Producer fetch failed fatally");
                shutdown.shutdown();
                return Err(err);
            }
        };
        if batch.is_empty() {
            continue;
        }
        debug!(count = batch.len(), "Queueing proxies for validation");

        for proxy in batch {
            tokio::select! {
                _ = signal.wait() => return Ok(()),
                permit = jobs.reserve() => match permit {
                    Ok(permit) => permit.send(proxy),
                    // All workers are gone; nothing left to feed.
                    Err(_) => return Ok(()),
                }
            }
        }
    }
}

/// One probe worker. Runs until the job queue is closed and drained.
async fn run_worker(
    jobs: Arc<Mutex<mpsc::Receiver<Proxy>>>,
    results: mpsc::Sender<Proxy>,
    checker: Arc<Checker>,
    geoip: Option<Arc<GeoIp>>,
    signal: ShutdownSignal,
) {
    loop {
        // The receiver lock is held only for the dequeue itself.
        let job = { jobs.lock().await.recv().await };
        let Some(mut proxy) = job else { return };

        let outcome = checker.check(&signal, &proxy).await;
        apply_outcome(&mut proxy, outcome, geoip.as_deref(), Utc::now());

        if results.send(proxy).await.is_err() {
            return;
        }
    }
}

/// Fold a probe outcome into the proxy record.
///
/// The check timestamp advances even for dead or cancelled probes so the
/// producer does not immediately re-select the same rows.
fn apply_outcome(
    proxy: &mut Proxy,
    outcome: Result<CheckResult, CheckError>,
    geoip: Option<&GeoIp>,
    now: DateTime<Utc>,
) {
    proxy.last_checked_at = Some(now);
    match outcome {
        Ok(result) if result.alive => {
            proxy.latency_ms = result.latency_ms;
            if let Some(geoip) = geoip {
                if let Ok(country) = geoip.lookup(&proxy.ip) {
                    if !country.iso_code.is_empty() {
                        proxy.country = country.iso_code;
                    }
                }
            }
        }
        Ok(_) | Err(CheckError::Cancelled) => proxy.latency_ms = 0,
        Err(err) => {
            warn!(proxy = %proxy.address(), error = %err, "Probe rejected proxy");
            proxy.latency_ms = 0;
        }
    }
}

/// Accumulates results and flushes them in batches: on size, on the flush
/// tick, once when shutdown fires, and finally when the queue closes.
async fn run_writer<R: ProxyRepository>(
    repo: Arc<R>,
    mut results: mpsc::Receiver<Proxy>,
    shutdown: Arc<ShutdownCoordinator>,
    config: EngineConfig,
) -> Result<(), RepositoryError> {
    let signal = shutdown.signal();
    let mut buffer: Vec<Proxy> = Vec::with_capacity(config.batch_size);
    let mut ticker = interval(config.flush_interval);
    let mut cancel_seen = false;

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                flush(repo.as_ref(), &mut buffer, &shutdown).await?;
            }
            _ = signal.wait(), if !cancel_seen => {
                cancel_seen = true;
                flush(repo.as_ref(), &mut buffer, &shutdown).await?;
            }
            received = results.recv() => match received {
                Some(proxy) => {
                    buffer.push(proxy);
                    if buffer.len() >= config.batch_size {
                        flush(repo.as_ref(), &mut buffer, &shutdown).await?;
                    }
                }
                None => {
                    flush(repo.as_ref(), &mut buffer, &shutdown).await?;
                    return Ok(());
                }
            }
        }
    }
}

async fn flush<R: ProxyRepository>(
    repo: &R,
    buffer: &mut Vec<Proxy>,
    shutdown: &ShutdownCoordinator,
) -> Result<(), RepositoryError> {
    if buffer.is_empty() {
        return Ok(());
    }
    let result = repo.update_batch(buffer).await;
    let count = buffer.len();
    // The buffer clears on transient failure too: dropped rows are simply
    // re-selected on a later producer tick, and the pipeline keeps moving.
    buffer.clear();
    match result {
        Ok(()) => {
            info!(count, "Flushed check results");
            Ok(())
        }
        Err(err) if err.is_transient() => {
            warn!(count, error = %err, "Flush failed; dropping batch");
            Ok(())
        }
        Err(err) => {
            error!(error = %err, "Flush failed fatally");
            shutdown.shutdown();
            Err(err)
        }
    }
}
