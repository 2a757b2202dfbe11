//! Reference driver: one task per endpoint connection, each pulling signed transfers from its
//! own worker and broadcasting them at a fixed rate.
use crate::error::RuntimeError;
use governor::{Quota, RateLimiter};
use perpx_load::ledger::rest_url;
use perpx_load::{BroadcastMode, ClientFactory, GenerateError, Ledger, LedgerClient, TxSource};
use perpx_load_core::{ConfigError, ConnectionCounters, LoadConfig, RunStatistics};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use std::time::Instant;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn, Instrument};

/// Cumulative counters of every connection, indexed by connection id.
pub type SharedCounters = Arc<RwLock<Vec<ConnectionCounters>>>;

/// A group of transactors sharing one configuration and one counter table.
pub struct TransactorGroup {
    config: LoadConfig,
    factory: Arc<dyn ClientFactory>,
    counters: SharedCounters,
    cancel: CancellationToken,
    started: Instant,
}

struct Transactor {
    id: usize,
    source: Box<dyn TxSource>,
    ledger: LedgerClient,
    quota: Quota,
    budget: Option<Arc<AtomicU64>>,
    counters: SharedCounters,
    cancel: CancellationToken,
}

impl TransactorGroup {
    pub fn new(config: LoadConfig, factory: Arc<dyn ClientFactory>) -> Self {
        Self {
            config,
            factory,
            counters: Arc::new(RwLock::new(Vec::new())),
            cancel: CancellationToken::new(),
            started: Instant::now(),
        }
    }

    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn counters(&self) -> SharedCounters {
        self.counters.clone()
    }

    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn started(&self) -> Instant {
        self.started
    }

    /// Runs until the duration elapses, the transaction count is reached, or the group is
    /// cancelled. A worker whose account does not exist stops the whole group.
    #[instrument(name = "transactor-group", skip_all, fields(endpoints = self.config.endpoints.len(), connections = self.config.connections))]
    pub async fn run(mut self) -> Result<RunStatistics, RuntimeError> {
        self.factory.validate(&self.config)?;

        let budget = self.config.count.map(|c| Arc::new(AtomicU64::new(c)));
        let quota = Quota::per_second(self.config.rate);
        let mut transactors = Vec::new();
        for endpoint in &self.config.endpoints {
            let ledger = LedgerClient::new(&rest_url(endpoint)).map_err(|e| {
                ConfigError::InvalidEndpoint {
                    endpoint: endpoint.clone(),
                    reason: e.to_string(),
                }
            })?;
            for _ in 0..self.config.connections {
                let source = self.factory.new_client(&self.config, endpoint)?;
                let id = {
                    let mut counters = self.counters.write()?;
                    counters.push(ConnectionCounters {
                        endpoint: endpoint.clone(),
                        ..ConnectionCounters::default()
                    });
                    counters.len() - 1
                };
                transactors.push(Transactor {
                    id,
                    source,
                    ledger: ledger.clone(),
                    quota,
                    budget: budget.clone(),
                    counters: self.counters.clone(),
                    cancel: self.cancel.clone(),
                });
            }
        }

        info!(
            "Starting {} transactors at {} tx/s each",
            transactors.len(),
            self.config.rate
        );
        self.started = Instant::now();

        if let Some(duration) = self.config.duration {
            let cancel = self.cancel.clone();
            tokio::spawn(async move {
                tokio::select! {
                    _ = tokio::time::sleep(duration) => {
                        debug!("Run time of {} elapsed", humantime::format_duration(duration));
                        cancel.cancel();
                    }
                    _ = cancel.cancelled() => {}
                }
            });
        }

        let mut tasks = JoinSet::new();
        for transactor in transactors {
            tasks.spawn(transactor.run().in_current_span());
        }

        let mut failure = None;
        while let Some(res) = tasks.join_next().await {
            let res = res.map_err(RuntimeError::from).and_then(|r| r);
            if let Err(err) = res {
                error!("Stopping run: {err}");
                self.cancel.cancel();
                failure.get_or_insert(err);
            }
        }
        self.cancel.cancel();

        if let Some(err) = failure {
            return Err(err);
        }

        let stats = RunStatistics::from_counters(&self.counters.read()?, self.started.elapsed());
        if let Some(count) = self.config.count {
            if stats.errors > 0 {
                warn!(
                    "{} of {count} send attempts were rejected or failed",
                    stats.errors
                );
            }
        }
        debug!(
            "Sent {} transactions in {} ({:.1} tx/s, {} errors)",
            stats.total_txs,
            humantime::format_duration(std::time::Duration::from_secs(stats.elapsed.as_secs())),
            stats.mean_tps(),
            stats.errors
        );
        Ok(stats)
    }
}

impl Transactor {
    async fn run(self) -> Result<(), RuntimeError> {
        let limiter = RateLimiter::direct(self.quota);
        let worker = self.source.worker();
        debug!(connection = self.id, worker, "Transactor started");

        loop {
            if let Some(budget) = &self.budget {
                let reserved = budget.fetch_update(Ordering::SeqCst, Ordering::SeqCst, |left| {
                    left.checked_sub(1)
                });
                if reserved.is_err() {
                    break;
                }
            }

            tokio::select! {
                _ = self.cancel.cancelled() => break,
                _ = limiter.until_ready() => {}
            }

            let tx = match self.source.next_tx().await {
                Ok(tx) => tx,
                Err(GenerateError::Cancelled) => break,
                Err(err @ GenerateError::AccountNotFound { .. }) => {
                    self.cancel.cancel();
                    return Err(err.into());
                }
                Err(err) => {
                    warn!(connection = self.id, worker, "Unable to generate transaction: {err}");
                    self.record(|c| c.errors += 1)?;
                    continue;
                }
            };

            let size = tx.bytes().len() as u64;
            match self.ledger.broadcast(tx.bytes(), BroadcastMode::Async).await {
                Ok(res) if res.is_accepted() => {
                    self.record(|c| {
                        c.txs += 1;
                        c.bytes += size;
                    })?;
                }
                Ok(res) => {
                    debug!(worker, sequence = tx.sequence(), code = res.code, "Rejected: {}", res.log);
                    self.record(|c| c.errors += 1)?;
                }
                Err(err) => {
                    debug!(worker, "Broadcast failed: {err}");
                    self.record(|c| c.errors += 1)?;
                }
            }
        }

        debug!(connection = self.id, worker, "Transactor stopped");
        Ok(())
    }

    fn record(&self, update: impl FnOnce(&mut ConnectionCounters)) -> Result<(), RuntimeError> {
        let mut counters = self.counters.write()?;
        let counter = &mut counters[self.id];
        update(counter);

        #[cfg(feature = "metrics")]
        {
            metrics::counter!("perpx_load.txs", "endpoint" => counter.endpoint.clone())
                .absolute(counter.txs);
            metrics::counter!("perpx_load.errors", "endpoint" => counter.endpoint.clone())
                .absolute(counter.errors);
        }

        Ok(())
    }
}
