//! Scheduler — fixed-cadence driver for all open positions.
//!
//! Responsibilities:
//! - Fire one tick per interval at every open position's worker
//! - Open new positions from fresh scoring confirmations
//! - Publish config reloads to all workers
//! - Collect finished workers and hand back final positions on shutdown
//!
//! Non-Responsibilities:
//! - Per-position decisions (lifecycle controller inside each worker)
//! - Retrying rejected growth orders (the position's retry counters)
//!
//! Rejected entry orders are retried on later cycles while the same
//! confirmation stays fresh, up to `engine.max_order_retries`; after that the
//! ticker waits for a new confirmation.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use riskpilot_core::config::{ConfigError, StrategyConfig};
use riskpilot_core::domain::{EventType, Position, PositionEvent, PositionId, ScoringResult};
use riskpilot_core::lifecycle::{BookState, LifecycleController};
use thiserror::Error;
use tokio::sync::watch;
use tokio::task::JoinError;
use tokio::time::{timeout, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use crate::journal::{EventJournal, SharedJournal};
use crate::ports::{ExecutionError, Ports};
use crate::worker::{PositionWorker, WorkerHandle};

#[derive(Debug, Error)]
pub enum RunnerError {
    #[error("config error: {0}")]
    Config(#[from] ConfigError),

    #[error("worker for {ticker} ({position_id}) failed: {source}")]
    WorkerFailed {
        position_id: PositionId,
        ticker: String,
        source: JoinError,
    },

    #[error("worker for position {0} is no longer running")]
    WorkerGone(PositionId),

    #[error("no open position {0}")]
    UnknownPosition(PositionId),
}

/// Counters for one scheduler cycle.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CycleReport {
    pub ticks_sent: usize,
    pub ticks_missed: usize,
    pub positions_opened: usize,
    pub entries_rejected: usize,
    /// Candidates skipped because their entry hit the retry limit.
    pub entries_suspended: usize,
    pub positions_finished: usize,
}

/// How one entry attempt ended.
enum EntryAttempt {
    Opened,
    /// Planner, data or equity said no. Not counted against the retry limit.
    Skipped,
    OrderFailed { position_id: PositionId, cause: String },
}

/// Consecutive entry order failures for one confirmation of one ticker.
#[derive(Debug, Clone, Copy)]
struct EntryFailures {
    confirmation_at: DateTime<Utc>,
    count: u32,
}

pub struct Scheduler {
    config_tx: watch::Sender<Arc<StrategyConfig>>,
    ports: Ports,
    journal: SharedJournal,
    workers: HashMap<PositionId, WorkerHandle>,
    entry_failures: HashMap<String, EntryFailures>,
    finished: Vec<Position>,
}

impl Scheduler {
    pub fn new(config: StrategyConfig, ports: Ports) -> Result<Self, RunnerError> {
        config.validate()?;
        info!(fingerprint = %config.fingerprint(), "scheduler configured");
        let (config_tx, _) = watch::channel(Arc::new(config));
        Ok(Self {
            config_tx,
            ports,
            journal: EventJournal::shared(),
            workers: HashMap::new(),
            entry_failures: HashMap::new(),
            finished: Vec::new(),
        })
    }

    pub fn config(&self) -> Arc<StrategyConfig> {
        self.config_tx.borrow().clone()
    }

    /// Validate and publish a new config. Workers switch at their next tick.
    pub fn reload(&self, config: StrategyConfig) -> Result<(), RunnerError> {
        config.validate()?;
        info!(fingerprint = %config.fingerprint(), "publishing config");
        self.config_tx.send_replace(Arc::new(config));
        Ok(())
    }

    pub fn journal(&self) -> SharedJournal {
        Arc::clone(&self.journal)
    }

    pub fn open_positions(&self) -> usize {
        self.workers.len()
    }

    pub fn holds(&self, ticker: &str) -> bool {
        self.workers.values().any(|w| w.ticker == ticker)
    }

    /// Queue an operator full exit for one position.
    pub async fn close(&self, position_id: PositionId, at: DateTime<Utc>) -> Result<(), RunnerError> {
        let worker = self
            .workers
            .get(&position_id)
            .ok_or(RunnerError::UnknownPosition(position_id))?;
        worker.request_close(at).await
    }

    /// One cycle: reap, tick every worker, then look for new entries.
    pub async fn run_cycle(&mut self, now: DateTime<Utc>) -> Result<CycleReport, RunnerError> {
        let mut report = CycleReport::default();
        self.reap(&mut report).await?;

        for worker in self.workers.values() {
            if worker.try_tick(now) {
                report.ticks_sent += 1;
            } else {
                report.ticks_missed += 1;
            }
        }

        let config = self.config();
        let fetch_limit = Duration::from_millis(config.engine.fetch_timeout_ms);
        let candidates = match timeout(fetch_limit, self.ports.scoring.candidates()).await {
            Ok(Ok(candidates)) => candidates,
            Ok(Err(err)) => {
                warn!(error = %err, "scoring unavailable, no entries this cycle");
                return Ok(report);
            }
            Err(_) => {
                warn!("scoring fetch timed out, no entries this cycle");
                return Ok(report);
            }
        };

        for candidate in &candidates {
            if self.holds(&candidate.ticker) {
                continue;
            }
            if self.entry_suspended(candidate, config.engine.max_order_retries) {
                report.entries_suspended += 1;
                continue;
            }
            match self.try_enter(candidate, &config, now).await {
                EntryAttempt::Opened => {
                    self.entry_failures.remove(&candidate.ticker);
                    report.positions_opened += 1;
                }
                EntryAttempt::Skipped => report.entries_rejected += 1,
                EntryAttempt::OrderFailed { position_id, cause } => {
                    report.entries_rejected += 1;
                    self.record_entry_failure(candidate, position_id, &cause, &config, now)
                        .await;
                }
            }
        }
        Ok(report)
    }

    /// Drive cycles on a fixed interval until `shutdown` resolves.
    pub async fn run<F>(mut self, shutdown: F) -> Result<Vec<Position>, RunnerError>
    where
        F: Future<Output = ()>,
    {
        let mut period = Duration::from_secs(self.config().engine.tick_interval_secs);
        let mut interval = tokio::time::interval(period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                _ = &mut shutdown => break,
                _ = interval.tick() => {
                    let report = self.run_cycle(Utc::now()).await?;
                    debug!(
                        sent = report.ticks_sent,
                        missed = report.ticks_missed,
                        opened = report.positions_opened,
                        finished = report.positions_finished,
                        "cycle complete"
                    );
                }
            }

            let wanted = Duration::from_secs(self.config().engine.tick_interval_secs);
            if wanted != period {
                info!(secs = wanted.as_secs(), "tick interval changed");
                period = wanted;
                interval = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
                interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
            }
        }

        self.shutdown().await
    }

    /// Let every worker drain its queue and return all positions seen,
    /// open and closed.
    pub async fn shutdown(mut self) -> Result<Vec<Position>, RunnerError> {
        let mut positions = std::mem::take(&mut self.finished);
        for (_, worker) in self.workers.drain() {
            positions.push(worker.join().await?);
        }
        info!(positions = positions.len(), "scheduler stopped");
        Ok(positions)
    }

    // ── Helpers ──────────────────────────────────────────────────────

    async fn reap(&mut self, report: &mut CycleReport) -> Result<(), RunnerError> {
        let done: Vec<PositionId> = self
            .workers
            .iter()
            .filter(|(_, w)| w.is_finished())
            .map(|(id, _)| *id)
            .collect();
        for id in done {
            if let Some(worker) = self.workers.remove(&id) {
                let position = worker.join().await?;
                debug!(ticker = %position.ticker, position_id = %id, "worker reaped");
                self.finished.push(position);
                report.positions_finished += 1;
            }
        }
        Ok(())
    }

    fn entry_suspended(&self, candidate: &ScoringResult, limit: u32) -> bool {
        self.entry_failures
            .get(&candidate.ticker)
            .is_some_and(|f| f.confirmation_at == candidate.evaluated_at && f.count >= limit)
    }

    /// Count a failed entry order. A new confirmation starts a fresh count.
    async fn record_entry_failure(
        &mut self,
        candidate: &ScoringResult,
        position_id: PositionId,
        cause: &str,
        config: &StrategyConfig,
        now: DateTime<Utc>,
    ) {
        let limit = config.engine.max_order_retries;
        let failures = self
            .entry_failures
            .entry(candidate.ticker.clone())
            .or_insert(EntryFailures {
                confirmation_at: candidate.evaluated_at,
                count: 0,
            });
        if failures.confirmation_at != candidate.evaluated_at {
            *failures = EntryFailures {
                confirmation_at: candidate.evaluated_at,
                count: 0,
            };
        }
        failures.count += 1;
        let count = failures.count;
        if count < limit {
            return;
        }

        error!(ticker = %candidate.ticker, attempts = count, "entry retry limit reached");
        let event = PositionEvent::new(
            position_id,
            candidate.ticker.clone(),
            EventType::RetryLimitReached,
            now,
            format!("INITIAL_ENTRY failed {count} times, entry suspended until a new confirmation: {cause}"),
        );
        self.journal.lock().await.record([event]);
    }

    /// Plan, submit and open one entry.
    async fn try_enter(
        &mut self,
        candidate: &ScoringResult,
        config: &Arc<StrategyConfig>,
        now: DateTime<Utc>,
    ) -> EntryAttempt {
        let ticker = candidate.ticker.as_str();
        let fetch_limit = Duration::from_millis(config.engine.fetch_timeout_ms);
        let order_limit_ms = config.engine.order_timeout_ms;

        let snapshot = match timeout(fetch_limit, self.ports.snapshots.latest(ticker)).await {
            Ok(Ok(snapshot)) => snapshot,
            Ok(Err(err)) => {
                debug!(ticker, error = %err, "no snapshot for candidate");
                return EntryAttempt::Skipped;
            }
            Err(_) => {
                debug!(ticker, "candidate snapshot fetch timed out");
                return EntryAttempt::Skipped;
            }
        };
        let equity = match timeout(
            Duration::from_millis(order_limit_ms),
            self.ports.gateway.portfolio_equity(),
        )
        .await
        {
            Ok(Ok(equity)) => equity,
            Ok(Err(err)) => {
                warn!(ticker, error = %err, "equity unavailable, entry skipped");
                return EntryAttempt::Skipped;
            }
            Err(_) => {
                warn!(ticker, "equity request timed out, entry skipped");
                return EntryAttempt::Skipped;
            }
        };

        let controller = LifecycleController::new(Arc::clone(config));
        let book = BookState {
            equity,
            open_positions: self.workers.len(),
            ticker_already_open: false,
        };
        let order = match controller.entry_planner().plan(candidate, &snapshot, book, now) {
            Ok(order) => order,
            Err(rejection) => {
                debug!(ticker, reason = %rejection, "entry rejected");
                return EntryAttempt::Skipped;
            }
        };

        let fill = match timeout(
            Duration::from_millis(order_limit_ms),
            self.ports.gateway.submit(&order),
        )
        .await
        {
            Ok(Ok(fill)) => fill,
            Ok(Err(err)) => {
                warn!(ticker, error = %err, "entry order failed");
                return EntryAttempt::OrderFailed {
                    position_id: order.position_id,
                    cause: err.to_string(),
                };
            }
            Err(_) => {
                let err = ExecutionError::Timeout(order_limit_ms);
                warn!(ticker, error = %err, "entry order failed");
                return EntryAttempt::OrderFailed {
                    position_id: order.position_id,
                    cause: err.to_string(),
                };
            }
        };

        let (position, events) = match controller.open_position(&order, &fill, equity) {
            Ok(opened) => opened,
            Err(err) => {
                warn!(ticker, error = %err, "entry fill could not open a position");
                return EntryAttempt::Skipped;
            }
        };
        self.journal.lock().await.record(events);

        let worker = PositionWorker::new(
            position,
            self.config_tx.subscribe(),
            self.ports.clone(),
            self.journal(),
        );
        let handle = worker.spawn();
        self.workers.insert(handle.position_id, handle);
        EntryAttempt::Opened
    }
}
