//! Per-position worker.
//!
//! Each open position is owned by exactly one tokio task. The scheduler
//! talks to it through a capacity-1 channel, so ticks for one position never
//! overlap and a worker that is still busy simply misses the next tick.
//!
//! Per tick the worker:
//! 1. Picks up the latest published config (never mid-tick)
//! 2. Fetches snapshot, trade history and equity under timeouts
//! 3. Runs the lifecycle controller
//! 4. Submits the resulting orders one by one and feeds each fill or
//!    rejection back into the position

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use riskpilot_core::config::StrategyConfig;
use riskpilot_core::domain::{
    EventType, IndicatorSnapshot, OrderInstruction, Position, PositionEvent, PositionId,
    TradeHistory,
};
use riskpilot_core::lifecycle::{LifecycleController, TickContext};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tracing::{debug, error, info, warn};

use crate::journal::SharedJournal;
use crate::ports::{ExecutionError, Ports};
use crate::scheduler::RunnerError;

/// Message from the scheduler to one worker.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Command {
    Tick(DateTime<Utc>),
    /// Operator full exit at the last seen close.
    Close(DateTime<Utc>),
}

/// What one command did, for logging and tests.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TickReport {
    pub skipped: bool,
    pub orders_submitted: usize,
    pub fills: usize,
    pub rejections: usize,
}

impl TickReport {
    fn skipped() -> Self {
        Self {
            skipped: true,
            ..Self::default()
        }
    }
}

pub struct PositionWorker {
    position: Position,
    config: watch::Receiver<Arc<StrategyConfig>>,
    ports: Ports,
    journal: SharedJournal,
    last_equity: Option<f64>,
    last_close: f64,
}

impl PositionWorker {
    pub fn new(
        position: Position,
        config: watch::Receiver<Arc<StrategyConfig>>,
        ports: Ports,
        journal: SharedJournal,
    ) -> Self {
        let last_close = position.average_entry_price;
        Self {
            position,
            config,
            ports,
            journal,
            last_equity: None,
            last_close,
        }
    }

    pub fn position(&self) -> &Position {
        &self.position
    }

    pub fn into_position(self) -> Position {
        self.position
    }

    pub async fn process(&mut self, command: Command) -> TickReport {
        if self.position.is_closed() {
            return TickReport::skipped();
        }
        let controller = LifecycleController::new(self.current_config());
        match command {
            Command::Tick(at) => self.on_tick(&controller, at).await,
            Command::Close(at) => {
                info!(
                    ticker = %self.position.ticker,
                    position_id = %self.position.id,
                    price = self.last_close,
                    "operator close requested"
                );
                let outcome = controller.close_position(&mut self.position, self.last_close, at);
                self.journal.lock().await.record(outcome.events);
                self.execute(&controller, outcome.orders, at).await
            }
        }
    }

    /// Spawn the worker loop. The task ends when the position closes or the
    /// handle is dropped, and yields the final position.
    pub fn spawn(self) -> WorkerHandle {
        let (tx, rx) = mpsc::channel(1);
        let position_id = self.position.id;
        let ticker = self.position.ticker.clone();
        let task = tokio::spawn(run(self, rx));
        WorkerHandle {
            position_id,
            ticker,
            tx,
            task,
        }
    }

    fn current_config(&mut self) -> Arc<StrategyConfig> {
        let changed = self.config.has_changed().unwrap_or(false);
        let config = self.config.borrow_and_update().clone();
        if changed {
            info!(
                ticker = %self.position.ticker,
                position_id = %self.position.id,
                fingerprint = %config.fingerprint(),
                "config reloaded"
            );
        }
        config
    }

    async fn on_tick(&mut self, controller: &LifecycleController, at: DateTime<Utc>) -> TickReport {
        let engine = &controller.config().engine;
        let fetch_limit = Duration::from_millis(engine.fetch_timeout_ms);

        let Some(snapshot) = self.fetch_snapshot(fetch_limit, at).await else {
            return TickReport::skipped();
        };
        let history = self.fetch_history(fetch_limit).await;
        let equity = self
            .refresh_equity(Duration::from_millis(engine.order_timeout_ms))
            .await;

        let ctx = TickContext {
            snapshot: &snapshot,
            history: history.as_ref(),
            equity,
            now: at,
        };
        let outcome = controller.tick(&mut self.position, &ctx);
        if snapshot.has_usable_close() {
            self.last_close = snapshot.close;
        }

        self.journal.lock().await.record(outcome.events);
        self.execute(controller, outcome.orders, at).await
    }

    async fn fetch_snapshot(&self, limit: Duration, at: DateTime<Utc>) -> Option<IndicatorSnapshot> {
        let ticker = self.position.ticker.clone();
        let cause = match timeout(limit, self.ports.snapshots.latest(&ticker)).await {
            Ok(Ok(snapshot)) => return Some(snapshot),
            Ok(Err(err)) => err.to_string(),
            Err(_) => format!("snapshot fetch timed out after {} ms", limit.as_millis()),
        };
        warn!(
            ticker = %ticker,
            position_id = %self.position.id,
            cause = %cause,
            "tick skipped"
        );
        let event = PositionEvent::new(self.position.id, ticker, EventType::TickSkipped, at, cause);
        self.journal.lock().await.record([event]);
        None
    }

    async fn fetch_history(&self, limit: Duration) -> Option<TradeHistory> {
        match timeout(limit, self.ports.history.history(&self.position.ticker)).await {
            Ok(Ok(history)) => history,
            Ok(Err(err)) => {
                debug!(ticker = %self.position.ticker, error = %err, "trade history unavailable");
                None
            }
            Err(_) => {
                debug!(ticker = %self.position.ticker, "trade history fetch timed out");
                None
            }
        }
    }

    /// Latest equity, falling back to the last known value. Zero disables
    /// add-on sizing for this tick but nothing else.
    async fn refresh_equity(&mut self, limit: Duration) -> f64 {
        match timeout(limit, self.ports.gateway.portfolio_equity()).await {
            Ok(Ok(equity)) => {
                self.last_equity = Some(equity);
                equity
            }
            Ok(Err(err)) => {
                warn!(ticker = %self.position.ticker, error = %err, "equity unavailable");
                self.last_equity.unwrap_or(0.0)
            }
            Err(_) => {
                warn!(ticker = %self.position.ticker, "equity request timed out");
                self.last_equity.unwrap_or(0.0)
            }
        }
    }

    async fn execute(
        &mut self,
        controller: &LifecycleController,
        orders: Vec<OrderInstruction>,
        at: DateTime<Utc>,
    ) -> TickReport {
        let limit_ms = controller.config().engine.order_timeout_ms;
        let mut report = TickReport::default();

        for order in orders {
            if self.position.is_closed() {
                debug!(
                    ticker = %self.position.ticker,
                    reason = %order.reason,
                    "position closed, remaining order dropped"
                );
                break;
            }
            report.orders_submitted += 1;
            let result = match timeout(
                Duration::from_millis(limit_ms),
                self.ports.gateway.submit(&order),
            )
            .await
            {
                Ok(result) => result,
                Err(_) => Err(ExecutionError::Timeout(limit_ms)),
            };

            let applied = match result {
                Ok(fill) => {
                    report.fills += 1;
                    controller.apply_fill(&mut self.position, &fill)
                }
                Err(err) => {
                    report.rejections += 1;
                    controller.apply_rejection(
                        &mut self.position,
                        order.client_order_id,
                        &err.to_string(),
                        at,
                    )
                }
            };
            match applied {
                Ok(events) => self.journal.lock().await.record(events),
                Err(err) => error!(
                    ticker = %self.position.ticker,
                    position_id = %self.position.id,
                    order = %order.client_order_id,
                    error = %err,
                    "execution result could not be applied"
                ),
            }
        }
        report
    }
}

async fn run(mut worker: PositionWorker, mut rx: mpsc::Receiver<Command>) -> Position {
    while let Some(command) = rx.recv().await {
        let report = worker.process(command).await;
        debug!(
            ticker = %worker.position.ticker,
            skipped = report.skipped,
            orders = report.orders_submitted,
            fills = report.fills,
            rejections = report.rejections,
            "command processed"
        );
        if worker.position.is_closed() {
            info!(
                ticker = %worker.position.ticker,
                position_id = %worker.position.id,
                realized_pnl = worker.position.realized_pnl,
                "worker finished"
            );
            break;
        }
    }
    worker.into_position()
}

/// Scheduler-side end of a spawned worker.
pub struct WorkerHandle {
    pub position_id: PositionId,
    pub ticker: String,
    tx: mpsc::Sender<Command>,
    task: JoinHandle<Position>,
}

impl WorkerHandle {
    /// Offer a tick without waiting. Returns `false` if the worker is still
    /// busy with the previous one or has stopped.
    pub fn try_tick(&self, at: DateTime<Utc>) -> bool {
        match self.tx.try_send(Command::Tick(at)) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(_)) => {
                debug!(ticker = %self.ticker, position_id = %self.position_id, "worker busy, tick missed");
                false
            }
            Err(mpsc::error::TrySendError::Closed(_)) => false,
        }
    }

    /// Queue an operator close, waiting for channel capacity.
    pub async fn request_close(&self, at: DateTime<Utc>) -> Result<(), RunnerError> {
        self.tx
            .send(Command::Close(at))
            .await
            .map_err(|_| RunnerError::WorkerGone(self.position_id))
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Stop feeding the worker and wait for it to drain its queue.
    pub async fn join(self) -> Result<Position, RunnerError> {
        let WorkerHandle {
            position_id,
            ticker,
            tx,
            task,
        } = self;
        drop(tx);
        task.await.map_err(|source| RunnerError::WorkerFailed {
            position_id,
            ticker,
            source,
        })
    }
}
