//! Integration tests for the async runtime: workers, scheduler, journal.
//!
//! Worker tests call `PositionWorker::process` directly so every tick is
//! deterministic; the spawned path is covered by draining on `join`.

use chrono::{DateTime, Duration, TimeZone, Utc};
use std::sync::Arc;
use tokio::sync::watch;

use riskpilot_core::config::StrategyConfig;
use riskpilot_core::domain::{
    EventType, FillReport, IndicatorSnapshot, OrderInstruction, OrderReason, Position, PositionId,
    Recommendation, ScoringResult,
};
use riskpilot_core::lifecycle::LifecycleController;
use riskpilot_runner::{
    Command, EventJournal, InMemoryHistory, InMemoryScoring, InMemorySnapshots, PaperConfig,
    PaperGateway, Ports, PositionWorker, RunnerError, Scheduler, SharedJournal,
};

// ── Helpers ──────────────────────────────────────────────────────────

fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 3, 4, 21, 0, 0).unwrap()
}

fn day(n: i64) -> DateTime<Utc> {
    t0() + Duration::days(n)
}

/// Neutral snapshot: no breakout, no trend, no momentum.
fn snapshot(ticker: &str, at: DateTime<Utc>, close: f64) -> IndicatorSnapshot {
    IndicatorSnapshot {
        ticker: ticker.into(),
        timestamp: at,
        close,
        high: close * 1.01,
        low: close * 0.99,
        volume: 1_000.0,
        atr: None,
        atr_pct: Some(0.02),
        rsi_14: Some(55.0),
        adx: Some(20.0),
        macd_histogram: Some(-0.1),
        ma20: Some(close),
        ma20_slope: Some(0.0),
        trend_signal: false,
        rolling_high_20: Some(close * 1.5),
        rolling_avg_volume_20: Some(1_000.0),
        recent_closes: Vec::new(),
    }
}

fn confirmation(ticker: &str, at: DateTime<Utc>) -> ScoringResult {
    ScoringResult {
        ticker: ticker.into(),
        stage: 2,
        quality_score: 75.0,
        confidence: 0.8,
        recommendation: Recommendation::Buy,
        evaluated_at: at,
    }
}

struct Harness {
    snapshots: Arc<InMemorySnapshots>,
    scoring: Arc<InMemoryScoring>,
    gateway: Arc<PaperGateway>,
    ports: Ports,
}

fn harness(gateway: PaperGateway) -> Harness {
    let snapshots = Arc::new(InMemorySnapshots::new());
    let scoring = Arc::new(InMemoryScoring::new());
    let gateway = Arc::new(gateway);
    let ports = Ports {
        snapshots: snapshots.clone(),
        scoring: scoring.clone(),
        history: Arc::new(InMemoryHistory::new()),
        gateway: gateway.clone(),
    };
    Harness {
        snapshots,
        scoring,
        gateway,
        ports,
    }
}

fn open(config: &StrategyConfig, ticker: &str, price: f64, quantity: f64) -> Position {
    let controller = LifecycleController::new(Arc::new(config.clone()));
    let order = OrderInstruction::market(PositionId::new(), ticker, quantity, OrderReason::InitialEntry, price);
    let fill = FillReport {
        client_order_id: order.client_order_id,
        price,
        quantity,
        fee: 0.0,
        filled_at: t0(),
    };
    controller.open_position(&order, &fill, 500_000.0).unwrap().0
}

fn worker_for(
    h: &Harness,
    config: StrategyConfig,
    position: Position,
) -> (PositionWorker, watch::Sender<Arc<StrategyConfig>>, SharedJournal) {
    let (tx, rx) = watch::channel(Arc::new(config));
    let journal = EventJournal::shared();
    let worker = PositionWorker::new(position, rx, h.ports.clone(), journal.clone());
    (worker, tx, journal)
}

// ──────────────────────────────────────────────
// 1. Worker
// ──────────────────────────────────────────────

#[tokio::test]
async fn stop_breach_closes_position_through_gateway() {
    let h = harness(PaperGateway::with_equity(500_000.0));
    let config = StrategyConfig::default();
    let (mut worker, _tx, journal) = worker_for(&h, config.clone(), open(&config, "NVDA", 100.0, 100.0));

    h.snapshots.publish(snapshot("NVDA", day(1), 91.0)).await;
    let report = worker.process(Command::Tick(day(1))).await;

    assert_eq!(report.fills, 1);
    assert!(worker.position().is_closed());
    let submitted = h.gateway.submitted().await;
    assert_eq!(submitted.len(), 1);
    assert_eq!(submitted[0].reason, OrderReason::StopLoss);
    assert!((submitted[0].quantity - 100.0).abs() < 1e-9);

    let journal = journal.lock().await;
    assert_eq!(journal.count(EventType::StopTriggered), 1);
    assert_eq!(journal.count(EventType::Closed), 1);
}

#[tokio::test]
async fn rejected_profit_order_is_retried_next_tick() {
    let h = harness(PaperGateway::with_equity(500_000.0));
    let config = StrategyConfig::default();
    let (mut worker, _tx, journal) = worker_for(&h, config.clone(), open(&config, "NVDA", 100.0, 100.0));

    h.gateway.reject_next(1).await;
    h.snapshots.publish(snapshot("NVDA", day(1), 106.0)).await;
    let first = worker.process(Command::Tick(day(1))).await;
    assert_eq!(first.rejections, 1);
    assert!((worker.position().total_quantity - 100.0).abs() < 1e-9);
    assert!(!worker.position().has_pending(|_| true));

    h.snapshots.publish(snapshot("NVDA", day(2), 106.0)).await;
    let second = worker.process(Command::Tick(day(2))).await;
    assert_eq!(second.fills, 1);
    assert!((worker.position().total_quantity - 70.0).abs() < 1e-9);

    let journal = journal.lock().await;
    assert_eq!(journal.count(EventType::OrderRejected), 1);
    assert_eq!(journal.count(EventType::PartialExitFilled), 1);
    assert_eq!(journal.count(EventType::RetryLimitReached), 0);
}

#[tokio::test]
async fn order_timeout_is_treated_as_unfilled() {
    let h = harness(PaperGateway::new(PaperConfig {
        starting_equity: 500_000.0,
        latency: std::time::Duration::from_millis(300),
        ..PaperConfig::default()
    }));
    let mut config = StrategyConfig::default();
    config.engine.order_timeout_ms = 20;
    let (mut worker, _tx, journal) = worker_for(&h, config.clone(), open(&config, "NVDA", 100.0, 100.0));

    h.snapshots.publish(snapshot("NVDA", day(1), 106.0)).await;
    let report = worker.process(Command::Tick(day(1))).await;

    assert_eq!(report.orders_submitted, 1);
    assert_eq!(report.rejections, 1);
    assert!((worker.position().total_quantity - 100.0).abs() < 1e-9);
    let journal = journal.lock().await;
    let rejected: Vec<_> = journal
        .events()
        .iter()
        .filter(|e| e.event_type == EventType::OrderRejected)
        .collect();
    assert_eq!(rejected.len(), 1);
    assert!(rejected[0].detail.contains("timed out"));
}

#[tokio::test]
async fn missing_snapshot_skips_the_tick() {
    let h = harness(PaperGateway::with_equity(500_000.0));
    let config = StrategyConfig::default();
    let (mut worker, _tx, journal) = worker_for(&h, config.clone(), open(&config, "NVDA", 100.0, 100.0));

    let report = worker.process(Command::Tick(day(1))).await;

    assert!(report.skipped);
    assert_eq!(report.orders_submitted, 0);
    assert!(h.gateway.submitted().await.is_empty());
    assert_eq!(journal.lock().await.count(EventType::TickSkipped), 1);
}

#[tokio::test]
async fn reloaded_config_applies_from_next_tick() {
    let h = harness(PaperGateway::with_equity(500_000.0));
    let config = StrategyConfig::default();
    let (mut worker, tx, journal) = worker_for(&h, config.clone(), open(&config, "NVDA", 100.0, 100.0));

    h.snapshots.publish(snapshot("NVDA", day(1), 100.0)).await;
    worker.process(Command::Tick(day(1) + Duration::minutes(10))).await;
    assert_eq!(journal.lock().await.count(EventType::TickSkipped), 0);

    let mut strict = StrategyConfig::default();
    strict.engine.max_snapshot_age_secs = 60;
    strict.validate().unwrap();
    tx.send_replace(Arc::new(strict));

    h.snapshots.publish(snapshot("NVDA", day(2), 100.0)).await;
    worker.process(Command::Tick(day(2) + Duration::minutes(10))).await;
    assert_eq!(journal.lock().await.count(EventType::TickSkipped), 1);
    assert!(!worker.position().is_closed());
}

#[tokio::test]
async fn operator_close_sells_everything() {
    let h = harness(PaperGateway::with_equity(500_000.0));
    let config = StrategyConfig::default();
    let (mut worker, _tx, journal) = worker_for(&h, config.clone(), open(&config, "NVDA", 100.0, 100.0));

    let report = worker.process(Command::Close(day(1))).await;

    assert_eq!(report.fills, 1);
    assert!(worker.position().is_closed());
    let submitted = h.gateway.submitted().await;
    assert_eq!(submitted[0].reason, OrderReason::FullExit);
    assert!((submitted[0].quantity - 100.0).abs() < 1e-9);
    assert_eq!(journal.lock().await.count(EventType::Closed), 1);
}

#[tokio::test]
async fn spawned_worker_drains_queue_on_join() {
    let h = harness(PaperGateway::with_equity(500_000.0));
    let config = StrategyConfig::default();
    let (worker, _tx, _journal) = worker_for(&h, config.clone(), open(&config, "NVDA", 100.0, 100.0));

    h.snapshots.publish(snapshot("NVDA", day(1), 90.0)).await;
    let handle = worker.spawn();
    assert!(handle.try_tick(day(1)));

    let position = handle.join().await.unwrap();
    assert!(position.is_closed());
    assert!(position.realized_pnl < 0.0);
}

// ──────────────────────────────────────────────
// 2. Scheduler
// ──────────────────────────────────────────────

#[tokio::test]
async fn fresh_confirmation_opens_one_position() {
    let h = harness(PaperGateway::with_equity(100_000.0));
    let now = Utc::now();
    h.snapshots.publish(snapshot("AAPL", now, 100.0)).await;
    h.scoring.publish(confirmation("AAPL", now)).await;

    let mut scheduler = Scheduler::new(StrategyConfig::default(), h.ports.clone()).unwrap();
    let report = scheduler.run_cycle(now).await.unwrap();

    assert_eq!(report.positions_opened, 1);
    assert_eq!(scheduler.open_positions(), 1);
    assert!(scheduler.holds("AAPL"));
    let submitted = h.gateway.submitted().await;
    assert_eq!(submitted.len(), 1);
    assert_eq!(submitted[0].reason, OrderReason::InitialEntry);
    // 2% of 100k at 100
    assert!((submitted[0].quantity - 20.0).abs() < 1e-9);
    assert_eq!(scheduler.journal().lock().await.count(EventType::Opened), 1);

    // Still confirmed, but already held.
    let again = scheduler.run_cycle(now).await.unwrap();
    assert_eq!(again.positions_opened, 0);
    assert_eq!(again.ticks_sent, 1);

    let positions = scheduler.shutdown().await.unwrap();
    assert_eq!(positions.len(), 1);
    assert!(!positions[0].is_closed());
}

#[tokio::test]
async fn stale_confirmation_does_not_enter() {
    let h = harness(PaperGateway::with_equity(100_000.0));
    let now = Utc::now();
    h.snapshots.publish(snapshot("AAPL", now, 100.0)).await;
    h.scoring.publish(confirmation("AAPL", now - Duration::days(2))).await;

    let mut scheduler = Scheduler::new(StrategyConfig::default(), h.ports.clone()).unwrap();
    let report = scheduler.run_cycle(now).await.unwrap();

    assert_eq!(report.positions_opened, 0);
    assert_eq!(report.entries_rejected, 1);
    assert!(h.gateway.submitted().await.is_empty());
}

#[tokio::test]
async fn max_open_positions_caps_entries() {
    let h = harness(PaperGateway::with_equity(100_000.0));
    let now = Utc::now();
    for ticker in ["AAPL", "MSFT"] {
        h.snapshots.publish(snapshot(ticker, now, 100.0)).await;
        h.scoring.publish(confirmation(ticker, now)).await;
    }
    let mut config = StrategyConfig::default();
    config.entry.max_open_positions = 1;

    let mut scheduler = Scheduler::new(config, h.ports.clone()).unwrap();
    let report = scheduler.run_cycle(now).await.unwrap();

    assert_eq!(report.positions_opened, 1);
    assert_eq!(report.entries_rejected, 1);
    assert!(scheduler.holds("AAPL"));
    assert!(!scheduler.holds("MSFT"));
}

#[tokio::test]
async fn rejected_entry_order_opens_nothing() {
    let h = harness(PaperGateway::with_equity(100_000.0));
    let now = Utc::now();
    h.snapshots.publish(snapshot("AAPL", now, 100.0)).await;
    h.scoring.publish(confirmation("AAPL", now)).await;
    h.gateway.reject_next(1).await;

    let mut scheduler = Scheduler::new(StrategyConfig::default(), h.ports.clone()).unwrap();
    let report = scheduler.run_cycle(now).await.unwrap();

    assert_eq!(report.positions_opened, 0);
    assert_eq!(scheduler.open_positions(), 0);
    assert!(scheduler.journal().lock().await.is_empty());
}

#[tokio::test]
async fn repeated_entry_rejections_suspend_until_new_confirmation() {
    let h = harness(PaperGateway::with_equity(100_000.0));
    let now = Utc::now();
    h.snapshots.publish(snapshot("AAPL", now, 100.0)).await;
    h.scoring.publish(confirmation("AAPL", now)).await;
    h.gateway.reject_next(3).await;

    let mut scheduler = Scheduler::new(StrategyConfig::default(), h.ports.clone()).unwrap();
    for minute in 0..3 {
        let report = scheduler
            .run_cycle(now + Duration::minutes(minute))
            .await
            .unwrap();
        assert_eq!(report.positions_opened, 0);
        assert_eq!(report.entries_rejected, 1);
    }
    assert_eq!(h.gateway.submitted().await.len(), 3);
    {
        let journal = scheduler.journal();
        let journal = journal.lock().await;
        assert_eq!(journal.count(EventType::RetryLimitReached), 1);
        assert_eq!(journal.events()[0].ticker, "AAPL");
    }

    // Gateway would accept now, but the same confirmation stays suspended.
    let report = scheduler.run_cycle(now + Duration::minutes(3)).await.unwrap();
    assert_eq!(report.entries_suspended, 1);
    assert_eq!(report.positions_opened, 0);
    assert_eq!(h.gateway.submitted().await.len(), 3);

    // A new confirmation gets a fresh set of attempts.
    let later = now + Duration::minutes(4);
    h.scoring.publish(confirmation("AAPL", later)).await;
    let report = scheduler.run_cycle(later).await.unwrap();
    assert_eq!(report.positions_opened, 1);
    assert!(scheduler.holds("AAPL"));
    assert_eq!(scheduler.journal().lock().await.count(EventType::RetryLimitReached), 1);
}

#[tokio::test]
async fn invalid_reload_is_refused() {
    let h = harness(PaperGateway::with_equity(100_000.0));
    let scheduler = Scheduler::new(StrategyConfig::default(), h.ports.clone()).unwrap();

    let mut bad = StrategyConfig::default();
    bad.entry.max_open_positions = 0;
    assert!(matches!(scheduler.reload(bad), Err(RunnerError::Config(_))));
    assert_eq!(scheduler.config().entry.max_open_positions, 8);
}

#[tokio::test]
async fn closing_unknown_position_is_an_error() {
    let h = harness(PaperGateway::with_equity(100_000.0));
    let scheduler = Scheduler::new(StrategyConfig::default(), h.ports.clone()).unwrap();
    let err = scheduler.close(PositionId::new(), Utc::now()).await.unwrap_err();
    assert!(matches!(err, RunnerError::UnknownPosition(_)));
}

// ──────────────────────────────────────────────
// 3. Journal export
// ──────────────────────────────────────────────

#[tokio::test]
async fn journal_exports_csv_and_json_files() {
    let h = harness(PaperGateway::with_equity(100_000.0));
    let now = Utc::now();
    h.snapshots.publish(snapshot("AAPL", now, 100.0)).await;
    h.scoring.publish(confirmation("AAPL", now)).await;

    let mut scheduler = Scheduler::new(StrategyConfig::default(), h.ports.clone()).unwrap();
    scheduler.run_cycle(now).await.unwrap();
    let journal = scheduler.journal();

    let dir = tempfile::tempdir().unwrap();
    let csv_path = dir.path().join("events.csv");
    let json_path = dir.path().join("events.json");
    {
        let journal = journal.lock().await;
        journal.write_csv(&csv_path).unwrap();
        journal.write_json(&json_path).unwrap();
    }

    let csv = std::fs::read_to_string(&csv_path).unwrap();
    assert!(csv.starts_with("timestamp,position_id,ticker,event_type,detail"));
    assert!(csv.contains("AAPL,OPENED"));
    let json = std::fs::read_to_string(&json_path).unwrap();
    assert!(json.contains("\"OPENED\""));

    scheduler.shutdown().await.unwrap();
}
