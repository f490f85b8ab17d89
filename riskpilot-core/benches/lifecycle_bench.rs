//! Criterion benchmarks for lifecycle hot paths.
//!
//! Benchmarks:
//! 1. Controller tick over a price path (stop + profit + pyramid per snapshot)
//! 2. Stop engine evaluation in isolation
//! 3. Snapshot validation

use chrono::{DateTime, Duration, TimeZone, Utc};
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use std::sync::Arc;

use riskpilot_core::config::StrategyConfig;
use riskpilot_core::domain::{FillReport, IndicatorSnapshot, OrderInstruction, OrderReason, Position, PositionId};
use riskpilot_core::lifecycle::{LifecycleController, TickContext};
use riskpilot_core::stops::{StopEngine, StopInput, StopState};

// ── Helpers ──────────────────────────────────────────────────────────

fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2020, 1, 2, 7, 0, 0).unwrap()
}

fn make_snapshots(n: usize) -> Vec<IndicatorSnapshot> {
    (0..n)
        .map(|i| {
            let close = 100.0 + (i as f64 * 0.1).sin() * 10.0 + i as f64 * 0.05;
            IndicatorSnapshot {
                ticker: "SPY".into(),
                timestamp: t0() + Duration::days(i as i64 + 1),
                close,
                high: close + 1.5,
                low: close - 1.5,
                volume: 1_000_000.0 + (i % 7) as f64 * 100_000.0,
                atr: None,
                atr_pct: Some(0.02 + (i % 5) as f64 * 0.005),
                rsi_14: Some(50.0 + (i as f64 * 0.3).sin() * 20.0),
                adx: Some(25.0),
                macd_histogram: Some((i as f64 * 0.2).cos()),
                ma20: Some(close * 0.98),
                ma20_slope: Some(0.1),
                trend_signal: i % 3 == 0,
                rolling_high_20: Some(close * 0.995),
                rolling_avg_volume_20: Some(1_000_000.0),
                recent_closes: Vec::new(),
            }
        })
        .collect()
}

fn open_position(controller: &LifecycleController) -> Position {
    let order = OrderInstruction::market(PositionId::new(), "SPY", 100.0, OrderReason::InitialEntry, 100.0);
    let fill = FillReport {
        client_order_id: order.client_order_id,
        price: 100.0,
        quantity: 100.0,
        fee: 0.0,
        filled_at: t0(),
    };
    match controller.open_position(&order, &fill, 1_000_000.0) {
        Ok((position, _)) => position,
        Err(err) => panic!("bench setup failed: {err}"),
    }
}

// ── Benchmarks ───────────────────────────────────────────────────────

fn bench_controller_tick(c: &mut Criterion) {
    let mut group = c.benchmark_group("controller_tick");
    let controller = LifecycleController::new(Arc::new(StrategyConfig::default()));

    for n in [250usize, 1_000] {
        let snapshots = make_snapshots(n);
        group.bench_with_input(BenchmarkId::from_parameter(n), &snapshots, |b, snaps| {
            b.iter(|| {
                let mut position = open_position(&controller);
                for snap in snaps {
                    let ctx = TickContext {
                        snapshot: snap,
                        history: None,
                        equity: 1_000_000.0,
                        now: snap.timestamp,
                    };
                    let out = controller.tick(&mut position, &ctx);
                    for order in &out.orders {
                        let fill = FillReport {
                            client_order_id: order.client_order_id,
                            price: order.reference_price,
                            quantity: order.quantity,
                            fee: 0.0,
                            filled_at: snap.timestamp,
                        };
                        let _ = controller.apply_fill(&mut position, &fill);
                    }
                    if position.is_closed() {
                        position = open_position(&controller);
                    }
                }
                black_box(position.total_quantity)
            })
        });
    }
    group.finish();
}

fn bench_stop_engine(c: &mut Criterion) {
    let config = StrategyConfig::default();
    let engine = StopEngine::new(&config.trailing_stop, &config.pyramiding.exit_management);
    let snapshots = make_snapshots(1_000);
    let indicators: Vec<_> = snapshots.iter().filter_map(|s| s.indicators().ok()).collect();

    c.bench_function("stop_engine_1000", |b| {
        b.iter(|| {
            let mut state = StopState::fixed(80.0, t0());
            for (i, ind) in indicators.iter().enumerate() {
                let decision = engine.evaluate(
                    &state,
                    &StopInput {
                        close: ind.close,
                        indicators: Some(ind),
                        reference_price: 90.0,
                        holding_days: i as i64,
                        history: None,
                        recent_uptrend: false,
                        now: t0(),
                    },
                );
                state = decision.state;
            }
            black_box(state.current_stop_price)
        })
    });
}

fn bench_snapshot_validation(c: &mut Criterion) {
    let snapshots = make_snapshots(1_000);
    c.bench_function("snapshot_indicators_1000", |b| {
        b.iter(|| {
            let valid = snapshots.iter().filter(|s| s.indicators().is_ok()).count();
            black_box(valid)
        })
    });
}

criterion_group!(
    benches,
    bench_controller_tick,
    bench_stop_engine,
    bench_snapshot_validation
);
criterion_main!(benches);
