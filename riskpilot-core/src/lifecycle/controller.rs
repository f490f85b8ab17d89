//! PositionLifecycleController — one tick of stop, profit and pyramid logic.
//!
//! Per tick the fixed order is:
//! 1. StopEngine (breach → full exit, nothing else runs)
//! 2. ProfitTaker
//! 3. PyramidEngine (only while under the leg cap)
//!
//! `tick` may update the stop state and register pending orders. Legs,
//! quantity and P&L only change in [`LifecycleController::apply_fill`].

use crate::config::StrategyConfig;
use crate::domain::{
    ClientOrderId, EventType, FillReport, IndicatorSnapshot, Indicators, Leg, OrderInstruction,
    OrderReason, PendingAction, PendingOrder, Position, PositionError, PositionEvent, PositionId,
    RetryKey, TradeHistory, QTY_EPSILON,
};
use crate::lifecycle::entry::EntryPlanner;
use crate::profit::{ProfitInput, ProfitTaker};
use crate::pyramid::{PyramidEngine, PyramidVerdict};
use crate::sizers::PositionSizer;
use crate::stops::{StopDecision, StopEngine, StopInput, StopMode};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, error, info, warn};

#[derive(Debug, Error, PartialEq)]
pub enum FillError {
    #[error("no pending order {order} on position {position}")]
    UnknownOrder {
        order: ClientOrderId,
        position: PositionId,
    },
    #[error(transparent)]
    Position(#[from] PositionError),
}

/// Inputs for one evaluation tick of one position.
#[derive(Debug, Clone, Copy)]
pub struct TickContext<'a> {
    pub snapshot: &'a IndicatorSnapshot,
    pub history: Option<&'a TradeHistory>,
    pub equity: f64,
    pub now: DateTime<Utc>,
}

/// Orders to submit and events to record, produced by one tick.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TickOutcome {
    pub orders: Vec<OrderInstruction>,
    pub events: Vec<PositionEvent>,
}

impl TickOutcome {
    pub fn is_empty(&self) -> bool {
        self.orders.is_empty() && self.events.is_empty()
    }

    fn event(&mut self, position: &Position, event_type: EventType, at: DateTime<Utc>, detail: impl Into<String>) {
        self.events.push(PositionEvent::new(
            position.id,
            position.ticker.clone(),
            event_type,
            at,
            detail,
        ));
    }
}

/// Stateless orchestrator; all per-position state lives on [`Position`].
#[derive(Debug, Clone)]
pub struct LifecycleController {
    config: Arc<StrategyConfig>,
}

impl LifecycleController {
    pub fn new(config: Arc<StrategyConfig>) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &Arc<StrategyConfig> {
        &self.config
    }

    pub fn entry_planner(&self) -> EntryPlanner<'_> {
        EntryPlanner::new(&self.config)
    }

    /// Create a position from the fill of its INITIAL_ENTRY order.
    pub fn open_position(
        &self,
        instruction: &OrderInstruction,
        fill: &FillReport,
        equity: f64,
    ) -> Result<(Position, Vec<PositionEvent>), FillError> {
        let position = Position::open_from_fill(instruction, fill, equity, &self.config)?;
        info!(
            ticker = %position.ticker,
            position_id = %position.id,
            price = fill.price,
            quantity = fill.quantity,
            stop = position.stop.current_stop_price,
            "position opened"
        );
        let event = PositionEvent::new(
            position.id,
            position.ticker.clone(),
            EventType::Opened,
            fill.filled_at,
            format!(
                "{:.4} @ {:.4}, stop {:.4}",
                fill.quantity, fill.price, position.stop.current_stop_price
            ),
        );
        Ok((position, vec![event]))
    }

    /// Evaluate one snapshot for one position.
    pub fn tick(&self, position: &mut Position, ctx: &TickContext<'_>) -> TickOutcome {
        let mut out = TickOutcome::default();
        if position.is_closed() {
            return out;
        }

        let snap = ctx.snapshot;
        if snap.ticker != position.ticker {
            warn!(ticker = %position.ticker, snapshot = %snap.ticker, "snapshot for another ticker");
            out.event(
                position,
                EventType::TickSkipped,
                ctx.now,
                format!("snapshot for {} ignored", snap.ticker),
            );
            return out;
        }
        if !snap.has_usable_close() {
            warn!(ticker = %position.ticker, close = snap.close, "unusable close, tick skipped");
            out.event(
                position,
                EventType::TickSkipped,
                ctx.now,
                format!("close {} unusable", snap.close),
            );
            return out;
        }

        let close = snap.close;
        let repeated = position.last_tick_at == Some(snap.timestamp);
        let indicators = if repeated {
            debug!(ticker = %position.ticker, "snapshot already evaluated, stop check only");
            None
        } else {
            match snap
                .check_freshness(ctx.now, self.config.engine.max_snapshot_age_secs)
                .and_then(|_| snap.indicators())
            {
                Ok(ind) => Some(ind),
                Err(err) => {
                    warn!(ticker = %position.ticker, error = %err, "missing indicator data, growth skipped");
                    out.event(position, EventType::TickSkipped, ctx.now, err.to_string());
                    None
                }
            }
        };

        // 1. capital protection
        self.evaluate_stop(position, close, indicators.as_ref(), ctx, &mut out);
        if position.stop.is_closed() {
            self.ensure_protective_exit(
                position,
                close,
                OrderReason::StopLoss,
                PendingAction::StopExit,
                ctx.now,
                &mut out,
            );
            if !repeated {
                position.last_tick_at = Some(snap.timestamp);
            }
            return out;
        }

        let Some(ind) = indicators else {
            return out;
        };

        // 2. profit taking
        self.evaluate_profit(position, close, ctx.now, &mut out);

        // 3. pyramiding
        if position.unencumbered_quantity() > QTY_EPSILON && !position.legs.is_full() {
            self.evaluate_pyramid(position, &ind, ctx, &mut out);
        }

        position.last_tick_at = Some(snap.timestamp);
        out
    }

    /// Operator-initiated full exit of whatever is not already being sold.
    pub fn close_position(&self, position: &mut Position, price: f64, now: DateTime<Utc>) -> TickOutcome {
        let mut out = TickOutcome::default();
        if position.is_closed() {
            return out;
        }
        self.ensure_protective_exit(
            position,
            price,
            OrderReason::FullExit,
            PendingAction::OperatorExit,
            now,
            &mut out,
        );
        out
    }

    /// Apply a confirmed fill. The only path that changes legs or quantity.
    pub fn apply_fill(
        &self,
        position: &mut Position,
        fill: &FillReport,
    ) -> Result<Vec<PositionEvent>, FillError> {
        if !fill.is_valid() {
            return Err(PositionError::InvalidFill(format!(
                "price {} quantity {} fee {}",
                fill.price, fill.quantity, fill.fee
            ))
            .into());
        }
        let pending = position
            .take_pending(fill.client_order_id)
            .ok_or(FillError::UnknownOrder {
                order: fill.client_order_id,
                position: position.id,
            })?;

        let mut out = TickOutcome::default();
        match pending.action {
            PendingAction::AddOn {
                trigger,
                size_ratio,
            } => {
                let filled_fraction = (fill.quantity / pending.quantity).min(1.0);
                let leg = Leg {
                    index: position.legs.len(),
                    fill_price: fill.price,
                    quantity: fill.quantity,
                    size_ratio: size_ratio * filled_fraction,
                    trigger_kind: trigger,
                    filled_at: fill.filled_at,
                };
                let index = leg.index;
                position.add_leg(leg, fill.fee)?;
                info!(
                    ticker = %position.ticker,
                    position_id = %position.id,
                    leg = index,
                    price = fill.price,
                    average_entry = position.average_entry_price,
                    "add-on leg filled"
                );
                out.event(
                    position,
                    EventType::LegAdded,
                    fill.filled_at,
                    format!(
                        "leg {index} ({trigger:?}) {:.4} @ {:.4}, average {:.4}",
                        fill.quantity, fill.price, position.average_entry_price
                    ),
                );
            }
            PendingAction::ProfitLevel { level } => {
                let sold = position.reduce(fill.quantity, fill.price, fill.fee)?;
                position.profit_plan.mark_executed(level);
                info!(
                    ticker = %position.ticker,
                    position_id = %position.id,
                    level,
                    sold,
                    price = fill.price,
                    "profit level filled"
                );
                out.event(
                    position,
                    EventType::PartialExitFilled,
                    fill.filled_at,
                    format!("level {level}: sold {sold:.4} @ {:.4}", fill.price),
                );
            }
            PendingAction::StopExit | PendingAction::OperatorExit => {
                let sold = position.reduce(fill.quantity, fill.price, fill.fee)?;
                info!(
                    ticker = %position.ticker,
                    position_id = %position.id,
                    reason = %pending.reason,
                    sold,
                    price = fill.price,
                    "exit filled"
                );
                if !position.is_closed() {
                    out.event(
                        position,
                        EventType::PartialExitFilled,
                        fill.filled_at,
                        format!("{}: sold {sold:.4} @ {:.4}", pending.reason, fill.price),
                    );
                }
            }
        }

        position.retries.reset(pending.action.retry_key());
        if position.is_closed() {
            info!(
                ticker = %position.ticker,
                position_id = %position.id,
                realized_pnl = position.realized_pnl,
                "position closed"
            );
            out.event(
                position,
                EventType::Closed,
                fill.filled_at,
                format!("{} realized {:.2}", pending.reason, position.realized_pnl),
            );
        }
        Ok(out.events)
    }

    /// Record a rejected (or timed-out) order. No financial state changes.
    pub fn apply_rejection(
        &self,
        position: &mut Position,
        client_order_id: ClientOrderId,
        cause: &str,
        at: DateTime<Utc>,
    ) -> Result<Vec<PositionEvent>, FillError> {
        let pending = position
            .take_pending(client_order_id)
            .ok_or(FillError::UnknownOrder {
                order: client_order_id,
                position: position.id,
            })?;
        let key = pending.action.retry_key();
        let count = position.retries.record_rejection(key);
        let limit = self.config.engine.max_order_retries;

        let mut out = TickOutcome::default();
        warn!(
            ticker = %position.ticker,
            position_id = %position.id,
            reason = %pending.reason,
            attempt = count,
            cause,
            "order rejected"
        );
        out.event(
            position,
            EventType::OrderRejected,
            at,
            format!("{} rejected ({count}/{limit}): {cause}", pending.reason),
        );
        if count == limit {
            let follow_up = if key == RetryKey::ProtectiveExit {
                "protective exit keeps retrying"
            } else {
                "action suspended"
            };
            error!(
                ticker = %position.ticker,
                position_id = %position.id,
                reason = %pending.reason,
                "retry limit reached"
            );
            out.event(
                position,
                EventType::RetryLimitReached,
                at,
                format!("{} failed {count} times, {follow_up}", pending.reason),
            );
        }
        Ok(out.events)
    }

    // ── Tick phases ──

    fn evaluate_stop(
        &self,
        position: &mut Position,
        close: f64,
        indicators: Option<&Indicators>,
        ctx: &TickContext<'_>,
        out: &mut TickOutcome,
    ) {
        let use_avg = self.config.pyramiding.exit_management.use_average_entry_price;
        let engine = StopEngine::new(
            &self.config.trailing_stop,
            &self.config.pyramiding.exit_management,
        );
        let decision = engine.evaluate(
            &position.stop,
            &StopInput {
                close,
                indicators,
                reference_price: position.reference_price(use_avg),
                holding_days: position.holding_days(ctx.snapshot.timestamp),
                history: ctx.history,
                recent_uptrend: ctx.snapshot.is_recent_uptrend(
                    self.config.trailing_stop.recent_trend_check_days,
                    self.config.trailing_stop.recent_trend_min_up_ratio,
                ),
                now: ctx.snapshot.timestamp,
            },
        );
        self.record_stop_events(position, &decision, close, ctx.now, out);
        position.stop = decision.state;
    }

    fn record_stop_events(
        &self,
        position: &Position,
        decision: &StopDecision,
        close: f64,
        now: DateTime<Utc>,
        out: &mut TickOutcome,
    ) {
        if decision.breached {
            warn!(
                ticker = %position.ticker,
                position_id = %position.id,
                close,
                stop = decision.previous_stop.max(decision.state.current_stop_price),
                mode = %decision.previous_mode,
                "stop breached"
            );
            out.event(
                position,
                EventType::StopTriggered,
                now,
                format!(
                    "close {close:.4} <= stop {:.4} ({})",
                    decision.state.current_stop_price, decision.previous_mode
                ),
            );
            return;
        }
        if decision.mode_changed() {
            info!(
                ticker = %position.ticker,
                position_id = %position.id,
                from = %decision.previous_mode,
                to = %decision.state.mode,
                stop = decision.state.current_stop_price,
                "stop mode changed"
            );
            out.event(
                position,
                EventType::StopModeChanged,
                now,
                format!(
                    "{} -> {} (stop {:.4})",
                    decision.previous_mode, decision.state.mode, decision.state.current_stop_price
                ),
            );
        } else if decision.raised() && matches!(decision.state.mode, StopMode::TrailingActive { .. }) {
            debug!(
                ticker = %position.ticker,
                stop = decision.state.current_stop_price,
                "trailing stop raised"
            );
            out.event(
                position,
                EventType::StopRaised,
                now,
                format!(
                    "{:.4} -> {:.4}",
                    decision.previous_stop, decision.state.current_stop_price
                ),
            );
        }
    }

    fn evaluate_profit(&self, position: &mut Position, close: f64, now: DateTime<Utc>, out: &mut TickOutcome) {
        if self.retry_budget_spent(position, RetryKey::ProfitTaking) {
            debug!(ticker = %position.ticker, "profit taking suspended after repeated rejections");
            return;
        }
        let use_avg = self.config.pyramiding.exit_management.use_average_entry_price;
        let pending_levels: Vec<usize> = position
            .pending
            .iter()
            .filter_map(|p| match p.action {
                PendingAction::ProfitLevel { level } => Some(level),
                _ => None,
            })
            .collect();

        let exits = ProfitTaker::evaluate(
            &position.profit_plan,
            &ProfitInput {
                close,
                reference_price: position.reference_price(use_avg),
                available_quantity: position.unencumbered_quantity(),
                pending_levels: &pending_levels,
            },
        );
        for exit in exits {
            info!(
                ticker = %position.ticker,
                position_id = %position.id,
                level = exit.level,
                quantity = exit.quantity,
                "profit level crossed"
            );
            out.event(
                position,
                EventType::ProfitLevelTriggered,
                now,
                format!(
                    "level {} (+{:.1}%): sell {:.4}",
                    exit.level,
                    exit.target_pct * 100.0,
                    exit.quantity
                ),
            );
            self.emit(
                position,
                exit.quantity,
                exit.reason,
                PendingAction::ProfitLevel { level: exit.level },
                close,
                now,
                out,
            );
        }
    }

    fn evaluate_pyramid(
        &self,
        position: &mut Position,
        ind: &Indicators,
        ctx: &TickContext<'_>,
        out: &mut TickOutcome,
    ) {
        if self.retry_budget_spent(position, RetryKey::AddOn) {
            debug!(ticker = %position.ticker, "pyramiding suspended after repeated rejections");
            return;
        }
        let verdict = PyramidEngine::new(&self.config.pyramiding).evaluate(position, ind);
        let trigger = match verdict {
            PyramidVerdict::Triggered(trigger) => trigger,
            PyramidVerdict::Blocked(reason) => {
                debug!(ticker = %position.ticker, %reason, "add-on blocked");
                return;
            }
            PyramidVerdict::Vetoed(veto) => {
                debug!(ticker = %position.ticker, %veto, "add-on vetoed");
                return;
            }
            PyramidVerdict::NoTrigger => {
                debug!(ticker = %position.ticker, "no add-on trigger");
                return;
            }
        };

        let sizer = PositionSizer::new(&self.config.entry, &self.config.pyramiding);
        match sizer.size_leg(
            position.legs.len(),
            ind.atr_pct,
            ctx.equity,
            position.committed_pct(),
            ind.close,
        ) {
            Ok(sized) => self.emit(
                position,
                sized.quantity,
                OrderReason::AddOn,
                PendingAction::AddOn {
                    trigger,
                    size_ratio: sized.size_ratio,
                },
                ind.close,
                ctx.now,
                out,
            ),
            Err(skip) => {
                debug!(ticker = %position.ticker, ?skip, "add-on triggered but not sized");
            }
        }
    }

    // ── Helpers ──

    fn retry_budget_spent(&self, position: &Position, key: RetryKey) -> bool {
        position.retries.get(key) >= self.config.engine.max_order_retries
    }

    /// Emit a full exit for the unencumbered quantity unless one is outstanding.
    fn ensure_protective_exit(
        &self,
        position: &mut Position,
        price: f64,
        reason: OrderReason,
        action: PendingAction,
        now: DateTime<Utc>,
        out: &mut TickOutcome,
    ) {
        if position.has_pending(|a| matches!(a, PendingAction::StopExit | PendingAction::OperatorExit)) {
            return;
        }
        let quantity = position.unencumbered_quantity();
        if quantity < QTY_EPSILON {
            return;
        }
        self.emit(position, quantity, reason, action, price, now, out);
    }

    #[allow(clippy::too_many_arguments)]
    fn emit(
        &self,
        position: &mut Position,
        quantity: f64,
        reason: OrderReason,
        action: PendingAction,
        price: f64,
        now: DateTime<Utc>,
        out: &mut TickOutcome,
    ) {
        let order = OrderInstruction::market(position.id, position.ticker.clone(), quantity, reason, price);
        position.pending.push(PendingOrder {
            client_order_id: order.client_order_id,
            reason,
            side: order.side,
            quantity,
            action,
            submitted_at: now,
        });
        info!(
            ticker = %position.ticker,
            position_id = %position.id,
            %reason,
            quantity,
            price,
            "order emitted"
        );
        out.event(
            position,
            EventType::OrderEmitted,
            now,
            format!("{reason} {quantity:.4} @ {price:.4}"),
        );
        out.orders.push(order);
    }
}
