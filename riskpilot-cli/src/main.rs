//! RiskPilot CLI — config management and single-tick evaluation.
//!
//! Commands:
//! - `validate` — load a TOML config and report problems
//! - `init-config` — write the default config as TOML
//! - `fingerprint` — print the config fingerprint used in logs
//! - `open` — create a position file from an entry fill
//! - `tick` — evaluate one snapshot against a position file
//! - `fill` — apply a fill report to a position file
//! - `reject` — record an order rejection against a position file

use anyhow::{bail, Context, Result};
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use riskpilot_core::config::StrategyConfig;
use riskpilot_core::domain::{
    ClientOrderId, FillReport, IndicatorSnapshot, OrderInstruction, OrderReason, Position,
    PositionEvent, PositionId, TradeHistory,
};
use riskpilot_core::lifecycle::{LifecycleController, TickContext};
use riskpilot_runner::telemetry::{self, LogFormat};

#[derive(Parser)]
#[command(
    name = "riskpilot",
    about = "RiskPilot CLI — risk-managed position lifecycle engine"
)]
struct Cli {
    /// Log level for riskpilot crates (overridden by RUST_LOG).
    #[arg(long, global = true)]
    log_level: Option<String>,

    /// Emit logs as JSON lines.
    #[arg(long, global = true, default_value_t = false)]
    log_json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Load a TOML config and report the first invalid field.
    Validate {
        config: PathBuf,
    },
    /// Write the default config as TOML.
    InitConfig {
        #[arg(long, default_value = "riskpilot.toml")]
        output: PathBuf,

        /// Overwrite an existing file.
        #[arg(long, default_value_t = false)]
        force: bool,
    },
    /// Print the fingerprint of a config (defaults if no path is given).
    Fingerprint {
        config: Option<PathBuf>,
    },
    /// Create a position file from an initial entry fill.
    Open {
        #[arg(long)]
        ticker: String,

        #[arg(long)]
        price: f64,

        #[arg(long)]
        quantity: f64,

        /// Portfolio equity at entry, for the leg's size ratio.
        #[arg(long)]
        equity: f64,

        #[arg(long, default_value_t = 0.0)]
        fee: f64,

        #[arg(long)]
        config: Option<PathBuf>,

        #[arg(long)]
        output: PathBuf,
    },
    /// Evaluate one snapshot against a position and print orders and events.
    Tick {
        #[arg(long)]
        position: PathBuf,

        #[arg(long)]
        snapshot: PathBuf,

        /// Trade history JSON for edge-stop eligibility.
        #[arg(long)]
        history: Option<PathBuf>,

        #[arg(long)]
        equity: f64,

        /// Evaluation time (RFC 3339). Defaults to the snapshot timestamp.
        #[arg(long)]
        now: Option<String>,

        #[arg(long)]
        config: Option<PathBuf>,

        /// Write the updated position back to its file.
        #[arg(long, default_value_t = false)]
        write: bool,
    },
    /// Apply a fill report to a position and print the resulting events.
    Fill {
        #[arg(long)]
        position: PathBuf,

        #[arg(long)]
        fill: PathBuf,

        #[arg(long)]
        config: Option<PathBuf>,

        #[arg(long, default_value_t = false)]
        write: bool,
    },
    /// Record that a pending order was rejected and print the resulting events.
    Reject {
        #[arg(long)]
        position: PathBuf,

        /// Client order id of the pending order.
        #[arg(long)]
        order_id: ClientOrderId,

        #[arg(long, default_value = "rejected by broker")]
        cause: String,

        /// Rejection time (RFC 3339). Defaults to now.
        #[arg(long)]
        at: Option<String>,

        #[arg(long)]
        config: Option<PathBuf>,

        #[arg(long, default_value_t = false)]
        write: bool,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let format = if cli.log_json {
        LogFormat::Json
    } else {
        LogFormat::Text
    };
    telemetry::init(cli.log_level.as_deref(), format);

    match cli.command {
        Commands::Validate { config } => run_validate(&config),
        Commands::InitConfig { output, force } => run_init_config(&output, force),
        Commands::Fingerprint { config } => {
            let config = load_config(config.as_deref())?;
            println!("{}", config.fingerprint());
            Ok(())
        }
        Commands::Open {
            ticker,
            price,
            quantity,
            equity,
            fee,
            config,
            output,
        } => run_open(&ticker, price, quantity, equity, fee, config.as_deref(), &output),
        Commands::Tick {
            position,
            snapshot,
            history,
            equity,
            now,
            config,
            write,
        } => run_tick(
            &position,
            &snapshot,
            history.as_deref(),
            equity,
            now.as_deref(),
            config.as_deref(),
            write,
        ),
        Commands::Fill {
            position,
            fill,
            config,
            write,
        } => run_fill(&position, &fill, config.as_deref(), write),
        Commands::Reject {
            position,
            order_id,
            cause,
            at,
            config,
            write,
        } => {
            let at = match at.as_deref() {
                Some(s) => parse_time(s, "--at")?,
                None => Utc::now(),
            };
            let events = run_reject(&position, order_id, &cause, at, config.as_deref(), write)?;
            print_json(&events)
        }
    }
}

fn run_validate(path: &Path) -> Result<()> {
    let config = StrategyConfig::from_file(path)
        .with_context(|| format!("{} is not a valid config", path.display()))?;
    println!("OK: {}", path.display());
    println!("  fingerprint      {}", config.fingerprint());
    println!("  max legs         {}", config.pyramiding.max_legs());
    println!(
        "  max allocation   {:.2}%",
        config.pyramiding.max_total_position_pct * 100.0
    );
    println!(
        "  profit levels    {:?}",
        config.pyramiding.exit_management.profit_taking_levels
    );
    println!(
        "  trailing stop    {}",
        if config.trailing_stop.enabled { "enabled" } else { "disabled" }
    );
    Ok(())
}

fn run_init_config(output: &Path, force: bool) -> Result<()> {
    if output.exists() && !force {
        bail!("{} already exists (use --force to overwrite)", output.display());
    }
    let toml = StrategyConfig::default()
        .to_toml_string()
        .context("failed to serialize default config")?;
    std::fs::write(output, toml).with_context(|| format!("failed to write {}", output.display()))?;
    println!("Wrote default config to {}", output.display());
    Ok(())
}

fn run_open(
    ticker: &str,
    price: f64,
    quantity: f64,
    equity: f64,
    fee: f64,
    config_path: Option<&Path>,
    output: &Path,
) -> Result<()> {
    let controller = LifecycleController::new(Arc::new(load_config(config_path)?));
    let order = OrderInstruction::market(
        PositionId::new(),
        ticker,
        quantity,
        OrderReason::InitialEntry,
        price,
    );
    let fill = FillReport {
        client_order_id: order.client_order_id,
        price,
        quantity,
        fee,
        filled_at: Utc::now(),
    };
    let (position, events) = controller
        .open_position(&order, &fill, equity)
        .context("entry fill rejected")?;
    write_json(output, &position)?;
    print_json(&events)
}

fn run_tick(
    position_path: &Path,
    snapshot_path: &Path,
    history_path: Option<&Path>,
    equity: f64,
    now: Option<&str>,
    config_path: Option<&Path>,
    write: bool,
) -> Result<()> {
    let controller = LifecycleController::new(Arc::new(load_config(config_path)?));
    let mut position: Position = read_json(position_path)?;
    let snapshot: IndicatorSnapshot = read_json(snapshot_path)?;
    let history: Option<TradeHistory> = history_path.map(read_json::<TradeHistory>).transpose()?;
    let now = match now {
        Some(s) => parse_time(s, "--now")?,
        None => snapshot.timestamp,
    };

    let outcome = controller.tick(
        &mut position,
        &TickContext {
            snapshot: &snapshot,
            history: history.as_ref(),
            equity,
            now,
        },
    );
    print_json(&serde_json::json!({
        "orders": outcome.orders,
        "events": outcome.events,
        "stop": position.stop,
    }))?;
    if write {
        write_json(position_path, &position)?;
    }
    Ok(())
}

fn run_fill(position_path: &Path, fill_path: &Path, config_path: Option<&Path>, write: bool) -> Result<()> {
    let controller = LifecycleController::new(Arc::new(load_config(config_path)?));
    let mut position: Position = read_json(position_path)?;
    let fill: FillReport = read_json(fill_path)?;
    let events = controller
        .apply_fill(&mut position, &fill)
        .context("fill could not be applied")?;
    print_json(&events)?;
    if write {
        write_json(position_path, &position)?;
    }
    Ok(())
}

fn run_reject(
    position_path: &Path,
    order_id: ClientOrderId,
    cause: &str,
    at: DateTime<Utc>,
    config_path: Option<&Path>,
    write: bool,
) -> Result<Vec<PositionEvent>> {
    let controller = LifecycleController::new(Arc::new(load_config(config_path)?));
    let mut position: Position = read_json(position_path)?;
    let events = controller
        .apply_rejection(&mut position, order_id, cause, at)
        .context("rejection could not be applied")?;
    if write {
        write_json(position_path, &position)?;
    }
    Ok(events)
}

// ── Helpers ──────────────────────────────────────────────────────────

fn parse_time(s: &str, flag: &str) -> Result<DateTime<Utc>> {
    Ok(DateTime::parse_from_rfc3339(s)
        .with_context(|| format!("invalid {flag} '{s}'"))?
        .with_timezone(&Utc))
}

fn load_config(path: Option<&Path>) -> Result<StrategyConfig> {
    match path {
        Some(path) => StrategyConfig::from_file(path)
            .with_context(|| format!("failed to load config {}", path.display())),
        None => Ok(StrategyConfig::default()),
    }
}

fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    serde_json::from_str(&content).with_context(|| format!("failed to parse {}", path.display()))
}

fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let json = serde_json::to_string_pretty(value)?;
    std::fs::write(path, json).with_context(|| format!("failed to write {}", path.display()))
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use riskpilot_core::domain::EventType;

    fn at(day: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, day, 7, 0, 0).unwrap()
    }

    fn breach_snapshot(day: u32) -> IndicatorSnapshot {
        IndicatorSnapshot {
            ticker: "NVDA".into(),
            timestamp: at(day),
            close: 90.0,
            high: 91.0,
            low: 89.0,
            volume: 1_000.0,
            atr: None,
            atr_pct: Some(0.02),
            rsi_14: Some(45.0),
            adx: Some(20.0),
            macd_histogram: Some(-0.1),
            ma20: Some(95.0),
            ma20_slope: Some(-0.1),
            trend_signal: false,
            rolling_high_20: Some(110.0),
            rolling_avg_volume_20: Some(1_000.0),
            recent_closes: Vec::new(),
        }
    }

    /// Position file holding a pending stop exit, as `tick --write` leaves it.
    fn position_with_pending_exit(dir: &Path) -> (PathBuf, ClientOrderId) {
        let controller = LifecycleController::new(Arc::new(StrategyConfig::default()));
        let order = OrderInstruction::market(PositionId::new(), "NVDA", 100.0, OrderReason::InitialEntry, 100.0);
        let fill = FillReport {
            client_order_id: order.client_order_id,
            price: 100.0,
            quantity: 100.0,
            fee: 0.0,
            filled_at: at(1),
        };
        let (mut position, _) = controller.open_position(&order, &fill, 100_000.0).unwrap();
        let snapshot = breach_snapshot(2);
        let outcome = controller.tick(
            &mut position,
            &TickContext {
                snapshot: &snapshot,
                history: None,
                equity: 100_000.0,
                now: snapshot.timestamp,
            },
        );
        assert_eq!(outcome.orders.len(), 1);
        assert_eq!(position.pending.len(), 1);

        let path = dir.join("position.json");
        write_json(&path, &position).unwrap();
        (path, outcome.orders[0].client_order_id)
    }

    #[test]
    fn reject_clears_pending_order_in_position_file() {
        let dir = tempfile::tempdir().unwrap();
        let (path, order_id) = position_with_pending_exit(dir.path());

        let events = run_reject(&path, order_id, "insufficient liquidity", at(2), None, true).unwrap();
        assert!(events.iter().any(|e| e.event_type == EventType::OrderRejected));

        let position: Position = read_json(&path).unwrap();
        assert!(position.pending.is_empty());
        assert_eq!(position.retries.protective_exit, 1);
    }

    #[test]
    fn reject_without_write_leaves_file_untouched() {
        let dir = tempfile::tempdir().unwrap();
        let (path, order_id) = position_with_pending_exit(dir.path());

        run_reject(&path, order_id, "timeout", at(2), None, false).unwrap();
        let position: Position = read_json(&path).unwrap();
        assert_eq!(position.pending.len(), 1);
    }

    #[test]
    fn reject_of_unknown_order_fails() {
        let dir = tempfile::tempdir().unwrap();
        let (path, _) = position_with_pending_exit(dir.path());
        assert!(run_reject(&path, ClientOrderId::new(), "timeout", at(2), None, true).is_err());
    }
}
