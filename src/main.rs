//! Regime backtest CLI
//!
//! Evaluates the indicator engine on a daily index series and replays its
//! signals through the trade simulator.
//!
//! # Usage
//!
//! ```bash
//! # Today's market state, signal and recommendation
//! regime-backtest --data data/spx.csv evaluate
//!
//! # Backtest the signal history with a custom config
//! regime-backtest --data data/spx.parquet --config config/strategy.toml backtest
//!
//! # Dip-buy accumulation
//! regime-backtest --data data/qqq.csv dip-buy
//!
//! # Drawdown following each signal, as JSON
//! regime-backtest --data data/spx.csv --json scan --horizon 60
//!
//! # Parameter sweep, top 20 runs
//! regime-backtest --data data/spx.csv sweep --top 20
//! ```

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use serde::Serialize;
use tracing::info;

use regime_backtest::backtest::{CrashScan, TradeSimulator};
use regime_backtest::config::StrategyConfig;
use regime_backtest::data::{SeriesLoader, SeriesWindow};
use regime_backtest::metrics::{AccumulationMetrics, MetricsCalculator};
use regime_backtest::policy::{DipBuySimulator, MoneyManagement};
use regime_backtest::signal::{DailyEvaluation, TradeRecommendation};
use regime_backtest::sweep::{ParameterGrid, SweepRunner};

const SEPARATOR: &str = "============================================================";

/// Regime-aware signal evaluation and trade simulation.
#[derive(Parser)]
#[command(name = "regime-backtest")]
#[command(about = "Market regime signals and trade simulation")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Daily series file (CSV or Parquet)
    #[arg(long)]
    data: PathBuf,

    /// Strategy configuration (TOML)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Print results as JSON
    #[arg(long)]
    json: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Market state, signal and recommendation for the latest date
    Evaluate,

    /// Replay the signal history through the configured money management
    Backtest {
        /// List every trade
        #[arg(long)]
        trades: bool,
    },

    /// Dip-buy accumulation regardless of the configured money management
    DipBuy,

    /// Lowest close following each signal
    Scan {
        /// Observations to look forward from each signal
        #[arg(long, default_value_t = 60)]
        horizon: usize,
    },

    /// Grid search over position size, gain target, stop loss and hold
    Sweep {
        /// Runs to print
        #[arg(long, default_value_t = 10)]
        top: usize,
    },
}

#[derive(Serialize)]
struct EvaluateOutput<'a> {
    evaluation: &'a DailyEvaluation,
    recommendation: Option<TradeRecommendation>,
}

fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("regime_backtest=info".parse()?),
        )
        .init();

    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => StrategyConfig::load(path)
            .with_context(|| format!("Failed to load config {}", path.display()))?,
        None => StrategyConfig::default(),
    };
    let series = load_series(&cli.data)?;

    match cli.command {
        Commands::Evaluate => cmd_evaluate(&config, &series, cli.json),
        Commands::Backtest { trades } => match config.money_management {
            MoneyManagement::FixedPercent => cmd_backtest(&config, &series, cli.json, trades),
            MoneyManagement::DipBuy => cmd_dip_buy(&config, &series, cli.json),
        },
        Commands::DipBuy => cmd_dip_buy(&config, &series, cli.json),
        Commands::Scan { horizon } => cmd_scan(&config, &series, cli.json, horizon),
        Commands::Sweep { top } => cmd_sweep(&config, &series, cli.json, top),
    }
}

fn load_series(path: &Path) -> Result<SeriesWindow> {
    let series = SeriesLoader::load(path)
        .with_context(|| format!("Failed to load series {}", path.display()))?;
    info!(
        "Loaded {} days ({} to {})",
        series.len(),
        series.first_date().map(|d| d.to_string()).unwrap_or_default(),
        series.last_date().map(|d| d.to_string()).unwrap_or_default()
    );
    Ok(series)
}

fn progress_bar(len: usize, message: &str, hidden: bool) -> Result<ProgressBar> {
    if hidden {
        return Ok(ProgressBar::hidden());
    }
    let pb = ProgressBar::new(len as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] {bar:40.cyan/blue} {pos}/{len} {msg}")?
            .progress_chars("=>-"),
    );
    pb.set_message(message.to_string());
    Ok(pb)
}

/// Full-history scan with a progress bar.
fn scan_history(
    config: &StrategyConfig,
    series: &SeriesWindow,
    hidden: bool,
) -> Result<Vec<DailyEvaluation>> {
    let scanner = config.scanner();
    let dates = series.len().saturating_sub(config.data.lookback_days);
    let pb = progress_bar(dates, "scanning", hidden)?;
    let evaluations = scanner.scan_with_progress(series, |done, _| pb.set_position(done as u64));
    pb.finish_with_message("scan complete");
    Ok(evaluations)
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!(
        "{}",
        serde_json::to_string_pretty(value).context("Failed to serialize output")?
    );
    Ok(())
}

fn cmd_evaluate(config: &StrategyConfig, series: &SeriesWindow, json: bool) -> Result<()> {
    let evaluation = config
        .scanner()
        .latest(series)
        .context("Latest date could not be evaluated (history too short?)")?;
    let recommendation = TradeRecommendation::from_signal(
        evaluation.signal(),
        &evaluation.state,
        &config.recommendation,
    );

    if json {
        return print_json(&EvaluateOutput {
            evaluation: &evaluation,
            recommendation,
        });
    }

    let state = &evaluation.state;
    let cond = &evaluation.evaluation;
    println!("{}", SEPARATOR);
    println!("MARKET STATE {}", state.date);
    println!("{}", SEPARATOR);
    println!("  Price:              {:.2}", state.price);
    match state.fractal_dimension {
        Some(fd) => println!("  Fractal dimension:  {:.3}", fd),
        None => println!("  Fractal dimension:  n/a"),
    }
    println!("  Volatility index:   {:.2}", state.volatility_index);
    println!("  Sentiment proxy:    {:.3}", state.sentiment_proxy);
    println!("  Regime:             {} ({})", state.regime, state.regime.description());
    println!();
    println!(
        "  SHORT conditions:   {}/4 met    LONG conditions: {}/4 met",
        cond.short.met_count(),
        cond.long.met_count()
    );
    println!("  SIGNAL:             {}", evaluation.signal());

    if let Some(rec) = recommendation {
        println!();
        println!("RECOMMENDATION");
        println!("  {} {} ({})", rec.action, rec.symbol, rec.direction);
        println!("  Position size:      {:.1}% of portfolio", rec.position_size_pct);
        println!("  Entry:              {:.2}", rec.entry_price);
        println!("  Stop:               {:.2}", rec.stop_price);
        println!("  Target:             {:.2}", rec.target_price);
        println!("  Reward/risk:        {:.2}", rec.reward_risk());
        println!("  {}", rec.rationale);
    }
    println!("{}", SEPARATOR);

    Ok(())
}

fn cmd_backtest(
    config: &StrategyConfig,
    series: &SeriesWindow,
    json: bool,
    list_trades: bool,
) -> Result<()> {
    let evaluations = scan_history(config, series, json)?;
    let simulator = TradeSimulator::new(config.trading.clone());
    let result = simulator.run(series, &evaluations);
    let metrics = MetricsCalculator::calculate(&result);

    if json {
        #[derive(Serialize)]
        struct BacktestOutput<'a> {
            result: &'a regime_backtest::backtest::BacktestResult,
            metrics: &'a regime_backtest::metrics::PerformanceMetrics,
        }
        return print_json(&BacktestOutput {
            result: &result,
            metrics: &metrics,
        });
    }

    println!("{}", SEPARATOR);
    println!("{}", result.summary());
    println!("{}", SEPARATOR);
    println!("{}", metrics.summary());

    let drawdown = MetricsCalculator::analyze_drawdown(&result.equity_curve);
    if let (Some(peak), Some(trough)) = (drawdown.peak_date, drawdown.trough_date) {
        println!(
            "Deepest decline: {:.2}% from {} to {}",
            drawdown.max_drawdown_pct, peak, trough
        );
    }

    if list_trades {
        println!("{}", SEPARATOR);
        println!(
            "{:>4} {:<6} {:<11} {:<11} {:>5} {:>9} {:>9} {:<12}",
            "#", "Side", "Entry", "Exit", "Days", "Sleeve %", "Port %", "Exit"
        );
        for t in &result.trades {
            println!(
                "{:>4} {:<6} {:<11} {:<11} {:>5} {:>9.2} {:>9.2} {:<12}",
                t.id,
                format!("{:?}", t.direction),
                t.entry_date,
                t.exit_date,
                t.hold_days,
                t.sleeve_return_pct(),
                t.return_pct(),
                t.exit_reason.as_str()
            );
        }
    }

    Ok(())
}

fn cmd_dip_buy(config: &StrategyConfig, series: &SeriesWindow, json: bool) -> Result<()> {
    let result = DipBuySimulator::new(config.dip_buy.clone()).run(series);
    let metrics = AccumulationMetrics::calculate(&result);

    if json {
        #[derive(Serialize)]
        struct DipBuyOutput<'a> {
            result: &'a regime_backtest::policy::DipBuyResult,
            metrics: &'a AccumulationMetrics,
        }
        return print_json(&DipBuyOutput {
            result: &result,
            metrics: &metrics,
        });
    }

    println!("{}", SEPARATOR);
    println!(
        "DIP-BUY ACCUMULATION ({} to {})",
        result.start_date, result.end_date
    );
    println!("{}", SEPARATOR);
    println!("{}", metrics.summary());
    Ok(())
}

fn cmd_scan(
    config: &StrategyConfig,
    series: &SeriesWindow,
    json: bool,
    horizon: usize,
) -> Result<()> {
    let evaluations = scan_history(config, series, json)?;
    let signals = CrashScan::new(horizon).scan(series, &evaluations);
    let summary = CrashScan::summarize(&signals);

    if json {
        #[derive(Serialize)]
        struct ScanOutput<'a> {
            signals: &'a [regime_backtest::backtest::CrashSignal],
            summary: &'a Option<regime_backtest::backtest::CrashScanSummary>,
        }
        return print_json(&ScanOutput {
            signals: &signals,
            summary: &summary,
        });
    }

    println!("{}", SEPARATOR);
    println!(
        "{:<11} {:<6} {:>9} {:>6} {:>6} {:>5} {:<9} {:>8} {:>5}",
        "Date", "Signal", "Price", "FD", "VIX", "Sent", "Regime", "Drop %", "Days"
    );
    for s in &signals {
        let fd = s
            .state
            .fractal_dimension
            .map(|f| format!("{:.3}", f))
            .unwrap_or_else(|| "n/a".to_string());
        let (drop, days) = match &s.low {
            Some(low) => (format!("{:.2}", low.drop_pct), low.days_to_low.to_string()),
            None => ("-".to_string(), "-".to_string()),
        };
        println!(
            "{:<11} {:<6} {:>9.2} {:>6} {:>6.2} {:>5.2} {:<9} {:>8} {:>5}",
            s.date,
            s.signal.as_str(),
            s.state.price,
            fd,
            s.state.volatility_index,
            s.state.sentiment_proxy,
            s.state.regime.as_str(),
            drop,
            days
        );
    }

    println!("{}", SEPARATOR);
    match summary {
        Some(sum) => {
            println!(
                "Signals: {} ({} with forward data)",
                sum.total_signals, sum.signals_with_data
            );
            println!("Average drop:        {:.2}%", sum.mean_drop_pct);
            println!("Median drop:         {:.2}%", sum.median_drop_pct);
            println!("Worst drop:          {:.2}%", sum.worst_drop_pct);
            println!("Mildest drop:        {:.2}%", sum.mildest_drop_pct);
            println!("Average days to low: {:.1}", sum.mean_days_to_low);
        }
        None => println!("No signals with forward data."),
    }

    Ok(())
}

fn cmd_sweep(config: &StrategyConfig, series: &SeriesWindow, json: bool, top: usize) -> Result<()> {
    let evaluations = scan_history(config, series, json)?;
    let grid = ParameterGrid::default();
    let pb = progress_bar(grid.total_combinations(), "sweeping", json)?;

    let result = SweepRunner::new(config.trading.clone())
        .with_param_grid(grid)
        .run_with_progress(series, &evaluations, |done, _| pb.set_position(done as u64))
        .context("Parameter sweep failed")?;
    pb.finish_with_message("sweep complete");

    if json {
        return print_json(&result);
    }

    println!("{}", SEPARATOR);
    println!("{}", result.summary(top));
    Ok(())
}
