//! CLI definition and dispatch.

use clap::{Parser, Subcommand};
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use crate::adapters::csv_adapter::CsvAdapter;
use crate::adapters::csv_report_adapter::CsvReportAdapter;
use crate::adapters::file_config_adapter::FileConfigAdapter;
use crate::domain::config::EngineConfig;
use crate::domain::config_validation::{
    validate_data_config, validate_engine_config, validate_strategy_config,
};
use crate::domain::engine::{BacktestResult, Engine};
use crate::domain::error::ReplayError;
use crate::domain::strategies::build_strategy;
use crate::ports::config_port::ConfigPort;
use crate::ports::data_port::DataPort;
use crate::ports::report_port::ReportPort;

#[derive(Parser, Debug)]
#[command(name = "replaytrader", about = "Leveraged crypto futures backtester")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Replay a candle file through the configured strategy
    Backtest {
        #[arg(short, long)]
        config: PathBuf,
        /// Overrides [data] path
        #[arg(short, long)]
        data: Option<PathBuf>,
        /// Directory for trades.csv and equity.csv
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Validate a configuration file without loading data
    Validate {
        #[arg(short, long)]
        config: PathBuf,
    },
    /// Summarize a candle file
    Info {
        #[arg(short, long)]
        data: PathBuf,
        #[arg(short, long, default_value = "UNKNOWN")]
        symbol: String,
    },
}

pub fn run(cli: Cli) -> ExitCode {
    let outcome = match cli.command {
        Command::Backtest {
            config,
            data,
            output,
        } => run_backtest(&config, data.as_deref(), output.as_deref()),
        Command::Validate { config } => run_validate(&config),
        Command::Info { data, symbol } => run_info(&data, &symbol),
    };
    match outcome {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e}");
            (&e).into()
        }
    }
}

pub fn load_config(path: &Path) -> Result<FileConfigAdapter, ReplayError> {
    eprintln!("Loading config from {}", path.display());
    FileConfigAdapter::from_file(path)
}

/// Every section check, in the order a backtest needs them.
pub fn validate_config(config: &dyn ConfigPort, data_override: bool) -> Result<(), ReplayError> {
    validate_engine_config(config)?;
    validate_strategy_config(config)?;
    if data_override {
        resolve_symbol(config)?;
    } else {
        validate_data_config(config)?;
    }
    Ok(())
}

pub fn build_engine_config(config: &dyn ConfigPort) -> Result<EngineConfig, ReplayError> {
    let defaults = EngineConfig::default();
    let max_open_positions = config.get_int(
        "engine",
        "max_open_positions",
        defaults.max_open_positions as i64,
    );
    let max_open_positions =
        usize::try_from(max_open_positions).map_err(|_| ReplayError::ConfigInvalid {
            section: "engine".into(),
            key: "max_open_positions".into(),
            reason: "max_open_positions must be at least 1".into(),
        })?;

    // A [leverage] section replaces the default caps entirely.
    let cap_symbols = config.keys("leverage");
    let leverage_caps = if cap_symbols.is_empty() {
        defaults.leverage_caps
    } else {
        BTreeMap::new()
    };

    let mut engine_config = EngineConfig {
        initial_capital: config.get_double("engine", "initial_capital", defaults.initial_capital),
        maker_fee: config.get_double("engine", "maker_fee", defaults.maker_fee),
        taker_fee: config.get_double("engine", "taker_fee", defaults.taker_fee),
        slippage_pct: config.get_double("engine", "slippage_pct", defaults.slippage_pct),
        max_open_positions,
        risk_per_trade: config.get_double("engine", "risk_per_trade", defaults.risk_per_trade),
        max_notional_fraction: config.get_double(
            "engine",
            "max_notional_fraction",
            defaults.max_notional_fraction,
        ),
        max_loss_fraction: config.get_double(
            "engine",
            "max_loss_fraction",
            defaults.max_loss_fraction,
        ),
        leverage_caps,
    };
    for symbol in cap_symbols {
        let cap = u32::try_from(config.get_int("leverage", &symbol, 0)).map_err(|_| {
            ReplayError::ConfigInvalid {
                section: "leverage".into(),
                key: symbol.clone(),
                reason: "leverage cap must be a whole number of at least 1".into(),
            }
        })?;
        engine_config = engine_config.with_leverage_cap(&symbol, cap);
    }
    engine_config.validate()?;
    Ok(engine_config)
}

pub fn resolve_symbol(config: &dyn ConfigPort) -> Result<String, ReplayError> {
    config
        .get_string("data", "symbol")
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .ok_or_else(|| ReplayError::ConfigMissing {
            section: "data".into(),
            key: "symbol".into(),
        })
}

pub fn resolve_data_path(
    config: &dyn ConfigPort,
    data_override: Option<&Path>,
) -> Result<PathBuf, ReplayError> {
    if let Some(path) = data_override {
        return Ok(path.to_path_buf());
    }
    config
        .get_string("data", "path")
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .map(PathBuf::from)
        .ok_or_else(|| ReplayError::ConfigMissing {
            section: "data".into(),
            key: "path".into(),
        })
}

fn run_backtest(
    config_path: &Path,
    data_override: Option<&Path>,
    output: Option<&Path>,
) -> Result<(), ReplayError> {
    // Stage 1: load and validate config before touching data
    let adapter = load_config(config_path)?;
    validate_config(&adapter, data_override.is_some())?;

    // Stage 2: data source
    let data_path = resolve_data_path(&adapter, data_override)?;
    eprintln!("Loading candles from {}", data_path.display());
    let data_port = CsvAdapter::new(data_path);

    // Stage 3: replay and report
    let result = run_backtest_pipeline(&data_port, &adapter)?;
    print_summary(&result);
    if let Some(dir) = output {
        CsvReportAdapter.write(&result, dir)?;
        eprintln!("Report written to {}", dir.display());
    }
    Ok(())
}

/// Build the engine and strategy from `config`, fetch the configured symbol
/// from `data_port` and replay it.
pub fn run_backtest_pipeline(
    data_port: &dyn DataPort,
    config: &dyn ConfigPort,
) -> Result<BacktestResult, ReplayError> {
    let engine_config = build_engine_config(config)?;
    let symbol = resolve_symbol(config)?;
    let name = config
        .get_string("strategy", "name")
        .unwrap_or_default()
        .trim()
        .to_string();
    let strategy = build_strategy(&name, config, &engine_config, &symbol)?;
    eprintln!("Strategy: {}", strategy.name());

    let series = data_port.fetch_candles(&symbol)?;
    eprintln!("Replaying {} candles for {}...", series.len(), symbol);

    let mut engine = Engine::new(engine_config)?;
    engine.run(&series, strategy.as_ref())
}

pub fn print_summary(result: &BacktestResult) {
    let wins = result.trades.iter().filter(|t| t.is_win()).count();

    println!("Backtest: {} / {}", result.symbol, result.strategy_name);
    println!("  Initial capital: {:.2}", result.initial_capital);
    println!("  Final equity:    {:.2}", result.final_equity);
    println!("  Final balance:   {:.2}", result.final_balance);
    println!("  Total return:    {:.2}%", result.total_return() * 100.0);
    println!("  Net P&L:         {:.4}", result.net_pnl());
    println!("  Exit fees:       {:.4}", result.total_fees());
    println!("  Trades:          {} ({} winning)", result.trades.len(), wins);
    for (reason, count) in result.exit_reason_counts() {
        println!("    {reason}: {count}");
    }
    if !result.completed {
        println!("  Run cancelled with {} open position(s)", result.open_positions.len());
    }
}

fn run_validate(config_path: &Path) -> Result<(), ReplayError> {
    let adapter = load_config(config_path)?;
    validate_config(&adapter, false)?;
    build_engine_config(&adapter)?;
    println!("Configuration is valid.");
    Ok(())
}

fn run_info(data_path: &Path, symbol: &str) -> Result<(), ReplayError> {
    let series = CsvAdapter::new(data_path.to_path_buf()).fetch_candles(symbol)?;
    let indicators: BTreeSet<&str> = series
        .candles
        .iter()
        .flat_map(|c| c.indicators.keys().map(String::as_str))
        .collect();

    println!("File:       {}", data_path.display());
    println!("Candles:    {}", series.len());
    if let (Some(first), Some(last)) = (series.first_timestamp(), series.last_timestamp()) {
        println!("Range:      {first} .. {last}");
    }
    if indicators.is_empty() {
        println!("Indicators: none");
    } else {
        let names: Vec<&str> = indicators.into_iter().collect();
        println!("Indicators: {}", names.join(", "));
    }
    match series.validate() {
        Ok(()) => println!("Ordering:   ok"),
        Err(e) => println!("Ordering:   {e}"),
    }
    Ok(())
}
