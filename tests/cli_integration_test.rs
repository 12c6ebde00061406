//! CLI integration tests for configuration handling and the backtest pipeline.
//!
//! Tests cover:
//! - Engine config building and validation from INI text
//! - Data path / symbol resolution
//! - Full pipeline with MockDataPort
//! - End-to-end run with real INI and CSV files on disk

mod common;

use clap::Parser;
use common::*;
use replaytrader::adapters::csv_report_adapter::{EQUITY_FILE, TRADES_FILE};
use replaytrader::adapters::file_config_adapter::FileConfigAdapter;
use replaytrader::cli::{self, Cli, Command};
use replaytrader::domain::candle::Candle;
use replaytrader::domain::error::ReplayError;
use replaytrader::domain::execution::BACKTEST_END;
use replaytrader::domain::strategies::{ATR_14, EMA_200, FUNDING_RATE};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

fn write_temp_ini(content: &str) -> tempfile::NamedTempFile {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(content.as_bytes()).unwrap();
    file.flush().unwrap();
    file
}

const VALID_INI: &str = r#"
[engine]
initial_capital = 50.0
maker_fee = 0.0002
taker_fee = 0.0004
slippage_pct = 0.0005
max_open_positions = 2
risk_per_trade = 0.01

[leverage]
btc/usdt = 3
sol/usdt = 5

[data]
path = data/BTCUSDT_4h.csv
symbol = BTC/USDT

[strategy]
name = funding_divergence

[funding_divergence]
ema_period = 30
"#;

/// 40 four-hour candles at 100 with one funding dip at index 35.
fn funding_candles() -> Vec<Candle> {
    (0..40)
        .map(|i| {
            let funding = if i == 35 { -0.0001 } else { 0.00005 };
            bar(i, 101.0, 99.0, 100.0)
                .with_indicator(ATR_14, 2.0)
                .with_indicator(EMA_200, 95.0)
                .with_indicator(FUNDING_RATE, funding)
        })
        .collect()
}

fn candles_csv(candles: &[Candle]) -> String {
    let mut out = String::from("timestamp,open,high,low,close,volume,atr_14,ema_200,funding_rate\n");
    for c in candles {
        out.push_str(&format!(
            "{},{},{},{},{},{},{},{},{}\n",
            c.timestamp.format("%Y-%m-%d %H:%M:%S"),
            c.open,
            c.high,
            c.low,
            c.close,
            c.volume,
            c.indicator(ATR_14).unwrap(),
            c.indicator(EMA_200).unwrap(),
            c.indicator(FUNDING_RATE).unwrap(),
        ));
    }
    out
}

mod config_loading {
    use super::*;

    #[test]
    fn build_engine_config_valid_full() {
        let adapter = FileConfigAdapter::from_string(VALID_INI).unwrap();
        let config = cli::build_engine_config(&adapter).unwrap();

        assert!((config.initial_capital - 50.0).abs() < f64::EPSILON);
        assert!((config.maker_fee - 0.0002).abs() < f64::EPSILON);
        assert!((config.taker_fee - 0.0004).abs() < f64::EPSILON);
        assert!((config.slippage_pct - 0.0005).abs() < f64::EPSILON);
        assert_eq!(config.max_open_positions, 2);
        assert_eq!(config.leverage_cap("BTC/USDT"), Some(3));
        assert_eq!(config.leverage_cap("SOL/USDT"), Some(5));
    }

    #[test]
    fn build_engine_config_uses_defaults() {
        let adapter = FileConfigAdapter::from_string("[strategy]\nname = mean_reversion\n").unwrap();
        let config = cli::build_engine_config(&adapter).unwrap();
        assert!((config.initial_capital - 50.0).abs() < f64::EPSILON);
        assert!((config.risk_per_trade - 0.01).abs() < f64::EPSILON);
        assert_eq!(config.leverage_cap("btc/usdt"), Some(3));
    }

    #[test]
    fn leverage_section_replaces_default_caps() {
        let adapter = FileConfigAdapter::from_string("[leverage]\neth/usdt = 10\n").unwrap();
        let config = cli::build_engine_config(&adapter).unwrap();
        assert_eq!(config.leverage_cap("ETH/USDT"), Some(10));
        assert_eq!(config.leverage_cap("BTC/USDT"), None);
    }

    #[test]
    fn build_engine_config_rejects_bad_values() {
        let adapter = FileConfigAdapter::from_string("[engine]\ninitial_capital = -5\n").unwrap();
        let err = cli::build_engine_config(&adapter).unwrap_err();
        assert!(matches!(err, ReplayError::InvalidConfiguration { .. }));

        let adapter = FileConfigAdapter::from_string("[leverage]\nbtc/usdt = -1\n").unwrap();
        let err = cli::build_engine_config(&adapter).unwrap_err();
        assert!(matches!(err, ReplayError::ConfigInvalid { key, .. } if key == "btc/usdt"));
    }

    #[test]
    fn validate_config_accepts_valid_file() {
        let adapter = FileConfigAdapter::from_string(VALID_INI).unwrap();
        assert!(cli::validate_config(&adapter, false).is_ok());
    }

    #[test]
    fn validate_config_requires_data_path_without_override() {
        let ini = "[data]\nsymbol = BTC/USDT\n[strategy]\nname = squeeze_breakout\n";
        let adapter = FileConfigAdapter::from_string(ini).unwrap();
        let err = cli::validate_config(&adapter, false).unwrap_err();
        assert!(matches!(err, ReplayError::ConfigMissing { key, .. } if key == "path"));
        assert!(cli::validate_config(&adapter, true).is_ok());
    }

    #[test]
    fn validate_config_rejects_unknown_strategy() {
        let ini = VALID_INI.replace("name = funding_divergence", "name = grid_bot");
        let adapter = FileConfigAdapter::from_string(&ini).unwrap();
        let err = cli::validate_config(&adapter, false).unwrap_err();
        assert!(matches!(err, ReplayError::ConfigInvalid { ref key, .. } if key == "name"));
        assert_eq!(err.exit_status(), 2);
    }

    #[test]
    fn data_path_override_wins() {
        let adapter = FileConfigAdapter::from_string(VALID_INI).unwrap();
        assert_eq!(
            cli::resolve_data_path(&adapter, None).unwrap(),
            PathBuf::from("data/BTCUSDT_4h.csv")
        );
        assert_eq!(
            cli::resolve_data_path(&adapter, Some(Path::new("/tmp/other.csv"))).unwrap(),
            PathBuf::from("/tmp/other.csv")
        );
        assert_eq!(cli::resolve_symbol(&adapter).unwrap(), "BTC/USDT");
    }
}

mod arg_parsing {
    use super::*;

    #[test]
    fn backtest_arguments() {
        let cli = Cli::try_parse_from([
            "replaytrader",
            "backtest",
            "--config",
            "run.ini",
            "--data",
            "btc.csv",
            "--output",
            "out",
        ])
        .unwrap();
        match cli.command {
            Command::Backtest {
                config,
                data,
                output,
            } => {
                assert_eq!(config, PathBuf::from("run.ini"));
                assert_eq!(data, Some(PathBuf::from("btc.csv")));
                assert_eq!(output, Some(PathBuf::from("out")));
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn backtest_requires_config() {
        assert!(Cli::try_parse_from(["replaytrader", "backtest"]).is_err());
    }

    #[test]
    fn info_defaults_symbol() {
        let cli = Cli::try_parse_from(["replaytrader", "info", "--data", "btc.csv"]).unwrap();
        assert!(matches!(cli.command, Command::Info { symbol, .. } if symbol == "UNKNOWN"));
    }
}

mod pipeline {
    use super::*;

    #[test]
    fn funding_signal_opens_and_closes_at_end_of_data() {
        let adapter = FileConfigAdapter::from_string(VALID_INI).unwrap();
        let data = MockDataPort::new().with_candles("BTC/USDT", funding_candles());
        let result = cli::run_backtest_pipeline(&data, &adapter).unwrap();

        assert!(result.completed);
        assert_eq!(result.strategy_name, "funding_divergence");
        assert_eq!(result.equity_curve.len(), 40);
        assert_eq!(result.trades.len(), 1);
        let trade = &result.trades[0];
        assert_eq!(trade.exit_reason, BACKTEST_END);
        assert_eq!(trade.entry_time, ts(35));
        assert_eq!(trade.leverage, 3);
        assert!(result.final_balance < 50.0);
        assert!((result.final_equity - result.final_balance).abs() < 1e-12);
    }

    #[test]
    fn missing_symbol_data_is_an_error() {
        let adapter = FileConfigAdapter::from_string(VALID_INI).unwrap();
        let data = MockDataPort::new().with_candles("SOL/USDT", funding_candles());
        let err = cli::run_backtest_pipeline(&data, &adapter).unwrap_err();
        assert!(matches!(err, ReplayError::Data { .. }));
        assert_eq!(err.exit_status(), 4);
    }

    #[test]
    fn unordered_data_is_rejected() {
        let adapter = FileConfigAdapter::from_string(VALID_INI).unwrap();
        let mut candles = funding_candles();
        candles.swap(10, 11);
        let data = MockDataPort::new().with_candles("BTC/USDT", candles);
        let err = cli::run_backtest_pipeline(&data, &adapter).unwrap_err();
        assert!(matches!(err, ReplayError::DataOrdering { index: 11, .. }));
    }
}

mod end_to_end {
    use super::*;

    #[test]
    fn backtest_writes_report_files() {
        let dir = tempfile::TempDir::new().unwrap();
        let csv_path = dir.path().join("btc.csv");
        fs::write(&csv_path, candles_csv(&funding_candles())).unwrap();
        let ini = write_temp_ini(VALID_INI);
        let out = dir.path().join("report");

        cli::run(Cli {
            command: Command::Backtest {
                config: ini.path().to_path_buf(),
                data: Some(csv_path),
                output: Some(out.clone()),
            },
        });

        let trades = fs::read_to_string(out.join(TRADES_FILE)).unwrap();
        assert_eq!(trades.lines().count(), 2);
        assert!(trades.contains(BACKTEST_END));
        let equity = fs::read_to_string(out.join(EQUITY_FILE)).unwrap();
        assert_eq!(equity.lines().count(), 41);
    }

    #[test]
    fn invalid_config_stops_before_writing() {
        let dir = tempfile::TempDir::new().unwrap();
        let ini = write_temp_ini("[engine]\ntaker_fee = 4\n[strategy]\nname = funding_divergence\n");
        let out = dir.path().join("report");

        cli::run(Cli {
            command: Command::Backtest {
                config: ini.path().to_path_buf(),
                data: Some(dir.path().join("missing.csv")),
                output: Some(out.clone()),
            },
        });

        assert!(!out.exists());
    }
}
