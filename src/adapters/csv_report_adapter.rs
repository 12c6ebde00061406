//! Writes a run's trade ledger and equity curve as CSV files.

use crate::domain::engine::BacktestResult;
use crate::domain::error::ReplayError;
use crate::ports::report_port::ReportPort;
use std::fs;
use std::path::Path;
use tracing::info;

pub const TRADES_FILE: &str = "trades.csv";
pub const EQUITY_FILE: &str = "equity.csv";

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

pub struct CsvReportAdapter;

impl CsvReportAdapter {
    fn write_trades(result: &BacktestResult, path: &Path) -> Result<(), csv::Error> {
        let mut wtr = csv::Writer::from_path(path)?;
        wtr.write_record([
            "position_id",
            "symbol",
            "side",
            "strategy",
            "entry_time",
            "exit_time",
            "entry_price",
            "exit_price",
            "size",
            "leverage",
            "net_pnl",
            "pnl_pct",
            "fees",
            "hold_hours",
            "exit_reason",
        ])?;
        for t in &result.trades {
            wtr.write_record([
                t.position_id.to_string(),
                t.symbol.clone(),
                t.side.to_string(),
                t.strategy_name.clone(),
                t.entry_time.format(TIMESTAMP_FORMAT).to_string(),
                t.exit_time.format(TIMESTAMP_FORMAT).to_string(),
                t.entry_price.to_string(),
                t.exit_price.to_string(),
                t.size_closed.to_string(),
                t.leverage.to_string(),
                t.net_pnl.to_string(),
                format!("{:.4}", t.pnl_pct),
                t.fees_paid.to_string(),
                format!("{:.2}", t.hold_time_hours()),
                t.exit_reason.clone(),
            ])?;
        }
        wtr.flush()?;
        Ok(())
    }

    fn write_equity(result: &BacktestResult, path: &Path) -> Result<(), csv::Error> {
        let mut wtr = csv::Writer::from_path(path)?;
        wtr.write_record(["timestamp", "equity", "balance", "open_positions"])?;
        for sample in &result.equity_curve {
            wtr.write_record([
                sample.timestamp.format(TIMESTAMP_FORMAT).to_string(),
                sample.equity.to_string(),
                sample.balance.to_string(),
                sample.open_positions.to_string(),
            ])?;
        }
        wtr.flush()?;
        Ok(())
    }
}

impl ReportPort for CsvReportAdapter {
    fn write(&self, result: &BacktestResult, output_dir: &Path) -> Result<(), ReplayError> {
        fs::create_dir_all(output_dir)?;
        let trades = output_dir.join(TRADES_FILE);
        let equity = output_dir.join(EQUITY_FILE);
        Self::write_trades(result, &trades).map_err(std::io::Error::other)?;
        Self::write_equity(result, &equity).map_err(std::io::Error::other)?;
        info!(
            trades = %trades.display(),
            equity = %equity.display(),
            "wrote report"
        );
        Ok(())
    }
}
