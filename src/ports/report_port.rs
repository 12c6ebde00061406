//! Result writer port trait.

use crate::domain::engine::BacktestResult;
use crate::domain::error::ReplayError;
use std::path::Path;

/// Port for persisting a finished run's trade ledger and equity curve.
pub trait ReportPort {
    fn write(&self, result: &BacktestResult, output_dir: &Path) -> Result<(), ReplayError>;
}
