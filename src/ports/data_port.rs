//! Candle data port trait.

use crate::domain::candle::CandleSeries;
use crate::domain::error::ReplayError;

/// Supplies the full candle series for one symbol, in source order.
/// Implementations do not sort or repair; the engine rejects bad ordering.
pub trait DataPort {
    fn fetch_candles(&self, symbol: &str) -> Result<CandleSeries, ReplayError>;
}
