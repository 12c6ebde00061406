//! Candle records and the ordered series the engine replays.

use chrono::NaiveDateTime;
use std::collections::HashMap;

use super::error::ReplayError;

/// One OHLCV sample, enriched with named indicator values by the upstream
/// data collaborator.
#[derive(Debug, Clone, PartialEq)]
pub struct Candle {
    pub timestamp: NaiveDateTime,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
    pub indicators: HashMap<String, f64>,
}

impl Candle {
    pub fn new(
        timestamp: NaiveDateTime,
        open: f64,
        high: f64,
        low: f64,
        close: f64,
        volume: f64,
    ) -> Self {
        Candle {
            timestamp,
            open,
            high,
            low,
            close,
            volume,
            indicators: HashMap::new(),
        }
    }

    pub fn with_indicator(mut self, name: &str, value: f64) -> Self {
        self.indicators.insert(name.to_string(), value);
        self
    }

    /// Named indicator value. Absent and NaN values (warm-up) are `None`.
    pub fn indicator(&self, name: &str) -> Option<f64> {
        self.indicators
            .get(name)
            .copied()
            .filter(|v| v.is_finite())
    }
}

/// A fully materialized, time-ordered candle sequence for one symbol.
#[derive(Debug, Clone, PartialEq)]
pub struct CandleSeries {
    pub symbol: String,
    pub candles: Vec<Candle>,
}

impl CandleSeries {
    pub fn new(symbol: impl Into<String>, candles: Vec<Candle>) -> Self {
        CandleSeries {
            symbol: symbol.into(),
            candles,
        }
    }

    pub fn len(&self) -> usize {
        self.candles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.candles.is_empty()
    }

    /// Candles visible at `index`, inclusive. Strategies only ever see this slice.
    pub fn history(&self, index: usize) -> &[Candle] {
        &self.candles[..=index]
    }

    pub fn first_timestamp(&self) -> Option<NaiveDateTime> {
        self.candles.first().map(|c| c.timestamp)
    }

    pub fn last_timestamp(&self) -> Option<NaiveDateTime> {
        self.candles.last().map(|c| c.timestamp)
    }

    /// Run precondition: non-empty and strictly increasing by timestamp.
    pub fn validate(&self) -> Result<(), ReplayError> {
        if self.candles.is_empty() {
            return Err(ReplayError::EmptySeries {
                symbol: self.symbol.clone(),
            });
        }
        for (index, pair) in self.candles.windows(2).enumerate() {
            if pair[1].timestamp <= pair[0].timestamp {
                return Err(ReplayError::DataOrdering {
                    index: index + 1,
                    previous: pair[0].timestamp,
                    current: pair[1].timestamp,
                });
            }
        }
        Ok(())
    }
}
