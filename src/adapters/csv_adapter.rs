//! CSV candle file adapter.
//!
//! Expected header: `timestamp,open,high,low,close,volume` followed by any
//! number of indicator columns. Rows are returned in file order.

use crate::domain::candle::{Candle, CandleSeries};
use crate::domain::error::ReplayError;
use crate::ports::data_port::DataPort;
use chrono::{DateTime, NaiveDateTime};
use std::fs;
use std::io::Read;
use std::path::PathBuf;
use tracing::debug;

const REQUIRED_COLUMNS: [&str; 6] = ["timestamp", "open", "high", "low", "close", "volume"];
const TIMESTAMP_FORMATS: [&str; 2] = ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S"];

pub struct CsvAdapter {
    path: PathBuf,
}

impl CsvAdapter {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    pub fn parse<R: Read>(symbol: &str, reader: R) -> Result<CandleSeries, ReplayError> {
        let mut rdr = csv::Reader::from_reader(reader);
        let headers: Vec<String> = rdr
            .headers()
            .map_err(|e| ReplayError::Data {
                reason: format!("CSV header error: {}", e),
            })?
            .iter()
            .map(|h| h.trim().to_lowercase())
            .collect();

        let mut required = [0usize; 6];
        for (slot, name) in required.iter_mut().zip(REQUIRED_COLUMNS) {
            *slot = headers
                .iter()
                .position(|h| h == name)
                .ok_or_else(|| ReplayError::Data {
                    reason: format!("missing {} column", name),
                })?;
        }
        let indicator_columns: Vec<(usize, &str)> = headers
            .iter()
            .enumerate()
            .filter(|(_, h)| !REQUIRED_COLUMNS.contains(&h.as_str()))
            .map(|(i, h)| (i, h.as_str()))
            .collect();

        let mut candles = Vec::new();
        for (row, result) in rdr.records().enumerate() {
            let record = result.map_err(|e| ReplayError::Data {
                reason: format!("CSV parse error: {}", e),
            })?;
            let line = row + 2;
            let field = |column: usize| record.get(column).unwrap_or("").trim();
            let number = |column: usize| -> Result<f64, ReplayError> {
                field(column).parse().map_err(|e| ReplayError::Data {
                    reason: format!(
                        "invalid {} value on line {}: {}",
                        headers[column], line, e
                    ),
                })
            };

            let timestamp = parse_timestamp(field(required[0])).ok_or_else(|| {
                ReplayError::Data {
                    reason: format!(
                        "invalid timestamp '{}' on line {}",
                        field(required[0]),
                        line
                    ),
                }
            })?;
            let mut candle = Candle::new(
                timestamp,
                number(required[1])?,
                number(required[2])?,
                number(required[3])?,
                number(required[4])?,
                number(required[5])?,
            );
            for &(column, name) in &indicator_columns {
                if field(column).is_empty() {
                    continue;
                }
                candle = candle.with_indicator(name, number(column)?);
            }
            candles.push(candle);
        }

        debug!(symbol, candles = candles.len(), "loaded candles");
        Ok(CandleSeries::new(symbol, candles))
    }
}

/// Accepts `YYYY-MM-DD HH:MM:SS`, `YYYY-MM-DDTHH:MM:SS` or epoch milliseconds.
pub fn parse_timestamp(value: &str) -> Option<NaiveDateTime> {
    if let Ok(millis) = value.parse::<i64>() {
        return DateTime::from_timestamp_millis(millis).map(|dt| dt.naive_utc());
    }
    TIMESTAMP_FORMATS
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(value, format).ok())
}

impl DataPort for CsvAdapter {
    fn fetch_candles(&self, symbol: &str) -> Result<CandleSeries, ReplayError> {
        let file = fs::File::open(&self.path).map_err(|e| ReplayError::Data {
            reason: format!("failed to read {}: {}", self.path.display(), e),
        })?;
        Self::parse(symbol, file)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use tempfile::TempDir;

    fn ts(h: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 1, 1)
            .unwrap()
            .and_hms_opt(h, 0, 0)
            .unwrap()
    }

    #[test]
    fn fetch_candles_reads_ohlcv_and_indicators() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("BTCUSDT_4h.csv");
        fs::write(
            &path,
            "timestamp,open,high,low,close,volume,atr_14,funding_rate\n\
             2024-01-01 00:00:00,100.0,110.0,90.0,105.0,500.5,,0.0001\n\
             2024-01-01T04:00:00,105.0,115.0,100.0,110.0,600,2.5,NaN\n",
        )
        .unwrap();

        let series = CsvAdapter::new(path).fetch_candles("BTC/USDT").unwrap();
        assert_eq!(series.symbol, "BTC/USDT");
        assert_eq!(series.len(), 2);
        let first = &series.candles[0];
        assert_eq!(first.timestamp, ts(0));
        assert_eq!(first.open, 100.0);
        assert_eq!(first.high, 110.0);
        assert_eq!(first.low, 90.0);
        assert_eq!(first.close, 105.0);
        assert_eq!(first.volume, 500.5);
        assert_eq!(first.indicator("atr_14"), None);
        assert_eq!(first.indicator("funding_rate"), Some(0.0001));

        let second = &series.candles[1];
        assert_eq!(second.timestamp, ts(4));
        assert_eq!(second.indicator("atr_14"), Some(2.5));
        assert_eq!(second.indicator("funding_rate"), None);
    }

    #[test]
    fn epoch_millis_timestamps() {
        assert_eq!(parse_timestamp("1704067200000"), Some(ts(0)));
        assert_eq!(parse_timestamp("2024-01-01 04:00:00"), Some(ts(4)));
        assert_eq!(parse_timestamp("01/01/2024"), None);
    }

    #[test]
    fn rows_keep_file_order() {
        let csv = "timestamp,open,high,low,close,volume\n\
                   2024-01-01 04:00:00,1,1,1,1,1\n\
                   2024-01-01 00:00:00,1,1,1,1,1\n";
        let series = CsvAdapter::parse("X", csv.as_bytes()).unwrap();
        assert_eq!(series.candles[0].timestamp, ts(4));
        assert!(series.validate().is_err());
    }

    #[test]
    fn missing_column_is_a_data_error() {
        let csv = "timestamp,open,high,low,close\n2024-01-01 00:00:00,1,1,1,1\n";
        let err = CsvAdapter::parse("X", csv.as_bytes()).unwrap_err();
        assert!(matches!(err, ReplayError::Data { ref reason } if reason.contains("volume")));
    }

    #[test]
    fn bad_price_reports_line() {
        let csv = "timestamp,open,high,low,close,volume\n2024-01-01 00:00:00,1,abc,1,1,1\n";
        let err = CsvAdapter::parse("X", csv.as_bytes()).unwrap_err();
        assert!(matches!(err, ReplayError::Data { ref reason } if reason.contains("high") && reason.contains("line 2")));
    }

    #[test]
    fn bad_timestamp_is_a_data_error() {
        let csv = "timestamp,open,high,low,close,volume\nyesterday,1,1,1,1,1\n";
        assert!(CsvAdapter::parse("X", csv.as_bytes()).is_err());
    }

    #[test]
    fn missing_file_is_a_data_error() {
        let adapter = CsvAdapter::new(PathBuf::from("/nonexistent/candles.csv"));
        assert!(matches!(
            adapter.fetch_candles("X"),
            Err(ReplayError::Data { .. })
        ));
    }

    #[test]
    fn header_only_file_yields_empty_series() {
        let series =
            CsvAdapter::parse("X", "timestamp,open,high,low,close,volume\n".as_bytes()).unwrap();
        assert!(series.is_empty());
    }
}
