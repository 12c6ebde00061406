#![allow(dead_code)]

use chrono::{NaiveDate, NaiveDateTime, TimeDelta};
use replaytrader::domain::candle::{Candle, CandleSeries};
use replaytrader::domain::config::EngineConfig;
use replaytrader::domain::error::ReplayError;
use replaytrader::domain::position::{Position, Targets};
use replaytrader::domain::signal::{Action, Signal};
use replaytrader::domain::strategy::{ExitCheck, MarketView, Strategy};
use replaytrader::ports::data_port::DataPort;
use std::collections::{BTreeMap, HashMap};

pub const SYMBOL: &str = "ETH/USDT";

pub fn ts(i: usize) -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2024, 1, 1)
        .unwrap()
        .and_hms_opt(0, 0, 0)
        .unwrap()
        + TimeDelta::hours(4 * i as i64)
}

pub fn make_candle(i: usize, open: f64, high: f64, low: f64, close: f64) -> Candle {
    Candle::new(ts(i), open, high, low, close, 1000.0)
}

/// Candle spanning `low..high` that opens and closes at `close`.
pub fn bar(i: usize, high: f64, low: f64, close: f64) -> Candle {
    make_candle(i, close, high, low, close)
}

pub fn flat_series(n: usize, price: f64) -> CandleSeries {
    let candles = (0..n)
        .map(|i| bar(i, price + 0.5, price - 0.5, price))
        .collect();
    CandleSeries::new(SYMBOL, candles)
}

pub fn series(candles: Vec<Candle>) -> CandleSeries {
    CandleSeries::new(SYMBOL, candles)
}

/// No fees, no slippage, uncapped leverage for the test symbol.
pub fn frictionless(capital: f64) -> EngineConfig {
    EngineConfig {
        initial_capital: capital,
        maker_fee: 0.0,
        taker_fee: 0.0,
        slippage_pct: 0.0,
        ..Default::default()
    }
}

pub fn long_signal(entry: f64, size: f64, leverage: u32, sl: f64, targets: Targets) -> Signal {
    Signal {
        action: Action::Long,
        entry_price: entry,
        leverage,
        size,
        sl_price: sl,
        targets,
        reason: "scripted".into(),
        timestamp: ts(0),
        metadata: BTreeMap::new(),
    }
}

pub fn short_signal(entry: f64, size: f64, leverage: u32, sl: f64, targets: Targets) -> Signal {
    Signal {
        action: Action::Short,
        ..long_signal(entry, size, leverage, sl, targets)
    }
}

/// Emits pre-scripted signals at fixed candle indices and, optionally,
/// forces an exit once a position has been open for `exit_after` candles.
pub struct ScriptedStrategy {
    pub name: String,
    pub signals: HashMap<usize, Signal>,
    pub exit_after: Option<TimeDelta>,
    pub fail_at: Option<usize>,
}

impl ScriptedStrategy {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            signals: HashMap::new(),
            exit_after: None,
            fail_at: None,
        }
    }

    pub fn signal_at(mut self, index: usize, signal: Signal) -> Self {
        self.signals.insert(index, signal);
        self
    }

    pub fn with_time_stop(mut self, candles: i64) -> Self {
        self.exit_after = Some(TimeDelta::hours(4 * candles));
        self
    }

    pub fn fail_at(mut self, index: usize) -> Self {
        self.fail_at = Some(index);
        self
    }
}

impl Strategy for ScriptedStrategy {
    fn name(&self) -> &str {
        &self.name
    }

    fn evaluate(&self, view: &MarketView<'_>) -> Result<Option<Signal>, ReplayError> {
        if self.fail_at == Some(view.index()) {
            return Err(ReplayError::invalid_configuration("scripted failure"));
        }
        Ok(self.signals.get(&view.index()).map(|s| Signal {
            timestamp: view.current().timestamp,
            ..s.clone()
        }))
    }

    fn exit_check(&self) -> Option<&dyn ExitCheck> {
        self.exit_after.map(|_| self as &dyn ExitCheck)
    }
}

impl ExitCheck for ScriptedStrategy {
    fn check_exit(&self, position: &Position, history: &[Candle]) -> Option<String> {
        let limit = self.exit_after?;
        let now = history.last()?.timestamp;
        (position.held_for(now) >= limit).then(|| "Time stop".to_string())
    }
}

pub struct MockDataPort {
    pub data: HashMap<String, Vec<Candle>>,
}

impl MockDataPort {
    pub fn new() -> Self {
        Self {
            data: HashMap::new(),
        }
    }

    pub fn with_candles(mut self, symbol: &str, candles: Vec<Candle>) -> Self {
        self.data.insert(symbol.to_string(), candles);
        self
    }
}

impl DataPort for MockDataPort {
    fn fetch_candles(&self, symbol: &str) -> Result<CandleSeries, ReplayError> {
        self.data
            .get(symbol)
            .cloned()
            .map(|candles| CandleSeries::new(symbol, candles))
            .ok_or_else(|| ReplayError::Data {
                reason: format!("no candles for {symbol}"),
            })
    }
}
