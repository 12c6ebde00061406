//! Concrete strategies and the factory that builds one from configuration.
//!
//! Every strategy reads precomputed indicator columns from the candles it is
//! shown. A missing or NaN value at the current step means "no signal".

pub mod funding_divergence;
pub mod mean_reversion;
pub mod squeeze_breakout;

pub use funding_divergence::{FundingDivergence, FundingDivergenceParams};
pub use mean_reversion::{MeanReversion, MeanReversionParams};
pub use squeeze_breakout::{SqueezeBreakout, SqueezeBreakoutParams};

use super::candle::Candle;
use super::config::EngineConfig;
use super::error::ReplayError;
use super::sizing::SizingRules;
use super::strategy::{MarketView, Strategy};
use crate::ports::config_port::ConfigPort;

pub const STRATEGY_NAMES: [&str; 3] = [
    FundingDivergence::NAME,
    SqueezeBreakout::NAME,
    MeanReversion::NAME,
];

pub const EMA_200: &str = "ema_200";
pub const ATR_14: &str = "atr_14";
pub const RSI_14: &str = "rsi_14";
pub const ADX_14: &str = "adx_14";
pub const BB_UPPER: &str = "bb_upper";
pub const BB_MIDDLE: &str = "bb_middle";
pub const BB_LOWER: &str = "bb_lower";
pub const BB_WIDTH: &str = "bb_width";
pub const VOLUME_MA_20: &str = "volume_ma_20";
pub const FUNDING_RATE: &str = "funding_rate";
pub const OI_CHANGE_PCT: &str = "oi_change_pct";

/// Number of candles the ATR volatility filter averages over.
const ATR_AVERAGE_WINDOW: usize = 20;

/// Builds the strategy named in `[strategy] name`, reading its parameters from
/// the section of the same name.
pub fn build_strategy(
    name: &str,
    config: &dyn ConfigPort,
    engine: &EngineConfig,
    symbol: &str,
) -> Result<Box<dyn Strategy>, ReplayError> {
    let risk = RiskLimits::new(engine, symbol);
    match name {
        FundingDivergence::NAME => Ok(Box::new(FundingDivergence::new(
            FundingDivergenceParams::from_config(config),
            risk,
        ))),
        SqueezeBreakout::NAME => Ok(Box::new(SqueezeBreakout::new(
            SqueezeBreakoutParams::from_config(config),
            risk,
        ))),
        MeanReversion::NAME => Ok(Box::new(MeanReversion::new(
            MeanReversionParams::from_config(config),
            risk,
        ))),
        other => Err(ReplayError::ConfigInvalid {
            section: "strategy".to_string(),
            key: "name".to_string(),
            reason: format!(
                "unknown strategy '{other}', expected one of: {}",
                STRATEGY_NAMES.join(", ")
            ),
        }),
    }
}

/// Engine-wide limits every strategy applies before emitting a signal.
#[derive(Debug, Clone, PartialEq)]
pub struct RiskLimits {
    pub leverage: u32,
    pub max_open_positions: usize,
    pub sizing: SizingRules,
}

impl RiskLimits {
    /// Leverage is the configured cap for `symbol`, or 1x when uncapped.
    pub fn new(engine: &EngineConfig, symbol: &str) -> Self {
        RiskLimits {
            leverage: engine.leverage_cap(symbol).unwrap_or(1),
            max_open_positions: engine.max_open_positions,
            sizing: SizingRules::from_config(engine),
        }
    }

    /// Room for another position, and none already open on this symbol.
    pub fn admits(&self, view: &MarketView<'_>) -> bool {
        view.open_positions.len() < self.max_open_positions && !view.has_position_in(view.symbol)
    }
}

/// Current ATR within `[min_ratio, max_ratio]` of its recent average.
/// Needs a full averaging window of history before it passes.
pub(crate) fn volatility_in_range(history: &[Candle], min_ratio: f64, max_ratio: f64) -> bool {
    if history.len() <= ATR_AVERAGE_WINDOW {
        return false;
    }
    let Some(current) = history.last().and_then(|c| c.indicator(ATR_14)) else {
        return false;
    };
    if current == 0.0 {
        return false;
    }
    let values: Vec<f64> = history[history.len() - ATR_AVERAGE_WINDOW..]
        .iter()
        .filter_map(|c| c.indicator(ATR_14))
        .collect();
    let average = values.iter().sum::<f64>() / values.len() as f64;
    if !(average > 0.0) {
        return false;
    }
    let ratio = current / average;
    (min_ratio..=max_ratio).contains(&ratio)
}

pub(crate) fn read_period(config: &dyn ConfigPort, section: &str, key: &str, default: usize) -> usize {
    let value = config.get_int(section, key, default as i64);
    usize::try_from(value).unwrap_or(default)
}
