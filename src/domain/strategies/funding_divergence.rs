//! Funding-rate divergence: fade crowded positioning against the trend.
//!
//! Long when funding is below the long threshold while price is above the
//! 200 EMA; short when funding is above the short threshold while price is
//! below it. Single ATR target, ATR stop, and a time stop after
//! `max_hold_days`.

use chrono::TimeDelta;

use super::{
    ATR_14, EMA_200, FUNDING_RATE, OI_CHANGE_PCT, RiskLimits, read_period, volatility_in_range,
};
use crate::domain::candle::Candle;
use crate::domain::error::ReplayError;
use crate::domain::position::{Position, Targets};
use crate::domain::signal::{Action, Signal};
use crate::domain::sizing::position_size;
use crate::domain::strategy::{ExitCheck, MarketView, Strategy};
use crate::ports::config_port::ConfigPort;

#[derive(Debug, Clone, PartialEq)]
pub struct FundingDivergenceParams {
    pub ema_period: usize,
    pub funding_long_threshold: f64,
    pub funding_short_threshold: f64,
    pub atr_sl_multiplier: f64,
    pub atr_tp_multiplier: f64,
    pub max_hold_days: i64,
    /// Open interest falling faster than this skips the setup.
    pub min_oi_change: f64,
    pub min_atr_ratio: f64,
    pub max_atr_ratio: f64,
}

impl Default for FundingDivergenceParams {
    fn default() -> Self {
        FundingDivergenceParams {
            ema_period: 200,
            funding_long_threshold: 0.000038,
            funding_short_threshold: 0.000100,
            atr_sl_multiplier: 3.0,
            atr_tp_multiplier: 4.0,
            max_hold_days: 7,
            min_oi_change: -0.05,
            min_atr_ratio: 0.8,
            max_atr_ratio: 1.5,
        }
    }
}

impl FundingDivergenceParams {
    pub const SECTION: &'static str = "funding_divergence";

    pub fn from_config(config: &dyn ConfigPort) -> Self {
        let d = Self::default();
        let s = Self::SECTION;
        FundingDivergenceParams {
            ema_period: read_period(config, s, "ema_period", d.ema_period),
            funding_long_threshold: config.get_double(s, "funding_long_threshold", d.funding_long_threshold),
            funding_short_threshold: config.get_double(s, "funding_short_threshold", d.funding_short_threshold),
            atr_sl_multiplier: config.get_double(s, "atr_sl_multiplier", d.atr_sl_multiplier),
            atr_tp_multiplier: config.get_double(s, "atr_tp_multiplier", d.atr_tp_multiplier),
            max_hold_days: config.get_int(s, "max_hold_days", d.max_hold_days),
            min_oi_change: config.get_double(s, "min_oi_change", d.min_oi_change),
            min_atr_ratio: config.get_double(s, "min_atr_ratio", d.min_atr_ratio),
            max_atr_ratio: config.get_double(s, "max_atr_ratio", d.max_atr_ratio),
        }
    }
}

pub struct FundingDivergence {
    params: FundingDivergenceParams,
    risk: RiskLimits,
}

impl FundingDivergence {
    pub const NAME: &'static str = "funding_divergence";

    pub fn new(params: FundingDivergenceParams, risk: RiskLimits) -> Self {
        FundingDivergence { params, risk }
    }
}

impl Strategy for FundingDivergence {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn evaluate(&self, view: &MarketView<'_>) -> Result<Option<Signal>, ReplayError> {
        let p = &self.params;
        if !self.risk.admits(view) || view.index() < p.ema_period {
            return Ok(None);
        }
        if !volatility_in_range(view.history, p.min_atr_ratio, p.max_atr_ratio) {
            return Ok(None);
        }

        let candle = view.current();
        let price = candle.close;
        let (Some(ema), Some(atr), Some(funding)) = (
            candle.indicator(EMA_200),
            candle.indicator(ATR_14),
            candle.indicator(FUNDING_RATE),
        ) else {
            return Ok(None);
        };
        if atr == 0.0 {
            return Ok(None);
        }
        let oi_change = candle.indicator(OI_CHANGE_PCT);
        let oi_collapsing = oi_change.is_some_and(|oi| oi < p.min_oi_change);

        let (action, sl_price, tp_price, reason) =
            if funding < p.funding_long_threshold && price > ema {
                (
                    Action::Long,
                    price - atr * p.atr_sl_multiplier,
                    price + atr * p.atr_tp_multiplier,
                    format!("Short squeeze setup: funding={:.4}%, price>{ema:.0}", funding * 100.0),
                )
            } else if funding > p.funding_short_threshold && price < ema {
                (
                    Action::Short,
                    price + atr * p.atr_sl_multiplier,
                    price - atr * p.atr_tp_multiplier,
                    format!("Long squeeze setup: funding={:.4}%, price<{ema:.0}", funding * 100.0),
                )
            } else {
                return Ok(None);
            };
        if oi_collapsing {
            return Ok(None);
        }

        let size = position_size(view.available_balance, price, sl_price, &self.risk.sizing)?;
        let mut signal = Signal {
            action,
            entry_price: price,
            leverage: self.risk.leverage,
            size,
            sl_price,
            targets: Targets::Single { tp_price },
            reason,
            timestamp: candle.timestamp,
            metadata: Default::default(),
        }
        .with_metadata("atr", atr)
        .with_metadata("funding_rate", funding)
        .with_metadata("ema200", ema);
        if let Some(oi) = oi_change {
            signal = signal.with_metadata("oi_change_pct", oi);
        }
        Ok(Some(signal))
    }

    fn exit_check(&self) -> Option<&dyn ExitCheck> {
        Some(self)
    }
}

impl ExitCheck for FundingDivergence {
    fn check_exit(&self, position: &Position, history: &[Candle]) -> Option<String> {
        let now = history.last()?.timestamp;
        if position.held_for(now) >= TimeDelta::days(self.params.max_hold_days) {
            Some(format!("Time stop ({} days)", self.params.max_hold_days))
        } else {
            None
        }
    }
}
