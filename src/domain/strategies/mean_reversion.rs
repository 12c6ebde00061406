//! Mean reversion at the Bollinger bands.
//!
//! Long at the lower band near support with RSI oversold (but not extreme),
//! price above the 200 EMA and a volume spike; short is the mirror image.
//! TP1 is the middle band, TP2 an ATR multiple. Positions that have not
//! reverted within `max_hold_hours` are closed.

use chrono::TimeDelta;

use super::{
    ATR_14, BB_LOWER, BB_MIDDLE, BB_UPPER, EMA_200, RSI_14, RiskLimits, read_period,
    volatility_in_range,
};
use crate::domain::candle::Candle;
use crate::domain::error::ReplayError;
use crate::domain::position::{Position, Targets};
use crate::domain::signal::{Action, Signal};
use crate::domain::sizing::position_size;
use crate::domain::strategy::{ExitCheck, MarketView, Strategy};
use crate::ports::config_port::ConfigPort;

/// Band proximity: within 0.5% of the band counts as touching it.
const BAND_TOLERANCE: f64 = 0.005;
/// Swing stops sit 0.5% beyond the recent extreme.
const SWING_BUFFER: f64 = 0.005;

#[derive(Debug, Clone, PartialEq)]
pub struct MeanReversionParams {
    pub bb_period: usize,
    pub ema_period: usize,
    pub rsi_oversold: f64,
    pub rsi_overbought: f64,
    pub rsi_extreme_low: f64,
    pub rsi_extreme_high: f64,
    pub sr_lookback: usize,
    pub sr_tolerance: f64,
    pub volume_ma_period: usize,
    pub volume_spike_multiplier: f64,
    pub sl_atr_multiplier: f64,
    pub tp2_atr_multiplier: f64,
    pub max_hold_hours: i64,
    pub min_atr_ratio: f64,
    pub max_atr_ratio: f64,
}

impl Default for MeanReversionParams {
    fn default() -> Self {
        MeanReversionParams {
            bb_period: 20,
            ema_period: 200,
            rsi_oversold: 45.0,
            rsi_overbought: 55.0,
            rsi_extreme_low: 25.0,
            rsi_extreme_high: 75.0,
            sr_lookback: 20,
            sr_tolerance: 0.01,
            volume_ma_period: 20,
            volume_spike_multiplier: 1.2,
            sl_atr_multiplier: 2.5,
            tp2_atr_multiplier: 3.0,
            max_hold_hours: 48,
            min_atr_ratio: 0.8,
            max_atr_ratio: 1.5,
        }
    }
}

impl MeanReversionParams {
    pub const SECTION: &'static str = "mean_reversion";

    pub fn from_config(config: &dyn ConfigPort) -> Self {
        let d = Self::default();
        let s = Self::SECTION;
        MeanReversionParams {
            bb_period: read_period(config, s, "bb_period", d.bb_period),
            ema_period: read_period(config, s, "ema_period", d.ema_period),
            rsi_oversold: config.get_double(s, "rsi_oversold", d.rsi_oversold),
            rsi_overbought: config.get_double(s, "rsi_overbought", d.rsi_overbought),
            rsi_extreme_low: config.get_double(s, "rsi_extreme_low", d.rsi_extreme_low),
            rsi_extreme_high: config.get_double(s, "rsi_extreme_high", d.rsi_extreme_high),
            sr_lookback: read_period(config, s, "sr_lookback", d.sr_lookback),
            sr_tolerance: config.get_double(s, "sr_tolerance", d.sr_tolerance),
            volume_ma_period: read_period(config, s, "volume_ma_period", d.volume_ma_period),
            volume_spike_multiplier: config.get_double(s, "volume_spike_multiplier", d.volume_spike_multiplier),
            sl_atr_multiplier: config.get_double(s, "sl_atr_multiplier", d.sl_atr_multiplier),
            tp2_atr_multiplier: config.get_double(s, "tp2_atr_multiplier", d.tp2_atr_multiplier),
            max_hold_hours: config.get_int(s, "max_hold_hours", d.max_hold_hours),
            min_atr_ratio: config.get_double(s, "min_atr_ratio", d.min_atr_ratio),
            max_atr_ratio: config.get_double(s, "max_atr_ratio", d.max_atr_ratio),
        }
    }

    fn warm_up(&self) -> usize {
        self.ema_period.max(self.bb_period).max(self.sr_lookback)
    }
}

pub struct MeanReversion {
    params: MeanReversionParams,
    risk: RiskLimits,
}

impl MeanReversion {
    pub const NAME: &'static str = "mean_reversion";

    pub fn new(params: MeanReversionParams, risk: RiskLimits) -> Self {
        MeanReversion { params, risk }
    }
}

impl Strategy for MeanReversion {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn evaluate(&self, view: &MarketView<'_>) -> Result<Option<Signal>, ReplayError> {
        let p = &self.params;
        if !self.risk.admits(view) || view.index() < p.warm_up() {
            return Ok(None);
        }
        if !volatility_in_range(view.history, p.min_atr_ratio, p.max_atr_ratio) {
            return Ok(None);
        }

        let candle = view.current();
        let price = candle.close;
        let (Some(rsi), Some(atr), Some(upper), Some(lower), Some(middle), Some(ema)) = (
            candle.indicator(RSI_14),
            candle.indicator(ATR_14),
            candle.indicator(BB_UPPER),
            candle.indicator(BB_LOWER),
            candle.indicator(BB_MIDDLE),
            candle.indicator(EMA_200),
        ) else {
            return Ok(None);
        };
        if atr == 0.0 {
            return Ok(None);
        }

        let volumes = view.window(p.volume_ma_period);
        let volume_ma = volumes.iter().map(|c| c.volume).sum::<f64>() / volumes.len() as f64;
        let volume_ratio = if volume_ma > 0.0 {
            candle.volume / volume_ma
        } else {
            1.0
        };
        let volume_spike = volume_ratio > p.volume_spike_multiplier;

        let recent = view.window(p.sr_lookback);
        let recent_low = recent.iter().map(|c| c.low).fold(f64::INFINITY, f64::min);
        let recent_high = recent.iter().map(|c| c.high).fold(f64::NEG_INFINITY, f64::max);

        let long_setup = price <= lower * (1.0 + BAND_TOLERANCE)
            && p.rsi_extreme_low < rsi
            && rsi < p.rsi_oversold
            && price > ema
            && price <= recent_low * (1.0 + p.sr_tolerance)
            && volume_spike;
        let short_setup = price >= upper * (1.0 - BAND_TOLERANCE)
            && p.rsi_overbought < rsi
            && rsi < p.rsi_extreme_high
            && price < ema
            && price >= recent_high * (1.0 - p.sr_tolerance)
            && volume_spike;

        let (action, sl_price, tp2_price, reason) = if long_setup {
            (
                Action::Long,
                (price - atr * p.sl_atr_multiplier).max(recent_low * (1.0 - SWING_BUFFER)),
                price + atr * p.tp2_atr_multiplier,
                format!("Mean Rev LONG: RSI={rsi:.1}, Lower BB, Vol={volume_ratio:.1}x"),
            )
        } else if short_setup {
            (
                Action::Short,
                (price + atr * p.sl_atr_multiplier).min(recent_high * (1.0 + SWING_BUFFER)),
                price - atr * p.tp2_atr_multiplier,
                format!("Mean Rev SHORT: RSI={rsi:.1}, Upper BB, Vol={volume_ratio:.1}x"),
            )
        } else {
            return Ok(None);
        };

        let size = position_size(view.available_balance, price, sl_price, &self.risk.sizing)?;
        let signal = Signal {
            action,
            entry_price: price,
            leverage: self.risk.leverage,
            size,
            sl_price,
            targets: Targets::Dual {
                tp1_price: middle,
                tp2_price,
            },
            reason,
            timestamp: candle.timestamp,
            metadata: Default::default(),
        }
        .with_metadata("rsi", rsi)
        .with_metadata("atr", atr)
        .with_metadata("bb_middle", middle)
        .with_metadata("volume_ratio", volume_ratio);
        Ok(Some(signal))
    }

    fn exit_check(&self) -> Option<&dyn ExitCheck> {
        Some(self)
    }
}

impl ExitCheck for MeanReversion {
    fn check_exit(&self, position: &Position, history: &[Candle]) -> Option<String> {
        let now = history.last()?.timestamp;
        if position.held_for(now) >= TimeDelta::hours(self.params.max_hold_hours) {
            Some(format!(
                "Time stop ({}h - no reversion)",
                self.params.max_hold_hours
            ))
        } else {
            None
        }
    }
}
