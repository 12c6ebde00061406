//! Bollinger squeeze breakout with two targets.
//!
//! Waits for the band width to stay compressed for `squeeze_min_candles`,
//! then enters on a close beyond the band confirmed by volume, RSI and ADX.
//! Half the position is taken at TP1; the engine then moves the stop to
//! breakeven. No forced exits.

use super::{
    ADX_14, ATR_14, BB_LOWER, BB_MIDDLE, BB_UPPER, BB_WIDTH, RSI_14, RiskLimits, VOLUME_MA_20,
    read_period,
};
use crate::domain::error::ReplayError;
use crate::domain::position::Targets;
use crate::domain::signal::{Action, Signal};
use crate::domain::sizing::position_size;
use crate::domain::strategy::{MarketView, Strategy};
use crate::ports::config_port::ConfigPort;

const RSI_MIDLINE: f64 = 50.0;

#[derive(Debug, Clone, PartialEq)]
pub struct SqueezeBreakoutParams {
    pub bb_period: usize,
    pub squeeze_threshold: f64,
    pub squeeze_min_candles: usize,
    pub volume_multiplier: f64,
    pub atr_sl_multiplier: f64,
    pub atr_tp1_multiplier: f64,
    pub atr_tp2_multiplier: f64,
    pub adx_threshold: f64,
}

impl Default for SqueezeBreakoutParams {
    fn default() -> Self {
        SqueezeBreakoutParams {
            bb_period: 20,
            squeeze_threshold: 0.03,
            squeeze_min_candles: 12,
            volume_multiplier: 1.5,
            atr_sl_multiplier: 2.0,
            atr_tp1_multiplier: 2.0,
            atr_tp2_multiplier: 4.0,
            adx_threshold: 20.0,
        }
    }
}

impl SqueezeBreakoutParams {
    pub const SECTION: &'static str = "squeeze_breakout";

    pub fn from_config(config: &dyn ConfigPort) -> Self {
        let d = Self::default();
        let s = Self::SECTION;
        SqueezeBreakoutParams {
            bb_period: read_period(config, s, "bb_period", d.bb_period),
            squeeze_threshold: config.get_double(s, "squeeze_threshold", d.squeeze_threshold),
            squeeze_min_candles: read_period(config, s, "squeeze_min_candles", d.squeeze_min_candles),
            volume_multiplier: config.get_double(s, "volume_multiplier", d.volume_multiplier),
            atr_sl_multiplier: config.get_double(s, "atr_sl_multiplier", d.atr_sl_multiplier),
            atr_tp1_multiplier: config.get_double(s, "atr_tp1_multiplier", d.atr_tp1_multiplier),
            atr_tp2_multiplier: config.get_double(s, "atr_tp2_multiplier", d.atr_tp2_multiplier),
            adx_threshold: config.get_double(s, "adx_threshold", d.adx_threshold),
        }
    }
}

pub struct SqueezeBreakout {
    params: SqueezeBreakoutParams,
    risk: RiskLimits,
}

impl SqueezeBreakout {
    pub const NAME: &'static str = "squeeze_breakout";

    pub fn new(params: SqueezeBreakoutParams, risk: RiskLimits) -> Self {
        SqueezeBreakout { params, risk }
    }

    /// Band width below the threshold on the current candle and the
    /// `squeeze_min_candles` before it.
    fn in_squeeze(&self, view: &MarketView<'_>) -> bool {
        view.window(self.params.squeeze_min_candles + 1)
            .iter()
            .all(|c| c.indicator(BB_WIDTH).is_some_and(|w| w < self.params.squeeze_threshold))
    }
}

impl Strategy for SqueezeBreakout {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn evaluate(&self, view: &MarketView<'_>) -> Result<Option<Signal>, ReplayError> {
        let p = &self.params;
        if !self.risk.admits(view) || view.index() < p.bb_period + p.squeeze_min_candles {
            return Ok(None);
        }

        let candle = view.current();
        let price = candle.close;
        let (Some(upper), Some(lower), Some(middle), Some(width), Some(rsi), Some(atr), Some(avg_volume), Some(adx)) = (
            candle.indicator(BB_UPPER),
            candle.indicator(BB_LOWER),
            candle.indicator(BB_MIDDLE),
            candle.indicator(BB_WIDTH),
            candle.indicator(RSI_14),
            candle.indicator(ATR_14),
            candle.indicator(VOLUME_MA_20),
            candle.indicator(ADX_14),
        ) else {
            return Ok(None);
        };
        if adx < p.adx_threshold || atr == 0.0 || avg_volume == 0.0 {
            return Ok(None);
        }
        if !self.in_squeeze(view) {
            return Ok(None);
        }
        let volume_ratio = candle.volume / avg_volume;
        if volume_ratio <= p.volume_multiplier {
            return Ok(None);
        }

        let held_above = view.previous().is_some_and(|prev| {
            prev.indicator(BB_UPPER).is_some_and(|prev_upper| prev.close > prev_upper)
        });

        let (action, sl_price, tp1_price, tp2_price, direction) =
            if price > upper && held_above && rsi > RSI_MIDLINE {
                (
                    Action::Long,
                    (price - atr * p.atr_sl_multiplier).max(middle),
                    price + atr * p.atr_tp1_multiplier,
                    price + atr * p.atr_tp2_multiplier,
                    "UP",
                )
            } else if price < lower && rsi < RSI_MIDLINE {
                (
                    Action::Short,
                    (price + atr * p.atr_sl_multiplier).min(middle),
                    price - atr * p.atr_tp1_multiplier,
                    price - atr * p.atr_tp2_multiplier,
                    "DOWN",
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
                tp1_price,
                tp2_price,
            },
            reason: format!("Squeeze breakout {direction}: RSI={rsi:.1}, Vol={volume_ratio:.1}x"),
            timestamp: candle.timestamp,
            metadata: Default::default(),
        }
        .with_metadata("atr", atr)
        .with_metadata("rsi", rsi)
        .with_metadata("bb_width", width)
        .with_metadata("volume_ratio", volume_ratio);
        Ok(Some(signal))
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::ts;
    use super::*;
    use crate::domain::candle::Candle;
    use crate::domain::config::EngineConfig;

    fn strategy() -> SqueezeBreakout {
        SqueezeBreakout::new(
            SqueezeBreakoutParams::default(),
            RiskLimits::new(&EngineConfig::default(), "SOL/USDT"),
        )
    }

    fn quiet(i: usize) -> Candle {
        Candle::new(ts(i as i64), 100.0, 100.5, 99.5, 100.0, 1000.0)
            .with_indicator(BB_UPPER, 101.0)
            .with_indicator(BB_MIDDLE, 100.0)
            .with_indicator(BB_LOWER, 99.0)
            .with_indicator(BB_WIDTH, 0.02)
            .with_indicator(RSI_14, 50.0)
            .with_indicator(ATR_14, 1.0)
            .with_indicator(VOLUME_MA_20, 1000.0)
            .with_indicator(ADX_14, 25.0)
    }

    /// 40 compressed candles; the last two close at `close` with `rsi`.
    fn breakout(close: f64, rsi: f64) -> Vec<Candle> {
        let mut candles: Vec<Candle> = (0..40).map(quiet).collect();
        for i in [38, 39] {
            let c = &mut candles[i];
            c.close = close;
            c.high = close.max(c.high);
            c.low = close.min(c.low);
            c.volume = 2000.0;
            c.indicators.insert(RSI_14.to_string(), rsi);
        }
        candles
    }

    fn view(history: &[Candle]) -> MarketView<'_> {
        MarketView {
            symbol: "SOL/USDT",
            history,
            available_balance: 50.0,
            open_positions: &[],
        }
    }

    #[test]
    fn upside_breakout_goes_long_with_two_targets() {
        let candles = breakout(102.0, 60.0);
        let signal = strategy().evaluate(&view(&candles)).unwrap().unwrap();
        assert_eq!(signal.action, Action::Long);
        assert_eq!(signal.leverage, 5);
        // max(102 - 2, middle 100)
        assert!((signal.sl_price - 100.0).abs() < 1e-9);
        assert_eq!(
            signal.targets,
            Targets::Dual {
                tp1_price: 104.0,
                tp2_price: 106.0
            }
        );
        assert!(signal.reason.starts_with("Squeeze breakout UP"));
    }

    #[test]
    fn downside_breakout_goes_short() {
        let candles = breakout(98.0, 40.0);
        let signal = strategy().evaluate(&view(&candles)).unwrap().unwrap();
        assert_eq!(signal.action, Action::Short);
        assert!((signal.sl_price - 100.0).abs() < 1e-9);
        assert_eq!(
            signal.targets,
            Targets::Dual {
                tp1_price: 96.0,
                tp2_price: 94.0
            }
        );
    }

    #[test]
    fn single_close_above_band_is_not_enough_for_longs() {
        let mut candles = breakout(102.0, 60.0);
        candles[38].close = 100.0;
        assert!(strategy().evaluate(&view(&candles)).unwrap().is_none());
    }

    #[test]
    fn weak_volume_waits() {
        let mut candles = breakout(102.0, 60.0);
        candles[39].volume = 1200.0;
        assert!(strategy().evaluate(&view(&candles)).unwrap().is_none());
    }

    #[test]
    fn expanded_bands_are_not_a_squeeze() {
        let mut candles = breakout(102.0, 60.0);
        candles[30].indicators.insert(BB_WIDTH.to_string(), 0.05);
        assert!(strategy().evaluate(&view(&candles)).unwrap().is_none());
    }

    #[test]
    fn low_adx_waits() {
        let mut candles = breakout(102.0, 60.0);
        candles[39].indicators.insert(ADX_14.to_string(), 15.0);
        assert!(strategy().evaluate(&view(&candles)).unwrap().is_none());
    }

    #[test]
    fn missing_adx_means_no_signal() {
        let mut candles = breakout(102.0, 60.0);
        candles[39].indicators.remove(ADX_14);
        assert!(strategy().evaluate(&view(&candles)).unwrap().is_none());
    }

    #[test]
    fn no_forced_exits() {
        assert!(strategy().exit_check().is_none());
    }
}
