//! Fill simulation and the per-step exit state machine.
//!
//! Fees and slippage are pure functions of the engine configuration. Exit
//! evaluation is a pure decision over one position and one candle; the
//! engine applies the resulting action to the ledger.

use super::candle::Candle;
use super::config::EngineConfig;
use super::position::{Position, Side, Targets};

pub const STOP_LOSS: &str = "Stop Loss";
pub const TAKE_PROFIT: &str = "Take Profit";
pub const TP1_PARTIAL: &str = "TP1 (50%)";
pub const TP2_PARTIAL: &str = "TP2 (50%)";
pub const BACKTEST_END: &str = "Backtest End";

/// Share of the original size closed at the first of two targets.
pub const TP1_CLOSE_FRACTION: f64 = 0.5;

/// value × maker or taker rate.
pub fn fee(value: f64, is_maker: bool, config: &EngineConfig) -> f64 {
    let rate = if is_maker {
        config.maker_fee
    } else {
        config.taker_fee
    };
    value * rate
}

/// Move `price` against the trader. Buying (opening a long, closing a short)
/// fills higher; selling fills lower.
pub fn apply_slippage(price: f64, side: Side, slippage_pct: f64) -> f64 {
    let slippage = price * slippage_pct;
    match side {
        Side::Long => price + slippage,
        Side::Short => price - slippage,
    }
}

/// Outcome of exit evaluation for one position on one candle.
#[derive(Debug, Clone, PartialEq)]
pub enum ExitAction {
    Hold,
    /// Close the full remaining size at `price`.
    Close { reason: &'static str, price: f64 },
    /// Close `size` at the first target, then move the stop to breakeven.
    TakePartial {
        reason: &'static str,
        price: f64,
        size: f64,
    },
}

/// First matching rule wins: stop loss, then targets.
///
/// Stops and targets fill at their trigger level, not at the candle close.
pub fn evaluate_exit(position: &Position, candle: &Candle) -> ExitAction {
    let (high, low) = (candle.high, candle.low);

    if position.stop_touched(high, low) {
        return ExitAction::Close {
            reason: STOP_LOSS,
            price: position.sl_price,
        };
    }

    match position.targets {
        Targets::Dual {
            tp1_price,
            tp2_price,
        } => {
            if !position.tp1_hit {
                if position.target_touched(tp1_price, high, low) {
                    return ExitAction::TakePartial {
                        reason: TP1_PARTIAL,
                        price: tp1_price,
                        size: position.original_size * TP1_CLOSE_FRACTION,
                    };
                }
            } else if position.target_touched(tp2_price, high, low) {
                return ExitAction::Close {
                    reason: TP2_PARTIAL,
                    price: tp2_price,
                };
            }
        }
        Targets::Single { tp_price } => {
            if position.target_touched(tp_price, high, low) {
                return ExitAction::Close {
                    reason: TAKE_PROFIT,
                    price: tp_price,
                };
            }
        }
    }

    ExitAction::Hold
}
