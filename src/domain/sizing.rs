//! Risk-based position sizing, owned by strategies.
//!
//! The engine never applies these caps; it only checks margin and fees
//! against the available balance.

use super::config::EngineConfig;
use super::error::ReplayError;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SizingRules {
    /// Share of balance put at risk between entry and stop.
    pub risk_fraction: f64,
    /// Largest notional as a share of balance.
    pub max_notional_fraction: f64,
    /// Largest loss at the stop as a share of balance.
    pub max_loss_fraction: f64,
}

impl SizingRules {
    pub fn from_config(config: &EngineConfig) -> Self {
        SizingRules {
            risk_fraction: config.risk_per_trade,
            max_notional_fraction: config.max_notional_fraction,
            max_loss_fraction: config.max_loss_fraction,
        }
    }
}

/// Size in base units:
/// risk = balance × risk_fraction, notional = risk / stop_distance_fraction,
/// capped at max_notional_fraction × balance, then scaled down so the loss at
/// the stop stays within max_loss_fraction × balance.
pub fn position_size(
    balance: f64,
    entry_price: f64,
    sl_price: f64,
    rules: &SizingRules,
) -> Result<f64, ReplayError> {
    if !(entry_price > 0.0) || !entry_price.is_finite() {
        return Err(ReplayError::invalid_configuration(format!(
            "entry price must be positive, got {entry_price}"
        )));
    }
    let stop_distance = (entry_price - sl_price).abs();
    if !(stop_distance > 0.0) || !stop_distance.is_finite() {
        return Err(ReplayError::invalid_configuration(format!(
            "zero stop distance: entry {entry_price} equals stop {sl_price}"
        )));
    }
    if balance <= 0.0 {
        return Ok(0.0);
    }

    let risk_amount = balance * rules.risk_fraction;
    let stop_distance_fraction = stop_distance / entry_price;
    let notional = (risk_amount / stop_distance_fraction).min(balance * rules.max_notional_fraction);

    let mut size = notional / entry_price;
    let loss_fraction = size * stop_distance / balance;
    if loss_fraction > rules.max_loss_fraction {
        size *= rules.max_loss_fraction / loss_fraction;
    }
    Ok(size)
}
