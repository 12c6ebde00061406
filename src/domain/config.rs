//! Engine configuration values.
//!
//! Rates are fractions: a taker fee of 0.0004 is 0.04% of notional, a
//! `slippage_pct` of 0.0005 moves fills by 0.05% of price.

use std::collections::BTreeMap;

use super::error::ReplayError;

#[derive(Debug, Clone, PartialEq)]
pub struct EngineConfig {
    pub initial_capital: f64,
    pub maker_fee: f64,
    pub taker_fee: f64,
    pub slippage_pct: f64,
    pub max_open_positions: usize,
    pub risk_per_trade: f64,
    pub max_notional_fraction: f64,
    pub max_loss_fraction: f64,
    /// Lower-cased symbol → maximum leverage.
    pub leverage_caps: BTreeMap<String, u32>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        let mut leverage_caps = BTreeMap::new();
        leverage_caps.insert("btc/usdt".to_string(), 3);
        leverage_caps.insert("sol/usdt".to_string(), 5);
        EngineConfig {
            initial_capital: 50.0,
            maker_fee: 0.0002,
            taker_fee: 0.0004,
            slippage_pct: 0.0005,
            max_open_positions: 2,
            risk_per_trade: 0.01,
            max_notional_fraction: 0.5,
            max_loss_fraction: 0.02,
            leverage_caps,
        }
    }
}

impl EngineConfig {
    pub fn leverage_cap(&self, symbol: &str) -> Option<u32> {
        self.leverage_caps.get(&symbol.to_lowercase()).copied()
    }

    pub fn with_leverage_cap(mut self, symbol: &str, cap: u32) -> Self {
        self.leverage_caps.insert(symbol.to_lowercase(), cap);
        self
    }

    /// Checked once when an engine is built; the values are read-only afterwards.
    pub fn validate(&self) -> Result<(), ReplayError> {
        if !(self.initial_capital > 0.0) {
            return Err(ReplayError::invalid_configuration(
                "initial_capital must be positive",
            ));
        }
        for (name, rate) in [
            ("maker_fee", self.maker_fee),
            ("taker_fee", self.taker_fee),
            ("slippage_pct", self.slippage_pct),
        ] {
            if !(0.0..1.0).contains(&rate) {
                return Err(ReplayError::invalid_configuration(format!(
                    "{name} must be in [0, 1), got {rate}"
                )));
            }
        }
        if let Some((symbol, _)) = self.leverage_caps.iter().find(|(_, cap)| **cap == 0) {
            return Err(ReplayError::invalid_configuration(format!(
                "leverage cap for {symbol} must be at least 1"
            )));
        }
        Ok(())
    }
}
