//! Configuration validation.
//!
//! Runs before any candle data is loaded. Missing `[engine]` keys fall back
//! to their defaults, so only present-but-invalid values fail here.

use crate::domain::error::ReplayError;
use crate::domain::strategies::{
    FundingDivergenceParams, MeanReversionParams, STRATEGY_NAMES, SqueezeBreakoutParams,
};
use crate::ports::config_port::ConfigPort;

pub fn validate_engine_config(config: &dyn ConfigPort) -> Result<(), ReplayError> {
    validate_initial_capital(config)?;
    validate_rates(config)?;
    validate_max_open_positions(config)?;
    validate_risk_fractions(config)?;
    validate_leverage_caps(config)?;
    Ok(())
}

pub fn validate_data_config(config: &dyn ConfigPort) -> Result<(), ReplayError> {
    for key in ["path", "symbol"] {
        match config.get_string("data", key) {
            Some(s) if !s.trim().is_empty() => {}
            _ => {
                return Err(ReplayError::ConfigMissing {
                    section: "data".to_string(),
                    key: key.to_string(),
                });
            }
        }
    }
    Ok(())
}

pub fn validate_strategy_config(config: &dyn ConfigPort) -> Result<(), ReplayError> {
    let name = match config.get_string("strategy", "name") {
        Some(s) if !s.trim().is_empty() => s.trim().to_string(),
        _ => {
            return Err(ReplayError::ConfigMissing {
                section: "strategy".to_string(),
                key: "name".to_string(),
            });
        }
    };
    if !STRATEGY_NAMES.contains(&name.as_str()) {
        return Err(invalid(
            "strategy",
            "name",
            format!(
                "unknown strategy '{name}', expected one of: {}",
                STRATEGY_NAMES.join(", ")
            ),
        ));
    }
    validate_strategy_params(config, &name)
}

fn invalid(section: &str, key: &str, reason: impl Into<String>) -> ReplayError {
    ReplayError::ConfigInvalid {
        section: section.to_string(),
        key: key.to_string(),
        reason: reason.into(),
    }
}

fn validate_initial_capital(config: &dyn ConfigPort) -> Result<(), ReplayError> {
    let value = config.get_double("engine", "initial_capital", 50.0);
    if !(value > 0.0) {
        return Err(invalid(
            "engine",
            "initial_capital",
            "initial_capital must be positive",
        ));
    }
    Ok(())
}

fn validate_rates(config: &dyn ConfigPort) -> Result<(), ReplayError> {
    for key in ["maker_fee", "taker_fee", "slippage_pct"] {
        let value = config.get_double("engine", key, 0.0);
        if !(0.0..1.0).contains(&value) {
            return Err(invalid(
                "engine",
                key,
                format!("{key} must be a fraction in [0, 1)"),
            ));
        }
    }
    Ok(())
}

fn validate_max_open_positions(config: &dyn ConfigPort) -> Result<(), ReplayError> {
    let value = config.get_int("engine", "max_open_positions", 2);
    if value < 1 {
        return Err(invalid(
            "engine",
            "max_open_positions",
            "max_open_positions must be at least 1",
        ));
    }
    Ok(())
}

fn validate_risk_fractions(config: &dyn ConfigPort) -> Result<(), ReplayError> {
    for (key, default) in [
        ("risk_per_trade", 0.01),
        ("max_notional_fraction", 0.5),
        ("max_loss_fraction", 0.02),
    ] {
        let value = config.get_double("engine", key, default);
        if !(value > 0.0 && value <= 1.0) {
            return Err(invalid(
                "engine",
                key,
                format!("{key} must be between 0 (exclusive) and 1"),
            ));
        }
    }
    Ok(())
}

fn validate_leverage_caps(config: &dyn ConfigPort) -> Result<(), ReplayError> {
    for symbol in config.keys("leverage") {
        let value = config.get_int("leverage", &symbol, 0);
        if value < 1 || value > i64::from(u32::MAX) {
            return Err(invalid(
                "leverage",
                &symbol,
                "leverage cap must be a whole number of at least 1",
            ));
        }
    }
    Ok(())
}

fn validate_strategy_params(config: &dyn ConfigPort, name: &str) -> Result<(), ReplayError> {
    let (section, positives): (&str, Vec<(&str, f64)>) = match name {
        "funding_divergence" => {
            let p = FundingDivergenceParams::from_config(config);
            (
                FundingDivergenceParams::SECTION,
                vec![
                    ("ema_period", p.ema_period as f64),
                    ("atr_sl_multiplier", p.atr_sl_multiplier),
                    ("atr_tp_multiplier", p.atr_tp_multiplier),
                    ("max_hold_days", p.max_hold_days as f64),
                    ("max_atr_ratio", p.max_atr_ratio),
                ],
            )
        }
        "squeeze_breakout" => {
            let p = SqueezeBreakoutParams::from_config(config);
            (
                SqueezeBreakoutParams::SECTION,
                vec![
                    ("bb_period", p.bb_period as f64),
                    ("squeeze_threshold", p.squeeze_threshold),
                    ("atr_sl_multiplier", p.atr_sl_multiplier),
                    ("atr_tp1_multiplier", p.atr_tp1_multiplier),
                    ("atr_tp2_multiplier", p.atr_tp2_multiplier),
                ],
            )
        }
        _ => {
            let p = MeanReversionParams::from_config(config);
            (
                MeanReversionParams::SECTION,
                vec![
                    ("bb_period", p.bb_period as f64),
                    ("ema_period", p.ema_period as f64),
                    ("sr_lookback", p.sr_lookback as f64),
                    ("volume_ma_period", p.volume_ma_period as f64),
                    ("sl_atr_multiplier", p.sl_atr_multiplier),
                    ("tp2_atr_multiplier", p.tp2_atr_multiplier),
                    ("max_hold_hours", p.max_hold_hours as f64),
                    ("max_atr_ratio", p.max_atr_ratio),
                ],
            )
        }
    };
    for (key, value) in positives {
        if !(value > 0.0) {
            return Err(invalid(section, key, format!("{key} must be positive")));
        }
    }
    Ok(())
}
