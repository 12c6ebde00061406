//! Per-step strategy output.

use chrono::NaiveDateTime;
use std::collections::BTreeMap;

use super::position::{Side, Targets};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Long,
    Short,
    Wait,
}

impl Action {
    /// Side to open, or `None` for `Wait`.
    pub fn side(self) -> Option<Side> {
        match self {
            Action::Long => Some(Side::Long),
            Action::Short => Some(Side::Short),
            Action::Wait => None,
        }
    }
}

/// Ephemeral entry request. Never persisted by the engine.
#[derive(Debug, Clone, PartialEq)]
pub struct Signal {
    pub action: Action,
    pub entry_price: f64,
    pub leverage: u32,
    pub size: f64,
    pub sl_price: f64,
    pub targets: Targets,
    pub reason: String,
    pub timestamp: NaiveDateTime,
    /// Diagnostic values captured at decision time (atr, rsi, ...).
    pub metadata: BTreeMap<String, f64>,
}

impl Signal {
    pub fn is_actionable(&self) -> bool {
        self.action != Action::Wait
    }

    pub fn with_metadata(mut self, key: &str, value: f64) -> Self {
        self.metadata.insert(key.to_string(), value);
        self
    }

    pub fn notional(&self) -> f64 {
        self.size * self.entry_price
    }
}
