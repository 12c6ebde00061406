//! Open positions and closed trade records.

use chrono::{NaiveDateTime, TimeDelta};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Side {
    Long,
    Short,
}

impl Side {
    pub fn opposite(self) -> Side {
        match self {
            Side::Long => Side::Short,
            Side::Short => Side::Long,
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Side::Long => write!(f, "LONG"),
            Side::Short => write!(f, "SHORT"),
        }
    }
}

/// Profit target shape. A position carries exactly one of these.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Targets {
    /// One take-profit level closing the full remaining size.
    Single { tp_price: f64 },
    /// Half of the original size at `tp1_price`, the rest at `tp2_price`.
    Dual { tp1_price: f64, tp2_price: f64 },
}

pub type PositionId = u64;

#[derive(Debug, Clone, PartialEq)]
pub struct Position {
    pub id: PositionId,
    pub symbol: String,
    pub side: Side,
    pub entry_price: f64,
    pub entry_time: NaiveDateTime,
    pub original_size: f64,
    pub remaining_size: f64,
    pub leverage: u32,
    pub sl_price: f64,
    pub targets: Targets,
    pub tp1_hit: bool,
    pub sl_moved_to_entry: bool,
    pub strategy_name: String,
    pub entry_reason: String,
}

impl Position {
    /// Collateral locked for `size` units: size × entry / leverage.
    pub fn margin_for(&self, size: f64) -> f64 {
        size * self.entry_price / self.leverage as f64
    }

    pub fn locked_margin(&self) -> f64 {
        self.margin_for(self.remaining_size)
    }

    /// Side-aware price pnl over `size` units. Not scaled by leverage.
    pub fn price_pnl(&self, price: f64, size: f64) -> f64 {
        match self.side {
            Side::Long => (price - self.entry_price) * size,
            Side::Short => (self.entry_price - price) * size,
        }
    }

    /// Unrealized pnl of the remaining size as booked into equity:
    /// leverage × side-aware price pnl.
    pub fn unrealized_pnl(&self, price: f64) -> f64 {
        self.leverage as f64 * self.price_pnl(price, self.remaining_size)
    }

    /// Long: candle low at or below the stop. Short: candle high at or above.
    pub fn stop_touched(&self, high: f64, low: f64) -> bool {
        match self.side {
            Side::Long => low <= self.sl_price,
            Side::Short => high >= self.sl_price,
        }
    }

    /// Long: candle high at or above `target`. Short: candle low at or below.
    pub fn target_touched(&self, target: f64, high: f64, low: f64) -> bool {
        match self.side {
            Side::Long => high >= target,
            Side::Short => low <= target,
        }
    }

    pub fn held_for(&self, now: NaiveDateTime) -> TimeDelta {
        now - self.entry_time
    }
}

/// Immutable record of one exit event, full or partial.
#[derive(Debug, Clone, PartialEq)]
pub struct Trade {
    pub position_id: PositionId,
    pub symbol: String,
    pub side: Side,
    pub entry_price: f64,
    pub exit_price: f64,
    pub entry_time: NaiveDateTime,
    pub exit_time: NaiveDateTime,
    pub size_closed: f64,
    pub net_pnl: f64,
    pub pnl_pct: f64,
    pub exit_reason: String,
    pub fees_paid: f64,
    pub hold_time: TimeDelta,
    pub leverage: u32,
    pub strategy_name: String,
}

impl Trade {
    pub fn hold_time_hours(&self) -> f64 {
        self.hold_time.num_seconds() as f64 / 3600.0
    }

    pub fn is_win(&self) -> bool {
        self.net_pnl > 0.0
    }
}
