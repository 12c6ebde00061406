//! Ledger state: cash, open positions, trade ledger and equity curve.

use chrono::NaiveDateTime;
use std::collections::BTreeMap;

use super::position::{Position, PositionId, Trade};

#[derive(Debug, Clone, PartialEq)]
pub struct EquitySample {
    pub timestamp: NaiveDateTime,
    pub equity: f64,
    pub balance: f64,
    pub open_positions: usize,
}

/// Owned by exactly one engine. `balance` is cash with locked margin already
/// deducted; `equity` adds leveraged unrealized pnl of open positions.
#[derive(Debug, Clone, PartialEq)]
pub struct Ledger {
    pub initial_capital: f64,
    pub balance: f64,
    pub equity: f64,
    pub positions: Vec<Position>,
    pub trades: Vec<Trade>,
    pub equity_curve: Vec<EquitySample>,
}

impl Ledger {
    pub fn new(initial_capital: f64) -> Self {
        Ledger {
            initial_capital,
            balance: initial_capital,
            equity: initial_capital,
            positions: Vec::new(),
            trades: Vec::new(),
            equity_curve: Vec::new(),
        }
    }

    pub fn reset(&mut self) {
        self.balance = self.initial_capital;
        self.equity = self.initial_capital;
        self.positions.clear();
        self.trades.clear();
        self.equity_curve.clear();
    }

    pub fn add_position(&mut self, position: Position) {
        self.positions.push(position);
    }

    pub fn get_position(&self, id: PositionId) -> Option<&Position> {
        self.positions.iter().find(|p| p.id == id)
    }

    pub fn get_position_mut(&mut self, id: PositionId) -> Option<&mut Position> {
        self.positions.iter_mut().find(|p| p.id == id)
    }

    pub fn remove_position(&mut self, id: PositionId) -> Option<Position> {
        let index = self.positions.iter().position(|p| p.id == id)?;
        Some(self.positions.remove(index))
    }

    pub fn position_ids(&self) -> Vec<PositionId> {
        self.positions.iter().map(|p| p.id).collect()
    }

    pub fn position_count(&self) -> usize {
        self.positions.len()
    }

    pub fn locked_margin(&self) -> f64 {
        self.positions.iter().map(Position::locked_margin).sum()
    }

    pub fn unrealized_pnl(&self, price: f64) -> f64 {
        self.positions.iter().map(|p| p.unrealized_pnl(price)).sum()
    }

    pub fn record_trade(&mut self, trade: Trade) {
        self.trades.push(trade);
    }

    pub fn mark_to_market(&mut self, price: f64) -> f64 {
        self.equity = self.balance + self.unrealized_pnl(price);
        self.equity
    }

    pub fn record_equity(&mut self, timestamp: NaiveDateTime) {
        self.equity_curve.push(EquitySample {
            timestamp,
            equity: self.equity,
            balance: self.balance,
            open_positions: self.position_count(),
        });
    }
}

/// Exit fees across `trades`.
pub fn total_fees(trades: &[Trade]) -> f64 {
    trades.iter().map(|t| t.fees_paid).sum()
}

pub fn net_pnl(trades: &[Trade]) -> f64 {
    trades.iter().map(|t| t.net_pnl).sum()
}

pub fn exit_reason_counts(trades: &[Trade]) -> BTreeMap<String, usize> {
    let mut counts = BTreeMap::new();
    for trade in trades {
        *counts.entry(trade.exit_reason.clone()).or_insert(0) += 1;
    }
    counts
}
