//! Execution engine and replay loop.
//!
//! Per candle, in order:
//! 1. stop-loss / take-profit exits over a snapshot of open position ids
//! 2. strategy-driven forced exits
//! 3. signal solicitation and entry admission
//! 4. mark-to-market equity
//! 5. one equity curve sample
//!
//! After the last candle every open position is closed at the final close
//! with reason "Backtest End".
//!
//! Margining is isolated and fixed-leverage: the margin returned on close is
//! the entry margin for the closed size, with no mark-to-market margin
//! requirement and no liquidation.

use chrono::NaiveDateTime;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{debug, info, warn};

use super::candle::{Candle, CandleSeries};
use super::config::EngineConfig;
use super::error::ReplayError;
use super::execution::{self, BACKTEST_END, ExitAction};
use super::ledger::{self, EquitySample, Ledger};
use super::position::{Position, PositionId, Side, Trade};
use super::signal::Signal;
use super::strategy::{MarketView, Strategy};

/// Relative size below which a remainder counts as fully closed.
const SIZE_TOLERANCE: f64 = 1e-9;

#[derive(Debug, Clone, PartialEq)]
pub enum EntryOutcome {
    Opened {
        position_id: PositionId,
        fill_price: f64,
        margin: f64,
        fee: f64,
    },
    Rejected(RejectReason),
}

#[derive(Debug, Clone, PartialEq)]
pub enum RejectReason {
    NotActionable,
    NonPositiveSize,
    InsufficientBalance { required: f64, available: f64 },
}

#[derive(Debug, Clone, PartialEq)]
pub struct BacktestResult {
    pub symbol: String,
    pub strategy_name: String,
    pub initial_capital: f64,
    pub trades: Vec<Trade>,
    pub equity_curve: Vec<EquitySample>,
    /// Empty after a completed run; a cancelled run keeps its exposure.
    pub open_positions: Vec<Position>,
    pub final_equity: f64,
    pub final_balance: f64,
    pub completed: bool,
}

impl BacktestResult {
    pub fn net_pnl(&self) -> f64 {
        ledger::net_pnl(&self.trades)
    }

    pub fn total_fees(&self) -> f64 {
        ledger::total_fees(&self.trades)
    }

    pub fn exit_reason_counts(&self) -> BTreeMap<String, usize> {
        ledger::exit_reason_counts(&self.trades)
    }

    pub fn total_return(&self) -> f64 {
        (self.final_equity - self.initial_capital) / self.initial_capital
    }
}

pub struct Engine {
    config: EngineConfig,
    ledger: Ledger,
    next_position_id: PositionId,
}

impl Engine {
    pub fn new(config: EngineConfig) -> Result<Self, ReplayError> {
        config.validate()?;
        let ledger = Ledger::new(config.initial_capital);
        Ok(Engine {
            config,
            ledger,
            next_position_id: 1,
        })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn ledger(&self) -> &Ledger {
        &self.ledger
    }

    pub fn reset(&mut self) {
        self.ledger.reset();
        self.next_position_id = 1;
    }

    /// Cash that can back a new entry: the balance less the margin locked
    /// by every open position.
    pub fn available_balance(&self) -> f64 {
        self.ledger.balance - self.ledger.locked_margin()
    }

    pub fn fee(&self, value: f64, is_maker: bool) -> f64 {
        execution::fee(value, is_maker, &self.config)
    }

    pub fn apply_slippage(&self, price: f64, side: Side) -> f64 {
        execution::apply_slippage(price, side, self.config.slippage_pct)
    }

    /// All-or-nothing entry admission.
    ///
    /// Admission is checked on the quoted price; the locked margin uses the
    /// slipped fill price, and that same basis is returned on close.
    pub fn open_position(
        &mut self,
        symbol: &str,
        signal: &Signal,
        strategy_name: &str,
    ) -> Result<EntryOutcome, ReplayError> {
        let Some(side) = signal.action.side() else {
            return Ok(EntryOutcome::Rejected(RejectReason::NotActionable));
        };
        self.check_signal(symbol, signal)?;
        if signal.size <= 0.0 {
            return Ok(EntryOutcome::Rejected(RejectReason::NonPositiveSize));
        }

        let leverage = signal.leverage as f64;
        let notional = signal.size * signal.entry_price;
        let margin = notional / leverage;
        let entry_fee = self.fee(notional, false);
        let available = self.available_balance();
        if margin + entry_fee > available {
            return Ok(EntryOutcome::Rejected(RejectReason::InsufficientBalance {
                required: margin + entry_fee,
                available,
            }));
        }

        let fill_price = self.apply_slippage(signal.entry_price, side);
        let locked_margin = signal.size * fill_price / leverage;
        self.ledger.balance -= entry_fee;
        self.ledger.balance -= locked_margin;

        let position_id = self.next_position_id;
        self.next_position_id += 1;
        self.ledger.add_position(Position {
            id: position_id,
            symbol: symbol.to_string(),
            side,
            entry_price: fill_price,
            entry_time: signal.timestamp,
            original_size: signal.size,
            remaining_size: signal.size,
            leverage: signal.leverage,
            sl_price: signal.sl_price,
            targets: signal.targets,
            tp1_hit: false,
            sl_moved_to_entry: false,
            strategy_name: strategy_name.to_string(),
            entry_reason: signal.reason.clone(),
        });

        debug!(
            position_id,
            %side,
            fill_price,
            size = signal.size,
            margin = locked_margin,
            fee = entry_fee,
            "opened position"
        );
        Ok(EntryOutcome::Opened {
            position_id,
            fill_price,
            margin: locked_margin,
            fee: entry_fee,
        })
    }

    fn check_signal(&self, symbol: &str, signal: &Signal) -> Result<(), ReplayError> {
        if signal.leverage == 0 {
            return Err(ReplayError::invalid_configuration(
                "leverage must be at least 1",
            ));
        }
        if let Some(cap) = self.config.leverage_cap(symbol) {
            if signal.leverage > cap {
                return Err(ReplayError::invalid_configuration(format!(
                    "leverage {} exceeds the {symbol} cap of {cap}",
                    signal.leverage
                )));
            }
        }
        if !(signal.entry_price > 0.0) || !signal.entry_price.is_finite() {
            return Err(ReplayError::invalid_configuration(format!(
                "entry price must be positive, got {}",
                signal.entry_price
            )));
        }
        if signal.sl_price == signal.entry_price {
            return Err(ReplayError::invalid_configuration(format!(
                "zero stop distance at {}",
                signal.entry_price
            )));
        }
        if !signal.size.is_finite() {
            return Err(ReplayError::invalid_configuration(
                "signal size is not finite",
            ));
        }
        Ok(())
    }

    /// Close `size_to_close` (default: everything remaining) of a position.
    ///
    /// Gross pnl is computed on the full closed size and is not multiplied
    /// by leverage again.
    pub fn close_position(
        &mut self,
        id: PositionId,
        exit_price: f64,
        exit_time: NaiveDateTime,
        reason: &str,
        size_to_close: Option<f64>,
    ) -> Result<Trade, ReplayError> {
        let slippage_pct = self.config.slippage_pct;
        let taker_fee = self.config.taker_fee;
        let position = self
            .ledger
            .get_position_mut(id)
            .ok_or_else(|| ReplayError::LedgerInvariant {
                reason: format!("position {id} is not open"),
            })?;

        let remaining = position.remaining_size;
        let mut size = size_to_close.unwrap_or(remaining);
        if !(size > 0.0) || size > remaining * (1.0 + SIZE_TOLERANCE) {
            return Err(ReplayError::LedgerInvariant {
                reason: format!(
                    "cannot close {size} of position {id} with {remaining} remaining"
                ),
            });
        }
        if remaining - size <= position.original_size * SIZE_TOLERANCE {
            size = remaining;
        }

        let fill_price = execution::apply_slippage(exit_price, position.side.opposite(), slippage_pct);
        let gross_pnl = position.price_pnl(fill_price, size);
        let exit_fee = fill_price * size * taker_fee;
        let net_pnl = gross_pnl - exit_fee;
        let margin_returned = position.margin_for(size);
        let pnl_pct = if margin_returned > 0.0 {
            net_pnl / margin_returned * 100.0
        } else {
            0.0
        };

        let trade = Trade {
            position_id: id,
            symbol: position.symbol.clone(),
            side: position.side,
            entry_price: position.entry_price,
            exit_price: fill_price,
            entry_time: position.entry_time,
            exit_time,
            size_closed: size,
            net_pnl,
            pnl_pct,
            exit_reason: reason.to_string(),
            fees_paid: exit_fee,
            hold_time: position.held_for(exit_time),
            leverage: position.leverage,
            strategy_name: position.strategy_name.clone(),
        };

        position.remaining_size = remaining - size;
        let fully_closed = position.remaining_size <= 0.0;

        self.ledger.balance += net_pnl;
        self.ledger.balance += margin_returned;
        if fully_closed {
            self.ledger.remove_position(id);
        }
        self.ledger.record_trade(trade.clone());

        debug!(
            position_id = id,
            reason,
            fill_price,
            size,
            net_pnl,
            fully_closed,
            "closed position"
        );
        Ok(trade)
    }

    /// Apply at most one SL/TP action per open position for this candle.
    /// Returns the number of exit events.
    pub fn update_position_exits(&mut self, candle: &Candle) -> Result<usize, ReplayError> {
        let mut exits = 0;
        for id in self.ledger.position_ids() {
            let Some(position) = self.ledger.get_position(id) else {
                continue;
            };
            match execution::evaluate_exit(position, candle) {
                ExitAction::Hold => {}
                ExitAction::Close { reason, price } => {
                    self.close_position(id, price, candle.timestamp, reason, None)?;
                    exits += 1;
                }
                ExitAction::TakePartial {
                    reason,
                    price,
                    size,
                } => {
                    // Half of the original size only equals half of what is
                    // left while nothing has been reduced before TP1.
                    if (position.remaining_size - position.original_size).abs()
                        > position.original_size * SIZE_TOLERANCE
                    {
                        return Err(ReplayError::LedgerInvariant {
                            reason: format!(
                                "position {id} reached TP1 with {} of {} remaining",
                                position.remaining_size, position.original_size
                            ),
                        });
                    }
                    self.close_position(id, price, candle.timestamp, reason, Some(size))?;
                    if let Some(position) = self.ledger.get_position_mut(id) {
                        position.tp1_hit = true;
                        position.sl_price = position.entry_price;
                        position.sl_moved_to_entry = true;
                    }
                    exits += 1;
                }
            }
        }
        Ok(exits)
    }

    /// Offer each still-open position owned by `strategy` to its forced-exit
    /// capability, closing at the current candle's close.
    pub fn apply_forced_exits(
        &mut self,
        strategy: &dyn Strategy,
        history: &[Candle],
    ) -> Result<usize, ReplayError> {
        let Some(check) = strategy.exit_check() else {
            return Ok(0);
        };
        let Some(candle) = history.last() else {
            return Ok(0);
        };
        let mut exits = 0;
        for id in self.ledger.position_ids() {
            let Some(position) = self.ledger.get_position(id) else {
                continue;
            };
            if position.strategy_name != strategy.name() {
                continue;
            }
            if let Some(reason) = check.check_exit(position, history) {
                self.close_position(id, candle.close, candle.timestamp, &reason, None)?;
                exits += 1;
            }
        }
        Ok(exits)
    }

    /// equity = balance + Σ leverage × unrealized pnl at `price`.
    pub fn update_equity(&mut self, price: f64) -> f64 {
        self.ledger.mark_to_market(price)
    }

    /// One full step at `index`.
    pub fn step(
        &mut self,
        series: &CandleSeries,
        index: usize,
        strategy: &dyn Strategy,
    ) -> Result<(), ReplayError> {
        let candle = &series.candles[index];
        let history = series.history(index);

        self.update_position_exits(candle)?;
        self.apply_forced_exits(strategy, history)?;

        let signal = {
            let view = MarketView {
                symbol: &series.symbol,
                history,
                available_balance: self.available_balance(),
                open_positions: &self.ledger.positions,
            };
            strategy.evaluate(&view)?
        };
        if let Some(signal) = signal.filter(Signal::is_actionable) {
            if let EntryOutcome::Rejected(reason) =
                self.open_position(&series.symbol, &signal, strategy.name())?
            {
                debug!(index, ?reason, "dropped signal");
            }
        }

        self.update_equity(candle.close);
        self.ledger.record_equity(candle.timestamp);
        Ok(())
    }

    pub fn run(
        &mut self,
        series: &CandleSeries,
        strategy: &dyn Strategy,
    ) -> Result<BacktestResult, ReplayError> {
        self.run_cancellable(series, strategy, &AtomicBool::new(false))
    }

    /// Replay `series`, checking `cancel` between steps. A cancelled run
    /// returns the ledger as of the last completed step.
    pub fn run_cancellable(
        &mut self,
        series: &CandleSeries,
        strategy: &dyn Strategy,
        cancel: &AtomicBool,
    ) -> Result<BacktestResult, ReplayError> {
        series.validate()?;
        self.reset();

        info!(
            symbol = %series.symbol,
            strategy = strategy.name(),
            candles = series.len(),
            "starting replay"
        );

        let mut completed = true;
        for index in 0..series.len() {
            if cancel.load(Ordering::Relaxed) {
                warn!(index, "replay cancelled");
                completed = false;
                break;
            }
            self.step(series, index, strategy)?;
        }

        if completed {
            if let Some(last) = series.candles.last() {
                for id in self.ledger.position_ids() {
                    self.close_position(id, last.close, last.timestamp, BACKTEST_END, None)?;
                }
                self.update_equity(last.close);
            }
        }

        info!(
            trades = self.ledger.trades.len(),
            final_equity = self.ledger.equity,
            final_balance = self.ledger.balance,
            completed,
            "replay finished"
        );

        Ok(BacktestResult {
            symbol: series.symbol.clone(),
            strategy_name: strategy.name().to_string(),
            initial_capital: self.ledger.initial_capital,
            trades: self.ledger.trades.clone(),
            equity_curve: self.ledger.equity_curve.clone(),
            open_positions: self.ledger.positions.clone(),
            final_equity: self.ledger.equity,
            final_balance: self.ledger.balance,
            completed,
        })
    }
}
