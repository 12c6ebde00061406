//! Strategy contract consumed by the engine.
//!
//! `evaluate` is required. Forced exits (time stops and the like) are an
//! explicitly declared capability: a strategy that returns `None` from
//! [`Strategy::exit_check`] never forces an exit.

use super::candle::Candle;
use super::error::ReplayError;
use super::position::Position;
use super::signal::Signal;

/// What a strategy may see at one step. `history` ends at the current candle,
/// so look-ahead is impossible by construction.
#[derive(Debug, Clone, Copy)]
pub struct MarketView<'a> {
    pub symbol: &'a str,
    pub history: &'a [Candle],
    pub available_balance: f64,
    pub open_positions: &'a [Position],
}

impl<'a> MarketView<'a> {
    /// Index of the current candle in the full series.
    pub fn index(&self) -> usize {
        self.history.len() - 1
    }

    pub fn current(&self) -> &'a Candle {
        &self.history[self.history.len() - 1]
    }

    pub fn previous(&self) -> Option<&'a Candle> {
        self.history.len().checked_sub(2).map(|i| &self.history[i])
    }

    /// The last `n` candles including the current one, or fewer at the start.
    pub fn window(&self, n: usize) -> &'a [Candle] {
        let start = self.history.len().saturating_sub(n);
        &self.history[start..]
    }

    pub fn has_position_in(&self, symbol: &str) -> bool {
        self.open_positions.iter().any(|p| p.symbol == symbol)
    }
}

pub trait Strategy {
    fn name(&self) -> &str;

    /// Entry decision for the current candle. `Ok(None)` and a `Wait` signal
    /// both mean "do nothing". Errors are fatal to the run.
    fn evaluate(&self, view: &MarketView<'_>) -> Result<Option<Signal>, ReplayError>;

    fn exit_check(&self) -> Option<&dyn ExitCheck> {
        None
    }
}

/// Optional forced-exit capability.
pub trait ExitCheck {
    /// Reason to close `position` at the current candle's close, if any.
    /// The current candle is `history.last()`.
    fn check_exit(&self, position: &Position, history: &[Candle]) -> Option<String>;
}
