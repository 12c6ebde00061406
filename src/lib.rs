//! Candle-replay backtester for leveraged crypto futures.
//!
//! Hexagonal architecture: simulation and strategies in [`domain`], port
//! traits in [`ports`], file-backed implementations in [`adapters`].

pub mod domain;
pub mod ports;
pub mod adapters;
pub mod cli;
