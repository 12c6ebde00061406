//! Core domain types and the execution engine.

pub mod candle;
pub mod config;
pub mod config_validation;
pub mod engine;
pub mod error;
pub mod execution;
pub mod ledger;
pub mod position;
pub mod signal;
pub mod sizing;
pub mod strategies;
pub mod strategy;
