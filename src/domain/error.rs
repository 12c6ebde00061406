//! Domain error types.

use chrono::NaiveDateTime;

/// Top-level error type for replaytrader.
#[derive(Debug, thiserror::Error)]
pub enum ReplayError {
    #[error("config parse error in {file}: {reason}")]
    ConfigParse { file: String, reason: String },

    #[error("missing config key [{section}] {key}")]
    ConfigMissing { section: String, key: String },

    #[error("invalid config value [{section}] {key}: {reason}")]
    ConfigInvalid {
        section: String,
        key: String,
        reason: String,
    },

    #[error("invalid configuration: {reason}")]
    InvalidConfiguration { reason: String },

    #[error("candle {index} is not after its predecessor ({current} <= {previous})")]
    DataOrdering {
        index: usize,
        previous: NaiveDateTime,
        current: NaiveDateTime,
    },

    #[error("no candles for {symbol}")]
    EmptySeries { symbol: String },

    #[error("data error: {reason}")]
    Data { reason: String },

    #[error("ledger invariant violated: {reason}")]
    LedgerInvariant { reason: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl ReplayError {
    pub fn invalid_configuration(reason: impl Into<String>) -> Self {
        ReplayError::InvalidConfiguration {
            reason: reason.into(),
        }
    }

    /// Process exit status reported by the CLI for this error.
    pub fn exit_status(&self) -> u8 {
        match self {
            ReplayError::Io(_) => 1,
            ReplayError::ConfigParse { .. }
            | ReplayError::ConfigMissing { .. }
            | ReplayError::ConfigInvalid { .. } => 2,
            ReplayError::InvalidConfiguration { .. } => 3,
            ReplayError::DataOrdering { .. }
            | ReplayError::EmptySeries { .. }
            | ReplayError::Data { .. } => 4,
            ReplayError::LedgerInvariant { .. } => 5,
        }
    }
}

impl From<&ReplayError> for std::process::ExitCode {
    fn from(err: &ReplayError) -> Self {
        std::process::ExitCode::from(err.exit_status())
    }
}
