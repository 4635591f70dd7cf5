//! Error types.
//!
//! Ordinary refusals (not enough money, already maxed) are [`Rejection`]s:
//! they leave the state untouched and are always paired with a `*Failed`
//! event. Nothing in this crate treats them as fatal.

use thiserror::Error;

use crate::state::Currency;

/// Why an entry point refused to change anything.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum Rejection {
    #[error("not enough {currency}: need {needed}, have {available}")]
    InsufficientFunds {
        currency: Currency,
        needed: u64,
        available: u64,
    },
    #[error("{id} is already at max level {max_level}")]
    MaxLevel { id: String, max_level: u32 },
    #[error("unknown id: {0}")]
    UnknownId(String),
    #[error("nothing to bank: {potential} potential points, {banked} already banked")]
    NothingToBank { potential: u64, banked: u64 },
    #[error("conversion yields nothing at rate {rate} with {available} available")]
    ZeroOutput { rate: u64, available: u64 },
    #[error("no award is waiting to be collected")]
    NoAward,
    #[error("amount must be positive")]
    ZeroAmount,
}

/// Storage backend failures. Caught by the engine and surfaced as a
/// `PersistFailed` event.
#[derive(Debug, Error)]
pub enum PersistError {
    #[error("storage unavailable: {0}")]
    Unavailable(String),
    #[error("storage i/o failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("save data is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("save version {found} is older than the minimum compatible {min}")]
    Incompatible { found: u32, min: u32 },
}

/// Configuration loading failures.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to parse config JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("invalid config: {0}")]
    Invalid(String),
}
