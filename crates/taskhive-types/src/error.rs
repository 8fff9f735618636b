use crate::amount::{Credits, UsdAmount};
use crate::task::TaskStatus;
use thiserror::Error;

/// Marketplace error types. Every variant is recoverable at the point of the
/// user action: the action is rejected, state is left unmodified, and the
/// message is surfaced to the actor.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum MarketError {
    #[error("Amount must be greater than zero")]
    InvalidAmount,

    #[error("Insufficient balance: required {required}, available {available}")]
    InsufficientBalance {
        required: UsdAmount,
        available: UsdAmount,
    },

    #[error("Insufficient credits: required {required}, available {available}")]
    InsufficientCredits {
        required: Credits,
        available: Credits,
    },

    #[error("Daily quota reached: {assigned_today} of {quota} tasks already assigned today")]
    QuotaExceeded { assigned_today: u32, quota: u32 },

    #[error("Account is suspended")]
    AccountSuspended,

    #[error("Submission proof must be at least {min_len} characters")]
    InvalidSubmission { min_len: usize },

    #[error("No payout profile on file; add payment details before withdrawing")]
    MissingPayoutProfile,

    #[error("User not found: {0}")]
    UserNotFound(String),

    #[error("Task not found: {0}")]
    TaskNotFound(String),

    #[error("Task already held: {0}")]
    TaskAlreadyHeld(String),

    #[error("Invalid task transition: {from:?} -> {to:?}")]
    InvalidTransition { from: TaskStatus, to: TaskStatus },

    #[error("Insufficient pool tasks: requested {requested}, available {available}")]
    InsufficientPoolTasks { requested: usize, available: usize },

    #[error("Operation requires admin privileges")]
    Unauthorized,

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Stale record version: expected {expected}, stored {actual}")]
    VersionConflict { expected: u64, actual: u64 },

    #[error("Backing store timed out")]
    Timeout,
}

impl From<serde_json::Error> for MarketError {
    fn from(e: serde_json::Error) -> Self {
        Self::Storage(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, MarketError>;
