use thiserror::Error;

use crate::domain::{AmountError, Cents};

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Invalid amount: {0}")]
    InvalidAmount(String),

    #[error("Source and target must be different accounts")]
    SameAccount,

    #[error("Account not found: {0}")]
    AccountNotFound(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Exceeding daily transfer limit of {limit} cents: {used} already transferred today, {requested} requested")]
    DailyLimitExceeded {
        limit: Cents,
        used: Cents,
        requested: Cents,
    },

    #[error("Insufficient funds in account {account_number}: balance {balance}, required {required}")]
    InsufficientFunds {
        account_number: String,
        balance: Cents,
        required: Cents,
    },

    /// Storage or commit failure. The message is deliberately opaque; the
    /// source is only for logs.
    #[error("An error occurred during transaction processing")]
    Internal(#[from] anyhow::Error),
}

impl AppError {
    /// Short machine-readable name of the error class.
    pub fn kind(&self) -> &'static str {
        match self {
            AppError::InvalidAmount(_) => "InvalidAmount",
            AppError::SameAccount => "SameAccount",
            AppError::AccountNotFound(_) => "AccountNotFound",
            AppError::Forbidden(_) => "Forbidden",
            AppError::DailyLimitExceeded { .. } => "DailyLimitExceeded",
            AppError::InsufficientFunds { .. } => "InsufficientFunds",
            AppError::Internal(_) => "InternalError",
        }
    }

    /// Domain rejections happen before any mutation and are safe to show to users.
    pub fn is_rejection(&self) -> bool {
        !matches!(self, AppError::Internal(_))
    }
}

impl From<AmountError> for AppError {
    fn from(err: AmountError) -> Self {
        AppError::InvalidAmount(err.to_string())
    }
}
