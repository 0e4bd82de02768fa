use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{AccountId, Amount, Cents};

pub type TransactionId = Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TransactionType {
    Transfer,
    Repayment,
    Deposit,
    Withdrawal,
}

impl TransactionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionType::Transfer => "Transfer",
            TransactionType::Repayment => "Repayment",
            TransactionType::Deposit => "Deposit",
            TransactionType::Withdrawal => "Withdrawal",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "Transfer" => Some(TransactionType::Transfer),
            "Repayment" => Some(TransactionType::Repayment),
            "Deposit" => Some(TransactionType::Deposit),
            "Withdrawal" => Some(TransactionType::Withdrawal),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TransactionStatus {
    Success,
    Failed,
    Pending,
}

impl TransactionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionStatus::Success => "Success",
            TransactionStatus::Failed => "Failed",
            TransactionStatus::Pending => "Pending",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "Success" => Some(TransactionStatus::Success),
            "Failed" => Some(TransactionStatus::Failed),
            "Pending" => Some(TransactionStatus::Pending),
            _ => None,
        }
    }
}

impl std::fmt::Display for TransactionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A movement of money between two accounts.
/// Transactions are immutable: a failed attempt gets its own row instead of
/// updating an earlier one.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Transaction {
    pub id: TransactionId,
    /// Account debited
    pub source_account: AccountId,
    /// Account credited
    pub target_account: AccountId,
    /// Amount in cents (always positive)
    pub amount_cents: Cents,
    pub transaction_type: TransactionType,
    pub status: TransactionStatus,
    pub timestamp: DateTime<Utc>,
    pub description: Option<String>,
}

impl Transaction {
    pub fn new(
        source_account: AccountId,
        target_account: AccountId,
        amount: Amount,
        transaction_type: TransactionType,
        status: TransactionStatus,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            source_account,
            target_account,
            amount_cents: amount.cents(),
            transaction_type,
            status,
            timestamp,
            description: None,
        }
    }

    /// A successful account-to-account transfer.
    pub fn transfer(
        source_account: AccountId,
        target_account: AccountId,
        amount: Amount,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self::new(
            source_account,
            target_account,
            amount,
            TransactionType::Transfer,
            TransactionStatus::Success,
            timestamp,
        )
    }

    pub fn with_description(mut self, description: Option<String>) -> Self {
        self.description = description;
        self
    }

    /// The record written after a transfer's unit of work failed to commit.
    /// It carries a fresh id; the failed attempt itself left nothing behind.
    pub fn failed_copy(&self) -> Self {
        Self {
            id: Uuid::new_v4(),
            status: TransactionStatus::Failed,
            ..self.clone()
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == TransactionStatus::Success
    }

    pub fn involves(&self, account: AccountId) -> bool {
        self.source_account == account || self.target_account == account
    }
}
