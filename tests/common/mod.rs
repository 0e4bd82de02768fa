// Allow dead_code because these helpers are used across different test files
// which are compiled separately
#![allow(dead_code)]

use anyhow::Result;
use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use tellerline::application::{EngineConfig, TransferEngine};
use tellerline::domain::{Account, AccountType, CustomerId};
use tempfile::TempDir;
use uuid::Uuid;

/// Helper to create a test engine with a temporary database
pub async fn test_engine() -> Result<(TransferEngine, TempDir)> {
    test_engine_with(EngineConfig::default()).await
}

/// Same as [`test_engine`] with explicit settings
pub async fn test_engine_with(config: EngineConfig) -> Result<(TransferEngine, TempDir)> {
    let temp_dir = TempDir::new()?;
    let db_path = temp_dir.path().join("test.db");
    let engine = TransferEngine::init(db_path.to_str().unwrap(), config).await?;
    Ok((engine, temp_dir))
}

/// Helper to parse a date string into a DateTime<Utc> at midday
pub fn parse_date(date_str: &str) -> DateTime<Utc> {
    NaiveDate::parse_from_str(date_str, "%Y-%m-%d")
        .unwrap()
        .and_hms_opt(12, 0, 0)
        .unwrap()
        .and_utc()
}

/// A customer with one funded account
pub struct Customer {
    pub id: CustomerId,
    pub account: Account,
}

impl Customer {
    /// Open a saving account for a fresh customer with the given opening balance
    pub async fn open(engine: &TransferEngine, balance: Decimal) -> Result<Self> {
        let id = Uuid::new_v4();
        let account = engine
            .open_account(id, AccountType::Saving, balance)
            .await?;
        Ok(Self { id, account })
    }

    pub fn number(&self) -> &str {
        &self.account.account_number
    }

    /// Current balance as seen by the owner
    pub async fn balance(&self, engine: &TransferEngine) -> Result<Decimal> {
        Ok(engine.get_balance(self.id, self.number()).await?.balance)
    }
}

/// Test fixture: a sender and a receiver with the given opening balances
pub async fn two_customers(
    engine: &TransferEngine,
    sender_balance: Decimal,
    receiver_balance: Decimal,
) -> Result<(Customer, Customer)> {
    let sender = Customer::open(engine, sender_balance).await?;
    let receiver = Customer::open(engine, receiver_balance).await?;
    Ok((sender, receiver))
}
