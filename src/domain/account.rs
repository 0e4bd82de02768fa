use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{Amount, Cents};

pub type AccountId = Uuid;
pub type CustomerId = Uuid;

/// Length of the human-facing account number.
pub const ACCOUNT_NUMBER_LEN: usize = 16;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AccountType {
    Saving,
    Current,
    /// Fixed deposit
    FD,
}

impl AccountType {
    pub fn as_str(&self) -> &'static str {
        match self {
            AccountType::Saving => "Saving",
            AccountType::Current => "Current",
            AccountType::FD => "FD",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "saving" => Some(AccountType::Saving),
            "current" => Some(AccountType::Current),
            "fd" => Some(AccountType::FD),
            _ => None,
        }
    }
}

impl std::fmt::Display for AccountType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Account {
    pub id: AccountId,
    pub customer_id: CustomerId,
    pub account_number: String,
    pub account_type: AccountType,
    /// Current balance in cents, never negative
    pub balance_cents: Cents,
    pub created_at: DateTime<Utc>,
}

impl Account {
    pub fn new(customer_id: CustomerId, account_type: AccountType) -> Self {
        Self {
            id: Uuid::new_v4(),
            customer_id,
            account_number: generate_account_number(),
            account_type,
            balance_cents: 0,
            created_at: Utc::now(),
        }
    }

    pub fn with_balance(mut self, balance_cents: Cents) -> Self {
        assert!(balance_cents >= 0, "Account balance cannot be negative");
        self.balance_cents = balance_cents;
        self
    }

    pub fn is_owned_by(&self, customer_id: CustomerId) -> bool {
        self.customer_id == customer_id
    }

    /// Take `amount` out of the account, refusing to go below zero.
    pub fn debit(&mut self, amount: Amount) -> Result<(), LedgerError> {
        if self.balance_cents < amount.cents() {
            return Err(LedgerError::InsufficientFunds {
                balance: self.balance_cents,
                required: amount.cents(),
            });
        }
        self.balance_cents -= amount.cents();
        Ok(())
    }

    /// Add `amount` to the account. There is no upper bound beyond `Cents` range.
    pub fn credit(&mut self, amount: Amount) -> Result<(), LedgerError> {
        self.balance_cents = self
            .balance_cents
            .checked_add(amount.cents())
            .ok_or(LedgerError::BalanceOverflow)?;
        Ok(())
    }
}

/// Account numbers are the first 16 decimal digits of a random 128-bit value.
pub fn generate_account_number() -> String {
    let digits = Uuid::new_v4().as_u128().to_string();
    // A u128 has at least 16 digits unless its top bits are all zero; pad the rare short case.
    format!("{:0<width$}", digits, width = ACCOUNT_NUMBER_LEN)[..ACCOUNT_NUMBER_LEN].to_string()
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LedgerError {
    InsufficientFunds { balance: Cents, required: Cents },
    BalanceOverflow,
}

impl std::fmt::Display for LedgerError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LedgerError::InsufficientFunds { balance, required } => write!(
                f,
                "insufficient funds: balance {} cents, required {} cents",
                balance, required
            ),
            LedgerError::BalanceOverflow => write!(f, "balance out of range"),
        }
    }
}

impl std::error::Error for LedgerError {}

#[cfg(test)]
mod tests {
    use super::*;

    fn account_with(balance: Cents) -> Account {
        Account::new(Uuid::new_v4(), AccountType::Saving).with_balance(balance)
    }

    #[test]
    fn test_account_type_roundtrip() {
        for at in [AccountType::Saving, AccountType::Current, AccountType::FD] {
            assert_eq!(AccountType::from_str(at.as_str()), Some(at));
        }
        assert_eq!(AccountType::from_str("checking"), None);
    }

    #[test]
    fn test_debit_exact_balance() {
        let mut account = account_with(10000);
        account.debit(Amount::from_cents(10000).unwrap()).unwrap();
        assert_eq!(account.balance_cents, 0);
    }

    #[test]
    fn test_debit_insufficient_funds_leaves_balance() {
        let mut account = account_with(10000);
        let result = account.debit(Amount::from_cents(10001).unwrap());
        assert_eq!(
            result,
            Err(LedgerError::InsufficientFunds {
                balance: 10000,
                required: 10001
            })
        );
        assert_eq!(account.balance_cents, 10000);
    }

    #[test]
    fn test_credit_is_unbounded_until_overflow() {
        let mut account = account_with(0);
        account.credit(Amount::from_cents(250).unwrap()).unwrap();
        assert_eq!(account.balance_cents, 250);

        let mut full = account_with(Cents::MAX);
        assert_eq!(
            full.credit(Amount::from_cents(1).unwrap()),
            Err(LedgerError::BalanceOverflow)
        );
    }

    #[test]
    fn test_account_number_shape() {
        let number = generate_account_number();
        assert_eq!(number.len(), ACCOUNT_NUMBER_LEN);
        assert!(number.chars().all(|c| c.is_ascii_digit()));
    }

    #[test]
    fn test_ownership() {
        let owner = Uuid::new_v4();
        let account = Account::new(owner, AccountType::Current);
        assert!(account.is_owned_by(owner));
        assert!(!account.is_owned_by(Uuid::new_v4()));
    }
}
