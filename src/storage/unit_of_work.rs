use anyhow::{Context, Result};
use chrono::NaiveDate;
use sqlx::{Row, Sqlite};

use crate::domain::{
    Account, AccountId, Amount, Cents, DailyLimitTracker, NewAuditEntry, Transaction,
};

use super::repository::{
    find_tracker, insert_account, insert_audit_entry, insert_transaction, row_to_account, ACCOUNT_COLUMNS,
};

/// A single database transaction spanning all writes of one ledger operation.
///
/// Dropping a unit of work without calling [`UnitOfWork::commit`] rolls it back.
pub struct UnitOfWork {
    tx: sqlx::Transaction<'static, Sqlite>,
}

impl UnitOfWork {
    pub(crate) fn new(tx: sqlx::Transaction<'static, Sqlite>) -> Self {
        Self { tx }
    }

    /// Fetch the tracker for `(account_id, date)`, inserting a zeroed row first if none exists.
    ///
    /// The insert is a write, so when it is the first statement of the unit it
    /// also takes SQLite's write lock; every later read in the unit then sees
    /// state no concurrent writer can change before commit.
    pub async fn get_or_create_tracker(
        &mut self,
        account_id: AccountId,
        date: NaiveDate,
    ) -> Result<DailyLimitTracker> {
        sqlx::query(
            r#"
            INSERT INTO daily_limit_trackers (account_id, tracker_date, transacted_cents)
            VALUES (?, ?, 0)
            ON CONFLICT(account_id, tracker_date) DO NOTHING
            "#,
        )
        .bind(account_id.to_string())
        .bind(date.to_string())
        .execute(&mut *self.tx)
        .await
        .context("Failed to create daily limit tracker")?;

        find_tracker(&mut *self.tx, account_id, date)
            .await?
            .ok_or_else(|| anyhow::anyhow!("Tracker for {} on {} vanished", account_id, date))
    }

    /// Re-read an account inside the unit.
    pub async fn load_account(&mut self, id: AccountId) -> Result<Account> {
        let row = sqlx::query(&format!("SELECT {ACCOUNT_COLUMNS} FROM accounts WHERE id = ?"))
            .bind(id.to_string())
            .fetch_optional(&mut *self.tx)
            .await
            .context("Failed to load account")?
            .ok_or_else(|| anyhow::anyhow!("Account {} vanished", id))?;

        row_to_account(&row)
    }

    /// Persist a balance computed by the caller while holding the lock.
    pub async fn store_balance(&mut self, account: &Account) -> Result<()> {
        let result = sqlx::query("UPDATE accounts SET balance_cents = ? WHERE id = ?")
            .bind(account.balance_cents)
            .bind(account.id.to_string())
            .execute(&mut *self.tx)
            .await
            .context("Failed to store balance")?;

        if result.rows_affected() != 1 {
            anyhow::bail!("Account {} not updated", account.id);
        }
        Ok(())
    }

    /// Add to a balance in place, without a read-then-write round trip.
    pub async fn add_to_balance(&mut self, id: AccountId, amount: Amount) -> Result<Cents> {
        let row = sqlx::query(
            r#"
            UPDATE accounts
            SET balance_cents = balance_cents + ?
            WHERE id = ?
            RETURNING balance_cents
            "#,
        )
        .bind(amount.cents())
        .bind(id.to_string())
        .fetch_optional(&mut *self.tx)
        .await
        .context("Failed to credit account")?
        .ok_or_else(|| anyhow::anyhow!("Account {} not updated", id))?;

        Ok(row.get("balance_cents"))
    }

    /// Increase a tracker's running total.
    pub async fn add_to_tracker(
        &mut self,
        account_id: AccountId,
        date: NaiveDate,
        amount: Amount,
    ) -> Result<()> {
        let result = sqlx::query(
            r#"
            UPDATE daily_limit_trackers
            SET transacted_cents = transacted_cents + ?
            WHERE account_id = ? AND tracker_date = ?
            "#,
        )
        .bind(amount.cents())
        .bind(account_id.to_string())
        .bind(date.to_string())
        .execute(&mut *self.tx)
        .await
        .context("Failed to update daily limit tracker")?;

        if result.rows_affected() != 1 {
            anyhow::bail!("Tracker for {} on {} not updated", account_id, date);
        }
        Ok(())
    }

    pub async fn insert_account(&mut self, account: &Account) -> Result<()> {
        insert_account(&mut *self.tx, account).await
    }

    pub async fn insert_transaction(&mut self, transaction: &Transaction) -> Result<()> {
        insert_transaction(&mut *self.tx, transaction).await
    }

    pub async fn insert_audit_entry(&mut self, entry: &NewAuditEntry) -> Result<i64> {
        insert_audit_entry(&mut *self.tx, entry).await
    }

    pub async fn commit(self) -> Result<()> {
        self.tx.commit().await.context("Failed to commit unit of work")
    }

    pub async fn rollback(self) -> Result<()> {
        self.tx
            .rollback()
            .await
            .context("Failed to roll back unit of work")
    }
}
