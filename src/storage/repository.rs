use std::collections::HashMap;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::{DateTime, NaiveDate, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteRow};
use sqlx::{Executor, Row, Sqlite, SqlitePool};
use tracing::debug;
use uuid::Uuid;

use crate::domain::{
    Account, AccountId, AccountType, AuditDetails, AuditLogEntry, Cents, CustomerId,
    DailyLimitTracker, NewAuditEntry, Transaction, TransactionId, TransactionStatus,
    TransactionType,
};

use super::{UnitOfWork, MIGRATION_001_INITIAL};

/// How long a connection waits on SQLite's write lock before giving up.
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

const MAX_CONNECTIONS: u32 = 8;

pub(crate) const ACCOUNT_COLUMNS: &str =
    "id, customer_id, account_number, account_type, balance_cents, created_at";

const TRANSACTION_COLUMNS: &str = "id, source_account_id, target_account_id, amount_cents, transaction_type, status, timestamp, description";

/// Repository for persisting and querying accounts, transactions, trackers and audit entries.
#[derive(Clone)]
pub struct Repository {
    pool: SqlitePool,
}

impl Repository {
    /// Create a new repository with the given SQLite connection pool.
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Connect to a SQLite database, creating the file if it doesn't exist.
    pub async fn connect(database_url: &str) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(database_url)
            .context("Invalid database URL")?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .foreign_keys(true)
            .busy_timeout(BUSY_TIMEOUT);

        let pool = SqlitePoolOptions::new()
            .max_connections(MAX_CONNECTIONS)
            .connect_with(options)
            .await
            .context("Failed to connect to database")?;
        debug!(database_url, "database pool ready");
        Ok(Self::new(pool))
    }

    /// Run database migrations.
    pub async fn migrate(&self) -> Result<()> {
        sqlx::query(MIGRATION_001_INITIAL)
            .execute(&self.pool)
            .await
            .context("Failed to run migration 001")?;
        debug!("schema migrated");
        Ok(())
    }

    /// Initialize a database (connect + migrate).
    pub async fn init(database_url: &str) -> Result<Self> {
        let repo = Self::connect(database_url).await?;
        repo.migrate().await?;
        Ok(repo)
    }

    /// The underlying pool, for callers that need raw access (maintenance, tests).
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Start a unit of work. Nothing it writes is visible until it commits.
    pub async fn begin(&self) -> Result<UnitOfWork> {
        let tx = self
            .pool
            .begin()
            .await
            .context("Failed to begin unit of work")?;
        Ok(UnitOfWork::new(tx))
    }

    // ========================
    // Account operations
    // ========================

    /// Get an account by its account number.
    pub async fn get_account_by_number(&self, account_number: &str) -> Result<Option<Account>> {
        let row = sqlx::query(&format!(
            "SELECT {ACCOUNT_COLUMNS} FROM accounts WHERE account_number = ?"
        ))
        .bind(account_number)
        .fetch_optional(&self.pool)
        .await
        .context("Failed to fetch account by number")?;

        row.as_ref().map(row_to_account).transpose()
    }

    /// Whether an account number is already taken.
    pub async fn account_number_exists(&self, account_number: &str) -> Result<bool> {
        Ok(self.get_account_by_number(account_number).await?.is_some())
    }

    /// List all accounts, or only those of one customer.
    pub async fn list_accounts(&self, customer_id: Option<CustomerId>) -> Result<Vec<Account>> {
        let rows = match customer_id {
            Some(customer) => sqlx::query(&format!(
                "SELECT {ACCOUNT_COLUMNS} FROM accounts WHERE customer_id = ? ORDER BY created_at, account_number"
            ))
            .bind(customer.to_string())
            .fetch_all(&self.pool)
            .await,
            None => sqlx::query(&format!(
                "SELECT {ACCOUNT_COLUMNS} FROM accounts ORDER BY created_at, account_number"
            ))
            .fetch_all(&self.pool)
            .await,
        }
        .context("Failed to list accounts")?;

        rows.iter().map(row_to_account).collect()
    }

    // ========================
    // Transaction operations
    // ========================

    /// Save a transaction in its own commit.
    pub async fn save_transaction(&self, transaction: &Transaction) -> Result<()> {
        insert_transaction(&self.pool, transaction).await
    }

    /// Get a transaction by ID.
    pub async fn get_transaction(&self, id: TransactionId) -> Result<Option<Transaction>> {
        let row = sqlx::query(&format!(
            "SELECT {TRANSACTION_COLUMNS} FROM transactions WHERE id = ?"
        ))
        .bind(id.to_string())
        .fetch_optional(&self.pool)
        .await
        .context("Failed to fetch transaction")?;

        row.as_ref().map(row_to_transaction).transpose()
    }

    /// List transactions touching an account (as source or target), newest first.
    pub async fn list_transactions_for_account(
        &self,
        account_id: AccountId,
        limit: Option<usize>,
    ) -> Result<Vec<Transaction>> {
        let mut query = format!(
            "SELECT {TRANSACTION_COLUMNS} FROM transactions WHERE source_account_id = ? OR target_account_id = ? ORDER BY timestamp DESC, rowid DESC"
        );
        if let Some(lim) = limit {
            query.push_str(&format!(" LIMIT {}", lim));
        }

        let account_id_str = account_id.to_string();
        let rows = sqlx::query(&query)
            .bind(&account_id_str)
            .bind(&account_id_str)
            .fetch_all(&self.pool)
            .await
            .context("Failed to list transactions for account")?;

        rows.iter().map(row_to_transaction).collect()
    }

    /// List every transaction, oldest first.
    pub async fn list_transactions(&self) -> Result<Vec<Transaction>> {
        let rows = sqlx::query(&format!(
            "SELECT {TRANSACTION_COLUMNS} FROM transactions ORDER BY timestamp, rowid"
        ))
        .fetch_all(&self.pool)
        .await
        .context("Failed to list transactions")?;

        rows.iter().map(row_to_transaction).collect()
    }

    pub async fn count_transactions(&self) -> Result<i64> {
        let row = sqlx::query("SELECT COUNT(*) as count FROM transactions")
            .fetch_one(&self.pool)
            .await
            .context("Failed to count transactions")?;
        Ok(row.get("count"))
    }

    /// Sum of successful transfers per (source account, UTC day).
    pub async fn sum_successful_transfers_by_day(
        &self,
    ) -> Result<HashMap<(AccountId, NaiveDate), Cents>> {
        let rows = sqlx::query(
            r#"
            SELECT source_account_id, substr(timestamp, 1, 10) as day, SUM(amount_cents) as total
            FROM transactions
            WHERE transaction_type = 'Transfer' AND status = 'Success'
            GROUP BY source_account_id, day
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .context("Failed to sum transfers by day")?;

        let mut totals = HashMap::new();
        for row in rows {
            let account_str: String = row.get("source_account_id");
            let day_str: String = row.get("day");
            let total: Cents = row.get("total");
            let account_id = Uuid::parse_str(&account_str).context("Invalid account ID")?;
            let day = parse_day(&day_str)?;
            totals.insert((account_id, day), total);
        }
        Ok(totals)
    }

    // ========================
    // Daily limit tracker operations
    // ========================

    /// Read a tracker without creating it.
    pub async fn find_tracker(
        &self,
        account_id: AccountId,
        date: NaiveDate,
    ) -> Result<Option<DailyLimitTracker>> {
        find_tracker(&self.pool, account_id, date).await
    }

    pub async fn list_trackers(&self) -> Result<Vec<DailyLimitTracker>> {
        let rows = sqlx::query(
            "SELECT account_id, tracker_date, transacted_cents FROM daily_limit_trackers ORDER BY tracker_date, account_id",
        )
        .fetch_all(&self.pool)
        .await
        .context("Failed to list trackers")?;

        rows.iter().map(row_to_tracker).collect()
    }

    // ========================
    // Audit operations
    // ========================

    /// Append an audit entry in its own commit and return its id.
    pub async fn append_audit_entry(&self, entry: &NewAuditEntry) -> Result<i64> {
        insert_audit_entry(&self.pool, entry).await
    }

    /// Most recent audit entries, newest first.
    pub async fn recent_audit_entries(&self, limit: usize) -> Result<Vec<AuditLogEntry>> {
        let rows = sqlx::query(
            r#"
            SELECT id, actor_id, timestamp, action, details, ip_address
            FROM audit_log
            ORDER BY id DESC
            LIMIT ?
            "#,
        )
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await
        .context("Failed to fetch audit entries")?;

        rows.iter().map(row_to_audit_entry).collect()
    }

    /// Audit entries whose detail payload references a transaction id, oldest first.
    pub async fn audit_entries_for_transaction(
        &self,
        transaction_id: TransactionId,
    ) -> Result<Vec<AuditLogEntry>> {
        let rows = sqlx::query(
            r#"
            SELECT id, actor_id, timestamp, action, details, ip_address
            FROM audit_log
            WHERE json_extract(details, '$.txn_id') = ?
            ORDER BY id
            "#,
        )
        .bind(transaction_id.to_string())
        .fetch_all(&self.pool)
        .await
        .context("Failed to fetch audit entries for transaction")?;

        rows.iter().map(row_to_audit_entry).collect()
    }
}

// ========================
// Statements shared by the pool and units of work
// ========================

pub(crate) async fn insert_account<'e, E>(executor: E, account: &Account) -> Result<()>
where
    E: Executor<'e, Database = Sqlite>,
{
    sqlx::query(
        r#"
        INSERT INTO accounts (id, customer_id, account_number, account_type, balance_cents, created_at)
        VALUES (?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(account.id.to_string())
    .bind(account.customer_id.to_string())
    .bind(&account.account_number)
    .bind(account.account_type.as_str())
    .bind(account.balance_cents)
    .bind(account.created_at.to_rfc3339())
    .execute(executor)
    .await
    .context("Failed to save account")?;
    Ok(())
}

pub(crate) async fn insert_transaction<'e, E>(executor: E, transaction: &Transaction) -> Result<()>
where
    E: Executor<'e, Database = Sqlite>,
{
    sqlx::query(
        r#"
        INSERT INTO transactions (id, source_account_id, target_account_id, amount_cents, transaction_type, status, timestamp, description)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(transaction.id.to_string())
    .bind(transaction.source_account.to_string())
    .bind(transaction.target_account.to_string())
    .bind(transaction.amount_cents)
    .bind(transaction.transaction_type.as_str())
    .bind(transaction.status.as_str())
    .bind(transaction.timestamp.to_rfc3339())
    .bind(&transaction.description)
    .execute(executor)
    .await
    .context("Failed to save transaction")?;
    Ok(())
}

pub(crate) async fn insert_audit_entry<'e, E>(executor: E, entry: &NewAuditEntry) -> Result<i64>
where
    E: Executor<'e, Database = Sqlite>,
{
    let details_json = serde_json::to_string(&entry.details)?;

    let row = sqlx::query(
        r#"
        INSERT INTO audit_log (actor_id, timestamp, action, details, ip_address)
        VALUES (?, ?, ?, ?, ?)
        RETURNING id
        "#,
    )
    .bind(entry.actor.map(|id| id.to_string()))
    .bind(entry.timestamp.to_rfc3339())
    .bind(&entry.action)
    .bind(&details_json)
    .bind(&entry.ip_address)
    .fetch_one(executor)
    .await
    .context("Failed to append audit entry")?;

    Ok(row.get("id"))
}

pub(crate) async fn find_tracker<'e, E>(
    executor: E,
    account_id: AccountId,
    date: NaiveDate,
) -> Result<Option<DailyLimitTracker>>
where
    E: Executor<'e, Database = Sqlite>,
{
    let row = sqlx::query(
        r#"
        SELECT account_id, tracker_date, transacted_cents
        FROM daily_limit_trackers
        WHERE account_id = ? AND tracker_date = ?
        "#,
    )
    .bind(account_id.to_string())
    .bind(date.to_string())
    .fetch_optional(executor)
    .await
    .context("Failed to fetch daily limit tracker")?;

    row.as_ref().map(row_to_tracker).transpose()
}

// ========================
// Row mapping
// ========================

pub(crate) fn row_to_account(row: &SqliteRow) -> Result<Account> {
    let id_str: String = row.get("id");
    let customer_str: String = row.get("customer_id");
    let account_type_str: String = row.get("account_type");
    let created_at_str: String = row.get("created_at");

    Ok(Account {
        id: Uuid::parse_str(&id_str).context("Invalid account ID")?,
        customer_id: Uuid::parse_str(&customer_str).context("Invalid customer ID")?,
        account_number: row.get("account_number"),
        account_type: AccountType::from_str(&account_type_str)
            .ok_or_else(|| anyhow::anyhow!("Invalid account type: {}", account_type_str))?,
        balance_cents: row.get("balance_cents"),
        created_at: parse_timestamp(&created_at_str).context("Invalid created_at timestamp")?,
    })
}

fn row_to_transaction(row: &SqliteRow) -> Result<Transaction> {
    let id_str: String = row.get("id");
    let source_str: String = row.get("source_account_id");
    let target_str: String = row.get("target_account_id");
    let type_str: String = row.get("transaction_type");
    let status_str: String = row.get("status");
    let timestamp_str: String = row.get("timestamp");

    Ok(Transaction {
        id: Uuid::parse_str(&id_str).context("Invalid transaction ID")?,
        source_account: Uuid::parse_str(&source_str).context("Invalid source account ID")?,
        target_account: Uuid::parse_str(&target_str).context("Invalid target account ID")?,
        amount_cents: row.get("amount_cents"),
        transaction_type: TransactionType::from_str(&type_str)
            .ok_or_else(|| anyhow::anyhow!("Invalid transaction type: {}", type_str))?,
        status: TransactionStatus::from_str(&status_str)
            .ok_or_else(|| anyhow::anyhow!("Invalid transaction status: {}", status_str))?,
        timestamp: parse_timestamp(&timestamp_str).context("Invalid timestamp")?,
        description: row.get("description"),
    })
}

pub(crate) fn row_to_tracker(row: &SqliteRow) -> Result<DailyLimitTracker> {
    let account_str: String = row.get("account_id");
    let date_str: String = row.get("tracker_date");

    Ok(DailyLimitTracker {
        account_id: Uuid::parse_str(&account_str).context("Invalid account ID")?,
        date: parse_day(&date_str)?,
        transacted_cents: row.get("transacted_cents"),
    })
}

fn row_to_audit_entry(row: &SqliteRow) -> Result<AuditLogEntry> {
    let actor_str: Option<String> = row.get("actor_id");
    let timestamp_str: String = row.get("timestamp");
    let details_json: String = row.get("details");

    Ok(AuditLogEntry {
        id: row.get("id"),
        actor: actor_str
            .map(|s| Uuid::parse_str(&s))
            .transpose()
            .context("Invalid actor ID")?,
        timestamp: parse_timestamp(&timestamp_str).context("Invalid timestamp")?,
        action: row.get("action"),
        details: serde_json::from_str::<AuditDetails>(&details_json)
            .context("Invalid audit details")?,
        ip_address: row.get("ip_address"),
    })
}

fn parse_timestamp(s: &str) -> Result<DateTime<Utc>> {
    Ok(DateTime::parse_from_rfc3339(s)?.with_timezone(&Utc))
}

fn parse_day(s: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(s, "%Y-%m-%d").with_context(|| format!("Invalid date: {}", s))
}
