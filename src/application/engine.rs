use anyhow::anyhow;
use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use tracing::{error, info, warn};

use crate::domain::{
    build_integrity_report, cents_to_decimal, decimal_to_cents, Account, AccountType, Amount,
    AuditLogEntry, Cents, CustomerId, IntegrityReport, LedgerError, NewAuditEntry, Transaction,
    TransactionId, TransactionStatus, TransactionType, UserId,
};
use crate::storage::{Repository, UnitOfWork};

use super::audit::actions;
use super::{AppError, AuditLog, EngineConfig};

/// Attempts at finding an unused account number before giving up.
const ACCOUNT_NUMBER_ATTEMPTS: usize = 5;

/// Balance and daily-limit usage of one account.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BalanceView {
    pub account_number: String,
    pub balance: Decimal,
    pub daily_limit: Decimal,
    pub daily_used_today: Decimal,
}

/// Errors raised inside a unit of work: either a deterministic rejection
/// (nothing was changed) or a storage failure.
enum UnitError {
    Rejected(AppError),
    Storage(anyhow::Error),
}

impl From<anyhow::Error> for UnitError {
    fn from(err: anyhow::Error) -> Self {
        UnitError::Storage(err)
    }
}

/// Everything a transfer needs once both accounts are resolved and the
/// requester is known to own the source.
struct ValidatedTransfer<'a> {
    requester: CustomerId,
    client_ip: Option<&'a str>,
    source: &'a Account,
    target: &'a Account,
    amount: Amount,
    date: NaiveDate,
    record: Transaction,
}

/// Moves money between accounts, enforcing balance sufficiency and the daily
/// transfer limit, and keeps the audit trail.
///
/// The engine is cheap to clone and safe to share across tasks. It does not
/// deduplicate: two identical calls produce two transactions.
#[derive(Clone)]
pub struct TransferEngine {
    repo: Repository,
    audit: AuditLog,
    config: EngineConfig,
}

impl TransferEngine {
    pub fn new(repo: Repository, config: EngineConfig) -> Self {
        let audit = AuditLog::new(repo.clone(), config.storage_timeout);
        Self {
            repo,
            audit,
            config,
        }
    }

    /// Initialize a new database at the given path.
    pub async fn init(database_path: &str, config: EngineConfig) -> Result<Self, AppError> {
        let db_url = format!("sqlite:{}?mode=rwc", database_path);
        let repo = Repository::init(&db_url).await?;
        Ok(Self::new(repo, config))
    }

    /// Connect to an existing database.
    pub async fn connect(database_path: &str, config: EngineConfig) -> Result<Self, AppError> {
        let db_url = format!("sqlite:{}", database_path);
        let repo = Repository::connect(&db_url).await?;
        Ok(Self::new(repo, config))
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn repository(&self) -> &Repository {
        &self.repo
    }

    pub fn audit_log(&self) -> &AuditLog {
        &self.audit
    }

    /// Daily limit in effect for this engine.
    pub fn daily_limit(&self) -> Decimal {
        cents_to_decimal(self.config.daily_limit)
    }

    // ========================
    // Transfers
    // ========================

    /// Move `amount` from `source_number` to `target_number` on behalf of `requester`.
    pub async fn transfer(
        &self,
        requester: CustomerId,
        source_number: &str,
        target_number: &str,
        amount: Decimal,
        description: Option<String>,
    ) -> Result<TransactionId, AppError> {
        self.transfer_at(
            requester,
            source_number,
            target_number,
            amount,
            description,
            Utc::now(),
        )
        .await
    }

    /// Same as [`transfer`](Self::transfer) with an explicit timestamp. The
    /// daily limit applies to the UTC calendar day of `at`.
    pub async fn transfer_at(
        &self,
        requester: CustomerId,
        source_number: &str,
        target_number: &str,
        amount: Decimal,
        description: Option<String>,
        at: DateTime<Utc>,
    ) -> Result<TransactionId, AppError> {
        self.transfer_from(
            requester,
            source_number,
            target_number,
            amount,
            description,
            at,
            None,
        )
        .await
    }

    /// Same as [`transfer_at`](Self::transfer_at), stamping `client_ip` on
    /// every audit entry the attempt produces.
    pub async fn transfer_from(
        &self,
        requester: CustomerId,
        source_number: &str,
        target_number: &str,
        amount: Decimal,
        description: Option<String>,
        at: DateTime<Utc>,
        client_ip: Option<&str>,
    ) -> Result<TransactionId, AppError> {
        let result = self
            .try_transfer(
                requester,
                source_number,
                target_number,
                amount,
                description,
                at,
                client_ip,
            )
            .await;

        if let Err(err) = &result {
            if err.is_rejection() {
                warn!(
                    requester = %requester,
                    source = source_number,
                    target = target_number,
                    amount = %amount,
                    reason = err.kind(),
                    "transfer rejected: {}",
                    err
                );
                if self.config.audit_rejections {
                    let entry = NewAuditEntry::new(Some(requester), actions::TRANSFER_REJECTED)
                        .detail("source", source_number)
                        .detail("target", target_number)
                        .detail("amount", amount.to_string())
                        .detail("reason", err.kind())
                        .detail("message", err.to_string())
                        .with_ip(client_ip.map(str::to_string))
                        .at(at);
                    self.audit.record(entry).await;
                }
            }
        }

        result
    }

    async fn try_transfer(
        &self,
        requester: CustomerId,
        source_number: &str,
        target_number: &str,
        amount: Decimal,
        description: Option<String>,
        at: DateTime<Utc>,
        client_ip: Option<&str>,
    ) -> Result<TransactionId, AppError> {
        let amount = Amount::from_decimal(amount)?;

        let source = self
            .resolve_account(requester, source_number, at, client_ip)
            .await?;
        let target = self
            .resolve_account(requester, target_number, at, client_ip)
            .await?;

        if !source.is_owned_by(requester) {
            return Err(AppError::Forbidden(format!(
                "You do not own account {}",
                source.account_number
            )));
        }
        // A self-transfer would consume daily limit without moving money.
        if source.id == target.id {
            return Err(AppError::SameAccount);
        }

        let transfer = ValidatedTransfer {
            requester,
            client_ip,
            source: &source,
            target: &target,
            amount,
            date: at.date_naive(),
            record: Transaction::transfer(source.id, target.id, amount, at)
                .with_description(description),
        };

        let staged =
            match tokio::time::timeout(self.config.storage_timeout, self.stage_transfer(&transfer))
                .await
            {
                Ok(result) => result,
                Err(_) => Err(UnitError::Storage(anyhow!(
                    "transfer unit of work timed out after {:?}",
                    self.config.storage_timeout
                ))),
            };

        // The commit runs outside the timeout: once issued it is never
        // abandoned, so its result is the transfer's result.
        let outcome = match staged {
            Ok((uow, daily_used)) => uow
                .commit()
                .await
                .map(|()| daily_used)
                .map_err(UnitError::Storage),
            Err(err) => Err(err),
        };

        match outcome {
            Ok(daily_used) => {
                info!(
                    transaction_id = %transfer.record.id,
                    source = %source.account_number,
                    target = %target.account_number,
                    amount = %amount,
                    daily_used = daily_used,
                    "transfer committed"
                );
                Ok(transfer.record.id)
            }
            Err(UnitError::Rejected(err)) => Err(err),
            Err(UnitError::Storage(cause)) => {
                self.record_failed_transfer(&transfer, &cause).await;
                Err(AppError::Internal(cause))
            }
        }
    }

    /// Tracker upsert, limit and balance checks, and all writes of one unit,
    /// stopping short of the commit. Returns the open unit and the source
    /// account's daily total after the transfer.
    async fn stage_transfer(
        &self,
        transfer: &ValidatedTransfer<'_>,
    ) -> Result<(UnitOfWork, Cents), UnitError> {
        let amount = transfer.amount;
        let mut uow = self.repo.begin().await?;

        // Must stay the first statement: it takes the write lock for the unit.
        let mut tracker = uow
            .get_or_create_tracker(transfer.source.id, transfer.date)
            .await?;

        if tracker.would_exceed(amount, self.config.daily_limit) {
            uow.rollback().await?;
            return Err(UnitError::Rejected(AppError::DailyLimitExceeded {
                limit: self.config.daily_limit,
                used: tracker.transacted_cents,
                requested: amount.cents(),
            }));
        }

        let mut source = uow.load_account(transfer.source.id).await?;
        match source.debit(amount) {
            Ok(()) => {}
            Err(LedgerError::InsufficientFunds { balance, required }) => {
                uow.rollback().await?;
                return Err(UnitError::Rejected(AppError::InsufficientFunds {
                    account_number: source.account_number,
                    balance,
                    required,
                }));
            }
            Err(other) => return Err(UnitError::Storage(anyhow!(other))),
        }

        let mut target = uow.load_account(transfer.target.id).await?;
        target.credit(amount).map_err(|e| anyhow!(e))?;

        uow.store_balance(&source).await?;
        let credited = uow.add_to_balance(target.id, amount).await?;
        debug_assert_eq!(credited, target.balance_cents);

        tracker.record(amount);
        uow.add_to_tracker(transfer.source.id, transfer.date, amount)
            .await?;

        uow.insert_transaction(&transfer.record).await?;

        let entry = NewAuditEntry::new(Some(transfer.requester), actions::TRANSFER_SUCCESS)
            .detail("source", transfer.source.account_number.as_str())
            .detail("target", transfer.target.account_number.as_str())
            .detail("amount", amount.to_decimal().to_string())
            .detail("txn_id", transfer.record.id.to_string())
            .with_ip(transfer.client_ip.map(str::to_string))
            .at(transfer.record.timestamp);
        uow.insert_audit_entry(&entry).await?;

        Ok((uow, tracker.transacted_cents))
    }

    /// Best-effort record of a transfer whose unit of work did not commit.
    /// Nothing here may replace the original error returned to the caller.
    async fn record_failed_transfer(&self, transfer: &ValidatedTransfer<'_>, cause: &anyhow::Error) {
        error!(
            source = %transfer.source.account_number,
            target = %transfer.target.account_number,
            amount = %transfer.amount,
            error = %format!("{cause:#}"),
            "transfer failed after validation"
        );

        let failed = transfer.record.failed_copy();
        let saved = match self.bounded(self.repo.save_transaction(&failed)).await {
            Ok(()) => true,
            Err(err) => {
                warn!(error = %format!("{err:#}"), "could not record failed transaction");
                false
            }
        };

        let mut entry = NewAuditEntry::new(Some(transfer.requester), actions::TRANSFER_FAILED)
            .detail("source", transfer.source.account_number.as_str())
            .detail("target", transfer.target.account_number.as_str())
            .detail("amount", transfer.amount.to_decimal().to_string())
            .detail("error", format!("{cause:#}"))
            .with_ip(transfer.client_ip.map(str::to_string));
        if saved {
            entry = entry.detail("txn_id", failed.id.to_string());
        }
        self.audit.record(entry).await;
    }

    // ========================
    // Queries
    // ========================

    /// Current balance plus today's daily-limit usage. Never creates a tracker.
    pub async fn get_balance(
        &self,
        requester: CustomerId,
        account_number: &str,
    ) -> Result<BalanceView, AppError> {
        self.get_balance_at(requester, account_number, Utc::now())
            .await
    }

    /// Same as [`get_balance`](Self::get_balance) for the UTC day of `at`.
    pub async fn get_balance_at(
        &self,
        requester: CustomerId,
        account_number: &str,
        at: DateTime<Utc>,
    ) -> Result<BalanceView, AppError> {
        let account = self.owned_account(requester, account_number).await?;

        let daily_used = self
            .bounded(self.repo.find_tracker(account.id, at.date_naive()))
            .await
            .map_err(internal)?
            .map(|t| t.transacted_cents)
            .unwrap_or(0);

        Ok(BalanceView {
            account_number: account.account_number,
            balance: cents_to_decimal(account.balance_cents),
            daily_limit: self.daily_limit(),
            daily_used_today: cents_to_decimal(daily_used),
        })
    }

    /// Transactions touching an account the requester owns, newest first.
    pub async fn list_transactions(
        &self,
        requester: CustomerId,
        account_number: &str,
        limit: Option<usize>,
    ) -> Result<Vec<Transaction>, AppError> {
        let account = self.owned_account(requester, account_number).await?;
        self.bounded(self.repo.list_transactions_for_account(account.id, limit))
            .await
            .map_err(internal)
    }

    /// Look up an account by number without an ownership check.
    pub async fn account(&self, account_number: &str) -> Result<Account, AppError> {
        self.bounded(self.repo.get_account_by_number(account_number))
            .await
            .map_err(internal)?
            .ok_or_else(|| AppError::AccountNotFound(account_number.to_string()))
    }

    /// Accounts of one customer, or every account.
    pub async fn list_accounts(
        &self,
        customer_id: Option<CustomerId>,
    ) -> Result<Vec<Account>, AppError> {
        self.bounded(self.repo.list_accounts(customer_id))
            .await
            .map_err(internal)
    }

    /// Newest audit entries first.
    pub async fn recent_audit_entries(&self, limit: usize) -> Result<Vec<AuditLogEntry>, AppError> {
        self.bounded(self.audit.recent(limit)).await.map_err(internal)
    }

    /// Audit entries referencing a transaction, oldest first.
    pub async fn audit_entries_for_transaction(
        &self,
        transaction_id: TransactionId,
    ) -> Result<Vec<AuditLogEntry>, AppError> {
        self.bounded(self.audit.entries_for_transaction(transaction_id))
            .await
            .map_err(internal)
    }

    /// Cross-check balances and trackers against the transaction log.
    pub async fn check_integrity(&self) -> Result<IntegrityReport, AppError> {
        let report = self
            .bounded(async {
                let accounts = self.repo.list_accounts(None).await?;
                let trackers = self.repo.list_trackers().await?;
                let totals = self.repo.sum_successful_transfers_by_day().await?;
                let transaction_count = self.repo.count_transactions().await?;
                Ok::<_, anyhow::Error>(build_integrity_report(
                    &accounts,
                    &trackers,
                    &totals,
                    transaction_count,
                    self.config.daily_limit,
                ))
            })
            .await
            .map_err(internal)?;

        if !report.is_healthy() {
            warn!(issues = report.issues.len(), "ledger integrity check found issues");
        }
        Ok(report)
    }

    // ========================
    // Account lifecycle
    // ========================

    /// Open an account for `customer_id`. A positive `initial_deposit` is
    /// recorded as a `Deposit` transaction in the same unit of work.
    pub async fn open_account(
        &self,
        customer_id: CustomerId,
        account_type: AccountType,
        initial_deposit: Decimal,
    ) -> Result<Account, AppError> {
        let opening_cents = decimal_to_cents(initial_deposit)
            .ok_or_else(|| AppError::InvalidAmount(format!("amount out of range: {}", initial_deposit)))?;
        if opening_cents < 0 {
            return Err(AppError::InvalidAmount(format!(
                "initial deposit cannot be negative, got {}",
                initial_deposit
            )));
        }

        let opening = Amount::from_cents(opening_cents).ok();

        let (uow, account) = self
            .bounded(async {
                for _ in 0..ACCOUNT_NUMBER_ATTEMPTS {
                    let candidate =
                        Account::new(customer_id, account_type).with_balance(opening_cents);
                    if self.repo.account_number_exists(&candidate.account_number).await? {
                        continue;
                    }

                    let mut uow = self.repo.begin().await?;
                    uow.insert_account(&candidate).await?;
                    if let Some(opening) = opening {
                        let deposit = Transaction::new(
                            candidate.id,
                            candidate.id,
                            opening,
                            TransactionType::Deposit,
                            TransactionStatus::Success,
                            candidate.created_at,
                        )
                        .with_description(Some("Opening deposit".to_string()));
                        uow.insert_transaction(&deposit).await?;
                    }
                    return Ok::<_, anyhow::Error>((uow, candidate));
                }
                Err(anyhow!(
                    "no free account number after {} attempts",
                    ACCOUNT_NUMBER_ATTEMPTS
                ))
            })
            .await
            .map_err(internal)?;
        uow.commit().await.map_err(internal)?;

        info!(
            customer = %customer_id,
            account_number = %account.account_number,
            account_type = %account.account_type,
            "account opened"
        );
        self.audit
            .record(
                NewAuditEntry::new(Some(customer_id), actions::ACCOUNT_OPENED)
                    .detail("account_number", account.account_number.as_str())
                    .detail("account_type", account.account_type.as_str())
                    .detail("initial_deposit", cents_to_decimal(opening_cents).to_string()),
            )
            .await;

        Ok(account)
    }

    /// Credit loan proceeds to an account. Records a `Deposit` transaction
    /// whose source and target are the credited account; the daily limit does
    /// not apply.
    pub async fn disburse_loan(
        &self,
        actor: Option<UserId>,
        account_number: &str,
        amount: Decimal,
    ) -> Result<TransactionId, AppError> {
        let amount = Amount::from_decimal(amount)?;
        let account = self.account(account_number).await?;

        let record = Transaction::new(
            account.id,
            account.id,
            amount,
            TransactionType::Deposit,
            TransactionStatus::Success,
            Utc::now(),
        )
        .with_description(Some("Loan disbursement".to_string()));

        let staged = self
            .bounded(async {
                let mut uow = self.repo.begin().await?;
                let balance = uow.add_to_balance(account.id, amount).await?;
                uow.insert_transaction(&record).await?;
                uow.insert_audit_entry(
                    &NewAuditEntry::new(actor, actions::LOAN_DISBURSED)
                        .detail("account_number", account.account_number.as_str())
                        .detail("amount", amount.to_decimal().to_string())
                        .detail("txn_id", record.id.to_string()),
                )
                .await?;
                Ok::<_, anyhow::Error>((uow, balance))
            })
            .await;
        let committed = match staged {
            Ok((uow, balance)) => uow.commit().await.map(|()| balance),
            Err(err) => Err(err),
        };

        match committed {
            Ok(balance) => {
                info!(
                    account_number = %account.account_number,
                    amount = %amount,
                    balance = balance,
                    "loan disbursed"
                );
                Ok(record.id)
            }
            Err(cause) => {
                self.audit
                    .record(
                        NewAuditEntry::new(actor, actions::LOAN_DISBURSEMENT_FAILED)
                            .detail("account_number", account.account_number.as_str())
                            .detail("amount", amount.to_decimal().to_string())
                            .detail("error", format!("{cause:#}")),
                    )
                    .await;
                Err(internal(cause))
            }
        }
    }

    // ========================
    // Helpers
    // ========================

    async fn resolve_account(
        &self,
        requester: CustomerId,
        account_number: &str,
        at: DateTime<Utc>,
        client_ip: Option<&str>,
    ) -> Result<Account, AppError> {
        match self
            .bounded(self.repo.get_account_by_number(account_number))
            .await
        {
            Ok(Some(account)) => Ok(account),
            Ok(None) => Err(AppError::AccountNotFound(account_number.to_string())),
            Err(cause) => {
                self.audit
                    .record(
                        NewAuditEntry::new(Some(requester), actions::TRANSFER_FAILED)
                            .detail("account_number", account_number)
                            .detail("error", format!("{cause:#}"))
                            .with_ip(client_ip.map(str::to_string))
                            .at(at),
                    )
                    .await;
                Err(internal(cause))
            }
        }
    }

    async fn owned_account(
        &self,
        requester: CustomerId,
        account_number: &str,
    ) -> Result<Account, AppError> {
        let account = self.account(account_number).await?;

        if !account.is_owned_by(requester) {
            return Err(AppError::Forbidden(format!(
                "Account {} does not belong to the requester",
                account_number
            )));
        }
        Ok(account)
    }

    /// Run a storage call under the configured timeout.
    async fn bounded<T>(&self, fut: impl Future<Output = anyhow::Result<T>>) -> anyhow::Result<T> {
        match tokio::time::timeout(self.config.storage_timeout, fut).await {
            Ok(result) => result,
            Err(_) => Err(anyhow!(
                "storage call timed out after {:?}",
                self.config.storage_timeout
            )),
        }
    }
}

/// Log a storage failure and turn it into the opaque caller-facing error.
fn internal(err: anyhow::Error) -> AppError {
    error!(error = %format!("{err:#}"), "storage failure");
    AppError::Internal(err)
}
