use std::time::Duration;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use rust_decimal::Decimal;
use uuid::Uuid;

use crate::application::{EngineConfig, TransferEngine};
use crate::domain::{decimal_to_cents, format_cents, parse_amount, AccountType, Transaction};

/// Tellerline - account-to-account transfer ledger
#[derive(Parser)]
#[command(name = "tellerline")]
#[command(about = "Move money between accounts with daily limits and a full audit trail")]
#[command(version)]
pub struct Cli {
    /// Database file path
    #[arg(short, long, default_value = "tellerline.db", global = true)]
    pub database: String,

    /// Daily outgoing transfer limit per account (e.g. "50000.00")
    #[arg(long, global = true)]
    pub daily_limit: Option<String>,

    /// Timeout for each storage call, in milliseconds
    #[arg(long, global = true)]
    pub timeout_ms: Option<u64>,

    /// Emit logs as JSON lines on stderr
    #[arg(long, global = true)]
    pub log_json: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Initialize a new database
    Init,

    /// Account management commands
    #[command(subcommand)]
    Account(AccountCommands),

    /// Credit loan proceeds to an account
    Disburse {
        /// Account number to credit
        account: String,

        /// Amount to disburse (e.g., "1500.00")
        amount: String,

        /// Officer recording the disbursement
        #[arg(long)]
        actor: Option<Uuid>,
    },

    /// Transfer money between two accounts
    Transfer {
        /// Amount to transfer (e.g., "50.00" or "50")
        amount: String,

        /// Source account number
        #[arg(long)]
        from: String,

        /// Target account number
        #[arg(long)]
        to: String,

        /// Customer requesting the transfer (must own the source account)
        #[arg(long = "as")]
        requester: Uuid,

        /// Description of the transfer
        #[arg(short = 'm', long)]
        description: Option<String>,

        /// Date of the transfer (YYYY-MM-DD, defaults to now)
        #[arg(long)]
        date: Option<String>,

        /// Address the request came from, kept in the audit trail
        #[arg(long)]
        client_ip: Option<String>,
    },

    /// Show balance and today's transfer usage
    Balance {
        /// Account number
        account: String,

        /// Customer owning the account
        #[arg(long = "as")]
        requester: Uuid,
    },

    /// List transactions of an account, newest first
    History {
        /// Account number
        account: String,

        /// Customer owning the account
        #[arg(long = "as")]
        requester: Uuid,

        /// Maximum number of transactions to show
        #[arg(short, long)]
        limit: Option<usize>,
    },

    /// Show audit log entries
    Audit {
        /// Number of entries to show
        #[arg(short, long, default_value = "20")]
        limit: usize,

        /// Only entries referencing this transaction
        #[arg(long)]
        transaction: Option<Uuid>,
    },

    /// Cross-check balances and daily trackers against the transaction log
    Check,
}

#[derive(Subcommand)]
pub enum AccountCommands {
    /// Open a new account
    Open {
        /// Owning customer id
        #[arg(long)]
        customer: Uuid,

        /// Account type: saving, current, fd
        #[arg(short = 't', long = "type", default_value = "saving")]
        account_type: String,

        /// Opening deposit (e.g., "100.00")
        #[arg(long, default_value = "0")]
        deposit: String,
    },

    /// Show account details
    Show {
        /// Account number
        account: String,
    },

    /// List accounts
    List {
        /// Only accounts of this customer
        #[arg(long)]
        customer: Option<Uuid>,
    },
}

impl Cli {
    fn engine_config(&self) -> Result<EngineConfig> {
        let mut config = EngineConfig::default();

        if let Some(limit) = &self.daily_limit {
            let value = parse_amount(limit)?;
            let cents = decimal_to_cents(value)
                .filter(|c| *c >= 0)
                .ok_or_else(|| anyhow::anyhow!("Invalid daily limit '{}'", limit))?;
            config = config.with_daily_limit(cents);
        }
        if let Some(ms) = self.timeout_ms {
            config = config.with_storage_timeout(Duration::from_millis(ms));
        }

        Ok(config)
    }

    pub async fn run(self) -> Result<()> {
        let config = self.engine_config()?;

        if matches!(self.command, Commands::Init) {
            TransferEngine::init(&self.database, config).await?;
            println!("Database initialized: {}", self.database);
            return Ok(());
        }

        let engine = TransferEngine::connect(&self.database, config)
            .await
            .with_context(|| format!("Could not open database '{}'. Run 'init' first", self.database))?;

        match self.command {
            Commands::Init => unreachable!("handled above"),

            Commands::Account(account_cmd) => {
                run_account_command(&engine, account_cmd).await?;
            }

            Commands::Disburse {
                account,
                amount,
                actor,
            } => {
                let value = parse_amount(&amount)?;
                let txn_id = engine.disburse_loan(actor, &account, value).await?;
                println!("Disbursed {} to {} ({})", display_amount(value), account, txn_id);
            }

            Commands::Transfer {
                amount,
                from,
                to,
                requester,
                description,
                date,
                client_ip,
            } => {
                let value = parse_amount(&amount)?;
                let timestamp = match date {
                    Some(date_str) => parse_date(&date_str).with_context(|| {
                        format!("Invalid date format '{}'. Use YYYY-MM-DD", date_str)
                    })?,
                    None => Utc::now(),
                };

                let txn_id = engine
                    .transfer_from(
                        requester,
                        &from,
                        &to,
                        value,
                        description,
                        timestamp,
                        client_ip.as_deref(),
                    )
                    .await?;
                println!(
                    "Recorded transfer: {} {} -> {} ({})",
                    display_amount(value),
                    from,
                    to,
                    txn_id
                );
            }

            Commands::Balance { account, requester } => {
                let view = engine.get_balance(requester, &account).await?;
                println!("Account: {}", view.account_number);
                println!("  Balance:        {}", view.balance);
                println!("  Daily limit:    {}", view.daily_limit);
                println!("  Used today:     {}", view.daily_used_today);
                println!(
                    "  Remaining:      {}",
                    (view.daily_limit - view.daily_used_today).max(Decimal::ZERO)
                );
            }

            Commands::History {
                account,
                requester,
                limit,
            } => {
                let owner = engine.account(&account).await?;
                let transactions = engine.list_transactions(requester, &account, limit).await?;
                print_transactions(owner.id, &transactions);
            }

            Commands::Audit { limit, transaction } => {
                let entries = match transaction {
                    Some(id) => engine.audit_entries_for_transaction(id).await?,
                    None => engine.recent_audit_entries(limit).await?,
                };

                if entries.is_empty() {
                    println!("No audit entries found.");
                } else {
                    println!("{:<6} {:<20} {:<26} DETAILS", "ID", "TIMESTAMP", "ACTION");
                    println!("{}", "-".repeat(100));
                    for entry in entries {
                        println!(
                            "{:<6} {:<20} {:<26} {}",
                            entry.id,
                            entry.timestamp.format("%Y-%m-%d %H:%M:%S"),
                            entry.action,
                            serde_json::Value::Object(entry.details)
                        );
                    }
                }
            }

            Commands::Check => {
                let report = engine.check_integrity().await?;
                println!("Accounts:      {}", report.account_count);
                println!("Transactions:  {}", report.transaction_count);
                println!("Trackers:      {}", report.tracker_count);
                println!("Total balance: {}", format_cents(report.total_balance));
                println!();
                if report.is_healthy() {
                    println!("Ledger is consistent");
                } else {
                    println!("Found {} issue(s):", report.issues.len());
                    for issue in &report.issues {
                        println!("  - {}", issue);
                    }
                    anyhow::bail!("Integrity check failed");
                }
            }
        }

        Ok(())
    }
}

async fn run_account_command(engine: &TransferEngine, cmd: AccountCommands) -> Result<()> {
    match cmd {
        AccountCommands::Open {
            customer,
            account_type,
            deposit,
        } => {
            let at = AccountType::from_str(&account_type).ok_or_else(|| {
                anyhow::anyhow!(
                    "Invalid account type '{}'. Valid types: saving, current, fd",
                    account_type
                )
            })?;
            let opening = parse_amount(&deposit)?;

            let account = engine.open_account(customer, at, opening).await?;
            println!(
                "Opened {} account {} with balance {}",
                account.account_type,
                account.account_number,
                format_cents(account.balance_cents)
            );
        }

        AccountCommands::Show { account } => {
            let account = engine.account(&account).await?;
            println!("Account: {}", account.account_number);
            println!("  ID:             {}", account.id);
            println!("  Customer:       {}", account.customer_id);
            println!("  Type:           {}", account.account_type);
            println!("  Balance:        {}", format_cents(account.balance_cents));
            println!(
                "  Opened:         {}",
                account.created_at.format("%Y-%m-%d %H:%M:%S")
            );
        }

        AccountCommands::List { customer } => {
            let accounts = engine.list_accounts(customer).await?;
            if accounts.is_empty() {
                println!("No accounts found.");
            } else {
                println!(
                    "{:<18} {:<8} {:<38} {:>15}",
                    "NUMBER", "TYPE", "CUSTOMER", "BALANCE"
                );
                println!("{}", "-".repeat(82));
                for account in accounts {
                    println!(
                        "{:<18} {:<8} {:<38} {:>15}",
                        account.account_number,
                        account.account_type,
                        account.customer_id,
                        format_cents(account.balance_cents)
                    );
                }
            }
        }
    }

    Ok(())
}

fn print_transactions(account_id: Uuid, transactions: &[Transaction]) {
    if transactions.is_empty() {
        println!("No transactions found.");
        return;
    }

    println!(
        "{:<20} {:<11} {:<8} {:>15}  {}",
        "DATE", "TYPE", "STATUS", "AMOUNT", "DESCRIPTION"
    );
    println!("{}", "-".repeat(80));
    for txn in transactions {
        // Outgoing amounts are shown negative; deposits land on the same account.
        let signed = if txn.source_account == account_id && txn.target_account != account_id {
            -txn.amount_cents
        } else {
            txn.amount_cents
        };
        println!(
            "{:<20} {:<11} {:<8} {:>15}  {}",
            txn.timestamp.format("%Y-%m-%d %H:%M:%S"),
            txn.transaction_type.as_str(),
            txn.status,
            format_cents(signed),
            txn.description.as_deref().unwrap_or("")
        );
    }
}

/// Render an accepted amount the way the ledger rounded it.
fn display_amount(value: Decimal) -> String {
    decimal_to_cents(value)
        .map(format_cents)
        .unwrap_or_else(|| value.to_string())
}

fn parse_date(date_str: &str) -> Result<DateTime<Utc>> {
    use chrono::NaiveDate;

    let naive_date = NaiveDate::parse_from_str(date_str, "%Y-%m-%d")
        .context("Date must be in YYYY-MM-DD format")?;

    // Midday keeps the UTC day unambiguous for the daily limit.
    let naive_datetime = naive_date
        .and_hms_opt(12, 0, 0)
        .ok_or_else(|| anyhow::anyhow!("Invalid date"))?;

    Ok(naive_datetime.and_utc())
}
