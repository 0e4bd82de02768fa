use std::collections::HashMap;

use chrono::NaiveDate;

use super::{format_cents, Account, AccountId, Cents, DailyLimitTracker};

/// Outcome of a ledger consistency check.
#[derive(Debug, Clone)]
pub struct IntegrityReport {
    pub account_count: usize,
    pub transaction_count: i64,
    pub tracker_count: usize,
    pub total_balance: Cents,
    pub issues: Vec<String>,
}

impl IntegrityReport {
    pub fn is_healthy(&self) -> bool {
        self.issues.is_empty()
    }
}

/// Compare stored balances and trackers against what the transaction log implies.
///
/// `transfer_totals` maps `(source account, day)` to the sum of successful
/// transfers out of that account on that day.
pub fn build_integrity_report(
    accounts: &[Account],
    trackers: &[DailyLimitTracker],
    transfer_totals: &HashMap<(AccountId, NaiveDate), Cents>,
    transaction_count: i64,
    daily_limit: Cents,
) -> IntegrityReport {
    let mut issues = Vec::new();

    for account in accounts {
        if account.balance_cents < 0 {
            issues.push(format!(
                "Account {} has negative balance {}",
                account.account_number,
                format_cents(account.balance_cents)
            ));
        }
    }

    let numbers: HashMap<AccountId, &str> = accounts
        .iter()
        .map(|a| (a.id, a.account_number.as_str()))
        .collect();
    let label = |id: &AccountId| {
        numbers
            .get(id)
            .map(|n| n.to_string())
            .unwrap_or_else(|| id.to_string())
    };

    for tracker in trackers {
        let expected = transfer_totals
            .get(&(tracker.account_id, tracker.date))
            .copied()
            .unwrap_or(0);
        if tracker.transacted_cents != expected {
            issues.push(format!(
                "Tracker for {} on {} records {} but successful transfers sum to {}",
                label(&tracker.account_id),
                tracker.date,
                format_cents(tracker.transacted_cents),
                format_cents(expected)
            ));
        }
        if tracker.transacted_cents > daily_limit {
            issues.push(format!(
                "Tracker for {} on {} exceeds the daily limit ({} > {})",
                label(&tracker.account_id),
                tracker.date,
                format_cents(tracker.transacted_cents),
                format_cents(daily_limit)
            ));
        }
    }

    // Transfers with no tracker row at all
    for ((account_id, date), total) in transfer_totals {
        let tracked = trackers
            .iter()
            .any(|t| t.account_id == *account_id && t.date == *date);
        if !tracked && *total > 0 {
            issues.push(format!(
                "No tracker for {} on {} although {} was transferred",
                label(account_id),
                date,
                format_cents(*total)
            ));
        }
    }

    IntegrityReport {
        account_count: accounts.len(),
        transaction_count,
        tracker_count: trackers.len(),
        total_balance: accounts.iter().map(|a| a.balance_cents).sum(),
        issues,
    }
}
