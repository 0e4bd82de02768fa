use std::time::Duration;

use tracing::{debug, error};

use crate::domain::{AuditLogEntry, NewAuditEntry, TransactionId};
use crate::storage::Repository;

/// Action labels written by the engine.
pub mod actions {
    pub const TRANSFER_SUCCESS: &str = "Fund Transfer SUCCESS";
    pub const TRANSFER_FAILED: &str = "Fund Transfer FAILED";
    pub const TRANSFER_REJECTED: &str = "Fund Transfer REJECTED";
    pub const ACCOUNT_OPENED: &str = "Account Opened";
    pub const LOAN_DISBURSED: &str = "Loan Disbursed";
    pub const LOAN_DISBURSEMENT_FAILED: &str = "Loan Disbursement FAILED";
}

/// Append-only audit trail.
///
/// Every write goes through its own pool connection and commits on its own,
/// so it survives a rollback of whatever operation it describes. Write
/// failures are logged and swallowed.
#[derive(Clone)]
pub struct AuditLog {
    repo: Repository,
    timeout: Duration,
}

impl AuditLog {
    pub fn new(repo: Repository, timeout: Duration) -> Self {
        Self { repo, timeout }
    }

    /// Record an entry. Returns its id, or `None` if the write failed.
    pub async fn record(&self, entry: NewAuditEntry) -> Option<i64> {
        let result = tokio::time::timeout(self.timeout, self.repo.append_audit_entry(&entry)).await;

        match result {
            Ok(Ok(id)) => {
                debug!(audit_id = id, action = %entry.action, "audit entry recorded");
                Some(id)
            }
            Ok(Err(err)) => {
                error!(action = %entry.action, error = %format!("{err:#}"), "failed to write audit entry");
                None
            }
            Err(_) => {
                error!(action = %entry.action, timeout = ?self.timeout, "audit write timed out");
                None
            }
        }
    }

    /// Newest entries first.
    pub async fn recent(&self, limit: usize) -> anyhow::Result<Vec<AuditLogEntry>> {
        self.repo.recent_audit_entries(limit).await
    }

    pub async fn entries_for_transaction(
        &self,
        transaction_id: TransactionId,
    ) -> anyhow::Result<Vec<AuditLogEntry>> {
        self.repo.audit_entries_for_transaction(transaction_id).await
    }
}
