use std::time::Duration;

use crate::domain::{Cents, DAILY_TRANSFER_LIMIT};

/// Default upper bound for a single storage round trip or unit of work.
pub const DEFAULT_STORAGE_TIMEOUT: Duration = Duration::from_secs(10);

/// Settings owned by a [`TransferEngine`](super::TransferEngine) at construction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    /// Cap on outgoing transfers per account per UTC day, in cents
    pub daily_limit: Cents,
    /// Bound on every storage call; exceeding it is treated as a commit failure
    pub storage_timeout: Duration,
    /// Write audit entries for rejected transfer attempts, not only for
    /// successes and storage failures
    pub audit_rejections: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            daily_limit: DAILY_TRANSFER_LIMIT,
            storage_timeout: DEFAULT_STORAGE_TIMEOUT,
            audit_rejections: true,
        }
    }
}

impl EngineConfig {
    pub fn with_daily_limit(mut self, daily_limit: Cents) -> Self {
        assert!(daily_limit >= 0, "Daily limit cannot be negative");
        self.daily_limit = daily_limit;
        self
    }

    pub fn with_storage_timeout(mut self, storage_timeout: Duration) -> Self {
        self.storage_timeout = storage_timeout;
        self
    }

    pub fn with_audit_rejections(mut self, audit_rejections: bool) -> Self {
        self.audit_rejections = audit_rejections;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = EngineConfig::default();
        assert_eq!(config.daily_limit, 5_000_000);
        assert_eq!(config.storage_timeout, DEFAULT_STORAGE_TIMEOUT);
        assert!(config.audit_rejections);
    }

    #[test]
    fn test_builders() {
        let config = EngineConfig::default()
            .with_daily_limit(10_000)
            .with_storage_timeout(Duration::from_millis(250))
            .with_audit_rejections(false);

        assert_eq!(config.daily_limit, 10_000);
        assert_eq!(config.storage_timeout, Duration::from_millis(250));
        assert!(!config.audit_rejections);
    }
}
