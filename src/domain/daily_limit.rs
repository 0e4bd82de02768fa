use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::{cents_to_decimal, AccountId, Amount, Cents};

/// Cap on cumulative outgoing transfers per account per calendar day (50,000.00).
pub const DAILY_TRANSFER_LIMIT: Cents = 5_000_000;

/// [`DAILY_TRANSFER_LIMIT`] as a decimal, for callers rendering limit hints.
pub fn daily_transfer_limit() -> Decimal {
    cents_to_decimal(DAILY_TRANSFER_LIMIT)
}

/// Running total of outgoing transfers for one account on one day.
///
/// Rows are keyed by `(account_id, date)`, so a new day simply starts a new
/// row at zero.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DailyLimitTracker {
    pub account_id: AccountId,
    pub date: NaiveDate,
    pub transacted_cents: Cents,
}

impl DailyLimitTracker {
    pub fn new(account_id: AccountId, date: NaiveDate) -> Self {
        Self {
            account_id,
            date,
            transacted_cents: 0,
        }
    }

    /// True iff adding `amount` would take the day's total past `limit`.
    pub fn would_exceed(&self, amount: Amount, limit: Cents) -> bool {
        match self.transacted_cents.checked_add(amount.cents()) {
            Some(total) => total > limit,
            None => true,
        }
    }

    /// Remaining headroom under `limit`, never negative.
    pub fn remaining(&self, limit: Cents) -> Cents {
        (limit - self.transacted_cents).max(0)
    }

    pub fn record(&mut self, amount: Amount) {
        self.transacted_cents += amount.cents();
    }
}

#[cfg(test)]
mod tests {
    use uuid::Uuid;

    use super::*;

    fn tracker_at(transacted_cents: Cents) -> DailyLimitTracker {
        DailyLimitTracker {
            account_id: Uuid::new_v4(),
            date: NaiveDate::from_ymd_opt(2024, 3, 1).unwrap(),
            transacted_cents,
        }
    }

    #[test]
    fn test_new_tracker_starts_at_zero() {
        let tracker = DailyLimitTracker::new(Uuid::new_v4(), NaiveDate::from_ymd_opt(2024, 3, 1).unwrap());
        assert_eq!(tracker.transacted_cents, 0);
        assert_eq!(tracker.remaining(DAILY_TRANSFER_LIMIT), DAILY_TRANSFER_LIMIT);
    }

    #[test]
    fn test_limit_boundary() {
        // 49,999.00 used today
        let tracker = tracker_at(4_999_900);

        assert!(tracker.would_exceed(Amount::from_cents(200).unwrap(), DAILY_TRANSFER_LIMIT));
        assert!(!tracker.would_exceed(Amount::from_cents(100).unwrap(), DAILY_TRANSFER_LIMIT));
    }

    #[test]
    fn test_record_accumulates() {
        let mut tracker = tracker_at(0);
        tracker.record(Amount::from_cents(1500).unwrap());
        tracker.record(Amount::from_cents(500).unwrap());
        assert_eq!(tracker.transacted_cents, 2000);
        assert_eq!(tracker.remaining(2500), 500);
        assert_eq!(tracker.remaining(1000), 0);
    }

    #[test]
    fn test_overflow_counts_as_exceeding() {
        let tracker = tracker_at(Cents::MAX);
        assert!(tracker.would_exceed(Amount::from_cents(1).unwrap(), Cents::MAX));
    }

    #[test]
    fn test_exposed_limit() {
        assert_eq!(daily_transfer_limit().to_string(), "50000.00");
    }
}
