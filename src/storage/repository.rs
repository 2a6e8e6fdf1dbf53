//! Persistence contracts consumed by the scoring engine.
//!
//! Calls are synchronous; the service awaits nothing inside them and runs
//! them in request order.

use chrono::NaiveDate;
use thiserror::Error;

use crate::models::visitor::{ApiKeyContext, NewVisitorEvent, TierLimit, Visitor};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("store unavailable: {0}")]
    Unavailable(String),
}

pub trait VisitorRepository: Send + Sync {
    /// Create the visitor on first sight (`visit_count = 1`), otherwise bump
    /// `last_seen` and `visit_count`.
    fn upsert_visitor(&self, fingerprint: &str) -> Result<Visitor, StoreError>;

    fn create_visitor_event(&self, event: &NewVisitorEvent) -> Result<i64, StoreError>;
}

/// Result of a quota-checked usage increment. `used` is the monthly total
/// after the call: incremented when admitted, untouched when rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuotaOutcome {
    Admitted { used: u64 },
    Rejected { used: u64 },
}

pub trait UsageRepository: Send + Sync {
    /// Sum of daily counters for `account_id` with `start <= date <= end`.
    fn sum_monthly_usage(
        &self,
        account_id: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<u64, StoreError>;

    /// Create the day's counter at 1 or increment it; returns the new count.
    fn upsert_daily_usage(&self, account_id: &str, date: NaiveDate) -> Result<u64, StoreError>;

    fn get_tier_limit(&self, tier: &str) -> Result<Option<TierLimit>, StoreError>;

    /// Reject when the post-increment monthly total would meet or exceed
    /// `limit`, otherwise increment today's counter.
    ///
    /// The default composes `sum_monthly_usage` and `upsert_daily_usage` and
    /// is therefore racy across concurrent requests: two callers can both
    /// pass the check before either increments. Stores with a transactional
    /// or atomic primitive should override it.
    fn try_consume(
        &self,
        account_id: &str,
        today: NaiveDate,
        start: NaiveDate,
        end: NaiveDate,
        limit: u64,
    ) -> Result<QuotaOutcome, StoreError> {
        let used = self.sum_monthly_usage(account_id, start, end)?;
        if used + 1 >= limit {
            return Ok(QuotaOutcome::Rejected { used });
        }
        self.upsert_daily_usage(account_id, today)?;
        Ok(QuotaOutcome::Admitted { used: used + 1 })
    }
}

pub trait ApiKeyRepository: Send + Sync {
    /// Look up a key by its stored hash.
    fn find_api_key(&self, key_hash: &str) -> Result<Option<ApiKeyContext>, StoreError>;
}
