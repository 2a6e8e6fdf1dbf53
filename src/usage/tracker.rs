//! Monthly quota enforcement per account.
//!
//! A request is rejected when the month-to-date total after counting it would
//! meet or exceed the tier limit; admitted requests bump the day's counter,
//! rejected ones do not.
//! Unknown tiers get a limit of 0 and are always rejected.

use std::sync::Arc;

use chrono::{DateTime, Datelike, Months, NaiveDate, Utc};
use tracing::{debug, warn};

use crate::models::visitor::ApiKeyContext;
use crate::storage::repository::{QuotaOutcome, StoreError, UsageRepository};

/// Calendar month in UTC that usage is summed over.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BillingPeriod {
    pub start: NaiveDate,
    pub end: NaiveDate,
    /// Last second of the month; reported as `X-RateLimit-Reset`.
    pub reset_at: DateTime<Utc>,
}

impl BillingPeriod {
    pub fn containing(now: DateTime<Utc>) -> Self {
        let today = now.date_naive();
        let start = today.with_day(1).unwrap_or(today);
        let end = start
            .checked_add_months(Months::new(1))
            .and_then(|next| next.pred_opt())
            .unwrap_or(today);
        let reset_at = end
            .and_hms_opt(23, 59, 59)
            .map(|dt| dt.and_utc())
            .unwrap_or(now);

        Self {
            start,
            end,
            reset_at,
        }
    }
}

/// Outcome of one quota check, carrying what the rate-limit headers need.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UsageDecision {
    pub allowed: bool,
    pub limit: u64,
    pub remaining: u64,
    pub reset_at: DateTime<Utc>,
}

pub struct UsageTracker {
    repo: Arc<dyn UsageRepository>,
}

impl UsageTracker {
    pub fn new(repo: Arc<dyn UsageRepository>) -> Self {
        Self { repo }
    }

    pub fn check_and_consume(&self, key: &ApiKeyContext) -> Result<UsageDecision, StoreError> {
        self.check_and_consume_at(key, Utc::now())
    }

    pub fn check_and_consume_at(
        &self,
        key: &ApiKeyContext,
        now: DateTime<Utc>,
    ) -> Result<UsageDecision, StoreError> {
        let limit = match self.repo.get_tier_limit(&key.tier)? {
            Some(tier) => tier.monthly_limit,
            None => {
                warn!(tier = %key.tier, account = %key.account_id, "Unknown tier, treating limit as 0");
                0
            }
        };

        let period = BillingPeriod::containing(now);
        let outcome = self.repo.try_consume(
            &key.account_id,
            now.date_naive(),
            period.start,
            period.end,
            limit,
        )?;

        let decision = match outcome {
            QuotaOutcome::Admitted { used } => {
                debug!(account = %key.account_id, used, limit, "Usage admitted");
                UsageDecision {
                    allowed: true,
                    limit,
                    remaining: limit.saturating_sub(used),
                    reset_at: period.reset_at,
                }
            }
            QuotaOutcome::Rejected { used } => {
                warn!(account = %key.account_id, used, limit, "Monthly quota exceeded");
                UsageDecision {
                    allowed: false,
                    limit,
                    remaining: 0,
                    reset_at: period.reset_at,
                }
            }
        };

        Ok(decision)
    }
}
