use std::collections::VecDeque;

use chrono::{NaiveDate, Utc};
use dashmap::DashMap;
use parking_lot::Mutex;

use crate::models::visitor::{new_visitor_id, ApiKeyContext, NewVisitorEvent, TierLimit, Visitor};

use super::repository::{ApiKeyRepository, StoreError, UsageRepository, VisitorRepository};

/// Visitor events kept by [`MemoryStore`]; older ones are dropped first.
pub const MAX_EVENTS: usize = 10_000;

#[derive(Default)]
struct EventLog {
    entries: VecDeque<NewVisitorEvent>,
    last_id: i64,
}

/// Process-local repositories for single-node runs and tests.
///
/// Quota consumption uses the trait's default `try_consume`, so two racing
/// requests for the same account may both pass at the limit. Only the last
/// [`MAX_EVENTS`] visitor events are retained; visitors and usage counters
/// grow with traffic for the life of the process.
#[derive(Default)]
pub struct MemoryStore {
    /// Keyed by fingerprint.
    visitors: DashMap<String, Visitor>,
    events: Mutex<EventLog>,
    usage: DashMap<(String, NaiveDate), u64>,
    tiers: DashMap<String, u64>,
    /// Keyed by key hash.
    api_keys: DashMap<String, ApiKeyContext>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn upsert_tier(&self, name: &str, monthly_limit: u64) {
        self.tiers.insert(name.to_string(), monthly_limit);
    }

    pub fn upsert_api_key(&self, id: &str, key_hash: &str, account_id: &str, tier: &str) {
        self.api_keys
            .entry(key_hash.to_string())
            .and_modify(|ctx| {
                ctx.account_id = account_id.to_string();
                ctx.tier = tier.to_string();
            })
            .or_insert_with(|| ApiKeyContext {
                api_key_id: id.to_string(),
                account_id: account_id.to_string(),
                tier: tier.to_string(),
            });
    }

    #[cfg(test)]
    pub fn event_count(&self) -> usize {
        self.events.lock().entries.len()
    }

    #[cfg(test)]
    pub fn events_for(&self, visitor_id: &str) -> Vec<NewVisitorEvent> {
        self.events
            .lock()
            .entries
            .iter()
            .filter(|e| e.visitor_id == visitor_id)
            .cloned()
            .collect()
    }
}

impl VisitorRepository for MemoryStore {
    fn upsert_visitor(&self, fingerprint: &str) -> Result<Visitor, StoreError> {
        let now = Utc::now();
        let visitor = self
            .visitors
            .entry(fingerprint.to_string())
            .and_modify(|v| {
                v.last_seen = now;
                v.visit_count += 1;
            })
            .or_insert_with(|| Visitor {
                id: new_visitor_id(),
                fingerprint: fingerprint.to_string(),
                first_seen: now,
                last_seen: now,
                visit_count: 1,
            })
            .value()
            .clone();
        Ok(visitor)
    }

    fn create_visitor_event(&self, event: &NewVisitorEvent) -> Result<i64, StoreError> {
        let mut log = self.events.lock();
        if log.entries.len() >= MAX_EVENTS {
            log.entries.pop_front();
        }
        log.entries.push_back(event.clone());
        log.last_id += 1;
        Ok(log.last_id)
    }
}

impl UsageRepository for MemoryStore {
    fn sum_monthly_usage(
        &self,
        account_id: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<u64, StoreError> {
        let total = self
            .usage
            .iter()
            .filter(|entry| {
                let (account, date) = entry.key();
                account == account_id && *date >= start && *date <= end
            })
            .map(|entry| *entry.value())
            .sum();
        Ok(total)
    }

    fn upsert_daily_usage(&self, account_id: &str, date: NaiveDate) -> Result<u64, StoreError> {
        let mut count = self
            .usage
            .entry((account_id.to_string(), date))
            .or_insert(0);
        *count += 1;
        Ok(*count)
    }

    fn get_tier_limit(&self, tier: &str) -> Result<Option<TierLimit>, StoreError> {
        Ok(self.tiers.get(tier).map(|limit| TierLimit {
            monthly_limit: *limit,
        }))
    }
}

impl ApiKeyRepository for MemoryStore {
    fn find_api_key(&self, key_hash: &str) -> Result<Option<ApiKeyContext>, StoreError> {
        Ok(self.api_keys.get(key_hash).map(|ctx| ctx.value().clone()))
    }
}
