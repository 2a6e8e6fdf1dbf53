use chrono::{DateTime, NaiveDate, Utc};
use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension, Row, TransactionBehavior};

use crate::models::visitor::{new_visitor_id, ApiKeyContext, NewVisitorEvent, TierLimit, Visitor};

use super::repository::{
    ApiKeyRepository, QuotaOutcome, StoreError, UsageRepository, VisitorRepository,
};

const SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS visitors (
        id          TEXT PRIMARY KEY,
        fingerprint TEXT NOT NULL UNIQUE,
        first_seen  TEXT NOT NULL,
        last_seen   TEXT NOT NULL,
        visit_count INTEGER NOT NULL DEFAULT 1
    );

    CREATE TABLE IF NOT EXISTS visitor_events (
        id            INTEGER PRIMARY KEY AUTOINCREMENT,
        visitor_id    TEXT NOT NULL REFERENCES visitors(id),
        api_key_id    TEXT NOT NULL,
        signals       TEXT NOT NULL,
        risk_score    INTEGER NOT NULL,
        is_bot        INTEGER NOT NULL DEFAULT 0,
        is_vpn        INTEGER NOT NULL DEFAULT 0,
        is_tor        INTEGER NOT NULL DEFAULT 0,
        is_datacenter INTEGER NOT NULL DEFAULT 0,
        ip            TEXT,
        timestamp     TEXT NOT NULL
    );

    CREATE INDEX IF NOT EXISTS idx_visitor_events_visitor
        ON visitor_events(visitor_id);

    CREATE TABLE IF NOT EXISTS usage_daily (
        id            INTEGER PRIMARY KEY AUTOINCREMENT,
        account_id    TEXT NOT NULL,
        date          TEXT NOT NULL,
        request_count INTEGER NOT NULL DEFAULT 0,
        UNIQUE(account_id, date)
    );

    CREATE TABLE IF NOT EXISTS tier_limits (
        name          TEXT PRIMARY KEY,
        monthly_limit INTEGER NOT NULL
    );

    CREATE TABLE IF NOT EXISTS api_keys (
        id         TEXT PRIMARY KEY,
        key_hash   TEXT NOT NULL UNIQUE,
        account_id TEXT NOT NULL,
        tier       TEXT NOT NULL,
        created_at TEXT DEFAULT (datetime('now'))
    );
";

pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Open (or create) the database at `path` and apply the schema.
    /// `":memory:"` gives a private in-memory database.
    pub fn new(path: &str) -> Result<Self, StoreError> {
        let conn = Connection::open(path)?;

        if path != ":memory:" {
            conn.execute_batch("PRAGMA journal_mode=WAL;")?;
        }
        conn.execute_batch(SCHEMA)?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    pub fn upsert_tier(&self, name: &str, monthly_limit: u64) -> Result<(), StoreError> {
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO tier_limits (name, monthly_limit) VALUES (?1, ?2)
             ON CONFLICT(name) DO UPDATE SET monthly_limit = excluded.monthly_limit",
            params![name, to_sql_count(monthly_limit)],
        )?;
        Ok(())
    }

    pub fn upsert_api_key(
        &self,
        id: &str,
        key_hash: &str,
        account_id: &str,
        tier: &str,
    ) -> Result<(), StoreError> {
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO api_keys (id, key_hash, account_id, tier) VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(key_hash) DO UPDATE SET account_id = excluded.account_id, tier = excluded.tier",
            params![id, key_hash, account_id, tier],
        )?;
        Ok(())
    }
}

impl VisitorRepository for SqliteStore {
    fn upsert_visitor(&self, fingerprint: &str) -> Result<Visitor, StoreError> {
        let conn = self.conn.lock();
        let now = Utc::now();
        let visitor = conn.query_row(
            "INSERT INTO visitors (id, fingerprint, first_seen, last_seen, visit_count)
             VALUES (?1, ?2, ?3, ?3, 1)
             ON CONFLICT(fingerprint) DO UPDATE
                 SET last_seen = excluded.last_seen, visit_count = visitors.visit_count + 1
             RETURNING id, fingerprint, first_seen, last_seen, visit_count",
            params![new_visitor_id(), fingerprint, now],
            visitor_from_row,
        )?;
        Ok(visitor)
    }

    fn create_visitor_event(&self, event: &NewVisitorEvent) -> Result<i64, StoreError> {
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO visitor_events
             (visitor_id, api_key_id, signals, risk_score, is_bot, is_vpn, is_tor,
              is_datacenter, ip, timestamp)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
            params![
                event.visitor_id,
                event.api_key_id,
                event.signals,
                event.risk_score,
                event.is_bot,
                event.is_vpn,
                event.is_tor,
                event.is_datacenter,
                event.ip,
                event.timestamp,
            ],
        )?;
        Ok(conn.last_insert_rowid())
    }
}

impl UsageRepository for SqliteStore {
    fn sum_monthly_usage(
        &self,
        account_id: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<u64, StoreError> {
        let conn = self.conn.lock();
        Ok(sum_usage(&conn, account_id, start, end)?)
    }

    fn upsert_daily_usage(&self, account_id: &str, date: NaiveDate) -> Result<u64, StoreError> {
        let conn = self.conn.lock();
        Ok(increment_usage(&conn, account_id, date)?)
    }

    fn get_tier_limit(&self, tier: &str) -> Result<Option<TierLimit>, StoreError> {
        let conn = self.conn.lock();
        let limit = conn
            .query_row(
                "SELECT monthly_limit FROM tier_limits WHERE name = ?1",
                params![tier],
                |row| row.get::<_, i64>(0),
            )
            .optional()?;
        Ok(limit.map(|l| TierLimit {
            monthly_limit: l.max(0) as u64,
        }))
    }

    /// Check and increment inside one immediate transaction, so concurrent
    /// requests for the same account cannot both pass at the limit.
    fn try_consume(
        &self,
        account_id: &str,
        today: NaiveDate,
        start: NaiveDate,
        end: NaiveDate,
        limit: u64,
    ) -> Result<QuotaOutcome, StoreError> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let used = sum_usage(&tx, account_id, start, end)?;
        if used + 1 >= limit {
            return Ok(QuotaOutcome::Rejected { used });
        }
        increment_usage(&tx, account_id, today)?;
        tx.commit()?;

        Ok(QuotaOutcome::Admitted { used: used + 1 })
    }
}

impl ApiKeyRepository for SqliteStore {
    fn find_api_key(&self, key_hash: &str) -> Result<Option<ApiKeyContext>, StoreError> {
        let conn = self.conn.lock();
        let found = conn
            .query_row(
                "SELECT id, account_id, tier FROM api_keys WHERE key_hash = ?1",
                params![key_hash],
                |row| {
                    Ok(ApiKeyContext {
                        api_key_id: row.get(0)?,
                        account_id: row.get(1)?,
                        tier: row.get(2)?,
                    })
                },
            )
            .optional()?;
        Ok(found)
    }
}

fn visitor_from_row(row: &Row<'_>) -> rusqlite::Result<Visitor> {
    Ok(Visitor {
        id: row.get(0)?,
        fingerprint: row.get(1)?,
        first_seen: row.get::<_, DateTime<Utc>>(2)?,
        last_seen: row.get::<_, DateTime<Utc>>(3)?,
        visit_count: row.get::<_, i64>(4)?.max(0) as u64,
    })
}

fn sum_usage(
    conn: &Connection,
    account_id: &str,
    start: NaiveDate,
    end: NaiveDate,
) -> rusqlite::Result<u64> {
    let total: i64 = conn.query_row(
        "SELECT COALESCE(SUM(request_count), 0) FROM usage_daily
         WHERE account_id = ?1 AND date >= ?2 AND date <= ?3",
        params![account_id, start, end],
        |row| row.get(0),
    )?;
    Ok(total.max(0) as u64)
}

fn increment_usage(conn: &Connection, account_id: &str, date: NaiveDate) -> rusqlite::Result<u64> {
    let count: i64 = conn.query_row(
        "INSERT INTO usage_daily (account_id, date, request_count) VALUES (?1, ?2, 1)
         ON CONFLICT(account_id, date) DO UPDATE SET request_count = usage_daily.request_count + 1
         RETURNING request_count",
        params![account_id, date],
        |row| row.get(0),
    )?;
    Ok(count.max(0) as u64)
}

fn to_sql_count(value: u64) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> SqliteStore {
        SqliteStore::new(":memory:").unwrap()
    }

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn event(visitor_id: &str) -> NewVisitorEvent {
        NewVisitorEvent {
            visitor_id: visitor_id.to_string(),
            api_key_id: "key_1".into(),
            signals: r#"{"canvas":"c"}"#.into(),
            risk_score: 40,
            is_bot: false,
            is_vpn: false,
            is_tor: true,
            is_datacenter: false,
            ip: Some("185.220.101.1".into()),
            timestamp: Utc::now(),
        }
    }

    #[test]
    fn test_upsert_visitor_creates_then_increments() {
        let store = store();
        let fp = "a".repeat(64);

        let first = store.upsert_visitor(&fp).unwrap();
        assert_eq!(first.visit_count, 1);
        assert!(first.id.starts_with("vis_"));
        assert_eq!(first.first_seen, first.last_seen);

        let second = store.upsert_visitor(&fp).unwrap();
        assert_eq!(second.id, first.id);
        assert_eq!(second.visit_count, 2);
        assert_eq!(second.first_seen, first.first_seen);
        assert!(second.last_seen >= first.last_seen);

        let other = store.upsert_visitor(&"b".repeat(64)).unwrap();
        assert_ne!(other.id, first.id);
        assert_eq!(other.visit_count, 1);
    }

    #[test]
    fn test_create_visitor_event() {
        let store = store();
        let visitor = store.upsert_visitor("fp").unwrap();
        let first = store.create_visitor_event(&event(&visitor.id)).unwrap();
        let second = store.create_visitor_event(&event(&visitor.id)).unwrap();
        assert!(second > first);

        let conn = store.conn.lock();
        let (count, tor): (i64, bool) = conn
            .query_row(
                "SELECT COUNT(*), MAX(is_tor) FROM visitor_events WHERE visitor_id = ?1",
                params![visitor.id],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .unwrap();
        assert_eq!(count, 2);
        assert!(tor);
    }

    #[test]
    fn test_daily_usage_and_monthly_sum() {
        let store = store();
        assert_eq!(store.upsert_daily_usage("acct", date(2024, 5, 1)).unwrap(), 1);
        assert_eq!(store.upsert_daily_usage("acct", date(2024, 5, 1)).unwrap(), 2);
        assert_eq!(store.upsert_daily_usage("acct", date(2024, 5, 31)).unwrap(), 1);
        store.upsert_daily_usage("acct", date(2024, 6, 1)).unwrap();
        store.upsert_daily_usage("other", date(2024, 5, 2)).unwrap();

        let may = store
            .sum_monthly_usage("acct", date(2024, 5, 1), date(2024, 5, 31))
            .unwrap();
        assert_eq!(may, 3);
        let nobody = store
            .sum_monthly_usage("nobody", date(2024, 5, 1), date(2024, 5, 31))
            .unwrap();
        assert_eq!(nobody, 0);
    }

    #[test]
    fn test_tier_limits() {
        let store = store();
        assert_eq!(store.get_tier_limit("free").unwrap(), None);
        store.upsert_tier("free", 1000).unwrap();
        store.upsert_tier("free", 2000).unwrap();
        assert_eq!(
            store.get_tier_limit("free").unwrap(),
            Some(TierLimit { monthly_limit: 2000 })
        );
    }

    #[test]
    fn test_try_consume_refuses_at_limit() {
        let store = store();
        let (today, start, end) = (date(2024, 2, 10), date(2024, 2, 1), date(2024, 2, 29));

        assert_eq!(
            store.try_consume("acct", today, start, end, 3).unwrap(),
            QuotaOutcome::Admitted { used: 1 }
        );
        // A second request would bring the total to 2; a third would meet the
        // limit and is refused.
        assert_eq!(
            store.try_consume("acct", today, start, end, 3).unwrap(),
            QuotaOutcome::Admitted { used: 2 }
        );
        assert_eq!(
            store.try_consume("acct", today, start, end, 3).unwrap(),
            QuotaOutcome::Rejected { used: 2 }
        );
        // Rejections are not counted.
        assert_eq!(store.sum_monthly_usage("acct", start, end).unwrap(), 2);
    }

    #[test]
    fn test_try_consume_zero_limit() {
        let store = store();
        let d = date(2024, 2, 10);
        assert_eq!(
            store.try_consume("acct", d, d, d, 0).unwrap(),
            QuotaOutcome::Rejected { used: 0 }
        );
    }

    #[test]
    fn test_api_key_lookup() {
        let store = store();
        assert_eq!(store.find_api_key("hash").unwrap(), None);

        store.upsert_api_key("key_1", "hash", "acct_1", "pro").unwrap();
        let ctx = store.find_api_key("hash").unwrap().unwrap();
        assert_eq!(ctx.api_key_id, "key_1");
        assert_eq!(ctx.account_id, "acct_1");
        assert_eq!(ctx.tier, "pro");

        // Re-seeding the same key moves it, keeping its id.
        store.upsert_api_key("key_other", "hash", "acct_1", "business").unwrap();
        let ctx = store.find_api_key("hash").unwrap().unwrap();
        assert_eq!(ctx.api_key_id, "key_1");
        assert_eq!(ctx.tier, "business");
    }
}
