//! Bucketed time series
//!
//! Values are grouped into fixed-width time buckets keyed
//! `<prefix>::<floored unix nanoseconds>`. Each bucket is an ordered set of
//! serialized values scored by their timestamp; re-adding an identical value
//! moves it to the new score instead of duplicating it.
//!
//! With a non-zero expiration a bucket gets its expiry when it receives its
//! first value, so later writes to the same bucket do not extend it.

use std::time::Duration;

use chrono::{DateTime, Utc};
use rusqlite::{OptionalExtension, TransactionBehavior, params};
use serde::Serialize;
use serde::de::DeserializeOwned;

use super::{DbPool, connection};
use crate::{Error, Result};

/// One named series in the store
#[derive(Clone)]
pub struct TimeSeries {
    pool: DbPool,
    prefix: String,
    timestep: i64,
    expiration: i64,
}

impl TimeSeries {
    /// Create a handle for the series `prefix`
    ///
    /// `expiration` of zero keeps buckets forever.
    ///
    /// # Errors
    ///
    /// Returns `Config` if `timestep` is zero or either duration does not
    /// fit in 64-bit nanoseconds
    pub fn new(
        pool: DbPool,
        prefix: impl Into<String>,
        timestep: Duration,
        expiration: Duration,
    ) -> Result<Self> {
        let timestep = i64::try_from(timestep.as_nanos())
            .map_err(|_| Error::Config("timestep too large".to_string()))?;
        if timestep == 0 {
            return Err(Error::Config("timestep must be greater than zero".to_string()));
        }
        let expiration = i64::try_from(expiration.as_millis())
            .map_err(|_| Error::Config("expiration too large".to_string()))?;

        Ok(Self {
            pool,
            prefix: prefix.into(),
            timestep,
            expiration,
        })
    }

    /// Key of the bucket holding `timestamp`
    ///
    /// # Errors
    ///
    /// Returns `InvalidRange` if the timestamp cannot be expressed in
    /// nanoseconds
    pub fn bucket_key(&self, timestamp: DateTime<Utc>) -> Result<String> {
        Ok(self.key_for(self.floor(nanos(timestamp)?)))
    }

    /// Append a value at `timestamp`
    ///
    /// # Errors
    ///
    /// Returns error if the value cannot be serialized or the write fails
    pub fn add<T: Serialize>(&self, value: &T, timestamp: DateTime<Utc>) -> Result<()> {
        self.add_at(value, timestamp, Utc::now().timestamp_millis())
    }

    fn add_at<T: Serialize>(&self, value: &T, timestamp: DateTime<Utc>, now_ms: i64) -> Result<()> {
        let member = serde_json::to_string(value)?;
        let score = nanos(timestamp)?;
        let start = self.floor(score);
        let key = self.key_for(start);

        let mut conn = connection(&self.pool)?;
        // Take the write lock up front; a deferred read-then-write would fail
        // against a concurrent writer instead of waiting on the busy timeout
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        // An expired bucket that has not been purged yet starts over
        let expired: bool = tx
            .query_row(
                "SELECT expires_at IS NOT NULL AND expires_at <= ?2 FROM series_buckets WHERE key = ?1",
                params![key, now_ms],
                |row| row.get(0),
            )
            .optional()?
            .unwrap_or(false);
        if expired {
            tx.execute("DELETE FROM series_entries WHERE bucket_key = ?1", [&key])?;
            tx.execute("DELETE FROM series_buckets WHERE key = ?1", [&key])?;
        }

        tx.execute(
            "INSERT INTO series_buckets (key, prefix, start) VALUES (?1, ?2, ?3)
             ON CONFLICT(key) DO NOTHING",
            params![key, self.prefix, start],
        )?;
        tx.execute(
            "INSERT INTO series_entries (bucket_key, score, value) VALUES (?1, ?2, ?3)
             ON CONFLICT(bucket_key, value) DO UPDATE SET score = excluded.score",
            params![key, score, member],
        )?;

        if self.expiration > 0 {
            let cardinality: i64 = tx.query_row(
                "SELECT COUNT(*) FROM series_entries WHERE bucket_key = ?1",
                [&key],
                |row| row.get(0),
            )?;
            if cardinality == 1 {
                tx.execute(
                    "UPDATE series_buckets SET expires_at = ?2 WHERE key = ?1",
                    params![key, now_ms.saturating_add(self.expiration)],
                )?;
            }
        }

        tx.commit()?;
        Ok(())
    }

    /// Values with timestamps in `from..=to`, oldest first
    ///
    /// # Errors
    ///
    /// Returns `InvalidRange` if `from` is after `to`, or error if the read
    /// or deserialization fails
    pub fn fetch_range<T: DeserializeOwned>(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<T>> {
        self.fetch_range_at(from, to, Utc::now().timestamp_millis())
    }

    fn fetch_range_at<T: DeserializeOwned>(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
        now_ms: i64,
    ) -> Result<Vec<T>> {
        if from > to {
            return Err(Error::InvalidRange(format!("{from} is after {to}")));
        }
        let from = nanos(from)?;
        let to = nanos(to)?;

        let conn = connection(&self.pool)?;
        let mut stmt = conn.prepare_cached(
            "SELECT e.value
             FROM series_buckets b
             JOIN series_entries e ON e.bucket_key = b.key
             WHERE b.prefix = ?1
               AND b.start BETWEEN ?2 AND ?3
               AND (b.expires_at IS NULL OR b.expires_at > ?4)
               AND e.score BETWEEN ?5 AND ?6
             ORDER BY b.start, e.score, e.value",
        )?;

        let rows = stmt.query_map(
            params![self.prefix, self.floor(from), self.floor(to), now_ms, from, to],
            |row| row.get::<_, String>(0),
        )?;

        let mut values = Vec::new();
        for row in rows {
            values.push(serde_json::from_str(&row?)?);
        }
        Ok(values)
    }

    fn floor(&self, nanos: i64) -> i64 {
        nanos.div_euclid(self.timestep) * self.timestep
    }

    fn key_for(&self, start: i64) -> String {
        format!("{}::{start}", self.prefix)
    }
}

/// Delete every bucket whose expiry is at or before `now`
///
/// Returns the number of buckets removed.
///
/// # Errors
///
/// Returns error if the delete fails
pub fn purge_expired(pool: &DbPool, now: DateTime<Utc>) -> Result<usize> {
    let now_ms = now.timestamp_millis();
    let mut conn = connection(pool)?;
    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

    tx.execute(
        "DELETE FROM series_entries WHERE bucket_key IN
            (SELECT key FROM series_buckets WHERE expires_at IS NOT NULL AND expires_at <= ?1)",
        [now_ms],
    )?;
    let removed = tx.execute(
        "DELETE FROM series_buckets WHERE expires_at IS NOT NULL AND expires_at <= ?1",
        [now_ms],
    )?;

    tx.commit()?;
    Ok(removed)
}

fn nanos(timestamp: DateTime<Utc>) -> Result<i64> {
    timestamp
        .timestamp_nanos_opt()
        .ok_or_else(|| Error::InvalidRange(format!("timestamp {timestamp} out of range")))
}

#[cfg(test)]
mod tests {
    use chrono::TimeDelta;
    use serde_json::{Value, json};

    use super::*;
    use crate::db::init_memory;

    fn series(timestep: Duration, expiration: Duration) -> TimeSeries {
        TimeSeries::new(init_memory().unwrap(), "data://dev/temp", timestep, expiration).unwrap()
    }

    fn t0() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2024-03-01T12:00:00.250Z")
            .unwrap()
            .with_timezone(&Utc)
    }

    fn expires_at(ts: &TimeSeries, key: &str) -> Option<i64> {
        connection(&ts.pool)
            .unwrap()
            .query_row(
                "SELECT expires_at FROM series_buckets WHERE key = ?1",
                [key],
                |row| row.get(0),
            )
            .unwrap()
    }

    #[test]
    fn test_concurrent_writers_on_file_database() {
        let dir = tempfile::tempdir().unwrap();
        let pool = crate::db::init(dir.path().join("series.db")).unwrap();
        let ts = TimeSeries::new(
            pool,
            "data://dev/temp",
            Duration::from_secs(1),
            Duration::from_secs(60),
        )
        .unwrap();

        std::thread::scope(|scope| {
            for writer in 0..4 {
                let ts = &ts;
                scope.spawn(move || {
                    for i in 0..50 {
                        let value = json!({"writer": writer, "i": i});
                        ts.add(&value, t0() + TimeDelta::milliseconds(i * 10)).unwrap();
                    }
                });
            }
        });

        let values: Vec<Value> = ts.fetch_range(t0(), t0() + TimeDelta::seconds(1)).unwrap();
        assert_eq!(values.len(), 200);
    }

    #[test]
    fn test_zero_timestep_rejected() {
        let err = TimeSeries::new(init_memory().unwrap(), "s", Duration::ZERO, Duration::ZERO);
        assert!(matches!(err, Err(Error::Config(_))));
    }

    #[test]
    fn test_bucket_keys_are_floored() {
        let ts = series(Duration::from_secs(1), Duration::ZERO);
        let key = ts.bucket_key(t0()).unwrap();
        assert_eq!(key, "data://dev/temp::1709294400000000000");
        assert_eq!(ts.bucket_key(t0() + TimeDelta::milliseconds(700)).unwrap(), key);
        assert_ne!(ts.bucket_key(t0() + TimeDelta::milliseconds(750)).unwrap(), key);
    }

    #[test]
    fn test_range_spans_buckets_in_order() {
        let ts = series(Duration::from_secs(1), Duration::ZERO);
        ts.add(&json!("v3"), t0() + TimeDelta::seconds(5)).unwrap();
        ts.add(&json!("v1"), t0()).unwrap();
        ts.add(&json!("v2"), t0() + TimeDelta::milliseconds(500)).unwrap();

        let values: Vec<Value> = ts.fetch_range(t0(), t0() + TimeDelta::seconds(5)).unwrap();
        assert_eq!(values, [json!("v1"), json!("v2"), json!("v3")]);

        let inner: Vec<Value> = ts
            .fetch_range(t0() + TimeDelta::milliseconds(1), t0() + TimeDelta::seconds(4))
            .unwrap();
        assert_eq!(inner, [json!("v2")]);
    }

    #[test]
    fn test_empty_and_inverted_ranges() {
        let ts = series(Duration::from_secs(1), Duration::ZERO);
        ts.add(&json!(1), t0()).unwrap();

        let empty: Vec<Value> = ts
            .fetch_range(t0() + TimeDelta::hours(1), t0() + TimeDelta::hours(2))
            .unwrap();
        assert!(empty.is_empty());

        let err = ts.fetch_range::<Value>(t0(), t0() - TimeDelta::seconds(1));
        assert!(matches!(err, Err(Error::InvalidRange(_))));
    }

    #[test]
    fn test_identical_values_are_rescored() {
        let ts = series(Duration::from_secs(10), Duration::ZERO);
        ts.add(&json!("same"), t0()).unwrap();
        ts.add(&json!("other"), t0() + TimeDelta::seconds(1)).unwrap();
        ts.add(&json!("same"), t0() + TimeDelta::seconds(2)).unwrap();

        let values: Vec<Value> = ts.fetch_range(t0(), t0() + TimeDelta::seconds(3)).unwrap();
        assert_eq!(values, [json!("other"), json!("same")]);
    }

    #[test]
    fn test_series_are_isolated() {
        let pool = init_memory().unwrap();
        let a = TimeSeries::new(pool.clone(), "a", Duration::from_secs(1), Duration::ZERO).unwrap();
        let b = TimeSeries::new(pool, "b", Duration::from_secs(1), Duration::ZERO).unwrap();
        a.add(&json!(1), t0()).unwrap();

        assert!(b.fetch_range::<Value>(t0(), t0()).unwrap().is_empty());
        assert_eq!(a.fetch_range::<Value>(t0(), t0()).unwrap(), [json!(1)]);
    }

    #[test]
    fn test_expiry_set_on_first_write_only() {
        let ts = series(Duration::from_secs(60), Duration::from_secs(30));
        let key = ts.bucket_key(t0()).unwrap();

        ts.add_at(&json!(1), t0(), 1_000).unwrap();
        assert_eq!(expires_at(&ts, &key), Some(31_000));

        ts.add_at(&json!(2), t0() + TimeDelta::seconds(1), 20_000).unwrap();
        assert_eq!(expires_at(&ts, &key), Some(31_000));

        let live: Vec<Value> = ts.fetch_range_at(t0(), t0() + TimeDelta::seconds(2), 30_999).unwrap();
        assert_eq!(live.len(), 2);
        let gone: Vec<Value> = ts.fetch_range_at(t0(), t0() + TimeDelta::seconds(2), 31_000).unwrap();
        assert!(gone.is_empty());
    }

    #[test]
    fn test_expired_bucket_starts_over() {
        let ts = series(Duration::from_secs(60), Duration::from_secs(30));
        let key = ts.bucket_key(t0()).unwrap();

        ts.add_at(&json!(1), t0(), 1_000).unwrap();
        ts.add_at(&json!(2), t0(), 40_000).unwrap();

        assert_eq!(expires_at(&ts, &key), Some(70_000));
        let values: Vec<Value> = ts.fetch_range_at(t0(), t0(), 40_000).unwrap();
        assert_eq!(values, [json!(2)]);
    }

    #[test]
    fn test_no_expiry_without_expiration() {
        let ts = series(Duration::from_secs(1), Duration::ZERO);
        ts.add(&json!(1), t0()).unwrap();
        assert_eq!(expires_at(&ts, &ts.bucket_key(t0()).unwrap()), None);
    }

    #[test]
    fn test_purge_removes_expired_buckets() {
        let ts = series(Duration::from_secs(1), Duration::from_secs(30));
        ts.add_at(&json!(1), t0(), 1_000).unwrap();
        ts.add_at(&json!(2), t0() + TimeDelta::seconds(5), 50_000).unwrap();

        let cutoff = DateTime::from_timestamp_millis(31_000).unwrap();
        assert_eq!(purge_expired(&ts.pool, cutoff).unwrap(), 1);

        let remaining: i64 = connection(&ts.pool)
            .unwrap()
            .query_row("SELECT COUNT(*) FROM series_entries", [], |row| row.get(0))
            .unwrap();
        assert_eq!(remaining, 1);
    }
}
