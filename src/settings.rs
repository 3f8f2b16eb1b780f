//! Typed accessor over the hot-reloadable `settings` table.
//!
//! Every read goes to the table so operators can retune timing without a
//! restart. Nothing here caches; absent or malformed values fall back to the
//! seeded defaults instead of failing the calling job.

use crate::db::Pool;
use anyhow::Result;
use std::ops::RangeInclusive;
use tracing::warn;

pub const DEFAULTS: &[(&str, &str)] = &[
    ("enabled", "0"),
    ("max_scan_users", "10"),
    ("wait_time_follow_min", "10"),
    ("wait_time_follow_max", "30"),
    ("wait_time_list_min", "5"),
    ("wait_time_list_max", "30"),
    ("scan_time_min", "5"),
    ("scan_time_max", "60"),
    ("verbose", "1"),
    ("user_agent", "flocksync"),
    ("seed", "1"),
    ("seed_min_free", "64"),
    ("seed_max_pages", "5"),
    ("max_api_fails", "5"),
    ("lockout_wait_min", "1"),
    ("lockout_wait_max", "10"),
];

#[derive(Clone)]
pub struct Settings {
    pool: Pool,
}

impl Settings {
    pub fn new(pool: Pool) -> Self {
        Self { pool }
    }

    /// Seed default keys, never overriding operator-set values.
    pub async fn seed_defaults(&self) -> Result<()> {
        for (key, value) in DEFAULTS {
            self.create(key, value, false).await?;
        }
        Ok(())
    }

    pub async fn create(&self, key: &str, value: &str, override_existing: bool) -> Result<()> {
        if override_existing {
            sqlx::query(
                "INSERT INTO settings (key, value) VALUES (?, ?) \
                 ON CONFLICT (key) DO UPDATE SET value = excluded.value",
            )
            .bind(key)
            .bind(value)
            .execute(&self.pool)
            .await?;
        } else {
            sqlx::query("INSERT INTO settings (key, value) VALUES (?, ?) ON CONFLICT DO NOTHING")
                .bind(key)
                .bind(value)
                .execute(&self.pool)
                .await?;
        }
        Ok(())
    }

    pub async fn get(&self, key: &str) -> Result<Option<String>> {
        let value = sqlx::query_scalar::<_, String>("SELECT value FROM settings WHERE key = ?")
            .bind(key)
            .fetch_optional(&self.pool)
            .await?;
        Ok(value)
    }

    async fn get_i64(&self, key: &str, default: i64) -> i64 {
        match self.get(key).await {
            Ok(Some(raw)) => match raw.trim().parse::<i64>() {
                Ok(v) => v,
                Err(_) => {
                    warn!(key, %raw, "unparseable setting, using default");
                    default
                }
            },
            Ok(None) => default,
            Err(err) => {
                warn!(key, ?err, "failed to read setting, using default");
                default
            }
        }
    }

    async fn get_bool(&self, key: &str, default: bool) -> bool {
        self.get_i64(key, default as i64).await != 0
    }

    async fn get_range(&self, min_key: &str, max_key: &str, default: (i64, i64)) -> RangeInclusive<i64> {
        let min = self.get_i64(min_key, default.0).await.max(0);
        let max = self.get_i64(max_key, default.1).await.max(min);
        min..=max
    }

    pub async fn enabled(&self) -> bool {
        self.get_bool("enabled", false).await
    }

    pub async fn verbose(&self) -> bool {
        self.get_bool("verbose", true).await
    }

    /// Whether the discovery crawler may grow the account pool at all.
    pub async fn seeding_enabled(&self) -> bool {
        self.get_bool("seed", true).await
    }

    pub async fn max_scan_users(&self) -> i64 {
        self.get_i64("max_scan_users", 10).await.max(0)
    }

    /// Back-pressure floor: stop discovering once this many unfollowed
    /// accounts are already pooled. 0 disables the gate.
    pub async fn seed_min_free(&self) -> i64 {
        self.get_i64("seed_min_free", 64).await.max(0)
    }

    /// Hard cap on pages crawled per account per discovery pass.
    pub async fn seed_max_pages(&self) -> i64 {
        self.get_i64("seed_max_pages", 5).await.max(1)
    }

    /// Consecutive failures before the breaker trips. 0 disables the breaker.
    pub async fn max_api_fails(&self) -> u32 {
        self.get_i64("max_api_fails", 5).await.max(0) as u32
    }

    /// Seconds to sleep between follower-list page fetches.
    pub async fn list_delay_secs(&self) -> RangeInclusive<i64> {
        self.get_range("wait_time_list_min", "wait_time_list_max", (5, 30))
            .await
    }

    /// Seconds to sleep between successful follow/unfollow actions.
    pub async fn follow_delay_secs(&self) -> RangeInclusive<i64> {
        self.get_range("wait_time_follow_min", "wait_time_follow_max", (10, 30))
            .await
    }

    /// Seconds to sleep between job passes.
    pub async fn scan_delay_secs(&self) -> RangeInclusive<i64> {
        self.get_range("scan_time_min", "scan_time_max", (5, 60)).await
    }

    /// Minutes the breaker stays locked after tripping.
    pub async fn lockout_minutes(&self) -> RangeInclusive<i64> {
        self.get_range("lockout_wait_min", "lockout_wait_max", (1, 10))
            .await
    }

    pub async fn user_agent(&self) -> String {
        match self.get("user_agent").await {
            Ok(Some(ua)) if !ua.trim().is_empty() => ua,
            _ => "flocksync".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlx::SqlitePool;

    async fn setup() -> Settings {
        let pool = SqlitePool::connect("sqlite::memory:").await.unwrap();
        sqlx::migrate!("./migrations").run(&pool).await.unwrap();
        let settings = Settings::new(pool);
        settings.seed_defaults().await.unwrap();
        settings
    }

    #[tokio::test]
    async fn defaults_are_seeded_without_override() {
        let settings = setup().await;
        assert!(!settings.enabled().await);
        assert_eq!(settings.max_api_fails().await, 5);

        settings.create("enabled", "1", true).await.unwrap();
        // Re-seeding must not clobber operator values.
        settings.seed_defaults().await.unwrap();
        assert!(settings.enabled().await);
    }

    #[tokio::test]
    async fn reads_are_live() {
        let settings = setup().await;
        assert_eq!(settings.max_scan_users().await, 10);
        settings.create("max_scan_users", "3", true).await.unwrap();
        assert_eq!(settings.max_scan_users().await, 3);
    }

    #[tokio::test]
    async fn malformed_values_fall_back_to_defaults() {
        let settings = setup().await;
        settings.create("max_api_fails", "lots", true).await.unwrap();
        assert_eq!(settings.max_api_fails().await, 5);
    }

    #[tokio::test]
    async fn ranges_are_clamped_sane() {
        let settings = setup().await;
        settings.create("wait_time_list_min", "20", true).await.unwrap();
        settings.create("wait_time_list_max", "10", true).await.unwrap();
        let range = settings.list_delay_secs().await;
        assert_eq!(range, 20..=20);
    }
}
