use std::env;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{Context, anyhow};
use chrono::FixedOffset;
use dotenvy::dotenv;

use crate::engine::EngineSettings;
use crate::engine::compliance::DeductionPolicy;
use crate::engine::presence::WatchOptions;
use crate::utils::time::parse_utc_offset;

#[derive(Clone, Debug)]
pub struct Config {
    pub server_addr: String,
    /// Unset means the in-memory record store.
    pub database_url: Option<String>,
    pub api_prefix: String,
    pub log_dir: String,

    // Rate limiting
    pub rate_protected_per_min: u32,

    // Attendance rules
    pub utc_offset: FixedOffset,
    pub late_grace_minutes: i64,
    pub half_day_after_minutes: i64,
    pub full_day_after_minutes: i64,
    pub location_fix_timeout_ms: u64,
    pub live_channel_capacity: usize,
}

/// Reads `key`, falling back to `default` when unset. Malformed values are errors.
fn parse_or<T>(key: &str, default: T) -> anyhow::Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map_err(|e| anyhow!("{key} is malformed ({raw:?}): {e}")),
        Err(_) => Ok(default),
    }
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        dotenv().ok();

        let raw_offset = env::var("ATTENDANCE_UTC_OFFSET").unwrap_or_else(|_| "+03:00".to_string());
        let utc_offset = parse_utc_offset(&raw_offset)
            .ok_or_else(|| anyhow!("ATTENDANCE_UTC_OFFSET is malformed ({raw_offset:?})"))?;

        let config = Self {
            server_addr: env::var("SERVER_ADDR").context("SERVER_ADDR must be set")?,
            database_url: env::var("DATABASE_URL").ok().filter(|url| !url.trim().is_empty()),
            api_prefix: env::var("API_PREFIX").unwrap_or_else(|_| "/api".to_string()),
            log_dir: env::var("LOG_DIR").unwrap_or_else(|_| "logs".to_string()),

            rate_protected_per_min: parse_or("RATE_PROTECTED_PER_MIN", 1000)?,

            utc_offset,
            late_grace_minutes: parse_or("LATE_GRACE_MINUTES", 15)?,
            half_day_after_minutes: parse_or("HALF_DAY_AFTER_MINUTES", 30)?,
            full_day_after_minutes: parse_or("FULL_DAY_AFTER_MINUTES", 60)?,
            location_fix_timeout_ms: parse_or("LOCATION_FIX_TIMEOUT_MS", 10_000)?,
            live_channel_capacity: parse_or("LIVE_CHANNEL_CAPACITY", 256)?,
        };
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> anyhow::Result<()> {
        let ordered = 0 <= self.late_grace_minutes
            && self.late_grace_minutes <= self.half_day_after_minutes
            && self.half_day_after_minutes <= self.full_day_after_minutes;
        if !ordered {
            return Err(anyhow!(
                "deduction thresholds must satisfy 0 <= grace <= half-day <= full-day"
            ));
        }
        if self.live_channel_capacity == 0 {
            return Err(anyhow!("LIVE_CHANNEL_CAPACITY must be positive"));
        }
        Ok(())
    }

    pub fn engine_settings(&self) -> EngineSettings {
        EngineSettings {
            utc_offset: self.utc_offset,
            policy: DeductionPolicy {
                grace_minutes: self.late_grace_minutes,
                half_day_after_minutes: self.half_day_after_minutes,
                full_day_after_minutes: self.full_day_after_minutes,
            },
            watch: WatchOptions {
                fix_timeout: Duration::from_millis(self.location_fix_timeout_ms),
            },
            channel_capacity: self.live_channel_capacity,
        }
    }
}
