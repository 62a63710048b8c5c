use std::env;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use chrono::Weekday;
use dotenvy::dotenv;

use crate::db::DbSettings;
use crate::model::leave::LeaveType;
use crate::service::rules::{EarlyReleaseRule, RuleSet};

#[derive(Clone, Debug)]
pub struct Config {
    pub database_url: String,
    pub server_addr: String,
    pub api_prefix: String,

    pub log_dir: String,
    pub log_level: tracing::Level,

    pub db: DbSettings,

    // Exception rules
    pub rules: RuleSet,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build from any key/value source; unset keys take their defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let var = |key: &str, default: &str| lookup(key).unwrap_or_else(|| default.to_string());

        Ok(Self {
            database_url: var("DATABASE_URL", "sqlite://attendance.db"),
            server_addr: var("SERVER_ADDR", "127.0.0.1:8080"),
            api_prefix: var("API_PREFIX", "/api"),
            log_dir: var("LOG_DIR", "logs"),
            log_level: parse_key("LOG_LEVEL", &var("LOG_LEVEL", "info"))?,
            db: DbSettings {
                max_connections: parse_key("DB_MAX_CONNECTIONS", &var("DB_MAX_CONNECTIONS", "4"))?,
                busy_timeout: Duration::from_millis(parse_key(
                    "DB_BUSY_TIMEOUT_MS",
                    &var("DB_BUSY_TIMEOUT_MS", "5000"),
                )?),
            },
            rules: RuleSet::new(
                parse_weekend_days(&var("WEEKEND_DAYS", "sat,sun"))?,
                parse_early_release(&var("EARLY_RELEASE_RULE", "3:wed"))?,
                parse_half_day_codes(&var("HALF_DAY_LEAVE_CODES", "half_day,half_day_am,half_day_pm"))?,
            ),
        })
    }
}

fn parse_key<T>(key: &str, value: &str) -> Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    value
        .trim()
        .parse()
        .map_err(|e| anyhow!("{key}={value:?}: {e}"))
}

fn list(value: &str) -> impl Iterator<Item = &str> {
    value.split(',').map(str::trim).filter(|s| !s.is_empty())
}

pub fn parse_weekend_days(value: &str) -> Result<Vec<Weekday>> {
    list(value)
        .map(|day| {
            day.parse::<Weekday>()
                .map_err(|_| anyhow!("WEEKEND_DAYS: unknown weekday `{day}`"))
        })
        .collect()
}

pub fn parse_early_release(value: &str) -> Result<Option<EarlyReleaseRule>> {
    match value.trim() {
        "" | "off" | "none" => Ok(None),
        rule => rule
            .parse()
            .map(Some)
            .context("EARLY_RELEASE_RULE"),
    }
}

pub fn parse_half_day_codes(value: &str) -> Result<Vec<LeaveType>> {
    list(value)
        .map(|code| {
            LeaveType::from_str(code)
                .map_err(|_| anyhow!("HALF_DAY_LEAVE_CODES: unknown leave code `{code}`"))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use std::collections::HashMap;

    fn config(pairs: &[(&str, &str)]) -> Result<Config> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn defaults_apply_when_unset() {
        let cfg = config(&[]).unwrap();
        assert_eq!(cfg.api_prefix, "/api");
        assert_eq!(cfg.db.max_connections, 4);
        assert_eq!(cfg.db.busy_timeout, Duration::from_millis(5000));
        assert_eq!(cfg.log_level, tracing::Level::INFO);
        assert_eq!(cfg.rules, RuleSet::default());
    }

    #[test]
    fn rule_options_are_read() {
        let cfg = config(&[
            ("WEEKEND_DAYS", "fri, sat"),
            ("EARLY_RELEASE_RULE", "off"),
            ("HALF_DAY_LEAVE_CODES", "half_day_am,training"),
        ])
        .unwrap();
        let friday = NaiveDate::from_ymd_opt(2025, 9, 5).unwrap();
        assert!(cfg.rules.is_weekend(friday));
        assert!(cfg.rules.early_release().is_none());
        assert!(cfg.rules.is_half_day_leave(LeaveType::Training));
        assert!(!cfg.rules.is_half_day_leave(LeaveType::HalfDayPm));
    }

    #[test]
    fn malformed_values_are_errors() {
        assert!(config(&[("WEEKEND_DAYS", "caturday")]).is_err());
        assert!(config(&[("EARLY_RELEASE_RULE", "third wednesday")]).is_err());
        assert!(config(&[("HALF_DAY_LEAVE_CODES", "nap")]).is_err());
        assert!(config(&[("DB_BUSY_TIMEOUT_MS", "soon")]).is_err());
        assert!(config(&[("LOG_LEVEL", "loud")]).is_err());
    }
}
