use std::str::FromStr;

use anyhow::{anyhow, Context};
use chrono::{Duration, Weekday};

use crate::ratelimit::RateLimitConfig;
use crate::trends::{TrendConfig, WeekRule};

#[derive(Debug, Clone, PartialEq)]
pub struct AppConfig {
    pub database_url: Option<String>,
    pub max_connections: u32,
    pub trend: TrendConfig,
    pub rate_limit: RateLimitConfig,
}

impl AppConfig {
    /// Reads the process environment. Call `dotenvy::dotenv()` first to pick
    /// up a `.env` file.
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> anyhow::Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = RateLimitConfig::default();
        let trend_defaults = TrendConfig::default();

        let week_start = match lookup("TREND_WEEK_START") {
            Some(value) => Weekday::from_str(&value)
                .map_err(|_| anyhow!("TREND_WEEK_START: invalid weekday '{value}'"))?,
            None => trend_defaults.week_start,
        };

        Ok(Self {
            database_url: lookup("DATABASE_URL"),
            max_connections: parse_or(&lookup, "DATABASE_MAX_CONNECTIONS", 5)?,
            trend: TrendConfig {
                week_start,
                week_rule: parse_or::<WeekRule, _>(
                    &lookup,
                    "TREND_WEEK_RULE",
                    trend_defaults.week_rule,
                )?,
            },
            rate_limit: RateLimitConfig {
                max_requests: parse_or(&lookup, "RATE_LIMIT_REQUESTS", defaults.max_requests)?,
                window: Duration::seconds(parse_or(
                    &lookup,
                    "RATE_LIMIT_WINDOW_SECS",
                    defaults.window.num_seconds(),
                )?),
                capacity: parse_or(&lookup, "RATE_LIMIT_CAPACITY", defaults.capacity)?,
                sweep_interval: Duration::seconds(parse_or(
                    &lookup,
                    "RATE_LIMIT_SWEEP_SECS",
                    defaults.sweep_interval.num_seconds(),
                )?),
            },
        })
    }

    pub fn database_url(&self) -> anyhow::Result<&str> {
        self.database_url
            .as_deref()
            .context("DATABASE_URL must be set to a Postgres instance")
    }
}

fn parse_or<T, F>(lookup: &F, key: &str, default: T) -> anyhow::Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        Some(value) => value
            .trim()
            .parse()
            .map_err(|err| anyhow!("{key}: invalid value '{value}': {err}")),
        None => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config_from(pairs: &[(&str, &str)]) -> anyhow::Result<AppConfig> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        AppConfig::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn defaults_are_iso_weeks_and_hundred_per_minute() {
        let config = config_from(&[]).unwrap();
        assert_eq!(config.trend, TrendConfig::default());
        assert_eq!(config.trend.week_start, Weekday::Mon);
        assert_eq!(config.rate_limit, RateLimitConfig::default());
        assert_eq!(config.rate_limit.max_requests, 100);
        assert_eq!(config.max_connections, 5);
        assert!(config.database_url().is_err());
    }

    #[test]
    fn overrides_are_parsed() {
        let config = config_from(&[
            ("DATABASE_URL", "postgres://localhost/progress"),
            ("TREND_WEEK_START", "sunday"),
            ("TREND_WEEK_RULE", "first-day"),
            ("RATE_LIMIT_REQUESTS", "20"),
            ("RATE_LIMIT_WINDOW_SECS", "30"),
        ])
        .unwrap();
        assert_eq!(config.database_url().unwrap(), "postgres://localhost/progress");
        assert_eq!(config.trend.week_start, Weekday::Sun);
        assert_eq!(config.trend.week_rule, WeekRule::FirstDay);
        assert_eq!(config.rate_limit.max_requests, 20);
        assert_eq!(config.rate_limit.window, Duration::seconds(30));
    }

    #[test]
    fn invalid_values_are_rejected() {
        assert!(config_from(&[("RATE_LIMIT_REQUESTS", "lots")]).is_err());
        assert!(config_from(&[("TREND_WEEK_RULE", "locale")]).is_err());
        assert!(config_from(&[("TREND_WEEK_START", "someday")]).is_err());
    }
}
