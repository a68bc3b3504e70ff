//! Pipeline configuration from environment variables
//!
//! `ThresholdConfig` is the validated indicator/alert surface handed to the
//! engine each cycle; `PipelineConfig` carries everything the runtime needs.

use super::error::ConfigError;
use std::env;
use std::time::Duration;

pub const DEFAULT_COINGECKO_BASE_URL: &str = "https://api.coingecko.com/api/v3";
pub const DEFAULT_TELEGRAM_BASE_URL: &str = "https://api.telegram.org";

pub const UNIVERSE_SIZE_RANGE: (usize, usize) = (10, 250);
pub const PERIOD_RANGE: (usize, usize) = (2, 50);
pub const LOW_THRESHOLD_RANGE: (f64, f64) = (1.0, 49.0);
pub const HIGH_THRESHOLD_RANGE: (f64, f64) = (51.0, 99.0);

/// RSI period and alert thresholds
///
/// Invariant: `period >= 2` and `0 < low < high < 100`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ThresholdConfig {
    period: usize,
    low: f64,
    high: f64,
}

impl ThresholdConfig {
    pub fn new(period: usize, low: f64, high: f64) -> Result<Self, ConfigError> {
        if period < 2 {
            return Err(ConfigError::InvalidValue(format!(
                "RSI period must be >= 2 (got {})",
                period
            )));
        }
        if !(low > 0.0 && high < 100.0) {
            return Err(ConfigError::InvalidValue(format!(
                "thresholds must lie in (0, 100) (got low={}, high={})",
                low, high
            )));
        }
        if low >= high {
            return Err(ConfigError::InvalidValue(format!(
                "low threshold {} must be below high threshold {}",
                low, high
            )));
        }
        Ok(Self { period, low, high })
    }

    pub fn period(&self) -> usize {
        self.period
    }

    pub fn low(&self) -> f64 {
        self.low
    }

    pub fn high(&self) -> f64 {
        self.high
    }
}

impl Default for ThresholdConfig {
    fn default() -> Self {
        Self {
            period: 13,
            low: 25.0,
            high: 75.0,
        }
    }
}

/// Telegram bot credentials; absent means notifications are disabled
#[derive(Debug, Clone, PartialEq)]
pub struct TelegramCredentials {
    pub bot_token: String,
    pub chat_id: String,
}

/// Configuration for the RSI runtime
///
/// Loaded from environment variables with sensible defaults.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Number of top assets by market cap
    pub universe_size: usize,

    pub thresholds: ThresholdConfig,

    /// `days` parameter of the OHLC endpoint (1 => ~30 minute bars)
    pub candle_window_days: u32,

    pub poll_interval: Duration,

    /// Upper bound on concurrent per-asset candle fetches
    pub max_concurrency: usize,

    pub coingecko_base_url: String,
    pub vs_currency: String,
    pub cache_ttl: Duration,
    pub http_timeout: Duration,

    pub telegram: Option<TelegramCredentials>,

    /// Dispatch the alert batch after every cycle (otherwise log only)
    pub notify_on_cycle: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            universe_size: 100,
            thresholds: ThresholdConfig::default(),
            candle_window_days: 1,
            poll_interval: Duration::from_secs(300),
            max_concurrency: 4,
            coingecko_base_url: DEFAULT_COINGECKO_BASE_URL.to_string(),
            vs_currency: "usd".to_string(),
            cache_ttl: Duration::from_secs(120),
            http_timeout: Duration::from_secs(30),
            telegram: None,
            notify_on_cycle: false,
        }
    }
}

impl PipelineConfig {
    /// Load configuration from environment variables
    ///
    /// Environment variables:
    /// - `RSI_UNIVERSE_SIZE` (default: 100, range 10-250)
    /// - `RSI_PERIOD` (default: 13, range 2-50)
    /// - `RSI_LOW_THRESHOLD` (default: 25, range 1-49)
    /// - `RSI_HIGH_THRESHOLD` (default: 75, range 51-99)
    /// - `RSI_CANDLE_DAYS` (default: 1)
    /// - `POLL_INTERVAL_SECS` (default: 300)
    /// - `MAX_CONCURRENT_FETCHES` (default: 4)
    /// - `COINGECKO_BASE_URL` (default: public v3 API)
    /// - `VS_CURRENCY` (default: usd)
    /// - `CACHE_TTL_SECS` (default: 120)
    /// - `HTTP_TIMEOUT_SECS` (default: 30)
    /// - `TELEGRAM_BOT_TOKEN` / `TELEGRAM_CHAT_ID` (optional, both required to enable)
    /// - `NOTIFY_ON_CYCLE` (default: false)
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let universe_size = parse_var("RSI_UNIVERSE_SIZE", defaults.universe_size)?;
        check_range("RSI_UNIVERSE_SIZE", universe_size, UNIVERSE_SIZE_RANGE)?;

        let period = parse_var("RSI_PERIOD", defaults.thresholds.period())?;
        check_range("RSI_PERIOD", period, PERIOD_RANGE)?;

        let low = parse_var("RSI_LOW_THRESHOLD", defaults.thresholds.low())?;
        check_range("RSI_LOW_THRESHOLD", low, LOW_THRESHOLD_RANGE)?;

        let high = parse_var("RSI_HIGH_THRESHOLD", defaults.thresholds.high())?;
        check_range("RSI_HIGH_THRESHOLD", high, HIGH_THRESHOLD_RANGE)?;

        let max_concurrency: usize = parse_var("MAX_CONCURRENT_FETCHES", defaults.max_concurrency)?;
        if max_concurrency == 0 {
            return Err(ConfigError::InvalidValue(
                "MAX_CONCURRENT_FETCHES must be at least 1".to_string(),
            ));
        }

        let telegram = match (non_empty_var("TELEGRAM_BOT_TOKEN"), non_empty_var("TELEGRAM_CHAT_ID")) {
            (Some(bot_token), Some(chat_id)) => Some(TelegramCredentials { bot_token, chat_id }),
            _ => None,
        };

        Ok(Self {
            universe_size,
            thresholds: ThresholdConfig::new(period, low, high)?,
            candle_window_days: parse_var("RSI_CANDLE_DAYS", defaults.candle_window_days)?,
            poll_interval: parse_nonzero_secs("POLL_INTERVAL_SECS", defaults.poll_interval)?,
            max_concurrency,
            coingecko_base_url: non_empty_var("COINGECKO_BASE_URL")
                .unwrap_or(defaults.coingecko_base_url),
            vs_currency: non_empty_var("VS_CURRENCY").unwrap_or(defaults.vs_currency),
            cache_ttl: Duration::from_secs(parse_var("CACHE_TTL_SECS", defaults.cache_ttl.as_secs())?),
            http_timeout: parse_nonzero_secs("HTTP_TIMEOUT_SECS", defaults.http_timeout)?,
            telegram,
            notify_on_cycle: parse_var("NOTIFY_ON_CYCLE", defaults.notify_on_cycle)?,
        })
    }
}

fn non_empty_var(name: &str) -> Option<String> {
    env::var(name)
        .ok()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

fn parse_var<T: std::str::FromStr>(name: &str, default: T) -> Result<T, ConfigError> {
    match non_empty_var(name) {
        Some(raw) => raw
            .parse()
            .map_err(|_| ConfigError::InvalidValue(format!("{}={} is not valid", name, raw))),
        None => Ok(default),
    }
}

/// Whole seconds, at least 1
fn parse_nonzero_secs(name: &str, default: Duration) -> Result<Duration, ConfigError> {
    let secs: u64 = parse_var(name, default.as_secs())?;
    if secs == 0 {
        return Err(ConfigError::InvalidValue(format!("{} must be at least 1", name)));
    }
    Ok(Duration::from_secs(secs))
}

fn check_range<T: PartialOrd + std::fmt::Display>(
    name: &str,
    value: T,
    (min, max): (T, T),
) -> Result<(), ConfigError> {
    if value < min || value > max {
        return Err(ConfigError::InvalidValue(format!(
            "{}={} outside [{}, {}]",
            name, value, min, max
        )));
    }
    Ok(())
}
