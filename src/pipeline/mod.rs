//! # RSI Alert Pipeline
//!
//! Pulls the top-N assets by market cap from CoinGecko, computes a
//! Wilder-smoothed RSI over each asset's recent closes, and flags assets
//! at or beyond the configured oversold/overbought thresholds.
//!
//! ## Flow
//!
//! ```text
//! fetch_ranked_assets ─► fetch_candles (per asset, bounded parallel)
//!                          ─► closes ─► compute_rsi ─► classify
//!                                                        ─► Report + Vec<Alert>
//! ```
//!
//! One asset failing never aborts the cycle; its row is simply undefined.
//! Only a failed ranked-asset fetch makes a cycle fail.
//!
//! ## Module Organization
//!
//! - `types` - AssetRef, Candle, OscillatorReading, Alert, Report
//! - `error` - PipelineError / ConfigError
//! - `config` - ThresholdConfig and env-driven PipelineConfig
//! - `cache` - TTL cache used by the upstream client
//! - `coingecko` - CandleSource trait + CoinGecko HTTP client
//! - `indicator` - RSI computation
//! - `classifier` - threshold classification
//! - `engine` - per-cycle orchestration
//! - `notifier` - Telegram delivery of an alert batch
//! - `scheduler` - polling loop publishing cycle snapshots

pub mod types;
pub mod error;
pub mod config;
pub mod cache;
pub mod coingecko;
pub mod indicator;
pub mod classifier;
pub mod engine;
pub mod notifier;
pub mod scheduler;

// Re-export commonly used types
pub use types::{Alert, AlertDirection, AssetRef, Candle, OscillatorReading, RankedAsset, Report, ReportRow};
pub use error::{ConfigError, PipelineError};
pub use config::{PipelineConfig, TelegramCredentials, ThresholdConfig};
pub use cache::TtlCache;
pub use coingecko::{CandleSource, CoinGeckoClient};
pub use indicator::{compute_rsi, WilderRsi};
pub use classifier::classify;
pub use engine::{CycleOutput, EngineSettings, RsiEngine};
pub use notifier::{dispatch_alerts, spawn_dispatch, DeliverySummary, Notifier, TelegramNotifier};
pub use scheduler::{poll_scheduler_task, CycleStatus, SchedulerParams};
