//! RSI Engine - Orchestration layer for one polling cycle
//!
//! ## Architecture
//!
//! ```text
//! CandleSource::fetch_ranked_assets(limit)      (fatal on failure)
//!     ↓
//! per asset, bounded by a semaphore, each on its own task:
//!     CandleSource::fetch_candles(id, days)     (failure => undefined reading)
//!     ↓
//!     closes_from_candles → compute_rsi
//!     ↓
//! Report (ascending RSI, undefined last) → classify → Vec<Alert>
//! ```
//!
//! Each cycle starts from scratch; nothing carries over between cycles.
//! Dropping the `run_cycle` future aborts every in-flight asset task and
//! nothing partial escapes.

use super::classifier::classify;
use super::coingecko::{CandleSource, RATE_LIMIT_BACKOFF};
use super::config::{PipelineConfig, ThresholdConfig};
use super::error::PipelineError;
use super::indicator::{closes_from_candles, compute_rsi};
use super::types::{Alert, OscillatorReading, RankedAsset, Report};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

/// Engine tuning independent of the per-cycle thresholds
#[derive(Debug, Clone)]
pub struct EngineSettings {
    /// Max concurrent candle fetches
    pub max_concurrency: usize,
    pub candle_window_days: u32,
    /// Deadline for one asset's fetch including the 429 retry
    pub asset_timeout: Duration,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            max_concurrency: 4,
            candle_window_days: 1,
            asset_timeout: Duration::from_secs(30) * 2 + RATE_LIMIT_BACKOFF,
        }
    }
}

impl EngineSettings {
    pub fn from_config(config: &PipelineConfig) -> Self {
        Self {
            max_concurrency: config.max_concurrency.max(1),
            candle_window_days: config.candle_window_days,
            // two attempts plus the backoff between them
            asset_timeout: config.http_timeout * 2 + RATE_LIMIT_BACKOFF,
        }
    }
}

/// Result of one completed cycle
#[derive(Debug, Clone)]
pub struct CycleOutput {
    pub report: Report,
    /// Threshold crossings in report order
    pub alerts: Vec<Alert>,
    /// Assets whose candle fetch failed or timed out
    pub failed_assets: usize,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

/// Outcome of one asset's task
struct AssetOutcome {
    index: usize,
    value: Result<Option<f64>, PipelineError>,
}

/// Drives CandleSource → indicator → classifier for a ranked universe
pub struct RsiEngine {
    source: Arc<dyn CandleSource>,
    settings: EngineSettings,

    /// Timestamp function (for testing with mock time)
    now_fn: Box<dyn Fn() -> DateTime<Utc> + Send + Sync>,
}

impl RsiEngine {
    pub fn new(source: Arc<dyn CandleSource>, settings: EngineSettings) -> Self {
        Self::new_with_timestamp_fn(source, settings, Box::new(Utc::now))
    }

    pub fn new_with_timestamp_fn(
        source: Arc<dyn CandleSource>,
        settings: EngineSettings,
        now_fn: Box<dyn Fn() -> DateTime<Utc> + Send + Sync>,
    ) -> Self {
        Self {
            source,
            settings,
            now_fn,
        }
    }

    pub fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    /// Run one full cycle over the top `limit` assets
    ///
    /// # Returns
    /// * `Ok(CycleOutput)` - Report with one row per ranked asset (some may be undefined)
    /// * `Err(PipelineError::Universe)` - Ranked-asset fetch failed; nothing to report
    pub async fn run_cycle(
        &self,
        limit: usize,
        thresholds: &ThresholdConfig,
    ) -> Result<CycleOutput, PipelineError> {
        let started_at = (self.now_fn)();
        let cycle_start = std::time::Instant::now();

        let assets = self
            .source
            .fetch_ranked_assets(limit)
            .await
            .map_err(|e| PipelineError::Universe(Box::new(e)))?;

        log::debug!(
            "Evaluating {} assets (period {}, concurrency {})",
            assets.len(),
            thresholds.period(),
            self.settings.max_concurrency
        );

        let mut values = self.evaluate_assets(&assets, thresholds.period()).await;

        let mut failed_assets = 0;
        let mut entries = Vec::with_capacity(assets.len());
        for (index, ranked) in assets.into_iter().enumerate() {
            let computed_at = (self.now_fn)();
            let reading = match values[index].take() {
                Some(Ok(Some(value))) => OscillatorReading::defined(&ranked.asset.id, value, computed_at),
                Some(Ok(None)) => {
                    log::debug!("Insufficient history for {}", ranked.asset.id);
                    OscillatorReading::undefined(&ranked.asset.id, computed_at)
                }
                Some(Err(e)) => {
                    log::warn!("⚠️  Candle fetch failed for {}: {}", ranked.asset.id, e);
                    failed_assets += 1;
                    OscillatorReading::undefined(&ranked.asset.id, computed_at)
                }
                None => {
                    // task panicked or was aborted
                    failed_assets += 1;
                    OscillatorReading::undefined(&ranked.asset.id, computed_at)
                }
            };
            entries.push((ranked, reading));
        }

        let report = Report::new(entries);
        let alerts: Vec<Alert> = report
            .entries()
            .iter()
            .filter_map(|(ranked, reading)| classify(ranked, reading, thresholds))
            .collect();

        log::info!(
            "🔄 Cycle complete: {} assets, {} defined, {} alerts, {} failed ({}ms)",
            report.len(),
            report.defined_count(),
            alerts.len(),
            failed_assets,
            cycle_start.elapsed().as_millis()
        );

        Ok(CycleOutput {
            report,
            alerts,
            failed_assets,
            started_at,
            finished_at: (self.now_fn)(),
        })
    }

    /// Fetch and compute every asset; slot `i` holds asset `i`'s outcome
    async fn evaluate_assets(
        &self,
        assets: &[RankedAsset],
        period: usize,
    ) -> Vec<Option<Result<Option<f64>, PipelineError>>> {
        let semaphore = Arc::new(Semaphore::new(self.settings.max_concurrency.max(1)));
        let mut tasks = JoinSet::new();

        for (index, ranked) in assets.iter().enumerate() {
            let source = self.source.clone();
            let semaphore = semaphore.clone();
            let asset_id = ranked.asset.id.clone();
            let days = self.settings.candle_window_days;
            let timeout = self.settings.asset_timeout;

            tasks.spawn(async move {
                // Semaphore is never closed
                let _permit = semaphore.acquire_owned().await.ok();
                let value = evaluate_asset(source.as_ref(), &asset_id, days, period, timeout).await;
                AssetOutcome { index, value }
            });
        }

        let mut values: Vec<Option<Result<Option<f64>, PipelineError>>> =
            (0..assets.len()).map(|_| None).collect();

        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(outcome) => values[outcome.index] = Some(outcome.value),
                Err(e) => log::error!("❌ Asset task failed: {}", e),
            }
        }
        values
    }
}

async fn evaluate_asset(
    source: &dyn CandleSource,
    asset_id: &str,
    days: u32,
    period: usize,
    timeout: Duration,
) -> Result<Option<f64>, PipelineError> {
    let candles = tokio::time::timeout(timeout, source.fetch_candles(asset_id, days))
        .await
        .map_err(|_| PipelineError::Timeout {
            asset_id: asset_id.to_string(),
            after: timeout,
        })??;

    let closes = closes_from_candles(&candles);
    Ok(compute_rsi(&closes, period))
}
