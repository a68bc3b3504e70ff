//! CoinGecko API Integration
//!
//! Provides the two upstream reads the RSI pipeline needs:
//! - Ranked asset list (top N by market cap), paged
//! - Per-asset OHLC candles
//!
//! ## API Reference
//!
//! Endpoints:
//! - `GET {base}/coins/markets?vs_currency&order&per_page&page&sparkline`
//!   Returns: Array of `{id, name, symbol, current_price, market_cap_rank, ...}`
//! - `GET {base}/coins/{id}/ohlc?vs_currency&days`
//!   Returns: Array of `[timestamp_ms, open, high, low, close]`
//!
//! The public API rate-limits aggressively. Candle fetches back off once on
//! HTTP 429 and both reads are memoised in a `TtlCache`.
//!
//! ## Usage
//!
//! ```ignore
//! use rsiwatch::pipeline::coingecko::{CandleSource, CoinGeckoClient};
//!
//! let client = CoinGeckoClient::from_config(&config)?;
//! let assets = client.fetch_ranked_assets(100).await?;
//! let candles = client.fetch_candles(&assets[0].asset.id, 1).await?;
//! ```

use super::cache::TtlCache;
use super::config::PipelineConfig;
use super::error::PipelineError;
use super::types::{AssetRef, Candle, RankedAsset};
use async_trait::async_trait;
use reqwest::StatusCode;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// Largest `per_page` the markets endpoint accepts
pub const MAX_PAGE_SIZE: usize = 250;

/// Fixed delay before the single 429 retry
pub const RATE_LIMIT_BACKOFF: Duration = Duration::from_secs(5);

const MARKETS_ENDPOINT: &str = "/coins/markets";

/// Source of ranked assets and candle series
#[async_trait]
pub trait CandleSource: Send + Sync {
    /// Top `limit` assets by market cap, rank order
    async fn fetch_ranked_assets(&self, limit: usize) -> Result<Vec<RankedAsset>, PipelineError>;

    /// Chronological candles for one asset over the last `window_days`
    async fn fetch_candles(
        &self,
        asset_id: &str,
        window_days: u32,
    ) -> Result<Vec<Candle>, PipelineError>;
}

/// HTTP client for the CoinGecko v3 API
pub struct CoinGeckoClient {
    http: reqwest::Client,
    base_url: String,
    vs_currency: String,
    rate_limit_backoff: Duration,
    backoffs_taken: AtomicU64,
    markets_cache: TtlCache<usize, Vec<RankedAsset>>,
    candles_cache: TtlCache<(String, u32), Vec<Candle>>,
}

impl CoinGeckoClient {
    pub fn new(
        base_url: &str,
        vs_currency: &str,
        http_timeout: Duration,
        cache_ttl: Duration,
    ) -> Result<Self, PipelineError> {
        let http = reqwest::Client::builder()
            .timeout(http_timeout)
            .user_agent(concat!("rsiwatch/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|source| PipelineError::UpstreamTransport {
                endpoint: base_url.to_string(),
                source,
            })?;

        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            vs_currency: vs_currency.to_string(),
            rate_limit_backoff: RATE_LIMIT_BACKOFF,
            backoffs_taken: AtomicU64::new(0),
            markets_cache: TtlCache::new(cache_ttl),
            candles_cache: TtlCache::new(cache_ttl),
        })
    }

    pub fn from_config(config: &PipelineConfig) -> Result<Self, PipelineError> {
        Self::new(
            &config.coingecko_base_url,
            &config.vs_currency,
            config.http_timeout,
            config.cache_ttl,
        )
    }

    /// Override the 429 backoff (tests use milliseconds)
    pub fn with_rate_limit_backoff(mut self, backoff: Duration) -> Self {
        self.rate_limit_backoff = backoff;
        self
    }

    pub fn rate_limit_backoff(&self) -> Duration {
        self.rate_limit_backoff
    }

    /// Number of 429 backoff sleeps taken since construction
    pub fn rate_limit_backoffs(&self) -> u64 {
        self.backoffs_taken.load(Ordering::Relaxed)
    }

    /// Drop expired cache entries from both caches
    pub fn purge_expired_cache(&self) -> usize {
        self.markets_cache.purge_expired() + self.candles_cache.purge_expired()
    }

    /// One markets page: usable rows plus the raw row count
    async fn fetch_markets_page(
        &self,
        per_page: usize,
        page: usize,
    ) -> Result<(Vec<RankedAsset>, usize), PipelineError> {
        let url = format!("{}{}", self.base_url, MARKETS_ENDPOINT);
        let query = [
            ("vs_currency", self.vs_currency.clone()),
            ("order", "market_cap_desc".to_string()),
            ("per_page", per_page.to_string()),
            ("page", page.to_string()),
            ("sparkline", "false".to_string()),
        ];

        let response = self.get_once(MARKETS_ENDPOINT, &url, &query).await?;
        let response = check_status(MARKETS_ENDPOINT, response)?;

        let body: serde_json::Value =
            response
                .json()
                .await
                .map_err(|e| PipelineError::MalformedData {
                    endpoint: MARKETS_ENDPOINT.to_string(),
                    reason: e.to_string(),
                })?;

        let row_count = body.as_array().map_or(0, Vec::len);
        let assets = parse_market_rows(MARKETS_ENDPOINT, &body)?;
        Ok((assets, row_count))
    }

    async fn get_once(
        &self,
        endpoint: &str,
        url: &str,
        query: &[(&str, String)],
    ) -> Result<reqwest::Response, PipelineError> {
        self.http
            .get(url)
            .query(query)
            .send()
            .await
            .map_err(|source| PipelineError::UpstreamTransport {
                endpoint: endpoint.to_string(),
                source,
            })
    }

    /// GET with the single-retry 429 policy
    async fn get_with_rate_limit_retry(
        &self,
        endpoint: &str,
        url: &str,
        query: &[(&str, String)],
    ) -> Result<reqwest::Response, PipelineError> {
        let response = self.get_once(endpoint, url, query).await?;
        if response.status() != StatusCode::TOO_MANY_REQUESTS {
            return check_status(endpoint, response);
        }

        self.backoffs_taken.fetch_add(1, Ordering::Relaxed);
        log::warn!(
            "⏳ Rate limited on {}, retrying once in {:?}",
            endpoint,
            self.rate_limit_backoff
        );
        tokio::time::sleep(self.rate_limit_backoff).await;

        let retry = self.get_once(endpoint, url, query).await?;
        if retry.status() == StatusCode::TOO_MANY_REQUESTS {
            return Err(PipelineError::RateLimited {
                endpoint: endpoint.to_string(),
            });
        }
        check_status(endpoint, retry)
    }
}

#[async_trait]
impl CandleSource for CoinGeckoClient {
    async fn fetch_ranked_assets(&self, limit: usize) -> Result<Vec<RankedAsset>, PipelineError> {
        if limit == 0 {
            return Ok(Vec::new());
        }
        if let Some(cached) = self.markets_cache.get(&limit) {
            log::debug!("📦 Ranked assets served from cache (limit {})", limit);
            return Ok(cached);
        }

        let per_page = limit.min(MAX_PAGE_SIZE);
        let mut assets: Vec<RankedAsset> = Vec::with_capacity(limit);
        let mut page = 1;

        while assets.len() < limit {
            let (batch, row_count) = self.fetch_markets_page(per_page, page).await?;
            assets.extend(batch);

            // Short page means the upstream ran out of rows
            if row_count < per_page {
                break;
            }
            page += 1;
        }
        assets.truncate(limit);

        log::debug!("Fetched {} ranked assets over {} page(s)", assets.len(), page);
        self.markets_cache.insert(limit, assets.clone());
        Ok(assets)
    }

    async fn fetch_candles(
        &self,
        asset_id: &str,
        window_days: u32,
    ) -> Result<Vec<Candle>, PipelineError> {
        let key = (asset_id.to_string(), window_days);
        if let Some(cached) = self.candles_cache.get(&key) {
            log::debug!("📦 Candles for {} served from cache", asset_id);
            return Ok(cached);
        }

        let endpoint = format!("/coins/{}/ohlc", asset_id);
        let url = format!("{}{}", self.base_url, endpoint);
        let query = [
            ("vs_currency", self.vs_currency.clone()),
            ("days", window_days.to_string()),
        ];

        let response = self.get_with_rate_limit_retry(&endpoint, &url, &query).await?;
        let rows: serde_json::Value =
            response
                .json()
                .await
                .map_err(|e| PipelineError::MalformedData {
                    endpoint: endpoint.clone(),
                    reason: e.to_string(),
                })?;

        let candles = parse_ohlc_rows(&endpoint, &rows)?;
        self.candles_cache.insert(key, candles.clone());
        Ok(candles)
    }
}

fn check_status(
    endpoint: &str,
    response: reqwest::Response,
) -> Result<reqwest::Response, PipelineError> {
    if response.status().is_success() {
        Ok(response)
    } else {
        Err(PipelineError::UpstreamStatus {
            endpoint: endpoint.to_string(),
            status: response.status().as_u16(),
        })
    }
}

/// Parse markets rows into ranked assets, skipping any without a usable `id`
///
/// Only a non-array body is an error. A missing or non-numeric price or rank
/// leaves that field empty rather than dropping the row.
pub fn parse_market_rows(
    endpoint: &str,
    body: &serde_json::Value,
) -> Result<Vec<RankedAsset>, PipelineError> {
    let rows = body.as_array().ok_or_else(|| PipelineError::MalformedData {
        endpoint: endpoint.to_string(),
        reason: "expected a JSON array of market rows".to_string(),
    })?;

    let assets: Vec<RankedAsset> = rows.iter().filter_map(parse_market_row).collect();
    let skipped = rows.len() - assets.len();
    if skipped > 0 {
        log::debug!("⚠️  Skipped {} malformed market row(s) from {}", skipped, endpoint);
    }
    Ok(assets)
}

fn parse_market_row(row: &serde_json::Value) -> Option<RankedAsset> {
    let id = row.get("id")?.as_str().filter(|id| !id.is_empty())?;
    let text = |key: &str| row.get(key).and_then(|v| v.as_str()).filter(|s| !s.is_empty());

    Some(RankedAsset {
        asset: AssetRef {
            id: id.to_string(),
            display_name: text("name").unwrap_or(id).to_string(),
            symbol: text("symbol").unwrap_or_default().to_uppercase(),
        },
        current_price: row
            .get("current_price")
            .and_then(|v| v.as_f64())
            .filter(|p| p.is_finite()),
        market_cap_rank: row
            .get("market_cap_rank")
            .and_then(|v| v.as_u64())
            .and_then(|r| u32::try_from(r).ok()),
    })
}

/// Parse `[ts, open, high, low, close]` rows, skipping any that don't fit
///
/// Only a non-array body is an error; bad rows are dropped.
pub fn parse_ohlc_rows(
    endpoint: &str,
    body: &serde_json::Value,
) -> Result<Vec<Candle>, PipelineError> {
    let rows = body.as_array().ok_or_else(|| PipelineError::MalformedData {
        endpoint: endpoint.to_string(),
        reason: "expected a JSON array of OHLC rows".to_string(),
    })?;

    let mut candles = Vec::with_capacity(rows.len());
    let mut skipped = 0usize;
    for row in rows {
        match parse_ohlc_row(row) {
            Some(candle) => candles.push(candle),
            None => skipped += 1,
        }
    }

    if skipped > 0 {
        log::debug!("⚠️  Skipped {} malformed OHLC row(s) from {}", skipped, endpoint);
    }
    Ok(candles)
}

fn parse_ohlc_row(row: &serde_json::Value) -> Option<Candle> {
    let fields = row.as_array()?;
    if fields.len() < 5 {
        return None;
    }
    let num = |i: usize| fields[i].as_f64().filter(|v| v.is_finite());

    Some(Candle {
        open_time: num(0)? as i64,
        open: num(1)?,
        high: num(2)?,
        low: num(3)?,
        close: num(4)?,
    })
}
