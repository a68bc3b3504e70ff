//! Polling scheduler for RSI cycles
//!
//! Runs `RsiEngine::run_cycle` on a fixed interval or when a manual refresh
//! arrives, and publishes each result on a `watch` channel for whatever
//! renders it. A refresh that arrives mid-cycle cancels the in-flight cycle
//! and starts over; a cancelled cycle publishes nothing.

use super::config::ThresholdConfig;
use super::engine::{CycleOutput, RsiEngine};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tokio::time::{interval, Duration, MissedTickBehavior};

/// Latest state visible to the presentation layer
#[derive(Debug, Clone)]
pub enum CycleStatus {
    /// No cycle has finished yet
    Pending,
    Ready {
        cycle: u64,
        output: Arc<CycleOutput>,
    },
    /// Ranked-asset fetch failed; any previous table is stale and replaced
    Unavailable {
        cycle: u64,
        error: String,
        at: DateTime<Utc>,
    },
}

impl CycleStatus {
    pub fn output(&self) -> Option<&Arc<CycleOutput>> {
        match self {
            CycleStatus::Ready { output, .. } => Some(output),
            _ => None,
        }
    }
}

/// What one scheduler run needs
pub struct SchedulerParams {
    pub universe_size: usize,
    pub thresholds: ThresholdConfig,
    pub poll_interval: Duration,
}

/// Scheduler task - run cycles until shutdown
///
/// Arguments:
/// - `engine`: Shared RsiEngine
/// - `params`: universe size, thresholds and poll interval
/// - `refresh_rx`: manual refresh requests (supersede an in-flight cycle)
/// - `status_tx`: where finished cycles are published
/// - `shutdown_rx`: flips to true (or closes) to stop the task
///
/// This function runs until shutdown is signalled.
pub async fn poll_scheduler_task(
    engine: Arc<RsiEngine>,
    params: SchedulerParams,
    mut refresh_rx: mpsc::Receiver<()>,
    status_tx: watch::Sender<CycleStatus>,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    log::info!(
        "⏰ Starting RSI scheduler (interval: {}s, universe: {}, period: {})",
        params.poll_interval.as_secs(),
        params.universe_size,
        params.thresholds.period()
    );

    // interval() panics on a zero period
    let mut timer = interval(params.poll_interval.max(Duration::from_millis(1)));
    timer.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let mut cycle = 0u64;

    loop {
        tokio::select! {
            _ = timer.tick() => {}
            Some(()) = refresh_rx.recv() => {
                log::info!("🔁 Manual refresh requested");
            }
            _ = shutdown_rx.changed() => break,
        }

        // Restart the cycle for as long as refreshes keep superseding it
        loop {
            cycle += 1;
            tokio::select! {
                result = engine.run_cycle(params.universe_size, &params.thresholds) => {
                    let status = match result {
                        Ok(output) => CycleStatus::Ready { cycle, output: Arc::new(output) },
                        Err(e) => {
                            log::error!("❌ Cycle {} failed: {}", cycle, e);
                            CycleStatus::Unavailable { cycle, error: e.to_string(), at: Utc::now() }
                        }
                    };
                    status_tx.send_replace(status);
                    break;
                }
                Some(()) = refresh_rx.recv() => {
                    log::info!("🔁 Cycle {} superseded by manual refresh", cycle);
                    timer.reset();
                }
                _ = shutdown_rx.changed() => {
                    log::info!("⚠️  Shutdown during cycle {}, abandoning it", cycle);
                    return;
                }
            }
        }
    }

    log::info!("✅ RSI scheduler stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::coingecko::CandleSource;
    use crate::pipeline::engine::EngineSettings;
    use crate::pipeline::error::PipelineError;
    use crate::pipeline::types::{AssetRef, Candle, RankedAsset};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    struct SlowSource {
        candle_delay: Duration,
        universe_calls: AtomicUsize,
        fail_universe: AtomicBool,
    }

    impl SlowSource {
        fn new(candle_delay: Duration) -> Self {
            Self {
                candle_delay,
                universe_calls: AtomicUsize::new(0),
                fail_universe: AtomicBool::new(false),
            }
        }
    }

    #[async_trait]
    impl CandleSource for SlowSource {
        async fn fetch_ranked_assets(&self, _limit: usize) -> Result<Vec<RankedAsset>, PipelineError> {
            self.universe_calls.fetch_add(1, Ordering::SeqCst);
            if self.fail_universe.load(Ordering::SeqCst) {
                return Err(PipelineError::UpstreamStatus {
                    endpoint: "/coins/markets".to_string(),
                    status: 503,
                });
            }
            Ok(vec![RankedAsset {
                asset: AssetRef {
                    id: "bitcoin".to_string(),
                    display_name: "Bitcoin".to_string(),
                    symbol: "BTC".to_string(),
                },
                current_price: Some(1.0),
                market_cap_rank: Some(1),
            }])
        }

        async fn fetch_candles(&self, _asset_id: &str, _days: u32) -> Result<Vec<Candle>, PipelineError> {
            tokio::time::sleep(self.candle_delay).await;
            Ok((0..20)
                .map(|i| Candle {
                    open_time: i,
                    open: 1.0,
                    high: 1.0,
                    low: 1.0,
                    close: 100.0 + i as f64,
                })
                .collect())
        }
    }

    fn spawn_scheduler(
        source: Arc<SlowSource>,
        poll_interval: Duration,
    ) -> (
        mpsc::Sender<()>,
        watch::Receiver<CycleStatus>,
        watch::Sender<bool>,
        tokio::task::JoinHandle<()>,
    ) {
        let engine = Arc::new(RsiEngine::new(source, EngineSettings::default()));
        let (refresh_tx, refresh_rx) = mpsc::channel(4);
        let (status_tx, status_rx) = watch::channel(CycleStatus::Pending);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let params = SchedulerParams {
            universe_size: 10,
            thresholds: ThresholdConfig::default(),
            poll_interval,
        };
        let handle = tokio::spawn(poll_scheduler_task(
            engine,
            params,
            refresh_rx,
            status_tx,
            shutdown_rx,
        ));
        (refresh_tx, status_rx, shutdown_tx, handle)
    }

    #[tokio::test]
    async fn test_first_cycle_published() {
        let source = Arc::new(SlowSource::new(Duration::from_millis(1)));
        let (_refresh, mut status_rx, shutdown, handle) =
            spawn_scheduler(source, Duration::from_secs(3600));

        tokio::time::timeout(Duration::from_secs(5), status_rx.changed())
            .await
            .unwrap()
            .unwrap();

        let status = status_rx.borrow().clone();
        match status {
            CycleStatus::Ready { cycle, output } => {
                assert_eq!(cycle, 1);
                assert_eq!(output.report.len(), 1);
                assert_eq!(output.alerts.len(), 1);
            }
            other => panic!("unexpected status: {:?}", other),
        }

        shutdown.send(true).unwrap();
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn test_universe_failure_publishes_unavailable() {
        let source = Arc::new(SlowSource::new(Duration::from_millis(1)));
        source.fail_universe.store(true, Ordering::SeqCst);
        let (_refresh, mut status_rx, shutdown, handle) =
            spawn_scheduler(source, Duration::from_secs(3600));

        tokio::time::timeout(Duration::from_secs(5), status_rx.changed())
            .await
            .unwrap()
            .unwrap();
        assert!(matches!(
            *status_rx.borrow(),
            CycleStatus::Unavailable { cycle: 1, .. }
        ));

        shutdown.send(true).unwrap();
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn test_refresh_supersedes_in_flight_cycle() {
        let source = Arc::new(SlowSource::new(Duration::from_millis(300)));
        let (refresh, mut status_rx, shutdown, handle) =
            spawn_scheduler(source.clone(), Duration::from_secs(3600));

        tokio::time::sleep(Duration::from_millis(50)).await;
        refresh.send(()).await.unwrap();

        tokio::time::timeout(Duration::from_secs(5), status_rx.changed())
            .await
            .unwrap()
            .unwrap();

        match &*status_rx.borrow() {
            CycleStatus::Ready { cycle, .. } => assert_eq!(*cycle, 2),
            other => panic!("unexpected status: {:?}", other),
        }
        assert_eq!(source.universe_calls.load(Ordering::SeqCst), 2);

        shutdown.send(true).unwrap();
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn test_shutdown_abandons_cycle_without_publishing() {
        let source = Arc::new(SlowSource::new(Duration::from_secs(30)));
        let (_refresh, status_rx, shutdown, handle) =
            spawn_scheduler(source, Duration::from_secs(3600));

        tokio::time::sleep(Duration::from_millis(50)).await;
        shutdown.send(true).unwrap();

        tokio::time::timeout(Duration::from_secs(2), handle)
            .await
            .unwrap()
            .unwrap();
        assert!(matches!(*status_rx.borrow(), CycleStatus::Pending));
    }
}
