//! RSI Runtime - polling scheduler with log rendering
//!
//! This binary stands in for the presentation layer:
//! - Loads configuration from the environment (.env supported)
//! - Spawns the polling scheduler over the CoinGecko client
//! - Logs the alert list and a compact RSI table after every cycle
//! - Optionally dispatches alerts to Telegram (NOTIFY_ON_CYCLE=true)
//!
//! Usage:
//!   cargo run --release --bin rsi_runtime
//!
//! Environment variables:
//!   RSI_UNIVERSE_SIZE - Top N assets by market cap (default: 100)
//!   RSI_PERIOD - RSI period (default: 13)
//!   RSI_LOW_THRESHOLD / RSI_HIGH_THRESHOLD - Alert thresholds (default: 25 / 75)
//!   POLL_INTERVAL_SECS - Cycle interval (default: 300)
//!   TELEGRAM_BOT_TOKEN / TELEGRAM_CHAT_ID - Optional notifier credentials
//!   NOTIFY_ON_CYCLE - Send alerts after every cycle (default: false)
//!
//! Sending SIGHUP (unix) triggers an immediate refresh.

use dotenv::dotenv;
use log::{error, info};
use rsiwatch::pipeline::{
    config::PipelineConfig,
    engine::{CycleOutput, EngineSettings, RsiEngine},
    notifier::{spawn_dispatch, DeliverySummary, Notifier, TelegramNotifier},
    scheduler::{poll_scheduler_task, CycleStatus, SchedulerParams},
    types::format_price,
    CoinGeckoClient,
};
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

/// Alerts shown in full before the list is summarised
const MAX_ALERTS_SHOWN: usize = 20;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenv().ok();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .target(env_logger::Target::Stderr)
        .init();

    info!("🚀 RSI Runtime");

    let config = PipelineConfig::from_env()?;

    info!("📊 Configuration:");
    info!("   ├─ Universe: top {} by market cap", config.universe_size);
    info!(
        "   ├─ RSI period: {} (low {} / high {})",
        config.thresholds.period(),
        config.thresholds.low(),
        config.thresholds.high()
    );
    info!("   ├─ Candle window: {} day(s)", config.candle_window_days);
    info!("   ├─ Poll interval: {}s", config.poll_interval.as_secs());
    info!("   ├─ Max concurrent fetches: {}", config.max_concurrency);
    info!(
        "   └─ Telegram: {}",
        match (&config.telegram, config.notify_on_cycle) {
            (Some(_), true) => "enabled (every cycle)",
            (Some(_), false) => "configured (not sending)",
            (None, _) => "disabled",
        }
    );

    let client = Arc::new(CoinGeckoClient::from_config(&config)?);
    let engine = Arc::new(RsiEngine::new(
        client.clone(),
        EngineSettings::from_config(&config),
    ));

    let notifier: Option<Arc<dyn Notifier>> = match (&config.telegram, config.notify_on_cycle) {
        (Some(credentials), true) => Some(Arc::new(TelegramNotifier::new(credentials.clone())?)),
        _ => None,
    };
    // Deliveries run off the select loop so CTRL+C is never stuck behind them
    let mut dispatches: Vec<JoinHandle<DeliverySummary>> = Vec::new();

    let (refresh_tx, refresh_rx) = mpsc::channel::<()>(4);
    let (status_tx, mut status_rx) = watch::channel(CycleStatus::Pending);
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let params = SchedulerParams {
        universe_size: config.universe_size,
        thresholds: config.thresholds,
        poll_interval: config.poll_interval,
    };
    let scheduler = tokio::spawn(poll_scheduler_task(
        engine,
        params,
        refresh_rx,
        status_tx,
        shutdown_rx,
    ));

    spawn_refresh_on_sighup(refresh_tx);

    info!("🔄 Press CTRL+C to shutdown gracefully");

    loop {
        tokio::select! {
            changed = status_rx.changed() => {
                if changed.is_err() {
                    break; // scheduler exited
                }
                let status = status_rx.borrow_and_update().clone();
                match status {
                    CycleStatus::Ready { cycle, output } => {
                        render_cycle(cycle, &output);
                        dispatches.retain(|handle| !handle.is_finished());
                        if let Some(notifier) = &notifier {
                            if !output.alerts.is_empty() {
                                dispatches.push(spawn_dispatch(
                                    notifier.clone(),
                                    output.alerts.clone(),
                                    config.thresholds,
                                ));
                            }
                        }
                        let purged = client.purge_expired_cache();
                        if purged > 0 {
                            log::debug!("Purged {} expired cache entries", purged);
                        }
                    }
                    CycleStatus::Unavailable { cycle, error, at } => {
                        error!("❌ Data unavailable (cycle {}, {}): {}", cycle, at.format("%H:%M:%S"), error);
                    }
                    CycleStatus::Pending => {}
                }
            }
            signal = tokio::signal::ctrl_c() => {
                if let Err(err) = signal {
                    error!("❌ Failed to listen for CTRL+C: {}", err);
                }
                info!("⚠️  Received CTRL+C, shutting down...");
                break;
            }
        }
    }

    let _ = shutdown_tx.send(true);
    dispatches.retain(|handle| !handle.is_finished());
    if !dispatches.is_empty() {
        info!("⚠️  Abandoning {} pending alert delivery(ies)", dispatches.len());
        dispatches.iter().for_each(|handle| handle.abort());
    }
    if let Err(e) = scheduler.await {
        error!("❌ Scheduler task failed: {}", e);
    }

    info!("✅ RSI runtime stopped");
    Ok(())
}

fn render_cycle(cycle: u64, output: &CycleOutput) {
    info!(
        "📈 Cycle {} @ {}: {} assets, {} with RSI, {} failed",
        cycle,
        output.finished_at.format("%Y-%m-%d %H:%M:%S UTC"),
        output.report.len(),
        output.report.defined_count(),
        output.failed_assets
    );

    if output.alerts.is_empty() {
        info!("   └─ No active alerts at the current thresholds");
    } else {
        info!("🚨 {} active alert(s)", output.alerts.len());
        for alert in output.alerts.iter().take(MAX_ALERTS_SHOWN) {
            info!("   ├─ [{}] {}", alert.direction, alert);
        }
        if output.alerts.len() > MAX_ALERTS_SHOWN {
            info!("   └─ ... and {} more", output.alerts.len() - MAX_ALERTS_SHOWN);
        }
    }

    for row in output.report.rows() {
        log::debug!(
            "{:<24} {:<8} {:>14} {:>7}",
            row.name,
            row.symbol,
            format_price(row.price_usd),
            row.rsi.map(|v| format!("{:.2}", v)).unwrap_or_else(|| "—".to_string())
        );
    }
}

#[cfg(unix)]
fn spawn_refresh_on_sighup(refresh_tx: mpsc::Sender<()>) {
    use tokio::signal::unix::{signal, SignalKind};

    tokio::spawn(async move {
        let mut hangups = match signal(SignalKind::hangup()) {
            Ok(s) => s,
            Err(e) => {
                error!("❌ Failed to install SIGHUP handler: {}", e);
                return;
            }
        };
        while hangups.recv().await.is_some() {
            if refresh_tx.try_send(()).is_err() {
                log::debug!("Refresh already queued");
            }
        }
    });
}

#[cfg(not(unix))]
fn spawn_refresh_on_sighup(refresh_tx: mpsc::Sender<()>) {
    // Manual refresh is unix-only; the scheduler ignores a closed channel
    drop(refresh_tx);
}
