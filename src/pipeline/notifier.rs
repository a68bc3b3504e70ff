//! Outbound alert notifications (Telegram Bot API)
//!
//! The engine never sends anything on its own. A caller (user action,
//! scheduler flag) hands a batch of alerts to `dispatch_alerts`, which
//! dedups by asset, sends one message per alert, and reports counts.
//! Delivery failures are never fatal.

use super::config::{TelegramCredentials, ThresholdConfig, DEFAULT_TELEGRAM_BASE_URL};
use super::error::PipelineError;
use super::types::{format_price, Alert, AlertDirection};
use async_trait::async_trait;
use serde::Serialize;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

pub const NOTIFIER_TIMEOUT: Duration = Duration::from_secs(15);

/// Delivery counts for one batch
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DeliverySummary {
    pub delivered: usize,
    pub failed: usize,
    /// Alerts dropped as duplicates within the batch
    pub duplicates: usize,
}

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send(&self, text: &str) -> Result<(), PipelineError>;
}

#[derive(Debug, Serialize)]
struct SendMessageRequest<'a> {
    chat_id: &'a str,
    text: &'a str,
    disable_web_page_preview: bool,
}

pub struct TelegramNotifier {
    http: reqwest::Client,
    base_url: String,
    credentials: TelegramCredentials,
}

impl TelegramNotifier {
    pub fn new(credentials: TelegramCredentials) -> Result<Self, PipelineError> {
        Self::with_base_url(DEFAULT_TELEGRAM_BASE_URL, credentials)
    }

    pub fn with_base_url(
        base_url: &str,
        credentials: TelegramCredentials,
    ) -> Result<Self, PipelineError> {
        let http = reqwest::Client::builder()
            .timeout(NOTIFIER_TIMEOUT)
            .build()
            .map_err(|e| PipelineError::Notifier(e.to_string()))?;

        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            credentials,
        })
    }
}

#[async_trait]
impl Notifier for TelegramNotifier {
    async fn send(&self, text: &str) -> Result<(), PipelineError> {
        let url = format!(
            "{}/bot{}/sendMessage",
            self.base_url, self.credentials.bot_token
        );
        let payload = SendMessageRequest {
            chat_id: &self.credentials.chat_id,
            text,
            disable_web_page_preview: true,
        };

        // Never put the URL in the error: it contains the bot token
        let response = self
            .http
            .post(&url)
            .json(&payload)
            .send()
            .await
            .map_err(|e| PipelineError::Notifier(e.without_url().to_string()))?;

        if !response.status().is_success() {
            return Err(PipelineError::Notifier(format!(
                "Telegram API returned HTTP {}",
                response.status()
            )));
        }
        Ok(())
    }
}

/// One-line alert text, e.g.
/// `[RSI Alert] <= 25: Bitcoin (BTC) -> RSI 21.37 | Price: 64000 USD`
pub fn format_alert_message(alert: &Alert, thresholds: &ThresholdConfig) -> String {
    let threshold = match alert.direction {
        AlertDirection::Oversold => thresholds.low(),
        AlertDirection::Overbought => thresholds.high(),
    };
    format!(
        "[RSI Alert] {} {}: {} ({}) -> RSI {:.2} | Price: {} USD",
        alert.direction.operator(),
        threshold,
        alert.asset.display_name,
        alert.asset.symbol,
        alert.rsi(),
        format_price(alert.price)
    )
}

/// Send one message per distinct asset in `alerts`
pub async fn dispatch_alerts(
    notifier: &dyn Notifier,
    alerts: &[Alert],
    thresholds: &ThresholdConfig,
) -> DeliverySummary {
    let mut summary = DeliverySummary::default();
    let mut seen: HashSet<&str> = HashSet::new();

    for alert in alerts {
        if !seen.insert(alert.asset.id.as_str()) {
            summary.duplicates += 1;
            continue;
        }

        let text = format_alert_message(alert, thresholds);
        match notifier.send(&text).await {
            Ok(()) => summary.delivered += 1,
            Err(e) => {
                log::warn!("⚠️  Alert for {} not delivered: {}", alert.asset.id, e);
                summary.failed += 1;
            }
        }
    }

    if summary.delivered > 0 {
        log::info!("📨 Sent {} alert message(s)", summary.delivered);
    } else if summary.failed > 0 {
        log::error!("❌ No alerts delivered ({} failed); check bot token / chat id", summary.failed);
    }
    summary
}

/// Run `dispatch_alerts` on its own task so the caller is never held up
/// by a slow or unreachable notifier
pub fn spawn_dispatch(
    notifier: Arc<dyn Notifier>,
    alerts: Vec<Alert>,
    thresholds: ThresholdConfig,
) -> JoinHandle<DeliverySummary> {
    tokio::spawn(async move { dispatch_alerts(notifier.as_ref(), &alerts, &thresholds).await })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::types::{AssetRef, OscillatorReading};
    use chrono::Utc;
    use std::sync::Mutex;

    /// Records messages; fails any text containing `fail_on`
    struct RecordingNotifier {
        sent: Mutex<Vec<String>>,
        fail_on: Option<&'static str>,
    }

    #[async_trait]
    impl Notifier for RecordingNotifier {
        async fn send(&self, text: &str) -> Result<(), PipelineError> {
            if let Some(marker) = self.fail_on {
                if text.contains(marker) {
                    return Err(PipelineError::Notifier("boom".to_string()));
                }
            }
            self.sent.lock().unwrap().push(text.to_string());
            Ok(())
        }
    }

    fn alert(id: &str, name: &str, value: f64, direction: AlertDirection, price: Option<f64>) -> Alert {
        Alert {
            asset: AssetRef {
                id: id.to_string(),
                display_name: name.to_string(),
                symbol: id.to_uppercase(),
            },
            reading: OscillatorReading::defined(id, value, Utc::now()),
            direction,
            price,
        }
    }

    #[test]
    fn test_message_format() {
        let cfg = ThresholdConfig::new(13, 25.0, 75.5).unwrap();

        let low = alert("btc", "Bitcoin", 21.3749, AlertDirection::Oversold, Some(64000.0));
        assert_eq!(
            format_alert_message(&low, &cfg),
            "[RSI Alert] <= 25: Bitcoin (BTC) -> RSI 21.37 | Price: 64000 USD"
        );

        let high = alert("eth", "Ethereum", 80.0, AlertDirection::Overbought, None);
        assert_eq!(
            format_alert_message(&high, &cfg),
            "[RSI Alert] >= 75.5: Ethereum (ETH) -> RSI 80.00 | Price: — USD"
        );
    }

    #[tokio::test]
    async fn test_dispatch_dedups_and_counts() {
        let notifier = RecordingNotifier {
            sent: Mutex::new(Vec::new()),
            fail_on: Some("Dogecoin"),
        };
        let alerts = vec![
            alert("btc", "Bitcoin", 20.0, AlertDirection::Oversold, Some(1.0)),
            alert("doge", "Dogecoin", 90.0, AlertDirection::Overbought, Some(0.1)),
            alert("btc", "Bitcoin", 20.0, AlertDirection::Oversold, Some(1.0)),
            alert("eth", "Ethereum", 80.0, AlertDirection::Overbought, Some(2.0)),
        ];

        let summary = dispatch_alerts(&notifier, &alerts, &ThresholdConfig::default()).await;

        assert_eq!(
            summary,
            DeliverySummary {
                delivered: 2,
                failed: 1,
                duplicates: 1,
            }
        );
        assert_eq!(notifier.sent.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_dispatch_empty_batch() {
        let notifier = RecordingNotifier {
            sent: Mutex::new(Vec::new()),
            fail_on: None,
        };
        let summary = dispatch_alerts(&notifier, &[], &ThresholdConfig::default()).await;
        assert_eq!(summary, DeliverySummary::default());
    }

    /// Holds every send until the gate is opened
    struct GatedNotifier {
        gate: tokio::sync::Semaphore,
    }

    #[async_trait]
    impl Notifier for GatedNotifier {
        async fn send(&self, _text: &str) -> Result<(), PipelineError> {
            let _permit = self.gate.acquire().await;
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_spawn_dispatch_does_not_block_caller() {
        let notifier = Arc::new(GatedNotifier {
            gate: tokio::sync::Semaphore::new(0),
        });
        let alerts = vec![alert("btc", "Bitcoin", 20.0, AlertDirection::Oversold, Some(1.0))];

        let handle = spawn_dispatch(notifier.clone(), alerts, ThresholdConfig::default());

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!handle.is_finished());

        notifier.gate.add_permits(1);
        let summary = tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(summary.delivered, 1);
    }

    #[tokio::test]
    async fn test_spawned_dispatch_can_be_aborted() {
        let notifier = Arc::new(GatedNotifier {
            gate: tokio::sync::Semaphore::new(0),
        });
        let alerts = vec![alert("eth", "Ethereum", 80.0, AlertDirection::Overbought, None)];

        let handle = spawn_dispatch(notifier, alerts, ThresholdConfig::default());
        handle.abort();

        let joined = tokio::time::timeout(Duration::from_secs(1), handle).await.unwrap();
        assert!(joined.unwrap_err().is_cancelled());
    }
}
