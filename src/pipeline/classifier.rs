//! Threshold classification of RSI readings
//!
//! Boundaries are inclusive: a reading equal to the low threshold is
//! oversold, equal to the high threshold is overbought.

use super::config::ThresholdConfig;
use super::types::{Alert, AlertDirection, OscillatorReading, RankedAsset};

pub fn direction_for(value: f64, cfg: &ThresholdConfig) -> Option<AlertDirection> {
    if value <= cfg.low() {
        Some(AlertDirection::Oversold)
    } else if value >= cfg.high() {
        Some(AlertDirection::Overbought)
    } else {
        None
    }
}

/// Alert for `reading` if it crosses a threshold; None for undefined readings
pub fn classify(
    ranked: &RankedAsset,
    reading: &OscillatorReading,
    cfg: &ThresholdConfig,
) -> Option<Alert> {
    let direction = direction_for(reading.value?, cfg)?;
    Some(Alert {
        asset: ranked.asset.clone(),
        reading: reading.clone(),
        direction,
        price: ranked.current_price,
    })
}
