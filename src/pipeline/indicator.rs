//! RSI (Relative Strength Index) with Wilder smoothing
//!
//! Seed averages are the plain mean of the first `period` gains/losses;
//! every later delta is folded in with weight `1/period`. Input must be
//! chronological, oldest first.

use super::types::Candle;

/// Below this average loss the reading is pinned to 100.0
pub const ZERO_LOSS_EPSILON: f64 = 1e-12;

/// Incremental Wilder RSI accumulator
#[derive(Debug, Clone)]
pub struct WilderRsi {
    period: usize,
    prev_close: Option<f64>,
    deltas_seen: usize,
    gain_sum: f64,
    loss_sum: f64,
    avg_gain: f64,
    avg_loss: f64,
}

impl WilderRsi {
    pub fn new(period: usize) -> Self {
        Self {
            period,
            prev_close: None,
            deltas_seen: 0,
            gain_sum: 0.0,
            loss_sum: 0.0,
            avg_gain: 0.0,
            avg_loss: 0.0,
        }
    }

    /// Feed the next close
    pub fn update(&mut self, close: f64) {
        let Some(prev) = self.prev_close.replace(close) else {
            return;
        };
        if self.period == 0 {
            return;
        }

        let change = close - prev;
        let gain = change.max(0.0);
        let loss = (-change).max(0.0);
        self.deltas_seen += 1;

        if self.deltas_seen < self.period {
            self.gain_sum += gain;
            self.loss_sum += loss;
        } else if self.deltas_seen == self.period {
            self.gain_sum += gain;
            self.loss_sum += loss;
            let p = self.period as f64;
            self.avg_gain = self.gain_sum / p;
            self.avg_loss = self.loss_sum / p;
        } else {
            let p = self.period as f64;
            self.avg_gain = (self.avg_gain * (p - 1.0) + gain) / p;
            self.avg_loss = (self.avg_loss * (p - 1.0) + loss) / p;
        }
    }

    /// True once `period + 1` closes have been seen
    pub fn is_warm(&self) -> bool {
        self.period > 0 && self.deltas_seen >= self.period
    }

    /// Current reading, None until warm
    pub fn value(&self) -> Option<f64> {
        if !self.is_warm() {
            return None;
        }
        if self.avg_loss.abs() < ZERO_LOSS_EPSILON {
            return Some(100.0);
        }
        let rs = self.avg_gain / self.avg_loss;
        Some(100.0 - 100.0 / (1.0 + rs))
    }
}

/// RSI over a full close series; None for fewer than `period + 1` closes
pub fn compute_rsi(closes: &[f64], period: usize) -> Option<f64> {
    if period == 0 || closes.len() < period + 1 {
        return None;
    }
    let mut rsi = WilderRsi::new(period);
    for &close in closes {
        rsi.update(close);
    }
    rsi.value()
}

/// Closing-price series from candles
pub fn closes_from_candles(candles: &[Candle]) -> Vec<f64> {
    candles.iter().map(|c| c.close).collect()
}
