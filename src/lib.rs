//! rsiwatch - RSI threshold monitoring for a ranked crypto universe
//!
//! The library is the data-acquisition-and-indicator core:
//! - `pipeline::coingecko` - ranked assets + OHLC candles (retry, TTL cache)
//! - `pipeline::indicator` - Wilder-smoothed RSI
//! - `pipeline::classifier` - oversold/overbought classification
//! - `pipeline::engine` - per-cycle orchestration and report building
//! - `pipeline::notifier` - optional Telegram delivery of an alert batch
//! - `pipeline::scheduler` - polling loop that publishes cycle snapshots
//!
//! Rendering and user input live outside the crate; `src/bin/rsi_runtime.rs`
//! is a thin log-rendering stand-in for that layer.

pub mod pipeline;
