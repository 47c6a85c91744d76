//! Trendline Engine Library
//!
//! Point-in-time backtesting, angle discovery and signal-convergence picks over
//! historical game results and team rating snapshots.

pub mod angles;
pub mod backtest;
pub mod config;
pub mod models;
pub mod picks;
pub mod settlement;
pub mod store;

pub use config::EngineConfig;
