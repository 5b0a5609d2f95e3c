//! Seismicity-rate forecasting for reservoir volumes.
//!
//! This crate re-exports the forecast engine from `seisrate-core`.

pub use seisrate_core::*;
