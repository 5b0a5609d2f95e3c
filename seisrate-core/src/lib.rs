//! Seismicity-rate forecast engine: native-grid resampling, catalog
//! filtering, and hierarchical result aggregation.
//!
//! The engine turns a caller's reservoir geometry and forecast window into a
//! [`reservoir::ReservoirTree`] of per-epoch magnitude-frequency samples,
//! either by resampling a fixed published forecast grid
//! ([`forecast::resample_forecast`]) or by assembling externally trained
//! Gutenberg-Richter parameters ([`forecast::trained_forecast`]).
//!
//! The native grid ([`grid::GridIndex`]) is loaded once at startup and shared
//! read-only across requests; everything else is created per request and
//! handed to the caller. Serialization and transport of the result tree are
//! the caller's concern.

pub mod aggregate;
pub mod alignment;
pub mod catalog;
pub mod config;
pub mod forecast;
pub mod grid;
pub mod resample;
pub mod reservoir;

pub mod errors;

/// Scalar type used throughout the engine.
pub type FloatValue = f64;

/// Timestamps are UTC instants.
pub type Timestamp = chrono::DateTime<chrono::Utc>;
