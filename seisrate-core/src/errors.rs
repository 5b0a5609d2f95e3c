use crate::FloatValue;
use thiserror::Error;

/// Error type for invalid operations.
///
/// A query cell without native data is not an error; it is represented as
/// [`crate::resample::CellResolution::NoData`] and excluded from aggregation.
#[derive(Error, Debug)]
pub enum ForecastError {
    #[error("failed to load forecast grid: {0}")]
    GridLoad(String),
    #[error("requested depth interval [{min}, {max}] m is not enclosed by the grid depth envelope [{grid_min}, {grid_max}] m")]
    OutOfRange {
        min: FloatValue,
        max: FloatValue,
        grid_min: FloatValue,
        grid_max: FloatValue,
    },
    #[error("invariant violation: {0}")]
    InvariantViolation(String),
    #[error("no reservoir geometry provided")]
    GeometryMissing,
    #[error("invalid reservoir geometry: {0}")]
    InvalidGeometry(String),
    #[error("invalid forecast window: {0}")]
    InvalidWindow(String),
    #[error("coordinate transform failed: {0}")]
    Transform(String),
    #[error("invalid model configuration: {0}")]
    Config(String),
}

/// Convenience type for `Result<T, ForecastError>`.
pub type ForecastResult<T> = Result<T, ForecastError>;
