//! Native forecast grid loading and lookup.
//!
//! The native grid is a fixed, externally published tessellation of cell
//! centers with per-magnitude-bin event rates and a declared depth layer.
//! [`GridIndex`] loads it once into an in-memory structure that is read-only
//! afterwards and safe to share across requests.

use crate::errors::{ForecastError, ForecastResult};
use crate::reservoir::DepthInterval;
use crate::FloatValue;
use log::info;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Decimal places of the grid's declared coordinate resolution.
pub const COORD_DECIMALS: i32 = 2;

/// Round a coordinate to the grid's declared resolution.
pub fn round_coord(value: FloatValue) -> FloatValue {
    let scale = 10f64.powi(COORD_DECIMALS);
    (value * scale).round() / scale
}

fn center_key(lon: FloatValue, lat: FloatValue) -> (i64, i64) {
    let scale = 10f64.powi(COORD_DECIMALS);
    ((lon * scale).round() as i64, (lat * scale).round() as i64)
}

/// One magnitude bin of the grid's magnitude-frequency distribution.
///
/// Every cell shares the identical ordered bin list; the bin width is implied
/// by the spacing of adjacent reference magnitudes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MagnitudeBin {
    /// Label as published by the grid source, e.g. `"4.95"`.
    pub label: String,
    /// Reference magnitude parsed from the label.
    pub magnitude: FloatValue,
}

/// One cell of the native grid as published by the source.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceCell {
    pub lon: FloatValue,
    pub lat: FloatValue,
    /// Expected event rates, one per magnitude bin, in bin order.
    pub rates: Vec<FloatValue>,
}

/// Depth layer declared by the grid source, in km, positive down.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct DepthLayer {
    pub min_km: FloatValue,
    pub max_km: FloatValue,
}

fn default_forecast_duration_years() -> FloatValue {
    1.0
}

/// Structured description of a native forecast grid.
///
/// The wire format belongs to the publishing collaborator; this type is the
/// contract the engine consumes. A TOML rendering is supported for fixtures
/// and locally stored grids.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GridSource {
    /// Identifier used in logs and error messages.
    pub name: String,
    pub lon_increment: FloatValue,
    pub lat_increment: FloatValue,
    pub depth_layer: DepthLayer,
    /// Duration the published rates are integrated over.
    #[serde(default = "default_forecast_duration_years")]
    pub forecast_duration_years: FloatValue,
    /// Completeness magnitude declared for the grid.
    pub completeness_magnitude: FloatValue,
    /// Ordered magnitude-bin labels, shared by every cell.
    pub magnitude_bins: Vec<String>,
    pub cells: Vec<SourceCell>,
}

impl GridSource {
    pub fn from_toml_str(raw: &str) -> ForecastResult<Self> {
        toml::from_str(raw).map_err(|e| ForecastError::GridLoad(e.to_string()))
    }
}

/// One native grid cell held by the index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForecastGridCell {
    pub center_lon: FloatValue,
    pub center_lat: FloatValue,
    /// Expected event rates in the grid's bin order.
    pub rates: Vec<FloatValue>,
}

/// In-memory index of the native forecast grid.
///
/// Constructed once at startup, immutable afterwards. Pass it by reference
/// into every request-handling call; reads need no locking.
#[derive(Debug, Clone)]
pub struct GridIndex {
    name: String,
    lon_increment: FloatValue,
    lat_increment: FloatValue,
    bins: Vec<MagnitudeBin>,
    bin_width: FloatValue,
    cells: Vec<ForecastGridCell>,
    /// Cell indices keyed by rounded center. Duplicate centers are kept so
    /// the exact-match path can surface them as a broken tessellation.
    by_center: HashMap<(i64, i64), Vec<usize>>,
    lon_min: FloatValue,
    lon_max: FloatValue,
    lat_min: FloatValue,
    lat_max: FloatValue,
    min_altitude_m: FloatValue,
    max_altitude_m: FloatValue,
    forecast_duration_years: FloatValue,
    completeness_magnitude: FloatValue,
}

impl GridIndex {
    pub fn new(source: GridSource) -> ForecastResult<Self> {
        let name = source.name.clone();
        let load_err = |msg: String| ForecastError::GridLoad(format!("grid {name}: {msg}"));

        if source.cells.is_empty() {
            return Err(load_err("no cells in source".to_string()));
        }
        if source.lon_increment <= 0.0 || source.lat_increment <= 0.0 {
            return Err(load_err(format!(
                "increments must be positive, got ({}, {})",
                source.lon_increment, source.lat_increment
            )));
        }
        if source.depth_layer.max_km <= source.depth_layer.min_km {
            return Err(load_err(format!(
                "depth layer [{}, {}] km has no extent",
                source.depth_layer.min_km, source.depth_layer.max_km
            )));
        }
        if source.forecast_duration_years <= 0.0 {
            return Err(load_err("forecast duration must be positive".to_string()));
        }
        if source.magnitude_bins.len() < 2 {
            return Err(load_err(
                "at least two magnitude bins are required to derive the bin width".to_string(),
            ));
        }

        let bins = source
            .magnitude_bins
            .iter()
            .map(|label| {
                label
                    .trim()
                    .parse::<FloatValue>()
                    .map(|magnitude| MagnitudeBin {
                        label: label.clone(),
                        magnitude,
                    })
                    .map_err(|_| load_err(format!("magnitude bin label {label:?} is not numeric")))
            })
            .collect::<ForecastResult<Vec<_>>>()?;

        // The bin increment is assumed static and positive across the list.
        let bin_width = ((bins[1].magnitude - bins[0].magnitude) * 10.0).round() / 10.0;
        if bin_width <= 0.0 {
            return Err(load_err("magnitude bins must be strictly increasing".to_string()));
        }

        let mut cells = Vec::with_capacity(source.cells.len());
        let mut by_center: HashMap<(i64, i64), Vec<usize>> = HashMap::new();
        let (mut lon_min, mut lon_max) = (FloatValue::INFINITY, FloatValue::NEG_INFINITY);
        let (mut lat_min, mut lat_max) = (FloatValue::INFINITY, FloatValue::NEG_INFINITY);
        for cell in &source.cells {
            if cell.rates.len() != bins.len() {
                return Err(load_err(format!(
                    "cell ({}, {}) has {} rates for {} magnitude bins",
                    cell.lon,
                    cell.lat,
                    cell.rates.len(),
                    bins.len()
                )));
            }
            lon_min = lon_min.min(cell.lon);
            lon_max = lon_max.max(cell.lon);
            lat_min = lat_min.min(cell.lat);
            lat_max = lat_max.max(cell.lat);
            by_center
                .entry(center_key(cell.lon, cell.lat))
                .or_default()
                .push(cells.len());
            cells.push(ForecastGridCell {
                center_lon: cell.lon,
                center_lat: cell.lat,
                rates: cell.rates.clone(),
            });
        }

        // Reverse the source's depth direction (km, positive down) into an
        // altitude envelope in meters, matching the reservoir convention.
        let min_altitude_m = -source.depth_layer.max_km * 1000.0;
        let max_altitude_m = -source.depth_layer.min_km * 1000.0;

        info!(
            "loaded forecast grid {name}: {} cells, {} magnitude bins",
            cells.len(),
            bins.len()
        );

        Ok(Self {
            name,
            lon_increment: source.lon_increment,
            lat_increment: source.lat_increment,
            bins,
            bin_width,
            cells,
            by_center,
            lon_min,
            lon_max,
            lat_min,
            lat_max,
            min_altitude_m,
            max_altitude_m,
            forecast_duration_years: source.forecast_duration_years,
            completeness_magnitude: source.completeness_magnitude,
        })
    }

    pub fn from_toml_str(raw: &str) -> ForecastResult<Self> {
        Self::new(GridSource::from_toml_str(raw)?)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn lon_increment(&self) -> FloatValue {
        self.lon_increment
    }

    pub fn lat_increment(&self) -> FloatValue {
        self.lat_increment
    }

    /// Half-width of a native cell along the longitude axis.
    pub fn lon_half(&self) -> FloatValue {
        self.lon_increment / 2.0
    }

    /// Half-height of a native cell along the latitude axis.
    pub fn lat_half(&self) -> FloatValue {
        self.lat_increment / 2.0
    }

    pub fn cell_area(&self) -> FloatValue {
        self.lon_increment * self.lat_increment
    }

    /// Ordered magnitude bins shared by every cell.
    pub fn magnitude_bins(&self) -> &[MagnitudeBin] {
        &self.bins
    }

    pub fn bin_width(&self) -> FloatValue {
        self.bin_width
    }

    pub fn cells(&self) -> &[ForecastGridCell] {
        &self.cells
    }

    /// Indices of the cells whose rounded center matches (lon, lat).
    ///
    /// An intact tessellation yields at most one index; more than one means
    /// the grid is corrupted, which the resolution path reports.
    pub fn cells_at(&self, lon: FloatValue, lat: FloatValue) -> &[usize] {
        self.by_center
            .get(&center_key(lon, lat))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Minimum cell-center longitude.
    pub fn lon_min(&self) -> FloatValue {
        self.lon_min
    }

    /// Maximum cell-center longitude.
    pub fn lon_max(&self) -> FloatValue {
        self.lon_max
    }

    /// Minimum cell-center latitude.
    pub fn lat_min(&self) -> FloatValue {
        self.lat_min
    }

    /// Maximum cell-center latitude.
    pub fn lat_max(&self) -> FloatValue {
        self.lat_max
    }

    /// Lower bound of the grid's altitude envelope, meters.
    pub fn min_altitude_m(&self) -> FloatValue {
        self.min_altitude_m
    }

    /// Upper bound of the grid's altitude envelope, meters.
    pub fn max_altitude_m(&self) -> FloatValue {
        self.max_altitude_m
    }

    /// Total depth extent of the grid, meters.
    pub fn depth_extent_m(&self) -> FloatValue {
        (self.max_altitude_m - self.min_altitude_m).abs()
    }

    pub fn completeness_magnitude(&self) -> FloatValue {
        self.completeness_magnitude
    }

    /// Factor converting the grid's depth-integrated rates to per-year values.
    pub fn annual_scaling(&self) -> FloatValue {
        1.0 / self.forecast_duration_years
    }

    /// Check that a requested depth interval is fully enclosed by the grid's
    /// depth envelope.
    pub fn validate_reservoir(&self, interval: &DepthInterval) -> ForecastResult<()> {
        if interval.min < self.min_altitude_m || interval.max > self.max_altitude_m {
            return Err(ForecastError::OutOfRange {
                min: interval.min,
                max: interval.max,
                grid_min: self.min_altitude_m,
                grid_max: self.max_altitude_m,
            });
        }
        Ok(())
    }
}
