//! Resolution of query cells against the native grid.
//!
//! Each query cell is resolved either by exact center lookup (when the query
//! grid is native-aligned) or by combining every overlapping native cell,
//! weighted by its fractional share of the query cell's area.

use crate::errors::{ForecastError, ForecastResult};
use crate::grid::{round_coord, GridIndex};
use crate::FloatValue;
use serde::{Deserialize, Serialize};

/// Tolerance for the achieved-weight invariant check.
const WEIGHT_TOLERANCE: FloatValue = 1e-9;

/// One rectangular cell of the caller's requested grid. Bounds are
/// min-inclusive, max-exclusive.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct QueryCell {
    pub min_lon: FloatValue,
    pub max_lon: FloatValue,
    pub min_lat: FloatValue,
    pub max_lat: FloatValue,
}

impl QueryCell {
    pub fn area(&self) -> FloatValue {
        (self.max_lon - self.min_lon) * (self.max_lat - self.min_lat)
    }

    /// Center this cell would have on the native tessellation, rounded to
    /// the grid's coordinate resolution.
    pub fn native_center(&self, grid: &GridIndex) -> (FloatValue, FloatValue) {
        (
            round_coord(self.min_lon + grid.lon_half()),
            round_coord(self.min_lat + grid.lat_half()),
        )
    }
}

/// Magnitude-frequency values resolved for one query cell.
///
/// The stored rates are the raw overlap-weighted sum across contributing
/// native cells, not a weighted average. A query cell fully inside the
/// native extent achieves a total weight of 1.0; at the grid's outer edge
/// the weight is legitimately smaller and the values are not renormalized,
/// which under-weights edge cells. Callers wanting a true weighted average
/// must divide by [`ResolvedCell::total_weight`], see
/// [`ResolvedCell::weighted_average`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResolvedCell {
    pub query: QueryCell,
    /// Raw weighted sum per magnitude bin, in the grid's bin order.
    pub rates: Vec<FloatValue>,
    /// Sum of the overlap weights that contributed.
    pub total_weight: FloatValue,
}

impl ResolvedCell {
    /// Rates divided by the achieved weight.
    pub fn weighted_average(&self) -> Vec<FloatValue> {
        self.rates.iter().map(|r| r / self.total_weight).collect()
    }
}

/// Result of resolving one query cell.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum CellResolution {
    /// No native cell intersects the query cell. Not an error; the cell
    /// contributes nothing to aggregation.
    NoData,
    Resolved(ResolvedCell),
}

/// Resolves query cells against a native grid.
pub struct Resampler<'a> {
    grid: &'a GridIndex,
}

impl<'a> Resampler<'a> {
    pub fn new(grid: &'a GridIndex) -> Self {
        Self { grid }
    }

    /// Resolve one query cell. `aligned` selects the exact-match fast path,
    /// as decided by [`crate::alignment::grid_matches`] for the whole query.
    pub fn resolve(&self, query: QueryCell, aligned: bool) -> ForecastResult<CellResolution> {
        if aligned {
            self.resolve_exact(query)
        } else {
            self.resolve_overlap(query)
        }
    }

    fn resolve_exact(&self, query: QueryCell) -> ForecastResult<CellResolution> {
        let (lon, lat) = query.native_center(self.grid);
        match self.grid.cells_at(lon, lat) {
            [] => Ok(CellResolution::NoData),
            [index] => {
                let cell = &self.grid.cells()[*index];
                Ok(CellResolution::Resolved(ResolvedCell {
                    query,
                    rates: cell.rates.clone(),
                    total_weight: 1.0,
                }))
            }
            more => Err(ForecastError::InvariantViolation(format!(
                "grid {}: {} native cells share the center ({lon}, {lat}), the tessellation is broken",
                self.grid.name(),
                more.len()
            ))),
        }
    }

    fn resolve_overlap(&self, query: QueryCell) -> ForecastResult<CellResolution> {
        let query_area = query.area();
        if query_area <= 0.0 {
            return Ok(CellResolution::NoData);
        }
        let lon_half = self.grid.lon_half();
        let lat_half = self.grid.lat_half();

        let mut rates = vec![0.0; self.grid.magnitude_bins().len()];
        let mut total_weight = 0.0;
        let mut contributing = 0usize;

        for cell in self.grid.cells() {
            // Candidate mask follows the tessellation's half-open cells.
            let intersects = cell.center_lon + lon_half >= query.min_lon
                && cell.center_lon - lon_half < query.max_lon
                && cell.center_lat + lat_half >= query.min_lat
                && cell.center_lat - lat_half < query.max_lat;
            if !intersects {
                continue;
            }

            let dx = (query.max_lon.min(cell.center_lon + lon_half)
                - query.min_lon.max(cell.center_lon - lon_half))
            .max(0.0);
            let dy = (query.max_lat.min(cell.center_lat + lat_half)
                - query.min_lat.max(cell.center_lat - lat_half))
            .max(0.0);
            let overlap = dx * dy;
            if overlap <= 0.0 {
                continue;
            }

            let weight = overlap / query_area;
            for (sum, rate) in rates.iter_mut().zip(&cell.rates) {
                *sum += rate * weight;
            }
            total_weight += weight;
            contributing += 1;
        }

        if contributing == 0 {
            return Ok(CellResolution::NoData);
        }
        if total_weight > 1.0 + WEIGHT_TOLERANCE {
            return Err(ForecastError::InvariantViolation(format!(
                "grid {}: overlap weights for query cell [{}, {}) x [{}, {}) sum to {total_weight}, exceeding full coverage",
                self.grid.name(),
                query.min_lon,
                query.max_lon,
                query.min_lat,
                query.max_lat
            )));
        }
        Ok(CellResolution::Resolved(ResolvedCell {
            query,
            rates,
            total_weight,
        }))
    }
}
