//! Request pipeline: resolve, filter, and aggregate for one forecast
//! request.
//!
//! Each request runs synchronously to completion; the only shared state is
//! the read-only [`GridIndex`]. Cancellation, retries, and persistence of
//! the returned tree belong to the surrounding service layer.

use crate::aggregate::{
    epoch_boundaries, single_reservoir_tree, subgeometry_tree, AggregatedSample, DiscreteMfd,
    GutenbergRichterParams, ResultAggregator,
};
use crate::alignment::grid_matches;
use crate::catalog::{CatalogFilter, SeismicEvent, SpatialTransform};
use crate::config::ModelConfig;
use crate::errors::{ForecastError, ForecastResult};
use crate::grid::GridIndex;
use crate::resample::{CellResolution, Resampler};
use crate::reservoir::{ReferencePoint, ReservoirGeometry, ReservoirTree};
use crate::{FloatValue, Timestamp};
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};

/// Forecast horizon and epoch duration.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ForecastWindow {
    pub start: Timestamp,
    pub end: Timestamp,
    /// Seconds between returned forecast values; 0 treats the whole window
    /// as a single epoch.
    pub epoch_duration_s: FloatValue,
}

/// One forecast request. Geometry is optional at the wire level; a missing
/// geometry fails validation before the engine runs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForecastRequest {
    pub geometry: Option<ReservoirGeometry>,
    pub window: ForecastWindow,
}

impl ForecastRequest {
    fn geometry(&self) -> ForecastResult<&ReservoirGeometry> {
        let geometry = self
            .geometry
            .as_ref()
            .ok_or(ForecastError::GeometryMissing)?;
        geometry.validate()?;
        Ok(geometry)
    }
}

/// Resample the native grid onto the requested geometry and aggregate the
/// result tree.
///
/// Rates are scaled from the grid's integrated forecast duration to
/// per-year values before aggregation. Query cells without native data are
/// skipped; they contribute neither samples nor errors.
pub fn resample_forecast(
    grid: &GridIndex,
    request: &ForecastRequest,
) -> ForecastResult<ReservoirTree> {
    let geometry = request.geometry()?;
    grid.validate_reservoir(&geometry.depth_envelope())?;

    let aligned = grid_matches(grid, geometry);
    debug!("query grid aligned with native grid: {aligned}");

    let resampler = Resampler::new(grid);
    let scaling = grid.annual_scaling();
    let mut resolved = Vec::new();
    let mut no_data = 0usize;
    for query in geometry.query_cells() {
        match resampler.resolve(query, aligned)? {
            CellResolution::NoData => no_data += 1,
            CellResolution::Resolved(mut cell) => {
                for rate in &mut cell.rates {
                    *rate *= scaling;
                }
                resolved.push(cell);
            }
        }
    }
    info!(
        "resolved {} query cells ({no_data} without native data)",
        resolved.len()
    );

    let boundaries = epoch_boundaries(
        request.window.start,
        request.window.end,
        request.window.epoch_duration_s,
    )?;
    Ok(ResultAggregator::new(grid).aggregate(&resolved, geometry, &boundaries))
}

/// Restrict an observed catalog to the requested reservoir before training.
pub fn filter_catalog(
    geometry: &ReservoirGeometry,
    reference: &ReferencePoint,
    transform: &dyn SpatialTransform,
    catalog: &[SeismicEvent],
) -> ForecastResult<Vec<SeismicEvent>> {
    geometry.validate()?;
    let filter = CatalogFilter::new(geometry, reference, transform)?;
    Ok(filter.filter(catalog))
}

/// Assemble a result tree from externally trained Gutenberg-Richter
/// parameters.
///
/// Parameter estimation is out of scope; this consumes its outputs,
/// discretizing the law over the configured magnitude bins for every epoch
/// of the window. Epochs whose total expected count is non-positive or NaN
/// are dropped.
pub fn trained_forecast(
    params: &GutenbergRichterParams,
    request: &ForecastRequest,
    config: &ModelConfig,
) -> ForecastResult<ReservoirTree> {
    let geometry = request.geometry()?;
    config.validate()?;

    let boundaries = epoch_boundaries(
        request.window.start,
        request.window.end,
        request.window.epoch_duration_s,
    )?;
    let bins = config.magnitude_bins();

    let samples: Vec<AggregatedSample> = boundaries
        .windows(2)
        .filter_map(|window| {
            let mfd = DiscreteMfd::from_gutenberg_richter(params, &bins, config.mag_increment);
            let total = mfd.total_events();
            if !total.is_finite() || total <= 0.0 {
                warn!(
                    "dropping sample {} - {}: total expected events {total}",
                    window[0], window[1]
                );
                return None;
            }
            Some(AggregatedSample {
                start: window[0],
                end: window[1],
                mc: params.mc,
                mfd,
            })
        })
        .collect();
    info!("{} valid forecast samples", samples.len());

    Ok(if config.return_subgeoms {
        subgeometry_tree(geometry, &samples)
    } else {
        single_reservoir_tree(geometry, samples)
    })
}
