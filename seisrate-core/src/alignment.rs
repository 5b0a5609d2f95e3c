//! Classification of a query grid as native-aligned or foreign.
//!
//! A query that reproduces the native tessellation exactly can be resolved
//! with a direct center lookup per cell; anything else goes through the
//! fractional-area resampling path. The decision is all-or-nothing: a
//! mismatch on either axis forces the foreign path for the whole query.

use crate::grid::{round_coord, GridIndex};
use crate::reservoir::ReservoirGeometry;
use crate::FloatValue;
use log::warn;
use ndarray::Array1;

/// Boundary sequence the grid itself would generate for one axis: edges from
/// the first cell's lower bound through the last cell's upper bound, rounded
/// to the grid's coordinate resolution.
fn native_boundaries(
    min_center: FloatValue,
    max_center: FloatValue,
    increment: FloatValue,
) -> Vec<FloatValue> {
    Array1::range(min_center - increment / 2.0, max_center + increment, increment)
        .iter()
        .map(|v| round_coord(*v))
        .collect()
}

fn axis_matches(query: &[FloatValue], native: &[FloatValue]) -> bool {
    query.len() == native.len()
        && query
            .iter()
            .zip(native)
            .all(|(q, n)| round_coord(*q) == *n)
}

/// Decide whether the caller's query grid coincides exactly with the native
/// grid. Boundary coordinates are compared element-wise after rounding to
/// the grid resolution; both axes must match.
pub fn grid_matches(grid: &GridIndex, geometry: &ReservoirGeometry) -> bool {
    let native_lon = native_boundaries(grid.lon_min(), grid.lon_max(), grid.lon_increment());
    let native_lat = native_boundaries(grid.lat_min(), grid.lat_max(), grid.lat_increment());

    let lon_match = axis_matches(&geometry.x, &native_lon);
    let lat_match = axis_matches(&geometry.y, &native_lat);
    if !lon_match {
        warn!(
            "grid {}: query longitudes do not match the native grid, resampling",
            grid.name()
        );
    }
    if !lat_match {
        warn!(
            "grid {}: query latitudes do not match the native grid, resampling",
            grid.name()
        );
    }
    lon_match && lat_match
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grid::{DepthLayer, GridSource, SourceCell};

    /// 3x2 grid of 0.1 degree cells, centers from (10.1, 40.1).
    fn grid() -> GridIndex {
        let cells = (0..3)
            .flat_map(|i| {
                (0..2).map(move |j| SourceCell {
                    lon: round_coord(10.1 + 0.1 * i as FloatValue),
                    lat: round_coord(40.1 + 0.1 * j as FloatValue),
                    rates: vec![1.0, 2.0],
                })
            })
            .collect();
        GridIndex::new(GridSource {
            name: "aligned".to_string(),
            lon_increment: 0.1,
            lat_increment: 0.1,
            depth_layer: DepthLayer {
                min_km: 0.0,
                max_km: 30.0,
            },
            forecast_duration_years: 1.0,
            completeness_magnitude: 1.0,
            magnitude_bins: vec!["4.95".to_string(), "5.05".to_string()],
            cells,
        })
        .unwrap()
    }

    fn aligned_geometry() -> ReservoirGeometry {
        ReservoirGeometry {
            x: vec![10.05, 10.15, 10.25, 10.35],
            y: vec![40.05, 40.15, 40.25],
            z: vec![-30_000.0, 0.0],
            spatial_reference: None,
        }
    }

    #[test]
    fn exact_boundaries_match() {
        assert!(grid_matches(&grid(), &aligned_geometry()));
    }

    #[test]
    fn rounding_noise_still_matches() {
        let mut geom = aligned_geometry();
        geom.x[1] = 10.149999999;
        assert!(grid_matches(&grid(), &geom));
    }

    #[test]
    fn shifted_axis_is_foreign() {
        let mut geom = aligned_geometry();
        geom.x = geom.x.iter().map(|v| v + 0.05).collect();
        assert!(!grid_matches(&grid(), &geom));
    }

    #[test]
    fn partial_extent_is_foreign() {
        // Same resolution, smaller total dimension: still a mismatch.
        let mut geom = aligned_geometry();
        geom.x.pop();
        assert!(!grid_matches(&grid(), &geom));
    }

    #[test]
    fn one_bad_axis_forces_foreign_path() {
        let mut geom = aligned_geometry();
        geom.y = vec![40.0, 40.1, 40.2];
        assert!(!grid_matches(&grid(), &geom));
    }
}
