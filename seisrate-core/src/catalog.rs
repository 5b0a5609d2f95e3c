//! Catalog filtering against a reservoir footprint.
//!
//! Restricts an observed event catalog to the events inside a reservoir's
//! horizontal footprint and depth envelope. Coordinate-reference-system math
//! is an external collaborator capability consumed through the
//! [`SpatialTransform`] seam.

use crate::errors::ForecastResult;
use crate::reservoir::{ReferencePoint, ReservoirGeometry};
use crate::{FloatValue, Timestamp};
use geo::{Contains, Coord, LineString, Point, Polygon};
use log::info;
use serde::{Deserialize, Serialize};

/// One observed seismic event. Immutable once parsed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SeismicEvent {
    pub time: Timestamp,
    pub magnitude: FloatValue,
    pub latitude: FloatValue,
    pub longitude: FloatValue,
    /// Depth in meters, positive down.
    pub depth: FloatValue,
}

/// Projects reservoir-local coordinates to geographic longitude/latitude.
pub trait SpatialTransform {
    fn to_geographic(
        &self,
        x: FloatValue,
        y: FloatValue,
    ) -> ForecastResult<(FloatValue, FloatValue)>;
}

/// Transform for geometries already expressed in geographic coordinates.
#[derive(Debug, Clone, Copy, Default)]
pub struct IdentityTransform;

impl SpatialTransform for IdentityTransform {
    fn to_geographic(
        &self,
        x: FloatValue,
        y: FloatValue,
    ) -> ForecastResult<(FloatValue, FloatValue)> {
        Ok((x, y))
    }
}

/// Restricts an event catalog to one reservoir's horizontal footprint and
/// depth envelope.
///
/// Filtering is a pure function of the catalog and the geometry: the same
/// inputs always produce the same output set, and filtering twice with the
/// same geometry is idempotent.
pub struct CatalogFilter {
    footprint: Polygon<FloatValue>,
    min_depth: FloatValue,
    max_depth: FloatValue,
}

impl CatalogFilter {
    pub fn new(
        geometry: &ReservoirGeometry,
        reference: &ReferencePoint,
        transform: &dyn SpatialTransform,
    ) -> ForecastResult<Self> {
        let (x_min, x_max, y_min, y_max, z_min, z_max) = geometry.bounds();
        let min_x = x_min + reference.x;
        let max_x = x_max + reference.x;
        let min_y = y_min + reference.y;
        let max_y = y_max + reference.y;

        let corners = [
            transform.to_geographic(min_x, min_y)?,
            transform.to_geographic(min_x, max_y)?,
            transform.to_geographic(max_x, max_y)?,
            transform.to_geographic(max_x, min_y)?,
        ];
        let ring: Vec<Coord<FloatValue>> = corners
            .iter()
            .map(|(lon, lat)| Coord { x: *lon, y: *lat })
            .collect();
        let footprint = Polygon::new(LineString::from(ring), vec![]);

        // The reservoir's true volume may be a general polyhedron; depth
        // filtering uses only the bounding altitudes, converted to depths.
        let min_depth = -z_max;
        let max_depth = -z_min;

        Ok(Self {
            footprint,
            min_depth,
            max_depth,
        })
    }

    fn keeps(&self, event: &SeismicEvent) -> bool {
        self.footprint
            .contains(&Point::new(event.longitude, event.latitude))
            && event.depth > self.min_depth
            && event.depth < self.max_depth
    }

    /// Keep only the events strictly inside the footprint and strictly
    /// between the reservoir's depth bounds. Builds a new vector; the input
    /// catalog is untouched.
    pub fn filter(&self, catalog: &[SeismicEvent]) -> Vec<SeismicEvent> {
        let kept: Vec<SeismicEvent> = catalog
            .iter()
            .filter(|event| self.keeps(event))
            .cloned()
            .collect();
        info!(
            "catalog filter kept {} of {} events",
            kept.len(),
            catalog.len()
        );
        kept
    }
}
