//! Aggregation of resolved cell values into the hierarchical result tree.
//!
//! Depth-integrated magnitude-frequency values are partitioned across the
//! requested depth sub-intervals, the forecast horizon is discretized into
//! epochs, and the per-epoch samples are assembled into a
//! [`ReservoirTree`].

use crate::errors::{ForecastError, ForecastResult};
use crate::grid::{GridIndex, MagnitudeBin};
use crate::resample::ResolvedCell;
use crate::reservoir::{DepthInterval, ReservoirGeometry, ReservoirNode, ReservoirTree};
use crate::{FloatValue, Timestamp};
use chrono::Duration;
use log::{info, warn};
use serde::{Deserialize, Serialize};

/// Gutenberg-Richter law parameters produced by an external training step.
/// This crate consumes them; it never estimates them.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GutenbergRichterParams {
    pub a: FloatValue,
    pub b: FloatValue,
    /// Completeness magnitude of the training catalog.
    pub mc: FloatValue,
}

/// One magnitude bin of an aggregated sample.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MfdBin {
    pub reference_magnitude: FloatValue,
    pub event_count: FloatValue,
    /// Poisson-count uncertainty: the square root of the count.
    pub uncertainty: FloatValue,
}

impl MfdBin {
    pub fn new(reference_magnitude: FloatValue, event_count: FloatValue) -> Self {
        Self {
            reference_magnitude,
            event_count,
            uncertainty: event_count.sqrt(),
        }
    }
}

/// Discretized magnitude-frequency distribution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiscreteMfd {
    pub min_mag: FloatValue,
    pub max_mag: FloatValue,
    pub bin_width: FloatValue,
    pub bins: Vec<MfdBin>,
}

impl DiscreteMfd {
    pub fn total_events(&self) -> FloatValue {
        self.bins.iter().map(|bin| bin.event_count).sum()
    }

    /// Discretize a Gutenberg-Richter law `N(>=m) = 10^(a - b*m)` over the
    /// given bins: each bin gets the events between its lower and upper
    /// magnitude bound.
    pub fn from_gutenberg_richter(
        params: &GutenbergRichterParams,
        bins: &[MagnitudeBin],
        bin_width: FloatValue,
    ) -> Self {
        let counts = bins
            .iter()
            .map(|bin| {
                let lower = bin.magnitude - bin_width / 2.0;
                let upper = bin.magnitude + bin_width / 2.0;
                let count = 10f64.powf(params.a - params.b * lower)
                    - 10f64.powf(params.a - params.b * upper);
                MfdBin::new(bin.magnitude, count)
            })
            .collect();
        Self {
            min_mag: bins.first().map(|b| b.magnitude).unwrap_or(0.0),
            max_mag: bins.last().map(|b| b.magnitude).unwrap_or(0.0),
            bin_width,
            bins: counts,
        }
    }
}

/// One forecast epoch's result: a time interval `[start, end)`, per-bin
/// event-count estimates, and the completeness magnitude.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregatedSample {
    pub start: Timestamp,
    pub end: Timestamp,
    /// Completeness magnitude.
    pub mc: FloatValue,
    pub mfd: DiscreteMfd,
}

/// Generate epoch boundaries at fixed intervals from `start` to `end`.
///
/// A non-positive duration treats the whole window as a single epoch, and a
/// duration longer than the window is clamped to it. The epoch count is the
/// ceiling of window / duration, with the final boundary clamped to `end`,
/// so a partial tail epoch is included.
pub fn epoch_boundaries(
    start: Timestamp,
    end: Timestamp,
    epoch_seconds: FloatValue,
) -> ForecastResult<Vec<Timestamp>> {
    let window_ms = (end - start).num_milliseconds();
    if window_ms <= 0 {
        return Err(ForecastError::InvalidWindow(format!(
            "end {end} is not after start {start}"
        )));
    }
    if !epoch_seconds.is_finite() {
        return Err(ForecastError::InvalidWindow(format!(
            "epoch duration {epoch_seconds} is not finite"
        )));
    }

    let mut epoch_ms = (epoch_seconds * 1000.0) as i64;
    if epoch_ms <= 0 {
        epoch_ms = window_ms;
    } else if epoch_ms > window_ms {
        info!(
            "epoch duration exceeds the forecast window, clamping to {} s",
            window_ms as FloatValue / 1000.0
        );
        epoch_ms = window_ms;
    }

    let count = (window_ms + epoch_ms - 1) / epoch_ms;
    let mut boundaries = Vec::with_capacity(count as usize + 1);
    for i in 0..=count {
        let boundary = start + Duration::milliseconds(i * epoch_ms);
        boundaries.push(boundary.min(end));
    }
    Ok(boundaries)
}

/// Combines resolved cell values with depth and time partitioning into the
/// output tree.
pub struct ResultAggregator<'a> {
    grid: &'a GridIndex,
}

impl<'a> ResultAggregator<'a> {
    pub fn new(grid: &'a GridIndex) -> Self {
        Self { grid }
    }

    /// Samples for one (cell, depth interval) pair, one per epoch.
    ///
    /// The depth-integrated rate is divided by the interval's fraction of
    /// the grid depth extent, reproducing the published model's
    /// normalization. Samples whose total count is non-positive or NaN are
    /// dropped; that is a data-quality filter, not a fault.
    fn interval_samples(
        &self,
        rates: &[FloatValue],
        interval: DepthInterval,
        boundaries: &[Timestamp],
    ) -> Vec<AggregatedSample> {
        let depth_fraction = interval.height() / self.grid.depth_extent_m();
        let bins = self.grid.magnitude_bins();
        boundaries
            .windows(2)
            .filter_map(|window| {
                let mfd_bins: Vec<MfdBin> = bins
                    .iter()
                    .zip(rates)
                    .map(|(bin, rate)| MfdBin::new(bin.magnitude, rate / depth_fraction))
                    .collect();
                let mfd = DiscreteMfd {
                    min_mag: bins[0].magnitude,
                    max_mag: bins[bins.len() - 1].magnitude,
                    bin_width: self.grid.bin_width(),
                    bins: mfd_bins,
                };
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
                    mc: self.grid.completeness_magnitude(),
                    mfd,
                })
            })
            .collect()
    }

    /// Assemble the result tree: one child node per resolved cell and depth
    /// sub-interval, under a synthetic root spanning the whole request.
    pub fn aggregate(
        &self,
        cells: &[ResolvedCell],
        geometry: &ReservoirGeometry,
        boundaries: &[Timestamp],
    ) -> ReservoirTree {
        let mut tree = ReservoirTree::new(root_node(geometry));
        let root = tree.root();
        let intervals = geometry.depth_intervals();
        for cell in cells {
            for interval in &intervals {
                let samples = self.interval_samples(&cell.rates, *interval, boundaries);
                tree.add_child(
                    root,
                    ReservoirNode {
                        x_min: cell.query.min_lon,
                        x_max: cell.query.max_lon,
                        y_min: cell.query.min_lat,
                        y_max: cell.query.max_lat,
                        z_min: interval.min,
                        z_max: interval.max,
                        samples,
                    },
                );
            }
        }
        info!("assembled result tree with {} nodes", tree.node_count());
        tree
    }
}

fn root_node(geometry: &ReservoirGeometry) -> ReservoirNode {
    let (x_min, x_max, y_min, y_max, z_min, z_max) = geometry.bounds();
    ReservoirNode {
        x_min,
        x_max,
        y_min,
        y_max,
        z_min,
        z_max,
        samples: vec![],
    }
}

/// Tree with a single node carrying the whole-reservoir samples.
pub fn single_reservoir_tree(
    geometry: &ReservoirGeometry,
    samples: Vec<AggregatedSample>,
) -> ReservoirTree {
    let mut node = root_node(geometry);
    node.samples = samples;
    ReservoirTree::new(node)
}

/// Tree replicating one sample list across every (cell, depth interval)
/// child of the synthetic root.
pub fn subgeometry_tree(
    geometry: &ReservoirGeometry,
    samples: &[AggregatedSample],
) -> ReservoirTree {
    let mut tree = ReservoirTree::new(root_node(geometry));
    let root = tree.root();
    let intervals = geometry.depth_intervals();
    for cell in geometry.query_cells() {
        for interval in &intervals {
            tree.add_child(
                root,
                ReservoirNode {
                    x_min: cell.min_lon,
                    x_max: cell.max_lon,
                    y_min: cell.min_lat,
                    y_max: cell.max_lat,
                    z_min: interval.min,
                    z_max: interval.max,
                    samples: samples.to_vec(),
                },
            );
        }
    }
    tree
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grid::{DepthLayer, GridSource, SourceCell};
    use crate::resample::QueryCell;
    use chrono::{TimeZone, Utc};
    use is_close::is_close;

    fn grid() -> GridIndex {
        GridIndex::new(GridSource {
            name: "aggregate".to_string(),
            lon_increment: 0.1,
            lat_increment: 0.1,
            depth_layer: DepthLayer {
                min_km: 0.0,
                max_km: 30.0,
            },
            forecast_duration_years: 1.0,
            completeness_magnitude: 1.3,
            magnitude_bins: vec!["4.95".to_string(), "5.05".to_string()],
            cells: vec![SourceCell {
                lon: 10.1,
                lat: 40.1,
                rates: vec![0.6, 0.3],
            }],
        })
        .unwrap()
    }

    fn t(hour: u32) -> Timestamp {
        Utc.with_ymd_and_hms(2024, 1, 1, hour, 0, 0).unwrap()
    }

    #[test]
    fn epochs_divide_the_window_evenly() {
        let boundaries = epoch_boundaries(t(0), t(12), 4.0 * 3600.0).unwrap();
        assert_eq!(boundaries, vec![t(0), t(4), t(8), t(12)]);
    }

    #[test]
    fn partial_tail_epoch_is_clamped_to_the_end() {
        let boundaries = epoch_boundaries(t(0), t(10), 4.0 * 3600.0).unwrap();
        assert_eq!(boundaries, vec![t(0), t(4), t(8), t(10)]);
    }

    #[test]
    fn zero_duration_means_a_single_epoch() {
        let boundaries = epoch_boundaries(t(0), t(12), 0.0).unwrap();
        assert_eq!(boundaries, vec![t(0), t(12)]);
    }

    #[test]
    fn epoch_longer_than_window_is_clamped() {
        let boundaries = epoch_boundaries(t(0), t(12), 24.0 * 3600.0).unwrap();
        assert_eq!(boundaries, vec![t(0), t(12)]);
    }

    #[test]
    fn empty_window_is_rejected() {
        assert!(matches!(
            epoch_boundaries(t(12), t(12), 3600.0),
            Err(ForecastError::InvalidWindow(_))
        ));
    }

    #[test]
    fn uncertainty_is_the_square_root_of_the_count() {
        let bin = MfdBin::new(5.0, 9.0);
        assert!(is_close!(bin.uncertainty, 3.0));
    }

    #[test]
    fn depth_partition_divides_by_the_fraction() {
        // A sub-interval of a third of the grid's 30 km extent yields counts
        // divided by 1/3, i.e. tripled. This reproduces the published
        // model's normalization; flip this test first if the apportionment
        // is ever corrected to a multiplication.
        let grid = grid();
        let aggregator = ResultAggregator::new(&grid);
        let geometry = ReservoirGeometry {
            x: vec![10.05, 10.15],
            y: vec![40.05, 40.15],
            z: vec![-10_000.0, 0.0],
            spatial_reference: None,
        };
        let cell = ResolvedCell {
            query: QueryCell {
                min_lon: 10.05,
                max_lon: 10.15,
                min_lat: 40.05,
                max_lat: 40.15,
            },
            rates: vec![0.6, 0.3],
            total_weight: 1.0,
        };
        let boundaries = vec![t(0), t(12)];
        let tree = aggregator.aggregate(&[cell], &geometry, &boundaries);
        let children = tree.children(tree.root());
        assert_eq!(children.len(), 1);
        let sample = &tree.node(children[0]).samples[0];
        assert!(is_close!(sample.mfd.bins[0].event_count, 1.8, rel_tol = 1e-9));
        assert!(is_close!(sample.mfd.bins[1].event_count, 0.9, rel_tol = 1e-9));
        assert!(is_close!(sample.mc, 1.3));
    }

    #[test]
    fn non_positive_samples_are_dropped() {
        let grid = grid();
        let aggregator = ResultAggregator::new(&grid);
        let interval = DepthInterval {
            min: -30_000.0,
            max: 0.0,
        };
        let boundaries = vec![t(0), t(6), t(12)];
        let zeroed = aggregator.interval_samples(&[0.0, 0.0], interval, &boundaries);
        assert!(zeroed.is_empty());
        let nan = aggregator.interval_samples(&[FloatValue::NAN, 0.1], interval, &boundaries);
        assert!(nan.is_empty());
    }

    #[test]
    fn one_sample_per_epoch_in_chronological_order() {
        let grid = grid();
        let aggregator = ResultAggregator::new(&grid);
        let interval = DepthInterval {
            min: -30_000.0,
            max: 0.0,
        };
        let boundaries = vec![t(0), t(4), t(8), t(12)];
        let samples = aggregator.interval_samples(&[0.6, 0.3], interval, &boundaries);
        assert_eq!(samples.len(), 3);
        assert!(samples.windows(2).all(|pair| pair[0].end == pair[1].start));
        assert_eq!(samples[0].start, t(0));
        assert_eq!(samples[2].end, t(12));
    }

    #[test]
    fn gutenberg_richter_bins_decrease_with_magnitude() {
        let params = GutenbergRichterParams {
            a: 2.0,
            b: 1.0,
            mc: 1.0,
        };
        let bins = vec![
            MagnitudeBin {
                label: "2.0".to_string(),
                magnitude: 2.0,
            },
            MagnitudeBin {
                label: "3.0".to_string(),
                magnitude: 3.0,
            },
        ];
        let mfd = DiscreteMfd::from_gutenberg_richter(&params, &bins, 1.0);
        // N(>=1.5) - N(>=2.5) = 10^0.5 - 10^-0.5
        assert!(is_close!(
            mfd.bins[0].event_count,
            10f64.powf(0.5) - 10f64.powf(-0.5),
            rel_tol = 1e-9
        ));
        assert!(mfd.bins[0].event_count > mfd.bins[1].event_count);
        assert!(is_close!(mfd.total_events(), mfd.bins[0].event_count + mfd.bins[1].event_count));
    }

    #[test]
    fn single_reservoir_tree_has_one_node() {
        let geometry = ReservoirGeometry {
            x: vec![10.0, 11.0],
            y: vec![40.0, 41.0],
            z: vec![-10_000.0, 0.0],
            spatial_reference: None,
        };
        let sample = AggregatedSample {
            start: t(0),
            end: t(12),
            mc: 1.0,
            mfd: DiscreteMfd {
                min_mag: 5.0,
                max_mag: 5.0,
                bin_width: 0.1,
                bins: vec![MfdBin::new(5.0, 2.0)],
            },
        };
        let tree = single_reservoir_tree(&geometry, vec![sample]);
        assert_eq!(tree.node_count(), 1);
        assert_eq!(tree.node(tree.root()).samples.len(), 1);
    }

    #[test]
    fn subgeometry_tree_replicates_samples() {
        let geometry = ReservoirGeometry {
            x: vec![10.0, 10.5, 11.0],
            y: vec![40.0, 41.0],
            z: vec![-10_000.0, -5000.0, 0.0],
            spatial_reference: None,
        };
        let tree = subgeometry_tree(&geometry, &[]);
        // 2 cells x 2 depth intervals under the root.
        assert_eq!(tree.children(tree.root()).len(), 4);
    }
}
