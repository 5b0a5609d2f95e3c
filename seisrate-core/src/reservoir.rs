//! Reservoir geometry and the hierarchical result tree.
//!
//! The caller describes the requested forecast volume as three ordered
//! boundary sequences; the engine answers with a [`ReservoirTree`], an index
//! arena of [`ReservoirNode`] values with one-directional parent-to-child
//! edges.

use crate::aggregate::AggregatedSample;
use crate::errors::{ForecastError, ForecastResult};
use crate::resample::QueryCell;
use crate::FloatValue;
use petgraph::graph::{Graph, NodeIndex};
use serde::{Deserialize, Serialize};

/// Reference-point offset applied to reservoir-local coordinates.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ReferencePoint {
    pub x: FloatValue,
    pub y: FloatValue,
}

/// Min/max altitude bounds of one sub-geometry, meters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DepthInterval {
    pub min: FloatValue,
    pub max: FloatValue,
}

impl DepthInterval {
    pub fn height(&self) -> FloatValue {
        self.max - self.min
    }
}

/// Caller-supplied reservoir geometry: three ordered sequences of boundary
/// coordinates, each pair of adjacent values defining one cell extent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReservoirGeometry {
    /// Longitude-like boundaries, degrees.
    pub x: Vec<FloatValue>,
    /// Latitude-like boundaries, degrees.
    pub y: Vec<FloatValue>,
    /// Altitude boundaries, meters (negative below the reference surface).
    pub z: Vec<FloatValue>,
    /// Spatial-reference identifier understood by the coordinate-transform
    /// collaborator. Carried through untouched; the collaborator that
    /// constructs the [`crate::catalog::SpatialTransform`] for this geometry
    /// owns the mapping from the identifier to the transform.
    #[serde(default)]
    pub spatial_reference: Option<String>,
}

impl ReservoirGeometry {
    pub fn validate(&self) -> ForecastResult<()> {
        for (axis, values) in [("x", &self.x), ("y", &self.y), ("z", &self.z)] {
            if values.len() < 2 {
                return Err(ForecastError::InvalidGeometry(format!(
                    "axis {axis} needs at least two boundary values, got {}",
                    values.len()
                )));
            }
            if values.windows(2).any(|pair| pair[1] <= pair[0]) {
                return Err(ForecastError::InvalidGeometry(format!(
                    "axis {axis} boundaries must be strictly increasing"
                )));
            }
        }
        Ok(())
    }

    /// Query cells from consecutive x/y boundary pairs, x-major.
    pub fn query_cells(&self) -> Vec<QueryCell> {
        let mut cells =
            Vec::with_capacity(self.x.len().saturating_sub(1) * self.y.len().saturating_sub(1));
        for lon in self.x.windows(2) {
            for lat in self.y.windows(2) {
                cells.push(QueryCell {
                    min_lon: lon[0],
                    max_lon: lon[1],
                    min_lat: lat[0],
                    max_lat: lat[1],
                });
            }
        }
        cells
    }

    /// Depth sub-intervals from consecutive z boundary pairs.
    pub fn depth_intervals(&self) -> Vec<DepthInterval> {
        self.z
            .windows(2)
            .map(|pair| DepthInterval {
                min: pair[0],
                max: pair[1],
            })
            .collect()
    }

    /// Full altitude span of the requested volume.
    pub fn depth_envelope(&self) -> DepthInterval {
        DepthInterval {
            min: fold_min(&self.z),
            max: fold_max(&self.z),
        }
    }

    /// Bounds of the whole requested volume, for the synthetic root node.
    pub fn bounds(&self) -> (FloatValue, FloatValue, FloatValue, FloatValue, FloatValue, FloatValue) {
        (
            fold_min(&self.x),
            fold_max(&self.x),
            fold_min(&self.y),
            fold_max(&self.y),
            fold_min(&self.z),
            fold_max(&self.z),
        )
    }
}

fn fold_min(values: &[FloatValue]) -> FloatValue {
    values.iter().copied().fold(FloatValue::INFINITY, FloatValue::min)
}

fn fold_max(values: &[FloatValue]) -> FloatValue {
    values.iter().copied().fold(FloatValue::NEG_INFINITY, FloatValue::max)
}

/// One spatial node of the result tree: bounds plus the chronological sample
/// sequence. Insertion order of samples is chronological order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReservoirNode {
    pub x_min: FloatValue,
    pub x_max: FloatValue,
    pub y_min: FloatValue,
    pub y_max: FloatValue,
    pub z_min: FloatValue,
    pub z_max: FloatValue,
    pub samples: Vec<AggregatedSample>,
}

/// Hierarchical forecast result.
///
/// Nodes live in an index arena; parents reference children through
/// one-directional edges and children keep insertion order. The root spans
/// the full requested volume.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReservoirTree {
    graph: Graph<ReservoirNode, ()>,
    root: NodeIndex,
}

impl ReservoirTree {
    pub fn new(root: ReservoirNode) -> Self {
        let mut graph = Graph::new();
        let root = graph.add_node(root);
        Self { graph, root }
    }

    pub fn root(&self) -> NodeIndex {
        self.root
    }

    pub fn node(&self, index: NodeIndex) -> &ReservoirNode {
        &self.graph[index]
    }

    pub fn add_child(&mut self, parent: NodeIndex, node: ReservoirNode) -> NodeIndex {
        let child = self.graph.add_node(node);
        self.graph.add_edge(parent, child, ());
        child
    }

    /// Children of a node in insertion order.
    pub fn children(&self, parent: NodeIndex) -> Vec<NodeIndex> {
        // petgraph iterates the most recently added edge first.
        let mut children: Vec<NodeIndex> = self.graph.neighbors(parent).collect();
        children.reverse();
        children
    }

    pub fn node_count(&self) -> usize {
        self.graph.node_count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use is_close::is_close;

    fn geometry() -> ReservoirGeometry {
        ReservoirGeometry {
            x: vec![10.05, 10.15, 10.25],
            y: vec![40.05, 40.15],
            z: vec![-4000.0, -2000.0, 0.0],
            spatial_reference: None,
        }
    }

    #[test]
    fn valid_geometry_passes() {
        assert!(geometry().validate().is_ok());
    }

    #[test]
    fn too_few_boundaries_rejected() {
        let mut geom = geometry();
        geom.y = vec![40.05];
        assert!(matches!(
            geom.validate(),
            Err(ForecastError::InvalidGeometry(_))
        ));
    }

    #[test]
    fn non_monotonic_boundaries_rejected() {
        let mut geom = geometry();
        geom.x = vec![10.05, 10.05, 10.25];
        assert!(matches!(
            geom.validate(),
            Err(ForecastError::InvalidGeometry(_))
        ));
    }

    #[test]
    fn query_cells_are_x_major_boundary_pairs() {
        let cells = geometry().query_cells();
        assert_eq!(cells.len(), 2);
        assert!(is_close!(cells[0].min_lon, 10.05));
        assert!(is_close!(cells[0].max_lon, 10.15));
        assert!(is_close!(cells[1].min_lon, 10.15));
        assert!(is_close!(cells[1].max_lon, 10.25));
        assert!(is_close!(cells[0].min_lat, 40.05));
        assert!(is_close!(cells[0].max_lat, 40.15));
    }

    #[test]
    fn depth_intervals_partition_the_envelope() {
        let geom = geometry();
        let intervals = geom.depth_intervals();
        assert_eq!(intervals.len(), 2);
        let total: FloatValue = intervals.iter().map(DepthInterval::height).sum();
        assert!(is_close!(total, geom.depth_envelope().height()));
    }

    #[test]
    fn tree_children_keep_insertion_order() {
        let node = |z_min: FloatValue| ReservoirNode {
            x_min: 0.0,
            x_max: 1.0,
            y_min: 0.0,
            y_max: 1.0,
            z_min,
            z_max: z_min + 1.0,
            samples: vec![],
        };
        let mut tree = ReservoirTree::new(node(0.0));
        let root = tree.root();
        let first = tree.add_child(root, node(1.0));
        let second = tree.add_child(root, node(2.0));
        let third = tree.add_child(root, node(3.0));
        assert_eq!(tree.children(root), vec![first, second, third]);
        assert_eq!(tree.node_count(), 4);
        assert!(tree.children(first).is_empty());
    }

    #[test]
    fn tree_serializes() {
        let tree = ReservoirTree::new(ReservoirNode {
            x_min: 10.05,
            x_max: 10.25,
            y_min: 40.05,
            y_max: 40.15,
            z_min: -4000.0,
            z_max: 0.0,
            samples: vec![],
        });
        let raw = serde_json::to_string(&tree).unwrap();
        let back: ReservoirTree = serde_json::from_str(&raw).unwrap();
        assert_eq!(back.node_count(), 1);
        assert!(is_close!(back.node(back.root()).x_max, 10.25));
    }
}
