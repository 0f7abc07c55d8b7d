//! Dense distance matrix over 1-indexed node ids.

use crate::models::{Node, NodeId};

/// A dense n×n matrix stored in row-major order, addressed by 1-indexed
/// [`NodeId`]s.
///
/// Used both for travel distances (which double as travel times) and for
/// travel costs (distances scaled by the cost per unit distance).
///
/// # Examples
///
/// ```
/// use u_darpt::models::{Node, NodeKind};
/// use u_darpt::distance::DistanceMatrix;
///
/// let nodes = vec![
///     Node::new(1, NodeKind::Pickup { request: 1 }, 0.0, 0.0),
///     Node::new(2, NodeKind::Dropoff { request: 1 }, 3.0, 4.0),
/// ];
/// let dm = DistanceMatrix::from_nodes(&nodes);
/// assert!((dm.get(1, 2) - 5.0).abs() < 1e-10);
/// assert_eq!(dm.size(), 2);
/// ```
#[derive(Debug, Clone)]
pub struct DistanceMatrix {
    data: Vec<f64>,
    size: usize,
}

impl DistanceMatrix {
    /// Creates a matrix for `size` nodes, initialized to zero.
    pub fn new(size: usize) -> Self {
        Self {
            data: vec![0.0; size * size],
            size,
        }
    }

    /// Computes a Euclidean distance matrix from node coordinates.
    ///
    /// `nodes[k]` must carry id `k + 1`.
    pub fn from_nodes(nodes: &[Node]) -> Self {
        let n = nodes.len();
        let mut dm = Self::new(n);
        for i in 0..n {
            for j in (i + 1)..n {
                let d = nodes[i].distance_to(&nodes[j]);
                dm.set(i + 1, j + 1, d);
                dm.set(j + 1, i + 1, d);
            }
        }
        dm
    }

    /// Returns a copy with every entry multiplied by `factor`.
    pub fn scaled(&self, factor: f64) -> Self {
        Self {
            data: self.data.iter().map(|d| d * factor).collect(),
            size: self.size,
        }
    }

    /// Returns the entry from node `from` to node `to`.
    ///
    /// # Panics
    ///
    /// Panics if either id is `0` or exceeds [`size`](Self::size).
    #[inline]
    pub fn get(&self, from: NodeId, to: NodeId) -> f64 {
        self.data[(from - 1) * self.size + (to - 1)]
    }

    /// Sets the entry from node `from` to node `to`.
    pub fn set(&mut self, from: NodeId, to: NodeId, value: f64) {
        self.data[(from - 1) * self.size + (to - 1)] = value;
    }

    /// Number of nodes in this matrix.
    pub fn size(&self) -> usize {
        self.size
    }

    /// Largest entry, `0` for an empty matrix.
    pub fn max(&self) -> f64 {
        self.data.iter().copied().fold(0.0, f64::max)
    }

    /// Returns the nearest of `candidates` to `from`.
    ///
    /// Ties go to the earliest candidate. Returns `None` if `candidates` is
    /// empty.
    pub fn nearest(&self, from: NodeId, candidates: &[NodeId]) -> Option<NodeId> {
        let mut best: Option<(NodeId, f64)> = None;
        for &c in candidates {
            let d = self.get(from, c);
            if best.is_none_or(|(_, bd)| d < bd) {
                best = Some((c, d));
            }
        }
        best.map(|(c, _)| c)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::NodeKind;

    fn sample_nodes() -> Vec<Node> {
        vec![
            Node::new(1, NodeKind::DepotStart { depot: 0 }, 0.0, 0.0),
            Node::new(2, NodeKind::Pickup { request: 1 }, 3.0, 4.0),
            Node::new(3, NodeKind::Dropoff { request: 1 }, 0.0, 8.0),
        ]
    }

    #[test]
    fn test_from_nodes() {
        let dm = DistanceMatrix::from_nodes(&sample_nodes());
        assert_eq!(dm.size(), 3);
        assert!((dm.get(1, 2) - 5.0).abs() < 1e-10);
        assert!((dm.get(1, 3) - 8.0).abs() < 1e-10);
        assert!(dm.get(1, 1).abs() < 1e-10);
        assert!((dm.get(3, 1) - dm.get(1, 3)).abs() < 1e-10);
    }

    #[test]
    fn test_scaled_and_max() {
        let dm = DistanceMatrix::from_nodes(&sample_nodes());
        let cost = dm.scaled(2.0);
        assert!((cost.get(1, 2) - 10.0).abs() < 1e-10);
        assert!((dm.max() - 8.0).abs() < 1e-10);
        assert!((cost.max() - 16.0).abs() < 1e-10);
    }

    #[test]
    fn test_nearest() {
        let dm = DistanceMatrix::from_nodes(&sample_nodes());
        assert_eq!(dm.nearest(1, &[2, 3]), Some(2));
        assert_eq!(dm.nearest(1, &[3]), Some(3));
        assert_eq!(dm.nearest(1, &[]), None);
    }
}
