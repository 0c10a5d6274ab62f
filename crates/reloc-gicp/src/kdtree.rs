use std::num::NonZeroUsize;

use kiddo::immutable::float::kdtree::ImmutableKdTree;
use kiddo::SquaredEuclidean;

/// A neighbour returned by a tree query.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Neighbor {
    /// Index of the point in the indexed cloud.
    pub index: usize,
    /// Squared euclidean distance to the query.
    pub distance_sq: f64,
}

/// Immutable k-d tree over the points of one cloud.
///
/// The tree stores point indices, so it is only meaningful together with the
/// cloud it was built from. An empty cloud yields an empty tree whose queries
/// return nothing.
pub struct PointCloudTree {
    tree: Option<ImmutableKdTree<f64, u32, 3, 32>>,
    len: usize,
}

impl std::fmt::Debug for PointCloudTree {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PointCloudTree")
            .field("len", &self.len)
            .finish()
    }
}

impl PointCloudTree {
    /// Build the tree over `points`.
    pub fn new(points: &[[f64; 3]]) -> Self {
        let tree = (!points.is_empty()).then(|| ImmutableKdTree::new_from_slice(points));
        Self {
            tree,
            len: points.len(),
        }
    }

    /// Number of indexed points.
    pub fn len(&self) -> usize {
        self.len
    }

    /// Check if the tree indexes no points.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Find the closest indexed point to `query`.
    pub fn nearest(&self, query: &[f64; 3]) -> Option<Neighbor> {
        let tree = self.tree.as_ref()?;
        let nn = tree.nearest_one::<SquaredEuclidean>(query);
        Some(Neighbor {
            index: nn.item as usize,
            distance_sq: nn.distance,
        })
    }

    /// Find the `k` closest indexed points to `query`, nearest first.
    ///
    /// Returns fewer than `k` neighbours when the tree holds fewer points.
    pub fn knn(&self, query: &[f64; 3], k: usize) -> Vec<Neighbor> {
        let (Some(tree), Some(k)) = (self.tree.as_ref(), NonZeroUsize::new(k.min(self.len)))
        else {
            return Vec::new();
        };

        tree.nearest_n::<SquaredEuclidean>(query, k)
            .into_iter()
            .map(|nn| Neighbor {
                index: nn.item as usize,
                distance_sq: nn.distance,
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_nearest() {
        let points = vec![
            [0.0, 0.0, 0.0],
            [1.0, 0.0, 0.0],
            [0.0, 1.0, 0.0],
            [0.0, 0.0, 1.0],
        ];
        let tree = PointCloudTree::new(&points);
        assert_eq!(tree.len(), 4);

        let nn = tree.nearest(&[0.9, 0.1, 0.0]);
        assert_eq!(nn.map(|n| n.index), Some(1));
        let distance_sq = nn.map(|n| n.distance_sq).unwrap_or(f64::NAN);
        assert!((distance_sq - 0.02).abs() < 1e-12);
    }

    #[test]
    fn test_knn_sorted_and_clamped() {
        let points = (0..5).map(|i| [i as f64, 0.0, 0.0]).collect::<Vec<_>>();
        let tree = PointCloudTree::new(&points);

        let knn = tree.knn(&[0.1, 0.0, 0.0], 3);
        assert_eq!(
            knn.iter().map(|n| n.index).collect::<Vec<_>>(),
            vec![0, 1, 2]
        );

        // asking for more neighbours than points returns every point
        assert_eq!(tree.knn(&[0.0; 3], 20).len(), 5);
        assert!(tree.knn(&[0.0; 3], 0).is_empty());
    }

    #[test]
    fn test_empty_tree() {
        let tree = PointCloudTree::new(&[]);
        assert!(tree.is_empty());
        assert!(tree.nearest(&[0.0; 3]).is_none());
        assert!(tree.knn(&[0.0; 3], 3).is_empty());
    }
}
