//! CART (Classification and Regression Tree) builder
//!
//! Exact-greedy regression tree construction on gradient statistics.
//! Feature columns are presorted once per booster; each node receives the
//! sorted sample lists of its members and partitions them stably for its
//! children, so a tree level costs one pass per feature.

use rayon::prelude::*;

use crate::deterministic::SplitTieBreaker;
use crate::tree::{Node, Tree};

/// Splits below this loss reduction are not taken.
const MIN_SPLIT_GAIN: f64 = 1e-6;

/// Training parameters for a single tree
#[derive(Clone, Debug)]
pub struct TreeConfig {
    pub max_depth: usize,
    /// Minimum hessian sum on each side of a split
    pub min_child_weight: f64,
    /// L2 regularisation on leaf weights
    pub reg_lambda: f64,
    /// Minimum loss reduction required to split
    pub gamma: f64,
}

impl Default for TreeConfig {
    fn default() -> Self {
        Self {
            max_depth: 6,
            min_child_weight: 1.0,
            reg_lambda: 1.0,
            gamma: 0.0,
        }
    }
}

/// Split candidate with gain and tie-breaker
#[derive(Debug, Clone)]
struct SplitCandidate {
    feature_idx: usize,
    threshold: f64,
    gain: f64,
    tie_breaker: SplitTieBreaker,
}

impl SplitCandidate {
    fn beats(&self, other: &SplitCandidate) -> bool {
        self.gain > other.gain || (self.gain == other.gain && self.tie_breaker < other.tie_breaker)
    }
}

/// Sample indices of every feature column sorted by value.
pub fn presort_features(features: &[Vec<f64>], feature_count: usize) -> Vec<Vec<usize>> {
    (0..feature_count)
        .into_par_iter()
        .map(|feature_idx| {
            let mut order: Vec<usize> = (0..features.len()).collect();
            order.sort_by(|&a, &b| {
                features[a][feature_idx]
                    .total_cmp(&features[b][feature_idx])
                    .then(a.cmp(&b))
            });
            order
        })
        .collect()
}

/// Build a regression tree using exact-greedy CART algorithm
pub struct CartBuilder<'a> {
    config: TreeConfig,
    features: &'a [Vec<f64>],
    gradients: &'a [f64],
    hessians: &'a [f64],
    presorted: &'a [Vec<usize>],
}

impl<'a> CartBuilder<'a> {
    pub fn new(
        features: &'a [Vec<f64>],
        gradients: &'a [f64],
        hessians: &'a [f64],
        presorted: &'a [Vec<usize>],
        config: TreeConfig,
    ) -> Self {
        assert_eq!(features.len(), gradients.len());
        assert_eq!(features.len(), hessians.len());

        Self {
            config,
            features,
            gradients,
            hessians,
            presorted,
        }
    }

    /// Build tree and return nodes
    pub fn build(&self) -> Tree {
        let mut nodes = Vec::new();
        let members: Vec<usize> = (0..self.features.len()).collect();
        self.build_node(members, self.presorted.to_vec(), 0, 0, &mut nodes);
        Tree { nodes }
    }

    /// Recursively build tree nodes, returns the index of the created node
    fn build_node(
        &self,
        members: Vec<usize>,
        sorted: Vec<Vec<usize>>,
        depth: usize,
        node_id: usize,
        nodes: &mut Vec<Node>,
    ) -> i32 {
        let current_idx = nodes.len() as i32;
        let (sum_g, sum_h) = self.sum_gradients_hessians(&members);
        let leaf_value = self.leaf_weight(sum_g, sum_h);

        if depth >= self.config.max_depth || members.len() < 2 {
            nodes.push(Node::leaf(current_idx, leaf_value, sum_h));
            return current_idx;
        }

        let Some(split) = self.find_best_split(&sorted, sum_g, sum_h, node_id) else {
            nodes.push(Node::leaf(current_idx, leaf_value, sum_h));
            return current_idx;
        };

        let mut goes_left = vec![false; self.features.len()];
        let (left_members, right_members): (Vec<usize>, Vec<usize>) = members
            .iter()
            .partition(|&&idx| self.features[idx][split.feature_idx] <= split.threshold);
        for &idx in &left_members {
            goes_left[idx] = true;
        }

        let (left_sorted, right_sorted): (Vec<Vec<usize>>, Vec<Vec<usize>>) = sorted
            .into_iter()
            .map(|column| -> (Vec<usize>, Vec<usize>) {
                column.into_iter().partition(|&idx| goes_left[idx])
            })
            .unzip();

        // Reserve the slot; children are linked after recursion.
        nodes.push(Node::internal(
            current_idx,
            split.feature_idx as i32,
            split.threshold,
            split.gain,
            sum_h,
        ));

        let left_idx = self.build_node(left_members, left_sorted, depth + 1, node_id * 2 + 1, nodes);
        let right_idx =
            self.build_node(right_members, right_sorted, depth + 1, node_id * 2 + 2, nodes);

        nodes[current_idx as usize].left = left_idx;
        nodes[current_idx as usize].right = right_idx;

        current_idx
    }

    /// Best split over all features; features are scanned in parallel and
    /// reduced in feature order so the result does not depend on scheduling.
    fn find_best_split(
        &self,
        sorted: &[Vec<usize>],
        sum_g: f64,
        sum_h: f64,
        node_id: usize,
    ) -> Option<SplitCandidate> {
        let per_feature: Vec<Option<SplitCandidate>> = sorted
            .par_iter()
            .enumerate()
            .map(|(feature_idx, order)| {
                self.best_split_for_feature(feature_idx, order, sum_g, sum_h, node_id)
            })
            .collect();

        per_feature
            .into_iter()
            .flatten()
            .fold(None, |best: Option<SplitCandidate>, candidate| match best {
                Some(current) if !candidate.beats(&current) => Some(current),
                _ => Some(candidate),
            })
            .filter(|split| split.gain - self.config.gamma > MIN_SPLIT_GAIN)
    }

    /// Scan one presorted column, thresholds sit midway between distinct values.
    fn best_split_for_feature(
        &self,
        feature_idx: usize,
        order: &[usize],
        sum_g: f64,
        sum_h: f64,
        node_id: usize,
    ) -> Option<SplitCandidate> {
        let parent_score = self.score(sum_g, sum_h);
        let mut best: Option<SplitCandidate> = None;
        let mut g_left = 0.0;
        let mut h_left = 0.0;

        for (rank, window) in order.windows(2).enumerate() {
            let (idx, next) = (window[0], window[1]);
            g_left += self.gradients[idx];
            h_left += self.hessians[idx];

            let value = self.features[idx][feature_idx];
            let next_value = self.features[next][feature_idx];
            if value == next_value {
                continue;
            }

            let g_right = sum_g - g_left;
            let h_right = sum_h - h_left;
            if h_left < self.config.min_child_weight || h_right < self.config.min_child_weight {
                continue;
            }

            let gain = self.score(g_left, h_left) + self.score(g_right, h_right) - parent_score;
            if best.as_ref().map_or(true, |current| gain > current.gain) {
                best = Some(SplitCandidate {
                    feature_idx,
                    threshold: value + (next_value - value) / 2.0,
                    gain,
                    tie_breaker: SplitTieBreaker::new(feature_idx, rank, node_id),
                });
            }
        }

        best
    }

    /// Structure score G²/(H+λ)
    fn score(&self, sum_g: f64, sum_h: f64) -> f64 {
        sum_g * sum_g / (sum_h + self.config.reg_lambda)
    }

    /// Optimal leaf weight: -G/(H+λ)
    fn leaf_weight(&self, sum_g: f64, sum_h: f64) -> f64 {
        let denom = sum_h + self.config.reg_lambda;
        if denom == 0.0 {
            return 0.0;
        }
        -sum_g / denom
    }

    fn sum_gradients_hessians(&self, members: &[usize]) -> (f64, f64) {
        members.iter().fold((0.0, 0.0), |(g, h), &idx| {
            (g + self.gradients[idx], h + self.hessians[idx])
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn build(features: &[Vec<f64>], gradients: &[f64], config: TreeConfig) -> Tree {
        let hessians = vec![1.0; gradients.len()];
        let presorted = presort_features(features, features[0].len());
        CartBuilder::new(features, gradients, &hessians, &presorted, config).build()
    }

    #[test]
    fn test_simple_split() {
        let features = vec![vec![1.0, 9.0], vec![2.0, 8.0], vec![3.0, 9.0], vec![4.0, 8.0]];
        let gradients = vec![-1.0, -1.0, 1.0, 1.0];

        let tree = build(
            &features,
            &gradients,
            TreeConfig {
                max_depth: 1,
                ..TreeConfig::default()
            },
        );

        assert!(tree.validate().is_ok());
        assert_eq!(tree.nodes.len(), 3);
        assert_eq!(tree.nodes[0].feature_idx, 0);
        assert_eq!(tree.nodes[0].threshold, 2.5);
        // -G/(H+λ) = 2/3 on the left, -2/3 on the right
        assert!((tree.evaluate(&[1.5, 0.0]) - 2.0 / 3.0).abs() < 1e-12);
        assert!((tree.evaluate(&[3.5, 0.0]) + 2.0 / 3.0).abs() < 1e-12);
    }

    #[test]
    fn test_leaf_only_tree() {
        let tree = build(&[vec![1.0]], &[-1.0], TreeConfig::default());
        assert_eq!(tree.nodes.len(), 1);
        assert_eq!(tree.nodes[0].leaf, Some(0.5));
    }

    #[test]
    fn test_constant_feature_does_not_split() {
        let features = vec![vec![5.0]; 4];
        let tree = build(&features, &[-1.0, 1.0, -1.0, 1.0], TreeConfig::default());
        assert_eq!(tree.nodes.len(), 1);
    }

    #[test]
    fn test_depth_limit() {
        let features: Vec<Vec<f64>> = (0..64).map(|i| vec![i as f64]).collect();
        let gradients: Vec<f64> = (0..64).map(|i| (i as f64).sin()).collect();
        let tree = build(
            &features,
            &gradients,
            TreeConfig {
                max_depth: 3,
                ..TreeConfig::default()
            },
        );
        assert!(tree.depth() <= 3);
        assert!(tree.validate().is_ok());
    }

    #[test]
    fn test_min_child_weight_blocks_tiny_children() {
        let features = vec![vec![1.0], vec![2.0]];
        let tree = build(
            &features,
            &[-1.0, 1.0],
            TreeConfig {
                min_child_weight: 2.0,
                ..TreeConfig::default()
            },
        );
        assert_eq!(tree.nodes.len(), 1);
    }
}
