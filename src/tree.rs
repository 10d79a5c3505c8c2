//! Tree
//!
//! Depth-limited regression trees fitted on gradient/hessian statistics, the
//! base learner of the boosted models.
use crate::data::Matrix;
use serde::{Deserialize, Serialize};
use std::fmt::{self, Display};

/// Splits must improve the objective by more than this.
const MIN_SPLIT_GAIN: f64 = 1e-12;

#[derive(Deserialize, Serialize, Clone, Debug)]
pub struct Node {
    pub num: usize,
    pub weight_value: f64,
    pub hessian_sum: f64,
    pub depth: usize,
    pub split_value: f64,
    pub split_feature: usize,
    pub split_gain: f64,
    pub left_child: usize,
    pub right_child: usize,
    pub is_leaf: bool,
}

impl Node {
    fn leaf(num: usize, weight_value: f64, hessian_sum: f64, depth: usize) -> Self {
        Node {
            num,
            weight_value,
            hessian_sum,
            depth,
            split_value: f64::NAN,
            split_feature: 0,
            split_gain: 0.0,
            left_child: 0,
            right_child: 0,
            is_leaf: true,
        }
    }
}

/// Growth limits for a single tree.
#[derive(Deserialize, Serialize, Clone, Copy, Debug)]
pub struct TreeParams {
    pub max_depth: usize,
    pub min_samples_leaf: usize,
    /// L2 penalty on leaf weights.
    pub lambda: f64,
}

#[derive(Deserialize, Serialize, Clone, Debug, Default)]
pub struct Tree {
    pub nodes: Vec<Node>,
    pub depth: usize,
    pub n_leaves: usize,
}

/// Leaf weight given the gradient and hessian sums of the node.
#[inline]
pub fn weight(gradient_sum: f64, hessian_sum: f64, lambda: f64) -> f64 {
    -gradient_sum / (hessian_sum + lambda)
}

/// Score of a node, the split gain is the children's score minus the parent's.
#[inline]
pub fn gain(gradient_sum: f64, hessian_sum: f64, lambda: f64) -> f64 {
    (gradient_sum * gradient_sum) / (hessian_sum + lambda)
}

struct SplitInfo {
    feature: usize,
    value: f64,
    gain: f64,
    left: Vec<usize>,
    right: Vec<usize>,
}

impl Tree {
    pub fn new() -> Self {
        Tree::default()
    }

    /// Grow the tree depth-first on the rows in `index`.
    pub fn fit(&mut self, data: &Matrix<f64>, index: Vec<usize>, grad: &[f64], hess: &[f64], params: &TreeParams) {
        self.nodes.clear();
        self.depth = 0;
        self.n_leaves = 0;

        let (g, h) = sums(&index, grad, hess);
        self.nodes.push(Node::leaf(0, weight(g, h, params.lambda), h, 0));

        let mut growable = vec![(0_usize, index)];
        while let Some((num, idx)) = growable.pop() {
            let depth = self.nodes[num].depth;
            self.depth = self.depth.max(depth);
            if depth >= params.max_depth || idx.len() < 2 * params.min_samples_leaf.max(1) {
                self.n_leaves += 1;
                continue;
            }
            let split = match best_split(data, &idx, grad, hess, params) {
                Some(s) => s,
                None => {
                    self.n_leaves += 1;
                    continue;
                }
            };

            let left_num = self.nodes.len();
            let right_num = left_num + 1;
            let (gl, hl) = sums(&split.left, grad, hess);
            let (gr, hr) = sums(&split.right, grad, hess);
            self.nodes
                .push(Node::leaf(left_num, weight(gl, hl, params.lambda), hl, depth + 1));
            self.nodes
                .push(Node::leaf(right_num, weight(gr, hr, params.lambda), hr, depth + 1));

            let node = &mut self.nodes[num];
            node.is_leaf = false;
            node.split_feature = split.feature;
            node.split_value = split.value;
            node.split_gain = split.gain;
            node.left_child = left_num;
            node.right_child = right_num;

            growable.push((right_num, split.right));
            growable.push((left_num, split.left));
        }
    }

    pub fn predict_row(&self, data: &Matrix<f64>, row: usize) -> f64 {
        let mut node = match self.nodes.first() {
            Some(n) => n,
            None => return 0.0,
        };
        while !node.is_leaf {
            let v = *data.get(row, node.split_feature);
            node = if v < node.split_value {
                &self.nodes[node.left_child]
            } else {
                &self.nodes[node.right_child]
            };
        }
        node.weight_value
    }

    pub fn predict(&self, data: &Matrix<f64>) -> Vec<f64> {
        (0..data.rows).map(|i| self.predict_row(data, i)).collect()
    }
}

fn sums(index: &[usize], grad: &[f64], hess: &[f64]) -> (f64, f64) {
    index
        .iter()
        .fold((0.0, 0.0), |(g, h), &i| (g + grad[i], h + hess[i]))
}

/// Exact greedy search over every feature and every distinct cut point.
fn best_split(
    data: &Matrix<f64>,
    index: &[usize],
    grad: &[f64],
    hess: &[f64],
    params: &TreeParams,
) -> Option<SplitInfo> {
    let (g_total, h_total) = sums(index, grad, hess);
    let parent_gain = gain(g_total, h_total, params.lambda);
    let min_leaf = params.min_samples_leaf.max(1);
    let n = index.len();

    let mut best: Option<(usize, f64, f64)> = None;
    let mut sorted = index.to_vec();
    for feature in 0..data.cols {
        let col = data.get_col(feature);
        sorted.sort_by(|&a, &b| col[a].total_cmp(&col[b]));
        let mut gl = 0.0;
        let mut hl = 0.0;
        for k in 1..n {
            let prev = sorted[k - 1];
            gl += grad[prev];
            hl += hess[prev];
            if k < min_leaf || n - k < min_leaf {
                continue;
            }
            let (lo, hi) = (col[prev], col[sorted[k]]);
            if lo.is_nan() || hi.is_nan() || lo >= hi {
                continue;
            }
            let split_gain =
                gain(gl, hl, params.lambda) + gain(g_total - gl, h_total - hl, params.lambda) - parent_gain;
            if split_gain > MIN_SPLIT_GAIN && best.map_or(true, |b| split_gain > b.2) {
                best = Some((feature, lo + (hi - lo) / 2.0, split_gain));
            }
        }
    }

    best.map(|(feature, value, split_gain)| {
        let col = data.get_col(feature);
        let (left, right): (Vec<usize>, Vec<usize>) = index.iter().partition(|&&i| col[i] < value);
        SplitInfo {
            feature,
            value,
            gain: split_gain,
            left,
            right,
        }
    })
}

impl Display for Tree {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let mut print_buffer: Vec<usize> = vec![0];
        let mut r = String::new();
        while let Some(idx) = print_buffer.pop() {
            let node = match self.nodes.get(idx) {
                Some(n) => n,
                None => break,
            };
            r += &"      ".repeat(node.depth);
            if node.is_leaf {
                r += &format!("{}:leaf={},cover={}\n", node.num, node.weight_value, node.hessian_sum);
            } else {
                r += &format!(
                    "{}:[{} < {}] yes={},no={},gain={}\n",
                    node.num, node.split_feature, node.split_value, node.left_child, node.right_child, node.split_gain
                );
                print_buffer.push(node.right_child);
                print_buffer.push(node.left_child);
            }
        }
        write!(f, "{}", r)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(max_depth: usize) -> TreeParams {
        TreeParams {
            max_depth,
            min_samples_leaf: 1,
            lambda: 0.0,
        }
    }

    #[test]
    fn test_tree_finds_step() {
        // y is a step at x = 0.5, squared loss gradients at yhat = 0.
        let x = vec![0.1, 0.2, 0.3, 0.4, 0.6, 0.7, 0.8, 0.9];
        let y = vec![0.0, 0.0, 0.0, 0.0, 1.0, 1.0, 1.0, 1.0];
        let grad: Vec<f64> = y.iter().map(|v| -v).collect();
        let hess = vec![1.0; 8];
        let data = Matrix::new(&x, 8, 1);

        let mut tree = Tree::new();
        tree.fit(&data, (0..8).collect(), &grad, &hess, &params(1));
        println!("{}", tree);

        assert_eq!(tree.n_leaves, 2);
        assert!((tree.nodes[0].split_value - 0.5).abs() < 1e-12);
        let preds = tree.predict(&data);
        assert_eq!(preds, y);
    }

    #[test]
    fn test_tree_respects_limits() {
        let x: Vec<f64> = (0..20).map(|i| i as f64).collect();
        let grad: Vec<f64> = x.iter().map(|v| -v).collect();
        let hess = vec![1.0; 20];
        let data = Matrix::new(&x, 20, 1);

        let mut tree = Tree::new();
        tree.fit(&data, (0..20).collect(), &grad, &hess, &params(2));
        assert!(tree.depth <= 2);
        assert!(tree.n_leaves <= 4);

        let mut stump = Tree::new();
        let p = TreeParams {
            max_depth: 5,
            min_samples_leaf: 10,
            lambda: 1.0,
        };
        stump.fit(&data, (0..20).collect(), &grad, &hess, &p);
        assert_eq!(stump.n_leaves, 2);
    }

    #[test]
    fn test_tree_constant_feature_is_a_leaf() {
        let x = vec![1.0; 6];
        let grad = vec![-1.0, 1.0, -1.0, 1.0, -1.0, 1.0];
        let hess = vec![1.0; 6];
        let data = Matrix::new(&x, 6, 1);
        let mut tree = Tree::new();
        tree.fit(&data, (0..6).collect(), &grad, &hess, &params(3));
        assert_eq!(tree.nodes.len(), 1);
        assert_eq!(tree.predict_row(&data, 0), 0.0);
    }
}
