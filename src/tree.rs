//! Binary sum tree over channel propensities.
//!
//! Leaves hold individual propensities, every inner node the sum of its two
//! children, so the root is `a0`. Updating one leaf and selecting a channel
//! by cumulative weight both cost `O(log channels)`.

#[derive(Clone, Debug)]
pub(crate) struct PropensityTree {
    len: usize,
    leaf_count: usize,
    nodes: Vec<f64>,
}

impl PropensityTree {
    pub(crate) fn new(len: usize) -> Self {
        let leaf_count = len.max(1).next_power_of_two();
        Self {
            len,
            leaf_count,
            nodes: vec![0.0; leaf_count * 2],
        }
    }

    pub(crate) fn rebuild(&mut self, values: &[f64]) {
        debug_assert_eq!(values.len(), self.len);
        let leaves = &mut self.nodes[self.leaf_count..];
        leaves.fill(0.0);
        leaves[..values.len()].copy_from_slice(values);
        for node in (1..self.leaf_count).rev() {
            self.nodes[node] = self.nodes[2 * node] + self.nodes[2 * node + 1];
        }
    }

    pub(crate) fn total(&self) -> f64 {
        self.nodes[1]
    }

    pub(crate) fn update(&mut self, idx: usize, value: f64) {
        let mut node = self.leaf_count + idx;
        self.nodes[node] = value;
        while node > 1 {
            node /= 2;
            self.nodes[node] = self.nodes[2 * node] + self.nodes[2 * node + 1];
        }
    }

    /// Leaf `j` whose cumulative interval `[a_1 + .. + a_{j-1}, a_1 + .. + a_j)`
    /// contains `target`. Rounding near the upper end resolves to the last
    /// positive leaf.
    pub(crate) fn select(&self, mut target: f64) -> usize {
        let mut node = 1;
        while node < self.leaf_count {
            let left = self.nodes[2 * node];
            if target < left {
                node *= 2;
            } else {
                target -= left;
                node = 2 * node + 1;
            }
        }
        let idx = node - self.leaf_count;
        if idx < self.len && self.nodes[node] > 0.0 {
            idx
        } else {
            self.last_positive()
        }
    }

    fn last_positive(&self) -> usize {
        self.nodes[self.leaf_count..self.leaf_count + self.len]
            .iter()
            .rposition(|&value| value > 0.0)
            .unwrap_or(0)
    }
}

/// Linear counterpart of [`PropensityTree::select`] over a plain slice.
pub(crate) fn select_linear(propensities: &[f64], target: f64) -> usize {
    let mut cumulative = 0.0;
    let mut last_positive = 0;
    for (idx, &value) in propensities.iter().enumerate() {
        if value <= 0.0 {
            continue;
        }
        cumulative += value;
        last_positive = idx;
        if target < cumulative {
            return idx;
        }
    }
    last_positive
}
