//! Sparse counts keyed by a bounded integer, e.g. polymer length or lineage id.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::{SimError, SimResult};
use crate::model::Count;

/// Map from key to count in which absent keys read as zero. Keys must be
/// below the limit and zero counts are never stored.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SparseCounts {
    limit: u64,
    counts: BTreeMap<u64, Count>,
}

impl Default for SparseCounts {
    fn default() -> Self {
        Self::new()
    }
}

impl SparseCounts {
    /// Accepts every key.
    pub fn new() -> Self {
        Self::with_limit(u64::MAX)
    }

    /// Accepts keys in `0..limit`.
    pub fn with_limit(limit: u64) -> Self {
        Self {
            limit,
            counts: BTreeMap::new(),
        }
    }

    /// Dense vector `[count_of_0, count_of_1, ...]`, dropping zeros.
    pub fn from_dense(dense: &[Count]) -> Self {
        let mut counts = Self::with_limit(dense.len() as u64);
        counts.counts = dense
            .iter()
            .enumerate()
            .filter(|&(_, &count)| count > 0)
            .map(|(key, &count)| (key as u64, count))
            .collect();
        counts
    }

    pub fn limit(&self) -> u64 {
        self.limit
    }

    fn check_key(&self, key: u64) -> SimResult<()> {
        if key < self.limit {
            Ok(())
        } else {
            Err(SimError::InvalidArgument(format!(
                "key {key} is outside the bound {}",
                self.limit
            )))
        }
    }

    pub fn get(&self, key: u64) -> Count {
        self.counts.get(&key).copied().unwrap_or(0)
    }

    pub fn set(&mut self, key: u64, count: Count) -> SimResult<()> {
        self.check_key(key)?;
        if count == 0 {
            self.counts.remove(&key);
        } else {
            self.counts.insert(key, count);
        }
        Ok(())
    }

    /// Adds `delta` to the count of `key` and returns the new count.
    pub fn add(&mut self, key: u64, delta: i64) -> SimResult<Count> {
        self.check_key(key)?;
        let updated = self.get(key).checked_add_signed(delta).ok_or_else(|| {
            SimError::InvalidArgument(format!(
                "adding {delta} to key {key} leaves a negative or overflowing count"
            ))
        })?;
        self.set(key, updated)?;
        Ok(updated)
    }

    pub fn increment(&mut self, key: u64) -> SimResult<Count> {
        self.add(key, 1)
    }

    /// Number of keys with a non-zero count.
    pub fn len(&self) -> usize {
        self.counts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.counts.is_empty()
    }

    /// Sum of all counts.
    pub fn total(&self) -> Count {
        self.counts.values().sum()
    }

    /// Count-weighted mean key, `None` when empty.
    pub fn mean_key(&self) -> Option<f64> {
        let total = self.total();
        (total > 0).then(|| {
            self.counts
                .iter()
                .map(|(&key, &count)| key as f64 * count as f64)
                .sum::<f64>()
                / total as f64
        })
    }

    pub fn max_key(&self) -> Option<u64> {
        self.counts.keys().next_back().copied()
    }

    /// Non-zero entries in ascending key order.
    pub fn iter(&self) -> impl Iterator<Item = (u64, Count)> + '_ {
        self.counts.iter().map(|(&key, &count)| (key, count))
    }

    /// Count of each key as a fraction of the total.
    pub fn frequencies(&self) -> Vec<(u64, f64)> {
        let total = self.total() as f64;
        self.iter()
            .map(|(key, count)| (key, count as f64 / total))
            .collect()
    }

    /// Dense vector of length `len`; keys at or beyond `len` are rejected.
    pub fn to_dense(&self, len: usize) -> SimResult<Vec<Count>> {
        let mut dense = vec![0; len];
        for (key, count) in self.iter() {
            let slot = usize::try_from(key)
                .ok()
                .and_then(|idx| dense.get_mut(idx))
                .ok_or_else(|| {
                    SimError::Shape(format!("key {key} does not fit a dense vector of {len}"))
                })?;
            *slot = count;
        }
        Ok(dense)
    }
}
