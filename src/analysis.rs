//! Summaries over ensemble output.

use std::collections::BTreeMap;

use crate::ensemble::EnsembleOutput;
use crate::error::{SimError, SimResult};
use crate::options::OutputMode;
use crate::sparse::SparseCounts;
use crate::trajectory::Termination;

fn check_species(output: &EnsembleOutput, species: usize) -> SimResult<()> {
    if species < output.n_species {
        Ok(())
    } else {
        Err(SimError::InvalidArgument(format!(
            "species index {species} exceeds number of species {}",
            output.n_species
        )))
    }
}

/// Histogram of the final count of `species` across runs.
pub fn final_distribution(output: &EnsembleOutput, species: usize) -> SimResult<SparseCounts> {
    check_species(output, species)?;
    let mut histogram = SparseCounts::new();
    for run in &output.runs {
        if let Some(state) = run.final_state() {
            histogram.increment(state[species])?;
        }
    }
    Ok(histogram)
}

/// Mean count of `species` at each time point of a timeseries ensemble.
pub fn mean_timeseries(output: &EnsembleOutput, species: usize) -> SimResult<Vec<f64>> {
    check_species(output, species)?;
    let OutputMode::Timeseries(t_points) = &output.mode else {
        return Err(SimError::InvalidArgument(
            "mean_timeseries requires timeseries output".into(),
        ));
    };
    let mut sums = vec![0.0; t_points.len()];
    for run in &output.runs {
        for (sum, state) in sums.iter_mut().zip(&run.states) {
            *sum += state[species] as f64;
        }
    }
    let n_runs = output.runs.len().max(1) as f64;
    Ok(sums.into_iter().map(|sum| sum / n_runs).collect())
}

/// How many runs ended for each reason.
pub fn termination_counts(output: &EnsembleOutput) -> BTreeMap<Termination, usize> {
    let mut counts = BTreeMap::new();
    for run in &output.runs {
        *counts.entry(run.termination).or_insert(0) += 1;
    }
    counts
}
