// Copyright 2019 The T5 Authors.
// Copyright 2020 Guillaume Becquin
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//     http://www.apache.org/licenses/LICENSE-2.0
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use crate::common::error::T5DataError;
use crate::dataset::{seeded_rng, Dataset, Example, ExampleIterator};
use rand::distributions::{Distribution, WeightedIndex};
use rand::rngs::StdRng;
use std::sync::Arc;

/// Samples examples from several datasets at random, choosing dataset `i` with probability
/// proportional to `weights[i]` for every element. When a dataset runs out it is dropped and the
/// remaining weights are renormalized; the mixture ends once every dataset with a non-zero
/// weight is exhausted.
///
/// # Arguments
///
/// * `datasets` - datasets to sample from
/// * `weights` - one non-negative, finite weight per dataset (need not sum to 1)
/// * `seed` - optional seed; without it every pass draws a different sequence
///
/// # Errors
///
/// * `InvalidConfigurationError` if the inputs are empty, have different lengths, contain an
///   invalid weight or only zero weights
pub fn sample_from_datasets(
    datasets: Vec<Dataset>,
    weights: Vec<f64>,
    seed: Option<u64>,
) -> Result<Dataset, T5DataError> {
    if datasets.is_empty() {
        return Err(T5DataError::InvalidConfigurationError(
            "Cannot sample from an empty list of datasets".to_string(),
        ));
    }
    if datasets.len() != weights.len() {
        return Err(T5DataError::InvalidConfigurationError(format!(
            "Got {} datasets but {} weights",
            datasets.len(),
            weights.len()
        )));
    }
    if let Some(weight) = weights.iter().find(|w| !w.is_finite() || **w < 0.0) {
        return Err(T5DataError::InvalidConfigurationError(format!(
            "Sampling weights must be finite and non-negative, got {}",
            weight
        )));
    }
    if weights.iter().sum::<f64>() <= 0.0 {
        return Err(T5DataError::InvalidConfigurationError(
            "At least one sampling weight must be positive".to_string(),
        ));
    }

    let datasets = Arc::new(datasets);
    let weights = Arc::new(weights);
    Ok(Dataset::from_fn(move || -> ExampleIterator {
        let iterators = datasets.iter().map(Dataset::iter).collect();
        Box::new(WeightedSampler::new(
            iterators,
            weights.as_ref().clone(),
            seeded_rng(seed),
        ))
    }))
}

struct WeightedSampler {
    iterators: Vec<ExampleIterator>,
    weights: Vec<f64>,
    distribution: Option<WeightedIndex<f64>>,
    rng: StdRng,
}

impl WeightedSampler {
    fn new(iterators: Vec<ExampleIterator>, weights: Vec<f64>, rng: StdRng) -> WeightedSampler {
        let distribution = WeightedIndex::new(&weights).ok();
        WeightedSampler {
            iterators,
            weights,
            distribution,
            rng,
        }
    }
}

impl Iterator for WeightedSampler {
    type Item = Result<Example, T5DataError>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let index = self.distribution.as_ref()?.sample(&mut self.rng);
            match self.iterators[index].next() {
                Some(item) => return Some(item),
                None => {
                    self.iterators.remove(index);
                    self.weights.remove(index);
                    self.distribution = WeightedIndex::new(&self.weights).ok();
                }
            }
        }
    }
}
