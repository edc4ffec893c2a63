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
use crate::dataset::Dataset;
use crate::registry::SequenceLength;
use crate::tasks::Task;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::info;

/// Number of examples per task read when measuring lengths empirically
pub const STATS_EXAMPLES: usize = 100;

/// # Share of a task in a mixture
#[derive(Debug, Clone, PartialEq)]
pub struct TaskProportion {
    pub task: String,
    pub rate: f64,
    /// Fraction of the mixed examples drawn from the task
    pub examples_fraction: f64,
    /// Fraction of the mixed tokens of every feature coming from the task
    pub token_fractions: BTreeMap<String, f64>,
    /// Mean length of every feature
    pub mean_lengths: BTreeMap<String, f64>,
}

/// # Mixing proportions of a mixture
#[derive(Debug, Clone, PartialEq)]
pub struct MixingProportions {
    pub features: Vec<String>,
    pub tasks: Vec<TaskProportion>,
}

fn normalize(values: &[f64]) -> Vec<f64> {
    let total: f64 = values.iter().sum();
    if total > 0.0 {
        values.iter().map(|value| value / total).collect()
    } else {
        vec![0.0; values.len()]
    }
}

fn max_length(sequence_length: &SequenceLength, feature: &str) -> Result<f64, T5DataError> {
    sequence_length
        .get(feature)
        .map(|length| *length as f64)
        .ok_or_else(|| {
            T5DataError::InvalidConfigurationError(format!(
                "No sequence length given for feature '{}'",
                feature
            ))
        })
}

/// Mean length from the cached training statistics, capped by the sequence length. Token
/// preprocessors can change lengths arbitrarily: tasks using them are assumed to fill the whole
/// sequence.
fn estimated_mean_length(
    task: &Task,
    feature: &str,
    sequence_length: &SequenceLength,
) -> Result<f64, T5DataError> {
    let max_length = max_length(sequence_length, feature)?;
    if task.has_token_preprocessors() {
        return Ok(max_length);
    }
    let stats = task.get_cached_stats("train")?;
    let tokens = stats.tokens(feature).ok_or_else(|| {
        T5DataError::CacheError(format!(
            "No token count recorded for feature '{}' of {}",
            feature,
            task.name()
        ))
    })?;
    if stats.examples == 0 {
        return Ok(0.0);
    }
    Ok(max_length.min(tokens as f64 / stats.examples as f64))
}

fn empirical_mean_lengths(
    dataset: &Dataset,
    features: &[String],
) -> Result<BTreeMap<String, f64>, T5DataError> {
    let examples = dataset.take_examples(STATS_EXAMPLES)?;
    let count = examples.len().max(1) as f64;
    Ok(features
        .iter()
        .map(|feature| {
            let total: usize = examples
                .iter()
                .filter_map(|example| example.get(feature))
                .map(|value| value.len())
                .sum();
            (feature.clone(), total as f64 / count)
        })
        .collect())
}

impl MixingProportions {
    /// Computes the share of every task in a mixture.
    ///
    /// # Arguments
    ///
    /// * `tasks` - mixed tasks
    /// * `datasets` - tokenized dataset of every task, only read when `empirical` is set
    /// * `rates` - mixing rate of every task
    /// * `sequence_length` - maximum length of every feature
    /// * `features` - features to report
    /// * `empirical` - measure lengths on the first examples of every dataset rather than
    ///   estimating them from cached statistics
    pub fn compute(
        tasks: &[Arc<Task>],
        datasets: &[Dataset],
        rates: &[f64],
        sequence_length: &SequenceLength,
        features: &[String],
        empirical: bool,
    ) -> Result<MixingProportions, T5DataError> {
        let mean_lengths: Vec<BTreeMap<String, f64>> = if empirical {
            datasets
                .iter()
                .map(|dataset| empirical_mean_lengths(dataset, features))
                .collect::<Result<_, _>>()?
        } else {
            tasks
                .iter()
                .map(|task| {
                    features
                        .iter()
                        .map(|feature| {
                            Ok((
                                feature.clone(),
                                estimated_mean_length(task, feature, sequence_length)?,
                            ))
                        })
                        .collect::<Result<BTreeMap<String, f64>, T5DataError>>()
                })
                .collect::<Result<_, _>>()?
        };

        let examples_fraction = normalize(rates);
        let token_fractions: BTreeMap<&String, Vec<f64>> = features
            .iter()
            .map(|feature| {
                let weighted: Vec<f64> = mean_lengths
                    .iter()
                    .zip(rates.iter())
                    .map(|(lengths, rate)| lengths.get(feature).copied().unwrap_or(0.0) * rate)
                    .collect();
                (feature, normalize(&weighted))
            })
            .collect();

        let proportions = tasks
            .iter()
            .enumerate()
            .map(|(index, task)| TaskProportion {
                task: task.name().to_string(),
                rate: rates[index],
                examples_fraction: examples_fraction[index],
                token_fractions: token_fractions
                    .iter()
                    .map(|(feature, fractions)| (feature.to_string(), fractions[index]))
                    .collect(),
                mean_lengths: mean_lengths[index].clone(),
            })
            .collect();

        Ok(MixingProportions {
            features: features.to_vec(),
            tasks: proportions,
        })
    }

    /// Logs one line per task: rate, fraction of examples, then the token fraction and mean
    /// length of every feature.
    pub fn log(&self) {
        let mut header = format!("{:>12} {:>12}", "rate", "ex.frac.");
        for feature in &self.features {
            header.push_str(&format!(
                " {:>12} {:>12}",
                format!("{}.frac.", feature),
                format!("{}.len.", feature)
            ));
        }
        info!("{} task", header);
        for proportion in &self.tasks {
            let mut line = format!(
                "{:>12.6} {:>12.6}",
                proportion.rate, proportion.examples_fraction
            );
            for feature in &self.features {
                line.push_str(&format!(
                    " {:>12.6} {:>12.6}",
                    proportion.token_fractions.get(feature).copied().unwrap_or(0.0),
                    proportion.mean_lengths.get(feature).copied().unwrap_or(0.0)
                ));
            }
            info!("{} {}", line, proportion.task);
        }
    }
}

/// Mean fraction of padding per feature over the first `num_examples` examples, assuming every
/// feature is padded to its sequence length: the mean of `1 - length / sequence_length`.
pub fn padding_fractions(
    dataset: &Dataset,
    sequence_length: &SequenceLength,
    num_examples: usize,
) -> Result<BTreeMap<String, f64>, T5DataError> {
    let examples = dataset.take_examples(num_examples)?;
    let count = examples.len().max(1) as f64;
    Ok(sequence_length
        .iter()
        .filter(|(_, max_length)| **max_length > 0)
        .map(|(feature, max_length)| {
            let total: f64 = examples
                .iter()
                .filter_map(|example| example.get(feature))
                .map(|value| 1.0 - value.len() as f64 / *max_length as f64)
                .sum();
            (feature.clone(), total / count)
        })
        .collect())
}

pub(crate) fn log_padding_fractions(
    dataset: &Dataset,
    sequence_length: &SequenceLength,
) -> Result<(), T5DataError> {
    info!("computing padding fractions");
    for (feature, fraction) in padding_fractions(dataset, sequence_length, STATS_EXAMPLES)? {
        info!("{} padding fraction = {}", feature, fraction);
    }
    Ok(())
}
