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
use crate::dataset::{sample_from_datasets, Dataset, Example};
use crate::mixtures::proportions::{log_padding_fractions, MixingProportions};
use crate::mixtures::rates::Rate;
use crate::registry::{
    check_sequence_length, DatasetOptions, DatasetProvider, ProviderRegistry, SequenceLength,
};
use crate::tasks::{Task, TaskRegistry};
use crate::vocabulary::Vocabulary;
use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;
use tracing::info;

/// # Member of a mixture
/// A task name with an optional rate. Components without rate use the mixture default rate.
#[derive(Debug, Clone)]
pub struct MixtureComponent {
    pub task_name: String,
    pub rate: Option<Rate>,
}

impl From<&str> for MixtureComponent {
    fn from(task_name: &str) -> Self {
        MixtureComponent {
            task_name: task_name.to_string(),
            rate: None,
        }
    }
}

impl From<String> for MixtureComponent {
    fn from(task_name: String) -> Self {
        MixtureComponent {
            task_name,
            rate: None,
        }
    }
}

impl From<(&str, f64)> for MixtureComponent {
    fn from((task_name, rate): (&str, f64)) -> Self {
        MixtureComponent {
            task_name: task_name.to_string(),
            rate: Some(Rate::Fixed(rate)),
        }
    }
}

impl From<(&str, Rate)> for MixtureComponent {
    fn from((task_name, rate): (&str, Rate)) -> Self {
        MixtureComponent {
            task_name: task_name.to_string(),
            rate: Some(rate),
        }
    }
}

/// # Weighted combination of tasks
/// Examples of the mixed tasks are drawn at random, each task being chosen with a probability
/// proportional to its rate. Every task of a mixture shares the same output features and
/// vocabulary.
///
/// # Example
///
/// ```no_run
/// use t5_data::mixtures::{Mixture, MixtureComponent};
/// use t5_data::registry::{DatasetOptions, SequenceLength};
/// # fn main() -> Result<(), t5_data::T5DataError> {
/// let mixture = Mixture::new(
///     vec![
///         MixtureComponent::from(("glue_cola_v002", 2.0)),
///         MixtureComponent::from("glue_sst2_v002"),
///     ],
///     Some(1.0.into()),
/// )?;
/// let sequence_length: SequenceLength =
///     vec![("inputs".to_string(), 512), ("targets".to_string(), 8)]
///         .into_iter()
///         .collect();
/// let examples = mixture
///     .get_dataset(&sequence_length, &DatasetOptions::default())?
///     .take_examples(32)?;
/// # Ok(())
/// # }
/// ```
pub struct Mixture {
    tasks: Vec<Arc<Task>>,
    rates: Vec<Rate>,
}

impl fmt::Debug for Mixture {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map()
            .entries(
                self.tasks
                    .iter()
                    .map(|task| task.name())
                    .zip(self.rates.iter()),
            )
            .finish()
    }
}

impl Mixture {
    /// Creates a mixture of tasks registered in the global `TaskRegistry`.
    ///
    /// # Arguments
    ///
    /// * `components` - task names with optional rates
    /// * `default_rate` - rate of the components given without rate
    ///
    /// # Errors
    ///
    /// * `InvalidConfigurationError` if a component has no rate and there is no default rate, the
    ///   list is empty or repeats a task, or tasks disagree on output features or vocabulary
    /// * `RegistryError` if a task is not registered
    pub fn new<C>(components: Vec<C>, default_rate: Option<Rate>) -> Result<Mixture, T5DataError>
    where
        C: Into<MixtureComponent>,
    {
        Mixture::from_registry(TaskRegistry::global(), components, default_rate)
    }

    /// Creates a mixture of tasks registered in `registry`
    pub fn from_registry<C>(
        registry: &ProviderRegistry<Task>,
        components: Vec<C>,
        default_rate: Option<Rate>,
    ) -> Result<Mixture, T5DataError>
    where
        C: Into<MixtureComponent>,
    {
        if components.is_empty() {
            return Err(T5DataError::InvalidConfigurationError(
                "A Mixture needs at least one task".to_string(),
            ));
        }
        let mut tasks = Vec::with_capacity(components.len());
        let mut rates = Vec::with_capacity(components.len());
        let mut seen = HashSet::new();
        for component in components {
            let component = component.into();
            let rate = match (component.rate, &default_rate) {
                (Some(rate), _) => rate,
                (None, Some(default_rate)) => default_rate.clone(),
                (None, None) => {
                    return Err(T5DataError::InvalidConfigurationError(
                        "need a rate for each task".to_string(),
                    ))
                }
            };
            if !seen.insert(component.task_name.clone()) {
                return Err(T5DataError::InvalidConfigurationError(format!(
                    "Task {} appears more than once in the Mixture",
                    component.task_name
                )));
            }
            tasks.push(registry.get(&component.task_name)?);
            rates.push(rate);
        }

        let output_features: HashSet<&[String]> =
            tasks.iter().map(|task| task.output_features()).collect();
        if output_features.len() != 1 {
            return Err(T5DataError::InvalidConfigurationError(
                "All Tasks in a Mixture must have the same output features.".to_string(),
            ));
        }
        let vocabularies: HashSet<String> = tasks
            .iter()
            .map(|task| task.vocabulary().identifier())
            .collect();
        if vocabularies.len() != 1 {
            return Err(T5DataError::InvalidConfigurationError(
                "All Tasks in a Mixture must have the same vocabulary.".to_string(),
            ));
        }

        Ok(Mixture { tasks, rates })
    }

    pub fn tasks(&self) -> &[Arc<Task>] {
        &self.tasks
    }

    /// Evaluates the rate of a task of the mixture
    pub fn get_rate(&self, task: &Task) -> Result<f64, T5DataError> {
        let index = self
            .tasks
            .iter()
            .position(|candidate| candidate.name() == task.name())
            .ok_or_else(|| {
                T5DataError::RegistryError(format!(
                    "Task {} is not part of the Mixture",
                    task.name()
                ))
            })?;
        let rate = self.rates[index].evaluate(task)?;
        if !rate.is_finite() || rate < 0.0 {
            return Err(T5DataError::InvalidConfigurationError(format!(
                "Invalid rate {} for task {}",
                rate,
                task.name()
            )));
        }
        Ok(rate)
    }

    /// Output features shared by every task
    pub fn output_features(&self) -> &[String] {
        self.tasks[0].output_features()
    }

    /// Vocabulary shared by every task
    pub fn vocabulary(&self) -> Arc<dyn Vocabulary> {
        self.tasks[0].vocabulary()
    }

    /// Builds the mixed dataset of a split. Tasks without the split are skipped; every other
    /// task dataset is repeated indefinitely and restricted to the output features before
    /// sampling. When reading the cached training split, the mixing proportions are logged.
    ///
    /// # Arguments
    ///
    /// * `sequence_length` - maximum length of every output feature
    /// * `options` - split, caching, shuffling and seeding options; task `i` is seeded with
    ///   `seed + i`
    pub fn get_dataset(
        &self,
        sequence_length: &SequenceLength,
        options: &DatasetOptions,
    ) -> Result<Dataset, T5DataError> {
        check_sequence_length(sequence_length, self.output_features(), "the Mixture")?;
        let mut tasks = Vec::with_capacity(self.tasks.len());
        for task in &self.tasks {
            if !task.splits()?.iter().any(|split| split == &options.split) {
                info!(
                    "Task {} has no '{}' split, skipping.",
                    task.name(),
                    options.split
                );
                continue;
            }
            tasks.push(task.clone());
        }
        if tasks.is_empty() {
            return Err(T5DataError::DatasetError(format!(
                "No datasets have a '{}' split",
                options.split
            )));
        }

        let output_features = Arc::new(self.output_features().to_vec());
        let mut datasets = Vec::with_capacity(tasks.len());
        let mut rates = Vec::with_capacity(tasks.len());
        for (index, task) in tasks.iter().enumerate() {
            let task_options = DatasetOptions {
                seed: options.seed.map(|seed| seed.wrapping_add(index as u64)),
                ..options.clone()
            };
            let output_features = output_features.clone();
            let dataset = task
                .get_dataset(sequence_length, &task_options)?
                .repeat()
                .map(move |mut example| -> Result<Example, T5DataError> {
                    example.retain(|key| output_features.iter().any(|feature| feature == key));
                    Ok(example)
                });
            datasets.push(dataset);
            rates.push(self.get_rate(task)?);
        }

        let mixed = sample_from_datasets(datasets.clone(), rates.clone(), options.seed)?;
        if options.split == "train" && options.use_cached {
            MixingProportions::compute(
                &tasks,
                &datasets,
                &rates,
                sequence_length,
                &output_features,
                options.compute_stats_empirically,
            )?
            .log();
            if options.compute_stats_empirically {
                log_padding_fractions(&mixed, sequence_length)?;
            }
        }
        Ok(mixed)
    }
}

impl DatasetProvider for Mixture {
    fn output_features(&self) -> &[String] {
        Mixture::output_features(self)
    }

    fn vocabulary(&self) -> Arc<dyn Vocabulary> {
        Mixture::vocabulary(self)
    }

    fn get_dataset(
        &self,
        sequence_length: &SequenceLength,
        options: &DatasetOptions,
    ) -> Result<Dataset, T5DataError> {
        Mixture::get_dataset(self, sequence_length, options)
    }
}
