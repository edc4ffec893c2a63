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

//! # Dataset providers and their registries
//!
//! Tasks and Mixtures both implement `DatasetProvider`: they produce a tokenized `Dataset` for a
//! split given the maximum length of every output feature. Providers are registered by name in a
//! `ProviderRegistry`, which rejects duplicate names.

use crate::common::error::T5DataError;
use crate::dataset::Dataset;
use crate::vocabulary::Vocabulary;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::{Arc, PoisonError, RwLock};

/// Maximum length (in tokens, end-of-sequence token included) of every output feature
pub type SequenceLength = BTreeMap<String, usize>;

/// Default size of the buffer used to shuffle examples
pub const DEFAULT_SHUFFLE_BUFFER_SIZE: usize = 1000;

/// Checks that every feature of `features` has a positive sequence length
///
/// # Errors
///
/// * `InvalidConfigurationError` naming `provider` if a length is missing or 0
pub fn check_sequence_length(
    sequence_length: &SequenceLength,
    features: &[String],
    provider: &str,
) -> Result<(), T5DataError> {
    for feature in features {
        match sequence_length.get(feature) {
            None => {
                return Err(T5DataError::InvalidConfigurationError(format!(
                    "No sequence length given for output feature '{}' of {}",
                    feature, provider
                )))
            }
            Some(0) => {
                return Err(T5DataError::InvalidConfigurationError(format!(
                    "Sequence length of output feature '{}' of {} must be positive",
                    feature, provider
                )))
            }
            Some(_) => {}
        }
    }
    Ok(())
}

/// # Dataset loading options
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DatasetOptions {
    /// Split to load
    pub split: String,
    /// Read the preprocessed cache instead of processing the source dataset on the fly
    pub use_cached: bool,
    /// Shuffle shard order and examples
    pub shuffle: bool,
    /// Number of examples buffered when shuffling
    pub shuffle_buffer_size: usize,
    /// Seed used for shuffling and mixing. Unseeded datasets differ on every pass.
    pub seed: Option<u64>,
    /// Mixtures only: measure lengths on a sample of examples rather than estimating them from
    /// cached statistics when logging mixing proportions
    pub compute_stats_empirically: bool,
}

impl Default for DatasetOptions {
    fn default() -> Self {
        DatasetOptions {
            split: "train".to_string(),
            use_cached: true,
            shuffle: true,
            shuffle_buffer_size: DEFAULT_SHUFFLE_BUFFER_SIZE,
            seed: None,
            compute_stats_empirically: false,
        }
    }
}

impl DatasetOptions {
    /// Default options for the given split
    pub fn for_split(split: &str) -> DatasetOptions {
        DatasetOptions {
            split: split.to_string(),
            ..Default::default()
        }
    }
}

/// # Source of tokenized datasets
pub trait DatasetProvider: Send + Sync {
    /// Features prepared for the model, sorted
    fn output_features(&self) -> &[String];

    /// Vocabulary used to tokenize the output features
    fn vocabulary(&self) -> Arc<dyn Vocabulary>;

    /// Builds the tokenized dataset for `options.split`.
    ///
    /// # Arguments
    ///
    /// * `sequence_length` - maximum length of every output feature
    /// * `options` - split, caching, shuffling and seeding options
    fn get_dataset(
        &self,
        sequence_length: &SequenceLength,
        options: &DatasetOptions,
    ) -> Result<Dataset, T5DataError>;
}

/// # Registry of named dataset providers
/// Thread-safe name to provider map. Names are unique: registering a name twice is an error until
/// the first provider is removed.
pub struct ProviderRegistry<P: ?Sized> {
    kind: &'static str,
    providers: RwLock<BTreeMap<String, Arc<P>>>,
}

impl<P: ?Sized> ProviderRegistry<P> {
    /// Creates an empty registry. `kind` names the providers in error messages.
    pub fn new(kind: &'static str) -> ProviderRegistry<P> {
        ProviderRegistry {
            kind,
            providers: RwLock::new(BTreeMap::new()),
        }
    }

    /// Registers a provider under `name`
    pub fn add(&self, name: &str, provider: Arc<P>) -> Result<Arc<P>, T5DataError> {
        let mut providers = self
            .providers
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        if providers.contains_key(name) {
            return Err(T5DataError::RegistryError(format!(
                "Attempting to register duplicate {}: {}",
                self.kind, name
            )));
        }
        providers.insert(name.to_string(), provider.clone());
        Ok(provider)
    }

    pub fn get(&self, name: &str) -> Result<Arc<P>, T5DataError> {
        self.providers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .cloned()
            .ok_or_else(|| {
                T5DataError::RegistryError(format!("{} name not registered: {}", self.kind, name))
            })
    }

    pub fn contains(&self, name: &str) -> bool {
        self.providers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(name)
    }

    /// Registered names, sorted
    pub fn names(&self) -> Vec<String> {
        self.providers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect()
    }

    /// Unregisters a provider, returning it if it was registered
    pub fn remove(&self, name: &str) -> Option<Arc<P>> {
        self.providers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(name)
    }
}

impl<P: DatasetProvider + ?Sized> ProviderRegistry<P> {
    /// Looks up `name` and builds its dataset
    pub fn get_dataset(
        &self,
        name: &str,
        sequence_length: &SequenceLength,
        options: &DatasetOptions,
    ) -> Result<Dataset, T5DataError> {
        self.get(name)?.get_dataset(sequence_length, options)
    }
}
