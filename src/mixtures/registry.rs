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
use crate::mixtures::{Mixture, MixtureComponent, Rate};
use crate::registry::{DatasetOptions, ProviderRegistry, SequenceLength};
use lazy_static::lazy_static;
use std::sync::Arc;

lazy_static! {
    static ref MIXTURE_REGISTRY: ProviderRegistry<Mixture> = ProviderRegistry::new("Mixture");
}

/// # Process-wide registry of mixtures
pub struct MixtureRegistry;

impl MixtureRegistry {
    pub fn global() -> &'static ProviderRegistry<Mixture> {
        &MIXTURE_REGISTRY
    }

    /// Creates a mixture from registered tasks (see `Mixture::new`) and registers it under `name`
    pub fn add<C>(
        name: &str,
        components: Vec<C>,
        default_rate: Option<Rate>,
    ) -> Result<Arc<Mixture>, T5DataError>
    where
        C: Into<MixtureComponent>,
    {
        if MIXTURE_REGISTRY.contains(name) {
            return Err(T5DataError::RegistryError(format!(
                "Attempting to register duplicate Mixture: {}",
                name
            )));
        }
        let mixture = Mixture::new(components, default_rate)?;
        MIXTURE_REGISTRY.add(name, Arc::new(mixture))
    }

    pub fn get(name: &str) -> Result<Arc<Mixture>, T5DataError> {
        MIXTURE_REGISTRY.get(name)
    }

    pub fn names() -> Vec<String> {
        MIXTURE_REGISTRY.names()
    }

    pub fn remove(name: &str) -> Option<Arc<Mixture>> {
        MIXTURE_REGISTRY.remove(name)
    }

    pub fn get_dataset(
        name: &str,
        sequence_length: &SequenceLength,
        options: &DatasetOptions,
    ) -> Result<Dataset, T5DataError> {
        MIXTURE_REGISTRY.get_dataset(name, sequence_length, options)
    }
}
