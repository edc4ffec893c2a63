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
use crate::registry::{DatasetOptions, ProviderRegistry, SequenceLength};
use crate::tasks::Task;
use lazy_static::lazy_static;
use std::sync::Arc;

lazy_static! {
    static ref TASK_REGISTRY: ProviderRegistry<Task> = ProviderRegistry::new("Task");
}

/// # Process-wide registry of tasks
/// Tasks are registered under their own name.
pub struct TaskRegistry;

impl TaskRegistry {
    /// The underlying registry, e.g. to resolve mixture components against it
    pub fn global() -> &'static ProviderRegistry<Task> {
        &TASK_REGISTRY
    }

    /// Registers a task, failing if a task with the same name exists
    pub fn add(task: Task) -> Result<Arc<Task>, T5DataError> {
        let name = task.name().to_string();
        TASK_REGISTRY.add(&name, Arc::new(task))
    }

    pub fn get(name: &str) -> Result<Arc<Task>, T5DataError> {
        TASK_REGISTRY.get(name)
    }

    pub fn names() -> Vec<String> {
        TASK_REGISTRY.names()
    }

    pub fn remove(name: &str) -> Option<Arc<Task>> {
        TASK_REGISTRY.remove(name)
    }

    pub fn get_dataset(
        name: &str,
        sequence_length: &SequenceLength,
        options: &DatasetOptions,
    ) -> Result<Dataset, T5DataError> {
        TASK_REGISTRY.get_dataset(name, sequence_length, options)
    }
}
