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
use crate::tasks::Task;
use std::fmt;
use std::sync::Arc;

/// Rate returned by `rate_unsupervised` when no value is given
pub const DEFAULT_UNSUPERVISED_RATE: f64 = 1e6;

/// Function computing the mixing rate of a task
pub type RateFn = Arc<dyn Fn(&Task) -> Result<f64, T5DataError> + Send + Sync>;

/// # Mixing rate of a task
/// Rates are relative numbers of examples: a task with rate 2 contributes twice as many examples
/// as a task with rate 1.
#[derive(Clone)]
pub enum Rate {
    /// Constant rate
    Fixed(f64),
    /// Rate computed from the task, e.g. from its number of examples
    Dynamic(RateFn),
}

impl Rate {
    pub fn from_fn<F>(rate_fn: F) -> Rate
    where
        F: Fn(&Task) -> Result<f64, T5DataError> + Send + Sync + 'static,
    {
        Rate::Dynamic(Arc::new(rate_fn))
    }

    /// Evaluates the rate for `task`
    pub fn evaluate(&self, task: &Task) -> Result<f64, T5DataError> {
        match self {
            Rate::Fixed(value) => Ok(*value),
            Rate::Dynamic(rate_fn) => rate_fn(task),
        }
    }
}

impl From<f64> for Rate {
    fn from(value: f64) -> Self {
        Rate::Fixed(value)
    }
}

impl fmt::Debug for Rate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Rate::Fixed(value) => f.debug_tuple("Fixed").field(value).finish(),
            Rate::Dynamic(_) => f.debug_tuple("Dynamic").finish(),
        }
    }
}

/// Mixing rate equal to the number of cached training examples of the task.
///
/// # Arguments
///
/// * `maximum` - optional cap, applied after scaling. `Some(0.0)` means no cap.
/// * `temperature` - the rate is raised to the power `1 / temperature` when different from 1
/// * `scale` - multiplier applied to the number of examples
///
/// # Example
///
/// ```no_run
/// use t5_data::mixtures::{rate_num_examples, MixtureRegistry};
/// # fn main() -> Result<(), t5_data::T5DataError> {
/// MixtureRegistry::add(
///     "glue_v002_proportional",
///     vec!["glue_cola_v002", "glue_sst2_v002"],
///     Some(rate_num_examples(Some(65536.0), 1.0, 1.0)),
/// )?;
/// # Ok(())
/// # }
/// ```
pub fn rate_num_examples(maximum: Option<f64>, temperature: f64, scale: f64) -> Rate {
    Rate::from_fn(move |task: &Task| -> Result<f64, T5DataError> {
        let mut rate = task.get_cached_stats("train")?.examples as f64 * scale;
        if let Some(maximum) = maximum.filter(|maximum| *maximum != 0.0) {
            rate = rate.min(maximum);
        }
        if temperature != 1.0 {
            rate = rate.powf(1.0 / temperature);
        }
        Ok(rate)
    })
}

/// Constant rate for unsupervised co-training tasks
pub fn rate_unsupervised(value: Option<f64>) -> Rate {
    Rate::Fixed(value.unwrap_or(DEFAULT_UNSUPERVISED_RATE))
}
