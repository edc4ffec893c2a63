//! # Mixtures
//!
//! A `Mixture` trains on several tasks at once by sampling their examples at random, each task
//! being drawn with a probability proportional to its rate. Rates are either constants or
//! functions of the task, such as `rate_num_examples` which mixes tasks proportionally to their
//! number of cached training examples.
//!
//! ```no_run
//! use t5_data::mixtures::{rate_num_examples, MixtureRegistry};
//! use t5_data::registry::{DatasetOptions, SequenceLength};
//! # fn main() -> Result<(), t5_data::T5DataError> {
//! MixtureRegistry::add(
//!     "glue_v002_proportional",
//!     vec!["glue_cola_v002", "glue_sst2_v002", "glue_rte_v002"],
//!     Some(rate_num_examples(Some(65536.0), 1.0, 1.0)),
//! )?;
//!
//! let sequence_length: SequenceLength =
//!     vec![("inputs".to_string(), 512), ("targets".to_string(), 8)]
//!         .into_iter()
//!         .collect();
//! let mixed = MixtureRegistry::get_dataset(
//!     "glue_v002_proportional",
//!     &sequence_length,
//!     &DatasetOptions::default(),
//! )?;
//! # Ok(())
//! # }
//! ```

mod mixture;
mod proportions;
mod rates;
mod registry;

pub use mixture::{Mixture, MixtureComponent};
pub use proportions::{padding_fractions, MixingProportions, TaskProportion, STATS_EXAMPLES};
pub use rates::{
    rate_num_examples, rate_unsupervised, Rate, RateFn, DEFAULT_UNSUPERVISED_RATE,
};
pub use registry::MixtureRegistry;
