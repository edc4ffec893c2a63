//! # Lazy example datasets
//!
//! Examples are ordered mappings from feature names to text or integer values. A `Dataset` is a
//! re-iterable pipeline of examples built from in-memory examples, JSON-lines files or other
//! datasets, supporting the transformations needed to preprocess and mix text-to-text data
//! (mapping, filtering, shuffling, repetition, interleaving and weighted sampling).

mod dataset;
mod example;
mod sampling;

pub use dataset::{Dataset, ExampleIterator};
pub(crate) use dataset::{seeded_rng, PassRng};
pub use example::{Example, Feature, FeatureDtype};
pub use sampling::sample_from_datasets;
