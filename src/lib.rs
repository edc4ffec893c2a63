//! # Text-to-text training data: Tasks and Mixtures
//!
//! Registries of named dataset pipelines (Tasks) and weighted combinations of them (Mixtures)
//! preparing tokenized text-to-text examples for a model training binary. The training binary,
//! the model and its distributed execution are not part of this crate.
//!
//! #### 1. Source datasets
//! Raw datasets are versioned JSON-lines shards referred to as `name[/config]:version` and loaded
//! lazily (`source::LazyDatasetLoader`). The data directory defaults to `T5DATA_DIR` and can be
//! overridden for every task at once with `source::set_data_dir_override`.
//!
//! #### 2. Tasks
//! A Task chains text preprocessors, tokenization and token preprocessors, then truncates the
//! output features to their sequence length and appends the end-of-sequence token.
//!
//! ```no_run
//! use std::sync::Arc;
//! use t5_data::registry::{DatasetOptions, SequenceLength};
//! use t5_data::resources::{RemoteResource, T5VocabResources};
//! use t5_data::tasks::preprocessors::translate;
//! use t5_data::tasks::{metrics, TaskBuilder, TaskRegistry};
//! use t5_data::vocabulary::SentencePieceVocabulary;
//! # fn main() -> Result<(), t5_data::T5DataError> {
//! let vocabulary = SentencePieceVocabulary::from_resource(&RemoteResource::from_pretrained(
//!     T5VocabResources::T5_SMALL,
//! ))?;
//! let task = TaskBuilder::new("wmt_t2t_ende_v003", "wmt_t2t_translate/de-en:1.0.0")
//!     .with_text_preprocessor(translate("en", "de"))
//!     .with_vocabulary(Arc::new(vocabulary))
//!     .with_metric_fn(metrics::accuracy)
//!     .build()?;
//! TaskRegistry::add(task)?;
//!
//! let sequence_length: SequenceLength =
//!     vec![("inputs".to_string(), 512), ("targets".to_string(), 512)]
//!         .into_iter()
//!         .collect();
//! let options = DatasetOptions {
//!     use_cached: false,
//!     ..DatasetOptions::for_split("validation")
//! };
//! let examples = TaskRegistry::get_dataset("wmt_t2t_ende_v003", &sequence_length, &options)?
//!     .take_examples(4)?;
//! # Ok(())
//! # }
//! ```
//!
//! #### 3. Caching
//! `tasks::cache_task` writes the preprocessed and tokenized splits of a task to disk, together
//! with per-split statistics. Tasks read their cache from the global cache directories
//! (`tasks::add_global_cache_dirs`, or `T5DATA_CACHE_DIRS` through `DataConfig`).
//!
//! #### 4. Mixtures
//! Mixtures sample the examples of several tasks according to their rates, e.g. proportionally
//! to their number of examples with `mixtures::rate_num_examples`.
//!
//! #### 5. Configuration
//! Process-wide settings can be loaded from the environment or a JSON file and installed with
//! `DataConfig::apply`:
//!
//! ```no_run
//! use t5_data::common::DataConfig;
//! DataConfig::from_env().apply();
//! ```
//!
//! The crate logs through `tracing` and never installs a subscriber.

pub mod common;
pub mod dataset;
pub mod mixtures;
pub mod registry;
pub mod source;
pub mod tasks;
pub mod vocabulary;

pub use common::error::T5DataError;
pub use common::resources;
pub use common::{Config, DataConfig};
