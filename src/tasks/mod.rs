//! # Tasks
//!
//! A `Task` bundles a versioned source dataset, the preprocessing turning its examples into
//! `inputs`/`targets` text, the vocabulary used to tokenize them and the metrics used for
//! evaluation. Tasks are created with a `TaskBuilder` and registered by name in the
//! `TaskRegistry`.
//!
//! Preprocessing runs in two stages:
//! - text preprocessors transform raw examples; afterwards every output feature must be a text
//!   scalar
//! - after tokenization, token preprocessors transform the token ids; afterwards every output
//!   feature must be a token sequence without end-of-sequence token. Output features are then
//!   truncated to their sequence length and terminated by the end-of-sequence token.
//!
//! The result of the first stage plus tokenization can be written to disk with `cache_task` and
//! read back by any task whose cache lives in one of the global cache directories.
//!
//! ```no_run
//! use std::sync::Arc;
//! use t5_data::registry::{DatasetOptions, SequenceLength};
//! use t5_data::tasks::preprocessors::rekey;
//! use t5_data::tasks::{metrics, TaskBuilder};
//! use t5_data::vocabulary::ByteVocabulary;
//! # fn main() -> Result<(), t5_data::T5DataError> {
//! let task = TaskBuilder::new("squad_v010", "squad/v1.1:1.0.0")
//!     .with_text_preprocessor(rekey(&[("inputs", "question"), ("targets", "answer")]))
//!     .with_vocabulary(Arc::new(ByteVocabulary::new()))
//!     .with_metric_fn(metrics::token_f1)
//!     .build()?;
//!
//! let sequence_length: SequenceLength =
//!     vec![("inputs".to_string(), 512), ("targets".to_string(), 64)]
//!         .into_iter()
//!         .collect();
//! let options = DatasetOptions {
//!     use_cached: false,
//!     ..Default::default()
//! };
//! let examples = task.get_dataset(&sequence_length, &options)?.take_examples(16)?;
//! # Ok(())
//! # }
//! ```

mod cache;
pub mod metrics;
pub mod preprocessors;
mod registry;
mod task;
mod utils;

pub use cache::{
    add_global_cache_dirs, cache_task, global_cache_dirs, set_global_cache_dirs, CachedSplitInfo,
    FeatureSpec, SplitStats, COMPLETED_FILE, MAX_EXAMPLES_TO_MEM_CACHE,
};
pub use registry::TaskRegistry;
pub use task::{
    MetricFn, PostprocessFn, Task, TaskBuilder, TextPreprocessor, TokenPreprocessor,
    DEFAULT_OUTPUT_FEATURES, TASK_NAME_PATTERN,
};
pub use utils::{encode_string_features, inverse_dataset, PLAINTEXT_SUFFIX};
