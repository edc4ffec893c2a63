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
use crate::dataset::{Dataset, Example, Feature, FeatureDtype};
use crate::registry::{check_sequence_length, DatasetOptions, DatasetProvider, SequenceLength};
use crate::source::LazyDatasetLoader;
use crate::tasks::cache::{
    global_cache_dirs, load_cached_split, stats_path, SplitStats, COMPLETED_FILE,
    MAX_EXAMPLES_TO_MEM_CACHE,
};
use crate::tasks::utils::encode_string_features;
use crate::vocabulary::{Vocabulary, EOS_ID};
use crate::Config;
use lazy_static::lazy_static;
use regex::Regex;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, PoisonError};
use tracing::info;

/// Text preprocessing step, applied to the raw source examples
pub type TextPreprocessor = Arc<dyn Fn(Dataset) -> Dataset + Send + Sync>;
/// Token preprocessing step, applied to tokenized examples
pub type TokenPreprocessor =
    Arc<dyn Fn(Dataset, &SequenceLength, &Arc<dyn Vocabulary>) -> Dataset + Send + Sync>;
/// Turns a decoded model output (or target when the flag is set) into the string compared by the
/// metric functions
pub type PostprocessFn = Arc<dyn Fn(&str, bool) -> String + Send + Sync>;
/// Scores postprocessed predictions against their targets
pub type MetricFn = Arc<dyn Fn(&[String], &[String]) -> BTreeMap<String, f64> + Send + Sync>;

/// Output features used when none are given
pub const DEFAULT_OUTPUT_FEATURES: [&str; 2] = ["inputs", "targets"];

/// Pattern task names must match
pub const TASK_NAME_PATTERN: &str = r"^[\w\d\._]+$";

lazy_static! {
    static ref VALID_TASK_NAME: Result<Regex, regex::Error> = Regex::new(TASK_NAME_PATTERN);
}

/// # Builder for `Task`
///
/// # Example
///
/// ```no_run
/// use std::sync::Arc;
/// use t5_data::tasks::preprocessors::translate;
/// use t5_data::tasks::{metrics, TaskBuilder, TaskRegistry};
/// use t5_data::vocabulary::SentencePieceVocabulary;
/// # fn main() -> Result<(), t5_data::T5DataError> {
/// let vocabulary = Arc::new(SentencePieceVocabulary::from_file("path/to/spiece.model")?);
/// let task = TaskBuilder::new("wmt16_en_de", "wmt16/de-en:1.0.0")
///     .with_text_preprocessor(translate("en", "de"))
///     .with_vocabulary(vocabulary)
///     .with_metric_fn(metrics::accuracy)
///     .build()?;
/// TaskRegistry::add(task)?;
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct TaskBuilder {
    name: String,
    source: String,
    data_dir: Option<PathBuf>,
    text_preprocessors: Vec<TextPreprocessor>,
    token_preprocessors: Vec<TokenPreprocessor>,
    vocabulary: Option<Arc<dyn Vocabulary>>,
    metric_fns: Vec<MetricFn>,
    postprocess_fn: Option<PostprocessFn>,
    output_features: Option<Vec<String>>,
    splits: Option<Vec<String>>,
}

impl TaskBuilder {
    /// Starts the definition of a task.
    ///
    /// # Arguments
    ///
    /// * `name` - unique task name, made of word characters and dots
    /// * `source` - source dataset reference, `name[/config]:version`
    pub fn new(name: &str, source: &str) -> TaskBuilder {
        TaskBuilder {
            name: name.to_string(),
            source: source.to_string(),
            data_dir: None,
            text_preprocessors: vec![],
            token_preprocessors: vec![],
            vocabulary: None,
            metric_fns: vec![],
            postprocess_fn: None,
            output_features: None,
            splits: None,
        }
    }

    /// Appends a text preprocessor. Text preprocessors run in insertion order.
    pub fn with_text_preprocessor<F>(&mut self, preprocessor: F) -> &mut Self
    where
        F: Fn(Dataset) -> Dataset + Send + Sync + 'static,
    {
        self.text_preprocessors.push(Arc::new(preprocessor));
        self
    }

    /// Appends a token preprocessor. Token preprocessors run in insertion order.
    pub fn with_token_preprocessor<F>(&mut self, preprocessor: F) -> &mut Self
    where
        F: Fn(Dataset, &SequenceLength, &Arc<dyn Vocabulary>) -> Dataset + Send + Sync + 'static,
    {
        self.token_preprocessors.push(Arc::new(preprocessor));
        self
    }

    pub fn with_vocabulary(&mut self, vocabulary: Arc<dyn Vocabulary>) -> &mut Self {
        self.vocabulary = Some(vocabulary);
        self
    }

    pub fn with_metric_fn<F>(&mut self, metric_fn: F) -> &mut Self
    where
        F: Fn(&[String], &[String]) -> BTreeMap<String, f64> + Send + Sync + 'static,
    {
        self.metric_fns.push(Arc::new(metric_fn));
        self
    }

    pub fn with_postprocess_fn<F>(&mut self, postprocess_fn: F) -> &mut Self
    where
        F: Fn(&str, bool) -> String + Send + Sync + 'static,
    {
        self.postprocess_fn = Some(Arc::new(postprocess_fn));
        self
    }

    /// Task-specific directory of the source dataset
    pub fn with_data_dir<P: Into<PathBuf>>(&mut self, data_dir: P) -> &mut Self {
        self.data_dir = Some(data_dir.into());
        self
    }

    pub fn with_output_features(&mut self, output_features: &[&str]) -> &mut Self {
        self.output_features = Some(
            output_features
                .iter()
                .map(|feature| feature.to_string())
                .collect(),
        );
        self
    }

    /// Restricts the splits the task can load
    pub fn with_splits(&mut self, splits: &[&str]) -> &mut Self {
        self.splits = Some(splits.iter().map(|split| split.to_string()).collect());
        self
    }

    /// Validates the definition and creates the task
    pub fn build(&self) -> Result<Task, T5DataError> {
        let valid_name = VALID_TASK_NAME
            .as_ref()
            .map_or(false, |regex| regex.is_match(&self.name));
        if !valid_name {
            return Err(T5DataError::InvalidConfigurationError(format!(
                "Task name '{}' contains invalid characters. Must match regex: {}",
                self.name, TASK_NAME_PATTERN
            )));
        }
        if !self.source.contains(':') {
            return Err(T5DataError::InvalidConfigurationError(format!(
                "Dataset name must contain a version number, got: {}",
                self.source
            )));
        }
        let vocabulary = self.vocabulary.clone().ok_or_else(|| {
            T5DataError::InvalidConfigurationError(format!(
                "No vocabulary provided for task {}",
                self.name
            ))
        })?;
        let source = LazyDatasetLoader::get_or_create(&self.source, self.data_dir.clone())?;
        let output_features: BTreeSet<String> = match &self.output_features {
            Some(output_features) if !output_features.is_empty() => {
                output_features.iter().cloned().collect()
            }
            _ => DEFAULT_OUTPUT_FEATURES
                .iter()
                .map(|feature| feature.to_string())
                .collect(),
        };

        Ok(Task {
            name: self.name.clone(),
            source,
            text_preprocessors: self.text_preprocessors.clone(),
            token_preprocessors: self.token_preprocessors.clone(),
            vocabulary,
            metric_fns: self.metric_fns.clone(),
            postprocess_fn: self.postprocess_fn.clone(),
            output_features: output_features.into_iter().collect(),
            splits: self.splits.clone(),
            cache_dir: Mutex::new(None),
            stats: Mutex::new(HashMap::new()),
        })
    }
}

/// # Text-to-text task
/// A named source dataset together with the preprocessing that turns its examples into
/// tokenized model features, and the metrics used to evaluate model outputs.
///
/// Datasets are produced either on the fly (load, text preprocessing, tokenization) or from a
/// preprocessed cache found in one of the global cache directories (see `cache_task`). Token
/// preprocessing, truncation to the sequence length and the end-of-sequence token are applied in
/// both cases.
pub struct Task {
    name: String,
    source: Arc<LazyDatasetLoader>,
    text_preprocessors: Vec<TextPreprocessor>,
    token_preprocessors: Vec<TokenPreprocessor>,
    vocabulary: Arc<dyn Vocabulary>,
    metric_fns: Vec<MetricFn>,
    postprocess_fn: Option<PostprocessFn>,
    output_features: Vec<String>,
    splits: Option<Vec<String>>,
    cache_dir: Mutex<Option<PathBuf>>,
    stats: Mutex<HashMap<String, Arc<SplitStats>>>,
}

impl fmt::Debug for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Task")
            .field("name", &self.name)
            .field("source", &self.source.name())
            .field("output_features", &self.output_features)
            .field("vocabulary", &self.vocabulary)
            .finish()
    }
}

fn validate_dataset(
    dataset: Dataset,
    output_features: Arc<Vec<String>>,
    expected_dtype: FeatureDtype,
    expected_rank: usize,
    label: &'static str,
    ensure_no_eos: bool,
) -> Dataset {
    dataset.map(move |example| -> Result<Example, T5DataError> {
        for feature in output_features.iter() {
            let value = example.get(feature).ok_or_else(|| {
                T5DataError::ValidationError(format!(
                    "Task dataset is missing expected output feature after {}: {}",
                    label, feature
                ))
            })?;
            if value.dtype() != expected_dtype {
                return Err(T5DataError::ValidationError(format!(
                    "Task dataset has incorrect type for feature '{}' after {}: Got {}, expected {}",
                    feature,
                    label,
                    value.dtype(),
                    expected_dtype
                )));
            }
            if value.rank() != expected_rank {
                return Err(T5DataError::ValidationError(format!(
                    "Task dataset has incorrect rank for feature '{}' after {}: Got {}, expected {}",
                    feature,
                    label,
                    value.rank(),
                    expected_rank
                )));
            }
            if ensure_no_eos && value.as_tokens().map_or(false, |ids| ids.contains(&EOS_ID)) {
                return Err(T5DataError::ValidationError(format!(
                    "Feature '{}' unexpectedly contains EOS={} token after {}.",
                    feature, EOS_ID, label
                )));
            }
        }
        Ok(example)
    })
}

impl Task {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Loader of the source dataset
    pub fn source(&self) -> &Arc<LazyDatasetLoader> {
        &self.source
    }

    /// Features prepared for the model, sorted
    pub fn output_features(&self) -> &[String] {
        &self.output_features
    }

    pub fn vocabulary(&self) -> Arc<dyn Vocabulary> {
        self.vocabulary.clone()
    }

    pub fn metric_fns(&self) -> &[MetricFn] {
        &self.metric_fns
    }

    /// Whether token preprocessors are defined (their effect on lengths is unknown)
    pub fn has_token_preprocessors(&self) -> bool {
        !self.token_preprocessors.is_empty()
    }

    /// Applies the postprocess function, or returns the input unchanged when there is none
    pub fn postprocess(&self, output: &str, is_target: bool) -> String {
        match &self.postprocess_fn {
            Some(postprocess_fn) => postprocess_fn(output, is_target),
            None => output.to_string(),
        }
    }

    /// Splits the task can load: the explicitly allowed splits, or every split of the source
    pub fn splits(&self) -> Result<Vec<String>, T5DataError> {
        match &self.splits {
            Some(splits) => Ok(splits.clone()),
            None => self.source.splits(),
        }
    }

    fn check_split(&self, split: &str) -> Result<(), T5DataError> {
        match &self.splits {
            Some(splits) if !splits.iter().any(|allowed| allowed == split) => {
                Err(T5DataError::DatasetError(format!(
                    "Split '{}' is not allowed for task {} (allowed: {:?})",
                    split, self.name, splits
                )))
            }
            _ => Ok(()),
        }
    }

    /// Applies the text preprocessors in order, then checks that every output feature is a text
    /// scalar.
    pub fn preprocess_text(&self, dataset: Dataset) -> Dataset {
        let dataset = self
            .text_preprocessors
            .iter()
            .fold(dataset, |dataset, preprocessor| preprocessor(dataset));
        validate_dataset(
            dataset,
            Arc::new(self.output_features.clone()),
            FeatureDtype::String,
            0,
            "text preprocessing",
            false,
        )
    }

    /// Applies the token preprocessors in order and checks that every output feature is a token
    /// sequence without end-of-sequence token. Output features are then truncated to
    /// `sequence_length - 1` tokens and terminated by the end-of-sequence token; other features
    /// pass through.
    pub fn preprocess_tokens(&self, dataset: Dataset, sequence_length: &SequenceLength) -> Dataset {
        let dataset = self
            .token_preprocessors
            .iter()
            .fold(dataset, |dataset, preprocessor| {
                preprocessor(dataset, sequence_length, &self.vocabulary)
            });
        let dataset = validate_dataset(
            dataset,
            Arc::new(self.output_features.clone()),
            FeatureDtype::Int64,
            1,
            "token preprocessing",
            true,
        );

        let output_features = Arc::new(self.output_features.clone());
        let sequence_length = Arc::new(sequence_length.clone());
        dataset.map(move |mut example| -> Result<Example, T5DataError> {
            for feature in output_features.iter() {
                let max_length = *sequence_length.get(feature).ok_or_else(|| {
                    T5DataError::ValidationError(format!(
                        "No sequence length given for feature '{}'",
                        feature
                    ))
                })?;
                if max_length == 0 {
                    return Err(T5DataError::ValidationError(format!(
                        "Sequence length of feature '{}' must be positive",
                        feature
                    )));
                }
                let tokens = example.tokens(feature)?;
                let mut trimmed: Vec<i64> = tokens
                    .iter()
                    .take(max_length - 1)
                    .copied()
                    .collect();
                trimmed.push(EOS_ID);
                example.insert(feature.as_str(), Feature::Ints(trimmed));
            }
            Ok(example)
        })
    }

    /// Looks for a completed cache of the task in the global cache directories. The first
    /// `<cache dir>/<task name>` holding a `COMPLETED` marker is used; once found, the cache
    /// directory is not searched again.
    pub fn initialize(&self) {
        let mut cache_dir = self
            .cache_dir
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if cache_dir.is_some() {
            return;
        }
        let potential_cache_dirs: Vec<PathBuf> = global_cache_dirs()
            .into_iter()
            .map(|directory| directory.join(&self.name))
            .collect();
        for potential_cache_dir in &potential_cache_dirs {
            if potential_cache_dir.join(COMPLETED_FILE).exists() {
                info!(
                    "'{}' is cached at {}.",
                    self.name,
                    potential_cache_dir.display()
                );
                *cache_dir = Some(potential_cache_dir.clone());
                return;
            }
        }
        info!(
            "'{}' does not exist in any task cache directories (searched {:?}).",
            self.name, potential_cache_dirs
        );
    }

    /// Whether a completed cache exists
    pub fn cached(&self) -> bool {
        self.initialize();
        self.cache_dir
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }

    pub fn assert_cached(&self) -> Result<(), T5DataError> {
        if self.cached() {
            Ok(())
        } else {
            Err(T5DataError::CacheError(format!(
                "'{}' does not exist in any of the task cache directories",
                self.name
            )))
        }
    }

    /// Directory of the completed cache
    pub fn cache_dir(&self) -> Result<PathBuf, T5DataError> {
        self.assert_cached()?;
        self.cache_dir
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
            .ok_or_else(|| {
                T5DataError::CacheError(format!("'{}' has no cache directory", self.name))
            })
    }

    /// Statistics of a cached split, read once from `stats.<split>.json`
    pub fn get_cached_stats(&self, split: &str) -> Result<Arc<SplitStats>, T5DataError> {
        let cache_dir = self.cache_dir()?;
        let mut stats = self.stats.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(split_stats) = stats.get(split) {
            return Ok(split_stats.clone());
        }
        let path = stats_path(&cache_dir, split);
        if !path.exists() {
            return Err(T5DataError::CacheError(format!(
                "Stats do not exist for '{}' split: {}",
                self.name, split
            )));
        }
        let split_stats = Arc::new(SplitStats::from_file(&path)?);
        stats.insert(split.to_string(), split_stats.clone());
        Ok(split_stats)
    }

    fn get_cached_dataset(
        &self,
        split: &str,
        shuffle: bool,
        seed: Option<u64>,
    ) -> Result<Dataset, T5DataError> {
        let cache_dir = self.cache_dir()?;
        let (dataset, _) = load_cached_split(&cache_dir, split, shuffle, seed)?;
        if self.get_cached_stats(split)?.examples <= MAX_EXAMPLES_TO_MEM_CACHE {
            dataset.cache()
        } else {
            Ok(dataset)
        }
    }

    /// Builds the tokenized dataset of a split.
    ///
    /// # Arguments
    ///
    /// * `sequence_length` - maximum length of every output feature
    /// * `options` - split to load, whether to read the cache, shuffling options
    ///
    /// # Returns
    ///
    /// * `Dataset` of examples whose output features are token sequences ending with the
    ///   end-of-sequence token. On-the-fly datasets also carry `<feature>_plaintext` copies of the
    ///   untokenized output features.
    ///
    /// # Example
    ///
    /// ```no_run
    /// use t5_data::registry::{DatasetOptions, SequenceLength};
    /// use t5_data::tasks::TaskRegistry;
    /// # fn main() -> Result<(), t5_data::T5DataError> {
    /// let task = TaskRegistry::get("glue_cola_v002")?;
    /// let sequence_length: SequenceLength =
    ///     vec![("inputs".to_string(), 512), ("targets".to_string(), 8)]
    ///         .into_iter()
    ///         .collect();
    /// let options = DatasetOptions {
    ///     use_cached: false,
    ///     seed: Some(0),
    ///     ..DatasetOptions::for_split("validation")
    /// };
    /// let examples = task.get_dataset(&sequence_length, &options)?.take_examples(8)?;
    /// # Ok(())
    /// # }
    /// ```
    pub fn get_dataset(
        &self,
        sequence_length: &SequenceLength,
        options: &DatasetOptions,
    ) -> Result<Dataset, T5DataError> {
        check_sequence_length(
            sequence_length,
            &self.output_features,
            &format!("task {}", self.name),
        )?;
        self.check_split(&options.split)?;

        let dataset = if options.use_cached {
            self.get_cached_dataset(&options.split, options.shuffle, options.seed)?
        } else {
            let dataset = self
                .source
                .load(&options.split, options.shuffle, options.seed)?;
            let dataset = self.preprocess_text(dataset);
            encode_string_features(
                &dataset,
                self.vocabulary.clone(),
                &self.output_features,
                true,
            )
        };

        let dataset = self.preprocess_tokens(dataset, sequence_length);
        Ok(if options.shuffle {
            dataset.shuffle(options.shuffle_buffer_size, options.seed)
        } else {
            dataset
        })
    }

    /// Scores model outputs: targets and predictions are postprocessed, then every metric
    /// function runs and their results are merged.
    pub fn evaluate(
        &self,
        targets: &[String],
        predictions: &[String],
    ) -> Result<BTreeMap<String, f64>, T5DataError> {
        if targets.len() != predictions.len() {
            return Err(T5DataError::ValidationError(format!(
                "Got {} targets but {} predictions",
                targets.len(),
                predictions.len()
            )));
        }
        let targets: Vec<String> = targets
            .iter()
            .map(|target| self.postprocess(target, true))
            .collect();
        let predictions: Vec<String> = predictions
            .iter()
            .map(|prediction| self.postprocess(prediction, false))
            .collect();

        let mut scores = BTreeMap::new();
        for metric_fn in &self.metric_fns {
            scores.extend(metric_fn(&targets, &predictions));
        }
        Ok(scores)
    }
}

impl DatasetProvider for Task {
    fn output_features(&self) -> &[String] {
        &self.output_features
    }

    fn vocabulary(&self) -> Arc<dyn Vocabulary> {
        self.vocabulary.clone()
    }

    fn get_dataset(
        &self,
        sequence_length: &SequenceLength,
        options: &DatasetOptions,
    ) -> Result<Dataset, T5DataError> {
        Task::get_dataset(self, sequence_length, options)
    }
}
