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
use crate::common::Config;
use crate::dataset::{Dataset, Example, Feature, FeatureDtype};
use crate::source::interleave_files;
use crate::tasks::utils::encode_string_features;
use crate::tasks::Task;
use lazy_static::lazy_static;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, PoisonError, RwLock};
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Marker file written once a task cache is complete
pub const COMPLETED_FILE: &str = "COMPLETED";
/// Cached splits with at most this many examples are kept in memory after the first read
pub const MAX_EXAMPLES_TO_MEM_CACHE: u64 = 1000;

lazy_static! {
    static ref GLOBAL_CACHE_DIRECTORIES: RwLock<Vec<PathBuf>> = RwLock::new(Vec::new());
}

/// Replaces the directories searched for preprocessed task caches
pub fn set_global_cache_dirs(cache_dirs: Vec<PathBuf>) {
    *GLOBAL_CACHE_DIRECTORIES
        .write()
        .unwrap_or_else(PoisonError::into_inner) = cache_dirs;
}

/// Appends directories to the ones searched for preprocessed task caches
pub fn add_global_cache_dirs(cache_dirs: Vec<PathBuf>) {
    GLOBAL_CACHE_DIRECTORIES
        .write()
        .unwrap_or_else(PoisonError::into_inner)
        .extend(cache_dirs);
}

pub fn global_cache_dirs() -> Vec<PathBuf> {
    GLOBAL_CACHE_DIRECTORIES
        .read()
        .unwrap_or_else(PoisonError::into_inner)
        .clone()
}

pub(crate) fn info_path(cache_dir: &Path, split: &str) -> PathBuf {
    cache_dir.join(format!("info.{}.json", split))
}

pub(crate) fn stats_path(cache_dir: &Path, split: &str) -> PathBuf {
    cache_dir.join(format!("stats.{}.json", split))
}

fn shard_prefix(split: &str) -> String {
    format!("{}.jsonl-", split)
}

fn shard_file_name(split: &str, shard: usize, num_shards: usize) -> String {
    format!("{}{:05}-of-{:05}", shard_prefix(split), shard, num_shards)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
/// # Type of a cached feature
pub struct FeatureSpec {
    pub dtype: FeatureDtype,
    pub rank: usize,
}

impl FeatureSpec {
    fn of(feature: &Feature) -> FeatureSpec {
        FeatureSpec {
            dtype: feature.dtype(),
            rank: feature.rank(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
/// # Description of a cached split (`info.<split>.json`)
pub struct CachedSplitInfo {
    pub features: BTreeMap<String, FeatureSpec>,
    pub num_shards: usize,
}

impl Config for CachedSplitInfo {}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
/// # Statistics of a cached split (`stats.<split>.json`)
/// Holds the number of examples and, for every integer feature `f`, the total and maximum
/// number of tokens under `f_tokens` and `f_max_tokens`.
pub struct SplitStats {
    pub examples: u64,
    #[serde(flatten)]
    pub counters: BTreeMap<String, u64>,
}

impl Config for SplitStats {}

impl SplitStats {
    /// Total number of tokens of `feature` over the split
    pub fn tokens(&self, feature: &str) -> Option<u64> {
        self.counters.get(&format!("{}_tokens", feature)).copied()
    }

    /// Length of the longest `feature` sequence in the split
    pub fn max_tokens(&self, feature: &str) -> Option<u64> {
        self.counters.get(&format!("{}_max_tokens", feature)).copied()
    }

    fn record(&mut self, example: &Example) {
        self.examples += 1;
        for (key, value) in example {
            if let Feature::Ints(tokens) = value {
                let length = tokens.len() as u64;
                *self.counters.entry(format!("{}_tokens", key)).or_insert(0) += length;
                let max_tokens = self
                    .counters
                    .entry(format!("{}_max_tokens", key))
                    .or_insert(0);
                *max_tokens = (*max_tokens).max(length);
            }
        }
    }
}

fn check_feature(
    key: &str,
    feature: Feature,
    spec: Option<&FeatureSpec>,
) -> Result<Feature, T5DataError> {
    let spec = spec.ok_or_else(|| {
        T5DataError::ValidationError(format!("Unexpected feature '{}' in cached example", key))
    })?;
    match feature {
        // An empty JSON array reads back as an integer sequence
        Feature::Ints(values) if values.is_empty() && spec.rank == 1 => match spec.dtype {
            FeatureDtype::String => Ok(Feature::TextList(vec![])),
            FeatureDtype::Float64 => Ok(Feature::Floats(vec![])),
            FeatureDtype::Int64 => Ok(Feature::Ints(values)),
        },
        feature if FeatureSpec::of(&feature) == *spec => Ok(feature),
        feature => Err(T5DataError::ValidationError(format!(
            "Cached feature '{}' has type {} rank {}, expected {} rank {}",
            key,
            feature.dtype(),
            feature.rank(),
            spec.dtype,
            spec.rank
        ))),
    }
}

fn remove_staging(staging: &Path) {
    if let Err(e) = fs::remove_dir_all(staging) {
        warn!(
            "Could not remove incomplete cache directory {}: {}",
            staging.display(),
            e
        );
    }
}

/// Reads a cached split, checking every example against the recorded feature types
pub(crate) fn load_cached_split(
    cache_dir: &Path,
    split: &str,
    shuffle_files: bool,
    seed: Option<u64>,
) -> Result<(Dataset, CachedSplitInfo), T5DataError> {
    let split_info = CachedSplitInfo::from_file(info_path(cache_dir, split)).map_err(|e| {
        T5DataError::CacheError(format!(
            "Could not read the cached info of split '{}' in {}: {}",
            split,
            cache_dir.display(),
            e
        ))
    })?;

    let prefix = shard_prefix(split);
    let mut files = Vec::new();
    for entry in fs::read_dir(cache_dir)? {
        let path = entry?.path();
        let matches = path
            .file_name()
            .and_then(|file_name| file_name.to_str())
            .and_then(|file_name| file_name.strip_prefix(prefix.as_str()))
            .and_then(|suffix| suffix.split_once("-of-"))
            .and_then(|(_, num_shards)| num_shards.parse::<usize>().ok())
            .map_or(false, |num_shards| num_shards == split_info.num_shards);
        if matches {
            files.push(path);
        }
    }
    if files.is_empty() {
        return Err(T5DataError::CacheError(format!(
            "No cached shards found for split '{}' in {}",
            split,
            cache_dir.display()
        )));
    }
    files.sort();

    let features = Arc::new(split_info.features.clone());
    let dataset = interleave_files(files, shuffle_files, seed).map(
        move |example| -> Result<Example, T5DataError> {
            example
                .into_iter()
                .map(|(key, value)| {
                    let value = check_feature(&key, value, features.get(&key))?;
                    Ok((key, value))
                })
                .collect::<Result<BTreeMap<String, Feature>, T5DataError>>()
                .map(Example::from)
        },
    );
    Ok((dataset, split_info))
}

fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<(), T5DataError> {
    let mut writer = BufWriter::new(File::create(path)?);
    serde_json::to_writer_pretty(&mut writer, value)?;
    writer.flush()?;
    Ok(())
}

fn write_split(
    task: &Task,
    directory: &Path,
    split: &str,
    num_shards: usize,
) -> Result<(), T5DataError> {
    let dataset = task.source().load(split, false, None)?;
    let dataset = task.preprocess_text(dataset);
    let dataset = encode_string_features(
        &dataset,
        task.vocabulary(),
        task.output_features(),
        true,
    );

    let mut writers = (0..num_shards)
        .map(|shard| -> Result<BufWriter<File>, T5DataError> {
            let path = directory.join(shard_file_name(split, shard, num_shards));
            Ok(BufWriter::new(File::create(path)?))
        })
        .collect::<Result<Vec<_>, T5DataError>>()?;

    let mut features: BTreeMap<String, FeatureSpec> = BTreeMap::new();
    let mut stats = SplitStats::default();
    for (index, example) in dataset.iter().enumerate() {
        let example = example?;
        for (key, value) in &example {
            let spec = FeatureSpec::of(value);
            match features.get(key) {
                Some(recorded) if *recorded != spec => {
                    return Err(T5DataError::CacheError(format!(
                        "Feature '{}' of task {} changes type between examples ({} rank {} then {} rank {})",
                        key,
                        task.name(),
                        recorded.dtype,
                        recorded.rank,
                        spec.dtype,
                        spec.rank
                    )));
                }
                Some(_) => {}
                None => {
                    features.insert(key.clone(), spec);
                }
            }
        }
        stats.record(&example);
        let writer = &mut writers[index % num_shards];
        serde_json::to_writer(&mut *writer, &example)?;
        writer.write_all(b"\n")?;
    }
    for writer in writers.iter_mut() {
        writer.flush()?;
    }

    write_json(
        &info_path(directory, split),
        &CachedSplitInfo {
            features,
            num_shards,
        },
    )?;
    write_json(&stats_path(directory, split), &stats)?;
    debug!(
        "Cached {} examples of {}/{} in {} shards",
        stats.examples,
        task.name(),
        split,
        num_shards
    );
    Ok(())
}

/// Preprocesses and tokenizes splits of a task and writes them to `<cache_root>/<task name>`,
/// where `Task::get_dataset` can read them back once `cache_root` is registered as a global cache
/// directory. Splits are written to a staging directory that is renamed into place when every
/// split succeeded; the `COMPLETED` marker is written last.
///
/// Token preprocessors and shuffling are not applied: they run when the cache is read.
///
/// # Arguments
///
/// * `task` - task to cache
/// * `cache_root` - directory receiving the task cache
/// * `splits` - splits to cache
/// * `num_shards` - number of shard files per split, examples are distributed round-robin
///
/// # Returns
///
/// * `PathBuf` the task cache directory
///
/// # Example
///
/// ```no_run
/// use std::path::Path;
/// use t5_data::tasks::{add_global_cache_dirs, cache_task, TaskRegistry};
/// # fn main() -> Result<(), t5_data::T5DataError> {
/// let task = TaskRegistry::get("glue_cola_v002")?;
/// cache_task(&task, Path::new("/data/t5_cache"), &["train", "validation"], 8)?;
/// add_global_cache_dirs(vec!["/data/t5_cache".into()]);
/// assert!(task.cached());
/// # Ok(())
/// # }
/// ```
pub fn cache_task(
    task: &Task,
    cache_root: &Path,
    splits: &[&str],
    num_shards: usize,
) -> Result<PathBuf, T5DataError> {
    if num_shards == 0 {
        return Err(T5DataError::InvalidConfigurationError(
            "The number of shards must be positive".to_string(),
        ));
    }
    let target = cache_root.join(task.name());
    if target.exists() {
        return Err(T5DataError::CacheError(format!(
            "Cache directory {} already exists",
            target.display()
        )));
    }
    fs::create_dir_all(cache_root)?;
    let staging = cache_root.join(format!("{}.incomplete-{}", task.name(), Uuid::new_v4()));
    fs::create_dir(&staging)?;

    let written = splits
        .iter()
        .try_for_each(|split| write_split(task, &staging, split, num_shards));
    if let Err(e) = written {
        remove_staging(&staging);
        return Err(e);
    }

    fs::rename(&staging, &target)?;
    File::create(target.join(COMPLETED_FILE))?;
    info!("Cached '{}' at {}", task.name(), target.display());
    Ok(target)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tracing_test::traced_test;

    #[test]
    fn stats_counters_round_trip() -> anyhow::Result<()> {
        let mut stats = SplitStats::default();
        stats.record(&Example::new().with("inputs", vec![3i64, 4, 5]).with("id", "a"));
        stats.record(&Example::new().with("inputs", vec![3i64]).with("id", "b"));

        let json = serde_json::to_string(&stats)?;
        let parsed: SplitStats = serde_json::from_str(&json)?;
        assert_eq!(parsed.examples, 2);
        assert_eq!(parsed.tokens("inputs"), Some(4));
        assert_eq!(parsed.max_tokens("inputs"), Some(3));
        assert_eq!(parsed.tokens("id"), None);
        Ok(())
    }

    #[test]
    fn cached_features_are_checked() {
        let spec = FeatureSpec {
            dtype: FeatureDtype::Int64,
            rank: 1,
        };
        assert!(check_feature("inputs", Feature::Ints(vec![1]), Some(&spec)).is_ok());
        assert!(check_feature("inputs", Feature::Text("a".into()), Some(&spec)).is_err());
        assert!(check_feature("inputs", Feature::Ints(vec![1]), None).is_err());

        let text_list = FeatureSpec {
            dtype: FeatureDtype::String,
            rank: 1,
        };
        assert_eq!(
            check_feature("answers", Feature::Ints(vec![]), Some(&text_list)).ok(),
            Some(Feature::TextList(vec![]))
        );
        let floats = FeatureSpec {
            dtype: FeatureDtype::Float64,
            rank: 1,
        };
        assert_eq!(
            check_feature("scores", Feature::Ints(vec![]), Some(&floats)).ok(),
            Some(Feature::Floats(vec![]))
        );
        assert!(check_feature("scores", Feature::Ints(vec![1]), Some(&floats)).is_err());
    }

    #[test]
    #[traced_test]
    fn failed_staging_cleanup_is_logged() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        remove_staging(&dir.path().join("task.incomplete-missing"));
        assert!(logs_contain("Could not remove incomplete cache directory"));
        Ok(())
    }

    #[test]
    fn shard_names_are_zero_padded() {
        assert_eq!(shard_file_name("train", 3, 12), "train.jsonl-00003-of-00012");
    }
}
