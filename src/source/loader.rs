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

use crate::common::config::DATA_DIR_ENV_VAR;
use crate::common::error::T5DataError;
use crate::common::Config;
use crate::dataset::{Dataset, ExampleIterator, PassRng};
use crate::source::info::{DatasetInfo, DATASET_INFO_FILE};
use lazy_static::lazy_static;
use rand::seq::SliceRandom;
use std::collections::{BTreeSet, HashMap};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use tracing::{debug, warn};

/// Number of shard files read concurrently when loading a split
pub(crate) const SHARD_CYCLE_LENGTH: usize = 16;
/// Number of consecutive examples read from a shard before moving to the next one
pub(crate) const SHARD_BLOCK_LENGTH: usize = 16;

type LoaderKey = (String, Option<PathBuf>);

lazy_static! {
    static ref LOADERS: Mutex<HashMap<LoaderKey, Arc<LazyDatasetLoader>>> =
        Mutex::new(HashMap::new());
    static ref DATA_DIR_OVERRIDE: RwLock<Option<PathBuf>> = RwLock::new(None);
}

/// Sets (or clears with `None`) the directory used by every dataset loader in place of
/// task-specific data directories.
pub fn set_data_dir_override(data_dir: Option<PathBuf>) {
    *DATA_DIR_OVERRIDE
        .write()
        .unwrap_or_else(PoisonError::into_inner) = data_dir;
}

pub fn data_dir_override() -> Option<PathBuf> {
    DATA_DIR_OVERRIDE
        .read()
        .unwrap_or_else(PoisonError::into_inner)
        .clone()
}

/// Directory used when neither an override nor a task-specific directory is set: `T5DATA_DIR`
/// if defined, `<user cache dir>/.t5data/datasets` otherwise.
pub fn default_data_dir() -> PathBuf {
    match std::env::var_os(DATA_DIR_ENV_VAR) {
        Some(value) if !value.is_empty() => PathBuf::from(value),
        _ => {
            let mut home = dirs::cache_dir().unwrap_or_else(std::env::temp_dir);
            home.push(".t5data");
            home.push("datasets");
            home
        }
    }
}

/// # Reference to a versioned source dataset
/// Parsed from `name[/config]:version`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SourceName {
    pub dataset: String,
    pub config: Option<String>,
    pub version: String,
}

impl SourceName {
    pub fn parse(name: &str) -> Result<SourceName, T5DataError> {
        let (path, version) = name.split_once(':').ok_or_else(|| {
            T5DataError::InvalidConfigurationError(format!(
                "Dataset name '{}' must include a version (name[/config]:version)",
                name
            ))
        })?;
        let (dataset, config) = match path.split_once('/') {
            Some((dataset, config)) => (dataset, Some(config.to_string())),
            None => (path, None),
        };
        if dataset.is_empty() || version.is_empty() || config.as_deref() == Some("") {
            return Err(T5DataError::InvalidConfigurationError(format!(
                "Invalid dataset name '{}'",
                name
            )));
        }
        Ok(SourceName {
            dataset: dataset.to_string(),
            config,
            version: version.to_string(),
        })
    }
}

/// # Lazily initialized dataset loader
/// Gives access to the splits of a source dataset stored as JSON-lines shards. Metadata is read
/// from disk on first use only, and loaders are shared per `(name, data_dir)` pair through
/// `LazyDatasetLoader::get_or_create`.
#[derive(Debug)]
pub struct LazyDatasetLoader {
    name: String,
    source: SourceName,
    data_dir: Option<PathBuf>,
    info: Mutex<Option<Arc<DatasetInfo>>>,
}

impl LazyDatasetLoader {
    /// Creates a standalone loader. Prefer `get_or_create`, which shares loaders and their
    /// metadata across tasks.
    ///
    /// # Arguments
    ///
    /// * `name` - dataset reference, `name[/config]:version`
    /// * `data_dir` - optional task-specific data directory
    pub fn new(name: &str, data_dir: Option<PathBuf>) -> Result<LazyDatasetLoader, T5DataError> {
        Ok(LazyDatasetLoader {
            name: name.to_string(),
            source: SourceName::parse(name)?,
            data_dir,
            info: Mutex::new(None),
        })
    }

    /// Returns the shared loader for `(name, data_dir)`, creating it on first request.
    ///
    /// # Example
    ///
    /// ```no_run
    /// use t5_data::source::LazyDatasetLoader;
    /// # fn main() -> Result<(), t5_data::T5DataError> {
    /// let loader = LazyDatasetLoader::get_or_create("glue/cola:1.0.0", None)?;
    /// let train = loader.load("train", true, Some(42))?;
    /// # Ok(())
    /// # }
    /// ```
    pub fn get_or_create(
        name: &str,
        data_dir: Option<PathBuf>,
    ) -> Result<Arc<LazyDatasetLoader>, T5DataError> {
        let key = (name.to_string(), data_dir.clone());
        let mut loaders = LOADERS.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(loader) = loaders.get(&key) {
            return Ok(loader.clone());
        }
        let loader = Arc::new(LazyDatasetLoader::new(name, data_dir)?);
        loaders.insert(key, loader.clone());
        Ok(loader)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn source(&self) -> &SourceName {
        &self.source
    }

    /// Directory holding the raw datasets. A global override wins over the task-specific
    /// directory, which wins over the default directory.
    pub fn data_dir(&self) -> PathBuf {
        match (data_dir_override(), &self.data_dir) {
            (Some(override_dir), Some(own_dir)) => {
                if &override_dir != own_dir {
                    warn!(
                        "Overriding data_dir of {} ({}) with {}",
                        self.name,
                        own_dir.display(),
                        override_dir.display()
                    );
                }
                override_dir
            }
            (Some(override_dir), None) => override_dir,
            (None, Some(own_dir)) => own_dir.clone(),
            (None, None) => default_data_dir(),
        }
    }

    fn version_dir(&self, config: Option<&str>) -> PathBuf {
        let mut path = self.data_dir();
        path.push(&self.source.dataset);
        if let Some(config) = config {
            path.push(config);
        }
        path.push(&self.source.version);
        path
    }

    /// Dataset metadata, read from `dataset_info.json` on first access
    pub fn info(&self) -> Result<Arc<DatasetInfo>, T5DataError> {
        let mut info = self.info.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(info) = info.as_ref() {
            return Ok(info.clone());
        }
        let path = self
            .version_dir(self.source.config.as_deref())
            .join(DATASET_INFO_FILE);
        debug!("Reading dataset info from {}", path.display());
        let loaded = Arc::new(DatasetInfo::from_file(&path).map_err(|e| {
            T5DataError::DatasetError(format!(
                "Could not read the metadata of {}: {}",
                self.name, e
            ))
        })?);
        *info = Some(loaded.clone());
        Ok(loaded)
    }

    pub fn splits(&self) -> Result<Vec<String>, T5DataError> {
        Ok(self.info()?.split_names())
    }

    /// Checks that the dataset has the requested split
    pub fn verify_split(&self, split: &str) -> Result<(), T5DataError> {
        if self.info()?.split(split).is_none() {
            return Err(T5DataError::DatasetError(format!(
                "{} has no '{}' split",
                self.name, split
            )));
        }
        Ok(())
    }

    /// Shard files of a split. When the dataset declares configurations and none was requested,
    /// the files of every configuration are returned.
    pub fn files(&self, split: &str) -> Result<BTreeSet<PathBuf>, T5DataError> {
        let info = self.info()?;
        let directories = match (&self.source.config, info.configs.is_empty()) {
            (None, false) => info
                .configs
                .iter()
                .map(|config| self.version_dir(Some(config)))
                .collect(),
            (config, _) => vec![self.version_dir(config.as_deref())],
        };

        let prefix = format!("{}-{}.jsonl-", self.source.dataset, split);
        let mut files = BTreeSet::new();
        for directory in directories {
            if !directory.is_dir() {
                continue;
            }
            for entry in fs::read_dir(&directory)? {
                let path = entry?.path();
                let is_shard = path
                    .file_name()
                    .and_then(|file_name| file_name.to_str())
                    .map_or(false, |file_name| {
                        file_name.starts_with(&prefix) && file_name.contains("-of-")
                    });
                if is_shard {
                    files.insert(path);
                }
            }
        }
        if files.is_empty() {
            return Err(T5DataError::DatasetError(format!(
                "No files found for split '{}' of {} in {}",
                split,
                self.name,
                self.data_dir().display()
            )));
        }
        Ok(files)
    }

    /// Loads a split as the interleaving of its shards.
    ///
    /// # Arguments
    ///
    /// * `split` - split name
    /// * `shuffle_files` - randomize the order in which shards are read on every pass
    /// * `seed` - optional seed for the shard order
    pub fn load(
        &self,
        split: &str,
        shuffle_files: bool,
        seed: Option<u64>,
    ) -> Result<Dataset, T5DataError> {
        self.verify_split(split)?;
        let files: Vec<PathBuf> = self.files(split)?.into_iter().collect();
        Ok(interleave_files(files, shuffle_files, seed))
    }

    /// Loads a single shard file
    pub fn load_shard<P: AsRef<Path>>(&self, path: P) -> Dataset {
        Dataset::from_jsonl(path)
    }

    /// Number of examples in a split, `None` when the metadata does not record it
    pub fn size(&self, split: &str) -> Result<Option<u64>, T5DataError> {
        self.verify_split(split)?;
        Ok(self
            .info()?
            .split(split)
            .map(|split| split.num_examples)
            .filter(|count| *count > 0))
    }
}

/// Reads JSON-lines files as one dataset, cycling over the files in blocks. Shuffled file
/// orders differ from one pass to the next.
pub(crate) fn interleave_files(
    files: Vec<PathBuf>,
    shuffle_files: bool,
    seed: Option<u64>,
) -> Dataset {
    let files = Arc::new(files);
    let pass_rng = Arc::new(PassRng::new(seed));
    Dataset::from_fn(move || -> ExampleIterator {
        let mut order: Vec<PathBuf> = files.as_ref().clone();
        if shuffle_files {
            order.shuffle(&mut pass_rng.next_rng());
        }
        let shards = order.into_iter().map(Dataset::from_jsonl).collect();
        Dataset::interleave(shards, SHARD_CYCLE_LENGTH, SHARD_BLOCK_LENGTH).iter()
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_source_names() -> anyhow::Result<()> {
        let plain = SourceName::parse("squad:1.1.0")?;
        assert_eq!(plain.dataset, "squad");
        assert_eq!(plain.config, None);
        assert_eq!(plain.version, "1.1.0");

        let configured = SourceName::parse("glue/cola:1.0.0")?;
        assert_eq!(configured.dataset, "glue");
        assert_eq!(configured.config.as_deref(), Some("cola"));

        assert!(SourceName::parse("squad").is_err());
        assert!(SourceName::parse("squad:").is_err());
        assert!(SourceName::parse("glue/:1.0.0").is_err());
        Ok(())
    }

    #[test]
    fn loaders_are_memoized() -> anyhow::Result<()> {
        let first = LazyDatasetLoader::get_or_create("memo_dataset:1.0.0", None)?;
        let second = LazyDatasetLoader::get_or_create("memo_dataset:1.0.0", None)?;
        let other_dir =
            LazyDatasetLoader::get_or_create("memo_dataset:1.0.0", Some(PathBuf::from("/data")))?;
        assert!(Arc::ptr_eq(&first, &second));
        assert!(!Arc::ptr_eq(&first, &other_dir));
        Ok(())
    }
}
