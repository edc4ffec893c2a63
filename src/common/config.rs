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
use crate::source::set_data_dir_override;
use crate::tasks::set_global_cache_dirs;
use serde::{Deserialize, Serialize};
use std::env;
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};

/// Environment variable holding the list of task cache directories
pub const CACHE_DIRS_ENV_VAR: &str = "T5DATA_CACHE_DIRS";
/// Environment variable overriding the raw dataset directory
pub const DATA_DIR_ENV_VAR: &str = "T5DATA_DIR";

/// # Utility to deserialize JSON config files
pub trait Config
where
    for<'de> Self: Deserialize<'de>,
{
    /// Loads a `Config` object from a JSON file.
    ///
    /// # Arguments
    ///
    /// * `path` - `Path` to the configuration JSON file.
    ///
    /// # Example
    ///
    /// ```no_run
    /// use t5_data::common::config::DataConfig;
    /// use t5_data::Config;
    /// let config = DataConfig::from_file("path/to/data_config.json").unwrap();
    /// ```
    fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, T5DataError> {
        let path = path.as_ref();
        let f = File::open(path).map_err(|e| {
            T5DataError::IOError(format!(
                "Could not open configuration file {}: {}",
                path.display(),
                e
            ))
        })?;
        let br = BufReader::new(f);
        let config: Self = serde_json::from_reader(br)?;
        Ok(config)
    }
}

/// # Process-wide data settings
/// Holds the directories searched for preprocessed task caches and an optional override for the
/// directory holding the raw datasets. Loading a `DataConfig` has no effect until `apply` is called.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DataConfig {
    /// Directories searched (in order) for `<dir>/<task name>/COMPLETED`
    #[serde(default)]
    pub cache_dirs: Vec<PathBuf>,
    /// Raw dataset directory used by every dataset source, replacing task-specific directories
    #[serde(default)]
    pub data_dir: Option<PathBuf>,
}

impl Config for DataConfig {}

impl DataConfig {
    /// Builds a configuration from the `T5DATA_CACHE_DIRS` (a platform path list, e.g.
    /// `/a:/b` on Unix) and `T5DATA_DIR` environment variables.
    pub fn from_env() -> DataConfig {
        let cache_dirs = env::var_os(CACHE_DIRS_ENV_VAR)
            .map(|value| {
                env::split_paths(&value)
                    .filter(|path| !path.as_os_str().is_empty())
                    .collect()
            })
            .unwrap_or_default();
        let data_dir = env::var_os(DATA_DIR_ENV_VAR)
            .filter(|value| !value.is_empty())
            .map(PathBuf::from);
        DataConfig {
            cache_dirs,
            data_dir,
        }
    }

    /// Installs the configuration as the process-wide cache directories and data directory
    /// override. An empty `cache_dirs` clears the global cache directories.
    pub fn apply(&self) {
        set_global_cache_dirs(self.cache_dirs.clone());
        set_data_dir_override(self.data_dir.clone());
    }
}
