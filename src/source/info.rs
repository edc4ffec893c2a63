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

use crate::common::Config;
use serde::{Deserialize, Serialize};

/// File name of the metadata stored next to the shards of a dataset version
pub const DATASET_INFO_FILE: &str = "dataset_info.json";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
/// # Split metadata
pub struct SplitInfo {
    /// Split name, e.g. `train` or `validation`
    pub name: String,
    /// Number of examples in the split, 0 when unknown
    #[serde(default)]
    pub num_examples: u64,
    /// Number of shard files, used when `shard_lengths` is not provided
    #[serde(default)]
    pub num_shards: Option<usize>,
    /// Number of examples in each shard
    #[serde(default)]
    pub shard_lengths: Vec<u64>,
}

impl SplitInfo {
    /// Number of shard files holding the split
    pub fn num_shards(&self) -> usize {
        if !self.shard_lengths.is_empty() {
            self.shard_lengths.len()
        } else {
            self.num_shards.unwrap_or(1).max(1)
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
/// # Dataset metadata
/// Content of the `dataset_info.json` file of a source dataset version.
pub struct DatasetInfo {
    /// Dataset name
    pub name: String,
    #[serde(default)]
    pub version: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    /// Builder configurations available for the dataset (sub-directories), if any
    #[serde(default)]
    pub configs: Vec<String>,
    pub splits: Vec<SplitInfo>,
}

impl Config for DatasetInfo {}

impl DatasetInfo {
    pub fn split(&self, name: &str) -> Option<&SplitInfo> {
        self.splits.iter().find(|split| split.name == name)
    }

    pub fn split_names(&self) -> Vec<String> {
        self.splits.iter().map(|split| split.name.clone()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shard_count_resolution() -> anyhow::Result<()> {
        let info: DatasetInfo = serde_json::from_str(
            r#"{
                "name": "toy",
                "splits": [
                    {"name": "train", "num_examples": 10, "shard_lengths": [4, 3, 3]},
                    {"name": "validation", "num_examples": 4, "num_shards": 2},
                    {"name": "test"}
                ]
            }"#,
        )?;

        assert_eq!(info.split("train").map(SplitInfo::num_shards), Some(3));
        assert_eq!(info.split("validation").map(SplitInfo::num_shards), Some(2));
        assert_eq!(info.split("test").map(SplitInfo::num_shards), Some(1));
        assert_eq!(info.split("test").map(|split| split.num_examples), Some(0));
        assert!(info.split("other").is_none());
        assert!(info.configs.is_empty());
        Ok(())
    }
}
