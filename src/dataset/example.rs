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
use serde::{Deserialize, Serialize};
use std::collections::btree_map;
use std::collections::BTreeMap;
use std::fmt;
use std::iter::FromIterator;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
/// # Element type of a feature
pub enum FeatureDtype {
    /// UTF-8 text
    String,
    /// Signed 64-bit integers (token ids)
    Int64,
    /// 64-bit floating point numbers (e.g. regression targets)
    Float64,
}

impl fmt::Display for FeatureDtype {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FeatureDtype::String => write!(f, "string"),
            FeatureDtype::Int64 => write!(f, "int64"),
            FeatureDtype::Float64 => write!(f, "float64"),
        }
    }
}

/// # Value of a single example feature
/// Features are either scalars (rank 0) or one-dimensional sequences (rank 1) of text, integers
/// or floats. They serialize to plain JSON values; whole JSON numbers are read as integers.
/// Booleans and nested objects are not supported.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Feature {
    /// Integer scalar
    Int(i64),
    /// Float scalar
    Float(f64),
    /// Integer sequence, typically token ids
    Ints(Vec<i64>),
    /// Float sequence
    Floats(Vec<f64>),
    /// Text scalar
    Text(String),
    /// Text sequence
    TextList(Vec<String>),
}

impl Feature {
    pub fn dtype(&self) -> FeatureDtype {
        match self {
            Feature::Int(_) | Feature::Ints(_) => FeatureDtype::Int64,
            Feature::Float(_) | Feature::Floats(_) => FeatureDtype::Float64,
            Feature::Text(_) | Feature::TextList(_) => FeatureDtype::String,
        }
    }

    pub fn rank(&self) -> usize {
        match self {
            Feature::Int(_) | Feature::Float(_) | Feature::Text(_) => 0,
            Feature::Ints(_) | Feature::Floats(_) | Feature::TextList(_) => 1,
        }
    }

    /// Number of elements held by the feature (1 for scalars)
    pub fn len(&self) -> usize {
        match self {
            Feature::Int(_) | Feature::Float(_) | Feature::Text(_) => 1,
            Feature::Ints(values) => values.len(),
            Feature::Floats(values) => values.len(),
            Feature::TextList(values) => values.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Feature::Text(value) => Some(value.as_str()),
            _ => None,
        }
    }

    pub fn as_tokens(&self) -> Option<&[i64]> {
        match self {
            Feature::Ints(values) => Some(values.as_slice()),
            _ => None,
        }
    }
}

impl From<String> for Feature {
    fn from(value: String) -> Self {
        Feature::Text(value)
    }
}

impl From<&str> for Feature {
    fn from(value: &str) -> Self {
        Feature::Text(value.to_string())
    }
}

impl From<i64> for Feature {
    fn from(value: i64) -> Self {
        Feature::Int(value)
    }
}

impl From<f64> for Feature {
    fn from(value: f64) -> Self {
        Feature::Float(value)
    }
}

impl From<Vec<f64>> for Feature {
    fn from(values: Vec<f64>) -> Self {
        Feature::Floats(values)
    }
}

impl From<Vec<i64>> for Feature {
    fn from(values: Vec<i64>) -> Self {
        Feature::Ints(values)
    }
}

impl From<Vec<String>> for Feature {
    fn from(values: Vec<String>) -> Self {
        Feature::TextList(values)
    }
}

/// # Dataset example
/// Mapping from feature name to feature value, ordered by name. The primary model features are
/// `inputs` and `targets`.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Example(BTreeMap<String, Feature>);

impl Example {
    pub fn new() -> Example {
        Example(BTreeMap::new())
    }

    /// Inserts a feature, returning the previous value stored under the same key
    pub fn insert<K, V>(&mut self, key: K, value: V) -> Option<Feature>
    where
        K: Into<String>,
        V: Into<Feature>,
    {
        self.0.insert(key.into(), value.into())
    }

    /// Builder-style variant of `insert`
    pub fn with<K, V>(mut self, key: K, value: V) -> Example
    where
        K: Into<String>,
        V: Into<Feature>,
    {
        self.insert(key, value);
        self
    }

    pub fn get(&self, key: &str) -> Option<&Feature> {
        self.0.get(key)
    }

    pub fn remove(&mut self, key: &str) -> Option<Feature> {
        self.0.remove(key)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &String> {
        self.0.keys()
    }

    pub fn iter(&self) -> btree_map::Iter<'_, String, Feature> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Keeps only the features for which the predicate returns `true`
    pub fn retain<F>(&mut self, mut predicate: F)
    where
        F: FnMut(&str) -> bool,
    {
        self.0.retain(|key, _| predicate(key));
    }

    /// Returns the text scalar stored under `key`.
    ///
    /// # Errors
    ///
    /// * `ValidationError` if the feature is missing or is not a text scalar
    pub fn text(&self, key: &str) -> Result<&str, T5DataError> {
        match self.0.get(key) {
            Some(Feature::Text(value)) => Ok(value.as_str()),
            Some(other) => Err(T5DataError::ValidationError(format!(
                "Feature '{}' is not a text scalar (got {} rank {})",
                key,
                other.dtype(),
                other.rank()
            ))),
            None => Err(T5DataError::ValidationError(format!(
                "Missing feature '{}'",
                key
            ))),
        }
    }

    /// Returns the integer sequence stored under `key`.
    ///
    /// # Errors
    ///
    /// * `ValidationError` if the feature is missing or is not an integer sequence
    pub fn tokens(&self, key: &str) -> Result<&[i64], T5DataError> {
        match self.0.get(key) {
            Some(Feature::Ints(values)) => Ok(values.as_slice()),
            Some(other) => Err(T5DataError::ValidationError(format!(
                "Feature '{}' is not an integer sequence (got {} rank {})",
                key,
                other.dtype(),
                other.rank()
            ))),
            None => Err(T5DataError::ValidationError(format!(
                "Missing feature '{}'",
                key
            ))),
        }
    }
}

impl From<BTreeMap<String, Feature>> for Example {
    fn from(features: BTreeMap<String, Feature>) -> Self {
        Example(features)
    }
}

impl<K: Into<String>, V: Into<Feature>> FromIterator<(K, V)> for Example {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Example(
            iter.into_iter()
                .map(|(key, value)| (key.into(), value.into()))
                .collect(),
        )
    }
}

impl IntoIterator for Example {
    type Item = (String, Feature);
    type IntoIter = btree_map::IntoIter<String, Feature>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

impl<'a> IntoIterator for &'a Example {
    type Item = (&'a String, &'a Feature);
    type IntoIter = btree_map::Iter<'a, String, Feature>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn features_deserialize_from_plain_json() -> anyhow::Result<()> {
        let example: Example = serde_json::from_str(
            r#"{"inputs": "hello", "targets": [4, 5, 6], "idx": 3, "answers": ["a", "b"]}"#,
        )?;

        assert_eq!(example.text("inputs")?, "hello");
        assert_eq!(example.tokens("targets")?, &[4, 5, 6]);
        assert_eq!(example.get("idx"), Some(&Feature::Int(3)));
        assert_eq!(
            example.get("answers"),
            Some(&Feature::TextList(vec!["a".to_string(), "b".to_string()]))
        );
        Ok(())
    }

    #[test]
    fn float_labels_deserialize() -> anyhow::Result<()> {
        let example: Example =
            serde_json::from_str(r#"{"label": 3.8, "scores": [0.5, 1], "idx": 7}"#)?;

        assert_eq!(example.get("label"), Some(&Feature::Float(3.8)));
        assert_eq!(example.get("scores"), Some(&Feature::Floats(vec![0.5, 1.0])));
        assert_eq!(example.get("idx"), Some(&Feature::Int(7)));
        assert_eq!(Feature::Float(3.8).dtype(), FeatureDtype::Float64);
        assert_eq!(Feature::Floats(vec![]).rank(), 1);
        assert!(serde_json::from_str::<Example>(r#"{"flag": true}"#).is_err());
        Ok(())
    }

    #[test]
    fn typed_accessors_report_mismatches() {
        let example = Example::new().with("inputs", "text").with("targets", vec![1i64]);

        assert!(matches!(
            example.tokens("inputs"),
            Err(T5DataError::ValidationError(_))
        ));
        assert!(matches!(
            example.text("targets"),
            Err(T5DataError::ValidationError(_))
        ));
        assert!(matches!(
            example.text("missing"),
            Err(T5DataError::ValidationError(_))
        ));
    }

    #[test]
    fn dtype_and_rank() {
        assert_eq!(Feature::from("a").dtype(), FeatureDtype::String);
        assert_eq!(Feature::from("a").rank(), 0);
        assert_eq!(Feature::from(vec![1i64, 2]).dtype(), FeatureDtype::Int64);
        assert_eq!(Feature::from(vec![1i64, 2]).rank(), 1);
        assert_eq!(Feature::from(vec![1i64, 2]).len(), 2);
    }
}
