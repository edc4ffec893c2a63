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

//! Built-in text preprocessors. Each function returns a closure suitable for
//! `TaskBuilder::with_text_preprocessor`.

use crate::common::error::T5DataError;
use crate::dataset::{Dataset, Example};
use crate::tasks::utils::inverse_dataset;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Renames features: the output example holds, for every `(new_key, old_key)` pair of `key_map`,
/// the value of `old_key` under `new_key`. Other features are dropped.
///
/// # Example
///
/// ```no_run
/// use t5_data::tasks::preprocessors::rekey;
/// let preprocessor = rekey(&[("inputs", "question"), ("targets", "answer")]);
/// ```
pub fn rekey(key_map: &[(&str, &str)]) -> impl Fn(Dataset) -> Dataset + Send + Sync + 'static {
    let key_map: Arc<BTreeMap<String, String>> = Arc::new(
        key_map
            .iter()
            .map(|(new_key, old_key)| (new_key.to_string(), old_key.to_string()))
            .collect(),
    );
    move |dataset: Dataset| {
        let key_map = key_map.clone();
        dataset.map(move |example| -> Result<Example, T5DataError> {
            let mut rekeyed = Example::new();
            for (new_key, old_key) in key_map.iter() {
                let value = match example.get(old_key) {
                    Some(value) => value.clone(),
                    None => {
                        return Err(T5DataError::ValidationError(format!(
                            "Cannot rekey missing feature '{}' to '{}'",
                            old_key, new_key
                        )))
                    }
                };
                rekeyed.insert(new_key.as_str(), value);
            }
            Ok(rekeyed)
        })
    }
}

/// Prepends `prefix` to the text feature `key`
pub fn add_prefix(key: &str, prefix: &str) -> impl Fn(Dataset) -> Dataset + Send + Sync + 'static {
    let key = key.to_string();
    let prefix = prefix.to_string();
    move |dataset: Dataset| {
        let key = key.clone();
        let prefix = prefix.clone();
        dataset.map(move |mut example| -> Result<Example, T5DataError> {
            let prefixed = format!("{}{}", prefix, example.text(&key)?);
            example.insert(key.as_str(), prefixed);
            Ok(example)
        })
    }
}

fn language_name(code: &str) -> &str {
    match code {
        "de" => "German",
        "en" => "English",
        "es" => "Spanish",
        "fr" => "French",
        "it" => "Italian",
        "ro" => "Romanian",
        "ru" => "Russian",
        "zh" => "Chinese",
        _ => code,
    }
}

/// Builds translation examples from features named after language codes:
/// `{"en": "That is good.", "de": "Das ist gut."}` becomes
/// `{"inputs": "translate English to German: That is good.", "targets": "Das ist gut."}`.
pub fn translate(
    source_language: &str,
    target_language: &str,
) -> impl Fn(Dataset) -> Dataset + Send + Sync + 'static {
    let source_language = source_language.to_string();
    let target_language = target_language.to_string();
    let prefix = format!(
        "translate {} to {}: ",
        language_name(&source_language),
        language_name(&target_language)
    );
    move |dataset: Dataset| {
        let source_language = source_language.clone();
        let target_language = target_language.clone();
        let prefix = prefix.clone();
        dataset.map(move |example| -> Result<Example, T5DataError> {
            Ok(Example::new()
                .with(
                    "inputs",
                    format!("{}{}", prefix, example.text(&source_language)?),
                )
                .with("targets", example.text(&target_language)?))
        })
    }
}

/// Swaps inputs and targets, prepending `label` to the new inputs
pub fn inverse(label: &str) -> impl Fn(Dataset) -> Dataset + Send + Sync + 'static {
    let label = label.to_string();
    move |dataset: Dataset| inverse_dataset(&dataset, &label)
}
