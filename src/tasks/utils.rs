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
use crate::dataset::{Dataset, Example, Feature};
use crate::vocabulary::Vocabulary;
use std::collections::BTreeSet;
use std::sync::Arc;

/// Suffix appended to the key of the plaintext copy of an encoded feature
pub const PLAINTEXT_SUFFIX: &str = "_plaintext";

/// Encodes the text scalar features whose key is listed in `keys`. Other features pass through
/// unchanged.
///
/// # Arguments
///
/// * `dataset` - dataset to encode
/// * `vocabulary` - vocabulary used for encoding
/// * `keys` - names of the features to encode
/// * `copy_plaintext` - keep a copy of every encoded text under `<key>_plaintext`
///
/// # Example
///
/// ```no_run
/// use std::sync::Arc;
/// use t5_data::dataset::{Dataset, Example};
/// use t5_data::tasks::encode_string_features;
/// use t5_data::vocabulary::ByteVocabulary;
/// let dataset = Dataset::from_examples(vec![Example::new().with("inputs", "hi")]);
/// let encoded = encode_string_features(
///     &dataset,
///     Arc::new(ByteVocabulary::new()),
///     &["inputs".to_string()],
///     true,
/// );
/// ```
pub fn encode_string_features(
    dataset: &Dataset,
    vocabulary: Arc<dyn Vocabulary>,
    keys: &[String],
    copy_plaintext: bool,
) -> Dataset {
    let keys: Arc<BTreeSet<String>> = Arc::new(keys.iter().cloned().collect());
    dataset.map(move |example| -> Result<Example, T5DataError> {
        let mut encoded = Example::new();
        for (key, value) in example {
            match value {
                Feature::Text(text) if keys.contains(&key) => {
                    encoded.insert(key.clone(), vocabulary.encode(&text));
                    if copy_plaintext {
                        encoded.insert(format!("{}{}", key, PLAINTEXT_SUFFIX), text);
                    }
                }
                other => {
                    encoded.insert(key, other);
                }
            }
        }
        Ok(encoded)
    })
}

/// Swaps inputs and targets, prepending `label` to the new inputs. The resulting examples only
/// hold `inputs` and `targets`.
pub fn inverse_dataset(dataset: &Dataset, label: &str) -> Dataset {
    let label = label.to_string();
    dataset.map(move |example| -> Result<Example, T5DataError> {
        Ok(Example::new()
            .with("inputs", format!("{}{}", label, example.text("targets")?))
            .with("targets", example.text("inputs")?))
    })
}
