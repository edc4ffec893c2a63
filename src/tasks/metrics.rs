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

//! Built-in metric functions. Metrics take the postprocessed targets and predictions (in the same
//! order) and return named scores.

use std::collections::{BTreeMap, HashMap};

/// Percentage of predictions exactly equal to their target
pub fn accuracy(targets: &[String], predictions: &[String]) -> BTreeMap<String, f64> {
    let total = targets.len().min(predictions.len());
    let correct = targets
        .iter()
        .zip(predictions.iter())
        .filter(|(target, prediction)| target == prediction)
        .count();
    let value = if total == 0 {
        0.0
    } else {
        100.0 * correct as f64 / total as f64
    };
    let mut output = BTreeMap::new();
    output.insert("accuracy".to_string(), value);
    output
}

fn f1_score(target: &str, prediction: &str) -> f64 {
    let target_tokens: Vec<&str> = target.split_whitespace().collect();
    let prediction_tokens: Vec<&str> = prediction.split_whitespace().collect();
    if target_tokens.is_empty() || prediction_tokens.is_empty() {
        return if target_tokens.is_empty() && prediction_tokens.is_empty() {
            1.0
        } else {
            0.0
        };
    }
    let mut counts: HashMap<&str, usize> = HashMap::new();
    for token in target_tokens.iter().copied() {
        *counts.entry(token).or_insert(0) += 1;
    }
    let mut common = 0usize;
    for token in &prediction_tokens {
        if let Some(count) = counts.get_mut(token) {
            if *count > 0 {
                *count -= 1;
                common += 1;
            }
        }
    }
    if common == 0 {
        return 0.0;
    }
    let precision = common as f64 / prediction_tokens.len() as f64;
    let recall = common as f64 / target_tokens.len() as f64;
    2.0 * precision * recall / (precision + recall)
}

/// Mean whitespace-token F1 between every prediction and its target, as a percentage
pub fn token_f1(targets: &[String], predictions: &[String]) -> BTreeMap<String, f64> {
    let scores: Vec<f64> = targets
        .iter()
        .zip(predictions.iter())
        .map(|(target, prediction)| f1_score(target, prediction))
        .collect();
    let value = if scores.is_empty() {
        0.0
    } else {
        100.0 * scores.iter().sum::<f64>() / scores.len() as f64
    };
    let mut output = BTreeMap::new();
    output.insert("f1".to_string(), value);
    output
}
