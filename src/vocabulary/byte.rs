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

use crate::vocabulary::{strip_special_ids, Vocabulary};

/// Number of ids reserved for special tokens ahead of the byte ids
const NUM_SPECIAL_IDS: i64 = 3;

/// # Byte-level vocabulary
/// Every UTF-8 byte `b` is encoded as id `b + 3`, leaving ids 0 to 2 to the special tokens.
/// Invalid UTF-8 produced by decoding arbitrary ids is replaced by U+FFFD.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ByteVocabulary;

impl ByteVocabulary {
    pub fn new() -> ByteVocabulary {
        ByteVocabulary
    }
}

impl Vocabulary for ByteVocabulary {
    fn vocab_size(&self) -> usize {
        256 + NUM_SPECIAL_IDS as usize
    }

    fn encode(&self, text: &str) -> Vec<i64> {
        text.bytes().map(|b| b as i64 + NUM_SPECIAL_IDS).collect()
    }

    fn decode(&self, ids: &[i64]) -> String {
        let bytes: Vec<u8> = strip_special_ids(ids)
            .into_iter()
            .filter(|id| *id >= NUM_SPECIAL_IDS && *id < 256 + NUM_SPECIAL_IDS)
            .map(|id| (id - NUM_SPECIAL_IDS) as u8)
            .collect();
        String::from_utf8_lossy(&bytes).into_owned()
    }

    fn identifier(&self) -> String {
        "byte".to_string()
    }
}
