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
use crate::resources::ResourceProvider;
use crate::vocabulary::{strip_special_ids, Vocabulary};
use rust_tokenizers::tokenizer::{T5Tokenizer, Tokenizer};
use rust_tokenizers::vocab::Vocab;
use std::fmt;
use std::path::{Path, PathBuf};

/// # SentencePiece vocabulary
/// Wraps the T5 SentencePiece tokenizer of `rust_tokenizers`. The vocabulary is identified by the
/// path of its model file.
pub struct SentencePieceVocabulary {
    tokenizer: T5Tokenizer,
    model_path: PathBuf,
}

impl SentencePieceVocabulary {
    /// Loads a vocabulary from a SentencePiece model file (e.g. `spiece.model`).
    ///
    /// # Arguments
    ///
    /// * `path` - path to the SentencePiece model
    ///
    /// # Example
    ///
    /// ```no_run
    /// use t5_data::vocabulary::SentencePieceVocabulary;
    /// # fn main() -> Result<(), t5_data::T5DataError> {
    /// let vocabulary = SentencePieceVocabulary::from_file("path/to/spiece.model")?;
    /// # Ok(())
    /// # }
    /// ```
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<SentencePieceVocabulary, T5DataError> {
        let model_path = path.as_ref().to_path_buf();
        let tokenizer = T5Tokenizer::from_file(&model_path, false)?;
        Ok(SentencePieceVocabulary {
            tokenizer,
            model_path,
        })
    }

    /// Loads a vocabulary from a local or remote resource
    pub fn from_resource(
        resource: &dyn ResourceProvider,
    ) -> Result<SentencePieceVocabulary, T5DataError> {
        SentencePieceVocabulary::from_file(resource.get_local_path()?)
    }

    pub fn model_path(&self) -> &Path {
        &self.model_path
    }
}

impl fmt::Debug for SentencePieceVocabulary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SentencePieceVocabulary")
            .field("model_path", &self.model_path)
            .finish()
    }
}

impl Vocabulary for SentencePieceVocabulary {
    fn vocab_size(&self) -> usize {
        self.tokenizer.vocab().values().len()
    }

    fn encode(&self, text: &str) -> Vec<i64> {
        let tokens = self.tokenizer.tokenize(text);
        self.tokenizer.convert_tokens_to_ids(&tokens)
    }

    fn decode(&self, ids: &[i64]) -> String {
        self.tokenizer.decode(&strip_special_ids(ids), true, true)
    }

    fn identifier(&self) -> String {
        self.model_path.display().to_string()
    }
}
