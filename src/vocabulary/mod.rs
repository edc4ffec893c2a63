//! # Vocabularies
//!
//! Map text to token ids and back. Every vocabulary reserves the same special ids: padding (0),
//! end of sequence (1) and unknown (2). Two implementations are provided:
//! - `SentencePieceVocabulary`, backed by the `rust_tokenizers` T5 SentencePiece tokenizer
//! - `ByteVocabulary`, mapping every UTF-8 byte to its own id
//!
//! ```no_run
//! use t5_data::resources::{RemoteResource, T5VocabResources};
//! use t5_data::vocabulary::{SentencePieceVocabulary, Vocabulary};
//! # fn main() -> Result<(), t5_data::T5DataError> {
//! let resource = RemoteResource::from_pretrained(T5VocabResources::T5_SMALL);
//! let vocabulary = SentencePieceVocabulary::from_resource(&resource)?;
//! let ids = vocabulary.encode("Hello world");
//! let text = vocabulary.decode(&ids);
//! # Ok(())
//! # }
//! ```

mod byte;
mod sentencepiece;

pub use byte::ByteVocabulary;
pub use sentencepiece::SentencePieceVocabulary;

use std::fmt::Debug;

/// Id of the padding token
pub const PAD_ID: i64 = 0;
/// Id of the end-of-sequence token
pub const EOS_ID: i64 = 1;
/// Id of the unknown token
pub const UNK_ID: i64 = 2;

/// # Text <-> token ids mapping
pub trait Vocabulary: Send + Sync + Debug {
    /// Number of ids, special tokens included
    fn vocab_size(&self) -> usize;

    /// Encodes text into token ids, without appending the end-of-sequence token
    fn encode(&self, text: &str) -> Vec<i64>;

    /// Decodes token ids into text. Decoding stops at the first end-of-sequence token and
    /// padding is dropped.
    fn decode(&self, ids: &[i64]) -> String;

    /// Identifies the underlying vocabulary. Two vocabularies with the same identifier produce the
    /// same ids.
    fn identifier(&self) -> String;
}

/// Truncates `ids` at the first end-of-sequence token and removes padding
pub(crate) fn strip_special_ids(ids: &[i64]) -> Vec<i64> {
    ids.iter()
        .take_while(|id| **id != EOS_ID)
        .filter(|id| **id != PAD_ID)
        .copied()
        .collect()
}
