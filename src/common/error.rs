use rust_tokenizers::error::TokenizerError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum T5DataError {
    #[error("Endpoint not available error: {0}")]
    FileDownloadError(String),

    #[error("IO error: {0}")]
    IOError(String),

    #[error("Serialization error: {0}")]
    SerializationError(String),

    #[error("Tokenizer error: {0}")]
    TokenizerError(String),

    #[error("Invalid configuration error: {0}")]
    InvalidConfigurationError(String),

    #[error("Registry error: {0}")]
    RegistryError(String),

    #[error("Dataset error: {0}")]
    DatasetError(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Cache error: {0}")]
    CacheError(String),
}

#[cfg(feature = "remote")]
impl From<cached_path::Error> for T5DataError {
    fn from(error: cached_path::Error) -> Self {
        T5DataError::FileDownloadError(error.to_string())
    }
}

impl From<std::io::Error> for T5DataError {
    fn from(error: std::io::Error) -> Self {
        T5DataError::IOError(error.to_string())
    }
}

impl From<serde_json::Error> for T5DataError {
    fn from(error: serde_json::Error) -> Self {
        T5DataError::SerializationError(error.to_string())
    }
}

impl From<TokenizerError> for T5DataError {
    fn from(error: TokenizerError) -> Self {
        T5DataError::TokenizerError(error.to_string())
    }
}
