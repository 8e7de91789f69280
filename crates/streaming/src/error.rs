use formats::AssetDecodeError;
use thiserror::Error;

/// Why an asset never became ready.
#[derive(Debug, Error)]
pub enum AssetLoadError {
    #[error("fetch failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("decode failed: {0}")]
    Decode(#[from] AssetDecodeError),
    #[error("load worker failed: {0}")]
    Worker(String),
}
