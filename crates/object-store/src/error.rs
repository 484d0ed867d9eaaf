//! Transport-level errors of the Swift adapter.
//!
//! Protocol-level outcomes (unauthorized, missing object, unexpected
//! status) are expressed through `common::storage::StorageError`;
//! this enum only covers failures of the adapter itself.

#[derive(Debug, thiserror::Error)]
pub enum SwiftError {
    /// HTTP transport error
    #[error("http transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// Malformed URL
    #[error("invalid url: {0}")]
    Url(#[from] url::ParseError),

    /// The auth response did not carry the expected shape
    #[error("malformed auth response: {0}")]
    MalformedAuthResponse(String),
}
