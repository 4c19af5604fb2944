use reqwest::StatusCode;
use thiserror::Error;

/// Failures produced while talking to a Connect Box.
#[derive(Debug, Error)]
pub enum Error {
    #[error("invalid address {addr:?}: {source}")]
    InvalidAddress {
        addr: String,
        #[source]
        source: url::ParseError,
    },

    #[error("transport failure: {0}")]
    Transport(#[source] Box<dyn std::error::Error + Send + Sync>),

    #[error("request cancelled")]
    Cancelled,

    #[error("unexpected response status {0}")]
    UnexpectedStatus(StatusCode),

    /// The login page request that primes the session cookies failed.
    #[error("login failed: {0}")]
    LoginFailed(#[source] Box<Error>),

    #[error("invalid login response: {0:?}")]
    InvalidLoginResponse(String),

    #[error("session id not found in login response")]
    MissingSessionId,

    #[error("decode failed: {0}")]
    Decode(#[from] DecodeError),
}

impl From<reqwest::Error> for Error {
    fn from(err: reqwest::Error) -> Self {
        Error::Transport(Box::new(err))
    }
}

/// Failures produced while turning a getter response into a record.
///
/// `Xml` means the document is not well-formed or does not have the
/// expected shape; the other variants mean a field was present but its
/// content is unusable.
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("malformed xml: {0}")]
    Xml(#[from] serde_xml_rs::Error),

    #[error("invalid duration string {0:?}")]
    InvalidDuration(String),
}
