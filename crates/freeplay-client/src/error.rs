//! Error types for Freeplay client operations

/// Errors from upstream calls and the account store.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("HTTP request failed: {0}")]
    Http(String),

    #[error("upstream returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("invalid credentials: {0}")]
    InvalidCredentials(String),

    #[error("account parse error: {0}")]
    AccountParse(String),

    /// The outgoing request could not be built
    #[error("invalid request: {0}")]
    Request(String),

    #[error("I/O error: {0}")]
    Io(String),

    #[error("not found: {0}")]
    NotFound(String),
}

/// Result alias for client operations.
pub type Result<T> = std::result::Result<T, Error>;

impl From<Error> for provider::ProviderError {
    fn from(err: Error) -> Self {
        use provider::ProviderError;
        match err {
            Error::Http(msg) => ProviderError::Transport(msg),
            Error::Status { status, .. } => ProviderError::Status { status },
            Error::InvalidCredentials(msg) => ProviderError::Auth(msg),
            Error::NotFound(msg) => ProviderError::NotFound(msg),
            Error::AccountParse(msg) | Error::Request(msg) | Error::Io(msg) => {
                ProviderError::Parse(msg)
            }
        }
    }
}
