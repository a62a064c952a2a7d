//! Error types for pool operations

/// Errors from pool operations and the retry loop built on top of the pool.
///
/// Both exhaustion variants render as `pool_exhausted` to callers; they stay
/// separate so logs and error codes can tell "nothing selectable" apart from
/// "every attempt failed".
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("no usable account: every account is disabled or below the balance threshold")]
    NoUsableAccount,

    #[error("all accounts exhausted after {attempts} attempts")]
    AttemptsExhausted { attempts: usize },

    #[error("account store error: {0}")]
    Store(String),
}

impl Error {
    /// Machine-readable code for API error bodies.
    pub fn code(&self) -> &'static str {
        match self {
            Error::NoUsableAccount => "no_usable_account",
            Error::AttemptsExhausted { .. } => "attempts_exhausted",
            Error::Store(_) => "account_store_error",
        }
    }
}

impl From<freeplay_client::Error> for Error {
    fn from(err: freeplay_client::Error) -> Self {
        Error::Store(err.to_string())
    }
}

/// Result alias for pool operations.
pub type Result<T> = std::result::Result<T, Error>;
