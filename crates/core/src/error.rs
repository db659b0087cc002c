/// Errors surfaced by the interview engine and its backend clients.
///
/// Validation and not-found failures are local and immediate. Transport
/// failures have already been retried by the time they reach a caller.
/// Malformed-response failures are never retried.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Missing or malformed required input.
    #[error("invalid request: {0}")]
    Validation(String),

    /// Unknown session id, or no open question to answer.
    #[error("not found: {0}")]
    NotFound(String),

    /// The session already produced its final report; no further
    /// operations are accepted.
    #[error("session has already ended")]
    SessionEnded,

    /// Network or non-success HTTP failure talking to a backend, after
    /// retries were exhausted.
    #[error("upstream request failed: {0}")]
    Transport(String),

    /// A required-JSON model response could not be parsed even after
    /// fallback stripping.
    #[error("malformed model response: {0}")]
    MalformedResponse(String),

    /// Session store backend failure.
    #[error("session store failure: {0}")]
    Store(String),
}

impl From<reqwest::Error> for Error {
    fn from(err: reqwest::Error) -> Self {
        Error::Transport(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, Error>;
