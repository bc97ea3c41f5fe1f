use thiserror::Error;

/// The §7 error-kind taxonomy plus engine-internal variants. `kind()` maps
/// every variant back down to one of the six user-visible kinds so HTTP
/// layers built on top of this crate only need to match on `ErrorKind`.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("validation failed: {0}")]
    Validation(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("unauthenticated")]
    Unauthenticated,

    #[error("forbidden: {0}")]
    Forbidden(String),

    #[error("no available api key")]
    NoAvailableKey,

    #[error("all providers exhausted: {attempted_providers:?}, last error: {last_error}")]
    RouterFailure {
        attempted_providers: Vec<String>,
        last_error: String,
        /// Whether the last attempt before exhaustion was rate-limited —
        /// distinguishes a 503 (retry later) from a 502 (upstream broken).
        rate_limited: bool,
    },

    #[error("embedding dimension mismatch: expected {expected}, got {actual}")]
    EmbeddingDimensionMismatch { expected: usize, actual: usize },

    #[error("upstream provider failure: {0}")]
    UpstreamFailure(String),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("config error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("internal error: {0}")]
    Internal(String),
}

/// The six response-facing categories from spec.md §7.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Validation,
    NotFound,
    Unauthenticated,
    Forbidden,
    UpstreamRateLimit,
    UpstreamFailure,
    Internal,
}

impl EngineError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            EngineError::Validation(_) | EngineError::EmbeddingDimensionMismatch { .. } => {
                ErrorKind::Validation
            }
            EngineError::NotFound(_) => ErrorKind::NotFound,
            EngineError::Unauthenticated => ErrorKind::Unauthenticated,
            EngineError::Forbidden(_) => ErrorKind::Forbidden,
            EngineError::NoAvailableKey => ErrorKind::UpstreamRateLimit,
            EngineError::RouterFailure { rate_limited, .. } => {
                if *rate_limited {
                    ErrorKind::UpstreamRateLimit
                } else {
                    ErrorKind::UpstreamFailure
                }
            }
            EngineError::UpstreamFailure(_) => ErrorKind::UpstreamFailure,
            EngineError::Database(_)
            | EngineError::Http(_)
            | EngineError::Io(_)
            | EngineError::Config(_)
            | EngineError::Internal(_) => ErrorKind::Internal,
        }
    }
}

pub type EngineResult<T> = Result<T, EngineError>;
