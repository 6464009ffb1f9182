// Error handling module
// Defines the token lifecycle, transport and configuration error types

use thiserror::Error;

/// Errors raised while obtaining tokens
///
/// Cloneable because the outcome of one refresh is handed to every caller
/// that was waiting for it.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum AuthError {
    /// Nothing is configured or cached that could produce a usable token
    #[error("no credentials available: {0}")]
    NoCredentials(String),

    /// Authorization server refused the grant (4xx or OAuth error payload)
    #[error("token request rejected with status {status}: {}", rejection_summary(.code, .description))]
    GrantRejected {
        status: u16,
        code: String,
        description: String,
    },

    /// Successful status but the body can't be used
    #[error("malformed token response with status {status}: {excerpt}")]
    MalformedResponse {
        status: u16,
        content_type: String,
        excerpt: String,
    },

    /// Server errors that persisted after every retry
    #[error("token endpoint failed with status {status} after {attempts} attempts: {detail}")]
    TransientServer {
        status: u16,
        attempts: u32,
        detail: String,
    },

    /// Caller deadline expired while waiting for a token
    #[error("deadline exceeded while waiting for tokens")]
    DeadlineExceeded,

    /// Token manager was used after close
    #[error("token manager is closed")]
    Closed,

    /// Connection level failure talking to the token endpoint
    #[error("token endpoint transport error: {0}")]
    Transport(String),

    /// In-flight refresh ended without producing a result
    #[error("internal error: {0}")]
    Internal(String),
}

impl AuthError {
    /// Whether retrying the same call later could succeed
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            AuthError::TransientServer { .. }
                | AuthError::DeadlineExceeded
                | AuthError::Transport(_)
        )
    }
}

fn rejection_summary(code: &str, description: &str) -> String {
    match (code.is_empty(), description.is_empty()) {
        (true, true) => "no error details".to_string(),
        (false, true) => code.to_string(),
        (true, false) => description.to_string(),
        (false, false) => format!("{}: {}", code, description),
    }
}

/// Errors returned by an HTTP round trip
#[derive(Error, Debug)]
pub enum TransportError {
    /// No token could be attached, the request was not sent
    #[error("authentication failed: {0}")]
    Auth(#[from] AuthError),

    /// Wrapped transport failed
    #[error("http request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// Token can't be encoded as a header value
    #[error("invalid authorization header: {0}")]
    InvalidHeader(String),
}

/// Invalid construction parameters
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("token URL is required")]
    MissingTokenUrl,

    #[error("invalid token URL '{url}': {reason}")]
    InvalidTokenUrl { url: String, reason: String },

    #[error("{0}")]
    IncompleteIdentity(String),

    #[error("user credentials and client credentials are mutually exclusive")]
    ConflictingIdentity,

    #[error("at most two tokens can be provided, got {0}")]
    TooManyTokens(usize),

    #[error("token type '{0}' is not supported")]
    UnsupportedTokenType(String),

    #[error("failed to load trusted CA '{path}': {reason}")]
    TrustedCa { path: String, reason: String },

    #[error("retry policy must allow at least one attempt")]
    NoAttempts,

    #[error("retry jitter must be a finite, non-negative fraction, got {0}")]
    InvalidJitter(f64),

    #[error("{name} must be between 1ms and {max_secs}s, got {value:?}")]
    InvalidTimeout {
        name: &'static str,
        value: std::time::Duration,
        max_secs: u64,
    },

    #[error("failed to create HTTP client: {0}")]
    HttpClient(String),
}

/// Result type alias for token operations
pub type Result<T> = std::result::Result<T, AuthError>;
