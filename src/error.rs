//! Error types for the Looker runtime library.
//!
//! This module provides a unified error type with explicit variants for
//! configuration, authentication, transport, response, and decode errors.

use std::fmt;
use thiserror::Error;

/// The unified error type for runtime operations.
///
/// Every failure mode of the request executor surfaces through this type,
/// with explicit variants so callers can handle specific cases. Nothing is
/// retried internally; errors reach the immediate caller verbatim.
#[derive(Debug, Error)]
pub enum Error {
    /// Settings file could not be read or parsed.
    #[error("config error: {0}")]
    Config(#[from] ConfigError),

    /// Login, token exchange, or interactive authorization failed.
    #[error("auth error: {0}")]
    Auth(#[from] AuthError),

    /// Network transport errors (connection, TLS, timeout, cancellation).
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    /// The server answered with a non-success status.
    #[error("{0}")]
    Response(#[from] ResponseError),

    /// The response body could not be decoded into the requested shape.
    #[error("decode error: {0}")]
    Decode(#[from] DecodeError),
}

/// Settings resolution errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The settings file could not be read or parsed.
    #[error("failed to read settings file: {0}")]
    File(#[from] config::ConfigError),

    /// The requested section does not exist in the settings file.
    #[error("no section named '{section}' in settings file")]
    MissingSection { section: String },

    /// A recognized key holds a value of the wrong shape.
    #[error("invalid value for '{key}': {value:?}")]
    InvalidValue { key: &'static str, value: String },
}

/// Authentication errors.
#[derive(Debug, Error)]
pub enum AuthError {
    /// The login endpoint rejected the client credentials.
    #[error("login failed: status={status}. error={body}")]
    LoginFailed { status: u16, body: String },

    /// An OAuth token exchange or refresh failed.
    #[error("token exchange failed: {0}")]
    TokenExchange(String),

    /// The session has no usable credential and no refresh path.
    #[error("session expired and no refresh token is available")]
    SessionExpired,

    /// The redirect arrived without an authorization code.
    #[error("authorization failed: no code received")]
    NoAuthCode,

    /// No redirect arrived within the interactive-flow deadline.
    #[error("timed out waiting for authorization code")]
    RedirectTimeout,

    /// The loopback redirect listener could not be started or serviced.
    #[error("redirect listener error: {0}")]
    Listener(String),

    /// An auth, token, or redirect endpoint URL is malformed.
    #[error("invalid {kind} endpoint: {reason}")]
    InvalidEndpoint { kind: &'static str, reason: String },
}

/// Transport-level errors.
#[derive(Debug, Error)]
pub enum TransportError {
    /// Network connection failed.
    #[error("connection failed: {message}")]
    Connection { message: String },

    /// The effective deadline elapsed before the call completed.
    #[error("deadline exceeded after {seconds}s")]
    DeadlineExceeded { seconds: u64 },

    /// The transport layer reported a timeout of its own, outside the
    /// executor's deadline.
    #[error("request timed out")]
    Timeout,

    /// The call was aborted through an explicit cancellation handle.
    #[error("request cancelled")]
    Cancelled,

    /// Generic HTTP error.
    #[error("HTTP error: {message}")]
    Http { message: String },
}

impl From<reqwest::Error> for TransportError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            TransportError::Timeout
        } else if err.is_connect() {
            TransportError::Connection {
                message: err.to_string(),
            }
        } else {
            TransportError::Http {
                message: err.to_string(),
            }
        }
    }
}

impl From<reqwest::Error> for Error {
    fn from(err: reqwest::Error) -> Self {
        Error::Transport(TransportError::from(err))
    }
}

/// A non-success HTTP response, carrying the status line and raw body text.
///
/// The body is never parsed or truncated; callers that need structured
/// error detail can decode it themselves.
#[derive(Debug)]
pub struct ResponseError {
    /// HTTP status of the response.
    pub status: reqwest::StatusCode,
    /// Raw response body text.
    pub body: String,
}

impl ResponseError {
    pub(crate) fn new(status: reqwest::StatusCode, body: String) -> Self {
        Self { status, body }
    }
}

impl fmt::Display for ResponseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "response error. status={}. error={}", self.status, self.body)
    }
}

impl std::error::Error for ResponseError {}

/// Response decoding errors.
#[derive(Debug, Error)]
pub enum DecodeError {
    /// The body is not valid JSON.
    #[error("malformed JSON response: {0}")]
    Json(#[source] serde_json::Error),

    /// The JSON does not fit the destination shape, including failed
    /// string/number coercions and malformed delimited lists.
    #[error("response shape mismatch: {0}")]
    Shape(#[source] serde_json::Error),
}
