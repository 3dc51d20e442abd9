use axum::response::{IntoResponse, Response};
use http::StatusCode;
use thiserror::Error;

use crate::codec::FailureKind;
use crate::policy::ErrorPolicy;

pub type AuthResult<T> = Result<T, AuthError>;

/// Error type accepted from integrator-supplied providers and predicates.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

pub(crate) const LABEL_NO_TOKEN: &str = "No authentication token found";
pub(crate) const LABEL_BAD_FORMAT: &str =
    "Bad Authorization header format. Format is \"Authorization: Bearer <token>\"";
pub(crate) const LABEL_SECRET: &str = "Invalid secret";
pub(crate) const LABEL_INVALID_TOKEN: &str = "Invalid token";
pub(crate) const LABEL_REVOKED: &str = "Token revoked";

/// Classified authentication failure.
///
/// `Display` renders the detailed form and is meant for logs. What a client
/// sees is decided by [`ErrorPolicy`], which only exposes [`AuthError::label`]
/// unless debug mode is on.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AuthError {
    #[error("no authentication token found")]
    NoTokenFound,
    #[error("authorization header malformed")]
    MalformedCredentialFormat,
    #[error("secret unavailable: {reason}")]
    SecretUnavailable { reason: String },
    #[error("token verification failed: {reason}")]
    VerificationFailed {
        reason: String,
        kind: FailureKind,
        /// Configured index of the candidate secret whose failure is reported.
        candidate: Option<usize>,
    },
    #[error("token revoked")]
    Revoked,
}

impl AuthError {
    pub fn secret_unavailable(reason: impl Into<String>) -> Self {
        Self::SecretUnavailable {
            reason: reason.into(),
        }
    }

    /// Taxonomy label surfaced in production mode.
    pub fn label(&self) -> &'static str {
        match self {
            AuthError::NoTokenFound => LABEL_NO_TOKEN,
            AuthError::MalformedCredentialFormat => LABEL_BAD_FORMAT,
            AuthError::SecretUnavailable { .. } => LABEL_SECRET,
            AuthError::VerificationFailed { .. } => LABEL_INVALID_TOKEN,
            AuthError::Revoked => LABEL_REVOKED,
        }
    }

    /// Underlying reason, only surfaced in debug mode.
    pub fn detail(&self) -> Option<&str> {
        match self {
            AuthError::SecretUnavailable { reason } | AuthError::VerificationFailed { reason, .. } => {
                Some(reason.as_str())
            }
            AuthError::NoTokenFound | AuthError::MalformedCredentialFormat | AuthError::Revoked => {
                None
            }
        }
    }

    /// Stable machine-readable code, sent as `X-Error-Code`.
    pub fn code(&self) -> &'static str {
        match self {
            AuthError::NoTokenFound | AuthError::MalformedCredentialFormat => "AUTH_HEADER",
            AuthError::SecretUnavailable { .. } => "AUTH_SECRET",
            AuthError::VerificationFailed { .. } => "AUTH_TOKEN",
            AuthError::Revoked => "AUTH_REVOKED",
        }
    }

    /// A missing secret is an integrator misconfiguration, not a client error.
    pub fn status(&self) -> StatusCode {
        match self {
            AuthError::SecretUnavailable { .. } => StatusCode::INTERNAL_SERVER_ERROR,
            AuthError::NoTokenFound
            | AuthError::MalformedCredentialFormat
            | AuthError::VerificationFailed { .. }
            | AuthError::Revoked => StatusCode::UNAUTHORIZED,
        }
    }

    pub fn candidate(&self) -> Option<usize> {
        match self {
            AuthError::VerificationFailed { candidate, .. } => *candidate,
            _ => None,
        }
    }
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        ErrorPolicy::default().reject(self)
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid configuration value for {key}: {reason}")]
    Invalid { key: &'static str, reason: String },
}

#[derive(Debug, Error)]
pub enum JwksError {
    #[error("failed to fetch JWKS: {0}")]
    Fetch(String),
    #[error("failed to parse JWKS response: {0}")]
    Decode(String),
    #[error("JWKS entry missing key id (kid)")]
    MissingKid,
    #[error("failed to parse decoding key for kid '{0}': {1}")]
    KeyParse(String, String),
    #[error("no signing key found for kid '{0}'")]
    UnknownKeyId(String),
}

/// Uppercases the first character of a reason reported by integrator code.
pub(crate) fn capitalize_first(reason: &str) -> String {
    let mut chars = reason.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}
