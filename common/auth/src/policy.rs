use axum::response::{IntoResponse, Response};
use http::header::{HeaderName, HeaderValue};
use http::Extensions;
use serde_json::Value;
use tracing::{debug, warn};

use crate::config::{JwtAuthConfig, DEFAULT_STATE_KEY};
use crate::error::AuthError;
use crate::extractors::AuthContext;
use crate::pipeline::AuthOutcome;
use crate::state::RequestState;

const ERROR_CODE_HEADER: HeaderName = HeaderName::from_static("x-error-code");

/// What the middleware does with the request after authentication ran.
#[derive(Debug)]
pub enum Decision {
    Continue,
    Reject(Response),
}

/// Maps an [`AuthOutcome`] onto the request: state writes on success,
/// rejection or passthrough on failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorPolicy {
    key: String,
    token_key: Option<String>,
    passthrough: bool,
    debug: bool,
}

impl ErrorPolicy {
    pub fn from_config(config: &JwtAuthConfig) -> Self {
        Self {
            key: config.key.clone(),
            token_key: config.token_key.clone(),
            passthrough: config.passthrough,
            debug: config.debug,
        }
    }

    pub fn passthrough(&self) -> bool {
        self.passthrough
    }

    /// Client-facing message, without the trailing newline.
    pub fn message(&self, error: &AuthError) -> String {
        match error.detail() {
            Some(detail) if self.debug => format!("{} - {}", error.label(), detail),
            _ => error.label().to_string(),
        }
    }

    /// Builds the strict-mode response. The error itself is attached to the
    /// response extensions.
    pub fn reject(&self, error: AuthError) -> Response {
        let body = format!("{}\n", self.message(&error));
        let mut response = (error.status(), body).into_response();
        response
            .headers_mut()
            .insert(ERROR_CODE_HEADER, HeaderValue::from_static(error.code()));
        response.extensions_mut().insert(error);
        response
    }

    pub fn decide(&self, outcome: AuthOutcome, extensions: &mut Extensions) -> Decision {
        match outcome {
            AuthOutcome::Authenticated { claims, token } => {
                let state = RequestState::ensure(extensions);
                state.insert(self.key.clone(), claims.as_value().clone());
                // The token slot never overwrites the claims.
                if let Some(token_key) = self.token_key.as_ref().filter(|key| **key != self.key) {
                    state.insert(token_key.clone(), Value::String(token.clone()));
                }
                extensions.insert(AuthContext { claims, token });
                Decision::Continue
            }
            AuthOutcome::Rejected(error) if self.passthrough => {
                debug!(error = %error, "authentication failed, continuing unauthenticated");
                RequestState::ensure(extensions).set_auth_error(error);
                Decision::Continue
            }
            AuthOutcome::Rejected(error) => {
                warn!(
                    error = %error,
                    code = error.code(),
                    status = error.status().as_u16(),
                    "rejected request"
                );
                Decision::Reject(self.reject(error))
            }
        }
    }
}

impl Default for ErrorPolicy {
    fn default() -> Self {
        Self {
            key: DEFAULT_STATE_KEY.to_string(),
            token_key: None,
            passthrough: false,
            debug: false,
        }
    }
}
