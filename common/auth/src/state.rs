use std::collections::HashMap;

use http::Extensions;
use serde_json::Value;

use crate::error::AuthError;
use crate::secret::SecretSpec;

/// Per-request mutable context shared between middleware layers.
///
/// Lives in the request extensions. An upstream layer may place a secret here
/// to override the configured one for this request only.
#[derive(Debug, Clone, Default)]
pub struct RequestState {
    slots: HashMap<String, Value>,
    secret: Option<SecretSpec>,
    auth_error: Option<AuthError>,
}

impl RequestState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_secret(mut self, secret: impl Into<SecretSpec>) -> Self {
        self.secret = Some(secret.into());
        self
    }

    pub fn set_secret(&mut self, secret: impl Into<SecretSpec>) {
        self.secret = Some(secret.into());
    }

    pub fn secret(&self) -> Option<&SecretSpec> {
        self.secret.as_ref()
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.slots.get(key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.slots.contains_key(key)
    }

    pub fn insert(&mut self, key: impl Into<String>, value: Value) -> Option<Value> {
        self.slots.insert(key.into(), value)
    }

    /// Failure recorded when the pipeline ran in passthrough mode.
    pub fn auth_error(&self) -> Option<&AuthError> {
        self.auth_error.as_ref()
    }

    pub fn set_auth_error(&mut self, error: AuthError) {
        self.auth_error = Some(error);
    }

    pub fn from_extensions(extensions: &Extensions) -> Option<&Self> {
        extensions.get::<Self>()
    }

    /// Returns the state stored in `extensions`, inserting an empty one first
    /// if there is none yet.
    pub fn ensure(extensions: &mut Extensions) -> &mut Self {
        extensions.get_or_insert_default::<Self>()
    }
}
