//! Ordered token resolution.
//!
//! Resolvers run in order and the first non-empty token wins; later resolvers
//! are never consulted, even if the winning token fails verification.

use std::fmt;
use std::sync::Arc;

use axum::response::{IntoResponse, Response};
use headers::{Cookie, HeaderMapExt};
use http::header::AUTHORIZATION;
use http::request::Parts;
use http::StatusCode;
use tracing::debug;

use crate::config::{JwtAuthConfig, DEFAULT_AUTH_SCHEME};

/// Response a custom resolver uses to end the request on its own terms.
///
/// Status and message are passed through untouched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolverAbort {
    pub status: StatusCode,
    pub message: String,
}

impl ResolverAbort {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }
}

impl IntoResponse for ResolverAbort {
    fn into_response(self) -> Response {
        (self.status, self.message).into_response()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResolveError {
    /// Credential present but not in `<Scheme> <credentials>` form.
    Malformed,
    /// Escape hatch for custom resolvers.
    Abort(ResolverAbort),
}

impl From<ResolverAbort> for ResolveError {
    fn from(value: ResolverAbort) -> Self {
        ResolveError::Abort(value)
    }
}

pub trait TokenResolver: Send + Sync {
    /// Returns the raw token if this resolver found one.
    fn resolve(&self, parts: &Parts, config: &JwtAuthConfig) -> Result<Option<String>, ResolveError>;
}

/// Adapter returned by [`resolver_fn`].
pub struct FnResolver<F> {
    f: F,
}

/// Wraps a closure as a [`TokenResolver`].
pub fn resolver_fn<F>(f: F) -> FnResolver<F>
where
    F: Fn(&Parts, &JwtAuthConfig) -> Result<Option<String>, ResolveError> + Send + Sync,
{
    FnResolver { f }
}

impl<F> TokenResolver for FnResolver<F>
where
    F: Fn(&Parts, &JwtAuthConfig) -> Result<Option<String>, ResolveError> + Send + Sync,
{
    fn resolve(&self, parts: &Parts, config: &JwtAuthConfig) -> Result<Option<String>, ResolveError> {
        (self.f)(parts, config)
    }
}

/// Reads the token from the cookie named in [`JwtAuthConfig::cookie`].
#[derive(Debug, Clone, Copy, Default)]
pub struct CookieResolver;

impl TokenResolver for CookieResolver {
    fn resolve(&self, parts: &Parts, config: &JwtAuthConfig) -> Result<Option<String>, ResolveError> {
        let Some(name) = config.cookie.as_deref() else {
            return Ok(None);
        };
        Ok(parts
            .headers
            .typed_get::<Cookie>()
            .and_then(|cookie| cookie.get(name).map(str::to_owned)))
    }
}

/// Parses `Authorization: <Scheme> <credentials>`.
#[derive(Debug, Clone)]
pub struct AuthorizationHeaderResolver {
    scheme: String,
}

impl AuthorizationHeaderResolver {
    pub fn new() -> Self {
        Self::with_scheme(DEFAULT_AUTH_SCHEME)
    }

    pub fn with_scheme(scheme: impl Into<String>) -> Self {
        Self {
            scheme: scheme.into(),
        }
    }

    fn parse<'a>(&self, value: &'a str) -> Option<&'a str> {
        let mut parts = value.split_whitespace();
        match (parts.next(), parts.next(), parts.next()) {
            (Some(scheme), Some(credentials), None) if scheme.eq_ignore_ascii_case(&self.scheme) => {
                Some(credentials)
            }
            _ => None,
        }
    }
}

impl Default for AuthorizationHeaderResolver {
    fn default() -> Self {
        Self::new()
    }
}

impl TokenResolver for AuthorizationHeaderResolver {
    fn resolve(&self, parts: &Parts, config: &JwtAuthConfig) -> Result<Option<String>, ResolveError> {
        let Some(value) = parts.headers.get(AUTHORIZATION) else {
            return Ok(None);
        };

        let credentials = value.to_str().ok().and_then(|raw| self.parse(raw));
        match credentials {
            Some(token) => Ok(Some(token.to_owned())),
            None if config.passthrough => Ok(None),
            None => Err(ResolveError::Malformed),
        }
    }
}

/// Resolvers in priority order.
#[derive(Clone)]
pub struct TokenResolverChain {
    resolvers: Vec<Arc<dyn TokenResolver>>,
}

impl TokenResolverChain {
    pub fn new(resolvers: Vec<Arc<dyn TokenResolver>>) -> Self {
        Self { resolvers }
    }

    /// Custom resolver first (if any), then cookie, then Authorization header.
    pub fn from_config(config: &JwtAuthConfig) -> Self {
        let mut resolvers: Vec<Arc<dyn TokenResolver>> = vec![
            Arc::new(CookieResolver),
            Arc::new(AuthorizationHeaderResolver::with_scheme(config.scheme.clone())),
        ];
        if let Some(custom) = &config.get_token {
            resolvers.insert(0, custom.clone());
        }
        Self::new(resolvers)
    }

    pub fn len(&self) -> usize {
        self.resolvers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.resolvers.is_empty()
    }

    pub fn resolve(&self, parts: &Parts, config: &JwtAuthConfig) -> Result<Option<String>, ResolveError> {
        for (position, resolver) in self.resolvers.iter().enumerate() {
            if let Some(token) = resolver.resolve(parts, config)? {
                if !token.is_empty() {
                    debug!(resolver = position, "resolved token");
                    return Ok(Some(token));
                }
            }
        }
        Ok(None)
    }
}

impl fmt::Debug for TokenResolverChain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenResolverChain")
            .field("resolvers", &self.resolvers.len())
            .finish()
    }
}
