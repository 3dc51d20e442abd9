use async_trait::async_trait;
use axum::extract::FromRequestParts;
use http::request::Parts;

use crate::claims::VerifiedClaims;
use crate::error::AuthError;

/// Identity placed on the request by [`crate::JwtAuthLayer`].
///
/// Routes behind a passthrough layer can take `Option<AuthContext>`.
#[derive(Debug, Clone, PartialEq)]
pub struct AuthContext {
    pub claims: VerifiedClaims,
    pub token: String,
}

impl AuthContext {
    pub fn subject(&self) -> Option<&str> {
        self.claims.subject()
    }

    pub fn into_claims(self) -> VerifiedClaims {
        self.claims
    }
}

#[async_trait]
impl<S> FromRequestParts<S> for AuthContext
where
    S: Send + Sync,
{
    type Rejection = AuthError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<AuthContext>()
            .cloned()
            .ok_or(AuthError::NoTokenFound)
    }
}
