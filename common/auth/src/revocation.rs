use std::collections::HashSet;
use std::fmt;
use std::sync::{Arc, PoisonError, RwLock};

use async_trait::async_trait;
use http::request::Parts;
use tracing::warn;

use crate::claims::VerifiedClaims;
use crate::codec::FailureKind;
use crate::error::{capitalize_first, AuthError, AuthResult, BoxError};

/// Decides whether an otherwise valid token has been revoked.
///
/// Only consulted after successful verification.
#[async_trait]
pub trait RevocationCheck: Send + Sync {
    async fn is_revoked(
        &self,
        parts: &Parts,
        claims: &VerifiedClaims,
        token: &str,
    ) -> Result<bool, BoxError>;
}

/// Applies the optional configured [`RevocationCheck`].
#[derive(Clone, Default)]
pub struct RevocationChecker {
    check: Option<Arc<dyn RevocationCheck>>,
}

impl RevocationChecker {
    pub fn new(check: Option<Arc<dyn RevocationCheck>>) -> Self {
        Self { check }
    }

    pub fn is_configured(&self) -> bool {
        self.check.is_some()
    }

    pub async fn check(&self, parts: &Parts, claims: &VerifiedClaims, token: &str) -> AuthResult<()> {
        let Some(check) = &self.check else {
            return Ok(());
        };

        match check.is_revoked(parts, claims, token).await {
            Ok(false) => Ok(()),
            Ok(true) => {
                warn!(sub = ?claims.subject(), jti = ?claims.token_id(), "rejected revoked token");
                Err(AuthError::Revoked)
            }
            Err(err) => {
                warn!(error = %err, "revocation check failed");
                Err(AuthError::VerificationFailed {
                    reason: capitalize_first(&err.to_string()),
                    kind: FailureKind::Revocation,
                    candidate: None,
                })
            }
        }
    }
}

impl fmt::Debug for RevocationChecker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RevocationChecker")
            .field("configured", &self.is_configured())
            .finish()
    }
}

/// In-memory set of revoked token ids (`jti`).
///
/// Tokens without a `jti` are never considered revoked.
#[derive(Debug, Clone, Default)]
pub struct DenyList {
    inner: Arc<RwLock<HashSet<String>>>,
}

impl DenyList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn revoke(&self, jti: impl Into<String>) {
        let mut guard = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        guard.insert(jti.into());
    }

    pub fn restore(&self, jti: &str) -> bool {
        let mut guard = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        guard.remove(jti)
    }

    pub fn contains(&self, jti: &str) -> bool {
        let guard = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        guard.contains(jti)
    }

    pub fn len(&self) -> usize {
        self.inner.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl RevocationCheck for DenyList {
    async fn is_revoked(
        &self,
        _parts: &Parts,
        claims: &VerifiedClaims,
        _token: &str,
    ) -> Result<bool, BoxError> {
        Ok(claims.token_id().is_some_and(|jti| self.contains(jti)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::Request;
    use serde_json::json;

    struct Failing;

    #[async_trait]
    impl RevocationCheck for Failing {
        async fn is_revoked(
            &self,
            _parts: &Parts,
            _claims: &VerifiedClaims,
            _token: &str,
        ) -> Result<bool, BoxError> {
            Err("store unreachable".into())
        }
    }

    fn parts() -> Parts {
        Request::builder().uri("/").body(()).expect("request").into_parts().0
    }

    #[tokio::test]
    async fn unconfigured_checker_allows_everything() {
        let claims = VerifiedClaims::new(json!({ "jti": "a" }));
        assert_eq!(RevocationChecker::default().check(&parts(), &claims, "t").await, Ok(()));
    }

    #[tokio::test]
    async fn deny_list_revokes_by_token_id() {
        let deny = DenyList::new();
        deny.revoke("revoked-id");
        let checker = RevocationChecker::new(Some(Arc::new(deny.clone())));

        let revoked = VerifiedClaims::new(json!({ "jti": "revoked-id" }));
        let fine = VerifiedClaims::new(json!({ "jti": "other" }));
        let anonymous = VerifiedClaims::new(json!({ "foo": "bar" }));

        assert_eq!(
            checker.check(&parts(), &revoked, "t").await,
            Err(AuthError::Revoked)
        );
        assert_eq!(checker.check(&parts(), &fine, "t").await, Ok(()));
        assert_eq!(checker.check(&parts(), &anonymous, "t").await, Ok(()));

        assert!(deny.restore("revoked-id"));
        assert!(deny.is_empty());
        assert_eq!(checker.check(&parts(), &revoked, "t").await, Ok(()));
    }

    #[tokio::test]
    async fn predicate_error_becomes_verification_failure() {
        let checker = RevocationChecker::new(Some(Arc::new(Failing)));
        let claims = VerifiedClaims::new(json!({}));
        let err = checker.check(&parts(), &claims, "t").await.expect_err("fails");
        assert_eq!(err.detail(), Some("Store unreachable"));
        assert_eq!(err.label(), "Invalid token");
    }
}
