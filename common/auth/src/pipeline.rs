//! Resolve, verify, check revocation.

use std::sync::Arc;

use http::request::Parts;
use tracing::{debug, instrument};

use crate::claims::VerifiedClaims;
use crate::codec::{JsonWebTokenCodec, JwtCodec};
use crate::config::JwtAuthConfig;
use crate::error::AuthError;
use crate::policy::ErrorPolicy;
use crate::resolver::{ResolveError, ResolverAbort, TokenResolverChain};
use crate::revocation::RevocationChecker;
use crate::secret::SecretResolver;
use crate::state::RequestState;
use crate::verifier::{CandidateVerifier, MultiSecretVerifier};

/// Result of running the pipeline once.
#[derive(Debug, Clone, PartialEq)]
pub enum AuthOutcome {
    Authenticated { claims: VerifiedClaims, token: String },
    Rejected(AuthError),
}

impl AuthOutcome {
    pub fn is_authenticated(&self) -> bool {
        matches!(self, AuthOutcome::Authenticated { .. })
    }

    pub fn error(&self) -> Option<&AuthError> {
        match self {
            AuthOutcome::Rejected(error) => Some(error),
            AuthOutcome::Authenticated { .. } => None,
        }
    }
}

struct Inner {
    config: JwtAuthConfig,
    resolvers: TokenResolverChain,
    secrets: SecretResolver,
    verifier: MultiSecretVerifier,
    revocation: RevocationChecker,
    policy: ErrorPolicy,
}

/// The authentication pipeline, cheap to clone and shared across requests.
#[derive(Clone)]
pub struct JwtAuth {
    inner: Arc<Inner>,
}

impl JwtAuth {
    pub fn new(config: JwtAuthConfig) -> Self {
        Self::with_codec(config, Arc::new(JsonWebTokenCodec))
    }

    /// Builds the pipeline on a custom JWT codec.
    pub fn with_codec(config: JwtAuthConfig, codec: Arc<dyn JwtCodec>) -> Self {
        let resolvers = TokenResolverChain::from_config(&config);
        let secrets = SecretResolver::new(config.secret.clone(), codec.clone());
        let verifier =
            MultiSecretVerifier::new(CandidateVerifier::new(codec, config.verify.clone()));
        let revocation = RevocationChecker::new(config.is_revoked.clone());
        let policy = ErrorPolicy::from_config(&config);

        Self {
            inner: Arc::new(Inner {
                config,
                resolvers,
                secrets,
                verifier,
                revocation,
                policy,
            }),
        }
    }

    pub fn config(&self) -> &JwtAuthConfig {
        &self.inner.config
    }

    pub fn policy(&self) -> &ErrorPolicy {
        &self.inner.policy
    }

    /// Runs the pipeline for one request.
    ///
    /// Only a custom resolver's abort escapes as `Err`; every other failure is
    /// classified into [`AuthOutcome::Rejected`].
    #[instrument(skip_all, fields(method = %parts.method, path = %parts.uri.path()))]
    pub async fn authenticate(&self, parts: &Parts) -> Result<AuthOutcome, ResolverAbort> {
        let inner = &self.inner;

        let token = match inner.resolvers.resolve(parts, &inner.config) {
            Ok(Some(token)) => token,
            Ok(None) => return Ok(AuthOutcome::Rejected(AuthError::NoTokenFound)),
            Err(ResolveError::Malformed) => {
                return Ok(AuthOutcome::Rejected(AuthError::MalformedCredentialFormat))
            }
            Err(ResolveError::Abort(abort)) => {
                debug!(status = %abort.status, "token resolver aborted the request");
                return Err(abort);
            }
        };

        Ok(match self.verify(parts, &token).await {
            Ok(claims) => AuthOutcome::Authenticated { claims, token },
            Err(error) => AuthOutcome::Rejected(error),
        })
    }

    async fn verify(&self, parts: &Parts, token: &str) -> Result<VerifiedClaims, AuthError> {
        let inner = &self.inner;
        let upstream = RequestState::from_extensions(&parts.extensions).and_then(RequestState::secret);

        let secrets = inner.secrets.resolve(upstream, token).await?;
        let claims = inner.verifier.verify(token, &secrets).await?;
        inner.revocation.check(parts, &claims, token).await?;
        Ok(claims)
    }
}
