use std::sync::Arc;

use futures::stream::{FuturesUnordered, StreamExt};
use tracing::debug;

use crate::claims::VerifiedClaims;
use crate::codec::{JwtCodec, VerifyFailure, VerifyOptions};
use crate::error::{AuthError, AuthResult};
use crate::secret::Secret;

/// Verifies a token against exactly one candidate secret.
#[derive(Clone)]
pub struct CandidateVerifier {
    codec: Arc<dyn JwtCodec>,
    options: VerifyOptions,
}

impl CandidateVerifier {
    pub fn new(codec: Arc<dyn JwtCodec>, options: VerifyOptions) -> Self {
        Self { codec, options }
    }

    pub fn options(&self) -> &VerifyOptions {
        &self.options
    }

    /// Single attempt, no retries.
    pub async fn verify(&self, token: &str, secret: &Secret) -> Result<VerifiedClaims, VerifyFailure> {
        self.codec
            .verify(token, secret, &self.options)
            .await
            .map(VerifiedClaims::new)
    }
}

/// Runs [`CandidateVerifier`] over every candidate; first success wins.
///
/// When every candidate fails, the reported failure is the one of the lowest
/// configured index, regardless of which attempt settled first.
#[derive(Clone)]
pub struct MultiSecretVerifier {
    candidate: CandidateVerifier,
}

impl MultiSecretVerifier {
    pub fn new(candidate: CandidateVerifier) -> Self {
        Self { candidate }
    }

    pub fn candidate_verifier(&self) -> &CandidateVerifier {
        &self.candidate
    }

    pub async fn verify(&self, token: &str, secrets: &[Secret]) -> AuthResult<VerifiedClaims> {
        if secrets.is_empty() {
            return Err(AuthError::secret_unavailable("secret not provided"));
        }

        let mut attempts = secrets
            .iter()
            .enumerate()
            .map(|(index, secret)| async move { (index, self.candidate.verify(token, secret).await) })
            .collect::<FuturesUnordered<_>>();

        let mut failures: Vec<Option<VerifyFailure>> = vec![None; secrets.len()];
        while let Some((index, result)) = attempts.next().await {
            match result {
                Ok(claims) => {
                    debug!(candidate = index, candidates = secrets.len(), "verified JWT successfully");
                    return Ok(claims);
                }
                Err(failure) => failures[index] = Some(failure),
            }
        }

        let (index, failure) = failures
            .into_iter()
            .enumerate()
            .find_map(|(index, failure)| failure.map(|failure| (index, failure)))
            .ok_or_else(|| AuthError::secret_unavailable("secret not provided"))?;

        debug!(
            candidate = index,
            reason = %failure.reason,
            "all candidate secrets rejected token"
        );
        Err(AuthError::VerificationFailed {
            reason: failure.reason,
            kind: failure.kind,
            candidate: Some(index),
        })
    }
}
