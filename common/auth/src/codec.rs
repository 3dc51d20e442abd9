//! Narrow seam over the JWT primitive.
//!
//! Signature checks and registered-claim validation are delegated to
//! `jsonwebtoken`; everything above this module only sees [`JwtCodec`].

use async_trait::async_trait;
use jsonwebtoken::errors::{Error as JwtError, ErrorKind};
use jsonwebtoken::{decode, decode_header, Algorithm, DecodingKey, Header, Validation};
use serde::Serialize;
use serde_json::Value;

use crate::secret::Secret;

/// Header and payload decoded without any signature check.
///
/// Only used as input to secret providers. Nothing in here is trusted.
#[derive(Debug, Clone, Serialize)]
pub struct UnverifiedToken {
    pub header: Header,
    pub payload: Value,
}

impl UnverifiedToken {
    pub fn kid(&self) -> Option<&str> {
        self.header.kid.as_deref()
    }

    pub fn alg(&self) -> Algorithm {
        self.header.alg
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    Malformed,
    Signature,
    Expired,
    NotActive,
    Audience,
    Issuer,
    Subject,
    Algorithm,
    Key,
    MissingClaim,
    Revocation,
    Other,
}

/// A single failed verification attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifyFailure {
    pub kind: FailureKind,
    pub reason: String,
}

impl VerifyFailure {
    pub fn new(kind: FailureKind, reason: impl Into<String>) -> Self {
        Self {
            kind,
            reason: reason.into(),
        }
    }

    pub fn malformed() -> Self {
        Self::new(FailureKind::Malformed, "jwt malformed")
    }

    fn from_jwt(err: &JwtError, options: &VerifyOptions) -> Self {
        match err.kind() {
            ErrorKind::InvalidSignature => Self::new(FailureKind::Signature, "invalid signature"),
            ErrorKind::ExpiredSignature => Self::new(FailureKind::Expired, "jwt expired"),
            ErrorKind::ImmatureSignature => Self::new(FailureKind::NotActive, "jwt not active"),
            ErrorKind::InvalidAudience => Self::new(
                FailureKind::Audience,
                format!(
                    "jwt audience invalid. expected: {}",
                    options.audience.as_deref().unwrap_or_default().join(" or ")
                ),
            ),
            ErrorKind::InvalidIssuer => Self::new(
                FailureKind::Issuer,
                format!(
                    "jwt issuer invalid. expected: {}",
                    options.issuer.as_deref().unwrap_or_default().join(",")
                ),
            ),
            ErrorKind::InvalidSubject => Self::new(
                FailureKind::Subject,
                format!(
                    "jwt subject invalid. expected: {}",
                    options.subject.as_deref().unwrap_or_default()
                ),
            ),
            ErrorKind::InvalidAlgorithm | ErrorKind::MissingAlgorithm => {
                Self::new(FailureKind::Algorithm, "invalid algorithm")
            }
            ErrorKind::MissingRequiredClaim(claim) => Self::new(
                FailureKind::MissingClaim,
                format!("jwt missing required claim: {claim}"),
            ),
            ErrorKind::InvalidToken
            | ErrorKind::Base64(_)
            | ErrorKind::Json(_)
            | ErrorKind::Utf8(_) => Self::malformed(),
            ErrorKind::InvalidRsaKey(_) | ErrorKind::InvalidEcdsaKey | ErrorKind::InvalidKeyFormat => {
                Self::new(FailureKind::Key, err.to_string())
            }
            _ => Self::new(FailureKind::Other, err.to_string()),
        }
    }
}

/// Verification options handed through to the JWT primitive verbatim.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VerifyOptions {
    /// Accepted `aud` values. `None` skips the audience check.
    pub audience: Option<Vec<String>>,
    /// Accepted `iss` values. `None` skips the issuer check.
    pub issuer: Option<Vec<String>>,
    /// Expected `sub`.
    pub subject: Option<String>,
    /// Allowed algorithms. Empty means "the family matching the secret".
    pub algorithms: Vec<Algorithm>,
    /// Clock skew tolerance in seconds for `exp`/`nbf`.
    pub clock_tolerance: u64,
    pub ignore_expiration: bool,
    pub ignore_not_before: bool,
}

impl VerifyOptions {
    pub(crate) fn allows(&self, alg: Algorithm, secret: &Secret) -> bool {
        if self.algorithms.is_empty() {
            secret.default_algorithms().contains(&alg)
        } else {
            self.algorithms.contains(&alg)
        }
    }

    pub(crate) fn validation(&self, alg: Algorithm) -> Validation {
        let mut validation = Validation::new(alg);
        validation.leeway = self.clock_tolerance;
        validation.required_spec_claims.clear();
        validation.validate_exp = !self.ignore_expiration;
        validation.validate_nbf = !self.ignore_not_before;
        match &self.audience {
            Some(audience) => validation.set_audience(audience.as_slice()),
            None => validation.validate_aud = false,
        }
        if let Some(issuer) = &self.issuer {
            validation.set_issuer(issuer.as_slice());
        }
        validation.sub = self.subject.clone();
        validation
    }
}

/// The external JWT primitive: unverified decode plus single-secret verify.
#[async_trait]
pub trait JwtCodec: Send + Sync {
    /// Decodes header and payload without checking the signature.
    fn decode(&self, token: &str) -> Result<UnverifiedToken, VerifyFailure>;

    /// Verifies `token` against exactly one secret and returns its payload.
    async fn verify(
        &self,
        token: &str,
        secret: &Secret,
        options: &VerifyOptions,
    ) -> Result<Value, VerifyFailure>;
}

/// [`JwtCodec`] backed by the `jsonwebtoken` crate.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonWebTokenCodec;

#[async_trait]
impl JwtCodec for JsonWebTokenCodec {
    fn decode(&self, token: &str) -> Result<UnverifiedToken, VerifyFailure> {
        let header = decode_header(token).map_err(|_| VerifyFailure::malformed())?;

        let mut validation = Validation::new(header.alg);
        validation.insecure_disable_signature_validation();
        validation.validate_exp = false;
        validation.validate_aud = false;
        validation.required_spec_claims.clear();

        let data = decode::<Value>(token, &DecodingKey::from_secret(&[]), &validation)
            .map_err(|_| VerifyFailure::malformed())?;
        Ok(UnverifiedToken {
            header: data.header,
            payload: data.claims,
        })
    }

    async fn verify(
        &self,
        token: &str,
        secret: &Secret,
        options: &VerifyOptions,
    ) -> Result<Value, VerifyFailure> {
        let header = decode_header(token).map_err(|_| VerifyFailure::malformed())?;
        if !options.allows(header.alg, secret) {
            return Err(VerifyFailure::new(FailureKind::Algorithm, "invalid algorithm"));
        }

        let key = secret.decoding_key(header.alg)?;
        let validation = options.validation(header.alg);
        decode::<Value>(token, &key, &validation)
            .map(|data| data.claims)
            .map_err(|err| VerifyFailure::from_jwt(&err, options))
    }
}
