use std::fmt;
use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use futures::channel::oneshot;
use jsonwebtoken::{Algorithm, DecodingKey};
use tracing::warn;

use crate::codec::{FailureKind, JwtCodec, UnverifiedToken, VerifyFailure};
use crate::error::{capitalize_first, AuthError, AuthResult, BoxError};

const HMAC_ALGORITHMS: &[Algorithm] = &[Algorithm::HS256, Algorithm::HS384, Algorithm::HS512];
const ASYMMETRIC_ALGORITHMS: &[Algorithm] = &[
    Algorithm::RS256,
    Algorithm::RS384,
    Algorithm::RS512,
    Algorithm::PS256,
    Algorithm::PS384,
    Algorithm::PS512,
    Algorithm::ES256,
    Algorithm::ES384,
    Algorithm::EdDSA,
];

/// One concrete candidate secret.
#[derive(Clone)]
pub enum Secret {
    /// Shared HMAC secret, or a PEM-encoded public key.
    Bytes(Vec<u8>),
    /// A decoding key that is ready to use, e.g. built from a JWK.
    Key(DecodingKey),
}

impl Secret {
    fn is_pem(&self) -> bool {
        matches!(self, Secret::Bytes(bytes) if bytes.trim_ascii_start().starts_with(b"-----BEGIN"))
    }

    pub(crate) fn default_algorithms(&self) -> &'static [Algorithm] {
        match self {
            Secret::Bytes(_) if !self.is_pem() => HMAC_ALGORITHMS,
            Secret::Bytes(_) | Secret::Key(_) => ASYMMETRIC_ALGORITHMS,
        }
    }

    pub(crate) fn decoding_key(&self, alg: Algorithm) -> Result<DecodingKey, VerifyFailure> {
        let bytes = match self {
            Secret::Key(key) => return Ok(key.clone()),
            Secret::Bytes(bytes) => bytes,
        };

        let hmac = HMAC_ALGORITHMS.contains(&alg);
        if !self.is_pem() {
            return if hmac {
                Ok(DecodingKey::from_secret(bytes))
            } else {
                Err(VerifyFailure::new(
                    FailureKind::Key,
                    format!("secret must be an asymmetric key when using {alg:?}"),
                ))
            };
        }
        if hmac {
            return Err(VerifyFailure::new(
                FailureKind::Key,
                format!("secret must be a symmetric key when using {alg:?}"),
            ));
        }

        let parsed = match alg {
            Algorithm::ES256 | Algorithm::ES384 => DecodingKey::from_ec_pem(bytes),
            Algorithm::EdDSA => DecodingKey::from_ed_pem(bytes),
            _ => DecodingKey::from_rsa_pem(bytes),
        };
        parsed.map_err(|err| VerifyFailure::new(FailureKind::Key, err.to_string()))
    }
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Secret::Bytes(bytes) => write!(f, "Secret::Bytes(<{} bytes redacted>)", bytes.len()),
            Secret::Key(_) => f.write_str("Secret::Key(<redacted>)"),
        }
    }
}

impl From<&str> for Secret {
    fn from(value: &str) -> Self {
        Secret::Bytes(value.as_bytes().to_vec())
    }
}

impl From<String> for Secret {
    fn from(value: String) -> Self {
        Secret::Bytes(value.into_bytes())
    }
}

impl From<&[u8]> for Secret {
    fn from(value: &[u8]) -> Self {
        Secret::Bytes(value.to_vec())
    }
}

impl From<Vec<u8>> for Secret {
    fn from(value: Vec<u8>) -> Self {
        Secret::Bytes(value)
    }
}

impl From<DecodingKey> for Secret {
    fn from(value: DecodingKey) -> Self {
        Secret::Key(value)
    }
}

/// What a provider hands back: one secret or several, in preference order.
#[derive(Debug, Clone)]
pub enum ProvidedSecrets {
    One(Secret),
    Many(Vec<Secret>),
}

impl ProvidedSecrets {
    pub fn into_vec(self) -> Vec<Secret> {
        match self {
            ProvidedSecrets::One(secret) => vec![secret],
            ProvidedSecrets::Many(secrets) => secrets,
        }
    }
}

impl From<Secret> for ProvidedSecrets {
    fn from(value: Secret) -> Self {
        ProvidedSecrets::One(value)
    }
}

impl From<Vec<Secret>> for ProvidedSecrets {
    fn from(value: Vec<Secret>) -> Self {
        ProvidedSecrets::Many(value)
    }
}

impl From<&str> for ProvidedSecrets {
    fn from(value: &str) -> Self {
        ProvidedSecrets::One(value.into())
    }
}

impl<const N: usize> From<[&str; N]> for ProvidedSecrets {
    fn from(value: [&str; N]) -> Self {
        ProvidedSecrets::Many(value.into_iter().map(Secret::from).collect())
    }
}

/// Resolves secrets dynamically from the unverified token.
#[async_trait]
pub trait SecretProvider: Send + Sync {
    async fn provide(&self, token: &UnverifiedToken) -> Result<ProvidedSecrets, BoxError>;
}

/// Adapter returned by [`provider_fn`].
pub struct FnProvider<F> {
    f: F,
}

/// Wraps an async closure as a [`SecretProvider`].
pub fn provider_fn<F, Fut>(f: F) -> FnProvider<F>
where
    F: Fn(UnverifiedToken) -> Fut + Send + Sync,
    Fut: Future<Output = Result<ProvidedSecrets, BoxError>> + Send + 'static,
{
    FnProvider { f }
}

#[async_trait]
impl<F, Fut> SecretProvider for FnProvider<F>
where
    F: Fn(UnverifiedToken) -> Fut + Send + Sync,
    Fut: Future<Output = Result<ProvidedSecrets, BoxError>> + Send + 'static,
{
    async fn provide(&self, token: &UnverifiedToken) -> Result<ProvidedSecrets, BoxError> {
        (self.f)(token.clone()).await
    }
}

/// Continuation handed to a [`CallbackProvider`].
pub type SecretCallback = Box<dyn FnOnce(Result<ProvidedSecrets, BoxError>) + Send>;

/// Adapts continuation-style secret lookups to [`SecretProvider`].
///
/// The wrapped function must eventually invoke the callback exactly once.
/// Dropping it uncalled is reported as an unavailable secret.
pub struct CallbackProvider<F> {
    f: F,
}

impl<F> CallbackProvider<F>
where
    F: Fn(&UnverifiedToken, SecretCallback) + Send + Sync,
{
    pub fn new(f: F) -> Self {
        Self { f }
    }
}

#[async_trait]
impl<F> SecretProvider for CallbackProvider<F>
where
    F: Fn(&UnverifiedToken, SecretCallback) + Send + Sync,
{
    async fn provide(&self, token: &UnverifiedToken) -> Result<ProvidedSecrets, BoxError> {
        let (tx, rx) = oneshot::channel();
        (self.f)(
            token,
            Box::new(move |result| {
                // The receiver is gone only if the request was dropped.
                let _ = tx.send(result);
            }),
        );
        rx.await
            .map_err(|_| BoxError::from("secret callback dropped without being called"))?
    }
}

/// Secret configuration: fixed values or a provider.
#[derive(Clone)]
pub enum SecretSpec {
    Static(Vec<Secret>),
    Provider(Arc<dyn SecretProvider>),
}

impl SecretSpec {
    pub fn provider<P>(provider: P) -> Self
    where
        P: SecretProvider + 'static,
    {
        SecretSpec::Provider(Arc::new(provider))
    }
}

impl fmt::Debug for SecretSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SecretSpec::Static(secrets) => f.debug_tuple("Static").field(secrets).finish(),
            SecretSpec::Provider(_) => f.write_str("Provider(..)"),
        }
    }
}

impl From<Secret> for SecretSpec {
    fn from(value: Secret) -> Self {
        SecretSpec::Static(vec![value])
    }
}

impl From<Vec<Secret>> for SecretSpec {
    fn from(value: Vec<Secret>) -> Self {
        SecretSpec::Static(value)
    }
}

impl From<&str> for SecretSpec {
    fn from(value: &str) -> Self {
        SecretSpec::Static(vec![value.into()])
    }
}

impl From<String> for SecretSpec {
    fn from(value: String) -> Self {
        SecretSpec::Static(vec![value.into()])
    }
}

impl<const N: usize> From<[&str; N]> for SecretSpec {
    fn from(value: [&str; N]) -> Self {
        SecretSpec::Static(value.into_iter().map(Secret::from).collect())
    }
}

impl From<Arc<dyn SecretProvider>> for SecretSpec {
    fn from(value: Arc<dyn SecretProvider>) -> Self {
        SecretSpec::Provider(value)
    }
}

/// Turns a [`SecretSpec`] into the ordered list of candidate secrets.
#[derive(Clone)]
pub struct SecretResolver {
    configured: Option<SecretSpec>,
    codec: Arc<dyn JwtCodec>,
}

impl SecretResolver {
    pub fn new(configured: Option<SecretSpec>, codec: Arc<dyn JwtCodec>) -> Self {
        Self { configured, codec }
    }

    /// Resolves candidates for `token`. A spec injected upstream for this
    /// request takes precedence over the configured one.
    pub async fn resolve(
        &self,
        upstream: Option<&SecretSpec>,
        token: &str,
    ) -> AuthResult<Vec<Secret>> {
        let spec = upstream
            .or(self.configured.as_ref())
            .ok_or_else(|| AuthError::secret_unavailable("secret not provided"))?;

        let secrets = match spec {
            SecretSpec::Static(secrets) => secrets.clone(),
            SecretSpec::Provider(provider) => {
                let unverified = self.codec.decode(token).map_err(|failure| {
                    AuthError::VerificationFailed {
                        reason: failure.reason,
                        kind: failure.kind,
                        candidate: None,
                    }
                })?;
                provider
                    .provide(&unverified)
                    .await
                    .map_err(|err| {
                        warn!(error = %err, kid = ?unverified.kid(), "secret provider failed");
                        AuthError::secret_unavailable(capitalize_first(&err.to_string()))
                    })?
                    .into_vec()
            }
        };

        if secrets.is_empty() {
            return Err(AuthError::secret_unavailable("secret not provided"));
        }
        Ok(secrets)
    }
}
