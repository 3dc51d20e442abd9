//! Request-time JWT authentication for axum services.
//!
//! A request flows through a fixed pipeline: the [`TokenResolverChain`] finds a
//! bearer credential, the [`SecretResolver`] turns the configured [`SecretSpec`]
//! into candidate secrets, the [`MultiSecretVerifier`] accepts the first
//! candidate that verifies, the optional [`RevocationChecker`] gets the last
//! word, and the [`ErrorPolicy`] decides what the request sees.
//!
//! ```rust,ignore
//! let config = JwtAuthConfig::new()
//!     .with_secret(SecretSpec::from(["current-secret", "previous-secret"]))
//!     .with_cookie("jwt");
//!
//! let app = Router::new()
//!     .route("/me", get(|auth: AuthContext| async move { Json(auth.claims) }))
//!     .layer(JwtAuthLayer::new(config));
//! ```

pub mod claims;
pub mod codec;
pub mod config;
pub mod error;
pub mod extractors;
pub mod jwks;
pub mod middleware;
pub mod pipeline;
pub mod policy;
pub mod resolver;
pub mod revocation;
pub mod secret;
pub mod state;
pub mod verifier;

pub use claims::VerifiedClaims;
pub use codec::{FailureKind, JsonWebTokenCodec, JwtCodec, UnverifiedToken, VerifyFailure, VerifyOptions};
pub use config::{JwtAuthConfig, DEFAULT_AUTH_SCHEME, DEFAULT_STATE_KEY};
pub use error::{AuthError, AuthResult, BoxError, ConfigError, JwksError};
pub use extractors::AuthContext;
pub use jwks::{JwksProvider, DEFAULT_MIN_REFRESH_INTERVAL};
pub use middleware::{JwtAuthLayer, JwtAuthService};
pub use pipeline::{AuthOutcome, JwtAuth};
pub use policy::{Decision, ErrorPolicy};
pub use resolver::{
    resolver_fn, AuthorizationHeaderResolver, CookieResolver, ResolveError, ResolverAbort,
    TokenResolver, TokenResolverChain,
};
pub use revocation::{DenyList, RevocationCheck, RevocationChecker};
pub use secret::{
    provider_fn, CallbackProvider, ProvidedSecrets, Secret, SecretCallback, SecretProvider,
    SecretResolver, SecretSpec,
};
pub use state::RequestState;
pub use verifier::{CandidateVerifier, MultiSecretVerifier};

/// Re-exported so callers can name algorithms and keys without a direct dependency.
pub use jsonwebtoken::{Algorithm, DecodingKey};
