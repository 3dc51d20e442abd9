use std::env;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use jsonwebtoken::Algorithm;

use crate::codec::VerifyOptions;
use crate::error::ConfigError;
use crate::resolver::TokenResolver;
use crate::revocation::RevocationCheck;
use crate::secret::{Secret, SecretSpec};

/// Request-state slot that receives verified claims unless configured otherwise.
pub const DEFAULT_STATE_KEY: &str = "user";

/// Authorization scheme expected in front of the token.
pub const DEFAULT_AUTH_SCHEME: &str = "Bearer";

/// Runtime configuration for the authentication pipeline.
///
/// Built once at startup and shared read-only between requests.
#[derive(Clone)]
pub struct JwtAuthConfig {
    /// Secret(s) or provider. May be supplied per request through
    /// [`crate::RequestState::with_secret`] instead.
    pub secret: Option<SecretSpec>,
    /// Request-state key for the verified claims.
    pub key: String,
    /// Request-state key for the raw token, if it should be kept.
    pub token_key: Option<String>,
    /// Cookie to read the token from.
    pub cookie: Option<String>,
    /// `Authorization` scheme, matched case-insensitively.
    pub scheme: String,
    /// Custom resolver consulted before the built-in ones.
    pub get_token: Option<Arc<dyn TokenResolver>>,
    pub is_revoked: Option<Arc<dyn RevocationCheck>>,
    /// Continue unauthenticated instead of rejecting.
    pub passthrough: bool,
    /// Surface the underlying failure reason in responses.
    pub debug: bool,
    pub verify: VerifyOptions,
}

impl JwtAuthConfig {
    pub fn new() -> Self {
        Self {
            secret: None,
            key: DEFAULT_STATE_KEY.to_string(),
            token_key: None,
            cookie: None,
            scheme: DEFAULT_AUTH_SCHEME.to_string(),
            get_token: None,
            is_revoked: None,
            passthrough: false,
            debug: false,
            verify: VerifyOptions::default(),
        }
    }

    pub fn with_secret(mut self, secret: impl Into<SecretSpec>) -> Self {
        self.secret = Some(secret.into());
        self
    }

    pub fn with_key(mut self, key: impl Into<String>) -> Self {
        self.key = key.into();
        self
    }

    pub fn with_token_key(mut self, token_key: impl Into<String>) -> Self {
        self.token_key = Some(token_key.into());
        self
    }

    pub fn with_cookie(mut self, cookie: impl Into<String>) -> Self {
        self.cookie = Some(cookie.into());
        self
    }

    pub fn with_scheme(mut self, scheme: impl Into<String>) -> Self {
        self.scheme = scheme.into();
        self
    }

    pub fn with_get_token<R>(mut self, resolver: R) -> Self
    where
        R: TokenResolver + 'static,
    {
        self.get_token = Some(Arc::new(resolver));
        self
    }

    pub fn with_is_revoked<C>(mut self, check: C) -> Self
    where
        C: RevocationCheck + 'static,
    {
        self.is_revoked = Some(Arc::new(check));
        self
    }

    pub fn with_passthrough(mut self, passthrough: bool) -> Self {
        self.passthrough = passthrough;
        self
    }

    pub fn with_debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    pub fn with_audience<I, S>(mut self, audience: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.verify.audience = Some(audience.into_iter().map(Into::into).collect());
        self
    }

    pub fn with_issuer<I, S>(mut self, issuer: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.verify.issuer = Some(issuer.into_iter().map(Into::into).collect());
        self
    }

    pub fn with_subject(mut self, subject: impl Into<String>) -> Self {
        self.verify.subject = Some(subject.into());
        self
    }

    pub fn with_algorithms(mut self, algorithms: impl Into<Vec<Algorithm>>) -> Self {
        self.verify.algorithms = algorithms.into();
        self
    }

    /// Adjust the allowed clock skew for `exp`/`nbf`.
    pub fn with_clock_tolerance(mut self, seconds: u64) -> Self {
        self.verify.clock_tolerance = seconds;
        self
    }

    pub fn with_verify_options(mut self, verify: VerifyOptions) -> Self {
        self.verify = verify;
        self
    }

    /// Loads the static options from `JWT_*` environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Same as [`Self::from_env`] with a custom variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let read = |name: &str| lookup(name).and_then(|value| normalize_optional(&value));
        let mut config = Self::new();

        if let Some(secrets) = read("JWT_SECRET") {
            let secrets = parse_list(&secrets)
                .into_iter()
                .map(Secret::from)
                .collect::<Vec<_>>();
            if !secrets.is_empty() {
                config.secret = Some(SecretSpec::Static(secrets));
            }
        }
        if let Some(key) = read("JWT_STATE_KEY") {
            config.key = key;
        }
        config.token_key = read("JWT_TOKEN_KEY");
        config.cookie = read("JWT_COOKIE");
        if let Some(scheme) = read("JWT_AUTH_SCHEME") {
            config.scheme = scheme;
        }

        if let Some(value) = read("JWT_PASSTHROUGH") {
            config.passthrough = parse_bool("JWT_PASSTHROUGH", &value)?;
        }
        if let Some(value) = read("JWT_DEBUG") {
            config.debug = parse_bool("JWT_DEBUG", &value)?;
        }

        config.verify.audience = read("JWT_AUDIENCE").map(|value| parse_list(&value));
        config.verify.issuer = read("JWT_ISSUER").map(|value| parse_list(&value));
        if let Some(value) = read("JWT_ALGORITHMS") {
            config.verify.algorithms = parse_list(&value)
                .iter()
                .map(|name| {
                    Algorithm::from_str(name).map_err(|err| ConfigError::Invalid {
                        key: "JWT_ALGORITHMS",
                        reason: format!("{name}: {err}"),
                    })
                })
                .collect::<Result<_, _>>()?;
        }
        if let Some(value) = read("JWT_CLOCK_TOLERANCE_SECONDS") {
            config.verify.clock_tolerance =
                value.parse::<u64>().map_err(|err| ConfigError::Invalid {
                    key: "JWT_CLOCK_TOLERANCE_SECONDS",
                    reason: err.to_string(),
                })?;
        }

        Ok(config)
    }
}

impl Default for JwtAuthConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for JwtAuthConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JwtAuthConfig")
            .field("secret", &self.secret)
            .field("key", &self.key)
            .field("token_key", &self.token_key)
            .field("cookie", &self.cookie)
            .field("scheme", &self.scheme)
            .field("get_token", &self.get_token.is_some())
            .field("is_revoked", &self.is_revoked.is_some())
            .field("passthrough", &self.passthrough)
            .field("debug", &self.debug)
            .field("verify", &self.verify)
            .finish()
    }
}

fn normalize_optional(value: &str) -> Option<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

fn parse_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(str::to_string)
        .collect()
}

fn parse_bool(key: &'static str, value: &str) -> Result<bool, ConfigError> {
    match value.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => Err(ConfigError::Invalid {
            key,
            reason: format!("expected a boolean, got '{other}'"),
        }),
    }
}
