use std::fmt;
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use jsonwebtoken::jwk::JwkSet;
use jsonwebtoken::DecodingKey;
use reqwest::Client;
use tracing::{debug, info, warn};

use crate::codec::UnverifiedToken;
use crate::error::{BoxError, JwksError};
use crate::secret::{ProvidedSecrets, Secret, SecretProvider};

/// [`SecretProvider`] backed by a remote JWKS document.
///
/// Keys are cached by `kid`. A token naming an unknown `kid` triggers a
/// refresh, at most once per [`DEFAULT_MIN_REFRESH_INTERVAL`]; a token without
/// a `kid` is checked against every cached key.
#[derive(Clone)]
pub struct JwksProvider {
    client: Client,
    url: String,
    keys: Arc<RwLock<Vec<(String, DecodingKey)>>>,
    min_refresh_interval: Duration,
    last_refresh: Arc<Mutex<Option<Instant>>>,
}

/// Minimum time between refreshes triggered by token lookups.
pub const DEFAULT_MIN_REFRESH_INTERVAL: Duration = Duration::from_secs(30);

impl JwksProvider {
    pub fn new(url: impl Into<String>) -> Self {
        Self::with_client(Client::new(), url)
    }

    pub fn with_client(client: Client, url: impl Into<String>) -> Self {
        Self {
            client,
            url: url.into(),
            keys: Arc::default(),
            min_refresh_interval: DEFAULT_MIN_REFRESH_INTERVAL,
            last_refresh: Arc::default(),
        }
    }

    pub fn with_min_refresh_interval(mut self, interval: Duration) -> Self {
        self.min_refresh_interval = interval;
        self
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Cached key for `kid`, without touching the network.
    pub fn key(&self, kid: &str) -> Option<DecodingKey> {
        self.keys
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .find(|(id, _)| id == kid)
            .map(|(_, key)| key.clone())
    }

    /// Replaces the cache with a fresh copy of the key set and returns the
    /// number of keys loaded. An empty set leaves the cache untouched.
    pub async fn refresh(&self) -> Result<usize, JwksError> {
        *self.last_refresh.lock().unwrap_or_else(PoisonError::into_inner) = Some(Instant::now());
        self.reload().await
    }

    async fn reload(&self) -> Result<usize, JwksError> {
        let keys = self.fetch().await?;
        let count = keys.len();
        if count == 0 {
            warn!(url = %self.url, "JWKS response has no keys, keeping cached keys");
            return Ok(0);
        }
        *self.keys.write().unwrap_or_else(PoisonError::into_inner) = keys;
        info!(url = %self.url, keys = count, "refreshed JWKS");
        Ok(count)
    }

    /// Claims the next lookup-triggered refresh. Only one caller per interval
    /// gets `true`, so concurrent misses share a single fetch.
    fn claim_refresh(&self) -> bool {
        let mut last = self.last_refresh.lock().unwrap_or_else(PoisonError::into_inner);
        match *last {
            Some(at) if at.elapsed() < self.min_refresh_interval => false,
            _ => {
                *last = Some(Instant::now());
                true
            }
        }
    }

    async fn fetch(&self) -> Result<Vec<(String, DecodingKey)>, JwksError> {
        let response = self
            .client
            .get(&self.url)
            .send()
            .await
            .map_err(|err| JwksError::Fetch(err.to_string()))?;

        if !response.status().is_success() {
            return Err(JwksError::Fetch(format!(
                "HTTP {} from {}",
                response.status(),
                self.url
            )));
        }

        let set: JwkSet = response
            .json()
            .await
            .map_err(|err| JwksError::Decode(err.to_string()))?;

        set.keys
            .iter()
            .map(|jwk| -> Result<(String, DecodingKey), JwksError> {
                let kid = jwk.common.key_id.clone().ok_or(JwksError::MissingKid)?;
                let key = DecodingKey::from_jwk(jwk)
                    .map_err(|err| JwksError::KeyParse(kid.clone(), err.to_string()))?;
                Ok((kid, key))
            })
            .collect()
    }

    fn all_keys(&self) -> Vec<Secret> {
        self.keys
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|(_, key)| Secret::Key(key.clone()))
            .collect()
    }
}

impl fmt::Debug for JwksProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JwksProvider")
            .field("url", &self.url)
            .field("min_refresh_interval", &self.min_refresh_interval)
            .finish()
    }
}

#[async_trait]
impl SecretProvider for JwksProvider {
    async fn provide(&self, token: &UnverifiedToken) -> Result<ProvidedSecrets, BoxError> {
        let Some(kid) = token.kid() else {
            let mut keys = self.all_keys();
            if keys.is_empty() && self.claim_refresh() {
                self.reload().await?;
                keys = self.all_keys();
            }
            return Ok(ProvidedSecrets::Many(keys));
        };

        if let Some(key) = self.key(kid) {
            return Ok(Secret::Key(key).into());
        }

        if self.claim_refresh() {
            debug!(kid, "unknown kid, refreshing JWKS");
            self.reload().await?;
        } else {
            debug!(kid, "unknown kid, JWKS refreshed recently");
        }
        self.key(kid)
            .map(|key| Secret::Key(key).into())
            .ok_or_else(|| JwksError::UnknownKeyId(kid.to_string()).into())
    }
}
