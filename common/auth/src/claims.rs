use chrono::{DateTime, TimeZone, Utc};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

/// Payload of a token whose signature and registered claims were verified.
///
/// Only the verifier can construct this type.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(transparent)]
pub struct VerifiedClaims(Value);

impl VerifiedClaims {
    pub(crate) fn new(value: Value) -> Self {
        Self(value)
    }

    pub fn as_value(&self) -> &Value {
        &self.0
    }

    pub fn into_value(self) -> Value {
        self.0
    }

    pub fn get(&self, claim: &str) -> Option<&Value> {
        self.0.get(claim)
    }

    pub fn subject(&self) -> Option<&str> {
        self.get("sub").and_then(Value::as_str)
    }

    pub fn issuer(&self) -> Option<&str> {
        self.get("iss").and_then(Value::as_str)
    }

    pub fn token_id(&self) -> Option<&str> {
        self.get("jti").and_then(Value::as_str)
    }

    /// `aud` normalised to a list; a single string becomes one entry.
    pub fn audience(&self) -> Vec<&str> {
        match self.get("aud") {
            Some(Value::String(item)) => vec![item.as_str()],
            Some(Value::Array(items)) => items.iter().filter_map(Value::as_str).collect(),
            _ => Vec::new(),
        }
    }

    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        self.timestamp("exp")
    }

    pub fn issued_at(&self) -> Option<DateTime<Utc>> {
        self.timestamp("iat")
    }

    /// Deserializes the payload into an application claims type.
    pub fn deserialize<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        T::deserialize(&self.0)
    }

    fn timestamp(&self, claim: &str) -> Option<DateTime<Utc>> {
        let seconds = self.get(claim)?.as_i64()?;
        Utc.timestamp_opt(seconds, 0).single()
    }
}
