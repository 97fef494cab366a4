//! Credential shapes for DNS provider APIs.

use std::fmt;

use super::provider::{DnsProviderError, DnsResult};
use crate::model::DnsProviderRecord;

/// Secret identifier and secret key as stored in a provider record.
///
/// How the two fields are used depends on the vendor: a key/secret pair, or
/// a single API token carried in `secret_key`.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct ProviderCredentials {
    pub secret_id: String,
    pub secret_key: String,
}

impl fmt::Debug for ProviderCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderCredentials")
            .field("secret_id", &self.secret_id)
            .field("secret_key", &"<redacted>")
            .finish()
    }
}

impl From<&DnsProviderRecord> for ProviderCredentials {
    fn from(record: &DnsProviderRecord) -> Self {
        Self {
            secret_id: record.secret_id.clone(),
            secret_key: record.secret_key.clone(),
        }
    }
}

impl ProviderCredentials {
    pub fn new(secret_id: impl Into<String>, secret_key: impl Into<String>) -> Self {
        Self {
            secret_id: secret_id.into(),
            secret_key: secret_key.into(),
        }
    }

    /// Single bearer token, carried in the secret key
    pub fn token(&self, provider: &str) -> DnsResult<&str> {
        non_empty(&self.secret_key).ok_or_else(|| {
            DnsProviderError::Credentials(format!("{} requires an API token as secret key", provider))
        })
    }

    /// Key id and secret pair
    pub fn key_pair(&self, provider: &str) -> DnsResult<(&str, &str)> {
        match (non_empty(&self.secret_id), non_empty(&self.secret_key)) {
            (Some(id), Some(key)) => Ok((id, key)),
            _ => Err(DnsProviderError::Credentials(format!(
                "{} requires both a secret id and a secret key",
                provider
            ))),
        }
    }
}

fn non_empty(value: &str) -> Option<&str> {
    let trimmed = value.trim();
    (!trimmed.is_empty()).then_some(trimmed)
}
