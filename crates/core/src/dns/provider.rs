//! DNS provider trait for DNS-01 challenges
//!
//! Defines the interface that all automated DNS providers implement, plus
//! the challenge record naming shared by providers, the precheck and the
//! manual flow.

use async_trait::async_trait;
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::fmt::Debug;
use thiserror::Error;

use easyacme_common::EasyAcmeError;

/// Result type for DNS operations
pub type DnsResult<T> = Result<T, DnsProviderError>;

/// Errors that can occur during DNS provider operations
#[derive(Debug, Error)]
pub enum DnsProviderError {
    /// Authentication failed with the DNS provider
    #[error("Authentication failed: {0}")]
    Authentication(String),

    /// Zone not found for the domain
    #[error("Zone not found for domain '{domain}'")]
    ZoneNotFound { domain: String },

    /// Record creation failed
    #[error("Failed to create TXT record for '{record_name}': {message}")]
    RecordCreation { record_name: String, message: String },

    /// Record deletion failed
    #[error("Failed to delete TXT record '{record_id}': {message}")]
    RecordDeletion { record_id: String, message: String },

    /// API request failed
    #[error("API request failed: {0}")]
    ApiRequest(String),

    /// Rate limited by provider
    #[error("Rate limited by DNS provider, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    /// Request timeout
    #[error("Request timed out after {elapsed_secs}s")]
    Timeout { elapsed_secs: u64 },

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    Configuration(String),

    /// Credential shape does not match the provider type
    #[error("Invalid credentials: {0}")]
    Credentials(String),

    /// Resolver lookup failed
    #[error("DNS lookup failed for '{fqdn}': {message}")]
    Lookup { fqdn: String, message: String },
}

impl DnsProviderError {
    /// Convert into the crate-wide taxonomy, naming the failed operation
    pub fn into_error(self, operation: &str) -> EasyAcmeError {
        match self {
            DnsProviderError::Configuration(_) | DnsProviderError::Credentials(_) => {
                EasyAcmeError::validation(self.to_string())
            }
            other => EasyAcmeError::upstream_with_source(operation, other),
        }
    }
}

/// An automated DNS-01 provider.
///
/// Implementations must be thread-safe; `clean_up` runs even when validation
/// failed and must tolerate records that are already gone.
#[async_trait]
pub trait DnsProvider: Send + Sync + Debug {
    /// Returns the provider name (e.g., "hetzner", "cloudflare")
    fn name(&self) -> &'static str;

    /// Publish the TXT record proving control of `domain`
    async fn present(&self, domain: &str, token: &str, key_authorization: &str) -> DnsResult<()>;

    /// Remove the record created by [`DnsProvider::present`]
    async fn clean_up(&self, domain: &str, token: &str, key_authorization: &str)
        -> DnsResult<()>;
}

/// ACME challenge record name prefix
pub const ACME_CHALLENGE_RECORD: &str = "_acme-challenge";

/// TTL for challenge records where the provider accepts short TTLs
pub const CHALLENGE_TTL: u32 = 60;

/// TTL for providers whose minimum is 600 seconds
pub const DEFAULT_TXT_TTL: u32 = 600;

/// TXT record a domain's DNS-01 challenge is validated against
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChallengeRecord {
    /// Absolute name with trailing dot, e.g. `_acme-challenge.example.com.`
    #[serde(rename = "effectiveFQDN")]
    pub fqdn: String,
    pub value: String,
}

/// Strip the wildcard label; `*.example.com` validates at `example.com`
pub fn normalize_domain(domain: &str) -> &str {
    domain.strip_prefix("*.").unwrap_or(domain)
}

/// Strip the trailing root dot
pub fn unfqdn(name: &str) -> &str {
    name.strip_suffix('.').unwrap_or(name)
}

/// `_acme-challenge.<domain>.`
pub fn challenge_record_fqdn(domain: &str) -> String {
    format!(
        "{}.{}.",
        ACME_CHALLENGE_RECORD,
        unfqdn(normalize_domain(domain))
    )
}

/// `base64url(sha256(key_authorization))` without padding
pub fn challenge_value(key_authorization: &str) -> String {
    URL_SAFE_NO_PAD.encode(Sha256::digest(key_authorization.as_bytes()))
}

/// Record name and value for a domain's DNS-01 challenge
pub fn challenge_record(domain: &str, key_authorization: &str) -> ChallengeRecord {
    ChallengeRecord {
        fqdn: challenge_record_fqdn(domain),
        value: challenge_value(key_authorization),
    }
}

/// Zones that could host `fqdn`, most specific first.
///
/// Single-label suffixes (TLDs) are never candidates.
pub fn candidate_zones(fqdn: &str) -> Vec<&str> {
    let name = unfqdn(fqdn);
    let mut candidates = Vec::new();
    let mut current = name;
    while current.contains('.') {
        candidates.push(current);
        match current.find('.') {
            Some(pos) => current = &current[pos + 1..],
            None => break,
        }
    }
    candidates
}

/// Record name relative to `zone`, `@` for the apex
pub fn relative_record_name(fqdn: &str, zone: &str) -> String {
    let fqdn = unfqdn(fqdn);
    let zone = unfqdn(zone);
    if fqdn == zone {
        "@".to_string()
    } else if let Some(stripped) = fqdn.strip_suffix(&format!(".{}", zone)) {
        stripped.to_string()
    } else {
        fqdn.to_string()
    }
}

/// Where a created record lives, for cleanup
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordRef {
    pub zone: String,
    pub record_id: String,
}

/// Records created by a provider instance, keyed by (fqdn, value)
#[derive(Debug, Default)]
pub struct RecordBook {
    records: Mutex<HashMap<(String, String), RecordRef>>,
}

impl RecordBook {
    pub fn insert(&self, record: &ChallengeRecord, reference: RecordRef) {
        self.records
            .lock()
            .insert((record.fqdn.clone(), record.value.clone()), reference);
    }

    pub fn take(&self, record: &ChallengeRecord) -> Option<RecordRef> {
        self.records
            .lock()
            .remove(&(record.fqdn.clone(), record.value.clone()))
    }
}
