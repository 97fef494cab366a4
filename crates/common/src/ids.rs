//! Type-safe identifier newtypes.
//!
//! These keep account, certificate and DNS provider ids from being mixed up
//! at call sites. All of them are opaque strings on the wire.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// ACME account identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AccountId(String);

impl AccountId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Create a new random account ID
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AccountId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Issued certificate identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CertificateId(String);

impl CertificateId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Create a new random certificate ID
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CertificateId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// DNS provider credential record identifier.
///
/// Certificates issued through the manual DNS-01 flow carry
/// [`DnsProviderId::manual()`] instead of a real record id.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DnsProviderId(String);

impl DnsProviderId {
    const MANUAL: &'static str = "manual";

    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Create a new random provider ID
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Sentinel used by certificates issued without a DNS provider
    pub fn manual() -> Self {
        Self(Self::MANUAL.to_string())
    }

    pub fn is_manual(&self) -> bool {
        self.0 == Self::MANUAL
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DnsProviderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generated_ids_are_unique() {
        assert_ne!(AccountId::generate(), AccountId::generate());
        assert_ne!(CertificateId::generate(), CertificateId::generate());
    }

    #[test]
    fn test_manual_provider_sentinel() {
        assert!(DnsProviderId::manual().is_manual());
        assert!(!DnsProviderId::generate().is_manual());
    }

    #[test]
    fn test_ids_serialize_transparently() {
        let id = AccountId::new("acct-1");
        assert_eq!(serde_json::to_string(&id).unwrap(), "\"acct-1\"");
        assert_eq!(id.to_string(), "acct-1");
    }
}
