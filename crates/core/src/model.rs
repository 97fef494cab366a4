//! Persisted records and their read models.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use easyacme_common::{AccountId, CertificateId, DnsProviderId};

use crate::dns::DnsProviderType;
use crate::engine::{RegistrationResource, Status};
use crate::keys::KeyType;

// ============================================================================
// Accounts
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AccountStatus {
    Pending,
    Valid,
    Deactivated,
    Revoked,
}

impl AccountStatus {
    /// Status recorded after registration, taken from the CA's account body
    pub fn from_ca(status: Option<Status>) -> Self {
        match status {
            Some(Status::Valid) | None => AccountStatus::Valid,
            Some(Status::Deactivated) => AccountStatus::Deactivated,
            Some(Status::Revoked) => AccountStatus::Revoked,
            Some(_) => AccountStatus::Pending,
        }
    }
}

impl fmt::Display for AccountStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            AccountStatus::Pending => "pending",
            AccountStatus::Valid => "valid",
            AccountStatus::Deactivated => "deactivated",
            AccountStatus::Revoked => "revoked",
        };
        f.write_str(s)
    }
}

/// ACME account registered with a CA
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Account {
    pub id: AccountId,
    pub name: String,
    /// PKCS#8 PEM, generated once at registration
    pub private_key: String,
    pub key_type: KeyType,
    /// CA directory URL
    pub server: String,
    pub email: String,
    pub status: AccountStatus,
    pub eab_key_id: Option<String>,
    pub eab_hmac_key: Option<String>,
    pub registration: Option<RegistrationResource>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Account {
    pub fn has_eab(&self) -> bool {
        self.eab_key_id.is_some() && self.eab_hmac_key.is_some()
    }

    pub fn view(&self) -> AccountView {
        AccountView {
            id: self.id.clone(),
            name: self.name.clone(),
            key_type: self.key_type,
            server: self.server.clone(),
            email: self.email.clone(),
            status: self.status,
            eab_key_id: self.eab_key_id.clone(),
            registration_uri: self.registration.as_ref().map(|r| r.uri.clone()),
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }
}

/// Account without key material
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccountView {
    pub id: AccountId,
    pub name: String,
    pub key_type: KeyType,
    pub server: String,
    pub email: String,
    pub status: AccountStatus,
    pub eab_key_id: Option<String>,
    pub registration_uri: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

// ============================================================================
// Certificates
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CertType {
    DV,
    OV,
}

impl fmt::Display for CertType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CertType::DV => f.write_str("DV"),
            CertType::OV => f.write_str("OV"),
        }
    }
}

/// Stored certificate status. Only moves forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CertificateStatus {
    NotIssued,
    Issued,
    Revoked,
}

impl CertificateStatus {
    pub fn can_transition_to(self, next: CertificateStatus) -> bool {
        matches!(
            (self, next),
            (CertificateStatus::NotIssued, CertificateStatus::Issued)
                | (CertificateStatus::Issued, CertificateStatus::Revoked)
        )
    }
}

impl fmt::Display for CertificateStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            CertificateStatus::NotIssued => "not_issued",
            CertificateStatus::Issued => "issued",
            CertificateStatus::Revoked => "revoked",
        };
        f.write_str(s)
    }
}

/// Status as reported to readers; `Expired` is derived, never stored
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EffectiveStatus {
    NotIssued,
    Issued,
    Expired,
    Revoked,
}

/// Issued certificate and its key material
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Certificate {
    pub id: CertificateId,
    /// Ordered; the first entry is the primary name
    pub domains: Vec<String>,
    pub key_type: KeyType,
    pub account_id: AccountId,
    pub dns_provider_id: DnsProviderId,
    pub cert_type: CertType,
    pub status: CertificateStatus,
    pub issued_at: DateTime<Utc>,
    pub validity_days: i64,
    /// URL of the chain that was selected
    pub cert_url: String,
    /// Certificate URL from the order
    pub cert_stable_url: String,
    pub private_key: String,
    pub certificate: String,
    pub issuer_certificate: String,
    pub csr: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Certificate {
    pub fn primary_domain(&self) -> &str {
        self.domains.first().map(String::as_str).unwrap_or_default()
    }

    /// `None` when the stored validity does not fit the calendar
    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        Duration::try_days(self.validity_days).and_then(|d| self.issued_at.checked_add_signed(d))
    }

    pub fn effective_status(&self, now: DateTime<Utc>) -> EffectiveStatus {
        match self.status {
            CertificateStatus::NotIssued => EffectiveStatus::NotIssued,
            CertificateStatus::Revoked => EffectiveStatus::Revoked,
            CertificateStatus::Issued => match self.expires_at() {
                Some(expires_at) if now < expires_at => EffectiveStatus::Issued,
                _ => EffectiveStatus::Expired,
            },
        }
    }

    pub fn view(&self, now: DateTime<Utc>) -> CertificateView {
        CertificateView {
            id: self.id.clone(),
            domains: self.domains.clone(),
            key_type: self.key_type,
            account_id: self.account_id.clone(),
            dns_provider_id: self.dns_provider_id.clone(),
            cert_type: self.cert_type,
            status: self.effective_status(now),
            issued_at: self.issued_at,
            expires_at: self.expires_at(),
            validity_days: self.validity_days,
            cert_url: self.cert_url.clone(),
            certificate: self.certificate.clone(),
            issuer_certificate: self.issuer_certificate.clone(),
            created_at: self.created_at,
        }
    }
}

/// Certificate without its private key, with the computed status
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CertificateView {
    pub id: CertificateId,
    pub domains: Vec<String>,
    pub key_type: KeyType,
    pub account_id: AccountId,
    pub dns_provider_id: DnsProviderId,
    pub cert_type: CertType,
    pub status: EffectiveStatus,
    pub issued_at: DateTime<Utc>,
    pub expires_at: Option<DateTime<Utc>>,
    pub validity_days: i64,
    pub cert_url: String,
    pub certificate: String,
    pub issuer_certificate: String,
    pub created_at: DateTime<Utc>,
}

// ============================================================================
// DNS providers
// ============================================================================

/// Stored DNS API credentials
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DnsProviderRecord {
    pub id: DnsProviderId,
    pub name: String,
    pub provider_type: DnsProviderType,
    pub secret_id: String,
    pub secret_key: String,
    pub notes: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl DnsProviderRecord {
    pub fn view(&self) -> DnsProviderView {
        DnsProviderView {
            id: self.id.clone(),
            name: self.name.clone(),
            provider_type: self.provider_type,
            secret_id: self.secret_id.clone(),
            notes: self.notes.clone(),
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }
}

/// Provider record with the secret key withheld
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DnsProviderView {
    pub id: DnsProviderId,
    pub name: String,
    pub provider_type: DnsProviderType,
    pub secret_id: String,
    pub notes: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Output of the dedicated reveal operation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DnsProviderSecrets {
    pub id: DnsProviderId,
    pub secret_id: String,
    pub secret_key: String,
}

// ============================================================================
// Paging
// ============================================================================

pub const DEFAULT_PAGE_SIZE: usize = 10;

/// 1-based page selection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageRequest {
    pub page: usize,
    pub page_size: usize,
}

impl Default for PageRequest {
    fn default() -> Self {
        Self {
            page: 1,
            page_size: DEFAULT_PAGE_SIZE,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub total: usize,
    pub page: usize,
    pub page_size: usize,
}

impl PageRequest {
    /// Cut one page out of an already filtered, ordered list
    pub fn apply<T>(&self, items: Vec<T>) -> Page<T> {
        let page = self.page.max(1);
        let page_size = if self.page_size == 0 {
            DEFAULT_PAGE_SIZE
        } else {
            self.page_size
        };
        let total = items.len();
        let items = items
            .into_iter()
            .skip((page - 1) * page_size)
            .take(page_size)
            .collect();
        Page {
            items,
            total,
            page,
            page_size,
        }
    }
}
