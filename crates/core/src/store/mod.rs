//! Persistence for accounts, certificates and DNS provider records.
//!
//! Every operation touches a single row; nothing here needs a transaction.

mod file;
mod memory;

pub use file::JsonFileStore;
pub use memory::MemoryStore;

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::io;
use thiserror::Error;

use easyacme_common::{AccountId, CertificateId, DnsProviderId, EasyAcmeError};

use crate::model::{
    Account, AccountStatus, Certificate, CertificateStatus, DnsProviderRecord,
};

/// Storage-related errors
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("{kind} '{id}' not found")]
    Missing { kind: &'static str, id: String },

    #[error("{kind} '{id}' already exists")]
    Duplicate { kind: &'static str, id: String },

    #[error("certificate '{id}' cannot move from {from} to {to}")]
    InvalidTransition {
        id: String,
        from: CertificateStatus,
        to: CertificateStatus,
    },
}

impl From<serde_json::Error> for StoreError {
    fn from(e: serde_json::Error) -> Self {
        StoreError::Serialization(e.to_string())
    }
}

impl From<StoreError> for EasyAcmeError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Missing { kind, id } => EasyAcmeError::not_found(kind, id),
            StoreError::Duplicate { .. } | StoreError::InvalidTransition { .. } => {
                EasyAcmeError::Conflict(err.to_string())
            }
            other => EasyAcmeError::Storage(other.to_string()),
        }
    }
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Single-row CRUD over the three persisted record types
pub trait Store: Send + Sync + std::fmt::Debug {
    fn insert_account(&self, account: Account) -> StoreResult<()>;
    fn account(&self, id: &AccountId) -> StoreResult<Option<Account>>;
    fn accounts(&self) -> StoreResult<Vec<Account>>;
    fn set_account_status(&self, id: &AccountId, status: AccountStatus) -> StoreResult<()>;
    fn delete_account(&self, id: &AccountId) -> StoreResult<bool>;

    fn insert_certificate(&self, certificate: Certificate) -> StoreResult<()>;
    fn certificate(&self, id: &CertificateId) -> StoreResult<Option<Certificate>>;
    fn certificates(&self) -> StoreResult<Vec<Certificate>>;
    /// Rejects any transition other than `not_issued -> issued -> revoked`
    fn set_certificate_status(
        &self,
        id: &CertificateId,
        status: CertificateStatus,
    ) -> StoreResult<()>;
    fn delete_certificate(&self, id: &CertificateId) -> StoreResult<bool>;

    fn insert_dns_provider(&self, record: DnsProviderRecord) -> StoreResult<()>;
    fn dns_provider(&self, id: &DnsProviderId) -> StoreResult<Option<DnsProviderRecord>>;
    fn dns_providers(&self) -> StoreResult<Vec<DnsProviderRecord>>;
    fn update_dns_provider(&self, record: DnsProviderRecord) -> StoreResult<()>;
    fn delete_dns_provider(&self, id: &DnsProviderId) -> StoreResult<bool>;
}

/// Full store contents; also the on-disk format of [`JsonFileStore`]
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StoreState {
    #[serde(default)]
    pub accounts: BTreeMap<AccountId, Account>,
    #[serde(default)]
    pub certificates: BTreeMap<CertificateId, Certificate>,
    #[serde(default)]
    pub dns_providers: BTreeMap<DnsProviderId, DnsProviderRecord>,
}
