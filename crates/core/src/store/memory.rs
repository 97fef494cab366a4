use chrono::Utc;
use parking_lot::RwLock;

use easyacme_common::{AccountId, CertificateId, DnsProviderId};

use super::{Store, StoreError, StoreResult, StoreState};
use crate::model::{Account, AccountStatus, Certificate, CertificateStatus, DnsProviderRecord};

/// In-process store
#[derive(Debug, Default)]
pub struct MemoryStore {
    state: RwLock<StoreState>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_state(state: StoreState) -> Self {
        Self {
            state: RwLock::new(state),
        }
    }

    pub fn snapshot(&self) -> StoreState {
        self.state.read().clone()
    }

    pub fn into_state(self) -> StoreState {
        self.state.into_inner()
    }

    /// Swap in a whole new state
    pub fn replace(&self, state: StoreState) {
        *self.state.write() = state;
    }
}

impl Store for MemoryStore {
    fn insert_account(&self, account: Account) -> StoreResult<()> {
        let mut state = self.state.write();
        if state.accounts.contains_key(&account.id) {
            return Err(StoreError::Duplicate {
                kind: "account",
                id: account.id.to_string(),
            });
        }
        state.accounts.insert(account.id.clone(), account);
        Ok(())
    }

    fn account(&self, id: &AccountId) -> StoreResult<Option<Account>> {
        Ok(self.state.read().accounts.get(id).cloned())
    }

    fn accounts(&self) -> StoreResult<Vec<Account>> {
        Ok(self.state.read().accounts.values().cloned().collect())
    }

    fn set_account_status(&self, id: &AccountId, status: AccountStatus) -> StoreResult<()> {
        let mut state = self.state.write();
        let account = state.accounts.get_mut(id).ok_or_else(|| StoreError::Missing {
            kind: "account",
            id: id.to_string(),
        })?;
        account.status = status;
        account.updated_at = Utc::now();
        Ok(())
    }

    fn delete_account(&self, id: &AccountId) -> StoreResult<bool> {
        Ok(self.state.write().accounts.remove(id).is_some())
    }

    fn insert_certificate(&self, certificate: Certificate) -> StoreResult<()> {
        let mut state = self.state.write();
        if state.certificates.contains_key(&certificate.id) {
            return Err(StoreError::Duplicate {
                kind: "certificate",
                id: certificate.id.to_string(),
            });
        }
        state.certificates.insert(certificate.id.clone(), certificate);
        Ok(())
    }

    fn certificate(&self, id: &CertificateId) -> StoreResult<Option<Certificate>> {
        Ok(self.state.read().certificates.get(id).cloned())
    }

    fn certificates(&self) -> StoreResult<Vec<Certificate>> {
        Ok(self.state.read().certificates.values().cloned().collect())
    }

    fn set_certificate_status(
        &self,
        id: &CertificateId,
        status: CertificateStatus,
    ) -> StoreResult<()> {
        let mut state = self.state.write();
        let cert = state
            .certificates
            .get_mut(id)
            .ok_or_else(|| StoreError::Missing {
                kind: "certificate",
                id: id.to_string(),
            })?;
        if !cert.status.can_transition_to(status) {
            return Err(StoreError::InvalidTransition {
                id: id.to_string(),
                from: cert.status,
                to: status,
            });
        }
        cert.status = status;
        cert.updated_at = Utc::now();
        Ok(())
    }

    fn delete_certificate(&self, id: &CertificateId) -> StoreResult<bool> {
        Ok(self.state.write().certificates.remove(id).is_some())
    }

    fn insert_dns_provider(&self, record: DnsProviderRecord) -> StoreResult<()> {
        let mut state = self.state.write();
        if state.dns_providers.contains_key(&record.id) {
            return Err(StoreError::Duplicate {
                kind: "DNS provider",
                id: record.id.to_string(),
            });
        }
        state.dns_providers.insert(record.id.clone(), record);
        Ok(())
    }

    fn dns_provider(&self, id: &DnsProviderId) -> StoreResult<Option<DnsProviderRecord>> {
        Ok(self.state.read().dns_providers.get(id).cloned())
    }

    fn dns_providers(&self) -> StoreResult<Vec<DnsProviderRecord>> {
        Ok(self.state.read().dns_providers.values().cloned().collect())
    }

    fn update_dns_provider(&self, record: DnsProviderRecord) -> StoreResult<()> {
        let mut state = self.state.write();
        let slot = state
            .dns_providers
            .get_mut(&record.id)
            .ok_or_else(|| StoreError::Missing {
                kind: "DNS provider",
                id: record.id.to_string(),
            })?;
        *slot = record;
        Ok(())
    }

    fn delete_dns_provider(&self, id: &DnsProviderId) -> StoreResult<bool> {
        Ok(self.state.write().dns_providers.remove(id).is_some())
    }
}
