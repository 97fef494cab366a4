use parking_lot::Mutex;
use std::path::{Path, PathBuf};
use tracing::{debug, error};

use easyacme_common::{AccountId, CertificateId, DnsProviderId};

use super::{MemoryStore, Store, StoreResult, StoreState};
use crate::model::{Account, AccountStatus, Certificate, CertificateStatus, DnsProviderRecord};

/// Store persisted as one JSON document.
///
/// Reads are served from memory. A mutation is applied to a copy of the
/// current state, written through a temp file and an atomic rename, and only
/// then becomes visible to readers.
#[derive(Debug)]
pub struct JsonFileStore {
    inner: MemoryStore,
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl JsonFileStore {
    /// Open `path`, starting empty when the file does not exist yet
    pub fn open(path: impl Into<PathBuf>) -> StoreResult<Self> {
        let path = path.into();
        let state = match std::fs::read(&path) {
            Ok(bytes) => serde_json::from_slice::<StoreState>(&bytes)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => StoreState::default(),
            Err(e) => return Err(e.into()),
        };
        debug!(
            path = %path.display(),
            accounts = state.accounts.len(),
            certificates = state.certificates.len(),
            dns_providers = state.dns_providers.len(),
            "Opened state file"
        );
        Ok(Self {
            inner: MemoryStore::with_state(state),
            path,
            write_lock: Mutex::new(()),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn write(&self, state: &StoreState) -> StoreResult<()> {
        let bytes = serde_json::to_vec_pretty(state)?;

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let tmp = self.path.with_extension("json.tmp");
        if let Err(e) = std::fs::write(&tmp, &bytes) {
            error!(path = %tmp.display(), error = %e, "Failed to write temp state file");
            let _ = std::fs::remove_file(&tmp);
            return Err(e.into());
        }
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(&tmp, std::fs::Permissions::from_mode(0o600))?;
        }
        if let Err(e) = std::fs::rename(&tmp, &self.path) {
            error!(error = %e, "Failed to rename temp state file");
            let _ = std::fs::remove_file(&tmp);
            return Err(e.into());
        }
        Ok(())
    }

    fn persist<T>(&self, op: impl FnOnce(&MemoryStore) -> StoreResult<T>) -> StoreResult<T> {
        let _guard = self.write_lock.lock();
        let scratch = MemoryStore::with_state(self.inner.snapshot());
        let value = op(&scratch)?;
        let next = scratch.into_state();
        self.write(&next)?;
        self.inner.replace(next);
        Ok(value)
    }
}

impl Store for JsonFileStore {
    fn insert_account(&self, account: Account) -> StoreResult<()> {
        self.persist(|s| s.insert_account(account))
    }

    fn account(&self, id: &AccountId) -> StoreResult<Option<Account>> {
        self.inner.account(id)
    }

    fn accounts(&self) -> StoreResult<Vec<Account>> {
        self.inner.accounts()
    }

    fn set_account_status(&self, id: &AccountId, status: AccountStatus) -> StoreResult<()> {
        self.persist(|s| s.set_account_status(id, status))
    }

    fn delete_account(&self, id: &AccountId) -> StoreResult<bool> {
        self.persist(|s| s.delete_account(id))
    }

    fn insert_certificate(&self, certificate: Certificate) -> StoreResult<()> {
        self.persist(|s| s.insert_certificate(certificate))
    }

    fn certificate(&self, id: &CertificateId) -> StoreResult<Option<Certificate>> {
        self.inner.certificate(id)
    }

    fn certificates(&self) -> StoreResult<Vec<Certificate>> {
        self.inner.certificates()
    }

    fn set_certificate_status(
        &self,
        id: &CertificateId,
        status: CertificateStatus,
    ) -> StoreResult<()> {
        self.persist(|s| s.set_certificate_status(id, status))
    }

    fn delete_certificate(&self, id: &CertificateId) -> StoreResult<bool> {
        self.persist(|s| s.delete_certificate(id))
    }

    fn insert_dns_provider(&self, record: DnsProviderRecord) -> StoreResult<()> {
        self.persist(|s| s.insert_dns_provider(record))
    }

    fn dns_provider(&self, id: &DnsProviderId) -> StoreResult<Option<DnsProviderRecord>> {
        self.inner.dns_provider(id)
    }

    fn dns_providers(&self) -> StoreResult<Vec<DnsProviderRecord>> {
        self.inner.dns_providers()
    }

    fn update_dns_provider(&self, record: DnsProviderRecord) -> StoreResult<()> {
        self.persist(|s| s.update_dns_provider(record))
    }

    fn delete_dns_provider(&self, id: &DnsProviderId) -> StoreResult<bool> {
        self.persist(|s| s.delete_dns_provider(id))
    }
}
