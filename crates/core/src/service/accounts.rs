//! Account operations exposed to callers.

use serde::{Deserialize, Serialize};
use tracing::info;

use easyacme_common::{AccountId, EasyAcmeError, EasyAcmeResult};

use crate::accounts::{AccountRegistrar, RegisterAccount};
use crate::model::{AccountStatus, AccountView, Page, PageRequest};

/// Filters for [`AccountService::list`]
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountFilter {
    /// Case-insensitive substring of the display name
    pub name: Option<String>,
    pub status: Option<AccountStatus>,
    pub has_eab: Option<bool>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountStats {
    pub total: usize,
    pub valid: usize,
    pub deactivated: usize,
    pub revoked: usize,
}

#[derive(Debug, Clone)]
pub struct AccountService {
    registrar: AccountRegistrar,
}

impl AccountService {
    pub fn new(registrar: AccountRegistrar) -> Self {
        Self { registrar }
    }

    pub fn registrar(&self) -> &AccountRegistrar {
        &self.registrar
    }

    pub async fn register(&self, request: RegisterAccount) -> EasyAcmeResult<AccountView> {
        Ok(self.registrar.register(request).await?.view())
    }

    pub async fn deactivate(&self, id: &AccountId) -> EasyAcmeResult<()> {
        self.registrar.deactivate(id).await
    }

    pub fn get(&self, id: &AccountId) -> EasyAcmeResult<AccountView> {
        Ok(self.registrar.load(id)?.view())
    }

    /// Newest first
    pub fn list(&self, filter: &AccountFilter, page: PageRequest) -> EasyAcmeResult<Page<AccountView>> {
        let needle = filter.name.as_deref().map(str::to_lowercase);
        let mut accounts: Vec<_> = self
            .registrar
            .store()
            .accounts()?
            .into_iter()
            .filter(|a| {
                needle
                    .as_deref()
                    .map_or(true, |n| a.name.to_lowercase().contains(n))
            })
            .filter(|a| filter.status.map_or(true, |s| a.status == s))
            .filter(|a| filter.has_eab.map_or(true, |eab| a.has_eab() == eab))
            .collect();
        accounts.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(page.apply(accounts.iter().map(|a| a.view()).collect()))
    }

    /// Remove the local record; the CA account is left as it is
    pub fn delete(&self, id: &AccountId) -> EasyAcmeResult<()> {
        if !self.registrar.store().delete_account(id)? {
            return Err(EasyAcmeError::not_found("account", id.as_str()));
        }
        info!(account_id = %id, "Deleted account record");
        Ok(())
    }

    pub fn stats(&self) -> EasyAcmeResult<AccountStats> {
        let accounts = self.registrar.store().accounts()?;
        let count = |status| accounts.iter().filter(|a| a.status == status).count();
        Ok(AccountStats {
            total: accounts.len(),
            valid: count(AccountStatus::Valid),
            deactivated: count(AccountStatus::Deactivated),
            revoked: count(AccountStatus::Revoked),
        })
    }
}
