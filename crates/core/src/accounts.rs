//! ACME account registration and deactivation.

use std::sync::Arc;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use easyacme_common::{AccountId, EasyAcmeError, EasyAcmeResult};

use crate::engine::{AcmeEngine, EngineConnector};
use crate::keys::{KeyType, PrivateKey};
use crate::model::{Account, AccountStatus};
use crate::store::Store;

/// Input of [`AccountRegistrar::register`]
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterAccount {
    pub name: String,
    /// CA directory URL; empty selects the configured default
    #[serde(default)]
    pub server: String,
    #[serde(default)]
    pub email: String,
    pub key_type: String,
    #[serde(default, rename = "eabKID")]
    pub eab_key_id: Option<String>,
    #[serde(default)]
    pub eab_hmac_key: Option<String>,
}

/// Generates account keys and manages the account lifecycle at the CA
#[derive(Clone)]
pub struct AccountRegistrar {
    store: Arc<dyn Store>,
    connector: Arc<dyn EngineConnector>,
    default_directory: String,
}

impl std::fmt::Debug for AccountRegistrar {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AccountRegistrar")
            .field("store", &self.store)
            .field("default_directory", &self.default_directory)
            .finish_non_exhaustive()
    }
}

impl AccountRegistrar {
    pub fn new(
        store: Arc<dyn Store>,
        connector: Arc<dyn EngineConnector>,
        default_directory: impl Into<String>,
    ) -> Self {
        Self {
            store,
            connector,
            default_directory: default_directory.into(),
        }
    }

    pub fn store(&self) -> &Arc<dyn Store> {
        &self.store
    }

    /// Generate a key, register it with the CA and persist the account
    pub async fn register(&self, request: RegisterAccount) -> EasyAcmeResult<Account> {
        let name = request.name.trim();
        if name.is_empty() {
            return Err(EasyAcmeError::validation("account name is required"));
        }
        let key_type: KeyType = request.key_type.parse()?;
        let eab = match (non_empty(&request.eab_key_id), non_empty(&request.eab_hmac_key)) {
            (Some(kid), Some(hmac)) => Some((kid.to_string(), hmac.to_string())),
            (None, None) => None,
            _ => {
                return Err(EasyAcmeError::validation(
                    "external account binding needs both a key id and an HMAC key",
                ))
            }
        };
        let server = match request.server.trim() {
            "" => self.default_directory.clone(),
            s => s.to_string(),
        };
        let email = request.email.trim();
        let email_arg = (!email.is_empty()).then_some(email);

        let key = PrivateKey::generate(key_type)?;
        let private_key = key.to_pem()?;

        let engine = self
            .connector
            .connect(&server, &key, None)
            .await
            .map_err(|e| e.into_error("connect to CA"))?;

        let registration = match &eab {
            Some((kid, hmac)) => engine
                .register_with_eab(email_arg, kid, hmac)
                .await
                .map_err(|e| e.into_error("register account with EAB"))?,
            None => engine
                .register(email_arg)
                .await
                .map_err(|e| e.into_error("register account"))?,
        };

        let now = Utc::now();
        let account = Account {
            id: AccountId::generate(),
            name: name.to_string(),
            private_key,
            key_type,
            server,
            email: email.to_string(),
            status: AccountStatus::from_ca(registration.body.status),
            eab_key_id: eab.as_ref().map(|(kid, _)| kid.clone()),
            eab_hmac_key: eab.map(|(_, hmac)| hmac),
            registration: Some(registration),
            created_at: now,
            updated_at: now,
        };
        self.store.insert_account(account.clone())?;

        info!(
            account_id = %account.id,
            server = %account.server,
            key_type = %key_type,
            eab = account.has_eab(),
            status = %account.status,
            "Registered ACME account"
        );
        Ok(account)
    }

    /// Deactivate at the CA, then record the new status
    pub async fn deactivate(&self, id: &AccountId) -> EasyAcmeResult<()> {
        let account = self.load(id)?;
        if account.status == AccountStatus::Deactivated {
            return Err(EasyAcmeError::Conflict(format!(
                "account '{}' is already deactivated",
                id
            )));
        }

        let engine = self.open_session(&account).await?;
        engine
            .delete_registration()
            .await
            .map_err(|e| e.into_error("deactivate account"))?;

        self.store
            .set_account_status(id, AccountStatus::Deactivated)?;
        info!(account_id = %id, "Deactivated ACME account");
        Ok(())
    }

    pub fn load(&self, id: &AccountId) -> EasyAcmeResult<Account> {
        self.store
            .account(id)?
            .ok_or_else(|| EasyAcmeError::not_found("account", id.as_str()))
    }

    /// CA session signed with the account's stored key
    pub async fn open_session(&self, account: &Account) -> EasyAcmeResult<Arc<dyn AcmeEngine>> {
        let key = PrivateKey::from_pem(&account.private_key)?;
        if key.key_type() != account.key_type {
            warn!(
                account_id = %account.id,
                stored = %account.key_type,
                actual = %key.key_type(),
                "Stored key type does not match the key material"
            );
        }
        if account.registration.is_none() {
            return Err(EasyAcmeError::Conflict(format!(
                "account '{}' has no CA registration",
                account.id
            )));
        }
        self.connector
            .connect(&account.server, &key, account.registration.as_ref())
            .await
            .map_err(|e| e.into_error("connect to CA"))
    }
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
}
