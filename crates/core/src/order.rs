//! Order creation and DNS-01 challenge material.

use std::sync::Arc;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use easyacme_common::{AccountId, EasyAcmeError, EasyAcmeResult};

use crate::accounts::AccountRegistrar;
use crate::dns::{challenge_record, ChallengeRecord, DnsProvider};
use crate::engine::{AcmeEngine, Authorization, Order, CHALLENGE_DNS01};
use crate::keys::KeyType;
use crate::model::{Account, AccountStatus};
use crate::pending::{fingerprint, PendingAuthorization, PendingAuthorizationCache};

/// DNS-01 material for one authorization
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DomainChallenge {
    /// Identifier as the CA reports it (wildcards without `*.`)
    pub domain: String,
    pub wildcard: bool,
    pub authorization_url: String,
    pub challenge_url: String,
    pub token: String,
    pub key_authorization: String,
    pub record: ChallengeRecord,
}

/// Result of [`OrderNegotiator::create_manual_authorization`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ManualAuthorization {
    /// Fingerprint to hand back when completing issuance
    pub id: String,
    pub info_list: Vec<ChallengeRecord>,
}

/// Live order with a DNS provider attached, for the automatic flow
#[derive(Clone)]
pub struct AutomaticSession {
    pub engine: Arc<dyn AcmeEngine>,
    pub provider: Arc<dyn DnsProvider>,
    pub order: Order,
    pub authorizations: Vec<Authorization>,
    pub challenges: Vec<DomainChallenge>,
}

impl std::fmt::Debug for AutomaticSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AutomaticSession")
            .field("provider", &self.provider.name())
            .field("order", &self.order.location)
            .field("challenges", &self.challenges)
            .finish_non_exhaustive()
    }
}

/// Rejects empty domain lists and blank entries
pub fn validate_domains(domains: &[String]) -> EasyAcmeResult<()> {
    if domains.is_empty() {
        return Err(EasyAcmeError::validation("at least one domain is required"));
    }
    if let Some(bad) = domains
        .iter()
        .find(|d| d.trim().is_empty() || d.trim() != d.as_str())
    {
        return Err(EasyAcmeError::validation(format!(
            "invalid domain '{}'",
            bad
        )));
    }
    Ok(())
}

#[derive(Debug, Clone)]
pub struct OrderNegotiator {
    accounts: AccountRegistrar,
    pending: Arc<PendingAuthorizationCache>,
}

impl OrderNegotiator {
    pub fn new(accounts: AccountRegistrar, pending: Arc<PendingAuthorizationCache>) -> Self {
        Self { accounts, pending }
    }

    pub fn pending(&self) -> &Arc<PendingAuthorizationCache> {
        &self.pending
    }

    /// Open an order and keep it as a pending session the caller completes
    /// after publishing the returned TXT records.
    pub async fn create_manual_authorization(
        &self,
        key_type: KeyType,
        account_id: &AccountId,
        domains: &[String],
    ) -> EasyAcmeResult<ManualAuthorization> {
        validate_domains(domains)?;
        let account = self.usable_account(account_id)?;
        let engine = self.accounts.open_session(&account).await?;

        let (order, authorizations) = open_order(&engine, domains).await?;
        let challenges = challenge_material(&engine, &authorizations)?;

        let id = fingerprint(key_type, account_id, domains);
        let info_list = challenges.iter().map(|c| c.record.clone()).collect();
        self.pending.insert(PendingAuthorization {
            fingerprint: id.clone(),
            key_type,
            account_id: account_id.clone(),
            domains: domains.to_vec(),
            engine,
            order,
            authorizations,
            challenges,
            created_at: Utc::now(),
        });

        info!(fingerprint = %id, domains = ?domains, "Created manual authorization");
        Ok(ManualAuthorization { id, info_list })
    }

    /// Open an order whose challenges `provider` will publish
    pub async fn open_automatic(
        &self,
        account: &Account,
        domains: &[String],
        provider: Arc<dyn DnsProvider>,
    ) -> EasyAcmeResult<AutomaticSession> {
        validate_domains(domains)?;
        ensure_usable(account)?;
        let engine = self.accounts.open_session(account).await?;

        let (order, authorizations) = open_order(&engine, domains).await?;
        let challenges = challenge_material(&engine, &authorizations)?;

        info!(
            account_id = %account.id,
            provider = provider.name(),
            domains = ?domains,
            "Opened order for automatic validation"
        );
        Ok(AutomaticSession {
            engine,
            provider,
            order,
            authorizations,
            challenges,
        })
    }

    fn usable_account(&self, id: &AccountId) -> EasyAcmeResult<Account> {
        let account = self.accounts.load(id)?;
        ensure_usable(&account)?;
        Ok(account)
    }
}

fn ensure_usable(account: &Account) -> EasyAcmeResult<()> {
    match account.status {
        AccountStatus::Valid | AccountStatus::Pending => Ok(()),
        status => Err(EasyAcmeError::validation(format!(
            "account '{}' is {}",
            account.id, status
        ))),
    }
}

/// Create the order and fetch each of its authorizations, in order
pub async fn open_order(
    engine: &Arc<dyn AcmeEngine>,
    domains: &[String],
) -> EasyAcmeResult<(Order, Vec<Authorization>)> {
    let order = engine
        .new_order(domains)
        .await
        .map_err(|e| e.into_error("create order"))?;
    debug!(order = %order.location, authorizations = order.authorizations.len(), "Order created");

    let mut authorizations = Vec::with_capacity(order.authorizations.len());
    for url in &order.authorizations {
        let mut authz = engine
            .get_authorization(url)
            .await
            .map_err(|e| e.into_error("get authorization"))?;
        if authz.url.is_empty() {
            authz.url = url.clone();
        }
        authorizations.push(authz);
    }
    Ok((order, authorizations))
}

/// Key authorization and TXT record for every authorization's dns-01 challenge
pub fn challenge_material(
    engine: &Arc<dyn AcmeEngine>,
    authorizations: &[Authorization],
) -> EasyAcmeResult<Vec<DomainChallenge>> {
    authorizations
        .iter()
        .map(|authz| {
            let domain = &authz.identifier.value;
            let challenge = authz.challenge(CHALLENGE_DNS01).ok_or_else(|| {
                EasyAcmeError::upstream(
                    format!("prepare challenge for {}", domain),
                    "the CA offered no dns-01 challenge",
                )
            })?;
            let key_authorization = engine
                .key_authorization(&challenge.token)
                .map_err(|e| e.into_error("compute key authorization"))?;
            Ok(DomainChallenge {
                domain: domain.clone(),
                wildcard: authz.wildcard,
                authorization_url: authz.url.clone(),
                challenge_url: challenge.url.clone(),
                token: challenge.token.clone(),
                record: challenge_record(domain, &key_authorization),
                key_authorization,
            })
        })
        .collect()
}
