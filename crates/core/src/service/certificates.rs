//! Certificate issuance, revocation and tracking.
//!
//! Issuance runs in one of two modes:
//!
//! - **manual**: [`CertificateService::create_manual_authorization`] opens the
//!   order and returns the TXT records to publish. A later
//!   [`CertificateService::issue`] with the same key type, account and domains
//!   and no DNS provider picks the session up, prechecks every record, then
//!   validates and finalizes.
//! - **automatic**: [`CertificateService::issue`] with a DNS provider id opens
//!   the order, publishes the records through the provider, validates,
//!   removes the records and finalizes in one call.
//!
//! A certificate row is written only once a chain has been downloaded.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Datelike, Utc};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use easyacme_common::{
    AccountId, CertificateId, DnsProviderId, EasyAcmeError, EasyAcmeResult, ErrorKind,
};

use crate::challenge::ChallengeResolver;
use crate::dns::PropagationChecker;
use crate::dns::ProviderRegistry;
use crate::finalize::{Finalizer, IssuedCertificate};
use crate::keys::KeyType;
use crate::model::{
    CertType, Certificate, CertificateStatus, CertificateView, EffectiveStatus, Page, PageRequest,
};
use crate::order::{validate_domains, AutomaticSession, ManualAuthorization, OrderNegotiator};
use crate::pending::{fingerprint, PendingAuthorization};
use crate::precheck::DnsPrecheck;
use crate::revoke::Revoker;
use crate::store::Store;

/// Months covered by the monthly issuance counts, current month included
pub const STATS_MONTHS: u32 = 6;

pub const PEM_CONTENT_TYPE: &str = "application/x-pem-file";
pub const KEY_CONTENT_TYPE: &str = "application/octet-stream";

/// Input of [`CertificateService::create_manual_authorization`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthorizeRequest {
    pub key_type: String,
    #[serde(rename = "accountID")]
    pub account_id: AccountId,
    pub domains: Vec<String>,
}

/// Input of [`CertificateService::issue`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IssueRequest {
    pub key_type: String,
    #[serde(rename = "accountID")]
    pub account_id: AccountId,
    pub domains: Vec<String>,
    /// Absent or empty selects the manual flow
    #[serde(default, rename = "dnsProviderID")]
    pub dns_provider_id: Option<String>,
}

impl IssueRequest {
    fn provider_id(&self) -> Option<DnsProviderId> {
        self.dns_provider_id
            .as_deref()
            .map(str::trim)
            .filter(|id| !id.is_empty())
            .map(DnsProviderId::new)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CertificateFilter {
    /// Case-insensitive substring of any domain
    pub domain: Option<String>,
    pub cert_type: Option<CertType>,
    pub status: Option<EffectiveStatus>,
    pub account_id: Option<AccountId>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MonthlyCount {
    /// `YYYY-MM`
    pub month: String,
    pub count: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CertificateStats {
    pub total: usize,
    /// Issued and not yet expired
    pub valid: usize,
    pub expired: usize,
    pub revoked: usize,
    pub not_issued: usize,
    /// Oldest month first
    pub monthly: Vec<MonthlyCount>,
}

/// File content handed to a download endpoint
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Download {
    pub file_name: String,
    pub content_type: &'static str,
    pub content: String,
}

#[derive(Clone)]
pub struct CertificateService {
    store: Arc<dyn Store>,
    negotiator: OrderNegotiator,
    precheck: DnsPrecheck,
    resolver: ChallengeResolver,
    finalizer: Finalizer,
    revoker: Revoker,
    registry: Arc<ProviderRegistry>,
    propagation: Option<PropagationChecker>,
}

impl std::fmt::Debug for CertificateService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CertificateService")
            .field("pending", &self.negotiator.pending().len())
            .field("finalizer", &self.finalizer)
            .field("propagation", &self.propagation.is_some())
            .finish_non_exhaustive()
    }
}

impl CertificateService {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        store: Arc<dyn Store>,
        negotiator: OrderNegotiator,
        precheck: DnsPrecheck,
        resolver: ChallengeResolver,
        finalizer: Finalizer,
        revoker: Revoker,
        registry: Arc<ProviderRegistry>,
        propagation: Option<PropagationChecker>,
    ) -> Self {
        Self {
            store,
            negotiator,
            precheck,
            resolver,
            finalizer,
            revoker,
            registry,
            propagation,
        }
    }

    pub fn negotiator(&self) -> &OrderNegotiator {
        &self.negotiator
    }

    pub async fn create_manual_authorization(
        &self,
        request: &AuthorizeRequest,
    ) -> EasyAcmeResult<ManualAuthorization> {
        let key_type: KeyType = request.key_type.parse()?;
        self.negotiator
            .create_manual_authorization(key_type, &request.account_id, &request.domains)
            .await
    }

    /// Complete issuance, manual or automatic depending on `dns_provider_id`
    pub async fn issue(
        &self,
        request: &IssueRequest,
        cancel: Option<&CancellationToken>,
    ) -> EasyAcmeResult<CertificateView> {
        let key_type: KeyType = request.key_type.parse()?;
        validate_domains(&request.domains)?;

        let certificate = match request.provider_id() {
            None => self.issue_manual(key_type, request, cancel).await?,
            Some(provider_id) => {
                self.issue_automatic(key_type, request, provider_id, cancel)
                    .await?
            }
        };
        Ok(certificate.view(Utc::now()))
    }

    async fn issue_manual(
        &self,
        key_type: KeyType,
        request: &IssueRequest,
        cancel: Option<&CancellationToken>,
    ) -> EasyAcmeResult<Certificate> {
        let fingerprint = fingerprint(key_type, &request.account_id, &request.domains);
        let pending = self.negotiator.pending().get(&fingerprint)?;

        // Every record must resolve before the CA is asked to look
        for challenge in &pending.challenges {
            self.precheck
                .verify_txt(&challenge.record.fqdn, &challenge.record.value, cancel)
                .await?;
        }

        let result = self.complete_manual(&pending, key_type, cancel).await;
        match &result {
            Ok(_) => {
                self.negotiator.pending().remove(&fingerprint);
            }
            // The order may still be usable
            Err(e) if e.kind() == ErrorKind::Cancelled => {}
            Err(e) => {
                debug!(
                    fingerprint = %fingerprint,
                    error = %e,
                    "Dropping pending authorization after failed issuance"
                );
                self.negotiator.pending().remove(&fingerprint);
            }
        }
        result
    }

    /// CA validation, finalization and persistence for a prechecked entry
    async fn complete_manual(
        &self,
        pending: &PendingAuthorization,
        key_type: KeyType,
        cancel: Option<&CancellationToken>,
    ) -> EasyAcmeResult<Certificate> {
        self.resolver
            .validate_all(&pending.engine, &pending.authorizations, cancel)
            .await?;
        let issued = self
            .finalizer
            .finalize(
                &pending.engine,
                &pending.order,
                &pending.domains,
                key_type,
                cancel,
            )
            .await?;

        self.persist(
            issued,
            key_type,
            &pending.account_id,
            &pending.domains,
            DnsProviderId::manual(),
        )
    }

    async fn issue_automatic(
        &self,
        key_type: KeyType,
        request: &IssueRequest,
        provider_id: DnsProviderId,
        cancel: Option<&CancellationToken>,
    ) -> EasyAcmeResult<Certificate> {
        let record = self
            .store
            .dns_provider(&provider_id)?
            .ok_or_else(|| EasyAcmeError::not_found("DNS provider", provider_id.as_str()))?;
        let provider = self.registry.build(&record)?;
        let account = self
            .store
            .account(&request.account_id)?
            .ok_or_else(|| EasyAcmeError::not_found("account", request.account_id.as_str()))?;

        let session = self
            .negotiator
            .open_automatic(&account, &request.domains, provider)
            .await?;

        let mut presented = 0;
        let validated = self.publish_and_validate(&session, &mut presented, cancel).await;
        self.clean_up(&session, presented).await;
        validated?;

        let issued = self
            .finalizer
            .finalize(
                &session.engine,
                &session.order,
                &request.domains,
                key_type,
                cancel,
            )
            .await?;
        self.persist(
            issued,
            key_type,
            &account.id,
            &request.domains,
            provider_id,
        )
    }

    async fn publish_and_validate(
        &self,
        session: &AutomaticSession,
        presented: &mut usize,
        cancel: Option<&CancellationToken>,
    ) -> EasyAcmeResult<()> {
        for challenge in &session.challenges {
            session
                .provider
                .present(&challenge.domain, &challenge.token, &challenge.key_authorization)
                .await
                .map_err(|e| e.into_error("present DNS record"))?;
            *presented += 1;
        }

        if let Some(checker) = &self.propagation {
            for challenge in &session.challenges {
                checker
                    .wait_for(&challenge.record)
                    .await
                    .map_err(|e| e.into_error("wait for DNS propagation"))?;
            }
        }

        self.resolver
            .validate_all(&session.engine, &session.authorizations, cancel)
            .await
    }

    /// Remove the first `presented` records; failures are logged, never returned
    async fn clean_up(&self, session: &AutomaticSession, presented: usize) {
        for challenge in session.challenges.iter().take(presented) {
            if let Err(e) = session
                .provider
                .clean_up(&challenge.domain, &challenge.token, &challenge.key_authorization)
                .await
            {
                warn!(
                    provider = session.provider.name(),
                    domain = %challenge.domain,
                    error = %e,
                    "Failed to clean up challenge record"
                );
            }
        }
    }

    fn persist(
        &self,
        issued: IssuedCertificate,
        key_type: KeyType,
        account_id: &AccountId,
        domains: &[String],
        dns_provider_id: DnsProviderId,
    ) -> EasyAcmeResult<Certificate> {
        let now = Utc::now();
        let certificate = Certificate {
            id: CertificateId::generate(),
            domains: domains.to_vec(),
            key_type,
            account_id: account_id.clone(),
            dns_provider_id,
            cert_type: issued.info.cert_type,
            status: CertificateStatus::Issued,
            issued_at: issued.info.issued_at,
            validity_days: issued.info.validity_days,
            cert_url: issued.cert_url,
            cert_stable_url: issued.cert_stable_url,
            private_key: issued.private_key,
            certificate: issued.certificate,
            issuer_certificate: issued.issuer_certificate,
            csr: issued.csr,
            created_at: now,
            updated_at: now,
        };
        self.store.insert_certificate(certificate.clone())?;

        info!(
            certificate_id = %certificate.id,
            account_id = %certificate.account_id,
            domains = ?certificate.domains,
            dns_provider_id = %certificate.dns_provider_id,
            expires_at = ?certificate.expires_at(),
            "Stored certificate"
        );
        Ok(certificate)
    }

    pub async fn revoke(&self, id: &CertificateId) -> EasyAcmeResult<()> {
        self.revoker.revoke(id).await
    }

    pub fn get(&self, id: &CertificateId) -> EasyAcmeResult<CertificateView> {
        Ok(self.load(id)?.view(Utc::now()))
    }

    fn load(&self, id: &CertificateId) -> EasyAcmeResult<Certificate> {
        self.store
            .certificate(id)?
            .ok_or_else(|| EasyAcmeError::not_found("certificate", id.as_str()))
    }

    /// Newest first
    pub fn list(
        &self,
        filter: &CertificateFilter,
        page: PageRequest,
    ) -> EasyAcmeResult<Page<CertificateView>> {
        let now = Utc::now();
        let needle = filter.domain.as_deref().map(str::to_lowercase);
        let mut certificates: Vec<_> = self
            .store
            .certificates()?
            .into_iter()
            .filter(|c| {
                needle.as_deref().map_or(true, |n| {
                    c.domains.iter().any(|d| d.to_lowercase().contains(n))
                })
            })
            .filter(|c| filter.cert_type.map_or(true, |t| c.cert_type == t))
            .filter(|c| filter.status.map_or(true, |s| c.effective_status(now) == s))
            .filter(|c| {
                filter
                    .account_id
                    .as_ref()
                    .map_or(true, |id| &c.account_id == id)
            })
            .collect();
        certificates.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(page.apply(certificates.iter().map(|c| c.view(now)).collect()))
    }

    /// Remove the local record; the certificate stays valid at the CA
    pub fn delete(&self, id: &CertificateId) -> EasyAcmeResult<()> {
        if !self.store.delete_certificate(id)? {
            return Err(EasyAcmeError::not_found("certificate", id.as_str()));
        }
        info!(certificate_id = %id, "Deleted certificate record");
        Ok(())
    }

    pub fn stats(&self) -> EasyAcmeResult<CertificateStats> {
        Ok(certificate_stats(&self.store.certificates()?, Utc::now()))
    }

    /// Full chain, leaf first
    pub fn download_chain(&self, id: &CertificateId) -> EasyAcmeResult<Download> {
        let certificate = self.load(id)?;
        let mut content = certificate.certificate.clone();
        let issuer = certificate.issuer_certificate.trim();
        if !issuer.is_empty() && !content.contains(issuer) {
            if !content.ends_with('\n') {
                content.push('\n');
            }
            content.push_str(&certificate.issuer_certificate);
        }
        Ok(Download {
            file_name: format!("{}_chain.pem", file_stem(&certificate)),
            content_type: PEM_CONTENT_TYPE,
            content,
        })
    }

    pub fn download_private_key(&self, id: &CertificateId) -> EasyAcmeResult<Download> {
        let certificate = self.load(id)?;
        info!(certificate_id = %id, "Private key downloaded");
        Ok(Download {
            file_name: format!("{}_private.pem", file_stem(&certificate)),
            content_type: KEY_CONTENT_TYPE,
            content: certificate.private_key,
        })
    }
}

/// Primary domain, with the wildcard label made file-name safe
fn file_stem(certificate: &Certificate) -> String {
    certificate.primary_domain().replace('*', "_")
}

/// Counts by effective status plus per-month issuance
pub fn certificate_stats(certificates: &[Certificate], now: DateTime<Utc>) -> CertificateStats {
    let mut stats = CertificateStats {
        total: certificates.len(),
        ..Default::default()
    };

    let months = recent_months(now, STATS_MONTHS);
    let mut monthly: BTreeMap<&str, usize> = months.iter().map(|m| (m.as_str(), 0)).collect();

    for certificate in certificates {
        match certificate.effective_status(now) {
            EffectiveStatus::Issued => stats.valid += 1,
            EffectiveStatus::Expired => stats.expired += 1,
            EffectiveStatus::Revoked => stats.revoked += 1,
            EffectiveStatus::NotIssued => stats.not_issued += 1,
        }
        if certificate.status != CertificateStatus::NotIssued {
            let month = certificate.created_at.format("%Y-%m").to_string();
            if let Some(count) = monthly.get_mut(month.as_str()) {
                *count += 1;
            }
        }
    }

    stats.monthly = months
        .iter()
        .map(|m| MonthlyCount {
            month: m.clone(),
            count: monthly.get(m.as_str()).copied().unwrap_or_default(),
        })
        .collect();
    stats
}

/// `YYYY-MM` keys for the `count` months ending with `now`'s, oldest first
fn recent_months(now: DateTime<Utc>, count: u32) -> Vec<String> {
    let (mut year, mut month) = (now.year(), now.month());
    let mut months = Vec::with_capacity(count as usize);
    for _ in 0..count {
        months.push(format!("{:04}-{:02}", year, month));
        if month == 1 {
            year -= 1;
            month = 12;
        } else {
            month -= 1;
        }
    }
    months.reverse();
    months
}
