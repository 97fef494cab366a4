//! Caller-facing operations and their wiring.
//!
//! [`Services::from_config`] builds the production stack: HTTP protocol
//! engine, hickory resolver and the configured store. [`Services::assemble`]
//! takes those collaborators from the caller instead.

mod accounts;
mod certificates;
mod dns_providers;

use std::sync::Arc;

use tracing::info;

use easyacme_common::EasyAcmeResult;
use easyacme_config::Config;

use crate::accounts::AccountRegistrar;
use crate::challenge::ChallengeResolver;
use crate::dns::{HickoryTxtResolver, PropagationChecker, ProviderRegistry, TxtResolver};
use crate::engine::{EngineConnector, HttpConnector};
use crate::finalize::Finalizer;
use crate::order::OrderNegotiator;
use crate::pending::PendingAuthorizationCache;
use crate::precheck::DnsPrecheck;
use crate::revoke::Revoker;
use crate::store::{JsonFileStore, MemoryStore, Store};

pub use accounts::{AccountFilter, AccountService, AccountStats};
pub use certificates::{
    certificate_stats, AuthorizeRequest, CertificateFilter, CertificateService,
    CertificateStats, Download, IssueRequest, MonthlyCount, KEY_CONTENT_TYPE, PEM_CONTENT_TYPE,
    STATS_MONTHS,
};
pub use dns_providers::{
    CreateDnsProvider, DnsProviderFilter, DnsProviderService, DnsProviderStats,
    UpdateDnsProvider,
};

/// The three services sharing one store and one pending cache
#[derive(Debug, Clone)]
pub struct Services {
    pub accounts: AccountService,
    pub dns_providers: DnsProviderService,
    pub certificates: CertificateService,
}

impl Services {
    pub fn from_config(config: &Config) -> EasyAcmeResult<Self> {
        let store: Arc<dyn Store> = match &config.storage.path {
            Some(path) => Arc::new(JsonFileStore::open(path)?),
            None => Arc::new(MemoryStore::new()),
        };
        let connector = HttpConnector::new(config.acme.request_timeout(), &config.acme.user_agent)
            .map_err(|e| e.into_error("build ACME client"))?;
        let resolver = HickoryTxtResolver::new(&config.precheck.nameserver_addrs()?)
            .map_err(|e| e.into_error("build DNS resolver"))?;

        Self::assemble(config, store, Arc::new(connector), Arc::new(resolver))
    }

    pub fn assemble(
        config: &Config,
        store: Arc<dyn Store>,
        connector: Arc<dyn EngineConnector>,
        resolver: Arc<dyn TxtResolver>,
    ) -> EasyAcmeResult<Self> {
        let registry = Arc::new(ProviderRegistry::from_config(&config.dns_providers)?);
        let registrar = AccountRegistrar::new(
            Arc::clone(&store),
            connector,
            config.acme.directory_url.clone(),
        );
        let pending = Arc::new(PendingAuthorizationCache::new(config.pending.ttl()));

        let propagation = config
            .propagation
            .enabled
            .then(|| PropagationChecker::from_config(Arc::clone(&resolver), &config.propagation));
        let certificates = CertificateService::new(
            Arc::clone(&store),
            OrderNegotiator::new(registrar.clone(), pending),
            DnsPrecheck::new(resolver, config.precheck.retry_delay()),
            ChallengeResolver::new(config.polling.challenge_initial_interval()),
            Finalizer::new(
                config.acme.preferred_chain.clone(),
                config.polling.finalize_window(),
                config.polling.finalize_attempts,
            ),
            Revoker::new(registrar.clone()),
            Arc::clone(&registry),
            propagation,
        );

        info!(
            directory_url = %config.acme.directory_url,
            pending_ttl_secs = config.pending.ttl_secs,
            propagation = config.propagation.enabled,
            "Services ready"
        );

        Ok(Self {
            accounts: AccountService::new(registrar),
            dns_providers: DnsProviderService::new(store, registry),
            certificates,
        })
    }
}
