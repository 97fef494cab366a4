//! Shared test utilities for integration tests
//!
//! An in-memory CA speaking the engine trait, a scripted TXT resolver and
//! certificate fixtures built with rcgen.

#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use rcgen::{CertificateParams, DistinguishedName, DnType, KeyPair};

use easyacme::dns::{normalize_domain, DnsResult, TxtResolver};
use easyacme::engine::{
    AccountBody, Authorization, CertificateChain, Challenge, ChallengeUpdate, EngineConnector,
    EngineResult, Identifier, Order, Problem, RegistrationResource, Status, CHALLENGE_DNS01,
};
use easyacme::{AcmeEngine, EngineError, MemoryStore, PrivateKey, Services, Store};
use easyacme_config::Config;

pub const CA_BASE: &str = "https://ca.test";
pub const THUMBPRINT: &str = "test-thumbprint";

// ============================================================================
// Certificate fixtures
// ============================================================================

/// Leaf for `domains` valid 2025-01-01 to 2099-01-01, followed by its issuer
pub fn chain_fixture(domains: &[String], issuer_cn: &str) -> CertificateChain {
    let issuer = self_signed(issuer_cn, vec![]);
    let leaf = self_signed(&domains[0], domains.to_vec());
    CertificateChain {
        url: format!("{}/cert/1", CA_BASE),
        cert: format!("{}{}", leaf, issuer),
        issuer,
    }
}

fn self_signed(cn: &str, sans: Vec<String>) -> String {
    let mut params = CertificateParams::new(sans).unwrap();
    let mut dn = DistinguishedName::new();
    dn.push(DnType::CommonName, cn);
    params.distinguished_name = dn;
    params.not_before = rcgen::date_time_ymd(2025, 1, 1);
    params.not_after = rcgen::date_time_ymd(2099, 1, 1);
    let key = KeyPair::generate().unwrap();
    params.self_signed(&key).unwrap().pem()
}

// ============================================================================
// In-memory CA
// ============================================================================

/// What the CA answers once a challenge has been accepted
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Valid,
    Invalid,
}

#[derive(Debug, Default)]
pub struct MockEngine {
    domains: Mutex<Vec<String>>,
    accepted: Mutex<HashSet<usize>>,
    outcome: Mutex<Option<Outcome>>,
    authz_outcomes: Mutex<HashMap<usize, Outcome>>,
    order_status: Mutex<Option<Status>>,
    pub order_polls: AtomicUsize,
    pub accept_calls: AtomicUsize,
    pub register_calls: AtomicUsize,
    pub eab_key_ids: Mutex<Vec<String>>,
    pub deactivate_calls: AtomicUsize,
    pub fail_deactivate: AtomicBool,
    pub revoked: Mutex<Vec<Vec<u8>>>,
    pub fail_revoke: AtomicBool,
    pub finalized_csrs: AtomicUsize,
}

impl MockEngine {
    pub fn set_outcome(&self, outcome: Outcome) {
        *self.outcome.lock() = Some(outcome);
    }

    /// Outcome for the authorization at `index` only
    pub fn set_authz_outcome(&self, index: usize, outcome: Outcome) {
        self.authz_outcomes.lock().insert(index, outcome);
    }

    /// Status reported when the order is polled after finalization
    pub fn set_order_status(&self, status: Status) {
        *self.order_status.lock() = Some(status);
    }

    pub fn finalize_calls(&self) -> usize {
        self.finalized_csrs.load(Ordering::SeqCst)
    }

    pub fn accept_calls(&self) -> usize {
        self.accept_calls.load(Ordering::SeqCst)
    }

    fn problem(detail: &str) -> EngineError {
        EngineError::Problem(Problem {
            kind: "urn:ietf:params:acme:error:malformed".to_string(),
            detail: detail.to_string(),
            status: Some(400),
            ..Default::default()
        })
    }

    fn index_of(url: &str) -> usize {
        url.rsplit('/')
            .next()
            .and_then(|s| s.parse().ok())
            .unwrap_or_default()
    }

    fn challenge(&self, index: usize, status: Status) -> Challenge {
        Challenge {
            kind: CHALLENGE_DNS01.to_string(),
            url: format!("{}/chall/{}", CA_BASE, index),
            token: format!("token-{}", index),
            status,
            error: None,
            validated: None,
        }
    }

    fn authz_status(&self, index: usize) -> Status {
        if !self.accepted.lock().contains(&index) {
            return Status::Pending;
        }
        let outcome = self
            .authz_outcomes
            .lock()
            .get(&index)
            .copied()
            .or(*self.outcome.lock())
            .unwrap_or(Outcome::Valid);
        match outcome {
            Outcome::Valid => Status::Valid,
            Outcome::Invalid => Status::Invalid,
        }
    }

    fn order(&self, status: Status) -> Order {
        let domains = self.domains.lock().clone();
        Order {
            location: format!("{}/order/1", CA_BASE),
            status,
            identifiers: domains.iter().map(Identifier::dns).collect(),
            authorizations: (0..domains.len())
                .map(|i| format!("{}/authz/{}", CA_BASE, i))
                .collect(),
            finalize: format!("{}/order/1/finalize", CA_BASE),
            certificate: (status == Status::Valid).then(|| format!("{}/cert/1", CA_BASE)),
            error: None,
            expires: None,
        }
    }
}

#[async_trait]
impl AcmeEngine for MockEngine {
    async fn register(&self, email: Option<&str>) -> EngineResult<RegistrationResource> {
        self.register_calls.fetch_add(1, Ordering::SeqCst);
        Ok(RegistrationResource {
            uri: format!("{}/acct/1", CA_BASE),
            body: AccountBody {
                status: Some(Status::Valid),
                contact: email.map(|e| vec![format!("mailto:{}", e)]).unwrap_or_default(),
                orders: None,
                terms_of_service_agreed: true,
            },
        })
    }

    async fn register_with_eab(
        &self,
        email: Option<&str>,
        eab_key_id: &str,
        _eab_hmac_key: &str,
    ) -> EngineResult<RegistrationResource> {
        self.eab_key_ids.lock().push(eab_key_id.to_string());
        self.register(email).await
    }

    async fn delete_registration(&self) -> EngineResult<()> {
        self.deactivate_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_deactivate.load(Ordering::SeqCst) {
            return Err(Self::problem("deactivation refused"));
        }
        Ok(())
    }

    async fn new_order(&self, domains: &[String]) -> EngineResult<Order> {
        *self.domains.lock() = domains.to_vec();
        self.accepted.lock().clear();
        Ok(self.order(Status::Pending))
    }

    async fn get_order(&self, _url: &str) -> EngineResult<Order> {
        self.order_polls.fetch_add(1, Ordering::SeqCst);
        let status = self.order_status.lock().unwrap_or(Status::Valid);
        let mut order = self.order(status);
        if status == Status::Invalid {
            order.error = Some(Problem {
                kind: "urn:ietf:params:acme:error:badCSR".to_string(),
                detail: "CSR rejected by policy".to_string(),
                status: Some(400),
                ..Default::default()
            });
        }
        Ok(order)
    }

    async fn finalize_order(&self, _finalize_url: &str, _csr_der: &[u8]) -> EngineResult<Order> {
        self.finalized_csrs.fetch_add(1, Ordering::SeqCst);
        Ok(self.order(Status::Processing))
    }

    async fn get_authorization(&self, url: &str) -> EngineResult<Authorization> {
        let index = Self::index_of(url);
        let domain = self
            .domains
            .lock()
            .get(index)
            .cloned()
            .ok_or_else(|| Self::problem("unknown authorization"))?;
        let status = self.authz_status(index);
        let mut challenge = self.challenge(index, status);
        if status == Status::Invalid {
            challenge.error = Some(Problem {
                kind: "urn:ietf:params:acme:error:unauthorized".to_string(),
                detail: format!("No TXT record found at _acme-challenge.{}", domain),
                status: Some(403),
                ..Default::default()
            });
        }
        Ok(Authorization {
            url: url.to_string(),
            identifier: Identifier::dns(normalize_domain(&domain)),
            status,
            challenges: vec![challenge],
            wildcard: domain.starts_with("*."),
            expires: None,
        })
    }

    async fn accept_challenge(&self, url: &str) -> EngineResult<ChallengeUpdate> {
        self.accept_calls.fetch_add(1, Ordering::SeqCst);
        let index = Self::index_of(url);
        self.accepted.lock().insert(index);
        Ok(ChallengeUpdate {
            challenge: self.challenge(index, Status::Processing),
            authorization_url: format!("{}/authz/{}", CA_BASE, index),
            retry_after: Some(1),
        })
    }

    async fn get_certificates(
        &self,
        _url: &str,
        _bundle: bool,
    ) -> EngineResult<Vec<CertificateChain>> {
        let domains = self.domains.lock().clone();
        Ok(vec![chain_fixture(&domains, "Test Root X1")])
    }

    async fn revoke_certificate(&self, cert_der: &[u8]) -> EngineResult<()> {
        if self.fail_revoke.load(Ordering::SeqCst) {
            return Err(Self::problem("revocation refused"));
        }
        self.revoked.lock().push(cert_der.to_vec());
        Ok(())
    }

    fn key_authorization(&self, token: &str) -> EngineResult<String> {
        Ok(format!("{}.{}", token, THUMBPRINT))
    }
}

/// Hands out the same engine for every session
#[derive(Debug, Default)]
pub struct MockConnector {
    pub engine: Arc<MockEngine>,
    pub connects: AtomicUsize,
}

#[async_trait]
impl EngineConnector for MockConnector {
    async fn connect(
        &self,
        _directory_url: &str,
        _key: &PrivateKey,
        _registration: Option<&RegistrationResource>,
    ) -> EngineResult<Arc<dyn AcmeEngine>> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        let engine: Arc<dyn AcmeEngine> = self.engine.clone();
        Ok(engine)
    }
}

// ============================================================================
// Resolver
// ============================================================================

/// TXT records published by the test
#[derive(Debug, Default)]
pub struct StaticResolver {
    records: Mutex<HashMap<String, Vec<String>>>,
    pub lookups: AtomicUsize,
}

impl StaticResolver {
    pub fn publish(&self, fqdn: &str, value: &str) {
        self.records
            .lock()
            .entry(fqdn.to_string())
            .or_default()
            .push(value.to_string());
    }

    pub fn lookups(&self) -> usize {
        self.lookups.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TxtResolver for StaticResolver {
    async fn lookup_txt(&self, fqdn: &str) -> DnsResult<Vec<String>> {
        self.lookups.fetch_add(1, Ordering::SeqCst);
        Ok(self.records.lock().get(fqdn).cloned().unwrap_or_default())
    }
}

// ============================================================================
// Wiring
// ============================================================================

pub struct Harness {
    pub services: Services,
    pub store: Arc<MemoryStore>,
    pub connector: Arc<MockConnector>,
    pub resolver: Arc<StaticResolver>,
}

impl Harness {
    pub fn engine(&self) -> &MockEngine {
        &self.connector.engine
    }
}

/// Defaults with propagation waiting off
pub fn test_config() -> Config {
    let mut config = Config::default();
    config.propagation.enabled = false;
    config
}

pub fn harness() -> Harness {
    harness_with(test_config())
}

pub fn harness_with(config: Config) -> Harness {
    let store = Arc::new(MemoryStore::new());
    let connector = Arc::new(MockConnector::default());
    let resolver = Arc::new(StaticResolver::default());
    let services = Services::assemble(
        &config,
        store.clone() as Arc<dyn Store>,
        connector.clone(),
        resolver.clone(),
    )
    .unwrap();
    Harness {
        services,
        store,
        connector,
        resolver,
    }
}

/// Register a P256 account without EAB
pub async fn register_account(harness: &Harness, name: &str) -> easyacme::AccountView {
    harness
        .services
        .accounts
        .register(easyacme::RegisterAccount {
            name: name.to_string(),
            email: "ops@example.com".to_string(),
            key_type: "P256".to_string(),
            ..Default::default()
        })
        .await
        .unwrap()
}
