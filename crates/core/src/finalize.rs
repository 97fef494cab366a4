//! Order finalization and certificate download.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};
use x509_parser::pem::{parse_x509_pem, Pem};

use easyacme_common::{EasyAcmeError, EasyAcmeResult};

use crate::engine::{AcmeEngine, CertificateChain, Order, Status};
use crate::keys::{build_csr, CertificateKey, KeyType};
use crate::model::CertType;
use crate::poll::{drive, Poll, PollSchedule, Poller};

/// Window for the order to turn valid after the CSR is submitted
pub const DEFAULT_FINALIZE_WINDOW: Duration = Duration::from_secs(30);

/// Probes within the finalize window
pub const DEFAULT_FINALIZE_ATTEMPTS: u32 = 60;

/// `Ok(true)` when valid, an error when invalid, `Ok(false)` otherwise
pub fn check_order_status(order: &Order) -> EasyAcmeResult<bool> {
    match order.status {
        Status::Valid => Ok(true),
        Status::Invalid => Err(EasyAcmeError::upstream(
            "finalize order",
            match &order.error {
                Some(problem) => format!("invalid order: {}", problem),
                None => "invalid order".to_string(),
            },
        )),
        _ => Ok(false),
    }
}

/// Fields derived from the leaf certificate
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CertInfo {
    pub cert_type: CertType,
    pub issued_at: DateTime<Utc>,
    pub validity_days: i64,
}

/// Read type, issue time and validity from a PEM leaf certificate.
///
/// OV when the subject carries a non-empty O or OU, DV otherwise.
/// Validity is whole days between NotBefore and NotAfter, rounded down.
pub fn parse_cert_info(cert_pem: &str) -> EasyAcmeResult<CertInfo> {
    let (_, pem) = parse_x509_pem(cert_pem.as_bytes())
        .map_err(|e| EasyAcmeError::upstream("parse certificate", format!("invalid PEM: {}", e)))?;
    let cert = pem
        .parse_x509()
        .map_err(|e| EasyAcmeError::upstream("parse certificate", format!("invalid X.509: {}", e)))?;

    let subject = cert.subject();
    let non_empty = |value: Result<&str, x509_parser::error::X509Error>| {
        value.map(|s| !s.is_empty()).unwrap_or(false)
    };
    let organization = subject.iter_organization().any(|a| non_empty(a.as_str()))
        || subject
            .iter_organizational_unit()
            .any(|a| non_empty(a.as_str()));

    let not_before = cert.validity().not_before.timestamp();
    let not_after = cert.validity().not_after.timestamp();
    let issued_at = DateTime::from_timestamp(not_before, 0).ok_or_else(|| {
        EasyAcmeError::upstream("parse certificate", "NotBefore out of range")
    })?;

    Ok(CertInfo {
        cert_type: if organization { CertType::OV } else { CertType::DV },
        issued_at,
        validity_days: (not_after - not_before).div_euclid(86_400),
    })
}

/// Issuer CN of the last certificate in a PEM bundle
fn top_issuer_common_name(bundle: &str) -> Option<String> {
    let last = Pem::iter_from_buffer(bundle.as_bytes())
        .filter_map(Result::ok)
        .last()?;
    let cert = last.parse_x509().ok()?;
    let cn = cert
        .issuer()
        .iter_common_name()
        .next()?
        .as_str()
        .ok()?
        .to_string();
    Some(cn)
}

/// Chain whose top issuer matches `preferred`, else the CA's default (first)
pub fn select_chain(
    chains: Vec<CertificateChain>,
    preferred: Option<&str>,
) -> Option<CertificateChain> {
    if let Some(preferred) = preferred {
        if let Some(pos) = chains
            .iter()
            .position(|c| top_issuer_common_name(&c.issuer).as_deref() == Some(preferred))
        {
            debug!(preferred, url = %chains[pos].url, "Using preferred chain");
            return chains.into_iter().nth(pos);
        }
        info!(
            preferred,
            "No chain from the CA matched the preferred issuer, using the default chain"
        );
    }
    chains.into_iter().next()
}

/// Key material and metadata of a freshly issued certificate
#[derive(Debug, Clone, PartialEq)]
pub struct IssuedCertificate {
    pub private_key: String,
    pub csr: String,
    pub certificate: String,
    pub issuer_certificate: String,
    /// URL of the selected chain
    pub cert_url: String,
    /// Certificate URL of the order
    pub cert_stable_url: String,
    pub info: CertInfo,
}

struct OrderPoller {
    engine: Arc<dyn AcmeEngine>,
    url: String,
}

#[async_trait]
impl Poller for OrderPoller {
    type Output = Order;

    fn operation(&self) -> &str {
        "finalize order"
    }

    async fn poll(&mut self) -> EasyAcmeResult<Poll<Order>> {
        let mut order = self
            .engine
            .get_order(&self.url)
            .await
            .map_err(|e| e.into_error("get order"))?;
        if order.location.is_empty() {
            order.location = self.url.clone();
        }
        if check_order_status(&order)? {
            Ok(Poll::Ready(order))
        } else {
            Ok(Poll::Pending {
                status: order.status.to_string(),
            })
        }
    }
}

#[derive(Debug, Clone)]
pub struct Finalizer {
    preferred_chain: Option<String>,
    window: Duration,
    attempts: u32,
}

impl Default for Finalizer {
    fn default() -> Self {
        Self::new(None, DEFAULT_FINALIZE_WINDOW, DEFAULT_FINALIZE_ATTEMPTS)
    }
}

impl Finalizer {
    pub fn new(preferred_chain: Option<String>, window: Duration, attempts: u32) -> Self {
        Self {
            preferred_chain: preferred_chain.filter(|c| !c.is_empty()),
            window,
            attempts,
        }
    }

    /// Generate a key and CSR, finalize `order` and download the chain
    pub async fn finalize(
        &self,
        engine: &Arc<dyn AcmeEngine>,
        order: &Order,
        domains: &[String],
        key_type: KeyType,
        cancel: Option<&CancellationToken>,
    ) -> EasyAcmeResult<IssuedCertificate> {
        if domains.is_empty() {
            return Err(EasyAcmeError::validation("at least one domain is required"));
        }

        let key = CertificateKey::generate(key_type)?;
        let csr = build_csr(&key, domains)?;

        info!(domains = ?domains, key_type = %key_type, "Submitting CSR");
        let mut finalized = engine
            .finalize_order(&order.finalize, &csr.der)
            .await
            .map_err(|e| e.into_error("finalize order"))?;
        if finalized.location.is_empty() {
            finalized.location = order.location.clone();
        }

        let order = if check_order_status(&finalized)? {
            finalized
        } else {
            debug!(status = %finalized.status, "Order not valid yet, polling");
            let mut poller = OrderPoller {
                engine: Arc::clone(engine),
                url: finalized.location.clone(),
            };
            drive(
                &mut poller,
                PollSchedule::finalize(self.window, self.attempts),
                cancel,
            )
            .await?
        };

        let cert_url = order.certificate.clone().ok_or_else(|| {
            EasyAcmeError::upstream("finalize order", "valid order carries no certificate URL")
        })?;
        let chains = engine
            .get_certificates(&cert_url, true)
            .await
            .map_err(|e| e.into_error("download certificate"))?;
        let chain = select_chain(chains, self.preferred_chain.as_deref()).ok_or_else(|| {
            EasyAcmeError::upstream("download certificate", "the CA returned no certificate")
        })?;

        let info = parse_cert_info(&chain.cert)?;
        info!(
            domains = ?domains,
            cert_type = %info.cert_type,
            validity_days = info.validity_days,
            "Certificate issued"
        );

        Ok(IssuedCertificate {
            private_key: key.pem.clone(),
            csr: csr.pem,
            certificate: chain.cert,
            issuer_certificate: chain.issuer,
            cert_url: chain.url,
            cert_stable_url: cert_url,
            info,
        })
    }
}
