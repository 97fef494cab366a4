//! ACME protocol engine.
//!
//! Everything that touches the CA's wire protocol lives behind [`AcmeEngine`]:
//! JWS signing, nonce handling and HTTP transport. The issuance components only
//! see typed resources.
//!
//! An engine session is bound to one directory URL and one account key and is
//! created explicitly through an [`EngineConnector`]. Tests swap in an
//! in-memory connector.

pub mod http;
pub mod jws;
pub mod types;

use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;

use easyacme_common::EasyAcmeError;

use crate::keys::{KeyError, PrivateKey};

pub use http::{HttpConnector, HttpEngine};
pub use types::{
    AccountBody, Authorization, CertificateChain, Challenge, ChallengeUpdate, Identifier, Order,
    Problem, RegistrationResource, Status, CHALLENGE_DNS01,
};

/// Errors raised by an engine session
#[derive(Debug, Error)]
pub enum EngineError {
    /// Network or HTTP client failure
    #[error("transport error: {0}")]
    Transport(String),

    /// Problem document returned by the CA
    #[error("{0}")]
    Problem(Problem),

    /// Response that does not follow the protocol
    #[error("protocol error: {0}")]
    Protocol(String),

    /// Caller-supplied input the engine cannot use (malformed EAB key)
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error(transparent)]
    Key(#[from] KeyError),
}

impl From<reqwest::Error> for EngineError {
    fn from(err: reqwest::Error) -> Self {
        EngineError::Transport(err.to_string())
    }
}

impl EngineError {
    /// Convert into the crate-wide taxonomy, naming the failed operation
    pub fn into_error(self, operation: &str) -> EasyAcmeError {
        match self {
            EngineError::InvalidInput(msg) => {
                EasyAcmeError::validation(format!("{}: {}", operation, msg))
            }
            other => EasyAcmeError::upstream_with_source(operation, other),
        }
    }
}

/// Result type for engine operations
pub type EngineResult<T> = Result<T, EngineError>;

/// One authenticated session with a CA
#[async_trait]
pub trait AcmeEngine: Send + Sync {
    /// Create an account, agreeing to the terms of service
    async fn register(&self, email: Option<&str>) -> EngineResult<RegistrationResource>;

    /// Create an account bound to CA-issued EAB credentials
    async fn register_with_eab(
        &self,
        email: Option<&str>,
        eab_key_id: &str,
        eab_hmac_key: &str,
    ) -> EngineResult<RegistrationResource>;

    /// Deactivate the session's account
    async fn delete_registration(&self) -> EngineResult<()>;

    async fn new_order(&self, domains: &[String]) -> EngineResult<Order>;

    async fn get_order(&self, url: &str) -> EngineResult<Order>;

    /// Submit a DER-encoded CSR to the order's finalize URL
    async fn finalize_order(&self, finalize_url: &str, csr_der: &[u8]) -> EngineResult<Order>;

    async fn get_authorization(&self, url: &str) -> EngineResult<Authorization>;

    /// Tell the CA the challenge is ready to be validated
    async fn accept_challenge(&self, url: &str) -> EngineResult<ChallengeUpdate>;

    /// Download the default chain followed by every alternate chain
    async fn get_certificates(&self, url: &str, bundle: bool)
        -> EngineResult<Vec<CertificateChain>>;

    /// Revoke a DER-encoded leaf certificate
    async fn revoke_certificate(&self, cert_der: &[u8]) -> EngineResult<()>;

    /// `token || '.' || thumbprint(account key)`
    fn key_authorization(&self, token: &str) -> EngineResult<String>;
}

/// Opens engine sessions
#[async_trait]
pub trait EngineConnector: Send + Sync {
    /// Open a session for `key` against `directory_url`.
    ///
    /// `registration` carries the stored account URL for key-id signed
    /// requests; it is `None` only before registration.
    async fn connect(
        &self,
        directory_url: &str,
        key: &PrivateKey,
        registration: Option<&RegistrationResource>,
    ) -> EngineResult<Arc<dyn AcmeEngine>>;
}
