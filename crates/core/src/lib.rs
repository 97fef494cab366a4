#![allow(clippy::too_many_arguments)]

//! easyacme Library
//!
//! ACME certificate issuance, tracking and revocation with DNS-01 validation.
//!
//! Two issuance modes share one pipeline:
//!
//! - **Manual**: the caller gets the `_acme-challenge` TXT records, publishes
//!   them itself, then asks for completion. A local precheck confirms the
//!   records resolve before the CA is asked to validate.
//! - **Automatic**: a configured DNS provider API publishes and removes the
//!   records without caller round-trips.
//!
//! # Example
//!
//! ```ignore
//! use easyacme::service::{AuthorizeRequest, IssueRequest, Services};
//! use easyacme_config::Config;
//!
//! let services = Services::from_config(&Config::default())?;
//! let auth = services.certificates.create_manual_authorization(&AuthorizeRequest {
//!     key_type: "P256".into(),
//!     account_id,
//!     domains: vec!["example.com".into()],
//! }).await?;
//! // publish auth.info_list, then
//! let cert = services.certificates.issue(&IssueRequest { .. }, None).await?;
//! ```

// ============================================================================
// Module Declarations
// ============================================================================

pub mod accounts;
pub mod challenge;
pub mod dns;
pub mod engine;
pub mod finalize;
pub mod keys;
pub mod model;
pub mod order;
pub mod pending;
pub mod poll;
pub mod precheck;
pub mod revoke;
pub mod service;
pub mod store;

// ============================================================================
// Public API Re-exports
// ============================================================================

// Issuance components
pub use accounts::{AccountRegistrar, RegisterAccount};
pub use challenge::{check_authorization_status, ChallengeResolver};
pub use finalize::{check_order_status, CertInfo, Finalizer, IssuedCertificate};
pub use order::{AutomaticSession, DomainChallenge, ManualAuthorization, OrderNegotiator};
pub use pending::{PendingAuthorization, PendingAuthorizationCache};
pub use precheck::DnsPrecheck;
pub use revoke::Revoker;

// Polling
pub use poll::{drive, Poll, PollSchedule, Poller};

// Protocol engine
pub use engine::{AcmeEngine, EngineConnector, EngineError, HttpConnector};

// Keys
pub use keys::{KeyType, PrivateKey};

// Records and read models
pub use model::{
    Account, AccountStatus, AccountView, CertType, Certificate, CertificateStatus,
    CertificateView, DnsProviderRecord, DnsProviderView, EffectiveStatus, Page, PageRequest,
};

// Persistence
pub use store::{JsonFileStore, MemoryStore, Store, StoreError};

// Services
pub use service::{AccountService, CertificateService, DnsProviderService, Services};

// Shared types
pub use easyacme_common::{
    AccountId, CertificateId, DnsProviderId, EasyAcmeError, EasyAcmeResult, ErrorKind,
};
