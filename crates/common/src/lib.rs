//! Common utilities shared by the easyacme crates
//!
//! # Module Organization
//!
//! - [`errors`]: Error taxonomy and result alias
//! - [`ids`]: Type-safe identifier newtypes (AccountId, CertificateId, DnsProviderId)
//! - [`observability`]: Logging bootstrap

pub mod errors;
pub mod ids;
pub mod observability;

pub use errors::{EasyAcmeError, EasyAcmeResult, ErrorKind};
pub use ids::{AccountId, CertificateId, DnsProviderId};
pub use observability::{init_tracing, LogFormat};
