//! DNS-01 challenge support
//!
//! # Architecture
//!
//! - [`DnsProvider`] - Trait for vendor API implementations
//! - [`ProviderRegistry`] - Builds providers from stored records by type
//! - [`TxtResolver`] - TXT lookups used by the precheck and propagation wait
//! - [`PropagationChecker`] - Waits for published records in the automatic flow
//!
//! # Providers
//!
//! - [`TencentCloudProvider`] - DNSPod API 3.0
//! - [`AliyunProvider`] - Alibaba Cloud DNS
//! - [`CloudflareProvider`] - Cloudflare API v4
//! - [`GoDaddyProvider`] - GoDaddy Domains API
//! - [`HetznerProvider`] - Hetzner DNS API

mod credentials;
mod propagation;
mod provider;
mod providers;
mod registry;
mod resolver;

pub use credentials::ProviderCredentials;
pub use propagation::PropagationChecker;
pub use provider::{
    candidate_zones, challenge_record, challenge_record_fqdn, challenge_value, normalize_domain,
    relative_record_name, unfqdn, ChallengeRecord, DnsProvider, DnsProviderError, DnsResult,
    ACME_CHALLENGE_RECORD,
};
pub use providers::{
    AliyunProvider, CloudflareProvider, GoDaddyProvider, HetznerProvider, TencentCloudProvider,
};
pub use registry::{DnsProviderType, ProviderFactory, ProviderOptions, ProviderRegistry};
pub use resolver::{HickoryTxtResolver, TxtResolver};
