//! Provider type to constructor mapping.
//!
//! Stored provider records name their vendor by a type string; the registry
//! turns a record into a live [`DnsProvider`]. Unknown type strings are
//! rejected before any API call is made.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::debug;

use easyacme_common::{EasyAcmeError, EasyAcmeResult};
use easyacme_config::DnsProvidersConfig;

use super::credentials::ProviderCredentials;
use super::provider::{DnsProvider, DnsResult};
use super::providers::{
    AliyunProvider, CloudflareProvider, GoDaddyProvider, HetznerProvider, TencentCloudProvider,
};
use crate::model::DnsProviderRecord;

/// Supported DNS vendors
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DnsProviderType {
    TencentCloud,
    Aliyun,
    Cloudflare,
    GoDaddy,
    Hetzner,
}

impl DnsProviderType {
    pub const ALL: [DnsProviderType; 5] = [
        DnsProviderType::TencentCloud,
        DnsProviderType::Aliyun,
        DnsProviderType::Cloudflare,
        DnsProviderType::GoDaddy,
        DnsProviderType::Hetzner,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            DnsProviderType::TencentCloud => "tencentcloud",
            DnsProviderType::Aliyun => "aliyun",
            DnsProviderType::Cloudflare => "cloudflare",
            DnsProviderType::GoDaddy => "godaddy",
            DnsProviderType::Hetzner => "hetzner",
        }
    }
}

impl fmt::Display for DnsProviderType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DnsProviderType {
    type Err = EasyAcmeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase();
        DnsProviderType::ALL
            .into_iter()
            .find(|t| t.as_str() == normalized)
            .ok_or_else(|| {
                EasyAcmeError::validation(format!("unsupported DNS provider type: {}", s))
            })
    }
}

/// Per-build options shared by every vendor
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderOptions {
    pub api_timeout: Duration,
    /// API base override
    pub endpoint: Option<String>,
}

impl Default for ProviderOptions {
    fn default() -> Self {
        Self {
            api_timeout: Duration::from_secs(30),
            endpoint: None,
        }
    }
}

/// Constructor for one vendor
pub type ProviderFactory =
    fn(&ProviderCredentials, &ProviderOptions) -> DnsResult<Arc<dyn DnsProvider>>;

/// Maps provider types to constructors
#[derive(Clone)]
pub struct ProviderRegistry {
    factories: HashMap<DnsProviderType, ProviderFactory>,
    endpoints: HashMap<DnsProviderType, String>,
    api_timeout: Duration,
}

impl fmt::Debug for ProviderRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut types: Vec<&str> = self.factories.keys().map(|t| t.as_str()).collect();
        types.sort_unstable();
        f.debug_struct("ProviderRegistry")
            .field("types", &types)
            .field("endpoints", &self.endpoints)
            .field("api_timeout", &self.api_timeout)
            .finish()
    }
}

impl Default for ProviderRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}

impl ProviderRegistry {
    /// Registry with no vendors
    pub fn empty() -> Self {
        Self {
            factories: HashMap::new(),
            endpoints: HashMap::new(),
            api_timeout: ProviderOptions::default().api_timeout,
        }
    }

    /// Registry with every built-in vendor
    pub fn with_defaults() -> Self {
        let mut registry = Self::empty();
        registry.register(DnsProviderType::TencentCloud, build_tencentcloud);
        registry.register(DnsProviderType::Aliyun, build_aliyun);
        registry.register(DnsProviderType::Cloudflare, build_cloudflare);
        registry.register(DnsProviderType::GoDaddy, build_godaddy);
        registry.register(DnsProviderType::Hetzner, build_hetzner);
        registry
    }

    /// Built-in vendors with timeouts and endpoint overrides from configuration
    pub fn from_config(config: &DnsProvidersConfig) -> EasyAcmeResult<Self> {
        let mut registry = Self::with_defaults();
        registry.api_timeout = config.api_timeout();
        for (kind, url) in &config.endpoints {
            let kind: DnsProviderType = kind.parse()?;
            registry.endpoints.insert(kind, url.clone());
        }
        Ok(registry)
    }

    /// Add or replace the constructor for a type
    pub fn register(&mut self, kind: DnsProviderType, factory: ProviderFactory) {
        self.factories.insert(kind, factory);
    }

    pub fn supports(&self, kind: DnsProviderType) -> bool {
        self.factories.contains_key(&kind)
    }

    /// Build a live provider for a stored record
    pub fn build(&self, record: &DnsProviderRecord) -> EasyAcmeResult<Arc<dyn DnsProvider>> {
        self.build_typed(record.provider_type, &ProviderCredentials::from(record))
    }

    /// Build from an unparsed type string, as entered by a user
    pub fn build_from_parts(
        &self,
        kind: &str,
        credentials: &ProviderCredentials,
    ) -> EasyAcmeResult<Arc<dyn DnsProvider>> {
        self.build_typed(kind.parse()?, credentials)
    }

    fn build_typed(
        &self,
        kind: DnsProviderType,
        credentials: &ProviderCredentials,
    ) -> EasyAcmeResult<Arc<dyn DnsProvider>> {
        let factory = self.factories.get(&kind).ok_or_else(|| {
            EasyAcmeError::validation(format!("unsupported DNS provider type: {}", kind))
        })?;
        let options = ProviderOptions {
            api_timeout: self.api_timeout,
            endpoint: self.endpoints.get(&kind).cloned(),
        };
        debug!(provider = %kind, endpoint = ?options.endpoint, "Building DNS provider");
        factory(credentials, &options).map_err(|e| e.into_error("build DNS provider"))
    }
}

fn build_tencentcloud(
    credentials: &ProviderCredentials,
    options: &ProviderOptions,
) -> DnsResult<Arc<dyn DnsProvider>> {
    let (id, key) = credentials.key_pair("tencentcloud")?;
    let mut provider = TencentCloudProvider::new(id, key, options.api_timeout)?;
    if let Some(endpoint) = &options.endpoint {
        provider = provider.with_base_url(endpoint.as_str())?;
    }
    Ok(Arc::new(provider))
}

fn build_aliyun(
    credentials: &ProviderCredentials,
    options: &ProviderOptions,
) -> DnsResult<Arc<dyn DnsProvider>> {
    let (id, key) = credentials.key_pair("aliyun")?;
    let mut provider = AliyunProvider::new(id, key, options.api_timeout)?;
    if let Some(endpoint) = &options.endpoint {
        provider = provider.with_base_url(endpoint.as_str());
    }
    Ok(Arc::new(provider))
}

fn build_cloudflare(
    credentials: &ProviderCredentials,
    options: &ProviderOptions,
) -> DnsResult<Arc<dyn DnsProvider>> {
    let token = credentials.token("cloudflare")?;
    let mut provider = CloudflareProvider::new(token, options.api_timeout)?;
    if let Some(endpoint) = &options.endpoint {
        provider = provider.with_base_url(endpoint.as_str());
    }
    Ok(Arc::new(provider))
}

fn build_godaddy(
    credentials: &ProviderCredentials,
    options: &ProviderOptions,
) -> DnsResult<Arc<dyn DnsProvider>> {
    let (key, secret) = credentials.key_pair("godaddy")?;
    let mut provider = GoDaddyProvider::new(key, secret, options.api_timeout)?;
    if let Some(endpoint) = &options.endpoint {
        provider = provider.with_base_url(endpoint.as_str());
    }
    Ok(Arc::new(provider))
}

fn build_hetzner(
    credentials: &ProviderCredentials,
    options: &ProviderOptions,
) -> DnsResult<Arc<dyn DnsProvider>> {
    let token = credentials.token("hetzner")?;
    let mut provider = HetznerProvider::new(token, options.api_timeout)?;
    if let Some(endpoint) = &options.endpoint {
        provider = provider.with_base_url(endpoint.as_str());
    }
    Ok(Arc::new(provider))
}
