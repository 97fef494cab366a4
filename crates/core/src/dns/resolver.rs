//! TXT lookups against public DNS.

use std::net::{IpAddr, SocketAddr};
use std::time::Duration;

use async_trait::async_trait;
use hickory_resolver::config::{NameServerConfig, ResolverConfig, ResolverOpts};
use hickory_resolver::name_server::TokioConnectionProvider;
use hickory_resolver::proto::xfer::Protocol;
use hickory_resolver::{Resolver, TokioResolver};
use tracing::trace;

use super::provider::{DnsProviderError, DnsResult};

/// Source of TXT record values.
///
/// A name that does not exist or has no TXT records yields an empty list,
/// not an error.
#[async_trait]
pub trait TxtResolver: Send + Sync + std::fmt::Debug {
    async fn lookup_txt(&self, fqdn: &str) -> DnsResult<Vec<String>>;
}

/// Resolver backed by hickory with caching disabled
#[derive(Debug)]
pub struct HickoryTxtResolver {
    resolver: TokioResolver,
}

impl HickoryTxtResolver {
    /// Query the given nameservers, or the system configuration when empty
    pub fn new(nameservers: &[IpAddr]) -> DnsResult<Self> {
        let mut opts = ResolverOpts::default();
        opts.timeout = Duration::from_secs(5);
        opts.attempts = 3;
        opts.cache_size = 0;

        let resolver = if nameservers.is_empty() {
            Resolver::builder_tokio()
                .map_err(|e| {
                    DnsProviderError::Configuration(format!(
                        "Failed to read system resolver configuration: {}",
                        e
                    ))
                })?
                .with_options(opts)
                .build()
        } else {
            let mut config = ResolverConfig::new();
            for ip in nameservers {
                config.add_name_server(NameServerConfig::new(
                    SocketAddr::new(*ip, 53),
                    Protocol::Udp,
                ));
            }
            Resolver::builder_with_config(config, TokioConnectionProvider::default())
                .with_options(opts)
                .build()
        };

        Ok(Self { resolver })
    }
}

#[async_trait]
impl TxtResolver for HickoryTxtResolver {
    async fn lookup_txt(&self, fqdn: &str) -> DnsResult<Vec<String>> {
        match self.resolver.txt_lookup(fqdn).await {
            Ok(records) => {
                let values: Vec<String> = records
                    .iter()
                    .map(|record| {
                        // Character strings of one record are concatenated
                        record
                            .txt_data()
                            .iter()
                            .map(|data| String::from_utf8_lossy(data))
                            .collect()
                    })
                    .collect();
                trace!(fqdn, ?values, "TXT lookup answered");
                Ok(values)
            }
            Err(e) => {
                let message = e.to_string().to_lowercase();
                if message.contains("no records found")
                    || message.contains("nxdomain")
                    || message.contains("record not found")
                {
                    trace!(fqdn, "No TXT records");
                    Ok(Vec::new())
                } else {
                    Err(DnsProviderError::Lookup {
                        fqdn: fqdn.to_string(),
                        message: e.to_string(),
                    })
                }
            }
        }
    }
}
