//! GoDaddy DNS provider implementation
//!
//! GoDaddy has no per-record ids: TXT records are replaced as a set per name,
//! so presenting appends to the existing set and cleanup rewrites it without
//! the challenge value.
//! API documentation: <https://developer.godaddy.com/doc/endpoint/domains>

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{build_client, check_response, send_error};
use crate::dns::provider::{
    candidate_zones, challenge_record, relative_record_name, unfqdn, DnsProvider,
    DnsProviderError, DnsResult, RecordBook, RecordRef, DEFAULT_TXT_TTL,
};

/// GoDaddy API base URL
pub const GODADDY_API_BASE: &str = "https://api.godaddy.com";

/// GoDaddy DNS provider
#[derive(Debug)]
pub struct GoDaddyProvider {
    client: Client,
    api_key: String,
    api_secret: String,
    base_url: String,
    timeout: Duration,
    records: RecordBook,
}

impl GoDaddyProvider {
    pub fn new(api_key: &str, api_secret: &str, timeout: Duration) -> DnsResult<Self> {
        Ok(Self {
            client: build_client(timeout)?,
            api_key: api_key.to_string(),
            api_secret: api_secret.to_string(),
            base_url: GODADDY_API_BASE.to_string(),
            timeout,
            records: RecordBook::default(),
        })
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    fn authorization(&self) -> String {
        format!("sso-key {}:{}", self.api_key, self.api_secret)
    }

    fn records_url(&self, zone: &str, name: &str) -> String {
        format!("{}/v1/domains/{}/records/TXT/{}", self.base_url, zone, name)
    }

    /// Registered domain in the account that hosts `fqdn`
    async fn find_zone(&self, fqdn: &str) -> DnsResult<String> {
        for candidate in candidate_zones(fqdn) {
            let response = self
                .client
                .get(format!("{}/v1/domains/{}", self.base_url, candidate))
                .header(reqwest::header::AUTHORIZATION, self.authorization())
                .send()
                .await
                .map_err(|e| send_error(e, self.timeout, "look up domain"))?;

            if response.status() == StatusCode::NOT_FOUND {
                continue;
            }
            check_response(response, "look up domain").await?;
            debug!(fqdn, zone = candidate, "Found GoDaddy domain");
            return Ok(candidate.to_string());
        }

        Err(DnsProviderError::ZoneNotFound {
            domain: unfqdn(fqdn).to_string(),
        })
    }

    async fn txt_records(&self, zone: &str, name: &str) -> DnsResult<Vec<TxtRecord>> {
        let response = self
            .client
            .get(self.records_url(zone, name))
            .header(reqwest::header::AUTHORIZATION, self.authorization())
            .send()
            .await
            .map_err(|e| send_error(e, self.timeout, "list records"))?;
        let response = check_response(response, "list records").await?;
        response.json().await.map_err(|e| {
            DnsProviderError::ApiRequest(format!("Failed to parse records response: {}", e))
        })
    }

    async fn replace_records(&self, zone: &str, name: &str, records: &[TxtRecord]) -> DnsResult<()> {
        let response = self
            .client
            .put(self.records_url(zone, name))
            .header(reqwest::header::AUTHORIZATION, self.authorization())
            .json(records)
            .send()
            .await
            .map_err(|e| send_error(e, self.timeout, "replace records"))?;
        check_response(response, "replace records").await?;
        Ok(())
    }
}

#[async_trait]
impl DnsProvider for GoDaddyProvider {
    fn name(&self) -> &'static str {
        "godaddy"
    }

    async fn present(&self, domain: &str, _token: &str, key_authorization: &str) -> DnsResult<()> {
        let record = challenge_record(domain, key_authorization);
        let zone = self.find_zone(&record.fqdn).await?;
        let name = relative_record_name(&record.fqdn, &zone);

        let mut records = self.txt_records(&zone, &name).await?;
        if !records.iter().any(|r| r.data == record.value) {
            records.push(TxtRecord {
                data: record.value.clone(),
                ttl: DEFAULT_TXT_TTL,
            });
        }

        self.replace_records(&zone, &name, &records)
            .await
            .map_err(|e| DnsProviderError::RecordCreation {
                record_name: record.fqdn.clone(),
                message: e.to_string(),
            })?;

        debug!(fqdn = %record.fqdn, zone = %zone, "TXT record created");
        self.records.insert(
            &record,
            RecordRef {
                zone,
                record_id: name,
            },
        );
        Ok(())
    }

    async fn clean_up(&self, domain: &str, _token: &str, key_authorization: &str) -> DnsResult<()> {
        let record = challenge_record(domain, key_authorization);
        let Some(reference) = self.records.take(&record) else {
            debug!(fqdn = %record.fqdn, "No record created by this provider, nothing to clean up");
            return Ok(());
        };
        let (zone, name) = (reference.zone, reference.record_id);

        let remaining: Vec<TxtRecord> = self
            .txt_records(&zone, &name)
            .await?
            .into_iter()
            .filter(|r| r.data != record.value)
            .collect();

        if !remaining.is_empty() {
            return self
                .replace_records(&zone, &name, &remaining)
                .await
                .map_err(|e| DnsProviderError::RecordDeletion {
                    record_id: name.clone(),
                    message: e.to_string(),
                });
        }

        let response = self
            .client
            .delete(self.records_url(&zone, &name))
            .header(reqwest::header::AUTHORIZATION, self.authorization())
            .send()
            .await
            .map_err(|e| send_error(e, self.timeout, "delete records"))?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(());
        }
        check_response(response, "delete records")
            .await
            .map_err(|e| DnsProviderError::RecordDeletion {
                record_id: name.clone(),
                message: e.to_string(),
            })?;

        debug!(fqdn = %record.fqdn, "TXT record deleted");
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct TxtRecord {
    data: String,
    #[serde(default = "default_ttl")]
    ttl: u32,
}

fn default_ttl() -> u32 {
    DEFAULT_TXT_TTL
}
