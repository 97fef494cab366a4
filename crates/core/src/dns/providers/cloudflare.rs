//! Cloudflare DNS provider implementation
//!
//! Uses the Cloudflare API v4 with a scoped API token (Zone:DNS:Edit).
//! API documentation: <https://developers.cloudflare.com/api/>

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{build_client, check_response, send_error};
use crate::dns::provider::{
    candidate_zones, challenge_record, unfqdn, DnsProvider, DnsProviderError, DnsResult,
    RecordBook, RecordRef, CHALLENGE_TTL,
};

/// Cloudflare API base URL
pub const CLOUDFLARE_API_BASE: &str = "https://api.cloudflare.com/client/v4";

/// Cloudflare DNS provider
#[derive(Debug)]
pub struct CloudflareProvider {
    client: Client,
    token: String,
    base_url: String,
    timeout: Duration,
    records: RecordBook,
}

impl CloudflareProvider {
    pub fn new(token: &str, timeout: Duration) -> DnsResult<Self> {
        Ok(Self {
            client: build_client(timeout)?,
            token: token.to_string(),
            base_url: CLOUDFLARE_API_BASE.to_string(),
            timeout,
            records: RecordBook::default(),
        })
    }

    /// Point the client at another API base (proxies, tests)
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    /// Zone id of the most specific zone hosting `fqdn`
    async fn find_zone(&self, fqdn: &str) -> DnsResult<String> {
        for candidate in candidate_zones(fqdn) {
            let response = self
                .client
                .get(format!("{}/zones", self.base_url))
                .bearer_auth(&self.token)
                .query(&[("name", candidate)])
                .send()
                .await
                .map_err(|e| send_error(e, self.timeout, "list zones"))?;
            let response = check_response(response, "list zones").await?;

            let body: ApiResponse<Vec<Zone>> = response.json().await.map_err(|e| {
                DnsProviderError::ApiRequest(format!("Failed to parse zones response: {}", e))
            })?;
            if !body.success {
                return Err(DnsProviderError::ApiRequest(body.error_message()));
            }
            if let Some(zone) = body.result.into_iter().flatten().next() {
                debug!(fqdn, zone_id = %zone.id, zone_name = %zone.name, "Found Cloudflare zone");
                return Ok(zone.id);
            }
        }

        Err(DnsProviderError::ZoneNotFound {
            domain: unfqdn(fqdn).to_string(),
        })
    }
}

#[async_trait]
impl DnsProvider for CloudflareProvider {
    fn name(&self) -> &'static str {
        "cloudflare"
    }

    async fn present(&self, domain: &str, _token: &str, key_authorization: &str) -> DnsResult<()> {
        let record = challenge_record(domain, key_authorization);
        let zone_id = self.find_zone(&record.fqdn).await?;

        let request = CreateRecordRequest {
            r#type: "TXT",
            name: unfqdn(&record.fqdn),
            content: &record.value,
            ttl: CHALLENGE_TTL,
        };

        let response = self
            .client
            .post(format!("{}/zones/{}/dns_records", self.base_url, zone_id))
            .bearer_auth(&self.token)
            .json(&request)
            .send()
            .await
            .map_err(|e| send_error(e, self.timeout, "create record"))?;
        let response = check_response(response, "create record")
            .await
            .map_err(|e| DnsProviderError::RecordCreation {
                record_name: record.fqdn.clone(),
                message: e.to_string(),
            })?;

        let body: ApiResponse<DnsRecord> =
            response
                .json()
                .await
                .map_err(|e| DnsProviderError::RecordCreation {
                    record_name: record.fqdn.clone(),
                    message: format!("Failed to parse response: {}", e),
                })?;
        if !body.success {
            return Err(DnsProviderError::RecordCreation {
                record_name: record.fqdn.clone(),
                message: body.error_message(),
            });
        }
        let created = body.result.ok_or_else(|| DnsProviderError::RecordCreation {
            record_name: record.fqdn.clone(),
            message: "response carried no record".to_string(),
        })?;

        debug!(fqdn = %record.fqdn, record_id = %created.id, "TXT record created");
        self.records.insert(
            &record,
            RecordRef {
                zone: zone_id,
                record_id: created.id,
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

        let response = self
            .client
            .delete(format!(
                "{}/zones/{}/dns_records/{}",
                self.base_url, reference.zone, reference.record_id
            ))
            .bearer_auth(&self.token)
            .send()
            .await
            .map_err(|e| send_error(e, self.timeout, "delete record"))?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            debug!(record_id = %reference.record_id, "Record already deleted");
            return Ok(());
        }
        check_response(response, "delete record")
            .await
            .map_err(|e| DnsProviderError::RecordDeletion {
                record_id: reference.record_id.clone(),
                message: e.to_string(),
            })?;

        debug!(record_id = %reference.record_id, "TXT record deleted");
        Ok(())
    }
}

// Cloudflare API types

#[derive(Debug, Deserialize)]
struct ApiResponse<T> {
    success: bool,
    #[serde(default)]
    errors: Vec<ApiMessage>,
    result: Option<T>,
}

impl<T> ApiResponse<T> {
    fn error_message(&self) -> String {
        if self.errors.is_empty() {
            return "request was not successful".to_string();
        }
        self.errors
            .iter()
            .map(|e| format!("{}: {}", e.code, e.message))
            .collect::<Vec<_>>()
            .join("; ")
    }
}

#[derive(Debug, Deserialize)]
struct ApiMessage {
    #[serde(default)]
    code: i64,
    #[serde(default)]
    message: String,
}

#[derive(Debug, Deserialize)]
struct Zone {
    id: String,
    name: String,
}

#[derive(Debug, Serialize)]
struct CreateRecordRequest<'a> {
    r#type: &'a str,
    name: &'a str,
    content: &'a str,
    ttl: u32,
}

#[derive(Debug, Deserialize)]
struct DnsRecord {
    id: String,
}
