//! Hetzner DNS provider implementation
//!
//! Uses the Hetzner DNS API to manage TXT records for DNS-01 challenges.
//! API documentation: <https://dns.hetzner.com/api-docs>

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::RwLock;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use super::{build_client, check_response, send_error};
use crate::dns::provider::{
    candidate_zones, challenge_record, relative_record_name, unfqdn, DnsProvider,
    DnsProviderError, DnsResult, RecordBook, RecordRef, CHALLENGE_TTL,
};

/// Hetzner DNS API base URL
pub const HETZNER_API_BASE: &str = "https://dns.hetzner.com/api/v1";

const AUTH_HEADER: &str = "Auth-API-Token";

/// Hetzner DNS provider
#[derive(Debug)]
pub struct HetznerProvider {
    client: Client,
    token: String,
    base_url: String,
    timeout: Duration,
    /// Cache of zone name -> zone id
    zone_cache: RwLock<HashMap<String, String>>,
    records: RecordBook,
}

impl HetznerProvider {
    pub fn new(token: &str, timeout: Duration) -> DnsResult<Self> {
        Ok(Self {
            client: build_client(timeout)?,
            token: token.to_string(),
            base_url: HETZNER_API_BASE.to_string(),
            timeout,
            zone_cache: RwLock::new(HashMap::new()),
            records: RecordBook::default(),
        })
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    /// Zone (id, name) hosting `fqdn`
    async fn find_zone(&self, fqdn: &str) -> DnsResult<(String, String)> {
        let candidates = candidate_zones(fqdn);

        {
            let cache = self.zone_cache.read();
            if let Some((name, id)) = candidates
                .iter()
                .find_map(|c| cache.get(*c).map(|id| (c.to_string(), id.clone())))
            {
                trace!(fqdn, zone_id = %id, "Zone ID found in cache");
                return Ok((id, name));
            }
        }

        let zones = self.list_zones().await?;
        let zone = candidates
            .iter()
            .find_map(|c| zones.iter().find(|z| z.name == *c))
            .ok_or_else(|| DnsProviderError::ZoneNotFound {
                domain: unfqdn(fqdn).to_string(),
            })?;

        self.zone_cache
            .write()
            .insert(zone.name.clone(), zone.id.clone());
        debug!(fqdn, zone_id = %zone.id, zone_name = %zone.name, "Found zone for domain");
        Ok((zone.id.clone(), zone.name.clone()))
    }

    async fn list_zones(&self) -> DnsResult<Vec<Zone>> {
        let response = self
            .client
            .get(format!("{}/zones", self.base_url))
            .header(AUTH_HEADER, &self.token)
            .send()
            .await
            .map_err(|e| send_error(e, self.timeout, "list zones"))?;
        let response = check_response(response, "list zones").await?;

        let zones_response: ZonesResponse = response.json().await.map_err(|e| {
            DnsProviderError::ApiRequest(format!("Failed to parse zones response: {}", e))
        })?;
        Ok(zones_response.zones)
    }
}

#[async_trait]
impl DnsProvider for HetznerProvider {
    fn name(&self) -> &'static str {
        "hetzner"
    }

    async fn present(&self, domain: &str, _token: &str, key_authorization: &str) -> DnsResult<()> {
        let record = challenge_record(domain, key_authorization);
        let (zone_id, zone_name) = self.find_zone(&record.fqdn).await?;
        let relative_name = relative_record_name(&record.fqdn, &zone_name);

        debug!(
            domain = %domain,
            zone_id = %zone_id,
            record_name = %relative_name,
            "Creating TXT record"
        );

        let request = CreateRecordRequest {
            zone_id: zone_id.clone(),
            name: relative_name.clone(),
            r#type: "TXT".to_string(),
            value: record.value.clone(),
            ttl: Some(CHALLENGE_TTL),
        };

        let response = self
            .client
            .post(format!("{}/records", self.base_url))
            .header(AUTH_HEADER, &self.token)
            .json(&request)
            .send()
            .await
            .map_err(|e| send_error(e, self.timeout, "create record"))?;
        let response = check_response(response, "create record")
            .await
            .map_err(|e| DnsProviderError::RecordCreation {
                record_name: relative_name.clone(),
                message: e.to_string(),
            })?;

        let record_response: RecordResponse =
            response
                .json()
                .await
                .map_err(|e| DnsProviderError::RecordCreation {
                    record_name: relative_name.clone(),
                    message: format!("Failed to parse response: {}", e),
                })?;

        debug!(record_id = %record_response.record.id, "TXT record created successfully");
        self.records.insert(
            &record,
            RecordRef {
                zone: zone_id,
                record_id: record_response.record.id,
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

        debug!(record_id = %reference.record_id, "Deleting TXT record");
        let response = self
            .client
            .delete(format!("{}/records/{}", self.base_url, reference.record_id))
            .header(AUTH_HEADER, &self.token)
            .send()
            .await
            .map_err(|e| send_error(e, self.timeout, "delete record"))?;

        // 404 is fine - record might already be deleted
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

        debug!(record_id = %reference.record_id, "TXT record deleted successfully");
        Ok(())
    }
}

// Hetzner API types

#[derive(Debug, Deserialize)]
struct ZonesResponse {
    zones: Vec<Zone>,
}

#[derive(Debug, Deserialize)]
struct Zone {
    id: String,
    name: String,
}

#[derive(Debug, Serialize)]
struct CreateRecordRequest {
    zone_id: String,
    name: String,
    r#type: String,
    value: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    ttl: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct RecordResponse {
    record: Record,
}

#[derive(Debug, Deserialize)]
struct Record {
    id: String,
}
