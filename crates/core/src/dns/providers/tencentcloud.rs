//! Tencent Cloud (DNSPod) DNS provider implementation
//!
//! Uses the DNSPod API 3.0. Requests are JSON POSTs signed with
//! TC3-HMAC-SHA256.
//! API documentation: <https://www.tencentcloud.com/document/api/1157/49025>

use std::time::Duration;

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use hmac::{Hmac, Mac};
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::json;
use sha2::{Digest, Sha256};
use tracing::{debug, trace};

use super::{build_client, check_response, send_error};
use crate::dns::provider::{
    candidate_zones, challenge_record, relative_record_name, unfqdn, DnsProvider,
    DnsProviderError, DnsResult, RecordBook, RecordRef, DEFAULT_TXT_TTL,
};

/// DNSPod API endpoint
pub const TENCENTCLOUD_API_BASE: &str = "https://dnspod.tencentcloudapi.com";

const SERVICE: &str = "dnspod";
const API_VERSION: &str = "2021-03-23";
const ALGORITHM: &str = "TC3-HMAC-SHA256";
const CONTENT_TYPE: &str = "application/json; charset=utf-8";
/// Default resolution line
const RECORD_LINE: &str = "默认";

/// Tencent Cloud DNS provider
#[derive(Debug)]
pub struct TencentCloudProvider {
    client: Client,
    secret_id: String,
    secret_key: String,
    base_url: String,
    host: String,
    timeout: Duration,
    records: RecordBook,
}

impl TencentCloudProvider {
    pub fn new(secret_id: &str, secret_key: &str, timeout: Duration) -> DnsResult<Self> {
        Ok(Self {
            client: build_client(timeout)?,
            secret_id: secret_id.to_string(),
            secret_key: secret_key.to_string(),
            base_url: TENCENTCLOUD_API_BASE.to_string(),
            host: host_of(TENCENTCLOUD_API_BASE)?,
            timeout,
            records: RecordBook::default(),
        })
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> DnsResult<Self> {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        self.host = host_of(&base_url)?;
        self.base_url = base_url;
        Ok(self)
    }

    async fn call<T: DeserializeOwned>(
        &self,
        action: &str,
        payload: &serde_json::Value,
    ) -> DnsResult<T> {
        let body = serde_json::to_string(payload)
            .map_err(|e| DnsProviderError::ApiRequest(format!("Failed to encode {}: {}", action, e)))?;
        let timestamp = Utc::now().timestamp();
        let authorization = authorization(
            &self.secret_id,
            &self.secret_key,
            &self.host,
            timestamp,
            &body,
        )?;

        trace!(action, "Calling DNSPod API");
        let response = self
            .client
            .post(format!("{}/", self.base_url))
            .header(reqwest::header::AUTHORIZATION, authorization)
            .header(reqwest::header::CONTENT_TYPE, CONTENT_TYPE)
            .header("X-TC-Action", action)
            .header("X-TC-Version", API_VERSION)
            .header("X-TC-Timestamp", timestamp.to_string())
            .body(body)
            .send()
            .await
            .map_err(|e| send_error(e, self.timeout, action))?;
        let response = check_response(response, action).await?;

        let envelope: Envelope<T> = response.json().await.map_err(|e| {
            DnsProviderError::ApiRequest(format!("Failed to parse {} response: {}", action, e))
        })?;
        envelope.response.into_result()
    }

    async fn find_zone(&self, fqdn: &str) -> DnsResult<String> {
        let list: DomainListResponse = self.call("DescribeDomainList", &json!({})).await?;
        candidate_zones(fqdn)
            .into_iter()
            .find(|c| list.domain_list.iter().any(|d| d.name == *c))
            .map(str::to_string)
            .ok_or_else(|| DnsProviderError::ZoneNotFound {
                domain: unfqdn(fqdn).to_string(),
            })
    }
}

#[async_trait]
impl DnsProvider for TencentCloudProvider {
    fn name(&self) -> &'static str {
        "tencentcloud"
    }

    async fn present(&self, domain: &str, _token: &str, key_authorization: &str) -> DnsResult<()> {
        let record = challenge_record(domain, key_authorization);
        let zone = self.find_zone(&record.fqdn).await?;
        let sub_domain = relative_record_name(&record.fqdn, &zone);

        let created: CreateRecordResponse = self
            .call(
                "CreateRecord",
                &json!({
                    "Domain": zone,
                    "SubDomain": sub_domain,
                    "RecordType": "TXT",
                    "RecordLine": RECORD_LINE,
                    "Value": record.value,
                    "TTL": DEFAULT_TXT_TTL,
                }),
            )
            .await
            .map_err(|e| DnsProviderError::RecordCreation {
                record_name: record.fqdn.clone(),
                message: e.to_string(),
            })?;

        debug!(fqdn = %record.fqdn, record_id = created.record_id, "TXT record created");
        self.records.insert(
            &record,
            RecordRef {
                zone,
                record_id: created.record_id.to_string(),
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
        let record_id: u64 = reference.record_id.parse().map_err(|_| {
            DnsProviderError::RecordDeletion {
                record_id: reference.record_id.clone(),
                message: "record id is not numeric".to_string(),
            }
        })?;

        let result: DnsResult<serde_json::Value> = self
            .call(
                "DeleteRecord",
                &json!({ "Domain": reference.zone, "RecordId": record_id }),
            )
            .await;
        match result {
            Ok(_) => {
                debug!(record_id, "TXT record deleted");
                Ok(())
            }
            Err(DnsProviderError::ApiRequest(message)) if is_record_gone(&message) => {
                debug!(record_id, "Record already deleted");
                Ok(())
            }
            Err(e) => Err(DnsProviderError::RecordDeletion {
                record_id: reference.record_id,
                message: e.to_string(),
            }),
        }
    }
}

fn host_of(base_url: &str) -> DnsResult<String> {
    let url = reqwest::Url::parse(base_url)
        .map_err(|e| DnsProviderError::Configuration(format!("Invalid endpoint '{}': {}", base_url, e)))?;
    let host = url.host_str().ok_or_else(|| {
        DnsProviderError::Configuration(format!("Endpoint '{}' has no host", base_url))
    })?;
    Ok(match url.port() {
        Some(port) => format!("{}:{}", host, port),
        None => host.to_string(),
    })
}

fn is_record_gone(message: &str) -> bool {
    message.starts_with("ResourceNotFound") || message.starts_with("InvalidParameter.RecordIdInvalid")
}

fn hmac_sha256(key: &[u8], data: &str) -> DnsResult<Vec<u8>> {
    let mut mac = Hmac::<Sha256>::new_from_slice(key)
        .map_err(|e| DnsProviderError::Configuration(format!("Invalid signing key: {}", e)))?;
    mac.update(data.as_bytes());
    Ok(mac.finalize().into_bytes().to_vec())
}

fn canonical_request(host: &str, body: &str) -> String {
    format!(
        "POST\n/\n\ncontent-type:{}\nhost:{}\n\ncontent-type;host\n{}",
        CONTENT_TYPE,
        host,
        hex::encode(Sha256::digest(body.as_bytes()))
    )
}

/// `Authorization` header value for a request sent at `timestamp`
fn authorization(
    secret_id: &str,
    secret_key: &str,
    host: &str,
    timestamp: i64,
    body: &str,
) -> DnsResult<String> {
    let date = Utc
        .timestamp_opt(timestamp, 0)
        .single()
        .ok_or_else(|| DnsProviderError::Configuration(format!("Invalid timestamp {}", timestamp)))?
        .format("%Y-%m-%d")
        .to_string();
    let scope = format!("{}/{}/tc3_request", date, SERVICE);
    let string_to_sign = format!(
        "{}\n{}\n{}\n{}",
        ALGORITHM,
        timestamp,
        scope,
        hex::encode(Sha256::digest(canonical_request(host, body).as_bytes()))
    );

    let secret_date = hmac_sha256(format!("TC3{}", secret_key).as_bytes(), &date)?;
    let secret_service = hmac_sha256(&secret_date, SERVICE)?;
    let secret_signing = hmac_sha256(&secret_service, "tc3_request")?;
    let signature = hex::encode(hmac_sha256(&secret_signing, &string_to_sign)?);

    Ok(format!(
        "{} Credential={}/{}, SignedHeaders=content-type;host, Signature={}",
        ALGORITHM, secret_id, scope, signature
    ))
}

// DNSPod API types

#[derive(Debug, Deserialize)]
struct Envelope<T> {
    #[serde(rename = "Response")]
    response: ResponseBody<T>,
}

#[derive(Debug, Deserialize)]
struct ResponseBody<T> {
    #[serde(rename = "Error")]
    error: Option<ApiError>,
    #[serde(flatten)]
    data: Option<T>,
}

impl<T> ResponseBody<T> {
    fn into_result(self) -> DnsResult<T> {
        if let Some(error) = self.error {
            let message = format!("{}: {}", error.code, error.message);
            return Err(if error.code.starts_with("AuthFailure") {
                DnsProviderError::Authentication(message)
            } else {
                DnsProviderError::ApiRequest(message)
            });
        }
        self.data
            .ok_or_else(|| DnsProviderError::ApiRequest("response carried no data".to_string()))
    }
}

#[derive(Debug, Deserialize)]
struct ApiError {
    #[serde(rename = "Code")]
    code: String,
    #[serde(rename = "Message", default)]
    message: String,
}

#[derive(Debug, Deserialize)]
struct DomainListResponse {
    #[serde(rename = "DomainList", default)]
    domain_list: Vec<DomainEntry>,
}

#[derive(Debug, Serialize, Deserialize)]
struct DomainEntry {
    #[serde(rename = "Name")]
    name: String,
}

#[derive(Debug, Deserialize)]
struct CreateRecordResponse {
    #[serde(rename = "RecordId")]
    record_id: u64,
}
