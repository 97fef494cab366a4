//! Alibaba Cloud (Aliyun) DNS provider implementation
//!
//! Talks to the Alibaba Cloud DNS RPC API. Every request is a signed GET:
//! the sorted, percent-encoded query string is signed with HMAC-SHA1 using
//! `AccessKeySecret + "&"`.
//! API documentation: <https://www.alibabacloud.com/help/en/dns/api-alidns-2015-01-09-dir>

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use chrono::Utc;
use hmac::{Hmac, Mac};
use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use sha1::Sha1;
use tracing::{debug, trace};

use super::send_error;
use crate::dns::provider::{
    candidate_zones, challenge_record, relative_record_name, unfqdn, DnsProvider,
    DnsProviderError, DnsResult, RecordBook, RecordRef, DEFAULT_TXT_TTL,
};

/// Alibaba Cloud DNS endpoint
pub const ALIYUN_API_BASE: &str = "https://alidns.aliyuncs.com";

const API_VERSION: &str = "2015-01-09";

/// RFC 3986 unreserved characters stay literal
const RFC3986: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'~');

/// Error codes meaning the record is already gone
const RECORD_GONE_CODES: [&str; 2] = ["DomainRecordNotBelongToUser", "InvalidRecordId.NotFound"];

/// Alibaba Cloud DNS provider
#[derive(Debug)]
pub struct AliyunProvider {
    client: Client,
    access_key_id: String,
    access_key_secret: String,
    base_url: String,
    timeout: Duration,
    records: RecordBook,
}

enum CallError {
    Transport(DnsProviderError),
    Rejected { code: String, message: String },
}

impl From<CallError> for DnsProviderError {
    fn from(err: CallError) -> Self {
        match err {
            CallError::Transport(e) => e,
            CallError::Rejected { code, message } if code.starts_with("InvalidAccessKeyId") => {
                DnsProviderError::Authentication(format!("{}: {}", code, message))
            }
            CallError::Rejected { code, message } => {
                DnsProviderError::ApiRequest(format!("{}: {}", code, message))
            }
        }
    }
}

impl AliyunProvider {
    pub fn new(access_key_id: &str, access_key_secret: &str, timeout: Duration) -> DnsResult<Self> {
        Ok(Self {
            client: super::build_client(timeout)?,
            access_key_id: access_key_id.to_string(),
            access_key_secret: access_key_secret.to_string(),
            base_url: ALIYUN_API_BASE.to_string(),
            timeout,
            records: RecordBook::default(),
        })
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    async fn call<T: DeserializeOwned>(
        &self,
        action: &str,
        params: &[(&str, &str)],
    ) -> Result<T, CallError> {
        let timestamp = Utc::now().format("%Y-%m-%dT%H:%M:%SZ").to_string();
        let nonce = uuid::Uuid::new_v4().to_string();

        let mut query: BTreeMap<String, String> = BTreeMap::new();
        query.insert("Action".into(), action.into());
        query.insert("Format".into(), "JSON".into());
        query.insert("Version".into(), API_VERSION.into());
        query.insert("AccessKeyId".into(), self.access_key_id.clone());
        query.insert("SignatureMethod".into(), "HMAC-SHA1".into());
        query.insert("SignatureVersion".into(), "1.0".into());
        query.insert("SignatureNonce".into(), nonce);
        query.insert("Timestamp".into(), timestamp);
        for (k, v) in params {
            query.insert((*k).to_string(), (*v).to_string());
        }

        let canonical = canonical_query(&query);
        let signature =
            sign(&self.access_key_secret, &canonical).map_err(CallError::Transport)?;
        let url = format!(
            "{}/?{}&Signature={}",
            self.base_url,
            canonical,
            percent_encode(&signature)
        );

        trace!(action, "Calling Alibaba Cloud DNS");
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| CallError::Transport(send_error(e, self.timeout, action)))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| CallError::Transport(send_error(e, self.timeout, action)))?;

        if !status.is_success() {
            let error: ErrorBody = serde_json::from_str(&body).unwrap_or_else(|_| ErrorBody {
                code: format!("HTTP{}", status.as_u16()),
                message: body.clone(),
            });
            return Err(CallError::Rejected {
                code: error.code,
                message: error.message,
            });
        }

        serde_json::from_str(&body).map_err(|e| {
            CallError::Transport(DnsProviderError::ApiRequest(format!(
                "Failed to parse {} response: {}",
                action, e
            )))
        })
    }

    async fn find_zone(&self, fqdn: &str) -> DnsResult<String> {
        let response: DescribeDomainsResponse =
            self.call("DescribeDomains", &[("PageSize", "100")]).await?;
        let hosted: Vec<String> = response
            .domains
            .domain
            .into_iter()
            .map(|d| d.domain_name)
            .collect();

        candidate_zones(fqdn)
            .into_iter()
            .find(|c| hosted.iter().any(|h| h == c))
            .map(str::to_string)
            .ok_or_else(|| DnsProviderError::ZoneNotFound {
                domain: unfqdn(fqdn).to_string(),
            })
    }
}

#[async_trait]
impl DnsProvider for AliyunProvider {
    fn name(&self) -> &'static str {
        "aliyun"
    }

    async fn present(&self, domain: &str, _token: &str, key_authorization: &str) -> DnsResult<()> {
        let record = challenge_record(domain, key_authorization);
        let zone = self.find_zone(&record.fqdn).await?;
        let rr = relative_record_name(&record.fqdn, &zone);
        let ttl = DEFAULT_TXT_TTL.to_string();

        let created: AddRecordResponse = self
            .call(
                "AddDomainRecord",
                &[
                    ("DomainName", zone.as_str()),
                    ("RR", rr.as_str()),
                    ("Type", "TXT"),
                    ("Value", record.value.as_str()),
                    ("TTL", ttl.as_str()),
                ],
            )
            .await
            .map_err(|e| DnsProviderError::RecordCreation {
                record_name: record.fqdn.clone(),
                message: DnsProviderError::from(e).to_string(),
            })?;

        debug!(fqdn = %record.fqdn, record_id = %created.record_id, "TXT record created");
        self.records.insert(
            &record,
            RecordRef {
                zone,
                record_id: created.record_id,
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

        let result: Result<DeleteRecordResponse, CallError> = self
            .call(
                "DeleteDomainRecord",
                &[("RecordId", reference.record_id.as_str())],
            )
            .await;
        match result {
            Ok(_) => {
                debug!(record_id = %reference.record_id, "TXT record deleted");
                Ok(())
            }
            Err(CallError::Rejected { code, .. }) if RECORD_GONE_CODES.contains(&code.as_str()) => {
                debug!(record_id = %reference.record_id, "Record already deleted");
                Ok(())
            }
            Err(e) => Err(DnsProviderError::RecordDeletion {
                record_id: reference.record_id,
                message: DnsProviderError::from(e).to_string(),
            }),
        }
    }
}

fn percent_encode(value: &str) -> String {
    utf8_percent_encode(value, RFC3986).to_string()
}

fn canonical_query(params: &BTreeMap<String, String>) -> String {
    params
        .iter()
        .map(|(k, v)| format!("{}={}", percent_encode(k), percent_encode(v)))
        .collect::<Vec<_>>()
        .join("&")
}

/// Signature over `GET&%2F&<encoded canonical query>`
fn sign(access_key_secret: &str, canonical_query: &str) -> DnsResult<String> {
    let string_to_sign = format!(
        "GET&{}&{}",
        percent_encode("/"),
        percent_encode(canonical_query)
    );
    let mut mac = Hmac::<Sha1>::new_from_slice(format!("{}&", access_key_secret).as_bytes())
        .map_err(|e| DnsProviderError::Configuration(format!("Invalid access key secret: {}", e)))?;
    mac.update(string_to_sign.as_bytes());
    Ok(STANDARD.encode(mac.finalize().into_bytes()))
}

// Alibaba Cloud API types

#[derive(Debug, Deserialize)]
struct ErrorBody {
    #[serde(rename = "Code", default)]
    code: String,
    #[serde(rename = "Message", default)]
    message: String,
}

#[derive(Debug, Deserialize)]
struct DescribeDomainsResponse {
    #[serde(rename = "Domains")]
    domains: DomainList,
}

#[derive(Debug, Deserialize)]
struct DomainList {
    #[serde(rename = "Domain", default)]
    domain: Vec<DomainEntry>,
}

#[derive(Debug, Deserialize)]
struct DomainEntry {
    #[serde(rename = "DomainName")]
    domain_name: String,
}

#[derive(Debug, Deserialize)]
struct AddRecordResponse {
    #[serde(rename = "RecordId")]
    record_id: String,
}

#[derive(Debug, Deserialize)]
struct DeleteRecordResponse {
    #[serde(rename = "RecordId", default)]
    _record_id: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_percent_encoding_matches_rfc3986() {
        assert_eq!(percent_encode("a b*c~d"), "a%20b%2Ac~d");
        assert_eq!(percent_encode("2025-01-01T00:00:00Z"), "2025-01-01T00%3A00%3A00Z");
        assert_eq!(percent_encode("/"), "%2F");
    }

    #[test]
    fn test_canonical_query_is_sorted() {
        let mut params = BTreeMap::new();
        params.insert("Version".to_string(), API_VERSION.to_string());
        params.insert("Action".to_string(), "AddDomainRecord".to_string());
        params.insert("RR".to_string(), "_acme-challenge".to_string());
        assert_eq!(
            canonical_query(&params),
            "Action=AddDomainRecord&RR=_acme-challenge&Version=2015-01-09"
        );
    }

    #[test]
    fn test_signature_is_deterministic() {
        let a = sign("testsecret", "Action=DescribeDomains&Format=JSON").unwrap();
        let b = sign("testsecret", "Action=DescribeDomains&Format=JSON").unwrap();
        let c = sign("othersecret", "Action=DescribeDomains&Format=JSON").unwrap();
        assert_eq!(a, b);
        assert_ne!(a, c);
        // HMAC-SHA1 digest is 20 bytes
        assert_eq!(STANDARD.decode(&a).unwrap().len(), 20);
    }
}
