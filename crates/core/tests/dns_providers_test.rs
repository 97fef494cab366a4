//! DNS provider API clients and the provider record service
//!
//! Vendor APIs are mocked with wiremock.

mod common;

use std::time::Duration;

use wiremock::matchers::{body_json, header, header_regex, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use easyacme::dns::{
    challenge_value, AliyunProvider, CloudflareProvider, DnsProvider, DnsProviderError,
    DnsProviderType, GoDaddyProvider, HetznerProvider, ProviderCredentials, ProviderRegistry,
    TencentCloudProvider,
};
use easyacme::service::{CreateDnsProvider, DnsProviderFilter, UpdateDnsProvider};
use easyacme::{DnsProviderId, ErrorKind, PageRequest};

const KEY_AUTH: &str = "token.thumbprint";

fn timeout() -> Duration {
    Duration::from_secs(5)
}

// ============================================================================
// Cloudflare
// ============================================================================

mod cloudflare {
    use super::*;

    async fn zone(server: &MockServer, name: &str, id: &str) {
        Mock::given(method("GET"))
            .and(path("/zones"))
            .and(query_param("name", name))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "success": true,
                "errors": [],
                "result": [{"id": id, "name": name}]
            })))
            .with_priority(1)
            .mount(server)
            .await;
        Mock::given(method("GET"))
            .and(path("/zones"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "success": true,
                "errors": [],
                "result": []
            })))
            .with_priority(5)
            .mount(server)
            .await;
    }

    #[tokio::test]
    async fn test_present_and_clean_up() {
        let server = MockServer::start().await;
        zone(&server, "example.com", "zone-1").await;

        Mock::given(method("POST"))
            .and(path("/zones/zone-1/dns_records"))
            .and(header("authorization", "Bearer token-1"))
            .and(body_json(serde_json::json!({
                "type": "TXT",
                "name": "_acme-challenge.www.example.com",
                "content": challenge_value(KEY_AUTH),
                "ttl": 60
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "success": true,
                "errors": [],
                "result": {"id": "rec-9"}
            })))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("DELETE"))
            .and(path("/zones/zone-1/dns_records/rec-9"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "success": true,
                "errors": [],
                "result": {"id": "rec-9"}
            })))
            .expect(1)
            .mount(&server)
            .await;

        let provider = CloudflareProvider::new("token-1", timeout())
            .unwrap()
            .with_base_url(server.uri());

        provider
            .present("www.example.com", "token", KEY_AUTH)
            .await
            .unwrap();
        provider
            .clean_up("www.example.com", "token", KEY_AUTH)
            .await
            .unwrap();
        // a second cleanup has nothing left to delete
        provider
            .clean_up("www.example.com", "token", KEY_AUTH)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_unknown_zone() {
        let server = MockServer::start().await;
        zone(&server, "other.org", "zone-2").await;

        let provider = CloudflareProvider::new("token-1", timeout())
            .unwrap()
            .with_base_url(server.uri());

        let err = provider
            .present("example.com", "token", KEY_AUTH)
            .await
            .unwrap_err();
        assert!(matches!(err, DnsProviderError::ZoneNotFound { .. }));
    }

    #[tokio::test]
    async fn test_rejected_token() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/zones"))
            .respond_with(ResponseTemplate::new(403))
            .mount(&server)
            .await;

        let provider = CloudflareProvider::new("bad", timeout())
            .unwrap()
            .with_base_url(server.uri());

        let err = provider
            .present("example.com", "token", KEY_AUTH)
            .await
            .unwrap_err();
        assert!(matches!(err, DnsProviderError::Authentication(_)));
    }

    #[tokio::test]
    async fn test_delete_not_found_is_ok() {
        let server = MockServer::start().await;
        zone(&server, "example.com", "zone-1").await;
        Mock::given(method("POST"))
            .and(path("/zones/zone-1/dns_records"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "success": true,
                "errors": [],
                "result": {"id": "rec-1"}
            })))
            .mount(&server)
            .await;
        Mock::given(method("DELETE"))
            .and(path("/zones/zone-1/dns_records/rec-1"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let provider = CloudflareProvider::new("token-1", timeout())
            .unwrap()
            .with_base_url(server.uri());
        provider.present("example.com", "t", KEY_AUTH).await.unwrap();

        assert!(provider.clean_up("example.com", "t", KEY_AUTH).await.is_ok());
    }
}

// ============================================================================
// Hetzner
// ============================================================================

mod hetzner {
    use super::*;

    #[tokio::test]
    async fn test_present_uses_relative_name() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/zones"))
            .and(header("Auth-API-Token", "h-token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "zones": [
                    {"id": "z-root", "name": "example.com"},
                    {"id": "z-other", "name": "example.net"}
                ]
            })))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/records"))
            .and(body_json(serde_json::json!({
                "zone_id": "z-root",
                "name": "_acme-challenge.api",
                "type": "TXT",
                "value": challenge_value(KEY_AUTH),
                "ttl": 60
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "record": {"id": "r-1"}
            })))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("DELETE"))
            .and(path("/records/r-1"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let provider = HetznerProvider::new("h-token", timeout())
            .unwrap()
            .with_base_url(server.uri());

        provider.present("api.example.com", "t", KEY_AUTH).await.unwrap();
        provider.clean_up("api.example.com", "t", KEY_AUTH).await.unwrap();
    }

    #[tokio::test]
    async fn test_wildcard_validates_at_apex() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/zones"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "zones": [{"id": "z-root", "name": "example.com"}]
            })))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/records"))
            .and(body_json(serde_json::json!({
                "zone_id": "z-root",
                "name": "_acme-challenge",
                "type": "TXT",
                "value": challenge_value(KEY_AUTH),
                "ttl": 60
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "record": {"id": "r-2"}
            })))
            .expect(1)
            .mount(&server)
            .await;

        let provider = HetznerProvider::new("h-token", timeout())
            .unwrap()
            .with_base_url(server.uri());

        provider.present("*.example.com", "t", KEY_AUTH).await.unwrap();
    }
}

// ============================================================================
// GoDaddy
// ============================================================================

mod godaddy {
    use super::*;

    const RECORDS: &str = "/v1/domains/example.com/records/TXT/_acme-challenge";

    async fn domains(server: &MockServer) {
        Mock::given(method("GET"))
            .and(path("/v1/domains/_acme-challenge.example.com"))
            .respond_with(ResponseTemplate::new(404))
            .mount(server)
            .await;
        Mock::given(method("GET"))
            .and(path("/v1/domains/example.com"))
            .and(header("authorization", "sso-key key-1:secret-1"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({"domain": "example.com"})),
            )
            .mount(server)
            .await;
    }

    fn provider(server: &MockServer) -> GoDaddyProvider {
        GoDaddyProvider::new("key-1", "secret-1", timeout())
            .unwrap()
            .with_base_url(server.uri())
    }

    #[tokio::test]
    async fn test_last_record_is_deleted() {
        let server = MockServer::start().await;
        domains(&server).await;

        Mock::given(method("GET"))
            .and(path(RECORDS))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([])))
            .mount(&server)
            .await;
        Mock::given(method("PUT"))
            .and(path(RECORDS))
            .and(body_json(serde_json::json!([
                {"data": challenge_value(KEY_AUTH), "ttl": 600}
            ])))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("DELETE"))
            .and(path(RECORDS))
            .respond_with(ResponseTemplate::new(204))
            .expect(1)
            .mount(&server)
            .await;

        let provider = provider(&server);
        provider.present("example.com", "t", KEY_AUTH).await.unwrap();
        provider.clean_up("example.com", "t", KEY_AUTH).await.unwrap();
    }

    #[tokio::test]
    async fn test_other_records_are_kept() {
        let server = MockServer::start().await;
        domains(&server).await;
        let value = challenge_value(KEY_AUTH);

        Mock::given(method("GET"))
            .and(path(RECORDS))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([
                {"data": "someone-else", "ttl": 600},
                {"data": value, "ttl": 600}
            ])))
            .mount(&server)
            .await;
        // present: already listed, written back unchanged
        Mock::given(method("PUT"))
            .and(path(RECORDS))
            .and(body_json(serde_json::json!([
                {"data": "someone-else", "ttl": 600},
                {"data": value, "ttl": 600}
            ])))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;
        // clean_up: only the foreign record survives
        Mock::given(method("PUT"))
            .and(path(RECORDS))
            .and(body_json(serde_json::json!([
                {"data": "someone-else", "ttl": 600}
            ])))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("DELETE"))
            .and(path(RECORDS))
            .respond_with(ResponseTemplate::new(204))
            .expect(0)
            .mount(&server)
            .await;

        let provider = provider(&server);
        provider.present("example.com", "t", KEY_AUTH).await.unwrap();
        provider.clean_up("example.com", "t", KEY_AUTH).await.unwrap();
    }
}

// ============================================================================
// Tencent Cloud
// ============================================================================

mod tencentcloud {
    use super::*;

    const SIGNED: &str = r"^TC3-HMAC-SHA256 Credential=AKIDtest/\d{4}-\d{2}-\d{2}/dnspod/tc3_request, SignedHeaders=content-type;host, Signature=[0-9a-f]{64}$";

    async fn domain_list(server: &MockServer) {
        Mock::given(method("POST"))
            .and(path("/"))
            .and(header("X-TC-Action", "DescribeDomainList"))
            .and(header("X-TC-Version", "2021-03-23"))
            .and(header_regex("authorization", SIGNED))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "Response": {
                    "DomainList": [{"Name": "example.net"}, {"Name": "example.com"}],
                    "RequestId": "req-1"
                }
            })))
            .mount(server)
            .await;
    }

    fn provider(server: &MockServer) -> TencentCloudProvider {
        TencentCloudProvider::new("AKIDtest", "tc-secret", timeout())
            .unwrap()
            .with_base_url(server.uri())
            .unwrap()
    }

    #[tokio::test]
    async fn test_present_and_clean_up_by_record_id() {
        let server = MockServer::start().await;
        domain_list(&server).await;

        Mock::given(method("POST"))
            .and(path("/"))
            .and(header("X-TC-Action", "CreateRecord"))
            .and(header_regex("authorization", SIGNED))
            .and(body_json(serde_json::json!({
                "Domain": "example.com",
                "SubDomain": "_acme-challenge.www",
                "RecordType": "TXT",
                "RecordLine": "默认",
                "Value": challenge_value(KEY_AUTH),
                "TTL": 600
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "Response": {"RecordId": 42, "RequestId": "req-2"}
            })))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/"))
            .and(header("X-TC-Action", "DeleteRecord"))
            .and(body_json(serde_json::json!({"Domain": "example.com", "RecordId": 42})))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "Response": {"RequestId": "req-3"}
            })))
            .expect(1)
            .mount(&server)
            .await;

        let provider = provider(&server);
        provider
            .present("www.example.com", "token", KEY_AUTH)
            .await
            .unwrap();
        provider
            .clean_up("www.example.com", "token", KEY_AUTH)
            .await
            .unwrap();
        provider
            .clean_up("www.example.com", "token", KEY_AUTH)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_record_already_gone_is_ok() {
        let server = MockServer::start().await;
        domain_list(&server).await;
        Mock::given(method("POST"))
            .and(path("/"))
            .and(header("X-TC-Action", "CreateRecord"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "Response": {"RecordId": 7, "RequestId": "req-2"}
            })))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/"))
            .and(header("X-TC-Action", "DeleteRecord"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "Response": {
                    "Error": {"Code": "ResourceNotFound.NoDataOfRecord", "Message": "no record"},
                    "RequestId": "req-3"
                }
            })))
            .mount(&server)
            .await;

        let provider = provider(&server);
        provider.present("example.com", "t", KEY_AUTH).await.unwrap();
        assert!(provider.clean_up("example.com", "t", KEY_AUTH).await.is_ok());
    }

    #[tokio::test]
    async fn test_rejected_secret_id() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "Response": {
                    "Error": {
                        "Code": "AuthFailure.SecretIdNotFound",
                        "Message": "The SecretId is not found"
                    },
                    "RequestId": "req-1"
                }
            })))
            .mount(&server)
            .await;

        let err = provider(&server)
            .present("example.com", "t", KEY_AUTH)
            .await
            .unwrap_err();
        assert!(matches!(err, DnsProviderError::Authentication(_)));
    }

    #[tokio::test]
    async fn test_unknown_zone() {
        let server = MockServer::start().await;
        domain_list(&server).await;

        let err = provider(&server)
            .present("example.org", "t", KEY_AUTH)
            .await
            .unwrap_err();
        assert!(matches!(err, DnsProviderError::ZoneNotFound { .. }));
    }
}

// ============================================================================
// Aliyun
// ============================================================================

mod aliyun {
    use super::*;

    async fn domains(server: &MockServer) {
        Mock::given(method("GET"))
            .and(path("/"))
            .and(query_param("Action", "DescribeDomains"))
            .and(query_param("AccessKeyId", "LTAItest"))
            .and(query_param("SignatureMethod", "HMAC-SHA1"))
            .and(query_param("Version", "2015-01-09"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "Domains": {"Domain": [{"DomainName": "example.com"}]},
                "TotalCount": 1,
                "RequestId": "req-1"
            })))
            .mount(server)
            .await;
    }

    fn provider(server: &MockServer) -> AliyunProvider {
        AliyunProvider::new("LTAItest", "ali-secret", timeout())
            .unwrap()
            .with_base_url(server.uri())
    }

    #[tokio::test]
    async fn test_present_and_clean_up_by_record_id() {
        let server = MockServer::start().await;
        domains(&server).await;

        Mock::given(method("GET"))
            .and(path("/"))
            .and(query_param("Action", "AddDomainRecord"))
            .and(query_param("DomainName", "example.com"))
            .and(query_param("RR", "_acme-challenge.www"))
            .and(query_param("Type", "TXT"))
            .and(query_param("Value", challenge_value(KEY_AUTH).as_str()))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "RecordId": "9001",
                "RequestId": "req-2"
            })))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/"))
            .and(query_param("Action", "DeleteDomainRecord"))
            .and(query_param("RecordId", "9001"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "RecordId": "9001",
                "RequestId": "req-3"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let provider = provider(&server);
        provider
            .present("www.example.com", "token", KEY_AUTH)
            .await
            .unwrap();
        provider
            .clean_up("www.example.com", "token", KEY_AUTH)
            .await
            .unwrap();
        provider
            .clean_up("www.example.com", "token", KEY_AUTH)
            .await
            .unwrap();

        // every call is signed and carries a fresh nonce
        let requests = server.received_requests().await.unwrap_or_default();
        let nonces: std::collections::HashSet<String> = requests
            .iter()
            .map(|r| {
                let params: std::collections::HashMap<String, String> =
                    r.url.query_pairs().into_owned().collect();
                assert!(!params.get("Signature").map_or(true, |s| s.is_empty()));
                params.get("SignatureNonce").cloned().unwrap_or_default()
            })
            .collect();
        assert_eq!(requests.len(), 3);
        assert_eq!(nonces.len(), 3);
    }

    #[tokio::test]
    async fn test_record_already_gone_is_ok() {
        let server = MockServer::start().await;
        domains(&server).await;
        Mock::given(method("GET"))
            .and(path("/"))
            .and(query_param("Action", "AddDomainRecord"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "RecordId": "9002",
                "RequestId": "req-2"
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/"))
            .and(query_param("Action", "DeleteDomainRecord"))
            .respond_with(ResponseTemplate::new(400).set_body_json(serde_json::json!({
                "Code": "DomainRecordNotBelongToUser",
                "Message": "The DNS record does not exist.",
                "RequestId": "req-3"
            })))
            .mount(&server)
            .await;

        let provider = provider(&server);
        provider.present("example.com", "t", KEY_AUTH).await.unwrap();
        assert!(provider.clean_up("example.com", "t", KEY_AUTH).await.is_ok());
    }

    #[tokio::test]
    async fn test_rejected_access_key() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/"))
            .respond_with(ResponseTemplate::new(404).set_body_json(serde_json::json!({
                "Code": "InvalidAccessKeyId.NotFound",
                "Message": "Specified access key is not found.",
                "RequestId": "req-1"
            })))
            .mount(&server)
            .await;

        let err = provider(&server)
            .present("example.com", "t", KEY_AUTH)
            .await
            .unwrap_err();
        assert!(matches!(err, DnsProviderError::Authentication(_)));
    }
}

// ============================================================================
// Registry
// ============================================================================

#[test]
fn test_registry_rejects_unknown_type() {
    let registry = ProviderRegistry::with_defaults();
    let credentials = ProviderCredentials::new("id", "key");

    let err = registry
        .build_from_parts("route53", &credentials)
        .err()
        .unwrap();
    assert_eq!(err.kind(), ErrorKind::Validation);
}

#[test]
fn test_registry_checks_credential_shape() {
    let registry = ProviderRegistry::with_defaults();

    // Token vendors need only the secret key
    assert!(registry
        .build_from_parts("cloudflare", &ProviderCredentials::new("", "token"))
        .is_ok());
    // Key pair vendors need both halves
    let err = registry
        .build_from_parts("godaddy", &ProviderCredentials::new("", "secret"))
        .err()
        .unwrap();
    assert_eq!(err.kind(), ErrorKind::Validation);
}

#[test]
fn test_empty_registry_supports_nothing() {
    let registry = ProviderRegistry::empty();
    assert!(DnsProviderType::ALL.iter().all(|t| !registry.supports(*t)));
}

// ============================================================================
// Provider record service
// ============================================================================

fn create(name: &str, kind: &str, id: &str, key: &str) -> CreateDnsProvider {
    CreateDnsProvider {
        name: name.to_string(),
        provider_type: kind.to_string(),
        secret_id: id.to_string(),
        secret_key: key.to_string(),
        notes: String::new(),
    }
}

#[tokio::test]
async fn test_service_create_hides_secret_until_revealed() {
    let h = common::harness();
    let dns = &h.services.dns_providers;

    let view = dns
        .create(create("tencent", "tencentcloud", "AKID", "secret"))
        .unwrap();
    assert_eq!(view.provider_type, DnsProviderType::TencentCloud);
    assert_eq!(view.secret_id, "AKID");
    let json = serde_json::to_value(&view).unwrap();
    assert!(json.get("secretKey").is_none() && json.get("secret_key").is_none());

    let secrets = dns.reveal(&view.id).unwrap();
    assert_eq!(secrets.secret_key, "secret");
}

#[tokio::test]
async fn test_service_rejects_bad_input() {
    let h = common::harness();
    let dns = &h.services.dns_providers;

    let err = dns.create(create("x", "route53", "a", "b")).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Validation);
    let err = dns.create(create("  ", "cloudflare", "", "t")).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Validation);
    let err = dns.create(create("ali", "aliyun", "", "secret")).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Validation);

    assert_eq!(dns.stats().unwrap().total, 0);
}

#[tokio::test]
async fn test_service_update_keeps_secret_on_empty_key() {
    let h = common::harness();
    let dns = &h.services.dns_providers;
    let view = dns.create(create("cf", "cloudflare", "", "token-1")).unwrap();

    let updated = dns
        .update(
            &view.id,
            UpdateDnsProvider {
                name: Some("cf-prod".to_string()),
                secret_key: Some(String::new()),
                ..Default::default()
            },
        )
        .unwrap();
    assert_eq!(updated.name, "cf-prod");
    assert_eq!(dns.reveal(&view.id).unwrap().secret_key, "token-1");

    dns.update(
        &view.id,
        UpdateDnsProvider {
            secret_key: Some("token-2".to_string()),
            ..Default::default()
        },
    )
    .unwrap();
    assert_eq!(dns.reveal(&view.id).unwrap().secret_key, "token-2");

    let err = dns
        .update(&DnsProviderId::new("missing"), UpdateDnsProvider::default())
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
}

#[tokio::test]
async fn test_service_list_stats_and_batch_delete() {
    let h = common::harness();
    let dns = &h.services.dns_providers;
    let a = dns.create(create("cf-a", "cloudflare", "", "t1")).unwrap();
    let b = dns.create(create("cf-b", "cloudflare", "", "t2")).unwrap();
    let c = dns.create(create("hz", "hetzner", "", "t3")).unwrap();

    let page = dns
        .list(
            &DnsProviderFilter {
                provider_type: Some(DnsProviderType::Cloudflare),
                ..Default::default()
            },
            PageRequest::default(),
        )
        .unwrap();
    assert_eq!(page.total, 2);

    let stats = dns.stats().unwrap();
    assert_eq!(stats.total, 3);
    assert_eq!(stats.by_type.get("cloudflare"), Some(&2));
    assert_eq!(stats.by_type.get("hetzner"), Some(&1));

    let err = dns.delete_many(&[]).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Validation);

    let removed = dns
        .delete_many(&[a.id.clone(), b.id.clone(), DnsProviderId::new("missing")])
        .unwrap();
    assert_eq!(removed, 2);

    dns.delete(&c.id).unwrap();
    let err = dns.delete(&c.id).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
}
