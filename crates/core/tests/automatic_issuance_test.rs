//! Automatic issuance through a DNS provider API (Cloudflare served by wiremock)

mod common;

use wiremock::matchers::{header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use common::{harness_with, register_account, test_config, Harness, Outcome};
use easyacme::service::{CreateDnsProvider, IssueRequest};
use easyacme::{AccountId, DnsProviderId, EffectiveStatus, ErrorKind, Store};

async fn cloudflare() -> MockServer {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/zones"))
        .and(query_param("name", "example.com"))
        .and(header("authorization", "Bearer cf-token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "success": true,
            "errors": [],
            "result": [{"id": "zone-1", "name": "example.com"}]
        })))
        .with_priority(1)
        .mount(&server)
        .await;

    // Any other candidate zone is unknown
    Mock::given(method("GET"))
        .and(path("/zones"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "success": true,
            "errors": [],
            "result": []
        })))
        .with_priority(5)
        .mount(&server)
        .await;

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
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "success": true,
            "errors": [],
            "result": {"id": "rec-1"}
        })))
        .mount(&server)
        .await;

    server
}

fn harness_for(server: &MockServer) -> Harness {
    let mut config = test_config();
    config
        .dns_providers
        .endpoints
        .insert("cloudflare".to_string(), server.uri());
    harness_with(config)
}

async fn requests(server: &MockServer, verb: &str) -> usize {
    server
        .received_requests()
        .await
        .unwrap_or_default()
        .iter()
        .filter(|r| r.method.as_str() == verb)
        .count()
}

fn create_provider(h: &Harness) -> DnsProviderId {
    h.services
        .dns_providers
        .create(CreateDnsProvider {
            name: "cf".to_string(),
            provider_type: "cloudflare".to_string(),
            secret_key: "cf-token".to_string(),
            ..Default::default()
        })
        .unwrap()
        .id
}

fn request(account_id: &AccountId, provider: &DnsProviderId) -> IssueRequest {
    IssueRequest {
        key_type: "P256".to_string(),
        account_id: account_id.clone(),
        domains: vec!["example.com".to_string()],
        dns_provider_id: Some(provider.to_string()),
    }
}

#[tokio::test]
async fn test_automatic_issuance_publishes_and_cleans_up() {
    let server = cloudflare().await;
    let h = harness_for(&server);
    let account = register_account(&h, "primary").await;
    let provider = create_provider(&h);

    let cert = h
        .services
        .certificates
        .issue(&request(&account.id, &provider), None)
        .await
        .unwrap();

    assert_eq!(cert.status, EffectiveStatus::Issued);
    assert_eq!(cert.dns_provider_id, provider);
    assert_eq!(requests(&server, "POST").await, 1);
    assert_eq!(requests(&server, "DELETE").await, 1);

    let posted = server
        .received_requests()
        .await
        .unwrap_or_default()
        .into_iter()
        .find(|r| r.method.as_str() == "POST")
        .unwrap();
    let body: serde_json::Value = serde_json::from_slice(&posted.body).unwrap();
    assert_eq!(body["type"], "TXT");
    assert_eq!(body["name"], "_acme-challenge.example.com");
    assert_eq!(body["ttl"], 60);

    // the automatic flow never consults the local precheck
    assert_eq!(h.resolver.lookups(), 0);
    assert!(h.services.certificates.negotiator().pending().is_empty());
}

#[tokio::test]
async fn test_cleanup_runs_when_validation_fails() {
    let server = cloudflare().await;
    let h = harness_for(&server);
    let account = register_account(&h, "primary").await;
    let provider = create_provider(&h);
    h.engine().set_outcome(Outcome::Invalid);

    let err = h
        .services
        .certificates
        .issue(&request(&account.id, &provider), None)
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Upstream);
    assert_eq!(requests(&server, "POST").await, 1);
    assert_eq!(requests(&server, "DELETE").await, 1);
    assert!(h.store.certificates().unwrap().is_empty());
}

#[tokio::test]
async fn test_unknown_provider_is_not_found() {
    let server = cloudflare().await;
    let h = harness_for(&server);
    let account = register_account(&h, "primary").await;

    let err = h
        .services
        .certificates
        .issue(&request(&account.id, &DnsProviderId::new("missing")), None)
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::NotFound);
    assert_eq!(h.engine().accept_calls(), 0);
    assert!(server.received_requests().await.unwrap_or_default().is_empty());
}

#[tokio::test]
async fn test_empty_provider_id_selects_manual_flow() {
    let server = cloudflare().await;
    let h = harness_for(&server);
    let account = register_account(&h, "primary").await;

    let mut req = request(&account.id, &DnsProviderId::new("unused"));
    req.dns_provider_id = Some(String::new());
    let err = h
        .services
        .certificates
        .issue(&req, None)
        .await
        .unwrap_err();

    // manual flow without a prior authorization
    assert!(matches!(
        err,
        easyacme::EasyAcmeError::AuthorizationExpired { .. }
    ));
}
