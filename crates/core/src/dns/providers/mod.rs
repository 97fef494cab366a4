//! DNS provider implementations
//!
//! Available providers:
//! - [`TencentCloudProvider`] - DNSPod API 3.0 (TC3-HMAC-SHA256)
//! - [`AliyunProvider`] - Alibaba Cloud DNS RPC API (HMAC-SHA1)
//! - [`CloudflareProvider`] - Cloudflare API v4
//! - [`GoDaddyProvider`] - GoDaddy Domains API
//! - [`HetznerProvider`] - Hetzner DNS API

mod aliyun;
mod cloudflare;
mod godaddy;
mod hetzner;
mod tencentcloud;

pub use aliyun::AliyunProvider;
pub use cloudflare::CloudflareProvider;
pub use godaddy::GoDaddyProvider;
pub use hetzner::HetznerProvider;
pub use tencentcloud::TencentCloudProvider;

use reqwest::{Client, Response, StatusCode};
use std::time::Duration;

use super::provider::{DnsProviderError, DnsResult};

/// HTTP client shared by one provider instance
pub(crate) fn build_client(timeout: Duration) -> DnsResult<Client> {
    Client::builder()
        .timeout(timeout)
        .user_agent(easyacme_config::defaults::USER_AGENT)
        .build()
        .map_err(|e| {
            DnsProviderError::Configuration(format!("Failed to create HTTP client: {}", e))
        })
}

/// Map a transport failure
pub(crate) fn send_error(err: reqwest::Error, timeout: Duration, action: &str) -> DnsProviderError {
    if err.is_timeout() {
        DnsProviderError::Timeout {
            elapsed_secs: timeout.as_secs(),
        }
    } else {
        DnsProviderError::ApiRequest(format!("Failed to {}: {}", action, err))
    }
}

/// Turn auth, rate-limit and other non-2xx responses into errors
pub(crate) async fn check_response(response: Response, action: &str) -> DnsResult<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
        return Err(DnsProviderError::Authentication(format!(
            "{} rejected the credentials (HTTP {})",
            action, status
        )));
    }
    if status == StatusCode::TOO_MANY_REQUESTS {
        let retry_after_secs = response
            .headers()
            .get(reqwest::header::RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse().ok())
            .unwrap_or(60);
        return Err(DnsProviderError::RateLimited { retry_after_secs });
    }
    let body = response.text().await.unwrap_or_default();
    Err(DnsProviderError::ApiRequest(format!(
        "Failed to {}: HTTP {} - {}",
        action, status, body
    )))
}
