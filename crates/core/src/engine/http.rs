//! HTTP implementation of the protocol engine.

use async_trait::async_trait;
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use parking_lot::{Mutex, RwLock};
use reqwest::header::{HeaderMap, CONTENT_TYPE, LINK, LOCATION, RETRY_AFTER};
use reqwest::{Client, Response};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, trace};

use super::jws;
use super::{
    AcmeEngine, Authorization, CertificateChain, ChallengeUpdate, EngineConnector, EngineError,
    EngineResult, Identifier, Order, Problem, RegistrationResource,
};
use crate::keys::PrivateKey;

const JOSE_JSON: &str = "application/jose+json";
const PEM_CHAIN: &str = "application/pem-certificate-chain";
const REPLAY_NONCE: &str = "replay-nonce";

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Directory {
    new_nonce: String,
    new_account: String,
    new_order: String,
    revoke_cert: String,
    #[serde(default)]
    meta: Option<DirectoryMeta>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DirectoryMeta {
    terms_of_service: Option<String>,
    #[serde(default)]
    external_account_required: bool,
}

/// Opens [`HttpEngine`] sessions over a shared HTTP client
#[derive(Debug, Clone)]
pub struct HttpConnector {
    client: Client,
}

impl HttpConnector {
    pub fn new(timeout: Duration, user_agent: &str) -> EngineResult<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(user_agent)
            .build()?;
        Ok(Self { client })
    }

    pub fn with_client(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl EngineConnector for HttpConnector {
    async fn connect(
        &self,
        directory_url: &str,
        key: &PrivateKey,
        registration: Option<&RegistrationResource>,
    ) -> EngineResult<Arc<dyn AcmeEngine>> {
        let resp = self.client.get(directory_url).send().await?;
        if !resp.status().is_success() {
            return Err(EngineError::Protocol(format!(
                "directory {} returned HTTP {}",
                directory_url,
                resp.status()
            )));
        }
        let directory: Directory = resp.json().await?;
        debug!(
            directory_url,
            terms_of_service = ?directory.meta.as_ref().and_then(|m| m.terms_of_service.as_deref()),
            "Loaded ACME directory"
        );

        Ok(Arc::new(HttpEngine {
            client: self.client.clone(),
            directory,
            key: key.clone(),
            account_url: RwLock::new(registration.map(|r| r.uri.clone())),
            nonces: Mutex::new(Vec::new()),
        }))
    }
}

/// Engine session speaking RFC 8555 over HTTPS
pub struct HttpEngine {
    client: Client,
    directory: Directory,
    key: PrivateKey,
    account_url: RwLock<Option<String>>,
    nonces: Mutex<Vec<String>>,
}

impl std::fmt::Debug for HttpEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpEngine")
            .field("directory", &self.directory)
            .field("account_url", &*self.account_url.read())
            .finish_non_exhaustive()
    }
}

impl HttpEngine {
    fn account_url(&self) -> EngineResult<String> {
        self.account_url
            .read()
            .clone()
            .ok_or_else(|| EngineError::Protocol("session has no registered account".to_string()))
    }

    async fn nonce(&self) -> EngineResult<String> {
        if let Some(nonce) = self.nonces.lock().pop() {
            return Ok(nonce);
        }
        let resp = self.client.head(&self.directory.new_nonce).send().await?;
        replay_nonce(resp.headers())
            .ok_or_else(|| EngineError::Protocol("newNonce returned no Replay-Nonce".to_string()))
    }

    /// Signed POST; retries once when the CA rejects the nonce
    async fn post(&self, url: &str, payload: Option<&Value>, use_jwk: bool) -> EngineResult<Response> {
        let body = match payload {
            Some(value) => {
                serde_json::to_vec(value).map_err(|e| EngineError::Protocol(e.to_string()))?
            }
            None => Vec::new(),
        };
        let kid = if use_jwk {
            None
        } else {
            Some(self.account_url()?)
        };

        let mut attempt = 0;
        loop {
            attempt += 1;
            let nonce = self.nonce().await?;
            let signed = jws::sign(&self.key, kid.as_deref(), &nonce, url, &body)?;
            let signed =
                serde_json::to_vec(&signed).map_err(|e| EngineError::Protocol(e.to_string()))?;

            trace!(url, attempt, "POST");
            let resp = self
                .client
                .post(url)
                .header(CONTENT_TYPE, JOSE_JSON)
                .body(signed)
                .send()
                .await?;

            if let Some(nonce) = replay_nonce(resp.headers()) {
                self.nonces.lock().push(nonce);
            }
            if resp.status().is_success() {
                return Ok(resp);
            }

            let status = resp.status();
            let problem = resp.json::<Problem>().await.unwrap_or_else(|_| Problem {
                kind: "about:blank".to_string(),
                detail: format!("HTTP {}", status),
                status: Some(status.as_u16()),
                ..Default::default()
            });
            if problem.is_bad_nonce() && attempt == 1 {
                debug!(url, "CA rejected nonce, retrying once");
                continue;
            }
            return Err(EngineError::Problem(problem));
        }
    }

    async fn post_json<T: DeserializeOwned>(
        &self,
        url: &str,
        payload: Option<&Value>,
    ) -> EngineResult<(T, HeaderMap)> {
        let resp = self.post(url, payload, false).await?;
        let headers = resp.headers().clone();
        let body = resp.json::<T>().await?;
        Ok((body, headers))
    }

    async fn register_account(&self, payload: Value) -> EngineResult<RegistrationResource> {
        let resp = self
            .post(&self.directory.new_account, Some(&payload), true)
            .await?;
        let uri = location(resp.headers())
            .ok_or_else(|| EngineError::Protocol("newAccount returned no Location".to_string()))?;
        let body = resp.json().await?;

        *self.account_url.write() = Some(uri.clone());
        Ok(RegistrationResource { uri, body })
    }

    async fn fetch_chain(&self, url: &str, bundle: bool) -> EngineResult<(CertificateChain, Vec<String>)> {
        let resp = self.post(url, None, false).await?;
        let alternates = links(resp.headers(), "alternate");
        if let Some(content_type) = resp.headers().get(CONTENT_TYPE) {
            if !content_type.to_str().unwrap_or_default().starts_with(PEM_CHAIN) {
                trace!(url, content_type = ?content_type, "Unexpected certificate content type");
            }
        }
        let pem = resp.text().await?;
        let (leaf, issuer) = split_chain(&pem)
            .ok_or_else(|| EngineError::Protocol(format!("{} returned no certificate", url)))?;

        let cert = if bundle {
            format!("{}{}", leaf, issuer)
        } else {
            leaf
        };
        Ok((
            CertificateChain {
                url: url.to_string(),
                cert,
                issuer,
            },
            alternates,
        ))
    }
}

#[async_trait]
impl AcmeEngine for HttpEngine {
    async fn register(&self, email: Option<&str>) -> EngineResult<RegistrationResource> {
        if self
            .directory
            .meta
            .as_ref()
            .is_some_and(|m| m.external_account_required)
        {
            return Err(EngineError::InvalidInput(
                "CA requires external account binding credentials".to_string(),
            ));
        }
        self.register_account(json!({
            "termsOfServiceAgreed": true,
            "contact": contacts(email),
        }))
        .await
    }

    async fn register_with_eab(
        &self,
        email: Option<&str>,
        eab_key_id: &str,
        eab_hmac_key: &str,
    ) -> EngineResult<RegistrationResource> {
        let binding = jws::external_account_binding(
            eab_key_id,
            eab_hmac_key,
            &self.key.jwk()?,
            &self.directory.new_account,
        )?;
        self.register_account(json!({
            "termsOfServiceAgreed": true,
            "contact": contacts(email),
            "externalAccountBinding": binding,
        }))
        .await
    }

    async fn delete_registration(&self) -> EngineResult<()> {
        let url = self.account_url()?;
        self.post(&url, Some(&json!({ "status": "deactivated" })), false)
            .await?;
        Ok(())
    }

    async fn new_order(&self, domains: &[String]) -> EngineResult<Order> {
        let identifiers: Vec<Identifier> = domains.iter().map(Identifier::dns).collect();
        let payload = json!({ "identifiers": identifiers });
        let (mut order, headers): (Order, _) =
            self.post_json(&self.directory.new_order, Some(&payload)).await?;
        order.location = location(&headers)
            .ok_or_else(|| EngineError::Protocol("newOrder returned no Location".to_string()))?;
        Ok(order)
    }

    async fn get_order(&self, url: &str) -> EngineResult<Order> {
        let (mut order, _): (Order, _) = self.post_json(url, None).await?;
        order.location = url.to_string();
        Ok(order)
    }

    async fn finalize_order(&self, finalize_url: &str, csr_der: &[u8]) -> EngineResult<Order> {
        let payload = json!({ "csr": URL_SAFE_NO_PAD.encode(csr_der) });
        let (mut order, headers): (Order, _) = self.post_json(finalize_url, Some(&payload)).await?;
        order.location = location(&headers).unwrap_or_default();
        Ok(order)
    }

    async fn get_authorization(&self, url: &str) -> EngineResult<Authorization> {
        let (mut authz, _): (Authorization, _) = self.post_json(url, None).await?;
        authz.url = url.to_string();
        Ok(authz)
    }

    async fn accept_challenge(&self, url: &str) -> EngineResult<ChallengeUpdate> {
        let (challenge, headers) = self.post_json(url, Some(&json!({}))).await?;
        Ok(ChallengeUpdate {
            challenge,
            authorization_url: links(&headers, "up").into_iter().next().unwrap_or_default(),
            retry_after: retry_after(&headers),
        })
    }

    async fn get_certificates(
        &self,
        url: &str,
        bundle: bool,
    ) -> EngineResult<Vec<CertificateChain>> {
        let (default_chain, alternates) = self.fetch_chain(url, bundle).await?;
        let mut chains = vec![default_chain];
        for alternate in alternates {
            let (chain, _) = self.fetch_chain(&alternate, bundle).await?;
            chains.push(chain);
        }
        Ok(chains)
    }

    async fn revoke_certificate(&self, cert_der: &[u8]) -> EngineResult<()> {
        let payload = json!({ "certificate": URL_SAFE_NO_PAD.encode(cert_der) });
        self.post(&self.directory.revoke_cert, Some(&payload), false)
            .await?;
        Ok(())
    }

    fn key_authorization(&self, token: &str) -> EngineResult<String> {
        Ok(format!("{}.{}", token, self.key.thumbprint()?))
    }
}

fn contacts(email: Option<&str>) -> Vec<String> {
    email
        .filter(|e| !e.is_empty())
        .map(|e| vec![format!("mailto:{}", e)])
        .unwrap_or_default()
}

fn replay_nonce(headers: &HeaderMap) -> Option<String> {
    headers
        .get(REPLAY_NONCE)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
}

fn location(headers: &HeaderMap) -> Option<String> {
    headers
        .get(LOCATION)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
}

fn retry_after(headers: &HeaderMap) -> Option<u64> {
    headers
        .get(RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse().ok())
}

/// URLs of every `Link` header entry with the given relation
fn links(headers: &HeaderMap, rel: &str) -> Vec<String> {
    headers
        .get_all(LINK)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .filter_map(|entry| {
            let entry = entry.trim();
            let start = entry.find('<')?;
            let end = entry.find('>')?;
            let url = entry.get(start + 1..end)?;
            let params = entry.get(end + 1..)?;
            let matches = params.split(';').any(|p| {
                let p = p.trim();
                p == format!("rel=\"{}\"", rel) || p == format!("rel={}", rel)
            });
            matches.then(|| url.to_string())
        })
        .collect()
}

/// Split a PEM chain into the leaf block and the remaining issuer blocks
fn split_chain(pem: &str) -> Option<(String, String)> {
    const END: &str = "-----END CERTIFICATE-----";
    let end = pem.find(END)? + END.len();
    let leaf = format!("{}\n", pem[..end].trim());
    let rest = pem[end..].trim();
    let issuer = if rest.is_empty() {
        String::new()
    } else {
        format!("{}\n", rest)
    };
    Some((leaf, issuer))
}
