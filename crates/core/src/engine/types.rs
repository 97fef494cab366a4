//! ACME resource types (RFC 8555 section 7.1).

use serde::{Deserialize, Serialize};
use std::fmt;

/// Status of an ACME account, order, authorization or challenge
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    Pending,
    Ready,
    Processing,
    Valid,
    Invalid,
    Deactivated,
    Expired,
    Revoked,
    #[serde(other)]
    Unknown,
}

impl Status {
    pub fn as_str(&self) -> &'static str {
        match self {
            Status::Pending => "pending",
            Status::Ready => "ready",
            Status::Processing => "processing",
            Status::Valid => "valid",
            Status::Invalid => "invalid",
            Status::Deactivated => "deactivated",
            Status::Expired => "expired",
            Status::Revoked => "revoked",
            Status::Unknown => "unknown",
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// ACME problem document (RFC 7807)
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Problem {
    #[serde(rename = "type", default)]
    pub kind: String,
    #[serde(default)]
    pub detail: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<u16>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub subproblems: Vec<Problem>,
}

impl Problem {
    pub const BAD_NONCE: &'static str = "urn:ietf:params:acme:error:badNonce";

    pub fn is_bad_nonce(&self) -> bool {
        self.kind == Self::BAD_NONCE
    }
}

impl fmt::Display for Problem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} :: {}", self.kind, self.detail)?;
        for sub in &self.subproblems {
            write!(f, "; {}", sub)?;
        }
        Ok(())
    }
}

/// Order or authorization identifier
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identifier {
    #[serde(rename = "type")]
    pub kind: String,
    pub value: String,
}

impl Identifier {
    pub fn dns(domain: impl Into<String>) -> Self {
        Self {
            kind: "dns".to_string(),
            value: domain.into(),
        }
    }
}

/// Order resource together with its URL
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Order {
    #[serde(skip)]
    pub location: String,
    pub status: Status,
    #[serde(default)]
    pub identifiers: Vec<Identifier>,
    #[serde(default)]
    pub authorizations: Vec<String>,
    #[serde(default)]
    pub finalize: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub certificate: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<Problem>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires: Option<String>,
}

/// Authorization resource together with its URL
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Authorization {
    #[serde(skip)]
    pub url: String,
    pub identifier: Identifier,
    pub status: Status,
    #[serde(default)]
    pub challenges: Vec<Challenge>,
    #[serde(default)]
    pub wildcard: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires: Option<String>,
}

impl Authorization {
    /// Challenge of the given type, if the CA offered one
    pub fn challenge(&self, kind: &str) -> Option<&Challenge> {
        self.challenges.iter().find(|c| c.kind == kind)
    }

    /// First challenge error reported by the CA
    pub fn challenge_error(&self) -> Option<&Problem> {
        self.challenges.iter().find_map(|c| c.error.as_ref())
    }
}

/// Challenge resource
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Challenge {
    #[serde(rename = "type")]
    pub kind: String,
    pub url: String,
    #[serde(default)]
    pub token: String,
    pub status: Status,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<Problem>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub validated: Option<String>,
}

pub const CHALLENGE_DNS01: &str = "dns-01";

/// Response to a challenge acceptance
#[derive(Debug, Clone, PartialEq)]
pub struct ChallengeUpdate {
    pub challenge: Challenge,
    /// Authorization URL from the `Link: rel="up"` header
    pub authorization_url: String,
    /// `Retry-After` in seconds
    pub retry_after: Option<u64>,
}

/// Certificate chain downloaded from the CA.
///
/// `cert` is the leaf (followed by the issuers when bundled), `issuer` the
/// remaining chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CertificateChain {
    pub url: String,
    pub cert: String,
    pub issuer: String,
}

/// Account body as returned by the CA
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountBody {
    pub status: Option<Status>,
    #[serde(default)]
    pub contact: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub orders: Option<String>,
    #[serde(default)]
    pub terms_of_service_agreed: bool,
}

/// CA registration resource: account URL plus body.
///
/// Persisted with the account and handed back to the engine for
/// key-id signed requests.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RegistrationResource {
    pub uri: String,
    pub body: AccountBody,
}
