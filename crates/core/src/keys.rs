//! Account and certificate key material.
//!
//! Account keys sign JWS requests to the CA and are stored as PKCS#8 PEM.
//! Certificate keys are generated fresh per issuance through `rcgen`, which
//! also builds the CSR.

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use p256::elliptic_curve::sec1::ToEncodedPoint;
use p256::pkcs8::{DecodePrivateKey, EncodePrivateKey, LineEnding};
use rand_core::OsRng;
use rcgen::{CertificateParams, DistinguishedName, DnType, KeyPair};
use rsa::signature::{SignatureEncoding, Signer};
use rsa::traits::PublicKeyParts;
use rsa::RsaPrivateKey;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

use easyacme_common::EasyAcmeError;

/// Errors raised while generating, decoding or using key material
#[derive(Debug, Error)]
pub enum KeyError {
    #[error("key generation failed: {0}")]
    Generation(String),

    #[error("invalid private key PEM: {0}")]
    Decode(String),

    #[error("failed to encode private key: {0}")]
    Encode(String),

    #[error("signing failed: {0}")]
    Signing(String),

    #[error("unsupported RSA modulus size: {0} bits")]
    UnsupportedRsaSize(usize),

    #[error("failed to build CSR: {0}")]
    Csr(String),
}

impl From<KeyError> for EasyAcmeError {
    fn from(err: KeyError) -> Self {
        match err {
            KeyError::UnsupportedRsaSize(_) | KeyError::Csr(_) => {
                EasyAcmeError::validation(err.to_string())
            }
            other => EasyAcmeError::Internal(other.to_string()),
        }
    }
}

/// Key algorithm for account and certificate keys.
///
/// The wire names are the ones accepted in requests: `P256`, `P384`, or the
/// RSA modulus size in bits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum KeyType {
    #[serde(rename = "P256")]
    P256,
    #[serde(rename = "P384")]
    P384,
    #[serde(rename = "2048")]
    Rsa2048,
    #[serde(rename = "3072")]
    Rsa3072,
    #[serde(rename = "4096")]
    Rsa4096,
    #[serde(rename = "8192")]
    Rsa8192,
}

impl KeyType {
    pub const ALL: [KeyType; 6] = [
        KeyType::P256,
        KeyType::P384,
        KeyType::Rsa2048,
        KeyType::Rsa3072,
        KeyType::Rsa4096,
        KeyType::Rsa8192,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            KeyType::P256 => "P256",
            KeyType::P384 => "P384",
            KeyType::Rsa2048 => "2048",
            KeyType::Rsa3072 => "3072",
            KeyType::Rsa4096 => "4096",
            KeyType::Rsa8192 => "8192",
        }
    }

    /// RSA modulus size, `None` for elliptic curve types
    pub fn rsa_bits(&self) -> Option<usize> {
        match self {
            KeyType::P256 | KeyType::P384 => None,
            KeyType::Rsa2048 => Some(2048),
            KeyType::Rsa3072 => Some(3072),
            KeyType::Rsa4096 => Some(4096),
            KeyType::Rsa8192 => Some(8192),
        }
    }

    fn from_rsa_bits(bits: usize) -> Result<Self, KeyError> {
        match bits {
            2048 => Ok(KeyType::Rsa2048),
            3072 => Ok(KeyType::Rsa3072),
            4096 => Ok(KeyType::Rsa4096),
            8192 => Ok(KeyType::Rsa8192),
            other => Err(KeyError::UnsupportedRsaSize(other)),
        }
    }
}

impl fmt::Display for KeyType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for KeyType {
    type Err = EasyAcmeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        KeyType::ALL
            .into_iter()
            .find(|kt| kt.as_str() == s)
            .ok_or_else(|| EasyAcmeError::validation(format!("unsupported key type: {}", s)))
    }
}

/// Account private key
#[derive(Clone)]
pub enum PrivateKey {
    P256(p256::SecretKey),
    P384(p384::SecretKey),
    Rsa {
        key: Box<RsaPrivateKey>,
        key_type: KeyType,
    },
}

impl fmt::Debug for PrivateKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PrivateKey")
            .field("key_type", &self.key_type())
            .finish_non_exhaustive()
    }
}

impl PrivateKey {
    /// Generate a new key of the given type
    pub fn generate(key_type: KeyType) -> Result<Self, KeyError> {
        match key_type {
            KeyType::P256 => Ok(PrivateKey::P256(p256::SecretKey::random(&mut OsRng))),
            KeyType::P384 => Ok(PrivateKey::P384(p384::SecretKey::random(&mut OsRng))),
            rsa_type => {
                let bits = rsa_type
                    .rsa_bits()
                    .ok_or_else(|| KeyError::Generation(format!("{} is not RSA", rsa_type)))?;
                let key = RsaPrivateKey::new(&mut OsRng, bits)
                    .map_err(|e| KeyError::Generation(e.to_string()))?;
                Ok(PrivateKey::Rsa {
                    key: Box::new(key),
                    key_type: rsa_type,
                })
            }
        }
    }

    /// Decode a PKCS#8 PEM key, recovering its type
    pub fn from_pem(pem: &str) -> Result<Self, KeyError> {
        if let Ok(key) = p256::SecretKey::from_pkcs8_pem(pem) {
            return Ok(PrivateKey::P256(key));
        }
        if let Ok(key) = p384::SecretKey::from_pkcs8_pem(pem) {
            return Ok(PrivateKey::P384(key));
        }
        let key = <RsaPrivateKey as rsa::pkcs8::DecodePrivateKey>::from_pkcs8_pem(pem)
            .map_err(|e| KeyError::Decode(e.to_string()))?;
        let key_type = KeyType::from_rsa_bits(key.size() * 8)?;
        Ok(PrivateKey::Rsa {
            key: Box::new(key),
            key_type,
        })
    }

    /// Encode as PKCS#8 PEM
    pub fn to_pem(&self) -> Result<String, KeyError> {
        let pem = match self {
            PrivateKey::P256(key) => key.to_pkcs8_pem(LineEnding::LF),
            PrivateKey::P384(key) => key.to_pkcs8_pem(LineEnding::LF),
            PrivateKey::Rsa { key, .. } => {
                rsa::pkcs8::EncodePrivateKey::to_pkcs8_pem(key.as_ref(), LineEnding::LF)
            }
        }
        .map_err(|e| KeyError::Encode(e.to_string()))?;
        Ok(pem.to_string())
    }

    pub fn key_type(&self) -> KeyType {
        match self {
            PrivateKey::P256(_) => KeyType::P256,
            PrivateKey::P384(_) => KeyType::P384,
            PrivateKey::Rsa { key_type, .. } => *key_type,
        }
    }

    /// JWS `alg` header value for this key
    pub fn jws_algorithm(&self) -> &'static str {
        match self {
            PrivateKey::P256(_) => "ES256",
            PrivateKey::P384(_) => "ES384",
            PrivateKey::Rsa { .. } => "RS256",
        }
    }

    /// Public key as a JWK (RFC 7517)
    pub fn jwk(&self) -> Result<serde_json::Value, KeyError> {
        Ok(match self.public_parts()? {
            PublicParts::Ec { crv, x, y } => serde_json::json!({
                "crv": crv,
                "kty": "EC",
                "x": x,
                "y": y,
            }),
            PublicParts::Rsa { e, n } => serde_json::json!({
                "e": e,
                "kty": "RSA",
                "n": n,
            }),
        })
    }

    /// JWK thumbprint (RFC 7638), base64url without padding
    pub fn thumbprint(&self) -> Result<String, KeyError> {
        // Members in lexicographic order, no whitespace
        let canonical = match self.public_parts()? {
            PublicParts::Ec { crv, x, y } => format!(
                r#"{{"crv":"{}","kty":"EC","x":"{}","y":"{}"}}"#,
                crv, x, y
            ),
            PublicParts::Rsa { e, n } => format!(r#"{{"e":"{}","kty":"RSA","n":"{}"}}"#, e, n),
        };
        Ok(URL_SAFE_NO_PAD.encode(Sha256::digest(canonical.as_bytes())))
    }

    /// Sign `message` with the algorithm named by [`Self::jws_algorithm`].
    ///
    /// ECDSA signatures use the fixed-size `r || s` encoding JWS expects.
    pub fn sign(&self, message: &[u8]) -> Result<Vec<u8>, KeyError> {
        match self {
            PrivateKey::P256(key) => {
                let signing = p256::ecdsa::SigningKey::from(key);
                let sig: p256::ecdsa::Signature = signing
                    .try_sign(message)
                    .map_err(|e| KeyError::Signing(e.to_string()))?;
                Ok(sig.to_bytes().to_vec())
            }
            PrivateKey::P384(key) => {
                let signing = p384::ecdsa::SigningKey::from(key);
                let sig: p384::ecdsa::Signature = signing
                    .try_sign(message)
                    .map_err(|e| KeyError::Signing(e.to_string()))?;
                Ok(sig.to_bytes().to_vec())
            }
            PrivateKey::Rsa { key, .. } => {
                let signing = rsa::pkcs1v15::SigningKey::<Sha256>::new(key.as_ref().clone());
                let sig = signing
                    .try_sign(message)
                    .map_err(|e| KeyError::Signing(e.to_string()))?;
                Ok(sig.to_vec())
            }
        }
    }

    fn public_parts(&self) -> Result<PublicParts, KeyError> {
        let missing = || KeyError::Encode("public point is not uncompressed".to_string());
        match self {
            PrivateKey::P256(key) => {
                let point = key.public_key().to_encoded_point(false);
                Ok(PublicParts::Ec {
                    crv: "P-256",
                    x: URL_SAFE_NO_PAD.encode(point.x().ok_or_else(missing)?),
                    y: URL_SAFE_NO_PAD.encode(point.y().ok_or_else(missing)?),
                })
            }
            PrivateKey::P384(key) => {
                let point = key.public_key().to_encoded_point(false);
                Ok(PublicParts::Ec {
                    crv: "P-384",
                    x: URL_SAFE_NO_PAD.encode(point.x().ok_or_else(missing)?),
                    y: URL_SAFE_NO_PAD.encode(point.y().ok_or_else(missing)?),
                })
            }
            PrivateKey::Rsa { key, .. } => Ok(PublicParts::Rsa {
                e: URL_SAFE_NO_PAD.encode(key.e().to_bytes_be()),
                n: URL_SAFE_NO_PAD.encode(key.n().to_bytes_be()),
            }),
        }
    }
}

enum PublicParts {
    Ec {
        crv: &'static str,
        x: String,
        y: String,
    },
    Rsa {
        e: String,
        n: String,
    },
}

// ============================================================================
// Certificate keys and CSRs
// ============================================================================

/// A fresh certificate key pair
pub struct CertificateKey {
    pub key_pair: KeyPair,
    pub pem: String,
}

impl fmt::Debug for CertificateKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CertificateKey").finish_non_exhaustive()
    }
}

impl CertificateKey {
    /// Generate a certificate key for the requested algorithm
    pub fn generate(key_type: KeyType) -> Result<Self, KeyError> {
        let key_pair = match key_type {
            KeyType::P256 => KeyPair::generate_for(&rcgen::PKCS_ECDSA_P256_SHA256),
            KeyType::P384 => KeyPair::generate_for(&rcgen::PKCS_ECDSA_P384_SHA384),
            rsa_type => {
                let pem = PrivateKey::generate(rsa_type)?.to_pem()?;
                KeyPair::from_pem_and_sign_algo(&pem, &rcgen::PKCS_RSA_SHA256)
            }
        }
        .map_err(|e| KeyError::Generation(e.to_string()))?;

        let pem = key_pair.serialize_pem();
        Ok(Self { key_pair, pem })
    }
}

/// DER and PEM forms of a certificate signing request
#[derive(Debug, Clone)]
pub struct CertificateRequest {
    pub der: Vec<u8>,
    pub pem: String,
}

/// Build a CSR with `domains[0]` as the common name and every domain as a SAN
pub fn build_csr(key: &CertificateKey, domains: &[String]) -> Result<CertificateRequest, KeyError> {
    let primary = domains
        .first()
        .ok_or_else(|| KeyError::Csr("at least one domain is required".to_string()))?;

    let mut params =
        CertificateParams::new(domains.to_vec()).map_err(|e| KeyError::Csr(e.to_string()))?;
    let mut dn = DistinguishedName::new();
    dn.push(DnType::CommonName, primary.clone());
    params.distinguished_name = dn;

    let csr = params
        .serialize_request(&key.key_pair)
        .map_err(|e| KeyError::Csr(e.to_string()))?;
    let pem = csr.pem().map_err(|e| KeyError::Csr(e.to_string()))?;

    Ok(CertificateRequest {
        der: csr.der().to_vec(),
        pem,
    })
}
