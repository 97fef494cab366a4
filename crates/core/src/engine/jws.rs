//! Flattened JWS serialization (RFC 7515 section 7.2.2) for ACME requests.

use base64::{
    engine::general_purpose::{STANDARD, URL_SAFE_NO_PAD},
    Engine as _,
};
use hmac::{Hmac, Mac};
use serde::Serialize;
use serde_json::{json, Value};
use sha2::Sha256;

use super::{EngineError, EngineResult};
use crate::keys::PrivateKey;

/// Request body posted to the CA
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct FlattenedJws {
    pub protected: String,
    pub payload: String,
    pub signature: String,
}

/// Sign `payload` for `url`.
///
/// With `kid` the protected header names the account URL, otherwise it embeds
/// the public JWK (only newAccount and key-authenticated revocation do that).
/// An empty payload is a POST-as-GET.
pub fn sign(
    key: &PrivateKey,
    kid: Option<&str>,
    nonce: &str,
    url: &str,
    payload: &[u8],
) -> EngineResult<FlattenedJws> {
    let mut header = json!({
        "alg": key.jws_algorithm(),
        "nonce": nonce,
        "url": url,
    });
    match kid {
        Some(kid) => header["kid"] = json!(kid),
        None => header["jwk"] = key.jwk()?,
    }

    let protected = encode_json(&header)?;
    let payload = URL_SAFE_NO_PAD.encode(payload);
    let signature = key.sign(format!("{}.{}", protected, payload).as_bytes())?;

    Ok(FlattenedJws {
        protected,
        payload,
        signature: URL_SAFE_NO_PAD.encode(signature),
    })
}

/// Build the `externalAccountBinding` object for newAccount (RFC 8555 section 7.3.4)
pub fn external_account_binding(
    key_id: &str,
    hmac_key: &str,
    account_jwk: &Value,
    url: &str,
) -> EngineResult<FlattenedJws> {
    let mac_key = decode_hmac_key(hmac_key)?;

    let protected = encode_json(&json!({
        "alg": "HS256",
        "kid": key_id,
        "url": url,
    }))?;
    let payload = encode_json(account_jwk)?;

    let mut mac = Hmac::<Sha256>::new_from_slice(&mac_key)
        .map_err(|e| EngineError::InvalidInput(format!("EAB HMAC key: {}", e)))?;
    mac.update(format!("{}.{}", protected, payload).as_bytes());
    let signature = URL_SAFE_NO_PAD.encode(mac.finalize().into_bytes());

    Ok(FlattenedJws {
        protected,
        payload,
        signature,
    })
}

/// CAs hand out the HMAC key as base64url; some pad it or use the standard alphabet.
fn decode_hmac_key(hmac_key: &str) -> EngineResult<Vec<u8>> {
    let trimmed = hmac_key.trim().trim_end_matches('=');
    if trimmed.is_empty() {
        return Err(EngineError::InvalidInput("EAB HMAC key is empty".to_string()));
    }
    URL_SAFE_NO_PAD
        .decode(trimmed)
        .or_else(|_| STANDARD.decode(hmac_key.trim()))
        .map_err(|_| EngineError::InvalidInput("EAB HMAC key is not valid base64".to_string()))
}

fn encode_json(value: &Value) -> EngineResult<String> {
    let bytes = serde_json::to_vec(value).map_err(|e| EngineError::Protocol(e.to_string()))?;
    Ok(URL_SAFE_NO_PAD.encode(bytes))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keys::KeyType;
    use p256::ecdsa::signature::Verifier;

    fn decode_header(jws: &FlattenedJws) -> Value {
        serde_json::from_slice(&URL_SAFE_NO_PAD.decode(&jws.protected).unwrap()).unwrap()
    }

    #[test]
    fn test_sign_with_jwk_header() {
        let key = PrivateKey::generate(KeyType::P256).unwrap();
        let jws = sign(&key, None, "nonce-1", "https://ca/new-acct", b"{}").unwrap();

        let header = decode_header(&jws);
        assert_eq!(header["alg"], "ES256");
        assert_eq!(header["nonce"], "nonce-1");
        assert_eq!(header["url"], "https://ca/new-acct");
        assert_eq!(header["jwk"]["kty"], "EC");
        assert!(header.get("kid").is_none());
    }

    #[test]
    fn test_sign_with_kid_and_empty_payload() {
        let key = PrivateKey::generate(KeyType::P384).unwrap();
        let jws = sign(&key, Some("https://ca/acct/1"), "n", "https://ca/order/1", b"").unwrap();

        let header = decode_header(&jws);
        assert_eq!(header["alg"], "ES384");
        assert_eq!(header["kid"], "https://ca/acct/1");
        assert!(header.get("jwk").is_none());
        assert_eq!(jws.payload, "");
    }

    #[test]
    fn test_es256_signature_verifies() {
        let key = PrivateKey::generate(KeyType::P256).unwrap();
        let jws = sign(&key, Some("kid"), "n", "https://ca/x", b"{\"a\":1}").unwrap();

        let PrivateKey::P256(secret) = &key else {
            panic!("expected P-256 key");
        };
        let verifying = p256::ecdsa::VerifyingKey::from(secret.public_key());
        let signature_bytes = URL_SAFE_NO_PAD.decode(&jws.signature).unwrap();
        let signature = p256::ecdsa::Signature::from_slice(&signature_bytes).unwrap();
        let input = format!("{}.{}", jws.protected, jws.payload);
        verifying.verify(input.as_bytes(), &signature).unwrap();
    }

    #[test]
    fn test_eab_binding() {
        let key = PrivateKey::generate(KeyType::P256).unwrap();
        let jwk = key.jwk().unwrap();
        let hmac_key = URL_SAFE_NO_PAD.encode(b"super-secret-hmac-key");

        let eab = external_account_binding("kid-1", &hmac_key, &jwk, "https://ca/new-acct").unwrap();
        let header = decode_header(&eab);
        assert_eq!(header["alg"], "HS256");
        assert_eq!(header["kid"], "kid-1");

        let payload: Value =
            serde_json::from_slice(&URL_SAFE_NO_PAD.decode(&eab.payload).unwrap()).unwrap();
        assert_eq!(payload, jwk);

        let mut mac = Hmac::<Sha256>::new_from_slice(b"super-secret-hmac-key").unwrap();
        mac.update(format!("{}.{}", eab.protected, eab.payload).as_bytes());
        mac.verify_slice(&URL_SAFE_NO_PAD.decode(&eab.signature).unwrap())
            .unwrap();
    }

    #[test]
    fn test_eab_rejects_bad_hmac_key() {
        let key = PrivateKey::generate(KeyType::P256).unwrap();
        let jwk = key.jwk().unwrap();
        assert!(matches!(
            external_account_binding("kid", "!!!", &jwk, "https://ca/new-acct"),
            Err(EngineError::InvalidInput(_))
        ));
        assert!(matches!(
            external_account_binding("kid", "", &jwk, "https://ca/new-acct"),
            Err(EngineError::InvalidInput(_))
        ));
    }
}
