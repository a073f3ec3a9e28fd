//! Signing keys of the simulated providers.

use chrono::{Duration, Utc};
use jsonwebtoken::{Algorithm, EncodingKey, Header};
use ring::signature::{Ed25519KeyPair, KeyPair};
use serde_json::{Value, json};
use std::sync::LazyLock;

use crate::types::Role;
use crate::utils::{base64url_decode, base64url_encode};

use super::errors::ActorError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum KeyKind {
    Honest,
    Evil,
    /// Never announced through any JWK set endpoint.
    Untrusted,
}

impl From<Role> for KeyKind {
    fn from(role: Role) -> Self {
        role.pick(KeyKind::Honest, KeyKind::Evil)
    }
}

pub(crate) struct SigningKey {
    kid: String,
    encoding: EncodingKey,
    pair: Ed25519KeyPair,
    public_x: String,
}

impl SigningKey {
    fn generate(kid: &str) -> Result<Self, ActorError> {
        let rng = ring::rand::SystemRandom::new();
        let pkcs8 = Ed25519KeyPair::generate_pkcs8(&rng)
            .map_err(|_| ActorError::Crypto("Failed to generate Ed25519 key".to_string()))?;
        let pair = Ed25519KeyPair::from_pkcs8(pkcs8.as_ref())
            .map_err(|e| ActorError::Crypto(format!("Invalid Ed25519 key: {e}")))?;
        Ok(Self {
            kid: kid.to_string(),
            encoding: EncodingKey::from_ed_der(pkcs8.as_ref()),
            public_x: base64url_encode(pair.public_key().as_ref()),
            pair,
        })
    }

    pub(crate) fn kid(&self) -> &str {
        &self.kid
    }

    /// Public JWK (RFC 8037 OKP key).
    pub(crate) fn public_jwk(&self) -> Value {
        json!({
            "kty": "OKP",
            "crv": "Ed25519",
            "use": "sig",
            "alg": "EdDSA",
            "kid": self.kid,
            "x": self.public_x,
        })
    }

    /// Public JWK announced under a different key ID.
    pub(crate) fn public_jwk_with_kid(&self, kid: &str) -> Value {
        let mut jwk = self.public_jwk();
        jwk["kid"] = json!(kid);
        jwk
    }

    /// Header for a token signed with this key.
    pub(crate) fn header(&self) -> Header {
        let mut header = Header::new(Algorithm::EdDSA);
        header.kid = Some(self.kid.clone());
        header
    }

    pub(crate) fn sign(&self, header: &Header, claims: &Value) -> Result<String, ActorError> {
        Ok(jsonwebtoken::encode(header, claims, &self.encoding)?)
    }

    /// Sign with a raw JOSE header. Members `jsonwebtoken::Header` cannot
    /// carry, such as an embedded `jwk` or `sub`, survive as given.
    pub(crate) fn sign_with_header(
        &self,
        header: &Value,
        claims: &Value,
    ) -> Result<String, ActorError> {
        let signing_input = format!(
            "{}.{}",
            base64url_encode(header.to_string().as_bytes()),
            base64url_encode(claims.to_string().as_bytes())
        );
        let signature = self.pair.sign(signing_input.as_bytes());
        Ok(format!(
            "{}.{}",
            signing_input,
            base64url_encode(signature.as_ref())
        ))
    }

    /// Self-signed X.509 certificate (DER) over this public key, with the
    /// key ID as subject and issuer common name.
    pub(crate) fn certificate_der(&self) -> Vec<u8> {
        let now = Utc::now();
        let not_before = (now - Duration::days(1)).format("%y%m%d%H%M%SZ").to_string();
        let not_after = (now + Duration::days(365)).format("%y%m%d%H%M%SZ").to_string();
        let name = der(
            0x30,
            &der(
                0x31,
                &der(0x30, &[OID_COMMON_NAME, &der(0x0c, self.kid.as_bytes())].concat()),
            ),
        );
        let algorithm = der(0x30, OID_ED25519);
        let public_key = der(0x03, &[&[0u8][..], self.pair.public_key().as_ref()].concat());

        let tbs = der(
            0x30,
            &[
                der(0xa0, &der(0x02, &[0x02])),
                der(0x02, &[0x01]),
                algorithm.clone(),
                name.clone(),
                der(
                    0x30,
                    &[der(0x17, not_before.as_bytes()), der(0x17, not_after.as_bytes())].concat(),
                ),
                name,
                der(0x30, &[algorithm.clone(), public_key].concat()),
            ]
            .concat(),
        );
        let signature = self.pair.sign(&tbs);
        let signature = der(0x03, &[&[0u8][..], signature.as_ref()].concat());
        der(0x30, &[tbs, algorithm, signature].concat())
    }
}

const OID_ED25519: &[u8] = &[0x06, 0x03, 0x2b, 0x65, 0x70];
const OID_COMMON_NAME: &[u8] = &[0x06, 0x03, 0x55, 0x04, 0x03];

/// DER TLV with definite length.
fn der(tag: u8, content: &[u8]) -> Vec<u8> {
    let len = content.len();
    let mut out = vec![tag];
    if len < 0x80 {
        out.push(len as u8);
    } else if len <= 0xff {
        out.extend([0x81, len as u8]);
    } else {
        out.extend([0x82, (len >> 8) as u8, len as u8]);
    }
    out.extend_from_slice(content);
    out
}

/// ID token signed with HMAC-SHA256 under a client secret.
pub(crate) fn sign_with_secret(secret: &str, claims: &Value) -> Result<String, ActorError> {
    let mut header = Header::new(Algorithm::HS256);
    header.typ = Some("JWT".to_string());
    Ok(jsonwebtoken::encode(
        &header,
        claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )?)
}

struct KeySet {
    honest: SigningKey,
    evil: SigningKey,
    untrusted: SigningKey,
}

static KEYS: LazyLock<Result<KeySet, ActorError>> = LazyLock::new(|| {
    Ok(KeySet {
        honest: SigningKey::generate("honest-op-key")?,
        evil: SigningKey::generate("evil-op-key")?,
        untrusted: SigningKey::generate("untrusted-key")?,
    })
});

/// Process-wide key of the given kind, generated on first use.
pub(crate) fn signing_key(kind: KeyKind) -> Result<&'static SigningKey, ActorError> {
    let keys = KEYS.as_ref().map_err(Clone::clone)?;
    Ok(match kind {
        KeyKind::Honest => &keys.honest,
        KeyKind::Evil => &keys.evil,
        KeyKind::Untrusted => &keys.untrusted,
    })
}

/// JWK set document holding the given public keys in order.
pub(crate) fn jwk_set(keys: &[&SigningKey]) -> Value {
    json!({ "keys": keys.iter().map(|k| k.public_jwk()).collect::<Vec<_>>() })
}

/// Unsecured JWT (`alg: none`) carrying `claims`.
pub(crate) fn unsigned_token(claims: &Value) -> String {
    let header = json!({ "alg": "none", "typ": "JWT" });
    format!(
        "{}.{}.",
        base64url_encode(header.to_string().as_bytes()),
        base64url_encode(claims.to_string().as_bytes())
    )
}

/// Same token with its signature bits flipped.
pub(crate) fn corrupt_signature(token: &str) -> Result<String, ActorError> {
    let (signed_part, signature) = token
        .rsplit_once('.')
        .ok_or_else(|| ActorError::Crypto("Malformed token".to_string()))?;
    let mut raw = base64url_decode(signature)?;
    for byte in raw.iter_mut() {
        *byte ^= 0xff;
    }
    Ok(format!("{}.{}", signed_part, base64url_encode(&raw)))
}

/// Decoded JOSE header of a compact token.
pub fn decode_header_json(token: &str) -> Result<Value, ActorError> {
    let header = token
        .split('.')
        .next()
        .ok_or_else(|| ActorError::Crypto("Malformed token".to_string()))?;
    Ok(serde_json::from_slice(&base64url_decode(header)?)?)
}

/// Decoded claims of a compact token, without any signature check.
pub fn decode_claims_json(token: &str) -> Result<Value, ActorError> {
    let claims = token
        .split('.')
        .nth(1)
        .ok_or_else(|| ActorError::Crypto("Malformed token".to_string()))?;
    Ok(serde_json::from_slice(&base64url_decode(claims)?)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use jsonwebtoken::{DecodingKey, Validation};

    #[test]
    fn test_keys_are_distinct() {
        let honest = signing_key(KeyKind::Honest).unwrap();
        let evil = signing_key(KeyKind::Evil).unwrap();
        let untrusted = signing_key(KeyKind::Untrusted).unwrap();
        assert_ne!(honest.public_jwk()["x"], evil.public_jwk()["x"]);
        assert_ne!(evil.public_jwk()["x"], untrusted.public_jwk()["x"]);
        assert_eq!(KeyKind::from(Role::Evil), KeyKind::Evil);
    }

    #[test]
    fn test_signed_token_verifies_with_public_jwk() {
        // Given a token signed by the honest key
        let key = signing_key(KeyKind::Honest).unwrap();
        let claims = json!({ "sub": "alice", "aud": "client", "exp": 4_102_444_800i64 });
        let token = key.sign(&key.header(), &claims).unwrap();

        // When verifying with the announced public key
        let x = key.public_jwk()["x"].as_str().unwrap().to_string();
        let decoding = DecodingKey::from_ed_components(&x).unwrap();
        let mut validation = Validation::new(Algorithm::EdDSA);
        validation.set_audience(&["client"]);
        let decoded = jsonwebtoken::decode::<Value>(&token, &decoding, &validation).unwrap();

        // Then the claims come back intact
        assert_eq!(decoded.claims["sub"], "alice");
        assert_eq!(decode_header_json(&token).unwrap()["kid"], "honest-op-key");
    }

    #[test]
    fn test_corrupted_signature_fails_verification() {
        let key = signing_key(KeyKind::Evil).unwrap();
        let claims = json!({ "sub": "bob", "exp": 4_102_444_800i64 });
        let token = corrupt_signature(&key.sign(&key.header(), &claims).unwrap()).unwrap();

        let x = key.public_jwk()["x"].as_str().unwrap().to_string();
        let decoding = DecodingKey::from_ed_components(&x).unwrap();
        let mut validation = Validation::new(Algorithm::EdDSA);
        validation.validate_aud = false;
        assert!(jsonwebtoken::decode::<Value>(&token, &decoding, &validation).is_err());
        // Claims stay readable
        assert_eq!(decode_claims_json(&token).unwrap()["sub"], "bob");
    }

    #[test]
    fn test_unsigned_token_shape() {
        let token = unsigned_token(&json!({ "sub": "x" }));
        assert!(token.ends_with('.'));
        assert_eq!(decode_header_json(&token).unwrap()["alg"], "none");
    }

    #[test]
    fn test_raw_header_survives_signing() {
        // Given a header with members outside the typed header
        let key = signing_key(KeyKind::Untrusted).unwrap();
        let header = json!({ "alg": "EdDSA", "kid": "x", "jwk": key.public_jwk(), "sub": "alice" });
        let claims = json!({ "sub": "alice", "exp": 4_102_444_800i64 });

        // When signing it verbatim
        let token = key.sign_with_header(&header, &claims).unwrap();

        // Then the header decodes unchanged and the signature verifies
        assert_eq!(decode_header_json(&token).unwrap()["sub"], "alice");
        let x = key.public_jwk()["x"].as_str().unwrap().to_string();
        let decoding = DecodingKey::from_ed_components(&x).unwrap();
        let mut validation = Validation::new(Algorithm::EdDSA);
        validation.validate_aud = false;
        assert!(jsonwebtoken::decode::<Value>(&token, &decoding, &validation).is_ok());
    }

    #[test]
    fn test_certificate_is_self_signed_over_public_key() {
        let key = signing_key(KeyKind::Untrusted).unwrap();
        let cert = key.certificate_der();

        // Outer SEQUENCE with a two byte length
        assert_eq!(cert[0], 0x30);
        assert_eq!(cert[1], 0x81);
        assert_eq!(cert.len(), cert[2] as usize + 3);
        let public = key.pair.public_key().as_ref().to_vec();
        assert!(cert.windows(public.len()).any(|w| w == public.as_slice()));

        // The trailing 64 bytes sign the TBS part
        let tbs_len = cert[5] as usize + 3;
        let tbs = &cert[3..3 + tbs_len];
        let signature = &cert[cert.len() - 64..];
        let verifier = ring::signature::UnparsedPublicKey::new(&ring::signature::ED25519, &public);
        assert!(verifier.verify(tbs, signature).is_ok());
    }

    #[test]
    fn test_secret_signed_token_verifies_with_secret() {
        let token = sign_with_secret("s3cret", &json!({ "sub": "x", "exp": 4_102_444_800i64 })).unwrap();
        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_aud = false;
        let decoded = jsonwebtoken::decode::<Value>(
            &token,
            &DecodingKey::from_secret(b"s3cret"),
            &validation,
        )
        .unwrap();
        assert_eq!(decoded.claims["sub"], "x");
    }

    #[test]
    fn test_jwk_set_order() {
        let trusted = signing_key(KeyKind::Evil).unwrap();
        let untrusted = signing_key(KeyKind::Untrusted).unwrap();
        let set = jwk_set(&[untrusted, trusted]);
        assert_eq!(set["keys"][0]["kid"], "untrusted-key");
        assert_eq!(set["keys"][1]["kid"], "evil-op-key");
    }
}
