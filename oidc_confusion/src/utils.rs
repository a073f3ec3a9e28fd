use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
use ring::rand::SecureRandom;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use thiserror::Error;
use url::Url;

const ALPHANUMERIC: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789";

#[derive(Debug, Error, Clone)]
pub enum UtilError {
    #[error("Crypto error: {0}")]
    Crypto(String),

    #[error("Invalid format: {0}")]
    Format(String),

    #[error("Invalid URI: {0}")]
    Uri(String),
}

pub(crate) fn base64url_encode(input: &[u8]) -> String {
    URL_SAFE_NO_PAD.encode(input)
}

pub(crate) fn base64url_decode(input: &str) -> Result<Vec<u8>, UtilError> {
    URL_SAFE_NO_PAD
        .decode(input)
        .map_err(|_| UtilError::Format("Failed to decode base64url".to_string()))
}

/// Random base64url string built from `len` random bytes.
pub fn gen_random_string(len: usize) -> Result<String, UtilError> {
    let rng = ring::rand::SystemRandom::new();
    let mut bytes = vec![0u8; len];
    rng.fill(&mut bytes)
        .map_err(|_| UtilError::Crypto("Failed to generate random string".to_string()))?;
    Ok(base64url_encode(&bytes))
}

/// Random string of exactly `len` ASCII letters and digits.
pub fn gen_alphanumeric(len: usize) -> Result<String, UtilError> {
    let rng = ring::rand::SystemRandom::new();
    let mut bytes = vec![0u8; len];
    rng.fill(&mut bytes)
        .map_err(|_| UtilError::Crypto("Failed to generate random string".to_string()))?;
    Ok(bytes
        .into_iter()
        .map(|b| ALPHANUMERIC[b as usize % ALPHANUMERIC.len()] as char)
        .collect())
}

/// Normalize a URI for equality checks.
///
/// Scheme and host are lowercased, the default port of http/https is
/// written out explicitly, an empty path becomes `/`, and the fragment is
/// dropped. The query is preserved.
pub fn normalize_uri(input: &str) -> Result<String, UtilError> {
    let url = Url::parse(input.trim()).map_err(|e| UtilError::Uri(format!("{input}: {e}")))?;
    let host = url
        .host_str()
        .ok_or_else(|| UtilError::Uri(format!("{input}: missing host")))?;
    let port = url
        .port_or_known_default()
        .ok_or_else(|| UtilError::Uri(format!("{input}: unknown port")))?;

    let path = if url.path().is_empty() { "/" } else { url.path() };
    let mut normalized = format!("{}://{}:{}{}", url.scheme(), host, port, path);
    if let Some(query) = url.query() {
        normalized.push('?');
        normalized.push_str(query);
    }
    Ok(normalized)
}

/// Left half of the SHA-256 digest, base64url encoded (`at_hash`/`c_hash`).
pub(crate) fn half_hash(value: &str) -> String {
    let digest = Sha256::digest(value.as_bytes());
    base64url_encode(&digest[..digest.len() / 2])
}

/// S256 PKCE code challenge of `verifier`.
pub(crate) fn pkce_challenge(verifier: &str) -> String {
    base64url_encode(&Sha256::digest(verifier.as_bytes()))
}

pub(crate) fn html_escape(value: &str) -> String {
    value
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&#x27;")
}

/// Substitute `${name}` placeholders. Unknown placeholders are left untouched.
pub fn render_template(template: &str, vars: &HashMap<String, String>) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;
    while let Some(start) = rest.find("${") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        match after.find('}') {
            Some(end) => {
                let name = &after[..end];
                match vars.get(name) {
                    Some(value) => out.push_str(value),
                    None => {
                        out.push_str("${");
                        out.push_str(name);
                        out.push('}');
                    }
                }
                rest = &after[end + 1..];
            }
            None => {
                out.push_str(&rest[start..]);
                rest = "";
            }
        }
    }
    out.push_str(rest);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_fills_default_port_and_path() {
        assert_eq!(
            normalize_uri("http://x.test").unwrap(),
            normalize_uri("http://x.test:80/").unwrap()
        );
        assert_eq!(
            normalize_uri("https://X.Test").unwrap(),
            "https://x.test:443/"
        );
    }

    #[test]
    fn test_normalize_keeps_non_default_port_and_query() {
        assert_eq!(
            normalize_uri("http://x.test:8080/a?b=c#frag").unwrap(),
            "http://x.test:8080/a?b=c"
        );
        assert_ne!(
            normalize_uri("http://x.test:8080/").unwrap(),
            normalize_uri("http://x.test/").unwrap()
        );
    }

    #[test]
    fn test_normalize_trims_whitespace() {
        assert_eq!(
            normalize_uri("  http://x.test/\n").unwrap(),
            "http://x.test:80/"
        );
    }

    #[test]
    fn test_normalize_rejects_garbage() {
        assert!(matches!(normalize_uri("not a uri"), Err(UtilError::Uri(_))));
        assert!(normalize_uri("").is_err());
    }

    #[test]
    fn test_gen_alphanumeric_length_and_charset() {
        let s = gen_alphanumeric(8).unwrap();
        assert_eq!(s.len(), 8);
        assert!(s.chars().all(|c| c.is_ascii_alphanumeric()));
    }

    #[test]
    fn test_gen_random_string_is_url_safe() {
        let s = gen_random_string(32).unwrap();
        assert!(!s.contains('+') && !s.contains('/') && !s.contains('='));
        assert_ne!(s, gen_random_string(32).unwrap());
    }

    #[test]
    fn test_base64url_roundtrip() {
        let encoded = base64url_encode(b"hello");
        assert_eq!(base64url_decode(&encoded).unwrap(), b"hello");
        assert!(base64url_decode("***").is_err());
    }

    #[test]
    fn test_half_hash_length() {
        // 16 bytes encode to 22 base64url characters
        assert_eq!(half_hash("some-access-token").len(), 22);
    }

    #[test]
    fn test_pkce_challenge_matches_rfc_example() {
        // RFC 7636 appendix B
        assert_eq!(
            pkce_challenge("dBjftJeZ4CVP-mB92K27uhbUJU1p1r_wW1gFWFOEjXk"),
            "E9Melhoa2OwvFrEMTJguCHaoeK1t8URWbuGwSstw-cM"
        );
    }

    #[test]
    fn test_render_template() {
        let mut vars = HashMap::new();
        vars.insert("browser_input_op_url".to_string(), "http://op/x".to_string());
        let script = "document.querySelector('#id').value = '${browser_input_op_url}'; ${missing}";
        assert_eq!(
            render_template(script, &vars),
            "document.querySelector('#id').value = 'http://op/x'; ${missing}"
        );
        assert_eq!(render_template("tail ${open", &vars), "tail ${open");
    }
}
